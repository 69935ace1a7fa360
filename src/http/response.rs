//! Error rendering for callers.
//!
//! # Design Decisions
//! - Every terminal path carries a status code and a readable message
//! - Upstream bodies are passed through as `detail`, unchanged

use axum::{
    extract::rejection::JsonRejection,
    http::StatusCode,
    response::{IntoResponse, Response},
    Json,
};
use serde::Serialize;

use crate::error::RelayError;

/// JSON error body: `{"error": ..., "detail": ...}`.
#[derive(Debug, Serialize)]
pub struct ErrorBody {
    pub error: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub detail: Option<String>,
}

/// A [`RelayError`] on its way to the caller.
#[derive(Debug)]
pub struct ApiError(pub RelayError);

impl ApiError {
    pub fn status(&self) -> StatusCode {
        StatusCode::from_u16(self.0.status_code()).unwrap_or(StatusCode::BAD_GATEWAY)
    }
}

impl From<RelayError> for ApiError {
    fn from(err: RelayError) -> Self {
        Self(err)
    }
}

impl From<JsonRejection> for ApiError {
    fn from(rejection: JsonRejection) -> Self {
        Self(RelayError::InvalidRequest {
            status: rejection.status().as_u16(),
            message: rejection.body_text(),
        })
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let status = self.status();
        let body = ErrorBody {
            error: self.0.to_string(),
            detail: self.0.detail().map(str::to_string),
        };
        (status, Json(body)).into_response()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::upstream::UpstreamError;

    #[test]
    fn test_status_passthrough() {
        let err = ApiError(RelayError::UpstreamFatal(UpstreamError::Status {
            status: 422,
            body: "{\"message\":\"bad\"}".into(),
        }));
        assert_eq!(err.status(), StatusCode::UNPROCESSABLE_ENTITY);

        let err = ApiError(RelayError::CapacityExhausted("busy".into()));
        assert_eq!(err.status(), StatusCode::TOO_MANY_REQUESTS);
    }

    #[test]
    fn test_out_of_range_status_becomes_bad_gateway() {
        let err = ApiError(RelayError::UpstreamFatal(UpstreamError::Status {
            status: 1000,
            body: String::new(),
        }));
        assert_eq!(err.status(), StatusCode::BAD_GATEWAY);
    }

    #[test]
    fn test_invalid_request_keeps_client_status() {
        let err = ApiError(RelayError::InvalidRequest {
            status: 422,
            message: "missing field `model`".into(),
        });
        assert_eq!(err.status(), StatusCode::UNPROCESSABLE_ENTITY);
        assert_eq!(err.into_response().status(), StatusCode::UNPROCESSABLE_ENTITY);
    }

    #[test]
    fn test_body_omits_missing_detail() {
        let body = ErrorBody { error: "x".into(), detail: None };
        assert_eq!(serde_json::to_string(&body).unwrap(), r#"{"error":"x"}"#);
    }
}
