//! Upstream HTTP client.
//!
//! # Responsibilities
//! - POST one chat completion per attempt with the selected credential
//! - Enforce the per-call timeout
//! - Translate transport and status failures into [`UpstreamError`]

use std::future::Future;
use std::time::Duration;

use url::Url;

use crate::error::RelayError;
use crate::upstream::types::{ChatCompletion, ChatRequest, UpstreamError};

/// Something that can execute one upstream chat call.
///
/// The dispatcher is generic over this so tests can script outcomes per
/// credential without a network.
pub trait UpstreamClient: Send + Sync + 'static {
    fn chat(
        &self,
        credential: &str,
        request: &ChatRequest,
    ) -> impl Future<Output = Result<ChatCompletion, UpstreamError>> + Send;
}

/// `reqwest`-backed client for an OpenAI-compatible endpoint.
#[derive(Debug, Clone)]
pub struct HttpUpstream {
    client: reqwest::Client,
    endpoint: Url,
}

impl HttpUpstream {
    /// Create a client posting to `{base_url}/chat/completions`.
    pub fn new(base_url: &str, timeout: Duration) -> Result<Self, RelayError> {
        let endpoint = chat_completions_url(base_url)?;
        let client = reqwest::Client::builder()
            .timeout(timeout)
            .build()
            .map_err(|e| RelayError::Configuration(format!("failed to build HTTP client: {}", e)))?;

        Ok(Self { client, endpoint })
    }

    /// The URL every attempt is posted to.
    pub fn endpoint(&self) -> &Url {
        &self.endpoint
    }
}

impl UpstreamClient for HttpUpstream {
    async fn chat(
        &self,
        credential: &str,
        request: &ChatRequest,
    ) -> Result<ChatCompletion, UpstreamError> {
        let response = self
            .client
            .post(self.endpoint.clone())
            .bearer_auth(credential)
            .json(request)
            .send()
            .await
            .map_err(map_transport_error)?;

        let status = response.status();
        let body = response.text().await.map_err(map_transport_error)?;

        if !status.is_success() {
            return Err(UpstreamError::Status {
                status: status.as_u16(),
                body,
            });
        }

        ChatCompletion::from_body(&body)
    }
}

fn map_transport_error(err: reqwest::Error) -> UpstreamError {
    if err.is_timeout() {
        UpstreamError::Timeout
    } else {
        UpstreamError::Transport(err.to_string())
    }
}

fn chat_completions_url(base_url: &str) -> Result<Url, RelayError> {
    let mut base = Url::parse(base_url)
        .map_err(|e| RelayError::Configuration(format!("invalid upstream base_url '{}': {}", base_url, e)))?;
    // Url::join replaces the last segment unless the path ends in '/'.
    if !base.path().ends_with('/') {
        let path = format!("{}/", base.path());
        base.set_path(&path);
    }
    base.join("chat/completions")
        .map_err(|e| RelayError::Configuration(format!("invalid upstream base_url '{}': {}", base_url, e)))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_endpoint_join() {
        let url = chat_completions_url("https://api.example.com/v1").unwrap();
        assert_eq!(url.as_str(), "https://api.example.com/v1/chat/completions");

        let url = chat_completions_url("https://api.example.com/v1/").unwrap();
        assert_eq!(url.as_str(), "https://api.example.com/v1/chat/completions");

        let url = chat_completions_url("http://127.0.0.1:8080").unwrap();
        assert_eq!(url.as_str(), "http://127.0.0.1:8080/chat/completions");
    }

    #[test]
    fn test_invalid_base_url() {
        let err = HttpUpstream::new("::nope::", Duration::from_secs(1)).unwrap_err();
        assert!(matches!(err, RelayError::Configuration(_)));
    }
}
