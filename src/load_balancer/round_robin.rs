//! Round-robin rotation cursor.

use std::sync::atomic::{AtomicUsize, Ordering};

/// Shared rotation cursor.
/// Each call to [`RoundRobin::rotation`] starts one position later than the last.
#[derive(Debug, Default)]
pub struct RoundRobin {
    cursor: AtomicUsize,
}

impl RoundRobin {
    pub fn new() -> Self {
        Self::default()
    }

    /// Current cursor value.
    pub fn position(&self) -> usize {
        self.cursor.load(Ordering::Relaxed)
    }

    /// Indices `0..len` starting at the cursor, wrapping around.
    /// Advances the cursor by one (modulo `len`) whether or not the result is used.
    pub fn rotation(&self, len: usize) -> impl Iterator<Item = usize> {
        let start = if len == 0 {
            0
        } else {
            // fetch_update only fails when the closure returns None.
            match self
                .cursor
                .fetch_update(Ordering::Relaxed, Ordering::Relaxed, |c| Some((c + 1) % len))
            {
                Ok(prev) | Err(prev) => prev % len,
            }
        };
        (0..len).map(move |i| (start + i) % len)
    }
}
