//! The clock token expiry is judged against.
//!
//! With the `mock-time` feature the clock is a shared, settable instant so
//! tests can move a session past its expiry without waiting.

use jiff::{Span, Timestamp};
use std::time::Duration;

use crate::token::{TokenStatus, classify};

#[cfg(feature = "mock-time")]
type Clock = std::sync::Arc<std::sync::Mutex<Timestamp>>;

#[derive(Clone)]
pub struct TimeSource {
    #[cfg(feature = "mock-time")]
    clock: Clock,
}

#[cfg(not(feature = "mock-time"))]
impl Default for TimeSource {
    fn default() -> Self {
        Self::new()
    }
}

impl TimeSource {
    #[cfg(not(feature = "mock-time"))]
    pub fn new() -> Self {
        Self {}
    }

    /// Clones share the clock, so advancing one moves them all.
    #[cfg(feature = "mock-time")]
    pub fn new(start: Timestamp) -> Self {
        Self {
            clock: std::sync::Arc::new(std::sync::Mutex::new(start)),
        }
    }

    #[cfg(not(feature = "mock-time"))]
    pub fn now(&self) -> Timestamp {
        Timestamp::now()
    }

    #[cfg(feature = "mock-time")]
    pub fn now(&self) -> Timestamp {
        *self.lock()
    }

    /// Where `access_token` stands right now.
    pub fn token_status(
        &self,
        access_token: &str,
        soft_window: Duration,
    ) -> TokenStatus {
        classify(access_token, self.now(), soft_window)
    }

    #[cfg(feature = "mock-time")]
    pub fn advance(&self, by: Span) {
        let mut now = self.lock();
        *now += by;
        tracing::debug!(now = %*now, "Mock clock advanced");
    }

    #[cfg(feature = "mock-time")]
    pub fn set(&self, to: Timestamp) {
        *self.lock() = to;
    }

    #[cfg(feature = "mock-time")]
    fn lock(&self) -> std::sync::MutexGuard<'_, Timestamp> {
        self.clock
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
    }

    /// The instant `lifetime` from now, for minting test tokens.
    pub fn after(&self, lifetime: Span) -> Timestamp {
        self.now() + lifetime
    }
}
