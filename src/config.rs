//! Configuration options for the session runtime

use oll_auth::MockLatency;
use oll_session::{StoreOptions, SESSION_TIMEOUT, SWEEP_INTERVAL};
use std::time::Duration;

/// Configuration options for [`crate::OllAuth`]
#[derive(Debug, Clone)]
pub struct SessionOptions {
    /// Inactivity window before a session expires
    pub session_timeout: Duration,

    /// Period of the background expiry sweep
    pub sweep_interval: Duration,

    /// Request timeout for the HTTP auth backend
    pub request_timeout: Option<Duration>,

    /// Simulated latency of the mock auth backend
    pub mock_latency: MockLatency,
}

impl Default for SessionOptions {
    fn default() -> Self {
        Self {
            session_timeout: SESSION_TIMEOUT,
            sweep_interval: SWEEP_INTERVAL,
            request_timeout: Some(Duration::from_secs(30)),
            mock_latency: MockLatency::default(),
        }
    }
}

impl SessionOptions {
    /// Set the inactivity timeout
    pub fn with_session_timeout(mut self, value: Duration) -> Self {
        self.session_timeout = value;
        self
    }

    /// Set the sweep period
    pub fn with_sweep_interval(mut self, value: Duration) -> Self {
        self.sweep_interval = value;
        self
    }

    /// Set the HTTP request timeout
    pub fn with_request_timeout(mut self, value: Option<Duration>) -> Self {
        self.request_timeout = value;
        self
    }

    /// Set the mock backend latency
    pub fn with_mock_latency(mut self, value: MockLatency) -> Self {
        self.mock_latency = value;
        self
    }

    pub(crate) fn store_options(&self) -> StoreOptions {
        StoreOptions::default()
            .with_session_timeout(self.session_timeout)
            .with_sweep_interval(self.sweep_interval)
    }
}
