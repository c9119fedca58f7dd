//! Session record and store options

use serde::{Deserialize, Serialize};
use std::time::Duration;
use tokio::time::Instant;

/// Inactivity window after which a session is no longer valid.
pub const SESSION_TIMEOUT: Duration = Duration::from_secs(30 * 60);

/// Period of the background expiry sweep.
pub const SWEEP_INTERVAL: Duration = Duration::from_secs(5 * 60);

/// Authenticated user identity
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct User {
    /// The user ID
    pub id: String,

    /// Display name
    pub name: String,

    /// The user's email address
    pub email: String,
}

impl User {
    /// Create a new user record
    pub fn new(id: impl Into<String>, name: impl Into<String>, email: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            name: name.into(),
            email: email.into(),
        }
    }
}

/// The single live session held by a [`crate::SessionStore`]
#[derive(Debug, Clone)]
pub struct Session {
    user: User,
    last_activity_at: Instant,
    expires_at: Instant,
}

impl Session {
    pub(crate) fn new(user: User, now: Instant, timeout: Duration) -> Self {
        Self {
            user,
            last_activity_at: now,
            expires_at: now + timeout,
        }
    }

    /// Renew the whole inactivity window from `now`.
    pub(crate) fn touch(&mut self, now: Instant, timeout: Duration) {
        self.last_activity_at = now;
        self.expires_at = now + timeout;
    }

    /// The user this session belongs to
    pub fn user(&self) -> &User {
        &self.user
    }

    /// When activity was last recorded
    pub fn last_activity_at(&self) -> Instant {
        self.last_activity_at
    }

    /// When the session stops being valid
    pub fn expires_at(&self) -> Instant {
        self.expires_at
    }

    /// Expired means strictly past `expires_at`; the boundary instant is still valid.
    pub fn is_expired_at(&self, now: Instant) -> bool {
        now > self.expires_at
    }

    /// Time left before expiry, saturating at zero
    pub fn remaining_at(&self, now: Instant) -> Duration {
        self.expires_at.saturating_duration_since(now)
    }
}

/// Notification delivered to expiry listeners when the sweep evicts a session
#[derive(Debug, Clone)]
pub struct ExpiredSession {
    /// The user whose session expired
    pub user: User,

    /// The expiry instant that was exceeded
    pub expired_at: Instant,
}

/// Timing options for a [`crate::SessionStore`]
#[derive(Debug, Clone)]
pub struct StoreOptions {
    /// Inactivity timeout
    pub session_timeout: Duration,

    /// Background sweep period
    pub sweep_interval: Duration,
}

impl Default for StoreOptions {
    fn default() -> Self {
        Self {
            session_timeout: SESSION_TIMEOUT,
            sweep_interval: SWEEP_INTERVAL,
        }
    }
}

impl StoreOptions {
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
}
