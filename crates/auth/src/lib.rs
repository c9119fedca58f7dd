//! Authentication for the OLL CRM client
//!
//! This crate provides the login/signup/logout surface on top of
//! [`oll_session::SessionStore`], the [`AuthBackend`] capability with a mock and
//! an HTTP implementation, and the bridge that turns host activity into session
//! renewals.

mod activity;
mod backend;
mod controller;
mod error;
mod http;

pub use activity::{
    ActivityHub, ActivityKind, ActivityListener, ActivitySource, ListenerId, TRACKED_ACTIVITY,
};
pub use backend::{AuthBackend, MockAuthBackend, MockLatency};
pub use controller::{AuthSessionController, AuthState, SESSION_EXPIRED_MESSAGE};
pub use error::{AuthError, Result};
pub use http::HttpAuthBackend;
pub use oll_session::User;
