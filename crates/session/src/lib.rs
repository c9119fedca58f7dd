//! Session lifecycle for the OLL CRM client
//!
//! This crate holds the single authenticated session of a client, renews it on
//! user activity, and expires it after a period of inactivity. Expiry is
//! detected lazily on read and by a periodic background sweep that notifies
//! registered listeners.

mod session;
mod store;

pub use session::{ExpiredSession, Session, StoreOptions, User, SESSION_TIMEOUT, SWEEP_INTERVAL};
pub use store::{ExpiryListener, ExpirySubscription, SessionStore};
