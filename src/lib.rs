//! OLL CRM client session runtime
//!
//! Composition root for the client-side authentication flow: one
//! [`SessionStore`] holding the current session, an [`AuthSessionController`]
//! exposing login/signup/logout, and an [`ActivitySource`] reporting user
//! interaction events. The bundled [`ActivityHub`] serves as that source
//! when the host has none of its own.

pub mod config;
pub mod error;

use log::{debug, info};
use oll_auth::{
    ActivityHub, ActivitySource, AuthBackend, AuthSessionController, HttpAuthBackend,
    MockAuthBackend,
};
use oll_session::SessionStore;
use reqwest::Client;
use std::sync::Arc;

use crate::config::SessionOptions;
use crate::error::Result;

/// The application's single authentication context
pub struct OllAuth {
    store: SessionStore,
    controller: AuthSessionController,
    activity: Arc<dyn ActivitySource>,
    // Set when this context created its own hub.
    hub: Option<Arc<ActivityHub>>,
    options: SessionOptions,
}

impl OllAuth {
    /// Wire a store and controller around `backend`, listening to `activity`
    ///
    /// # Example
    ///
    /// ```
    /// use std::sync::Arc;
    /// use oll_crm_session::{OllAuth, config::SessionOptions};
    /// use oll_auth::{ActivityHub, MockAuthBackend};
    ///
    /// let auth = OllAuth::new(
    ///     Arc::new(MockAuthBackend::new()),
    ///     Arc::new(ActivityHub::new()),
    ///     SessionOptions::default(),
    /// );
    /// assert!(!auth.controller().is_authenticated());
    /// assert!(auth.activity_hub().is_none());
    /// ```
    pub fn new(
        backend: Arc<dyn AuthBackend>,
        activity: Arc<dyn ActivitySource>,
        options: SessionOptions,
    ) -> Self {
        let store = SessionStore::with_options(options.store_options());
        let controller = AuthSessionController::new(store.clone(), backend, activity.clone());
        debug!(
            "Auth context ready (timeout {:?}, sweep every {:?})",
            options.session_timeout, options.sweep_interval
        );

        Self {
            store,
            controller,
            activity,
            hub: None,
            options,
        }
    }

    fn with_hub(backend: Arc<dyn AuthBackend>, options: SessionOptions) -> Self {
        let hub = Arc::new(ActivityHub::new());
        let mut auth = Self::new(backend, hub.clone(), options);
        auth.hub = Some(hub);
        auth
    }

    /// Use the in-memory demo backend and a fresh [`ActivityHub`]
    pub fn with_mock_backend(options: SessionOptions) -> Self {
        let backend = MockAuthBackend::with_latency(options.mock_latency.clone());
        Self::with_hub(Arc::new(backend), options)
    }

    /// Use a remote auth API rooted at `base_url` and a fresh [`ActivityHub`]
    pub fn with_http_backend(base_url: &str, options: SessionOptions) -> Result<Self> {
        let mut builder = Client::builder();
        if let Some(timeout) = options.request_timeout {
            builder = builder.timeout(timeout);
        }
        let backend = HttpAuthBackend::new(base_url, builder.build()?)?;
        info!("Using auth API at {}", base_url);
        Ok(Self::with_hub(Arc::new(backend), options))
    }

    /// The session store
    pub fn session_store(&self) -> &SessionStore {
        &self.store
    }

    /// The login/signup/logout surface
    pub fn controller(&self) -> &AuthSessionController {
        &self.controller
    }

    /// The activity source the controller listens to
    pub fn activity(&self) -> &Arc<dyn ActivitySource> {
        &self.activity
    }

    /// The hub to feed with activity, when this context created one
    pub fn activity_hub(&self) -> Option<&Arc<ActivityHub>> {
        self.hub.as_ref()
    }

    /// Options this context was built with
    pub fn options(&self) -> &SessionOptions {
        &self.options
    }

    /// Detach the controller and stop the sweep
    pub fn dispose(&self) {
        self.controller.dispose();
        self.store.dispose();
        info!("Auth context disposed");
    }
}

/// A convenience module for common imports
pub mod prelude {
    pub use crate::config::SessionOptions;
    pub use crate::error::Error;
    pub use crate::OllAuth;
    pub use oll_auth::{ActivityKind, AuthError, AuthState, SESSION_EXPIRED_MESSAGE};
    pub use oll_session::User;
}
