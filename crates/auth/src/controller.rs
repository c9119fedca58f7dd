//! Application-facing authentication state

use log::{debug, info, trace, warn};
use oll_session::{ExpiredSession, ExpirySubscription, SessionStore, User};
use serde::Serialize;
use std::sync::{Arc, Mutex, MutexGuard, PoisonError, Weak};
use tokio::sync::broadcast;

use crate::activity::{ActivityKind, ActivitySource, ListenerId, TRACKED_ACTIVITY};
use crate::backend::AuthBackend;
use crate::error::{AuthError, Result};

/// Error shown after the sweep expired the session
pub const SESSION_EXPIRED_MESSAGE: &str = "Session expired. Please log in again.";

/// Snapshot of the controller state published to consumers
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct AuthState {
    pub user: Option<User>,
    pub is_loading: bool,
    pub error: Option<String>,
}

impl AuthState {
    pub fn is_authenticated(&self) -> bool {
        self.user.is_some()
    }
}

#[derive(Default)]
struct ControllerState {
    user: Option<User>,
    error: Option<String>,
    // Bumped by every login/signup start, logout and dispose.
    generation: u64,
    // Generation of the attempt currently shown as loading.
    pending: Option<u64>,
    bridge: Vec<ListenerId>,
    disposed: bool,
}

impl ControllerState {
    fn snapshot(&self) -> AuthState {
        AuthState {
            user: self.user.clone(),
            is_loading: self.pending.is_some(),
            error: self.error.clone(),
        }
    }
}

struct Shared {
    backend: Arc<dyn AuthBackend>,
    store: SessionStore,
    activity: Arc<dyn ActivitySource>,
    state: Mutex<ControllerState>,
    state_change: broadcast::Sender<AuthState>,
}

/// Login, signup and logout over a [`SessionStore`].
///
/// The controller mirrors the store's user into [`AuthState`], turns a swept
/// session into [`SESSION_EXPIRED_MESSAGE`], and while someone is logged in
/// forwards host activity to [`SessionStore::record_activity`].
pub struct AuthSessionController {
    shared: Arc<Shared>,
    expiry: Mutex<Option<ExpirySubscription>>,
}

impl AuthSessionController {
    /// Create a controller, seeding its user from any live session in `store`
    pub fn new(
        store: SessionStore,
        backend: Arc<dyn AuthBackend>,
        activity: Arc<dyn ActivitySource>,
    ) -> Self {
        let (state_change_tx, _) = broadcast::channel(16);
        let user = store.current_user();
        if let Some(ref user) = user {
            info!("Resuming session for {}", user.email);
        }

        let shared = Arc::new(Shared {
            backend,
            store,
            activity,
            state: Mutex::new(ControllerState {
                user,
                ..Default::default()
            }),
            state_change: state_change_tx,
        });

        {
            let mut state = shared.lock();
            shared.sync_bridge(&mut state);
        }

        let weak: Weak<Shared> = Arc::downgrade(&shared);
        let subscription = shared.store.subscribe(move |expired| {
            if let Some(shared) = weak.upgrade() {
                shared.handle_expiry(expired);
            }
        });

        Self {
            shared,
            expiry: Mutex::new(Some(subscription)),
        }
    }

    /// Log in through the backend and open a session for the returned user.
    ///
    /// On failure the error message becomes [`AuthState::error`] and the error
    /// is returned.
    pub async fn login(&self, email: &str, password: &str) -> Result<User> {
        info!("Logging in {}", email);
        let attempt = Attempt::begin(&self.shared);
        let result = self.shared.backend.login(email, password).await;
        attempt.finish(result)
    }

    /// Create an account through the backend and open a session for it
    pub async fn signup(&self, name: &str, email: &str, password: &str) -> Result<User> {
        info!("Signing up {}", email);
        let attempt = Attempt::begin(&self.shared);
        let result = self.shared.backend.signup(name, email, password).await;
        attempt.finish(result)
    }

    /// Forget the user and clear the session. Pending attempts become stale.
    pub fn logout(&self) {
        let mut state = self.shared.lock();
        if let Some(ref user) = state.user {
            info!("Logging out {}", user.email);
        }
        state.generation += 1;
        state.pending = None;
        state.user = None;
        state.error = None;
        self.shared.store.clear_session();
        self.shared.sync_bridge(&mut state);
        self.shared.publish(&state);
    }

    /// Re-read the store, picking up a session that was evicted on read elsewhere.
    ///
    /// Only a timed-out session shows [`SESSION_EXPIRED_MESSAGE`]; a session
    /// cleared through another handle to the store just logs the user out.
    pub fn refresh(&self) -> AuthState {
        let current = self.shared.store.current_user();
        let mut state = self.shared.lock();
        if state.user.is_some() && current.is_none() {
            if self.shared.store.last_expired().is_some() {
                debug!("Session expired in the store");
                state.error = Some(SESSION_EXPIRED_MESSAGE.to_string());
            } else {
                debug!("Session was cleared from the store");
            }
            state.user = None;
            self.shared.sync_bridge(&mut state);
            self.shared.publish(&state);
        }
        state.snapshot()
    }

    /// Current state snapshot
    pub fn state(&self) -> AuthState {
        self.shared.lock().snapshot()
    }

    pub fn user(&self) -> Option<User> {
        self.shared.lock().user.clone()
    }

    pub fn is_authenticated(&self) -> bool {
        self.shared.lock().user.is_some()
    }

    pub fn is_loading(&self) -> bool {
        self.shared.lock().pending.is_some()
    }

    pub fn error(&self) -> Option<String> {
        self.shared.lock().error.clone()
    }

    /// Receive a fresh [`AuthState`] on every change
    pub fn on_state_change(&self) -> broadcast::Receiver<AuthState> {
        self.shared.state_change.subscribe()
    }

    /// The store this controller drives
    pub fn session_store(&self) -> &SessionStore {
        &self.shared.store
    }

    /// Detach from the store and the activity source. The session is left as is.
    pub fn dispose(&self) {
        let subscription = self
            .expiry
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .take();
        let Some(subscription) = subscription else {
            return;
        };
        subscription.unsubscribe();

        let mut state = self.shared.lock();
        state.disposed = true;
        state.generation += 1;
        state.pending = None;
        self.shared.sync_bridge(&mut state);
        debug!("Auth controller disposed");
    }
}

impl Drop for AuthSessionController {
    fn drop(&mut self) {
        self.dispose();
    }
}

impl Shared {
    fn lock(&self) -> MutexGuard<'_, ControllerState> {
        self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }

    fn publish(&self, state: &ControllerState) {
        if self.state_change.send(state.snapshot()).is_err() {
            trace!("No auth state receivers");
        }
    }

    /// Listen for activity exactly while a user is present.
    fn sync_bridge(&self, state: &mut ControllerState) {
        let wanted = state.user.is_some() && !state.disposed;

        if wanted && state.bridge.is_empty() {
            for kind in TRACKED_ACTIVITY {
                let store = self.store.clone();
                let id = self.activity.add_listener(
                    kind,
                    Arc::new(move |_: ActivityKind| store.record_activity()),
                );
                state.bridge.push(id);
            }
            debug!("Activity bridge attached");
        } else if !wanted && !state.bridge.is_empty() {
            for id in state.bridge.drain(..) {
                self.activity.remove_listener(id);
            }
            debug!("Activity bridge detached");
        }
    }

    fn handle_expiry(&self, expired: &ExpiredSession) {
        let mut state = self.lock();
        if state.disposed {
            return;
        }
        info!("Session for {} expired", expired.user.email);
        state.user = None;
        state.error = Some(SESSION_EXPIRED_MESSAGE.to_string());
        self.sync_bridge(&mut state);
        self.publish(&state);
    }
}

/// An in-flight login or signup.
///
/// Dropping it before [`finish`](Attempt::finish) (for example when the caller's
/// future is cancelled) still clears the loading flag.
struct Attempt {
    shared: Arc<Shared>,
    generation: u64,
}

impl Attempt {
    fn begin(shared: &Arc<Shared>) -> Self {
        let mut state = shared.lock();
        state.generation += 1;
        state.pending = Some(state.generation);
        state.error = None;
        shared.publish(&state);

        Self {
            shared: shared.clone(),
            generation: state.generation,
        }
    }

    fn finish(self, result: Result<User>) -> Result<User> {
        let shared = &self.shared;
        let mut state = shared.lock();

        if state.generation != self.generation || state.disposed {
            warn!("Discarding stale authentication result");
            return match result {
                Ok(_) => Err(AuthError::Superseded),
                Err(err) => Err(err),
            };
        }

        state.pending = None;
        match result {
            Ok(user) => {
                info!("Authenticated {}", user.email);
                state.user = Some(user.clone());
                shared.store.open_session(user.clone());
                shared.sync_bridge(&mut state);
                shared.publish(&state);
                Ok(user)
            }
            Err(err) => {
                info!("Authentication failed: {}", err);
                state.error = Some(err.to_string());
                shared.publish(&state);
                Err(err)
            }
        }
    }
}

impl Drop for Attempt {
    fn drop(&mut self) {
        let mut state = self.shared.lock();
        if state.pending == Some(self.generation) {
            state.pending = None;
            self.shared.publish(&state);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::activity::ActivityHub;
    use crate::backend::{MockAuthBackend, MockLatency};
    use std::time::Duration;
    use tokio::time;

    fn minutes(n: u64) -> Duration {
        Duration::from_secs(n * 60)
    }

    fn setup(latency: MockLatency) -> (Arc<AuthSessionController>, Arc<ActivityHub>) {
        let hub = Arc::new(ActivityHub::new());
        let controller = AuthSessionController::new(
            SessionStore::new(),
            Arc::new(MockAuthBackend::with_latency(latency)),
            hub.clone(),
        );
        (Arc::new(controller), hub)
    }

    async fn settle() {
        for _ in 0..8 {
            tokio::task::yield_now().await;
        }
    }

    #[tokio::test(start_paused = true)]
    async fn test_login_success() {
        let (controller, _hub) = setup(MockLatency::none());
        let user = controller
            .login("john@example.com", "password123")
            .await
            .unwrap();

        let state = controller.state();
        assert_eq!(state.user, Some(user.clone()));
        assert!(state.is_authenticated());
        assert!(!state.is_loading);
        assert_eq!(state.error, None);
        assert_eq!(controller.session_store().current_user(), Some(user));
    }

    #[tokio::test(start_paused = true)]
    async fn test_login_failure_sets_error() {
        let (controller, _hub) = setup(MockLatency::none());
        let err = controller.login("bad@x.com", "wrong").await.unwrap_err();

        assert!(matches!(err, AuthError::InvalidCredentials));
        assert_eq!(controller.error(), Some(err.to_string()));
        assert!(!controller.is_loading());
        assert!(!controller.is_authenticated());
    }

    #[tokio::test(start_paused = true)]
    async fn test_loading_while_pending() {
        let (controller, _hub) = setup(MockLatency::default());
        let task = {
            let controller = controller.clone();
            tokio::spawn(async move { controller.login("jane@example.com", "password456").await })
        };
        settle().await;
        assert!(controller.is_loading());

        task.await.unwrap().unwrap();
        assert!(!controller.is_loading());
        assert!(controller.is_authenticated());
    }

    #[tokio::test(start_paused = true)]
    async fn test_cancelled_login_clears_loading() {
        let (controller, _hub) = setup(MockLatency::default());
        let outcome = time::timeout(
            Duration::from_millis(500),
            controller.login("john@example.com", "password123"),
        )
        .await;

        assert!(outcome.is_err());
        assert!(!controller.is_loading());
        assert!(!controller.is_authenticated());
    }

    #[tokio::test(start_paused = true)]
    async fn test_new_attempt_clears_previous_error() {
        let (controller, _hub) = setup(MockLatency::none());
        let _ = controller.login("john@example.com", "nope").await;
        assert!(controller.error().is_some());

        controller
            .login("john@example.com", "password123")
            .await
            .unwrap();
        assert_eq!(controller.error(), None);
    }

    #[tokio::test(start_paused = true)]
    async fn test_logout_during_pending_login() {
        let (controller, _hub) = setup(MockLatency::default());
        let task = {
            let controller = controller.clone();
            tokio::spawn(async move { controller.login("john@example.com", "password123").await })
        };
        settle().await;

        controller.logout();
        let result = task.await.unwrap();

        assert!(matches!(result, Err(AuthError::Superseded)));
        assert_eq!(controller.state(), AuthState::default());
        assert_eq!(controller.session_store().current_user(), None);
    }

    #[tokio::test(start_paused = true)]
    async fn test_failed_login_after_logout_keeps_error_clear() {
        let (controller, _hub) = setup(MockLatency::default());
        let task = {
            let controller = controller.clone();
            tokio::spawn(async move { controller.login("bad@x.com", "wrong").await })
        };
        settle().await;
        assert!(controller.is_loading());

        controller.logout();
        let result = task.await.unwrap();

        assert!(matches!(result, Err(AuthError::InvalidCredentials)));
        assert_eq!(controller.state(), AuthState::default());
    }

    #[tokio::test(start_paused = true)]
    async fn test_dispose_during_pending_login() {
        let (controller, hub) = setup(MockLatency::default());
        let task = {
            let controller = controller.clone();
            tokio::spawn(async move { controller.login("john@example.com", "password123").await })
        };
        settle().await;

        controller.dispose();
        let result = task.await.unwrap();

        assert!(matches!(result, Err(AuthError::Superseded)));
        assert!(!controller.is_loading());
        assert!(!controller.is_authenticated());
        assert_eq!(controller.session_store().current_user(), None);
        assert_eq!(hub.listener_count(), 0);
    }

    #[tokio::test(start_paused = true)]
    async fn test_later_attempt_wins() {
        let hub = Arc::new(ActivityHub::new());
        let backend = Arc::new(MockAuthBackend::with_latency(MockLatency {
            login: Duration::from_millis(1000),
            signup: Duration::from_millis(100),
        }));
        let controller = Arc::new(AuthSessionController::new(
            SessionStore::new(),
            backend,
            hub,
        ));

        let slow = {
            let controller = controller.clone();
            tokio::spawn(async move { controller.login("john@example.com", "password123").await })
        };
        settle().await;
        let fresh = controller
            .signup("Ann", "ann@example.com", "pw")
            .await
            .unwrap();

        assert!(matches!(slow.await.unwrap(), Err(AuthError::Superseded)));
        assert_eq!(controller.user(), Some(fresh.clone()));
        assert_eq!(controller.session_store().current_user(), Some(fresh));
    }

    #[tokio::test(start_paused = true)]
    async fn test_expiry_resets_state() {
        let (controller, hub) = setup(MockLatency::none());
        controller
            .login("john@example.com", "password123")
            .await
            .unwrap();
        assert_eq!(hub.listener_count(), TRACKED_ACTIVITY.len());

        time::sleep(minutes(35)).await;
        settle().await;

        let state = controller.state();
        assert_eq!(state.user, None);
        assert_eq!(state.error.as_deref(), Some(SESSION_EXPIRED_MESSAGE));
        assert_eq!(hub.listener_count(), 0);
    }

    #[tokio::test(start_paused = true)]
    async fn test_activity_keeps_session_alive() {
        let (controller, hub) = setup(MockLatency::none());
        controller
            .login("john@example.com", "password123")
            .await
            .unwrap();

        for kind in [
            ActivityKind::PointerDown,
            ActivityKind::KeyDown,
            ActivityKind::Scroll,
            ActivityKind::TouchStart,
        ] {
            time::sleep(minutes(20)).await;
            hub.emit(kind);
        }
        settle().await;

        assert!(controller.is_authenticated());
        assert_eq!(controller.session_store().time_remaining(), minutes(30));
    }

    #[tokio::test(start_paused = true)]
    async fn test_untracked_activity_ignored() {
        let (controller, hub) = setup(MockLatency::none());
        controller
            .login("john@example.com", "password123")
            .await
            .unwrap();

        time::sleep(minutes(10)).await;
        hub.emit(ActivityKind::PointerMove);
        assert_eq!(controller.session_store().time_remaining(), minutes(20));
    }

    #[tokio::test(start_paused = true)]
    async fn test_logout_detaches_bridge() {
        let (controller, hub) = setup(MockLatency::none());
        controller
            .login("john@example.com", "password123")
            .await
            .unwrap();
        controller.logout();

        assert_eq!(hub.listener_count(), 0);
        assert!(!controller.is_authenticated());
        assert_eq!(controller.session_store().current_user(), None);
    }

    #[tokio::test(start_paused = true)]
    async fn test_resumes_existing_session() {
        let store = SessionStore::new();
        let john = User::new("1", "John Doe", "john@example.com");
        store.open_session(john.clone());

        let hub = Arc::new(ActivityHub::new());
        let controller = AuthSessionController::new(
            store,
            Arc::new(MockAuthBackend::with_latency(MockLatency::none())),
            hub.clone(),
        );

        assert_eq!(controller.user(), Some(john));
        assert_eq!(hub.listener_count(), TRACKED_ACTIVITY.len());
    }

    #[tokio::test(start_paused = true)]
    async fn test_refresh_picks_up_lazy_eviction() {
        let store = SessionStore::with_options(
            oll_session::StoreOptions::default().with_sweep_interval(minutes(60)),
        );
        let controller = AuthSessionController::new(
            store,
            Arc::new(MockAuthBackend::with_latency(MockLatency::none())),
            Arc::new(ActivityHub::new()),
        );
        controller
            .login("john@example.com", "password123")
            .await
            .unwrap();

        time::advance(minutes(31)).await;
        assert_eq!(controller.session_store().current_user(), None);
        assert!(controller.is_authenticated());

        let state = controller.refresh();
        assert!(!state.is_authenticated());
        assert_eq!(state.error.as_deref(), Some(SESSION_EXPIRED_MESSAGE));
    }

    #[tokio::test(start_paused = true)]
    async fn test_refresh_after_external_clear() {
        let (controller, hub) = setup(MockLatency::none());
        controller
            .login("john@example.com", "password123")
            .await
            .unwrap();

        controller.session_store().clear_session();

        let state = controller.refresh();
        assert!(!state.is_authenticated());
        assert_eq!(state.error, None);
        assert_eq!(hub.listener_count(), 0);
    }

    #[tokio::test(start_paused = true)]
    async fn test_state_changes_are_published() {
        let (controller, _hub) = setup(MockLatency::none());
        let mut changes = controller.on_state_change();

        controller
            .login("jane@example.com", "password456")
            .await
            .unwrap();
        controller.logout();

        let loading = changes.recv().await.unwrap();
        assert!(loading.is_loading);
        let done = changes.recv().await.unwrap();
        assert!(done.is_authenticated());
        assert!(!done.is_loading);
        let out = changes.recv().await.unwrap();
        assert_eq!(out, AuthState::default());
    }

    #[tokio::test(start_paused = true)]
    async fn test_dispose_detaches_everything() {
        let (controller, hub) = setup(MockLatency::none());
        controller
            .login("john@example.com", "password123")
            .await
            .unwrap();
        let store = controller.session_store().clone();
        assert_eq!(store.listener_count(), 1);

        controller.dispose();
        controller.dispose();

        assert_eq!(store.listener_count(), 0);
        assert_eq!(hub.listener_count(), 0);
        assert!(store.is_valid());
    }

    #[test]
    fn test_auth_state_json() {
        let state = AuthState {
            user: Some(User::new("2", "Jane Smith", "jane@example.com")),
            is_loading: false,
            error: None,
        };
        assert_eq!(
            serde_json::to_value(&state).unwrap(),
            serde_json::json!({
                "user": {"id": "2", "name": "Jane Smith", "email": "jane@example.com"},
                "is_loading": false,
                "error": null
            })
        );
    }
}
