//! The session store and its expiry sweep

use log::{debug, info, warn};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError, Weak};
use std::time::Duration;
use tokio::runtime::Handle;
use tokio::task::JoinHandle;
use tokio::time::{self, Instant, MissedTickBehavior};

use crate::session::{ExpiredSession, Session, StoreOptions, User};

/// Callback invoked when the sweep evicts an expired session
pub type ExpiryListener = Arc<dyn Fn(&ExpiredSession) + Send + Sync>;

/// Owner of the single current session.
///
/// Cloning yields another handle to the same store. The store is meant to be
/// built once by the application root and handed to whatever needs it.
#[derive(Clone)]
pub struct SessionStore {
    inner: Arc<StoreInner>,
}

struct StoreInner {
    options: StoreOptions,
    state: Mutex<StoreState>,
    listeners: Mutex<ListenerRegistry>,
}

#[derive(Default)]
struct StoreState {
    session: Option<Session>,
    sweep: Option<JoinHandle<()>>,
    // Bumped whenever the session is replaced or dropped; a sweep task only
    // acts on the epoch it was started for.
    epoch: u64,
    // Last session removed for timing out; reset by open and clear.
    last_expired: Option<ExpiredSession>,
}

#[derive(Default)]
struct ListenerRegistry {
    next_id: u64,
    entries: Vec<(u64, ExpiryListener)>,
    // Listener installed through `on_expire`, replaced on each call.
    slot: Option<u64>,
}

fn lock<T>(mutex: &Mutex<T>) -> MutexGuard<'_, T> {
    mutex.lock().unwrap_or_else(PoisonError::into_inner)
}

impl SessionStore {
    /// Create a store with the default 30 minute timeout and 5 minute sweep
    pub fn new() -> Self {
        Self::with_options(StoreOptions::default())
    }

    /// Create a store with custom timing
    pub fn with_options(options: StoreOptions) -> Self {
        Self {
            inner: Arc::new(StoreInner {
                options,
                state: Mutex::new(StoreState::default()),
                listeners: Mutex::new(ListenerRegistry::default()),
            }),
        }
    }

    /// The timing options this store was built with
    pub fn options(&self) -> &StoreOptions {
        &self.inner.options
    }

    /// Replace any existing session with a fresh one for `user` and restart the sweep.
    pub fn open_session(&self, user: User) {
        let now = Instant::now();
        let mut state = lock(&self.inner.state);

        if let Some(previous) = state.session.as_ref() {
            debug!("Replacing session for {}", previous.user().email);
        }
        info!("Opening session for {}", user.email);

        state.session = Some(Session::new(user, now, self.inner.options.session_timeout));
        state.last_expired = None;
        state.epoch += 1;
        if let Some(sweep) = state.sweep.take() {
            sweep.abort();
        }
        state.sweep = self.spawn_sweep(state.epoch);
    }

    /// The current user, evicting the session first if it has already expired.
    ///
    /// Lazy eviction does not notify expiry listeners.
    pub fn current_user(&self) -> Option<User> {
        let now = Instant::now();
        let mut state = lock(&self.inner.state);

        let expired = match state.session.as_ref() {
            None => return None,
            Some(session) => session.is_expired_at(now),
        };

        if expired {
            let evicted = state.session.as_ref().map(|session| {
                info!("Session for {} expired, evicting on read", session.user().email);
                ExpiredSession {
                    user: session.user().clone(),
                    expired_at: session.expires_at(),
                }
            });
            state.drop_session();
            state.last_expired = evicted;
            return None;
        }

        state.session.as_ref().map(|session| session.user().clone())
    }

    /// Renew the inactivity window. Does nothing without a session.
    pub fn record_activity(&self) {
        let now = Instant::now();
        let timeout = self.inner.options.session_timeout;
        let mut state = lock(&self.inner.state);

        if let Some(session) = state.session.as_mut() {
            session.touch(now, timeout);
            debug!("Activity recorded for {}", session.user().email);
        }
    }

    /// Drop the session, if any, and stop the sweep
    pub fn clear_session(&self) {
        let mut state = lock(&self.inner.state);
        if let Some(session) = state.session.as_ref() {
            info!("Clearing session for {}", session.user().email);
        }
        state.drop_session();
        state.last_expired = None;
    }

    /// Whether a session exists and has not passed its expiry. Never evicts.
    pub fn is_valid(&self) -> bool {
        let now = Instant::now();
        let state = lock(&self.inner.state);
        state
            .session
            .as_ref()
            .map(|session| !session.is_expired_at(now))
            .unwrap_or(false)
    }

    /// Time until expiry, zero when there is no session
    pub fn time_remaining(&self) -> Duration {
        let now = Instant::now();
        let state = lock(&self.inner.state);
        state
            .session
            .as_ref()
            .map(|session| session.remaining_at(now))
            .unwrap_or(Duration::ZERO)
    }

    /// Copy of the current session record without any eviction
    pub fn snapshot(&self) -> Option<Session> {
        lock(&self.inner.state).session.clone()
    }

    /// The session most recently removed for timing out, by the sweep or on read.
    ///
    /// Reset when a session is opened or cleared.
    pub fn last_expired(&self) -> Option<ExpiredSession> {
        lock(&self.inner.state).last_expired.clone()
    }

    /// Register an expiry listener. Dropping the returned handle removes it.
    pub fn subscribe<F>(&self, listener: F) -> ExpirySubscription
    where
        F: Fn(&ExpiredSession) + Send + Sync + 'static,
    {
        let id = lock(&self.inner.listeners).insert(Arc::new(listener));
        debug!("Expiry listener {} registered", id);
        ExpirySubscription {
            store: Arc::downgrade(&self.inner),
            id: Some(id),
        }
    }

    /// Install the single-slot expiry callback, replacing the previous one
    /// installed this way. Listeners added through [`subscribe`](Self::subscribe)
    /// are unaffected.
    pub fn on_expire<F>(&self, listener: F)
    where
        F: Fn(&ExpiredSession) + Send + Sync + 'static,
    {
        let mut listeners = lock(&self.inner.listeners);
        if let Some(previous) = listeners.slot.take() {
            listeners.remove(previous);
        }
        let id = listeners.insert(Arc::new(listener));
        listeners.slot = Some(id);
    }

    /// Number of registered expiry listeners
    pub fn listener_count(&self) -> usize {
        lock(&self.inner.listeners).entries.len()
    }

    /// Stop the sweep and drop every expiry listener. The session itself is kept.
    pub fn dispose(&self) {
        {
            let mut state = lock(&self.inner.state);
            if let Some(sweep) = state.sweep.take() {
                sweep.abort();
            }
        }
        let mut listeners = lock(&self.inner.listeners);
        listeners.entries.clear();
        listeners.slot = None;
        debug!("Session store disposed");
    }

    fn spawn_sweep(&self, epoch: u64) -> Option<JoinHandle<()>> {
        let period = self.inner.options.sweep_interval;
        if period.is_zero() {
            warn!("Sweep interval is zero, expiry sweep disabled");
            return None;
        }

        let runtime = match Handle::try_current() {
            Ok(runtime) => runtime,
            Err(_) => {
                warn!("No async runtime available, expiry sweep not started");
                return None;
            }
        };

        let start = Instant::now() + period;
        let store = Arc::downgrade(&self.inner);
        Some(runtime.spawn(async move {
            let mut ticker = time::interval_at(start, period);
            ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);

            loop {
                ticker.tick().await;
                let Some(inner) = store.upgrade() else {
                    break;
                };
                match inner.sweep(epoch) {
                    SweepOutcome::Alive => debug!("Sweep tick: session still valid"),
                    SweepOutcome::Stale => break,
                    SweepOutcome::Expired(expired) => {
                        inner.notify(&expired);
                        break;
                    }
                }
            }
        }))
    }
}

impl Default for SessionStore {
    fn default() -> Self {
        Self::new()
    }
}

enum SweepOutcome {
    Alive,
    Stale,
    Expired(ExpiredSession),
}

impl StoreState {
    fn drop_session(&mut self) {
        self.session = None;
        self.epoch += 1;
        if let Some(sweep) = self.sweep.take() {
            sweep.abort();
        }
    }
}

impl StoreInner {
    fn sweep(&self, epoch: u64) -> SweepOutcome {
        let now = Instant::now();
        let mut state = lock(&self.state);

        if state.epoch != epoch {
            return SweepOutcome::Stale;
        }

        let expired = match state.session.as_ref() {
            None => return SweepOutcome::Stale,
            Some(session) if session.is_expired_at(now) => ExpiredSession {
                user: session.user().clone(),
                expired_at: session.expires_at(),
            },
            Some(_) => return SweepOutcome::Alive,
        };

        info!("Session for {} expired, sweeping", expired.user.email);
        state.session = None;
        state.last_expired = Some(expired.clone());
        state.epoch += 1;
        // The running task is this sweep; it exits on its own.
        state.sweep = None;
        SweepOutcome::Expired(expired)
    }

    fn notify(&self, expired: &ExpiredSession) {
        let listeners: Vec<ExpiryListener> = lock(&self.listeners)
            .entries
            .iter()
            .map(|(_, listener)| listener.clone())
            .collect();

        debug!("Notifying {} expiry listener(s)", listeners.len());
        for listener in listeners {
            listener(expired);
        }
    }
}

impl ListenerRegistry {
    fn insert(&mut self, listener: ExpiryListener) -> u64 {
        let id = self.next_id;
        self.next_id += 1;
        self.entries.push((id, listener));
        id
    }

    fn remove(&mut self, id: u64) -> bool {
        let before = self.entries.len();
        self.entries.retain(|(entry, _)| *entry != id);
        if self.slot == Some(id) {
            self.slot = None;
        }
        self.entries.len() != before
    }
}

/// Handle to a listener registered with [`SessionStore::subscribe`]
#[must_use = "dropping the subscription removes the listener"]
pub struct ExpirySubscription {
    store: Weak<StoreInner>,
    id: Option<u64>,
}

impl ExpirySubscription {
    /// Remove the listener now
    pub fn unsubscribe(mut self) {
        self.release();
    }

    fn release(&mut self) {
        let Some(id) = self.id.take() else {
            return;
        };
        if let Some(store) = self.store.upgrade() {
            if lock(&store.listeners).remove(id) {
                debug!("Expiry listener {} removed", id);
            }
        }
    }
}

impl Drop for ExpirySubscription {
    fn drop(&mut self) {
        self.release();
    }
}

impl std::fmt::Debug for ExpirySubscription {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ExpirySubscription").field("id", &self.id).finish()
    }
}
