//! User activity signals

use log::trace;
use std::sync::{Arc, Mutex, PoisonError};

/// Kinds of user interaction a host can report
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ActivityKind {
    PointerDown,
    KeyDown,
    Scroll,
    TouchStart,
    PointerMove,
}

/// Interactions that keep a session alive
pub const TRACKED_ACTIVITY: [ActivityKind; 4] = [
    ActivityKind::PointerDown,
    ActivityKind::KeyDown,
    ActivityKind::Scroll,
    ActivityKind::TouchStart,
];

/// Identifier of a registered activity listener
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct ListenerId(u64);

pub type ActivityListener = Arc<dyn Fn(ActivityKind) + Send + Sync>;

/// Source of user activity events provided by the host environment
pub trait ActivitySource: Send + Sync {
    /// Call `listener` whenever an event of `kind` happens
    fn add_listener(&self, kind: ActivityKind, listener: ActivityListener) -> ListenerId;

    /// Stop calling the listener registered under `id`
    fn remove_listener(&self, id: ListenerId);
}

#[derive(Default)]
struct HubState {
    next_id: u64,
    listeners: Vec<(ListenerId, ActivityKind, ActivityListener)>,
}

/// In-process [`ActivitySource`] fed by the host through [`emit`](ActivityHub::emit)
#[derive(Default)]
pub struct ActivityHub {
    state: Mutex<HubState>,
}

impl ActivityHub {
    pub fn new() -> Self {
        Self::default()
    }

    /// Dispatch an event to every listener registered for its kind
    pub fn emit(&self, kind: ActivityKind) {
        let targets: Vec<ActivityListener> = self
            .state
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .listeners
            .iter()
            .filter(|(_, registered, _)| *registered == kind)
            .map(|(_, _, listener)| listener.clone())
            .collect();

        trace!("{:?} -> {} listener(s)", kind, targets.len());
        for listener in targets {
            listener(kind);
        }
    }

    /// Number of registered listeners
    pub fn listener_count(&self) -> usize {
        self.state
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .listeners
            .len()
    }
}

impl ActivitySource for ActivityHub {
    fn add_listener(&self, kind: ActivityKind, listener: ActivityListener) -> ListenerId {
        let mut state = self.state.lock().unwrap_or_else(PoisonError::into_inner);
        let id = ListenerId(state.next_id);
        state.next_id += 1;
        state.listeners.push((id, kind, listener));
        id
    }

    fn remove_listener(&self, id: ListenerId) {
        let mut state = self.state.lock().unwrap_or_else(PoisonError::into_inner);
        state.listeners.retain(|(registered, _, _)| *registered != id);
    }
}
