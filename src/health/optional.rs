//! Operations on a tracker that may be absent.
//!
//! Subsystems that were constructed without a tracker hold
//! `Option<&Tracker>` (or `Option<Arc<Tracker>>`, via `as_deref()`). Every
//! operation is defined on that option: reads return empty results, writes
//! do nothing.

use std::sync::Arc;

use tokio::sync::mpsc;

use crate::error::HealthError;
use crate::health::state::{HealthChange, State, UnhealthyState};
use crate::health::tracker::Tracker;
use crate::health::warnable::{Args, Warnable};
use crate::health::watcher::WatcherHandle;

/// The full tracker surface, tolerant of a missing tracker.
pub trait OptionalTracker {
    fn set_unhealthy(&self, warnable: &Arc<Warnable>, args: Args);
    fn set_healthy(&self, warnable: &Warnable);
    fn is_unhealthy(&self, warnable: &Warnable) -> bool;
    fn set_ipn_state(&self, state: &str, want_running: bool);
    fn ipn_state(&self) -> String;
    fn strings(&self) -> Vec<String>;
    fn current_state(&self) -> State;
    fn overall_error(&self) -> Result<(), HealthError>;
    fn append_warnable_debug_flags(&self, dst: &mut Vec<String>);
    fn register_watcher<F>(&self, f: F) -> WatcherHandle
    where
        F: Fn(&Warnable, Option<&UnhealthyState>) + Send + Sync + 'static;
    fn unregister_watcher(&self, handle: WatcherHandle) -> bool;
    fn watcher_count(&self) -> usize;
    fn subscribe(&self) -> (WatcherHandle, mpsc::UnboundedReceiver<HealthChange>);
}

impl OptionalTracker for Option<&Tracker> {
    fn set_unhealthy(&self, warnable: &Arc<Warnable>, args: Args) {
        if let Some(t) = self {
            t.set_unhealthy(warnable, args);
        }
    }

    fn set_healthy(&self, warnable: &Warnable) {
        if let Some(t) = self {
            t.set_healthy(warnable);
        }
    }

    fn is_unhealthy(&self, warnable: &Warnable) -> bool {
        self.is_some_and(|t| t.is_unhealthy(warnable))
    }

    fn set_ipn_state(&self, state: &str, want_running: bool) {
        if let Some(t) = self {
            t.set_ipn_state(state, want_running);
        }
    }

    fn ipn_state(&self) -> String {
        self.map(Tracker::ipn_state).unwrap_or_default()
    }

    fn strings(&self) -> Vec<String> {
        self.map(Tracker::strings).unwrap_or_default()
    }

    fn current_state(&self) -> State {
        self.map(Tracker::current_state).unwrap_or_default()
    }

    fn overall_error(&self) -> Result<(), HealthError> {
        self.map_or(Ok(()), Tracker::overall_error)
    }

    fn append_warnable_debug_flags(&self, dst: &mut Vec<String>) {
        if let Some(t) = self {
            t.append_warnable_debug_flags(dst);
        }
    }

    fn register_watcher<F>(&self, f: F) -> WatcherHandle
    where
        F: Fn(&Warnable, Option<&UnhealthyState>) + Send + Sync + 'static,
    {
        match self {
            Some(t) => t.register_watcher(f),
            None => WatcherHandle::INERT,
        }
    }

    fn unregister_watcher(&self, handle: WatcherHandle) -> bool {
        self.is_some_and(|t| t.unregister_watcher(handle))
    }

    fn watcher_count(&self) -> usize {
        self.map_or(0, Tracker::watcher_count)
    }

    fn subscribe(&self) -> (WatcherHandle, mpsc::UnboundedReceiver<HealthChange>) {
        match self {
            Some(t) => t.subscribe(),
            None => {
                // Sender dropped immediately: the receiver reports closure.
                let (_, rx) = mpsc::unbounded_channel();
                (WatcherHandle::INERT, rx)
            }
        }
    }
}
