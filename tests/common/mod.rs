//! Shared utilities for integration tests.

use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;

use health_tracker::health::{register, Tracker, Warnable, WatcherHandle};
use parking_lot::Mutex;

static NEXT_ID: AtomicUsize = AtomicUsize::new(0);

/// Register a warnable whose code is unique within the test process.
pub fn unique_warnable(prefix: &str, configure: impl FnOnce(Warnable) -> Warnable) -> Arc<Warnable> {
    let id = NEXT_ID.fetch_add(1, Ordering::Relaxed);
    register(configure(Warnable::new(format!("{prefix}-{id:04}"))))
}

/// A transition as seen by a watcher: code and rendered text (None = healthy).
pub type Seen = (String, Option<String>);

/// Watcher that records every notification it receives.
#[allow(dead_code)]
pub fn record(tracker: &Tracker) -> (WatcherHandle, Arc<Mutex<Vec<Seen>>>) {
    let seen = Arc::new(Mutex::new(Vec::new()));
    let log = seen.clone();
    let handle = tracker.register_watcher(move |w, state| {
        log.lock().push((w.code.to_string(), state.map(|s| s.text.clone())));
    });
    (handle, seen)
}
