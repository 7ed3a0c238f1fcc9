//! Per-instance health tracker.
//!
//! # Responsibilities
//! - Store the current [`UnhealthyState`] of every unhealthy warnable
//! - Suppress startup-sensitive warnables during the grace window
//! - Notify watchers of every genuine transition, in order
//! - Serve deterministic, code-ordered snapshots and debug flags
//!
//! # Design Decisions
//! - One mutex guards the store, the watchers and the startup timestamp
//! - Logging, metrics and watcher callbacks all run after the lock is released
//! - A mutation returns only after every watcher has seen it, unless it was
//!   made from inside a watcher callback
//! - `Tracker::default()` is fully usable; no constructor is required

use std::collections::BTreeMap;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::thread;
use std::time::{Duration, Instant, SystemTime};

use parking_lot::{Condvar, Mutex};
use tokio::sync::mpsc;

use crate::config::TrackerConfig;
use crate::error::HealthError;
use crate::health::state::{HealthChange, State, UnhealthyState};
use crate::health::warnable::{Args, Warnable, WarnableCode};
use crate::health::watcher::{ClosedFn, Dispatch, Event, RawWatcher, WatcherHandle, Watchers};
use crate::observability::metrics;

/// Default length of the startup grace window.
pub const DEFAULT_STARTUP_GRACE: Duration = Duration::from_secs(5);

static NEXT_TRACKER_ID: AtomicU64 = AtomicU64::new(1);

/// A warnable that is currently unhealthy.
struct Warning {
    warnable: Arc<Warnable>,
    state: Arc<UnhealthyState>,
    /// Monotonic start of the current unhealthy episode.
    since: Instant,
}

impl Warning {
    fn is_visible(&self, now: Instant) -> bool {
        now.saturating_duration_since(self.since) >= self.warnable.time_to_visible
    }
}

#[derive(Default)]
struct Inner {
    warnings: BTreeMap<WarnableCode, Warning>,
    watchers: Watchers,
    ipn_state: String,
    ipn_want_running: bool,
    ipn_want_running_set_time: Option<Instant>,
}

impl Inner {
    fn in_startup_grace(&self, grace: Duration) -> bool {
        self.ipn_want_running_set_time
            .is_some_and(|set| set.elapsed() < grace)
    }

    fn visible(&self) -> impl Iterator<Item = &Warning> {
        let now = Instant::now();
        self.warnings.values().filter(move |w| w.is_visible(now))
    }
}

/// Outcome of a `set_unhealthy` call, decided under the lock.
enum SetOutcome {
    Suppressed,
    Unchanged,
    Changed { became_unhealthy: bool, unhealthy: usize, dispatch: Dispatch, text: String },
}

/// Registry of which warnables are currently unhealthy, plus watchers.
pub struct Tracker {
    inner: Mutex<Inner>,
    /// Signalled whenever the drainer finishes an event or stops draining.
    delivered: Condvar,
    startup_grace: Duration,
    /// Metrics label separating trackers in one process.
    id: u64,
}

impl Default for Tracker {
    fn default() -> Self {
        Self::with_grace(DEFAULT_STARTUP_GRACE)
    }
}

impl std::fmt::Debug for Tracker {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let mut inner = self.inner.lock();
        let watchers = inner.watchers.len();
        f.debug_struct("Tracker")
            .field("id", &self.id)
            .field("unhealthy", &inner.warnings.keys().collect::<Vec<_>>())
            .field("watchers", &watchers)
            .field("ipn_state", &inner.ipn_state)
            .field("startup_grace", &self.startup_grace)
            .finish()
    }
}

impl Tracker {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_config(config: &TrackerConfig) -> Self {
        Self::with_grace(config.startup_grace())
    }

    fn with_grace(startup_grace: Duration) -> Self {
        Self {
            inner: Mutex::new(Inner::default()),
            delivered: Condvar::new(),
            startup_grace,
            id: NEXT_TRACKER_ID.fetch_add(1, Ordering::Relaxed),
        }
    }

    /// Mark `warnable` unhealthy with `args`.
    ///
    /// Re-reporting with identical args is a no-op. Reporting with different
    /// args replaces the state and notifies watchers again. Watchers have seen
    /// the transition by the time this returns, except when it is called from
    /// inside a watcher: then the transition is delivered after the current one.
    pub fn set_unhealthy(&self, warnable: &Arc<Warnable>, args: Args) {
        let outcome = {
            let mut inner = self.inner.lock();
            self.set_unhealthy_locked(&mut inner, warnable, args)
        };

        match outcome {
            SetOutcome::Suppressed => {
                tracing::debug!(warnable = %warnable.code, "Unhealthy report suppressed during startup grace window");
                metrics::record_startup_suppressed(&warnable.code);
            }
            SetOutcome::Unchanged => {}
            SetOutcome::Changed { became_unhealthy, unhealthy, dispatch, text } => {
                if became_unhealthy {
                    tracing::debug!(warnable = %warnable.code, text = %text, "Warnable became unhealthy");
                    metrics::record_transition(&warnable.code, true);
                } else {
                    tracing::debug!(warnable = %warnable.code, text = %text, "Unhealthy state updated");
                }
                metrics::record_unhealthy_count(self.id, unhealthy);
                self.dispatch(dispatch);
            }
        }
    }

    fn set_unhealthy_locked(&self, inner: &mut Inner, warnable: &Arc<Warnable>, args: Args) -> SetOutcome {
        if warnable.ignored_during_startup && inner.in_startup_grace(self.startup_grace) {
            return SetOutcome::Suppressed;
        }

        let prev = inner.warnings.get(&warnable.code);
        if prev.is_some_and(|p| p.state.args == args) {
            return SetOutcome::Unchanged;
        }

        let became_unhealthy = prev.is_none();
        let broken_since = prev.map_or_else(SystemTime::now, |p| p.state.broken_since);
        let since = prev.map_or_else(Instant::now, |p| p.since);

        let state = Arc::new(UnhealthyState {
            warnable_code: warnable.code.clone(),
            title: warnable.title.clone(),
            text: warnable.render_text(&args),
            args,
            broken_since,
            depends_on: warnable.depends_on.clone(),
        });
        let text = state.text.clone();

        inner.warnings.insert(
            warnable.code.clone(),
            Warning { warnable: warnable.clone(), state: state.clone(), since },
        );
        let dispatch = inner
            .watchers
            .enqueue(Event::new(warnable.clone(), Some(state)), thread::current().id());

        SetOutcome::Changed { became_unhealthy, unhealthy: inner.warnings.len(), dispatch, text }
    }

    /// Mark `warnable` healthy. No-op if it already is. Watchers are notified
    /// the same way as for [`Tracker::set_unhealthy`].
    pub fn set_healthy(&self, warnable: &Warnable) {
        let (removed, unhealthy, dispatch) = {
            let mut inner = self.inner.lock();
            match inner.warnings.remove(&warnable.code) {
                Some(removed) => {
                    let dispatch = inner
                        .watchers
                        .enqueue(Event::new(removed.warnable, None), thread::current().id());
                    (true, inner.warnings.len(), dispatch)
                }
                None => (false, inner.warnings.len(), Dispatch::Skip),
            }
        };

        if !removed {
            return;
        }
        tracing::debug!(warnable = %warnable.code, "Warnable became healthy");
        metrics::record_transition(&warnable.code, false);
        metrics::record_unhealthy_count(self.id, unhealthy);
        self.dispatch(dispatch);
    }

    pub fn is_unhealthy(&self, warnable: &Warnable) -> bool {
        self.inner.lock().warnings.contains_key(&warnable.code)
    }

    /// Record the daemon's run state. The startup grace window opens each time
    /// `want_running` goes from false to true.
    pub fn set_ipn_state(&self, state: &str, want_running: bool) {
        let opened = {
            let mut inner = self.inner.lock();
            let opened = !inner.ipn_want_running && want_running;
            if opened {
                inner.ipn_want_running_set_time = Some(Instant::now());
            }
            inner.ipn_state = state.to_string();
            inner.ipn_want_running = want_running;
            opened
        };

        tracing::debug!(state = %state, want_running, grace_window_opened = opened, "IPN state set");
    }

    pub fn ipn_state(&self) -> String {
        self.inner.lock().ipn_state.clone()
    }

    /// Rendered text of every visible unhealthy warnable, by code.
    pub fn strings(&self) -> Vec<String> {
        self.inner.lock().visible().map(|w| w.state.text.clone()).collect()
    }

    /// Snapshot of every visible unhealthy warnable, by code.
    pub fn current_state(&self) -> State {
        State {
            warnings: self.inner.lock().visible().map(|w| (*w.state).clone()).collect(),
        }
    }

    /// `Ok` when nothing visible is unhealthy.
    pub fn overall_error(&self) -> Result<(), HealthError> {
        let texts = self.strings();
        if texts.is_empty() {
            Ok(())
        } else {
            Err(HealthError::Unhealthy(texts))
        }
    }

    /// Append the debug flag of every unhealthy warnable to `dst`, ordered by
    /// warnable code. Warnables without a flag are skipped.
    pub fn append_warnable_debug_flags(&self, dst: &mut Vec<String>) {
        let inner = self.inner.lock();
        dst.extend(
            inner
                .warnings
                .values()
                .filter(|w| !w.warnable.map_debug_flag.is_empty())
                .map(|w| w.warnable.map_debug_flag.clone()),
        );
    }

    /// Register a callback for every transition. It receives the state on a
    /// transition into (or within) unhealthy, `None` on a transition to healthy.
    pub fn register_watcher<F>(&self, f: F) -> WatcherHandle
    where
        F: Fn(&Warnable, Option<&UnhealthyState>) + Send + Sync + 'static,
    {
        self.register_raw(
            Arc::new(move |warnable: &Arc<Warnable>, state: Option<&Arc<UnhealthyState>>| {
                f(&**warnable, state.map(|s| &**s))
            }),
            None,
        )
    }

    fn register_raw(&self, watcher: RawWatcher, closed: Option<ClosedFn>) -> WatcherHandle {
        let handle = self.inner.lock().watchers.insert(watcher, closed);
        tracing::trace!(?handle, "Watcher registered");
        handle
    }

    /// Remove a watcher. Returns false if the handle was unknown or its
    /// subscription was already dropped.
    ///
    /// Callbacks are invoked outside the lock. A delivery another thread has
    /// already started can still call the watcher once after this returns;
    /// nothing queued later reaches it.
    pub fn unregister_watcher(&self, handle: WatcherHandle) -> bool {
        let removed = self.inner.lock().watchers.remove(handle);
        tracing::trace!(?handle, removed, "Watcher unregistered");
        removed
    }

    pub fn watcher_count(&self) -> usize {
        self.inner.lock().watchers.len()
    }

    /// Observe transitions from async code. Changes arrive in dispatch order
    /// until the handle is unregistered or the receiver is dropped; a dropped
    /// receiver removes the watcher.
    pub fn subscribe(&self) -> (WatcherHandle, mpsc::UnboundedReceiver<HealthChange>) {
        let (tx, rx) = mpsc::unbounded_channel();
        let sink = tx.clone();
        let handle = self.register_raw(
            Arc::new(move |warnable: &Arc<Warnable>, state: Option<&Arc<UnhealthyState>>| {
                // A send error means the receiver is gone; the watcher is
                // pruned on the next registry access.
                let _ = tx.send(HealthChange {
                    warnable: warnable.clone(),
                    state: state.map(|s| (**s).clone()),
                });
            }),
            Some(Box::new(move || sink.is_closed())),
        );
        (handle, rx)
    }

    /// Wait until the event behind `dispatch` has reached every watcher,
    /// draining the queue ourselves when nobody else is.
    fn dispatch(&self, dispatch: Dispatch) {
        let Dispatch::Await(seq) = dispatch else {
            return;
        };
        let me = thread::current().id();
        {
            let mut inner = self.inner.lock();
            loop {
                if inner.watchers.is_delivered(seq) {
                    return;
                }
                if inner.watchers.begin_drain(me) {
                    break;
                }
                self.delivered.wait(&mut inner);
            }
        }
        self.drain_watchers();
    }

    fn drain_watchers(&self) {
        let mut guard = DrainGuard { tracker: self, finished: false };
        loop {
            let next = self.inner.lock().watchers.next_delivery();
            self.delivered.notify_all();
            let Some((event, callbacks)) = next else {
                break;
            };
            for callback in callbacks {
                callback(&event.warnable, event.state.as_ref());
            }
        }
        guard.finished = true;
    }

    #[cfg(test)]
    pub(crate) fn backdate_want_running(&self, by: Duration) {
        let mut inner = self.inner.lock();
        inner.ipn_want_running_set_time = Instant::now().checked_sub(by);
    }
}

/// Releases the drain if a watcher panics mid-delivery.
struct DrainGuard<'a> {
    tracker: &'a Tracker,
    finished: bool,
}

impl Drop for DrainGuard<'_> {
    fn drop(&mut self) {
        if !self.finished {
            self.tracker.inner.lock().watchers.abort_dispatch();
            self.tracker.delivered.notify_all();
        }
    }
}
