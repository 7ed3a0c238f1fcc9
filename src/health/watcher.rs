//! Watcher registry and ordered dispatch queue.
//!
//! # Responsibilities
//! - Hold watcher callbacks behind explicit handles
//! - Queue transitions in the order they happened, each with a sequence number
//! - Let exactly one thread drain the queue at a time and track how far it got
//!
//! # Design Decisions
//! - Callbacks run outside the tracker lock, so a watcher may call back into
//!   the tracker; its own transitions are queued behind the current one
//! - A caller on any other thread waits until its event has been delivered
//! - An event only reaches watchers that existed when it was queued
//! - Callbacks are looked up at delivery time, so unregistering a watcher
//!   also drops queued events it has not seen yet
//! - Watchers with a closed sink (a dropped `subscribe` receiver) are pruned

use std::collections::{BTreeMap, VecDeque};
use std::sync::Arc;
use std::thread::ThreadId;

use crate::health::state::UnhealthyState;
use crate::health::warnable::Warnable;

pub(crate) type RawWatcher = Arc<dyn Fn(&Arc<Warnable>, Option<&Arc<UnhealthyState>>) + Send + Sync>;

/// Reports whether a watcher's sink has gone away.
pub(crate) type ClosedFn = Box<dyn Fn() -> bool + Send + Sync>;

/// Subscription handle returned by `register_watcher`.
#[must_use = "dropping the handle makes the watcher impossible to unregister"]
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct WatcherHandle(u64);

impl WatcherHandle {
    /// Handle that refers to no watcher, handed out by an absent tracker.
    pub(crate) const INERT: WatcherHandle = WatcherHandle(0);

    pub fn is_inert(&self) -> bool {
        self.0 == 0
    }
}

struct Entry {
    callback: RawWatcher,
    closed: Option<ClosedFn>,
}

impl Entry {
    fn is_closed(&self) -> bool {
        self.closed.as_ref().is_some_and(|closed| closed())
    }
}

/// A transition waiting to be delivered.
pub(crate) struct Event {
    pub warnable: Arc<Warnable>,
    pub state: Option<Arc<UnhealthyState>>,
    seq: u64,
    /// Highest watcher id registered when the event was queued.
    newest_watcher: u64,
}

impl Event {
    pub fn new(warnable: Arc<Warnable>, state: Option<Arc<UnhealthyState>>) -> Self {
        Self { warnable, state, seq: 0, newest_watcher: 0 }
    }
}

/// What the caller that queued an event has to do next.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum Dispatch {
    /// No watcher will see the event.
    Skip,
    /// The caller is the thread already draining; the event follows the
    /// current one.
    Queued,
    /// Return only once this sequence number has been delivered.
    Await(u64),
}

#[derive(Default)]
pub(crate) struct Watchers {
    next_id: u64,
    callbacks: BTreeMap<u64, Entry>,
    pending: VecDeque<Event>,
    next_seq: u64,
    delivered_seq: u64,
    in_flight: Option<u64>,
    drainer: Option<ThreadId>,
}

impl Watchers {
    pub fn insert(&mut self, callback: RawWatcher, closed: Option<ClosedFn>) -> WatcherHandle {
        self.prune();
        self.next_id += 1;
        self.callbacks.insert(self.next_id, Entry { callback, closed });
        WatcherHandle(self.next_id)
    }

    pub fn remove(&mut self, handle: WatcherHandle) -> bool {
        self.callbacks.remove(&handle.0).is_some()
    }

    pub fn len(&mut self) -> usize {
        self.prune();
        self.callbacks.len()
    }

    fn prune(&mut self) {
        self.callbacks.retain(|_, entry| !entry.is_closed());
    }

    /// Queue an event on behalf of `caller`.
    pub fn enqueue(&mut self, mut event: Event, caller: ThreadId) -> Dispatch {
        self.prune();
        if self.callbacks.is_empty() {
            return Dispatch::Skip;
        }
        self.next_seq += 1;
        event.seq = self.next_seq;
        event.newest_watcher = self.next_id;
        self.pending.push_back(event);

        if self.drainer == Some(caller) {
            Dispatch::Queued
        } else {
            Dispatch::Await(self.next_seq)
        }
    }

    pub fn is_delivered(&self, seq: u64) -> bool {
        self.delivered_seq >= seq
    }

    /// Claim the drain for `caller`. False while another thread holds it.
    pub fn begin_drain(&mut self, caller: ThreadId) -> bool {
        if self.drainer.is_some() {
            return false;
        }
        self.drainer = Some(caller);
        true
    }

    /// Mark the previous event delivered and hand out the next one with the
    /// callbacks allowed to see it. Ends the drain when the queue is empty.
    pub fn next_delivery(&mut self) -> Option<(Event, Vec<RawWatcher>)> {
        if let Some(seq) = self.in_flight.take() {
            self.delivered_seq = seq;
        }
        self.prune();
        match self.pending.pop_front() {
            Some(event) => {
                let callbacks = self
                    .callbacks
                    .range(..=event.newest_watcher)
                    .map(|(_, entry)| entry.callback.clone())
                    .collect();
                self.in_flight = Some(event.seq);
                Some((event, callbacks))
            }
            None => {
                self.drainer = None;
                None
            }
        }
    }

    /// Release the drain after a callback panicked. The interrupted event
    /// counts as delivered; events behind it go to the next drainer.
    pub fn abort_dispatch(&mut self) {
        if let Some(seq) = self.in_flight.take() {
            self.delivered_seq = seq;
        }
        self.drainer = None;
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicBool, Ordering};
    use std::thread;

    fn event(code: &str) -> Event {
        Event::new(Arc::new(Warnable::new(code)), None)
    }

    fn noop() -> RawWatcher {
        Arc::new(|_: &Arc<Warnable>, _: Option<&Arc<UnhealthyState>>| {})
    }

    #[test]
    fn test_handles_are_unique() {
        let mut watchers = Watchers::default();
        let a = watchers.insert(noop(), None);
        let b = watchers.insert(noop(), None);
        assert_ne!(a, b);
        assert!(!a.is_inert());
        assert_eq!(watchers.len(), 2);

        assert!(watchers.remove(a));
        assert!(!watchers.remove(a));
        assert_eq!(watchers.len(), 1);
    }

    #[test]
    fn test_no_queue_without_watchers() {
        let mut watchers = Watchers::default();
        let me = thread::current().id();
        assert_eq!(watchers.enqueue(event("a"), me), Dispatch::Skip);
        assert!(watchers.begin_drain(me));
        assert!(watchers.next_delivery().is_none());
    }

    #[test]
    fn test_single_drainer_in_order() {
        let mut watchers = Watchers::default();
        let me = thread::current().id();
        let other = thread::spawn(|| thread::current().id()).join().unwrap();
        let _h = watchers.insert(noop(), None);

        assert_eq!(watchers.enqueue(event("first"), me), Dispatch::Await(1));
        assert!(watchers.begin_drain(me));
        assert!(!watchers.begin_drain(other));

        // Re-entrant calls from the drainer only queue; other threads wait.
        assert_eq!(watchers.enqueue(event("second"), me), Dispatch::Queued);
        assert_eq!(watchers.enqueue(event("third"), other), Dispatch::Await(3));

        let (e1, cbs) = watchers.next_delivery().unwrap();
        assert_eq!(e1.warnable.code.as_str(), "first");
        assert_eq!(cbs.len(), 1);
        assert!(!watchers.is_delivered(1));

        let (e2, _) = watchers.next_delivery().unwrap();
        assert_eq!(e2.warnable.code.as_str(), "second");
        assert!(watchers.is_delivered(1));
        assert!(!watchers.is_delivered(3));

        let (e3, _) = watchers.next_delivery().unwrap();
        assert_eq!(e3.warnable.code.as_str(), "third");
        assert!(watchers.next_delivery().is_none());
        assert!(watchers.is_delivered(3));

        // Drain finished; anyone may start the next one.
        assert!(watchers.begin_drain(other));
    }

    #[test]
    fn test_removed_watcher_skips_queued_events() {
        let mut watchers = Watchers::default();
        let me = thread::current().id();
        let h = watchers.insert(noop(), None);
        let _ = watchers.enqueue(event("queued"), me);
        watchers.remove(h);

        assert!(watchers.begin_drain(me));
        let (_, cbs) = watchers.next_delivery().unwrap();
        assert!(cbs.is_empty());
    }

    #[test]
    fn test_event_skips_watchers_registered_after_it() {
        let mut watchers = Watchers::default();
        let me = thread::current().id();
        let _early = watchers.insert(noop(), None);
        let _ = watchers.enqueue(event("old"), me);
        let _late = watchers.insert(noop(), None);
        let _ = watchers.enqueue(event("new"), me);

        assert!(watchers.begin_drain(me));
        let (_, cbs) = watchers.next_delivery().unwrap();
        assert_eq!(cbs.len(), 1);
        let (_, cbs) = watchers.next_delivery().unwrap();
        assert_eq!(cbs.len(), 2);
    }

    #[test]
    fn test_abort_marks_interrupted_event_delivered() {
        let mut watchers = Watchers::default();
        let me = thread::current().id();
        let _h = watchers.insert(noop(), None);
        let _ = watchers.enqueue(event("boom"), me);
        let _ = watchers.enqueue(event("after"), me);

        assert!(watchers.begin_drain(me));
        let _ = watchers.next_delivery().unwrap();
        watchers.abort_dispatch();
        assert!(watchers.is_delivered(1));
        assert!(!watchers.is_delivered(2));

        // The next drainer picks up what was left behind.
        assert!(watchers.begin_drain(me));
        let (e, _) = watchers.next_delivery().unwrap();
        assert_eq!(e.warnable.code.as_str(), "after");
    }

    #[test]
    fn test_closed_watchers_are_pruned() {
        let mut watchers = Watchers::default();
        let closed = Arc::new(AtomicBool::new(false));
        let flag = closed.clone();
        let _h = watchers.insert(noop(), Some(Box::new(move || flag.load(Ordering::SeqCst))));
        assert_eq!(watchers.len(), 1);

        closed.store(true, Ordering::SeqCst);
        assert_eq!(watchers.len(), 0);
        assert_eq!(watchers.enqueue(event("a"), thread::current().id()), Dispatch::Skip);
    }
}
