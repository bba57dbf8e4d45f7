//! `Looper`: a delay-ordered event queue bound to a worker thread.

mod worker;

use std::cmp::Reverse;
use std::collections::HashMap;
use std::sync::{Arc, Condvar, Mutex, OnceLock, Weak};
use std::time::Duration;

use priority_queue::PriorityQueue;
use tracing::trace;

use crate::clock;
use crate::error::{Error, Result};
use crate::handler::{Handler, HandlerId};
use crate::message::Message;
use crate::roster;
use worker::Worker;

struct QueuedEvent {
    when: Duration,
    message: Arc<Message>,
}

struct Inner {
    name: String,
    queue: PriorityQueue<u64, Reverse<(Duration, u64)>>,
    events: HashMap<u64, QueuedEvent>,
    next_seq: u64,
}

/// A delay-ordered queue of [`Message`]s, drained by a single worker thread
/// (or, if started that way, by the thread that called [`Looper::start`]).
///
/// Registering a [`Handler`] with a `Looper` gives it a process-wide
/// [`HandlerId`] that messages can be addressed to; delivery always happens
/// on this Looper's own thread, one message at a time.
pub struct Looper {
    self_ref: OnceLock<Weak<Looper>>,
    inner: Mutex<Inner>,
    changed: Condvar,
    worker: Arc<Worker>,
}

impl Looper {
    /// A new, unstarted Looper named `name` (used only for the worker
    /// thread's OS-visible name and in log output).
    pub fn new(name: impl Into<String>) -> Arc<Looper> {
        let looper = Arc::new(Looper {
            self_ref: OnceLock::new(),
            inner: Mutex::new(Inner {
                name: name.into(),
                queue: PriorityQueue::new(),
                events: HashMap::new(),
                next_seq: 0,
            }),
            changed: Condvar::new(),
            worker: Worker::new(),
        });
        let _ = looper.self_ref.set(Arc::downgrade(&looper));
        looper
    }

    fn shared(&self) -> Arc<Looper> {
        self.self_ref
            .get()
            .expect("Looper always constructed via Looper::new")
            .upgrade()
            .expect("Looper dropped while still reachable through &self")
    }

    /// This Looper's name.
    pub fn name(&self) -> String {
        self.inner.lock().unwrap().name.clone()
    }

    /// Change this Looper's name. Advisory only: it affects log output but,
    /// since the OS thread name is fixed at spawn time, not the worker
    /// thread's already-assigned name.
    pub fn set_name(&self, name: impl Into<String>) {
        self.inner.lock().unwrap().name = name.into();
    }

    /// Monotonic time since an arbitrary process-wide epoch, the same clock
    /// `post`'s delays are measured against.
    pub fn now() -> Duration {
        clock::now()
    }

    /// [`Looper::now`] expressed in whole microseconds.
    pub fn now_micros() -> i64 {
        clock::now_micros()
    }

    /// Register `handler` with this Looper, returning the [`HandlerId`]
    /// messages should now be addressed to reach it. Delegates to the
    /// process-wide [`crate::roster::Roster`], which is the single source of
    /// truth for id allocation and `(Looper, Handler)` lookup.
    pub fn register_handler(&self, handler: Arc<dyn Handler>) -> HandlerId {
        roster::roster().register_handler(self.shared(), handler)
    }

    /// Unregister a previously registered handler. A no-op if `id` is not
    /// currently registered with this (or any) Looper.
    pub fn unregister_handler(&self, id: HandlerId) {
        roster::roster().unregister_handler(id);
    }

    /// Start draining the queue.
    ///
    /// If `run_on_calling_thread` is `true`, this call itself becomes the
    /// dispatch loop and only returns once [`Looper::stop`] is called from
    /// another thread; otherwise a named worker thread is spawned and this
    /// returns immediately.
    pub fn start(&self, run_on_calling_thread: bool) -> Result<()> {
        let name = self.name();
        let this = self.shared();
        self.worker
            .start(name, run_on_calling_thread, || Ok(()), move || this.loop_once())
    }

    /// Stop the dispatch loop and wait for it to exit.
    ///
    /// Returns [`crate::Error::WouldBlock`] instead of deadlocking if called
    /// from inside a `Handler` callback running on this very Looper. The
    /// self-thread check happens before anything else so that a refused
    /// call leaves the Looper's running state untouched.
    pub fn stop(&self) -> Result<()> {
        if self.worker.is_current_thread() {
            return Err(Error::WouldBlock);
        }
        if self.worker.exit_pending() {
            return Ok(());
        }
        self.worker.request_exit();
        self.changed.notify_all();
        self.worker.join()
    }

    /// `true` while the dispatch loop is actively running.
    pub fn is_running(&self) -> bool {
        self.worker.is_running()
    }

    /// `true` if the calling thread is this Looper's own dispatch thread.
    pub(crate) fn is_current_thread(&self) -> bool {
        self.worker.is_current_thread()
    }

    pub(crate) fn post_event(&self, message: Arc<Message>, when: Duration) {
        let mut guard = self.inner.lock().unwrap();
        let seq = guard.next_seq;
        guard.next_seq += 1;
        guard.queue.push(seq, Reverse((when, seq)));
        guard.events.insert(seq, QueuedEvent { when, message });
        drop(guard);
        self.changed.notify_all();
    }

    /// Remove the first (lowest-sequence, i.e. earliest-posted) still-queued
    /// entry whose message reference is `message`. Returns `false` if none
    /// matches (already delivered, or never posted to this Looper).
    pub(crate) fn cancel_event(&self, message: &Arc<Message>) -> bool {
        let mut guard = self.inner.lock().unwrap();
        let seq = guard
            .events
            .iter()
            .filter(|(_, ev)| Arc::ptr_eq(&ev.message, message))
            .map(|(seq, _)| *seq)
            .min();
        let found = seq.is_some();
        if let Some(seq) = seq {
            guard.queue.remove(&seq);
            guard.events.remove(&seq);
        }
        drop(guard);
        if found {
            self.changed.notify_all();
        }
        found
    }

    fn peek(inner: &Inner) -> Option<(u64, Duration)> {
        inner.queue.peek().map(|(seq, prio)| (*seq, (prio.0).0))
    }

    /// One pass of the dispatch algorithm: wait for the exit flag, or for the
    /// queue to become non-empty, or for the earliest-due entry's time to
    /// arrive, whichever happens first; then pop and deliver exactly one
    /// message. Returns `false` (stop looping) once an exit is pending.
    fn loop_once(&self) -> bool {
        let mut guard = self.inner.lock().unwrap();
        loop {
            if self.worker.exit_pending() {
                return false;
            }
            match Self::peek(&guard) {
                None => {
                    guard = self.changed.wait(guard).unwrap();
                    continue;
                }
                Some((seq, when)) => {
                    let now = clock::now();
                    if when > now {
                        let (g2, _) = self.changed.wait_timeout(guard, when - now).unwrap();
                        guard = g2;
                        continue;
                    }
                    let event = guard.events.remove(&seq).expect("seq present in events");
                    guard.queue.remove(&seq);
                    drop(guard);
                    self.deliver(event);
                    return true;
                }
            }
        }
    }

    fn deliver(&self, event: QueuedEvent) {
        trace!(looper = %self.name(), what = event.message.what(), "dispatching message");
        roster::roster().deliver_message(&event.message);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::handler::HandlerState;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::sync::Mutex as StdMutex;
    use std::time::Instant;

    struct RecordingHandler {
        state: HandlerState,
        received: StdMutex<Vec<u32>>,
    }

    impl Handler for RecordingHandler {
        fn on_message_received(&self, msg: Arc<Message>) {
            self.received.lock().unwrap().push(msg.what());
        }
        fn handler_state(&self) -> &HandlerState {
            &self.state
        }
    }

    #[test]
    fn now_is_monotonic_and_matches_micros() {
        let a = Looper::now();
        let b = Looper::now();
        assert!(b >= a);
        assert!(Looper::now_micros() >= a.as_micros() as i64);
    }

    #[test]
    fn set_name_is_visible_through_name() {
        let looper = Looper::new("before");
        looper.set_name("after");
        assert_eq!(looper.name(), "after");
    }

    #[test]
    fn delivers_in_delay_order() {
        let looper = Looper::new("test");
        let handler = Arc::new(RecordingHandler {
            state: HandlerState::new(),
            received: StdMutex::new(Vec::new()),
        });
        let id = looper.register_handler(handler.clone());
        looper.start(false).unwrap();

        let late = Message::with_what(id, 2);
        let early = Message::with_what(id, 1);
        late.post(Duration::from_millis(30)).unwrap();
        early.post(Duration::from_millis(5)).unwrap();

        let start = Instant::now();
        while handler.received.lock().unwrap().len() < 2 && start.elapsed() < Duration::from_secs(2) {
            std::thread::sleep(Duration::from_millis(5));
        }
        looper.stop().unwrap();
        assert_eq!(*handler.received.lock().unwrap(), vec![1, 2]);
    }

    #[test]
    fn cancel_prevents_delivery() {
        let looper = Looper::new("test");
        let handler = Arc::new(RecordingHandler {
            state: HandlerState::new(),
            received: StdMutex::new(Vec::new()),
        });
        let id = looper.register_handler(handler.clone());
        looper.start(false).unwrap();

        let msg = Message::with_what(id, 1);
        msg.post(Duration::from_millis(50)).unwrap();
        msg.cancel().unwrap();

        std::thread::sleep(Duration::from_millis(100));
        looper.stop().unwrap();
        assert!(handler.received.lock().unwrap().is_empty());
    }

    #[test]
    fn stop_from_within_handler_would_block() {
        let looper = Looper::new("test");
        struct SelfStopper {
            state: HandlerState,
            looper: Mutex<Option<Arc<Looper>>>,
            result: StdMutex<Option<crate::error::Result<()>>>,
            done: AtomicUsize,
        }
        impl Handler for SelfStopper {
            fn on_message_received(&self, _msg: Arc<Message>) {
                let looper = self.looper.lock().unwrap().clone().unwrap();
                *self.result.lock().unwrap() = Some(looper.stop());
                self.done.fetch_add(1, Ordering::SeqCst);
            }
            fn handler_state(&self) -> &HandlerState {
                &self.state
            }
        }
        let handler = Arc::new(SelfStopper {
            state: HandlerState::new(),
            looper: Mutex::new(None),
            result: StdMutex::new(None),
            done: AtomicUsize::new(0),
        });
        let id = looper.register_handler(handler.clone());
        *handler.looper.lock().unwrap() = Some(looper.clone());
        looper.start(false).unwrap();
        Message::new(id).post(Duration::ZERO).unwrap();

        let start = Instant::now();
        while handler.done.load(Ordering::SeqCst) == 0 && start.elapsed() < Duration::from_secs(2) {
            std::thread::sleep(Duration::from_millis(5));
        }
        assert_eq!(
            handler.result.lock().unwrap().as_ref(),
            Some(&Err(crate::error::Error::WouldBlock))
        );
        looper.stop().unwrap();
    }
}
