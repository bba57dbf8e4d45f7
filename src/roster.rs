//! `Roster`: the process-wide registry tying [`HandlerId`]s to their
//! `(Looper, Handler)` pair, and the synchronous request/reply layer built
//! on top of it.

use std::collections::HashMap;
use std::sync::atomic::{AtomicI32, AtomicU32, Ordering};
use std::sync::{Arc, Condvar, Mutex, Weak};
use std::time::Duration;

use once_cell::sync::Lazy;
use tracing::{debug, warn};

use crate::clock;
use crate::error::{Error, Result};
use crate::handler::{Handler, HandlerId};
use crate::looper::Looper;
use crate::message::Message;

static ROSTER: Lazy<Roster> = Lazy::new(Roster::new);

/// The single process-wide `Roster` instance.
pub fn roster() -> &'static Roster {
    &ROSTER
}

struct Entry {
    looper: Weak<Looper>,
    handler: Weak<dyn Handler>,
}

/// Process-wide registry mapping each [`HandlerId`] to the `(Looper,
/// Handler)` pair it was registered with, plus the correlation bookkeeping
/// for `post_and_await_response`/`post_reply`.
///
/// Lock ordering: this type's internal lock is always acquired before (never
/// while holding) a `Looper`'s own lock, and the reply-waiting lock is
/// entirely independent of both — see `src/looper/mod.rs`'s module doc for
/// why the reverse order is never taken.
pub struct Roster {
    next_handler_id: AtomicU32,
    handlers: Mutex<HashMap<u32, Entry>>,
    next_reply_id: AtomicI32,
    replies: Mutex<HashMap<i32, Arc<Message>>>,
    reply_posted: Condvar,
}

impl Roster {
    fn new() -> Self {
        Roster {
            next_handler_id: AtomicU32::new(1),
            handlers: Mutex::new(HashMap::new()),
            next_reply_id: AtomicI32::new(1),
            replies: Mutex::new(HashMap::new()),
            reply_posted: Condvar::new(),
        }
    }

    /// Register `handler` as belonging to `looper`, allocating and returning
    /// its process-wide [`HandlerId`]. Ids are never reused.
    ///
    /// # Panics
    /// Panics if `handler` is already registered (`handler.id() != 0`).
    /// Registering the same `Handler` twice is a programmer error, not a
    /// recoverable condition (spec.md §4.3/§7).
    pub fn register_handler(&self, looper: Arc<Looper>, handler: Arc<dyn Handler>) -> HandlerId {
        assert!(
            handler.id().is_unassigned(),
            "register_handler: handler is already registered as {}",
            handler.id()
        );
        let raw = self.next_handler_id.fetch_add(1, Ordering::Relaxed);
        let id = HandlerId::new(raw);
        handler.handler_state().set_id(id);
        self.handlers.lock().unwrap().insert(
            raw,
            Entry {
                looper: Arc::downgrade(&looper),
                handler: Arc::downgrade(&handler),
            },
        );
        debug!(handler_id = raw, "registered handler");
        id
    }

    /// Remove `id` from the registry. A no-op if `id` is not (or is no
    /// longer) registered.
    pub fn unregister_handler(&self, id: HandlerId) {
        if let Some(entry) = self.handlers.lock().unwrap().remove(&id.get()) {
            if let Some(handler) = entry.handler.upgrade() {
                handler.handler_state().set_id(HandlerId::UNASSIGNED);
            }
        }
    }

    fn lookup(&self, id: HandlerId) -> Option<(Arc<Looper>, Arc<dyn Handler>)> {
        let mut guard = self.handlers.lock().unwrap();
        let entry = guard.get(&id.get())?;
        match (entry.looper.upgrade(), entry.handler.upgrade()) {
            (Some(looper), Some(handler)) => Some((looper, handler)),
            _ => {
                guard.remove(&id.get());
                None
            }
        }
    }

    /// Resolve the Looper `id` is currently registered with.
    pub fn find_looper(&self, id: HandlerId) -> Option<Arc<Looper>> {
        self.lookup(id).map(|(looper, _)| looper)
    }

    /// Queue `message` on its target's Looper, to be delivered after `delay`.
    ///
    /// Returns [`Error::NameNotFound`] if `message`'s target is not (or is no
    /// longer) registered with any Looper.
    pub fn post_message(&self, message: Arc<Message>, delay: Duration) -> Result<()> {
        let looper = self
            .find_looper(message.target())
            .ok_or(Error::NameNotFound)?;
        let when = clock::now() + delay;
        looper.post_event(message, when);
        Ok(())
    }

    /// Remove `message` from its target's queue if still pending.
    ///
    /// Returns [`Error::NameNotFound`] if the target is not registered, or if
    /// the message is not currently queued there (already delivered, already
    /// cancelled, or never posted).
    pub fn cancel_message(&self, message: &Arc<Message>) -> Result<()> {
        let looper = self
            .find_looper(message.target())
            .ok_or(Error::NameNotFound)?;
        if looper.cancel_event(message) {
            Ok(())
        } else {
            Err(Error::NameNotFound)
        }
    }

    /// Deliver `message` to its target handler, if still registered.
    pub(crate) fn deliver_message(&self, message: &Arc<Message>) {
        match self.lookup(message.target()) {
            Some((_, handler)) => handler.on_message_received(Arc::clone(message)),
            None => warn!(
                target = message.target().get(),
                "dropping message for unregistered handler"
            ),
        }
    }

    /// Post `message`, tagging it with a fresh correlation id, and block the
    /// calling thread until [`Roster::post_reply`] is called with that id.
    ///
    /// Returns [`Error::WouldBlock`] instead of deadlocking if the calling
    /// thread is the target's own Looper worker thread.
    pub fn post_and_await_response(&self, message: Arc<Message>) -> Result<Arc<Message>> {
        let looper = self
            .find_looper(message.target())
            .ok_or(Error::NameNotFound)?;
        if looper.is_current_thread() {
            return Err(Error::WouldBlock);
        }
        let reply_id = self.next_reply_id.fetch_add(1, Ordering::Relaxed);
        message.set_int32(crate::message::REPLY_ID_KEY, reply_id);
        looper.post_event(message, clock::now());

        let mut guard = self.replies.lock().unwrap();
        loop {
            if let Some(reply) = guard.remove(&reply_id) {
                return Ok(reply);
            }
            guard = self.reply_posted.wait(guard).unwrap();
        }
    }

    /// Satisfy a pending [`Roster::post_and_await_response`] wait for
    /// `reply_id` with `reply`.
    ///
    /// # Panics
    /// Panics if `reply_id` has already been replied to and not yet
    /// collected by its waiter. A double reply to the same id is a
    /// programmer error in the calling `Handler`, not a recoverable
    /// condition (spec.md §4.5/§7), so it is asserted rather than
    /// surfaced as a `Result`.
    pub fn post_reply(&self, reply_id: i32, reply: Arc<Message>) -> Result<()> {
        let mut guard = self.replies.lock().unwrap();
        assert!(
            !guard.contains_key(&reply_id),
            "post_reply: reply_id {reply_id} already has a pending response"
        );
        guard.insert(reply_id, reply);
        drop(guard);
        self.reply_posted.notify_all();
        Ok(())
    }
}
