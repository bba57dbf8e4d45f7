//! `Handler`: the trait objects a [`crate::Looper`] dispatches [`crate::Message`]s to.

use std::fmt;
use std::sync::atomic::{AtomicU32, Ordering};
use std::sync::Arc;

use crate::message::Message;
use crate::roster;

/// A process-wide, monotonically-allocated handler identifier.
///
/// `0` is reserved to mean "unassigned" (a freshly constructed `Handler` that
/// has not yet been registered with a [`crate::Looper`], or a `Message`
/// target that has not been addressed to anyone). A non-zero id maps to at
/// most one `(Looper, Handler)` pair at any point in time; ids are never
/// reused within a process lifetime.
#[derive(Copy, Clone, Eq, PartialEq, Hash, PartialOrd, Ord, Debug, Default)]
pub struct HandlerId(u32);

impl HandlerId {
    /// The sentinel id meaning "unassigned" / "unaddressed".
    pub const UNASSIGNED: HandlerId = HandlerId(0);

    pub(crate) fn new(raw: u32) -> Self {
        HandlerId(raw)
    }

    /// `true` if this is the `0` sentinel.
    pub fn is_unassigned(self) -> bool {
        self.0 == 0
    }

    /// The raw numeric value.
    pub fn get(self) -> u32 {
        self.0
    }
}

impl fmt::Display for HandlerId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Interior-mutable slot holding a `Handler`'s currently assigned id.
///
/// The [`crate::roster::Roster`] only ever holds handlers behind a `Weak<dyn
/// Handler>`, so registering/unregistering must be able to write the
/// assigned id through a shared reference — this mirrors `Handler::setID`
/// being a private method the original C++ `LooperRoster` (a `friend`) could
/// call on an otherwise-const-from-the-outside `Handler`.
#[derive(Debug, Default)]
pub struct HandlerState(AtomicU32);

impl HandlerState {
    /// A fresh, unregistered state (id `0`).
    pub fn new() -> Self {
        HandlerState(AtomicU32::new(0))
    }

    pub(crate) fn id(&self) -> HandlerId {
        HandlerId::new(self.0.load(Ordering::Acquire))
    }

    pub(crate) fn set_id(&self, id: HandlerId) {
        self.0.store(id.get(), Ordering::Release);
    }
}

/// An object that receives [`Message`]s dispatched by a [`crate::Looper`].
///
/// `on_message_received` runs on the owning Looper's thread; the Roster
/// guarantees it is never invoked concurrently with itself for the same
/// Handler (dispatch is serial per Looper).
pub trait Handler: Send + Sync {
    /// Handle a message delivered by the owning Looper.
    fn on_message_received(&self, msg: Arc<Message>);

    /// Storage for the id assigned at registration. Implementors embed a
    /// [`HandlerState`] field and return a reference to it here; the Roster
    /// is the only other code that writes through it.
    fn handler_state(&self) -> &HandlerState;

    /// The id assigned at registration, or [`HandlerId::UNASSIGNED`] if this
    /// Handler has not been registered (or has since been unregistered).
    fn id(&self) -> HandlerId {
        self.handler_state().id()
    }
}

/// Resolve the Looper a registered Handler currently belongs to.
///
/// Returns `None` if `handler_id` is unassigned or has since been evicted
/// (its Looper or Handler was dropped).
pub fn looper_of(handler_id: HandlerId) -> Option<Arc<crate::looper::Looper>> {
    roster::roster().find_looper(handler_id)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn unassigned_is_zero() {
        assert!(HandlerId::UNASSIGNED.is_unassigned());
        assert_eq!(HandlerId::UNASSIGNED.get(), 0);
    }

    #[test]
    fn handler_state_round_trips() {
        let state = HandlerState::new();
        assert!(state.id().is_unassigned());
        state.set_id(HandlerId::new(42));
        assert_eq!(state.id().get(), 42);
        state.set_id(HandlerId::UNASSIGNED);
        assert!(state.id().is_unassigned());
    }
}
