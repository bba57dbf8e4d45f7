//! Error and Result types shared by every public operation in this crate.

use std::result;

/// Failure modes surfaced by the looper runtime.
///
/// There is deliberately no `Ok`/`NoError` variant here: success is
/// expressed through `Result::Ok`, not through a variant of this type.
#[derive(Copy, Clone, Debug, PartialEq, Eq, thiserror::Error)]
pub enum Error {
    /// The operation is not legal in the component's current state
    /// (e.g. starting a Looper that is already running).
    #[error("invalid operation")]
    InvalidOperation,

    /// `Looper::start` was called on a Looper that has already been started.
    #[error("already started")]
    AlreadyOperated,

    /// The call would have to block on the caller's own worker thread, so it
    /// was refused instead of deadlocking.
    #[error("would block (self-join)")]
    WouldBlock,

    /// The target handler is not registered, or the message being cancelled
    /// is not (or is no longer) queued.
    #[error("name not found")]
    NameNotFound,

    /// An unclassified failure, e.g. worker thread creation failed.
    #[error("unknown error")]
    Unknown,
}

/// Result alias used throughout the crate's public API.
pub type Result<T> = result::Result<T, Error>;
