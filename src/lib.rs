//! A message-passing concurrency runtime in the shape of Android/Stagefright's
//! `ALooper`/`AHandler`/`AMessage` trio: a delay-ordered event queue (a
//! [`Looper`]) bound to a worker thread, a process-wide registry
//! ([`roster::Roster`]) mapping [`HandlerId`]s to the `(Looper, Handler)`
//! pair they belong to, and a typed, named-value [`Message`] envelope with a
//! synchronous request/reply protocol layered over the otherwise
//! fire-and-forget queue.
//!
//! ```no_run
//! use std::sync::Arc;
//! use std::time::Duration;
//! use stagelooper::{Handler, HandlerState, Looper, Message};
//!
//! struct Printer {
//!     state: HandlerState,
//! }
//!
//! impl Handler for Printer {
//!     fn on_message_received(&self, msg: Arc<Message>) {
//!         println!("{}", msg.debug_string());
//!     }
//!     fn handler_state(&self) -> &HandlerState {
//!         &self.state
//!     }
//! }
//!
//! let looper = Looper::new("example");
//! let id = looper.register_handler(Arc::new(Printer { state: HandlerState::new() }));
//! looper.start(false).unwrap();
//! Message::new(id).post(Duration::ZERO).unwrap();
//! looper.stop().unwrap();
//! ```

mod buffer;
mod clock;
mod error;
mod handler;
mod looper;
mod message;
mod roster;

pub use buffer::Buffer;
pub use error::{Error, Result};
pub use handler::{looper_of, Handler, HandlerId, HandlerState};
pub use looper::Looper;
pub use message::{Entry, Message, Type, REPLY_ID_KEY};
pub use roster::{roster, Roster};
