//! `Message`: a typed, named bag of values addressed to a [`crate::Handler`].

mod item;

pub use item::{Entry, Type};

use std::fmt::Write as _;
use std::sync::{Arc, Mutex, OnceLock, Weak};
use std::time::Duration;

use item::Item;

use crate::buffer::Buffer;
use crate::error::Result;
use crate::handler::HandlerId;
use crate::roster;

/// The reserved item name used to carry a synchronous reply's correlation id
/// (see [`Message::sender_awaits_response`] / [`Message::post_reply`]).
pub const REPLY_ID_KEY: &str = "replyId";

struct State {
    target: HandlerId,
    what: u32,
    items: Vec<Item>,
}

/// A message posted to a [`crate::Looper`] and delivered to the [`crate::Handler`]
/// registered under its `target`.
///
/// Messages are always held behind an `Arc` once constructed (mirroring the
/// original's `enable_shared_from_this<Message>` usage): this lets `post`,
/// `cancel` and friends read naturally as `msg.post(delay)` while the Roster
/// underneath still tracks messages by shared-pointer identity, which is what
/// [`Message::cancel`] compares against. A `Message` is safe to keep mutating
/// with `set_*` right up until the moment it is posted; nothing stops a
/// caller mutating it after that, but a Handler that receives the same
/// `Arc<Message>` concurrently posted elsewhere will observe a consistent,
/// lock-protected snapshot rather than torn writes.
pub struct Message {
    self_ref: OnceLock<Weak<Message>>,
    state: Mutex<State>,
}

impl Message {
    /// A new, empty message addressed to `target` with `what == 0`.
    pub fn new(target: HandlerId) -> Arc<Message> {
        Self::construct(target, 0)
    }

    /// A new, empty message addressed to `target` carrying `what`.
    pub fn with_what(target: HandlerId, what: u32) -> Arc<Message> {
        Self::construct(target, what)
    }

    fn construct(target: HandlerId, what: u32) -> Arc<Message> {
        let msg = Arc::new(Message {
            self_ref: OnceLock::new(),
            state: Mutex::new(State {
                target,
                what,
                items: Vec::new(),
            }),
        });
        // Infallible: nothing else can have raced to set this on a
        // freshly-allocated Arc only we hold.
        let _ = msg.self_ref.set(Arc::downgrade(&msg));
        msg
    }

    fn shared(&self) -> Arc<Message> {
        self.self_ref
            .get()
            .expect("Message always constructed via Message::new/with_what")
            .upgrade()
            .expect("Message dropped while still reachable through &self")
    }

    /// The handler id this message is addressed to.
    pub fn target(&self) -> HandlerId {
        self.state.lock().unwrap().target
    }

    /// Re-address this message to a different handler.
    pub fn set_target(&self, target: HandlerId) {
        self.state.lock().unwrap().target = target;
    }

    /// The caller-defined message kind.
    pub fn what(&self) -> u32 {
        self.state.lock().unwrap().what
    }

    /// Set the caller-defined message kind.
    pub fn set_what(&self, what: u32) {
        self.state.lock().unwrap().what = what;
    }

    /// Remove every stored entry, keeping `target`/`what`.
    pub fn clear(&self) {
        // Each entry is replaced wholesale by `Vec::clear`, which drops every
        // `Entry` as a complete value. There is no analogue of the original
        // `clearItem`'s missing `break` here: a Rust enum has no partially-
        // cleared state to fall through into.
        self.state.lock().unwrap().items.clear();
    }

    /// Number of stored entries.
    pub fn count_entries(&self) -> usize {
        self.state.lock().unwrap().items.len()
    }

    /// The name and type of the entry at `index`, or `("Unknown", Type::Unknown)`
    /// if `index` is out of range.
    pub fn entry_name_at(&self, index: usize) -> (String, Type) {
        let guard = self.state.lock().unwrap();
        match guard.items.get(index) {
            Some(item) => (item.name.clone(), item.entry.type_tag()),
            None => ("Unknown".to_string(), Type::Unknown),
        }
    }

    fn allocate(&self, name: &str, entry: Entry) {
        let mut guard = self.state.lock().unwrap();
        if let Some(existing) = guard.items.iter_mut().find(|item| item.name == name) {
            existing.entry = entry;
        } else {
            guard.items.push(Item {
                name: name.to_string(),
                entry,
            });
        }
    }

    fn find(&self, name: &str) -> Option<Entry> {
        let guard = self.state.lock().unwrap();
        guard
            .items
            .iter()
            .find(|item| item.name == name)
            .map(|item| item.entry.clone())
    }

    /// A new, independent `Message` with the same `target`/`what` and items.
    ///
    /// Value-typed entries and `String`s are deep-copied; nested `Message`,
    /// `Buffer` and `Object` entries are shared (reference-counted), not
    /// copied — see [`Entry`]'s doc comment for why `Clone` alone gives this.
    pub fn duplicate(&self) -> Arc<Message> {
        let guard = self.state.lock().unwrap();
        let new_msg = Self::construct(guard.target, guard.what);
        new_msg.state.lock().unwrap().items = guard.items.clone();
        new_msg
    }

    /// A human-readable rendering for logging/debugging, mirroring
    /// `Message::debugString` in the original.
    pub fn debug_string(&self) -> String {
        let guard = self.state.lock().unwrap();
        let mut out = String::new();
        let _ = write!(out, "Message(what = {}", format_fourcc(guard.what));
        if !guard.target.is_unassigned() {
            let _ = write!(out, ", target = {}", guard.target);
        }
        if guard.items.is_empty() {
            out.push(')');
            return out;
        }
        out.push_str(") = {\n");
        for item in &guard.items {
            let _ = write!(out, "  {} = {}\n", item.name, format_entry(&item.entry));
        }
        out.push('}');
        out
    }

    /// Queue this message for delivery after `delay` (zero for "as soon as
    /// possible"), on the Looper its `target` handler is currently registered
    /// with.
    pub fn post(&self, delay: Duration) -> Result<()> {
        roster::roster().post_message(self.shared(), delay)
    }

    /// Remove this exact message from its target Looper's queue if it is
    /// still pending. Returns [`crate::Error::NameNotFound`] if the target isn't
    /// registered, or if this message already dispatched, was already
    /// cancelled, or was never queued in the first place.
    pub fn cancel(&self) -> Result<()> {
        roster::roster().cancel_message(&self.shared())
    }

    /// Post this message and block the calling thread until a reply is
    /// posted back via [`Message::post_reply`], returning that reply.
    ///
    /// Refuses with [`crate::Error::WouldBlock`] if called from the target
    /// Looper's own worker thread, since that thread is the only one that
    /// could ever deliver the reply.
    pub fn post_and_await_response(&self) -> Result<Arc<Message>> {
        roster::roster().post_and_await_response(self.shared())
    }

    /// Reply to a message previously sent via `post_and_await_response`,
    /// using the `replyId` it was tagged with.
    pub fn post_reply(&self, reply_id: i32) -> Result<()> {
        roster::roster().post_reply(reply_id, self.shared())
    }

    /// The correlation id this message should be replied to with, if it was
    /// sent via `post_and_await_response` (i.e. it carries a `replyId`).
    pub fn sender_awaits_response(&self) -> Option<i32> {
        self.find_int32(REPLY_ID_KEY)
    }
}

macro_rules! value_accessor {
    ($set:ident, $find:ident, $variant:ident, $t:ty) => {
        impl Message {
            #[doc = concat!("Store a `", stringify!($t), "` entry named `name`, overwriting any existing entry of that name.")]
            pub fn $set(&self, name: &str, value: $t) {
                self.allocate(name, Entry::$variant(value));
            }

            #[doc = concat!("Look up a `", stringify!($t), "` entry named `name`. Returns `None` if absent or stored as a different type.")]
            pub fn $find(&self, name: &str) -> Option<$t> {
                match self.find(name) {
                    Some(Entry::$variant(v)) => Some(v),
                    _ => None,
                }
            }
        }
    };
}

value_accessor!(set_bool, find_bool, Boolean, bool);
value_accessor!(set_int32, find_int32, Int32, i32);
value_accessor!(set_int64, find_int64, Int64, i64);
value_accessor!(set_size, find_size, Size, usize);
value_accessor!(set_float, find_float, Float, f32);
value_accessor!(set_double, find_double, Double, f64);

impl Message {
    /// Store a `String` entry named `name`.
    pub fn set_string(&self, name: &str, value: impl Into<String>) {
        self.allocate(name, Entry::String(value.into()));
    }

    /// Look up a `String` entry named `name`.
    pub fn find_string(&self, name: &str) -> Option<String> {
        match self.find(name) {
            Some(Entry::String(v)) => Some(v),
            _ => None,
        }
    }

    /// Store a nested `Message` entry named `name`, shared (not copied).
    pub fn set_message(&self, name: &str, value: Arc<Message>) {
        self.allocate(name, Entry::Message(value));
    }

    /// Look up a nested `Message` entry named `name`.
    pub fn find_message(&self, name: &str) -> Option<Arc<Message>> {
        match self.find(name) {
            Some(Entry::Message(v)) => Some(v),
            _ => None,
        }
    }

    /// Store a `Buffer` entry named `name`, shared (not copied).
    pub fn set_buffer(&self, name: &str, value: Arc<Buffer>) {
        self.allocate(name, Entry::Buffer(value));
    }

    /// Look up a `Buffer` entry named `name`.
    pub fn find_buffer(&self, name: &str) -> Option<Arc<Buffer>> {
        match self.find(name) {
            Some(Entry::Buffer(v)) => Some(v),
            _ => None,
        }
    }

    /// Store an opaque reference-counted object entry named `name`.
    pub fn set_object(&self, name: &str, value: Arc<dyn std::any::Any + Send + Sync>) {
        self.allocate(name, Entry::Object(value));
    }

    /// Look up an opaque object entry named `name`.
    pub fn find_object(&self, name: &str) -> Option<Arc<dyn std::any::Any + Send + Sync>> {
        match self.find(name) {
            Some(Entry::Object(v)) => Some(v),
            _ => None,
        }
    }

    /// Store a raw pointer entry named `name`, encoded as an address.
    ///
    /// # Safety
    /// The stored address carries no lifetime, ownership, or thread-safety
    /// guarantee. The caller must ensure the pointee outlives every read of
    /// this entry and that concurrent access from the eventual reader is
    /// sound — this is an escape hatch for FFI/interop payloads, not a
    /// checked reference.
    pub unsafe fn set_pointer(&self, name: &str, ptr: *mut ()) {
        self.allocate(name, Entry::Pointer(ptr as usize));
    }

    /// Look up a raw pointer entry named `name`.
    ///
    /// # Safety
    /// See [`Message::set_pointer`]: the returned pointer's validity is
    /// entirely the caller's responsibility.
    pub unsafe fn find_pointer(&self, name: &str) -> Option<*mut ()> {
        match self.find(name) {
            Some(Entry::Pointer(v)) => Some(v as *mut ()),
            _ => None,
        }
    }
}

fn format_fourcc(what: u32) -> String {
    let bytes = what.to_be_bytes();
    if bytes.iter().all(|b| (0x20..=0x7e).contains(b)) {
        format!("'{}'", String::from_utf8_lossy(&bytes))
    } else {
        format!("0x{what:08x}")
    }
}

fn format_entry(entry: &Entry) -> String {
    match entry {
        Entry::Boolean(v) => format!("bool({v})"),
        Entry::Int32(v) => format!("int32_t({v})"),
        Entry::Int64(v) => format!("int64_t({v})"),
        Entry::Size(v) => format!("size_t({v})"),
        Entry::Float(v) => format!("float({v})"),
        Entry::Double(v) => format!("double({v})"),
        Entry::Pointer(v) => format!("pointer({v:#x})"),
        Entry::String(v) => format!("string({v:?})"),
        Entry::Message(m) => format!("Message({})", m.debug_string()),
        Entry::Buffer(b) => format_buffer_entry(b),
        Entry::Object(_) => "Object(<opaque>)".to_string(),
    }
}

fn format_buffer_entry(buffer: &Buffer) -> String {
    const INLINE_LIMIT: usize = 64;
    let data = buffer.data();
    if data.len() <= INLINE_LIMIT {
        let mut hex = String::with_capacity(data.len() * 2);
        for byte in data {
            let _ = write!(hex, "{byte:02x}");
        }
        format!("Buffer({} bytes) = {}", data.len(), hex)
    } else {
        format!("Buffer *{:p} ({} bytes)", data.as_ptr(), data.len())
    }
}
