//! The tagged payload a [`super::Message`] stores per named entry.

use std::any::Any;
use std::fmt;
use std::sync::Arc;

use crate::buffer::Buffer;
use crate::message::Message;

/// The type tag of a stored [`Entry`].
///
/// `Unknown` is never actually stored; it is only ever returned by
/// [`super::Message::entry_name_at`] for an out-of-range index, matching
/// `Message::getEntryNameAt` in the original.
#[derive(Copy, Clone, Eq, PartialEq, Hash, Debug)]
pub enum Type {
    Boolean,
    Int32,
    Int64,
    Size,
    Float,
    Double,
    Pointer,
    String,
    Message,
    Buffer,
    Object,
    Unknown,
}

/// One named entry's payload.
///
/// `#[derive(Clone)]` here is what gives [`super::Message::duplicate`] its
/// specified asymmetry for free: cloning a `String` allocates an
/// independent copy (deep), while cloning an `Arc` just bumps a refcount
/// (shallow share) — exactly value types + `String` deep, nested `Message` /
/// `Buffer` / `Object` shallow, with no special-cased duplication logic
/// needed per variant.
#[derive(Clone)]
pub enum Entry {
    Boolean(bool),
    Int32(i32),
    Int64(i64),
    Size(usize),
    Float(f32),
    Double(f64),
    /// Opaque interop escape hatch. Storing an address is safe; it is the
    /// accessors in `Message` that are `unsafe`, since dereferencing it is
    /// the caller's unchecked responsibility.
    Pointer(usize),
    String(String),
    Message(Arc<Message>),
    Buffer(Arc<Buffer>),
    Object(Arc<dyn Any + Send + Sync>),
}

impl Entry {
    pub(crate) fn type_tag(&self) -> Type {
        match self {
            Entry::Boolean(_) => Type::Boolean,
            Entry::Int32(_) => Type::Int32,
            Entry::Int64(_) => Type::Int64,
            Entry::Size(_) => Type::Size,
            Entry::Float(_) => Type::Float,
            Entry::Double(_) => Type::Double,
            Entry::Pointer(_) => Type::Pointer,
            Entry::String(_) => Type::String,
            Entry::Message(_) => Type::Message,
            Entry::Buffer(_) => Type::Buffer,
            Entry::Object(_) => Type::Object,
        }
    }
}

impl fmt::Debug for Entry {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Entry::Boolean(v) => write!(f, "Boolean({v})"),
            Entry::Int32(v) => write!(f, "Int32({v})"),
            Entry::Int64(v) => write!(f, "Int64({v})"),
            Entry::Size(v) => write!(f, "Size({v})"),
            Entry::Float(v) => write!(f, "Float({v})"),
            Entry::Double(v) => write!(f, "Double({v})"),
            Entry::Pointer(v) => write!(f, "Pointer({v:#x})"),
            Entry::String(v) => write!(f, "String({v:?})"),
            Entry::Message(_) => write!(f, "Message(..)"),
            Entry::Buffer(_) => write!(f, "Buffer(..)"),
            Entry::Object(_) => write!(f, "Object(..)"),
        }
    }
}

/// A single named, typed slot within a `Message`.
#[derive(Clone, Debug)]
pub(crate) struct Item {
    pub(crate) name: String,
    pub(crate) entry: Entry,
}
