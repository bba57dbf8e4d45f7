//! `Buffer`: a fixed-capacity byte region with a mutable valid-data range,
//! used to carry bulk payloads (media/network/file data) alongside the
//! typed, small-value world of [`crate::Message`].
//!
//! Buffer pooling, allocator/recycling strategies, and metadata-driven
//! format negotiation are out of scope; this type only covers the
//! data/range/meta/farewell shape itself.

use std::sync::atomic::{AtomicI32, AtomicUsize, Ordering};
use std::sync::{Arc, Mutex, OnceLock};
use std::time::Duration;

use crate::error::{Error, Result};
use crate::handler::HandlerId;
use crate::message::Message;

/// A byte buffer with a fixed backing capacity and a `[offset, offset+size)`
/// sub-range describing the currently valid data, plus a lazily-created
/// metadata [`Message`] and an optional one-shot "farewell" notification
/// posted when the buffer is finally dropped.
pub struct Buffer {
    storage: Box<[u8]>,
    offset: AtomicUsize,
    size: AtomicUsize,
    /// Scratch field for codec-specific use (mirrors `Buffer::int32Data` in
    /// the original, e.g. a frame index or flags word); this crate assigns
    /// it no meaning of its own.
    int32_data: AtomicI32,
    meta: OnceLock<Arc<Message>>,
    farewell: Mutex<Option<Arc<Message>>>,
}

impl Buffer {
    /// A new buffer with `capacity` bytes of zeroed backing storage, whose
    /// valid range initially spans the whole capacity.
    pub fn new(capacity: usize) -> Buffer {
        Buffer {
            storage: vec![0u8; capacity].into_boxed_slice(),
            offset: AtomicUsize::new(0),
            size: AtomicUsize::new(capacity),
            int32_data: AtomicI32::new(0),
            meta: OnceLock::new(),
            farewell: Mutex::new(None),
        }
    }

    /// Total backing storage size; never changes after construction.
    pub fn capacity(&self) -> usize {
        self.storage.len()
    }

    /// Start of the currently valid data range.
    pub fn offset(&self) -> usize {
        self.offset.load(Ordering::Acquire)
    }

    /// Length of the currently valid data range.
    pub fn size(&self) -> usize {
        self.size.load(Ordering::Acquire)
    }

    /// Narrow or shift the valid data range to `[offset, offset + size)`.
    ///
    /// Returns [`Error::InvalidOperation`] if that range would exceed
    /// `capacity()`.
    pub fn set_range(&self, offset: usize, size: usize) -> Result<()> {
        let end = offset.checked_add(size).ok_or(Error::InvalidOperation)?;
        if end > self.capacity() {
            return Err(Error::InvalidOperation);
        }
        self.offset.store(offset, Ordering::Release);
        self.size.store(size, Ordering::Release);
        Ok(())
    }

    /// The whole backing storage, `capacity()` bytes, ignoring `offset`/`size`.
    pub fn base(&self) -> &[u8] {
        &self.storage
    }

    /// The whole backing storage as a mutable slice. Only callable while the
    /// buffer is exclusively owned, i.e. before it is shared via `Arc` and
    /// attached to a `Message`.
    pub fn base_mut(&mut self) -> &mut [u8] {
        &mut self.storage
    }

    /// The currently valid data, i.e. `base()[offset..offset + size]`.
    pub fn data(&self) -> &[u8] {
        &self.storage[self.offset()..self.offset() + self.size()]
    }

    /// The currently valid data, as a mutable slice. Only callable while the
    /// buffer is exclusively owned, i.e. before it is shared via `Arc` and
    /// attached to a `Message`.
    pub fn data_mut(&mut self) -> &mut [u8] {
        let (offset, size) = (self.offset(), self.size());
        &mut self.storage[offset..offset + size]
    }

    pub fn int32_data(&self) -> i32 {
        self.int32_data.load(Ordering::Acquire)
    }

    pub fn set_int32_data(&self, value: i32) {
        self.int32_data.store(value, Ordering::Release);
    }

    /// This buffer's metadata message, created empty on first access and
    /// shared on every subsequent call.
    pub fn meta(&self) -> Arc<Message> {
        self.meta
            .get_or_init(|| Message::new(HandlerId::UNASSIGNED))
            .clone()
    }

    /// Arrange for `message` to be posted (with zero delay) the moment this
    /// buffer is dropped — at most once, however many times this is called
    /// (the last call wins).
    pub fn set_farewell_message(&self, message: Arc<Message>) {
        *self.farewell.lock().unwrap() = Some(message);
    }
}

impl Drop for Buffer {
    fn drop(&mut self) {
        if let Some(message) = self.farewell.lock().unwrap().take() {
            let _ = message.post(Duration::ZERO);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn fresh_buffer_spans_full_capacity() {
        let buf = Buffer::new(16);
        assert_eq!(buf.capacity(), 16);
        assert_eq!(buf.offset(), 0);
        assert_eq!(buf.size(), 16);
        assert_eq!(buf.data().len(), 16);
    }

    #[test]
    fn set_range_narrows_view() {
        let mut buf = Buffer::new(16);
        buf.data_mut()[4] = 0xab;
        buf.set_range(4, 4).unwrap();
        assert_eq!(buf.data(), &[0xab, 0, 0, 0]);
    }

    #[test]
    fn base_spans_full_capacity_independent_of_range() {
        let mut buf = Buffer::new(16);
        buf.base_mut()[0] = 0xff;
        buf.set_range(4, 4).unwrap();
        assert_eq!(buf.base().len(), 16);
        assert_eq!(buf.base()[0], 0xff);
        assert_eq!(buf.data().len(), 4);
    }

    #[test]
    fn set_range_out_of_bounds_is_rejected() {
        let buf = Buffer::new(16);
        assert_eq!(buf.set_range(10, 10), Err(Error::InvalidOperation));
        assert_eq!(buf.set_range(usize::MAX, 1), Err(Error::InvalidOperation));
    }

    #[test]
    fn meta_is_stable_across_calls() {
        let buf = Buffer::new(4);
        let m1 = buf.meta();
        m1.set_int32("x", 1);
        let m2 = buf.meta();
        assert!(Arc::ptr_eq(&m1, &m2));
        assert_eq!(m2.find_int32("x"), Some(1));
    }

    #[test]
    fn farewell_message_posts_on_drop() {
        let looper = crate::looper::Looper::new("buffer-test");
        struct Catcher {
            state: crate::handler::HandlerState,
            hits: std::sync::Mutex<u32>,
        }
        impl crate::handler::Handler for Catcher {
            fn on_message_received(&self, _msg: Arc<Message>) {
                *self.hits.lock().unwrap() += 1;
            }
            fn handler_state(&self) -> &crate::handler::HandlerState {
                &self.state
            }
        }
        let handler = Arc::new(Catcher {
            state: crate::handler::HandlerState::new(),
            hits: std::sync::Mutex::new(0),
        });
        let id = looper.register_handler(handler.clone());
        looper.start(false).unwrap();

        {
            let buf = Buffer::new(4);
            buf.set_farewell_message(Message::new(id));
        }

        let start = std::time::Instant::now();
        while *handler.hits.lock().unwrap() == 0 && start.elapsed() < Duration::from_secs(2) {
            std::thread::sleep(Duration::from_millis(5));
        }
        looper.stop().unwrap();
        assert_eq!(*handler.hits.lock().unwrap(), 1);
    }
}
