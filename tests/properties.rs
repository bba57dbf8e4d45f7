//! Property tests for invariants that must hold regardless of the specific
//! values involved: `HandlerId` allocation never reuses an id, and queued
//! messages are always delivered in non-decreasing `when` order.

use std::sync::{Arc, Mutex};
use std::time::{Duration, Instant};

use proptest::prelude::*;
use stagelooper::{Handler, HandlerState, Looper, Message};

struct Sink {
    state: HandlerState,
    order: Mutex<Vec<u32>>,
}

impl Handler for Sink {
    fn on_message_received(&self, msg: Arc<Message>) {
        self.order.lock().unwrap().push(msg.what());
    }
    fn handler_state(&self) -> &HandlerState {
        &self.state
    }
}

proptest! {
    /// However many handlers get registered with fresh Loopers in one
    /// process, every allocated id is distinct.
    #[test]
    fn handler_ids_are_never_reused(n in 1usize..50) {
        let looper = Looper::new("property-ids");
        let mut ids = Vec::with_capacity(n);
        for _ in 0..n {
            let handler = Arc::new(Sink {
                state: HandlerState::new(),
                order: Mutex::new(Vec::new()),
            });
            ids.push(looper.register_handler(handler).get());
        }
        let mut sorted = ids.clone();
        sorted.sort_unstable();
        sorted.dedup();
        prop_assert_eq!(sorted.len(), ids.len());
    }

    /// Posting a batch of messages with arbitrary (small) delays always
    /// yields delivery in non-decreasing delay order: if message A's delay
    /// is strictly less than message B's, A is never observed after B.
    #[test]
    fn delivery_respects_delay_order(delays_ms in proptest::collection::vec(0u64..40, 1..12)) {
        let looper = Looper::new("property-order");
        let handler = Arc::new(Sink {
            state: HandlerState::new(),
            order: Mutex::new(Vec::new()),
        });
        let id = looper.register_handler(handler.clone());
        looper.start(false).unwrap();

        let total = delays_ms.len();
        for (tag, delay) in delays_ms.iter().enumerate() {
            let msg = Message::with_what(id, tag as u32);
            msg.post(Duration::from_millis(*delay)).unwrap();
        }

        let start = Instant::now();
        while handler.order.lock().unwrap().len() < total && start.elapsed() < Duration::from_secs(5) {
            std::thread::sleep(Duration::from_millis(2));
        }
        looper.stop().unwrap();

        let observed = handler.order.lock().unwrap().clone();
        prop_assert_eq!(observed.len(), total);

        let position_of_tag: Vec<usize> = {
            let mut positions = vec![0usize; total];
            for (position, tag) in observed.iter().enumerate() {
                positions[*tag as usize] = position;
            }
            positions
        };
        for a in 0..total {
            for b in 0..total {
                if delays_ms[a] < delays_ms[b] {
                    prop_assert!(position_of_tag[a] < position_of_tag[b]);
                }
            }
        }
    }
}

#[test]
fn unassigned_id_is_never_allocated() {
    let looper = Looper::new("property-unassigned");
    let handler = Arc::new(Sink {
        state: HandlerState::new(),
        order: Mutex::new(Vec::new()),
    });
    let id = looper.register_handler(handler);
    assert!(!id.is_unassigned());
}
