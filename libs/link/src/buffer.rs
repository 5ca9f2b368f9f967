use std::collections::VecDeque;
use std::sync::{Mutex, MutexGuard, PoisonError};

use serde::{Deserialize, Serialize};

/// Order in which buffered messages leave the outbound buffer
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum DrainOrder {
    /// Newest message first
    #[default]
    Lifo,
    /// Oldest message first
    Fifo,
}

/// Messages waiting for a connected channel
///
/// Producers push from any thread; only the driver pops. A message whose write failed
/// is restored to the position it was taken from, so the next drain starts with it.
pub(crate) struct OutboundBuffer<M> {
    queue: Mutex<VecDeque<M>>,
    order: DrainOrder,
}

impl<M> OutboundBuffer<M> {
    pub(crate) fn new(order: DrainOrder) -> Self {
        Self {
            queue: Mutex::new(VecDeque::new()),
            order,
        }
    }

    pub(crate) fn push(&self, message: M) {
        self.lock().push_back(message);
    }

    /// Take the next message to deliver
    pub(crate) fn pop(&self) -> Option<M> {
        let mut queue = self.lock();
        match self.order {
            DrainOrder::Lifo => queue.pop_back(),
            DrainOrder::Fifo => queue.pop_front(),
        }
    }

    /// Put back a message obtained from `pop` that could not be written
    pub(crate) fn restore(&self, message: M) {
        let mut queue = self.lock();
        match self.order {
            DrainOrder::Lifo => queue.push_back(message),
            DrainOrder::Fifo => queue.push_front(message),
        }
    }

    pub(crate) fn len(&self) -> usize {
        self.lock().len()
    }

    pub(crate) fn is_empty(&self) -> bool {
        self.lock().is_empty()
    }

    /// Drop everything; only used on dispose
    pub(crate) fn clear(&self) {
        self.lock().clear();
    }

    // A panicking producer cannot leave the deque half-updated, so poisoning is ignored.
    fn lock(&self) -> MutexGuard<'_, VecDeque<M>> {
        self.queue.lock().unwrap_or_else(PoisonError::into_inner)
    }
}
