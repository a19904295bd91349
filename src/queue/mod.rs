//! FIFO storage for sanitised events.
//!
//! Both queue flavours share [`EventQueue`]: events are appended at the tail
//! and removed from the head in contiguous batches once delivered (or given
//! up on). [`MemoryEventQueue`] keeps everything in memory;
//! [`DurableEventQueue`] additionally mirrors the whole queue to a snapshot
//! file after every mutation so pending events survive a restart.

pub mod codec;
mod durable;


use std::collections::VecDeque;

pub use durable::{DurableEventQueue, MIN_DISK_BYTES, QUEUE_DIR_NAME, QUEUE_FILE_NAME};

use crate::event::Event;

/// Ordered event storage with peek/drop batch semantics.
pub trait EventQueue: Send {
    /// Number of queued events.
    fn len(&self) -> usize;

    fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Append `event` at the tail.
    fn enqueue(&mut self, event: Event);

    /// Copy up to `max_count` events from the head without removing them.
    fn peek_batch(&self, max_count: usize) -> Vec<Event>;

    /// Remove `count` events from the head, or all of them if fewer remain.
    fn drop_batch(&mut self, count: usize);
}

/// In-memory queue with no persistence.
#[derive(Debug, Default)]
pub struct MemoryEventQueue {
    events: VecDeque<Event>,
}

impl MemoryEventQueue {
    pub fn new() -> Self {
        Self::default()
    }

    pub(crate) fn iter(&self) -> impl ExactSizeIterator<Item = &Event> {
        self.events.iter()
    }
}

impl FromIterator<Event> for MemoryEventQueue {
    fn from_iter<T: IntoIterator<Item = Event>>(iter: T) -> Self {
        Self {
            events: iter.into_iter().collect(),
        }
    }
}

impl EventQueue for MemoryEventQueue {
    fn len(&self) -> usize {
        self.events.len()
    }

    fn enqueue(&mut self, event: Event) {
        self.events.push_back(event);
    }

    fn peek_batch(&self, max_count: usize) -> Vec<Event> {
        self.events.iter().take(max_count).cloned().collect()
    }

    fn drop_batch(&mut self, count: usize) {
        let count = count.min(self.events.len());
        self.events.drain(..count);
    }
}
