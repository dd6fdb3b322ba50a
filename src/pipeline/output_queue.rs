//! FIFO of produced-but-unpulled messages.
//!
//! Each entry remembers the iteration it was produced in. `next_ready` only
//! hands out entries produced at or before the iteration being pulled, each
//! exactly once and in production order. Delivered entries are removed on
//! delivery, so nothing already pulled is around when the next iteration's
//! pushes start; undelivered entries carry over.

use crate::pipeline::id::Iteration;
use crate::pipeline::message::MediaMessage;
use std::collections::VecDeque;

#[derive(Debug)]
struct QueuedMessage {
    produced_at: Iteration,
    message: MediaMessage,
}

#[derive(Debug, Default)]
pub struct OutputQueue {
    entries: VecDeque<QueuedMessage>,
    produced: u64,
    delivered: u64,
}

impl OutputQueue {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn enqueue(&mut self, produced_at: Iteration, message: MediaMessage) {
        debug_assert!(
            self.entries
                .back()
                .map_or(true, |last| last.produced_at <= produced_at),
            "output produced out of iteration order"
        );
        self.entries.push_back(QueuedMessage {
            produced_at,
            message,
        });
        self.produced += 1;
    }

    /// Next message produced no later than `iteration`, if any.
    pub fn next_ready(&mut self, iteration: Iteration) -> Option<MediaMessage> {
        if self.entries.front()?.produced_at > iteration {
            return None;
        }
        let entry = self.entries.pop_front()?;
        self.delivered += 1;
        Some(entry.message)
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Drop everything still queued. Returns how many entries were discarded.
    pub fn clear(&mut self) -> usize {
        let n = self.entries.len();
        self.entries.clear();
        n
    }

    pub fn produced(&self) -> u64 {
        self.produced
    }

    pub fn delivered(&self) -> u64 {
        self.delivered
    }
}
