//! Plain FIFO buffer backing the batch aggregator and the concurrency
//! limiter's admission line.

use std::collections::VecDeque;

/// First-in first-out queue.
#[derive(Debug)]
pub struct Queue<T> {
    items: VecDeque<T>,
}

impl<T> Queue<T> {
    #[must_use]
    pub fn new() -> Self {
        Self { items: VecDeque::new() }
    }

    /// Appends an item at the tail.
    pub fn enqueue(&mut self, item: T) {
        self.items.push_back(item);
    }

    /// Removes and returns the head item.
    pub fn dequeue(&mut self) -> Option<T> {
        self.items.pop_front()
    }

    /// Removes up to `count` items from the head, fewer if the queue is
    /// underfull. Counts below 1 are treated as 1.
    pub fn dequeue_multiple(&mut self, count: isize) -> Vec<T> {
        let take = count.max(1) as usize;
        let take = take.min(self.items.len());
        self.items.drain(..take).collect()
    }

    /// Drops every queued item.
    pub fn clear(&mut self) {
        self.items.clear();
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.items.len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.items.is_empty()
    }
}

impl<T> Default for Queue<T> {
    fn default() -> Self {
        Self::new()
    }
}
