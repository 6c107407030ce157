use std::collections::VecDeque;

/// Default number of readings kept for the host
pub const DEFAULT_BUFFER_CAPACITY: usize = 25;

/// Largest capacity a config may ask for
pub const MAX_BUFFER_CAPACITY: usize = 4096;

/// Bounded FIFO that drops its oldest entry on overflow.
///
/// One producer (sensor callbacks) and one consumer (host polling); callers
/// provide the serialization, the buffer itself is not synchronized.
#[derive(Debug, Clone)]
pub struct EventBuffer<T> {
    items: VecDeque<T>,
    capacity: usize,
}

impl<T> EventBuffer<T> {
    /// Create an empty buffer. A capacity of zero is raised to one, and
    /// storage grows on demand past the default size.
    pub fn new(capacity: usize) -> Self {
        let capacity = capacity.max(1);
        Self {
            items: VecDeque::with_capacity(capacity.min(DEFAULT_BUFFER_CAPACITY)),
            capacity,
        }
    }

    /// Append to the tail, evicting and returning the head when over capacity
    pub fn record(&mut self, item: T) -> Option<T> {
        self.items.push_back(item);
        if self.items.len() > self.capacity {
            self.items.pop_front()
        } else {
            None
        }
    }

    /// Pop the oldest entry, `None` when empty
    pub fn consume_one(&mut self) -> Option<T> {
        self.items.pop_front()
    }

    pub fn len(&self) -> usize {
        self.items.len()
    }

    pub fn is_empty(&self) -> bool {
        self.items.is_empty()
    }

    pub fn capacity(&self) -> usize {
        self.capacity
    }

    /// Oldest to newest
    #[cfg(test)]
    pub fn iter(&self) -> impl Iterator<Item = &T> {
        self.items.iter()
    }
}

impl<T> Default for EventBuffer<T> {
    fn default() -> Self {
        Self::new(DEFAULT_BUFFER_CAPACITY)
    }
}
