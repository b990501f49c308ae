//! Bounded buffer for pending lines or points.

/// Collects items until `limit` of them are pending.
///
/// The caller appends, asks `is_full` and drains. Draining hands out the
/// current contents and leaves an empty buffer behind, no matter what
/// happens to the drained items afterwards.
#[derive(Debug)]
pub struct Batch<T> {
    items: Vec<T>,
    limit: usize,
}

impl<T> Batch<T> {
    /// A zero limit is treated as one.
    pub fn new(limit: usize) -> Self {
        let limit = limit.max(1);
        Batch {
            items: Vec::with_capacity(limit.min(4096)),
            limit,
        }
    }

    pub fn append(&mut self, item: T) {
        self.items.push(item);
    }

    /// True once the buffer holds `limit` items.
    pub fn is_full(&self) -> bool {
        self.items.len() >= self.limit
    }

    /// Take every pending item. An empty buffer drains to an empty vec.
    pub fn drain(&mut self) -> Vec<T> {
        std::mem::replace(&mut self.items, Vec::with_capacity(self.limit.min(4096)))
    }

    pub fn len(&self) -> usize {
        self.items.len()
    }

    pub fn is_empty(&self) -> bool {
        self.items.is_empty()
    }
}
