//! Bounded recency set of item IDs already shown to the user.

use std::collections::VecDeque;

/// Most-recent-first list of unique IDs, capped at `capacity`.
///
/// Membership is a linear scan; the history holds a few hundred entries.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct SeenIdHistory {
    ids: VecDeque<String>,
    capacity: usize,
}

impl SeenIdHistory {
    pub fn new(capacity: usize) -> Self {
        Self {
            ids: VecDeque::with_capacity(capacity.min(1024)),
            capacity,
        }
    }

    /// Rebuild from a most-recent-first list, dropping duplicates and overflow.
    pub fn from_ids<I>(ids: I, capacity: usize) -> Self
    where
        I: IntoIterator<Item = String>,
    {
        let mut history = Self::new(capacity);
        for id in ids {
            if history.ids.len() >= capacity {
                break;
            }
            if !history.contains(&id) {
                history.ids.push_back(id);
            }
        }
        history
    }

    /// Record `id` as just shown. No-op when already present.
    pub fn push(&mut self, id: &str) {
        if self.contains(id) {
            return;
        }
        self.ids.push_front(id.to_string());
        self.ids.truncate(self.capacity);
    }

    pub fn contains(&self, id: &str) -> bool {
        self.ids.iter().any(|seen| seen == id)
    }

    /// IDs, most recent first.
    pub fn iter(&self) -> impl Iterator<Item = &str> {
        self.ids.iter().map(String::as_str)
    }

    pub fn len(&self) -> usize {
        self.ids.len()
    }

    pub fn is_empty(&self) -> bool {
        self.ids.is_empty()
    }

    pub fn capacity(&self) -> usize {
        self.capacity
    }

    /// Change the cap, dropping the oldest entries if needed.
    pub fn set_capacity(&mut self, capacity: usize) {
        self.capacity = capacity;
        self.ids.truncate(capacity);
    }
}
