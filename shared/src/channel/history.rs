use std::collections::VecDeque;

use crate::types::update::RealTimeUpdate;

/// Maximum number of updates kept, newest first.
pub const HISTORY_CAPACITY: usize = 10;

/// Newest-first list of recently admitted updates, never longer than
/// [`HISTORY_CAPACITY`].
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct HistoryBuffer {
    entries: VecDeque<RealTimeUpdate>,
}

impl HistoryBuffer {
    pub fn new() -> Self {
        Self {
            entries: VecDeque::with_capacity(HISTORY_CAPACITY + 1),
        }
    }

    /// Prepend `update`, dropping the oldest entry once the cap is exceeded.
    /// Returns the evicted entry, if any.
    pub fn push(&mut self, update: RealTimeUpdate) -> Option<RealTimeUpdate> {
        self.entries.push_front(update);
        if self.entries.len() > HISTORY_CAPACITY {
            self.entries.pop_back()
        } else {
            None
        }
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Most recently admitted update.
    pub fn newest(&self) -> Option<&RealTimeUpdate> {
        self.entries.front()
    }

    /// Newest first.
    pub fn iter(&self) -> impl DoubleEndedIterator<Item = &RealTimeUpdate> + ExactSizeIterator {
        self.entries.iter()
    }

    /// Newest first, at most `limit` entries.
    pub fn recent(&self, limit: usize) -> Vec<RealTimeUpdate> {
        self.entries.iter().take(limit).cloned().collect()
    }

    pub fn to_vec(&self) -> Vec<RealTimeUpdate> {
        self.entries.iter().cloned().collect()
    }

    pub fn clear(&mut self) {
        self.entries.clear();
    }
}
