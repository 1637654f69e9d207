//! # Ordered task lists
//!
//! Fixed-capacity list of task ids kept sorted by a policy-defined key.
//! Every ready container, the dispatcher's absolute-deadline list and the
//! Dual-Priority promotion list are instances of [`OrderedList`].
//!
//! Insertion places a task *after* every entry with an equal key, so equal
//! keys are served first-in first-out. A FIFO queue is simply an
//! `OrderedList<()>`.

use heapless::Vec;

use crate::config::MAX_TASKS;
use crate::task::TaskId;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
struct Entry<K> {
    key: K,
    id: TaskId,
}

#[derive(Debug, Clone)]
pub struct OrderedList<K> {
    entries: Vec<Entry<K>, MAX_TASKS>,
}

impl<K: Ord + Copy> OrderedList<K> {
    pub const fn new() -> Self {
        Self {
            entries: Vec::new(),
        }
    }

    /// Insert `id` with `key`. A task already in the list is moved to its new
    /// position, so the list never holds the same id twice.
    pub fn insert(&mut self, id: TaskId, key: K) {
        self.remove(id);
        let pos = self
            .entries
            .iter()
            .position(|e| e.key > key)
            .unwrap_or(self.entries.len());
        // Ids are unique and bounded by MAX_TASKS, so there is always room.
        let inserted = self.entries.insert(pos, Entry { key, id });
        debug_assert!(inserted.is_ok());
    }

    /// Remove `id`. Returns `false` if it was not in the list.
    pub fn remove(&mut self, id: TaskId) -> bool {
        match self.entries.iter().position(|e| e.id == id) {
            Some(pos) => {
                self.entries.remove(pos);
                true
            }
            None => false,
        }
    }

    pub fn contains(&self, id: TaskId) -> bool {
        self.entries.iter().any(|e| e.id == id)
    }

    pub fn head(&self) -> Option<TaskId> {
        self.entries.first().map(|e| e.id)
    }

    pub fn head_key(&self) -> Option<K> {
        self.entries.first().map(|e| e.key)
    }

    pub fn pop_head(&mut self) -> Option<(TaskId, K)> {
        if self.entries.is_empty() {
            None
        } else {
            let e = self.entries.remove(0);
            Some((e.id, e.key))
        }
    }

    pub fn key_of(&self, id: TaskId) -> Option<K> {
        self.entries.iter().find(|e| e.id == id).map(|e| e.key)
    }

    /// Ids in list order.
    pub fn ids(&self) -> impl Iterator<Item = TaskId> + '_ {
        self.entries.iter().map(|e| e.id)
    }

    /// `(id, key)` pairs in list order.
    pub fn iter(&self) -> impl Iterator<Item = (TaskId, K)> + '_ {
        self.entries.iter().map(|e| (e.id, e.key))
    }

    #[inline]
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    #[inline]
    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// `true` if keys are non-decreasing from head to tail.
    pub fn is_sorted(&self) -> bool {
        self.entries.windows(2).all(|w| w[0].key <= w[1].key)
    }
}

impl<K: Ord + Copy> Default for OrderedList<K> {
    fn default() -> Self {
        Self::new()
    }
}

/// First-in first-out list of task ids.
pub type FifoList = OrderedList<()>;
