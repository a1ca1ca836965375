//! Keyed state with an undo log.
//!
//! [`UndoMap`] is a `BTreeMap` that records the previous value of every key
//! it writes. A transaction takes a [`UndoMap::mark`] on entry; rolling back
//! replays the log down to that mark, newest first, and committing the
//! outermost transaction discards the log. The cost of a rollback is the
//! number of writes made since the mark, not the size of the map.

use std::collections::BTreeMap;
use std::ops::RangeBounds;

/// Position in an undo log.
pub type UndoMark = usize;

/// A map whose writes can be undone back to a mark.
#[derive(Clone, Debug)]
pub struct UndoMap<K: Ord + Clone, V: Clone> {
    entries: BTreeMap<K, V>,
    log: Vec<(K, Option<V>)>,
}

impl<K: Ord + Clone, V: Clone> Default for UndoMap<K, V> {
    fn default() -> Self {
        Self {
            entries: BTreeMap::new(),
            log: Vec::new(),
        }
    }
}

impl<K: Ord + Clone, V: Clone> UndoMap<K, V> {
    /// Value stored under `key`.
    pub fn get(&self, key: &K) -> Option<&V> {
        self.entries.get(key)
    }

    /// Whether `key` has a value.
    pub fn contains_key(&self, key: &K) -> bool {
        self.entries.contains_key(key)
    }

    /// Store `value` under `key`, returning the previous value.
    pub fn insert(&mut self, key: K, value: V) -> Option<V> {
        let previous = self.entries.insert(key.clone(), value);
        self.log.push((key, previous.clone()));
        previous
    }

    /// Remove `key`, returning its value.
    pub fn remove(&mut self, key: &K) -> Option<V> {
        let previous = self.entries.remove(key);
        if previous.is_some() {
            self.log.push((key.clone(), previous.clone()));
        }
        previous
    }

    /// Mutable access to the value under `key`. The current value is logged
    /// whether or not the caller changes it.
    pub fn get_mut(&mut self, key: &K) -> Option<&mut V> {
        let current = self.entries.get(key)?.clone();
        self.log.push((key.clone(), Some(current)));
        self.entries.get_mut(key)
    }

    /// Mutable access to the value under `key`, inserting `V::default()`
    /// first if absent.
    pub fn get_or_default(&mut self, key: K) -> &mut V
    where
        V: Default,
    {
        let previous = self.entries.get(&key).cloned();
        self.log.push((key.clone(), previous));
        self.entries.entry(key).or_default()
    }

    /// Entries with keys in `range`, in key order.
    pub fn range<R: RangeBounds<K>>(&self, range: R) -> impl Iterator<Item = (&K, &V)> {
        self.entries.range(range)
    }

    /// Number of stored keys.
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    /// Whether the map is empty.
    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Current end of the undo log.
    pub fn mark(&self) -> UndoMark {
        self.log.len()
    }

    /// Undo every write made after `mark`.
    pub fn rollback(&mut self, mark: UndoMark) {
        while self.log.len() > mark {
            let Some((key, previous)) = self.log.pop() else {
                break;
            };
            match previous {
                Some(value) => {
                    self.entries.insert(key, value);
                }
                None => {
                    self.entries.remove(&key);
                }
            }
        }
    }

    /// Forget the undo log. Only valid once no transaction is open.
    pub fn commit(&mut self) {
        self.log.clear();
    }

    /// Pending undo entries.
    pub fn log_len(&self) -> usize {
        self.log.len()
    }
}
