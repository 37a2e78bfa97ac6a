// Copyright (C) 2024 Huawei Device Co., Ltd.
// Licensed under the Apache License, Version 2.0 (the "License");
// you may not use this file except in compliance with the License.
// You may obtain a copy of the License at
//
//     http://www.apache.org/licenses/LICENSE-2.0
//
// Unless required by applicable law or agreed to in writing, software
// distributed under the License is distributed on an "AS IS" BASIS,
// WITHOUT WARRANTIES OR CONDITIONS OF ANY KIND, either express or implied.
// See the License for the specific language governing permissions and
// limitations under the License.

//! Access-ordered map for Least Recently Used bookkeeping.
//!
//! Entries are kept in an insertion-ordered hash map. Every hit moves the
//! entry to the tail, so the head is always the least recently used entry and
//! lookups, inserts and promotions stay O(1) amortised.

use std::hash::Hash;

use indexmap::{Equivalent, IndexMap};

/// A map that remembers the order in which its entries were last touched.
///
/// # Examples
///
/// ```rust
/// use asset_utils::lru::LruMap;
///
/// let mut map = LruMap::new();
/// map.insert("a", 1);
/// map.insert("b", 2);
/// map.get(&"a");
/// assert_eq!(map.pop(), Some(("b", 2)));
/// ```
pub struct LruMap<K, V> {
    map: IndexMap<K, V>,
}

impl<K: Hash + Eq, V> LruMap<K, V> {
    /// Creates an empty map.
    pub fn new() -> Self {
        Self {
            map: IndexMap::new(),
        }
    }

    /// Inserts a value as the most recently used entry.
    ///
    /// # Returns
    /// The value previously stored under `key`, if any.
    pub fn insert(&mut self, key: K, value: V) -> Option<V> {
        let old = self.map.shift_remove(&key);
        self.map.insert(key, value);
        old
    }

    /// Returns the value for `key` and marks it most recently used.
    pub fn get<Q>(&mut self, key: &Q) -> Option<&V>
    where
        Q: ?Sized + Hash + Equivalent<K>,
    {
        let idx = self.promote(key)?;
        self.map.get_index(idx).map(|(_, v)| v)
    }

    /// Returns a mutable reference for `key` and marks it most recently used.
    pub fn get_mut<Q>(&mut self, key: &Q) -> Option<&mut V>
    where
        Q: ?Sized + Hash + Equivalent<K>,
    {
        let idx = self.promote(key)?;
        self.map.get_index_mut(idx).map(|(_, v)| v)
    }

    /// Returns the value for `key` without touching the access order.
    pub fn peek<Q>(&self, key: &Q) -> Option<&V>
    where
        Q: ?Sized + Hash + Equivalent<K>,
    {
        self.map.get(key)
    }

    /// Returns a mutable reference without touching the access order.
    pub fn peek_mut<Q>(&mut self, key: &Q) -> Option<&mut V>
    where
        Q: ?Sized + Hash + Equivalent<K>,
    {
        self.map.get_mut(key)
    }

    /// Returns the least recently used entry without removing it.
    pub fn front(&self) -> Option<(&K, &V)> {
        self.map.first()
    }

    /// Removes and returns the least recently used entry.
    pub fn pop(&mut self) -> Option<(K, V)> {
        self.map.shift_remove_index(0)
    }

    /// Removes `key` from the map.
    pub fn remove<Q>(&mut self, key: &Q) -> Option<V>
    where
        Q: ?Sized + Hash + Equivalent<K>,
    {
        self.map.shift_remove(key)
    }

    /// Checks whether `key` is present.
    pub fn contains_key<Q>(&self, key: &Q) -> bool
    where
        Q: ?Sized + Hash + Equivalent<K>,
    {
        self.map.contains_key(key)
    }

    /// Returns the number of entries.
    pub fn len(&self) -> usize {
        self.map.len()
    }

    /// Checks whether the map is empty.
    pub fn is_empty(&self) -> bool {
        self.map.is_empty()
    }

    /// Iterates from least to most recently used.
    pub fn iter(&self) -> impl Iterator<Item = (&K, &V)> {
        self.map.iter()
    }

    /// Removes every entry, yielding them from least to most recently used.
    pub fn drain(&mut self) -> impl Iterator<Item = (K, V)> + '_ {
        self.map.drain(..)
    }

    fn promote<Q>(&mut self, key: &Q) -> Option<usize>
    where
        Q: ?Sized + Hash + Equivalent<K>,
    {
        let idx = self.map.get_index_of(key)?;
        let last = self.map.len() - 1;
        if idx != last {
            self.map.move_index(idx, last);
        }
        Some(last)
    }
}
