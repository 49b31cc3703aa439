//! LRU (Least Recently Used) map with fixed capacity
//!
//! Entries live in a slab of slots linked into a recency list; the hash map
//! points keys at slots so lookup, promotion and eviction are all O(1).

use std::borrow::Borrow;
use std::collections::HashMap;
use std::hash::Hash;
use ahash::RandomState;

struct Slot<K, V> {
    key: K,
    value: V,
    newer: Option<usize>,
    older: Option<usize>,
}

/// LRU cache with fixed capacity
pub struct LruCache<K, V> {
    map: HashMap<K, usize, RandomState>,
    slots: Vec<Option<Slot<K, V>>>,
    vacant: Vec<usize>,
    /// Most recently used
    newest: Option<usize>,
    /// Next to evict
    oldest: Option<usize>,
    capacity: usize,
}

impl<K, V> LruCache<K, V>
where
    K: Hash + Eq + Clone,
{
    /// Create a new LRU cache holding at most `capacity` entries
    pub fn new(capacity: usize) -> Self {
        assert!(capacity > 0, "Capacity must be greater than 0");

        Self {
            map: HashMap::with_capacity_and_hasher(capacity, RandomState::new()),
            slots: Vec::with_capacity(capacity),
            vacant: Vec::new(),
            newest: None,
            oldest: None,
            capacity,
        }
    }

    /// Look up a value and mark it most recently used
    pub fn get<Q>(&mut self, key: &Q) -> Option<&V>
    where
        K: Borrow<Q>,
        Q: Hash + Eq + ?Sized,
    {
        let idx = *self.map.get(key)?;
        self.promote(idx);
        self.slots[idx].as_ref().map(|slot| &slot.value)
    }

    /// Look up a value without touching recency
    pub fn peek<Q>(&self, key: &Q) -> Option<&V>
    where
        K: Borrow<Q>,
        Q: Hash + Eq + ?Sized,
    {
        let idx = *self.map.get(key)?;
        self.slots[idx].as_ref().map(|slot| &slot.value)
    }

    /// True if the key is cached
    pub fn contains<Q>(&self, key: &Q) -> bool
    where
        K: Borrow<Q>,
        Q: Hash + Eq + ?Sized,
    {
        self.map.contains_key(key)
    }

    /// Insert or replace a value.
    ///
    /// Returns the least recently used entry if it had to make room.
    pub fn put(&mut self, key: K, value: V) -> Option<(K, V)> {
        if let Some(&idx) = self.map.get(&key) {
            if let Some(slot) = self.slots[idx].as_mut() {
                slot.value = value;
            }
            self.promote(idx);
            return None;
        }

        let evicted = if self.map.len() >= self.capacity {
            self.pop_oldest()
        } else {
            None
        };

        let idx = match self.vacant.pop() {
            Some(idx) => idx,
            None => {
                self.slots.push(None);
                self.slots.len() - 1
            }
        };
        self.slots[idx] = Some(Slot {
            key: key.clone(),
            value,
            newer: None,
            older: None,
        });
        self.link_front(idx);
        self.map.insert(key, idx);

        evicted
    }

    /// Remove a key, returning its value
    pub fn remove<Q>(&mut self, key: &Q) -> Option<V>
    where
        K: Borrow<Q>,
        Q: Hash + Eq + ?Sized,
    {
        let idx = self.map.remove(key)?;
        self.detach(idx);
        self.vacant.push(idx);
        self.slots[idx].take().map(|slot| slot.value)
    }

    /// Remove and return the least recently used entry
    pub fn pop_oldest(&mut self) -> Option<(K, V)> {
        let idx = self.oldest?;
        self.detach(idx);
        self.vacant.push(idx);
        let slot = self.slots[idx].take()?;
        self.map.remove(&slot.key);
        Some((slot.key, slot.value))
    }

    /// Keys from most to least recently used
    pub fn keys(&self) -> impl Iterator<Item = &K> + '_ {
        let mut cursor = self.newest;
        std::iter::from_fn(move || {
            let slot = self.slots[cursor?].as_ref()?;
            cursor = slot.older;
            Some(&slot.key)
        })
    }

    /// Number of cached entries
    pub fn len(&self) -> usize {
        self.map.len()
    }

    /// Check if the cache is empty
    pub fn is_empty(&self) -> bool {
        self.map.is_empty()
    }

    /// Maximum number of entries
    pub fn capacity(&self) -> usize {
        self.capacity
    }

    /// Drop every entry
    pub fn clear(&mut self) {
        self.map.clear();
        self.slots.clear();
        self.vacant.clear();
        self.newest = None;
        self.oldest = None;
    }

    fn promote(&mut self, idx: usize) {
        if self.newest == Some(idx) {
            return;
        }
        self.detach(idx);
        self.link_front(idx);
    }

    fn link_front(&mut self, idx: usize) {
        let old_newest = self.newest;
        if let Some(slot) = self.slots[idx].as_mut() {
            slot.newer = None;
            slot.older = old_newest;
        }
        if let Some(prev) = old_newest.and_then(|i| self.slots[i].as_mut()) {
            prev.newer = Some(idx);
        }
        self.newest = Some(idx);
        if self.oldest.is_none() {
            self.oldest = Some(idx);
        }
    }

    fn detach(&mut self, idx: usize) {
        let Some((newer, older)) = self.slots[idx].as_ref().map(|s| (s.newer, s.older)) else {
            return;
        };

        match newer.and_then(|i| self.slots[i].as_mut()) {
            Some(slot) => slot.older = older,
            None => self.newest = older,
        }
        match older.and_then(|i| self.slots[i].as_mut()) {
            Some(slot) => slot.newer = newer,
            None => self.oldest = newer,
        }
    }
}
