//! Insertion-ordered map from a key to every value recorded under it.
//!
//! Script files repeat keys freely (`country_event = { ... }` hundreds of
//! times), so anything keyed by script keys goes through this type instead
//! of a unique-key map: inserting never replaces, it appends.

use std::hash::Hash;

use indexmap::map::Entry as MapEntry;
use indexmap::IndexMap;
use serde::ser::{Serialize, Serializer};

#[derive(Debug, Clone)]
pub struct OrderedMultiMap<K, V> {
    inner: IndexMap<K, Vec<V>>,
}

impl<K: Hash + Eq, V> OrderedMultiMap<K, V> {
    pub fn new() -> Self {
        OrderedMultiMap {
            inner: IndexMap::new(),
        }
    }

    /// Append `value` to the values under `key`. Keys keep the position of
    /// their first insertion.
    pub fn insert(&mut self, key: K, value: V) {
        match self.inner.entry(key) {
            MapEntry::Occupied(mut slot) => slot.get_mut().push(value),
            MapEntry::Vacant(slot) => {
                slot.insert(vec![value]);
            }
        }
    }

    /// All values under `key`, oldest first. Empty when the key is absent.
    pub fn get<Q>(&self, key: &Q) -> &[V]
    where
        K: std::borrow::Borrow<Q>,
        Q: Hash + Eq + ?Sized,
    {
        self.inner.get(key).map(Vec::as_slice).unwrap_or(&[])
    }

    pub fn contains_key<Q>(&self, key: &Q) -> bool
    where
        K: std::borrow::Borrow<Q>,
        Q: Hash + Eq + ?Sized,
    {
        self.inner.contains_key(key)
    }

    /// Remove a key and hand back everything recorded under it.
    pub fn remove<Q>(&mut self, key: &Q) -> Vec<V>
    where
        K: std::borrow::Borrow<Q>,
        Q: Hash + Eq + ?Sized,
    {
        self.inner.shift_remove(key).unwrap_or_default()
    }

    pub fn keys(&self) -> impl Iterator<Item = &K> {
        self.inner.keys()
    }

    pub fn iter(&self) -> impl Iterator<Item = (&K, &[V])> {
        self.inner.iter().map(|(k, v)| (k, v.as_slice()))
    }

    /// Number of distinct keys.
    pub fn key_count(&self) -> usize {
        self.inner.len()
    }

    /// Number of values across all keys.
    pub fn value_count(&self) -> usize {
        self.inner.values().map(Vec::len).sum()
    }

    pub fn is_empty(&self) -> bool {
        self.inner.is_empty()
    }
}

impl<K: Hash + Eq, V> Default for OrderedMultiMap<K, V> {
    fn default() -> Self {
        Self::new()
    }
}

impl<K: Hash + Eq, V> FromIterator<(K, V)> for OrderedMultiMap<K, V> {
    fn from_iter<I: IntoIterator<Item = (K, V)>>(iter: I) -> Self {
        let mut map = OrderedMultiMap::new();
        for (key, value) in iter {
            map.insert(key, value);
        }
        map
    }
}

/// Serialized as a map from each key to the list of its values.
impl<K: Serialize, V: Serialize> Serialize for OrderedMultiMap<K, V> {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.collect_map(self.inner.iter())
    }
}
