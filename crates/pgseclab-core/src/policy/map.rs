//! Ordered, duplicate-rejecting string-keyed map for policy sections.
//!
//! Validation reports the first violation in document order, so `roles` and
//! `tables` keep the order they were written in. Lookups are linear; policy
//! documents hold tens of entries, not thousands.

use std::fmt;
use std::marker::PhantomData;

use serde::de::{Deserialize, Deserializer, MapAccess, Visitor};

#[derive(Debug, Clone, PartialEq)]
pub struct PolicyMap<V> {
    entries: Vec<(String, V)>,
}

impl<V> Default for PolicyMap<V> {
    fn default() -> Self {
        Self { entries: Vec::new() }
    }
}

impl<V> PolicyMap<V> {
    pub fn new() -> Self {
        Self::default()
    }

    /// Insert a new key. Returns false (and leaves the map unchanged) if the key exists.
    pub fn insert(&mut self, key: impl Into<String>, value: V) -> bool {
        let key = key.into();
        if self.contains_key(&key) {
            return false;
        }
        self.entries.push((key, value));
        true
    }

    pub fn get(&self, key: &str) -> Option<&V> {
        self.entries.iter().find(|(k, _)| k == key).map(|(_, v)| v)
    }

    pub fn contains_key(&self, key: &str) -> bool {
        self.entries.iter().any(|(k, _)| k == key)
    }

    /// Entries in document order.
    pub fn iter(&self) -> impl Iterator<Item = (&str, &V)> {
        self.entries.iter().map(|(k, v)| (k.as_str(), v))
    }

    /// Entries sorted lexicographically by key (stable compile order).
    pub fn sorted(&self) -> Vec<(&str, &V)> {
        let mut out: Vec<(&str, &V)> = self.iter().collect();
        out.sort_by(|a, b| a.0.cmp(b.0));
        out
    }

    pub fn keys(&self) -> impl Iterator<Item = &str> {
        self.entries.iter().map(|(k, _)| k.as_str())
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}

impl<K: Into<String>, V> FromIterator<(K, V)> for PolicyMap<V> {
    fn from_iter<I: IntoIterator<Item = (K, V)>>(iter: I) -> Self {
        let mut map = PolicyMap::new();
        for (k, v) in iter {
            map.insert(k, v);
        }
        map
    }
}

impl<'de, V: Deserialize<'de>> Deserialize<'de> for PolicyMap<V> {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        deserializer.deserialize_map(PolicyMapVisitor(PhantomData))
    }
}

struct PolicyMapVisitor<V>(PhantomData<V>);

impl<'de, V: Deserialize<'de>> Visitor<'de> for PolicyMapVisitor<V> {
    type Value = PolicyMap<V>;

    fn expecting(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str("a mapping with unique string keys")
    }

    fn visit_unit<E: serde::de::Error>(self) -> Result<Self::Value, E> {
        // `tables:` with no body
        Ok(PolicyMap::new())
    }

    fn visit_map<A: MapAccess<'de>>(self, mut access: A) -> Result<Self::Value, A::Error> {
        let mut map = PolicyMap::new();
        while let Some((key, value)) = access.next_entry::<String, V>()? {
            if map.contains_key(&key) {
                return Err(serde::de::Error::custom(format!("duplicate key: {key}")));
            }
            map.insert(key, value);
        }
        Ok(map)
    }
}

#[cfg(test)]
mod tests {
    #![allow(clippy::unwrap_used)]

    use super::*;

    #[test]
    fn keeps_document_order_and_sorts_on_demand() {
        let map: PolicyMap<u32> = serde_yaml::from_str("b: 1\na: 2\nc: 3\n").unwrap();
        assert_eq!(map.keys().collect::<Vec<_>>(), ["b", "a", "c"]);
        let sorted: Vec<&str> = map.sorted().into_iter().map(|(k, _)| k).collect();
        assert_eq!(sorted, ["a", "b", "c"]);
    }

    #[test]
    fn rejects_duplicate_keys() {
        let res: std::result::Result<PolicyMap<u32>, _> = serde_yaml::from_str("a: 1\na: 2\n");
        assert!(res.is_err());
    }

    #[test]
    fn insert_refuses_existing_key() {
        let mut map = PolicyMap::new();
        assert!(map.insert("x", 1));
        assert!(!map.insert("x", 2));
        assert_eq!(map.get("x"), Some(&1));
    }
}
