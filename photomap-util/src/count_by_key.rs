use std::collections::BTreeMap;
use std::fmt::Display;

use serde::{Serialize, Serializer};

/// Counter keyed by `Option<K>`, serialized as a map with `None` written as `"Unknown"`.
///
/// Keys serialize in ascending order with `"Unknown"` last.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CountByKey<K: Ord> {
    known: BTreeMap<K, u64>,
    unknown: u64,
}

impl<K: Ord> Default for CountByKey<K> {
    fn default() -> Self {
        Self {
            known: BTreeMap::new(),
            unknown: 0,
        }
    }
}

impl<K: Ord> CountByKey<K> {
    pub fn increment(&mut self, key: Option<K>) {
        match key {
            Some(k) => *self.known.entry(k).or_default() += 1,
            None => self.unknown += 1,
        }
    }

    pub fn get(&self, key: Option<&K>) -> u64 {
        match key {
            Some(k) => self.known.get(k).copied().unwrap_or_default(),
            None => self.unknown,
        }
    }

    pub fn total(&self) -> u64 {
        self.known.values().sum::<u64>() + self.unknown
    }

    pub fn is_empty(&self) -> bool {
        self.known.is_empty() && self.unknown == 0
    }
}

impl<K: Ord> FromIterator<Option<K>> for CountByKey<K> {
    fn from_iter<I: IntoIterator<Item = Option<K>>>(iter: I) -> Self {
        let mut counts = Self::default();
        for key in iter {
            counts.increment(key);
        }
        counts
    }
}

impl<K: Ord + Display> Serialize for CountByKey<K> {
    fn serialize<S>(&self, serializer: S) -> Result<S::Ok, S::Error>
    where
        S: Serializer,
    {
        let entries = self
            .known
            .iter()
            .map(|(k, v)| (k.to_string(), *v))
            .chain((self.unknown > 0).then(|| ("Unknown".to_string(), self.unknown)));
        serializer.collect_map(entries)
    }
}
