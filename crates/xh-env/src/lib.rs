// SPDX-License-Identifier: MIT OR Apache-2.0
//! Microcrate for keyed `KEY=VALUE` environment lists.
//!
//! [`EnvList`] keeps entries in insertion order and never holds two entries
//! for the same key: every write goes through [`EnvList::upsert`], which
//! replaces an existing entry in place or appends a new one.
#![deny(unsafe_code)]
#![warn(missing_docs)]

use std::fmt;
use thiserror::Error;

/// Errors raised while turning caller input into environment entries.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum EnvError {
    /// A flat key/value sequence had an odd number of elements.
    #[error("key/value pairs require an even number of elements, got {count}")]
    OddPairCount {
        /// Number of elements supplied.
        count: usize,
    },

    /// A `key=value` string had no `=` separator.
    #[error("environment entry {entry:?} is not formatted as key=value")]
    MissingSeparator {
        /// The offending entry.
        entry: String,
    },

    /// A `key=value` string (or pair) had an empty key.
    #[error("environment entry {entry:?} has an empty key")]
    EmptyKey {
        /// The offending entry.
        entry: String,
    },

    /// A key contained `=`, which would make the entry ambiguous.
    #[error("environment key {key:?} must not contain '='")]
    InvalidKey {
        /// The offending key.
        key: String,
    },
}

/// Reject keys the OS could not round-trip: empty ones and ones holding `=`.
pub fn check_key(key: &str, value: &str) -> Result<(), EnvError> {
    if key.is_empty() {
        return Err(EnvError::EmptyKey {
            entry: format!("={value}"),
        });
    }
    if key.contains('=') {
        return Err(EnvError::InvalidKey {
            key: key.to_string(),
        });
    }
    Ok(())
}

/// Split a `key=value` string at its first `=`.
///
/// The value may itself contain `=`; the key may not be empty.
pub fn parse_entry(entry: &str) -> Result<(&str, &str), EnvError> {
    let (key, value) = entry
        .split_once('=')
        .ok_or_else(|| EnvError::MissingSeparator {
            entry: entry.to_string(),
        })?;
    if key.is_empty() {
        return Err(EnvError::EmptyKey {
            entry: entry.to_string(),
        });
    }
    Ok((key, value))
}

/// Group a flat `[k1, v1, k2, v2, ..]` sequence into pairs.
///
/// Fails without producing any pair when the sequence has odd length or
/// any key is rejected by [`check_key`].
pub fn pairs_from_flat<S: AsRef<str>>(flat: &[S]) -> Result<Vec<(String, String)>, EnvError> {
    if flat.len() % 2 != 0 {
        return Err(EnvError::OddPairCount { count: flat.len() });
    }
    flat.chunks_exact(2)
        .map(|kv| {
            let (k, v) = (kv[0].as_ref(), kv[1].as_ref());
            check_key(k, v)?;
            Ok((k.to_string(), v.to_string()))
        })
        .collect()
}

/// Parse a list of `key=value` strings into pairs, failing on the first bad entry.
pub fn pairs_from_entries<S: AsRef<str>>(
    entries: &[S],
) -> Result<Vec<(String, String)>, EnvError> {
    entries
        .iter()
        .map(|e| parse_entry(e.as_ref()).map(|(k, v)| (k.to_string(), v.to_string())))
        .collect()
}

/// Ordered environment entries with unique keys.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct EnvList {
    entries: Vec<String>,
}

impl EnvList {
    /// Create an empty list.
    pub fn new() -> Self {
        Self::default()
    }

    /// Build a list from `(key, value)` pairs, upserting each in order.
    pub fn from_pairs<K, V, I>(pairs: I) -> Self
    where
        K: AsRef<str>,
        V: AsRef<str>,
        I: IntoIterator<Item = (K, V)>,
    {
        let mut list = Self::new();
        list.upsert_all(pairs);
        list
    }

    /// Set `key` to `value`: replace the existing entry in place, else append.
    pub fn upsert(&mut self, key: &str, value: &str) {
        let entry = format!("{key}={value}");
        match self.position(key) {
            Some(i) => self.entries[i] = entry,
            None => self.entries.push(entry),
        }
    }

    /// Upsert every pair in order; later pairs win over earlier ones.
    pub fn upsert_all<K, V, I>(&mut self, pairs: I)
    where
        K: AsRef<str>,
        V: AsRef<str>,
        I: IntoIterator<Item = (K, V)>,
    {
        for (k, v) in pairs {
            self.upsert(k.as_ref(), v.as_ref());
        }
    }

    /// Upsert from a flat `[k1, v1, k2, v2, ..]` sequence.
    ///
    /// The list is left untouched when the sequence is malformed.
    pub fn upsert_flat<S: AsRef<str>>(&mut self, flat: &[S]) -> Result<(), EnvError> {
        let pairs = pairs_from_flat(flat)?;
        self.upsert_all(pairs);
        Ok(())
    }

    /// Upsert from `key=value` strings.
    ///
    /// The list is left untouched when any entry is malformed.
    pub fn upsert_entries<S: AsRef<str>>(&mut self, entries: &[S]) -> Result<(), EnvError> {
        let pairs = pairs_from_entries(entries)?;
        self.upsert_all(pairs);
        Ok(())
    }

    /// Value currently bound to `key`.
    pub fn get(&self, key: &str) -> Option<&str> {
        self.position(key)
            .map(|i| &self.entries[i][key.len() + 1..])
    }

    /// Remove the entry for `key`, returning its value.
    pub fn remove(&mut self, key: &str) -> Option<String> {
        let i = self.position(key)?;
        let entry = self.entries.remove(i);
        Some(entry[key.len() + 1..].to_string())
    }

    /// Number of entries.
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    /// Returns `true` when the list has no entries.
    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Raw `key=value` entries in list order.
    pub fn entries(&self) -> &[String] {
        &self.entries
    }

    /// `(key, value)` views in list order.
    pub fn iter(&self) -> impl Iterator<Item = (&str, &str)> {
        self.entries
            .iter()
            .filter_map(|e| e.split_once('='))
    }

    fn position(&self, key: &str) -> Option<usize> {
        self.entries.iter().position(|e| {
            e.len() > key.len() && e.starts_with(key) && e.as_bytes()[key.len()] == b'='
        })
    }
}

impl fmt::Display for EnvList {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.entries.join("\n"))
    }
}

impl<K: AsRef<str>, V: AsRef<str>> FromIterator<(K, V)> for EnvList {
    fn from_iter<I: IntoIterator<Item = (K, V)>>(iter: I) -> Self {
        Self::from_pairs(iter)
    }
}

impl<K: AsRef<str>, V: AsRef<str>> Extend<(K, V)> for EnvList {
    fn extend<I: IntoIterator<Item = (K, V)>>(&mut self, iter: I) {
        self.upsert_all(iter);
    }
}
