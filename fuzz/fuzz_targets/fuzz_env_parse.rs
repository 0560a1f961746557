// SPDX-License-Identifier: MIT OR Apache-2.0
//! Fuzz `key=value` parsing and the upsert discipline of `EnvList`.
//!
//! Splits arbitrary text into lines and feeds every line through
//! `parse_entry` and `EnvList::upsert_entries`, verifying:
//! 1. Parsing never panics.
//! 2. A successful parse splits at the first `=` and keeps a non-empty key.
//! 3. After upserting, no key appears twice and every key reads back the
//!    last value written for it.
//! 4. A rejected batch leaves the list untouched.
#![no_main]
use libfuzzer_sys::fuzz_target;
use std::collections::HashMap;
use xh_env::{EnvList, parse_entry};

fuzz_target!(|data: &[u8]| {
    let Ok(s) = std::str::from_utf8(data) else {
        return;
    };
    let lines: Vec<&str> = s.lines().collect();

    let mut expected: HashMap<&str, &str> = HashMap::new();
    let mut all_valid = true;
    for line in &lines {
        match parse_entry(line) {
            Ok((key, value)) => {
                assert!(!key.is_empty());
                assert!(!key.contains('='));
                assert_eq!(format!("{key}={value}"), *line);
                expected.insert(key, value);
            }
            Err(e) => {
                let _ = e.to_string();
                all_valid = false;
            }
        }
    }

    let mut list = EnvList::from_pairs([("SEED", "1")]);
    match list.upsert_entries(&lines) {
        Ok(()) => {
            assert!(all_valid);
            let mut seen = std::collections::HashSet::new();
            for (key, _) in list.iter() {
                assert!(seen.insert(key), "duplicate key {key:?}");
            }
            for (key, value) in &expected {
                assert_eq!(list.get(key), Some(*value));
            }
        }
        Err(_) => {
            assert!(!all_valid);
            assert_eq!(list.entries(), ["SEED=1"]);
        }
    }
});
