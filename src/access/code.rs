//! Access-code records and the in-memory table they live in.

use std::collections::BTreeMap;

use serde::{Deserialize, Deserializer, Serialize};

/// Number of characters in an issued code.
pub const CODE_LENGTH: usize = 8;

/// Symbols a code is drawn from.
pub const CODE_ALPHABET: &[u8] = b"ABCDEFGHIJKLMNOPQRSTUVWXYZ0123456789";

/// Validity window applied when nothing else is configured (30 minutes).
pub const DEFAULT_VALIDITY_SECS: i64 = 1800;

/// A single-use credential bound to the contributor it was issued for.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AccessCode {
    /// Name of the contributor the code was issued to.
    pub name: String,
    /// Issue time in seconds since the epoch.
    #[serde(deserialize_with = "deserialize_timestamp")]
    pub created_at: i64,
    /// Expiry time in seconds since the epoch.
    #[serde(deserialize_with = "deserialize_timestamp")]
    pub expires_at: i64,
}

impl AccessCode {
    /// Creates a record issued at `now` that stays valid for `validity_secs`.
    pub fn new(name: impl Into<String>, now: i64, validity_secs: i64) -> Self {
        Self {
            name: name.into(),
            created_at: now,
            expires_at: now.saturating_add(validity_secs),
        }
    }

    /// A code is still redeemable at its exact expiry second.
    pub fn is_expired_at(&self, now: i64) -> bool {
        now > self.expires_at
    }

    /// Seconds until expiry, zero once expired.
    pub fn remaining_secs(&self, now: i64) -> i64 {
        (self.expires_at - now).max(0)
    }
}

/// Older stores wrote fractional timestamps; accept both.
fn deserialize_timestamp<'de, D>(deserializer: D) -> Result<i64, D::Error>
where
    D: Deserializer<'de>,
{
    #[derive(Deserialize)]
    #[serde(untagged)]
    enum Timestamp {
        Whole(i64),
        Fractional(f64),
    }

    Ok(match Timestamp::deserialize(deserializer)? {
        Timestamp::Whole(secs) => secs,
        Timestamp::Fractional(secs) => secs.floor() as i64,
    })
}

/// Mapping from code to record, as loaded from a store.
///
/// Tracks whether it was mutated so stores only write back tables that
/// actually changed.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct CodeTable {
    entries: BTreeMap<String, AccessCode>,
    dirty: bool,
}

impl CodeTable {
    /// Creates an empty table.
    pub fn new() -> Self {
        Self::default()
    }

    /// Wraps entries loaded from storage. The result is clean.
    pub fn from_entries(entries: BTreeMap<String, AccessCode>) -> Self {
        Self {
            entries,
            dirty: false,
        }
    }

    pub fn entries(&self) -> &BTreeMap<String, AccessCode> {
        &self.entries
    }

    pub fn get(&self, code: &str) -> Option<&AccessCode> {
        self.entries.get(code)
    }

    pub fn contains(&self, code: &str) -> bool {
        self.entries.contains_key(code)
    }

    /// Inserts a record under a code that is not yet taken.
    ///
    /// Returns `false` and leaves the table untouched when the code exists.
    pub fn insert_new(&mut self, code: &str, record: AccessCode) -> bool {
        if self.entries.contains_key(code) {
            return false;
        }
        self.entries.insert(code.to_string(), record);
        self.dirty = true;
        true
    }

    /// Removes and returns a record.
    pub fn remove(&mut self, code: &str) -> Option<AccessCode> {
        let removed = self.entries.remove(code);
        if removed.is_some() {
            self.dirty = true;
        }
        removed
    }

    /// Removes every record expired at `now`, returning how many went.
    pub fn remove_expired(&mut self, now: i64) -> usize {
        let before = self.entries.len();
        self.entries.retain(|_, record| !record.is_expired_at(now));
        let removed = before - self.entries.len();
        if removed > 0 {
            self.dirty = true;
        }
        removed
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn is_dirty(&self) -> bool {
        self.dirty
    }

    pub fn mark_clean(&mut self) {
        self.dirty = false;
    }
}
