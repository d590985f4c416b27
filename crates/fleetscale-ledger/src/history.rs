//! History — the in-memory form of the history document.
//!
//! Entries are kept as raw JSON values in document order so a rewrite
//! reproduces every existing entry exactly. Typed access goes through
//! [`History::get`], which parses on demand.

use std::collections::BTreeSet;

use serde::Serialize;
use serde_json::{Map, Value};
use tracing::debug;

use fleetscale_core::InstanceId;

use crate::entry::CheckEntry;
use crate::error::{LedgerError, LedgerResult};

const KEY_PREFIX: &str = "check_";

/// Parse a `check_<n>` document key.
pub fn parse_check_key(key: &str) -> Option<u64> {
    key.strip_prefix(KEY_PREFIX)?.parse().ok()
}

pub fn check_key(check_number: u64) -> String {
    format!("{KEY_PREFIX}{check_number}")
}

#[derive(Debug, Clone, Default, PartialEq, Serialize)]
#[serde(transparent)]
pub struct History {
    document: Map<String, Value>,
}

impl History {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn from_value(value: Value) -> LedgerResult<Self> {
        match value {
            Value::Object(document) => Ok(Self { document }),
            _ => Err(LedgerError::NotAnObject),
        }
    }

    /// Highest recorded check number, 0 when there is none.
    pub fn last_check_number(&self) -> u64 {
        self.check_numbers().max().unwrap_or(0)
    }

    pub fn next_check_number(&self) -> u64 {
        self.last_check_number() + 1
    }

    /// Number of `check_<n>` entries.
    pub fn len(&self) -> usize {
        self.check_numbers().count()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Check numbers in ascending order.
    pub fn check_numbers_sorted(&self) -> Vec<u64> {
        let mut numbers: Vec<u64> = self.check_numbers().collect();
        numbers.sort_unstable();
        numbers
    }

    /// Parse one entry. `None` if absent or written in a shape this version
    /// cannot read.
    pub fn get(&self, check_number: u64) -> Option<CheckEntry> {
        let raw = self.document.get(&check_key(check_number))?;
        match serde_json::from_value::<CheckEntry>(raw.clone()) {
            Ok(mut entry) => {
                entry.check_number = check_number;
                Some(entry)
            }
            Err(e) => {
                debug!(check = check_number, error = %e, "history entry not readable as a check");
                None
            }
        }
    }

    /// The raw stored value for one check.
    pub fn raw(&self, check_number: u64) -> Option<&Value> {
        self.document.get(&check_key(check_number))
    }

    /// The `active` list of one check, read leniently so entries from older
    /// tools still provide a baseline.
    pub fn active_at(&self, check_number: u64) -> Option<BTreeSet<InstanceId>> {
        let active = self.raw(check_number)?.get("active")?.as_array()?;
        Some(
            active
                .iter()
                .filter_map(|v| v.as_str().map(str::to_string))
                .collect(),
        )
    }

    /// The most recent `n` readable checks, oldest first.
    pub fn recent(&self, n: usize) -> Vec<CheckEntry> {
        let numbers = self.check_numbers_sorted();
        let start = numbers.len().saturating_sub(n);
        numbers[start..]
            .iter()
            .filter_map(|&number| self.get(number))
            .collect()
    }

    /// Append a new entry. Existing checks are never replaced.
    pub(crate) fn insert(&mut self, entry: &CheckEntry) -> LedgerResult<()> {
        let key = check_key(entry.check_number);
        if self.document.contains_key(&key) {
            return Err(LedgerError::Duplicate(entry.check_number));
        }
        let value = serde_json::to_value(entry)?;
        self.document.insert(key, value);
        Ok(())
    }

    fn check_numbers(&self) -> impl Iterator<Item = u64> + '_ {
        self.document.keys().filter_map(|k| parse_check_key(k))
    }
}
