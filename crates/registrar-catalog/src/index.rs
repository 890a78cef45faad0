//! Time-ordered index of registration expiry.

use std::collections::BTreeSet;

use chrono::{DateTime, Utc};

use crate::service::ServiceId;

/// Ordered multimap from expiry time to service ID.
///
/// Entries are keyed by the `(expires, id)` pair, so several services may
/// share an expiry instant and each one can still be removed on its own.
#[derive(Debug, Default, Clone)]
pub struct TimeIndex {
    entries: BTreeSet<(DateTime<Utc>, ServiceId)>,
}

impl TimeIndex {
    /// Creates an empty index.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Adds an entry. Returns false if the exact pair was already present.
    pub fn insert(&mut self, expires: DateTime<Utc>, id: impl Into<ServiceId>) -> bool {
        self.entries.insert((expires, id.into()))
    }

    /// Removes the entry for exactly this `(expires, id)` pair.
    pub fn remove_exact(&mut self, expires: DateTime<Utc>, id: &str) -> bool {
        self.entries.remove(&(expires, id.to_owned()))
    }

    /// Returns the entries that expire at or before `now`, oldest first.
    ///
    /// The scan stops at the first entry in the future.
    #[must_use]
    pub fn expired(&self, now: DateTime<Utc>) -> Vec<(DateTime<Utc>, ServiceId)> {
        self.entries
            .iter()
            .take_while(|(expires, _)| *expires <= now)
            .cloned()
            .collect()
    }

    /// Returns true if the exact pair is indexed.
    #[must_use]
    pub fn contains(&self, expires: DateTime<Utc>, id: &str) -> bool {
        self.entries.contains(&(expires, id.to_owned()))
    }

    /// Iterates entries in ascending expiry order.
    pub fn iter(&self) -> impl Iterator<Item = (&DateTime<Utc>, &str)> {
        self.entries.iter().map(|(expires, id)| (expires, id.as_str()))
    }

    /// Returns the number of indexed entries.
    #[must_use]
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    /// Returns true if nothing is indexed.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}
