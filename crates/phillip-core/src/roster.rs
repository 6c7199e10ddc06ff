//! Group roster snapshots and membership diffing.

use std::collections::HashSet;
use std::hash::Hash;

use serde::{Deserialize, Serialize};

use crate::model::RosterEntry;

/// Items of `current` missing from `previous` and vice versa, matched by key.
///
/// Order follows the input slices. Items present on both sides are not
/// reported, whatever else changed about them.
pub fn reconcile<'a, T, K, F>(
    previous: &'a [T],
    current: &'a [T],
    key: F,
) -> (Vec<&'a T>, Vec<&'a T>)
where
    K: Eq + Hash,
    F: Fn(&T) -> K,
{
    let previous_keys: HashSet<K> = previous.iter().map(&key).collect();
    let current_keys: HashSet<K> = current.iter().map(&key).collect();

    let added = current
        .iter()
        .filter(|item| !previous_keys.contains(&key(*item)))
        .collect();
    let removed = previous
        .iter()
        .filter(|item| !current_keys.contains(&key(*item)))
        .collect();
    (added, removed)
}

/// Members of one group as seen by one poll.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct RosterSnapshot {
    entries: Vec<RosterEntry>,
}

impl RosterSnapshot {
    pub fn new(entries: Vec<RosterEntry>) -> Self {
        Self { entries }
    }

    pub fn entries(&self) -> &[RosterEntry] {
        &self.entries
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn contains(&self, user_id: u64) -> bool {
        self.entries.iter().any(|e| e.id == user_id)
    }
}

impl From<Vec<RosterEntry>> for RosterSnapshot {
    fn from(entries: Vec<RosterEntry>) -> Self {
        Self::new(entries)
    }
}

/// Membership changes between two snapshots of the same group.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct RosterDiff {
    pub added: Vec<RosterEntry>,
    pub removed: Vec<RosterEntry>,
}

impl RosterDiff {
    pub fn is_empty(&self) -> bool {
        self.added.is_empty() && self.removed.is_empty()
    }
}

/// Compare two snapshots by user id.
///
/// An empty `previous` (first observation of a group) reports every current
/// member as added.
pub fn diff(previous: &RosterSnapshot, current: &RosterSnapshot) -> RosterDiff {
    let (added, removed) = reconcile(previous.entries(), current.entries(), |e| e.id);
    RosterDiff {
        added: added.into_iter().cloned().collect(),
        removed: removed.into_iter().cloned().collect(),
    }
}
