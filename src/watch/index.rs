// src/watch/index.rs

//! Session-local entry index and the change-diff engine that mutates it.

use std::collections::HashMap;

use tracing::debug;

use crate::types::{EntryInfo, FileChanges};

/// One backend-reported observation about a path.
#[derive(Debug, Clone)]
pub enum Observation {
    /// The path exists with this description.
    Seen { rel: String, info: EntryInfo },
    /// The path no longer exists.
    Gone { rel: String },
}

impl Observation {
    pub fn seen(rel: impl Into<String>, info: EntryInfo) -> Self {
        Observation::Seen {
            rel: rel.into(),
            info,
        }
    }

    pub fn gone(rel: impl Into<String>) -> Self {
        Observation::Gone { rel: rel.into() }
    }
}

/// Mapping from root-relative path to last-known [`EntryInfo`], owned by one
/// watch session.
///
/// The diff engine here is the index's sole mutator: every batch is applied
/// through [`EntryIndex::apply`] (or seeded through
/// [`EntryIndex::seed_initial`]), and the returned [`FileChanges`] describes
/// exactly the mutation that happened.
#[derive(Debug, Default)]
pub struct EntryIndex {
    entries: HashMap<String, EntryInfo>,
}

impl EntryIndex {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn contains(&self, rel: &str) -> bool {
        self.entries.contains_key(rel)
    }

    pub fn get(&self, rel: &str) -> Option<&EntryInfo> {
        self.entries.get(rel)
    }

    /// Install the initial scan result and return the mandatory first batch
    /// (all entries in `added`; may legitimately be empty).
    pub fn seed_initial(&mut self, seed: Vec<(String, EntryInfo)>) -> FileChanges {
        let mut changes = FileChanges::default();
        for (rel, info) in seed {
            changes.added.insert(info.path.clone(), info.clone());
            self.entries.insert(rel, info);
        }
        changes
    }

    /// Apply one batch of observations, classifying each against the index
    /// state and mutating it in lockstep.
    ///
    /// Classification per observation:
    /// - absent + seen  -> `added`
    /// - absent + gone  -> ignored
    /// - present + gone -> `deleted`
    /// - present + seen -> `changed` (re-emitted even when the stat fields
    ///   are identical; consumers get at-least-once semantics)
    ///
    /// Duplicates within the batch collapse: seen-then-gone on a previously
    /// absent path nets to nothing, gone-then-seen on a previously present
    /// path nets to `changed`. The three output sets stay pairwise disjoint.
    pub fn apply(&mut self, batch: impl IntoIterator<Item = Observation>) -> FileChanges {
        let mut changes = FileChanges::default();

        for obs in batch {
            match obs {
                Observation::Seen { rel, info } => {
                    let key = info.path.clone();
                    let was_present = self.entries.insert(rel, info.clone()).is_some();

                    if changes.deleted.remove(&key).is_some() {
                        // Deleted earlier in this batch, so it was present
                        // before the batch: net change.
                        changes.changed.insert(key, info);
                    } else if changes.added.contains_key(&key) {
                        changes.added.insert(key, info);
                    } else if was_present {
                        changes.changed.insert(key, info);
                    } else {
                        changes.added.insert(key, info);
                    }
                }
                Observation::Gone { rel } => {
                    let Some(prev) = self.entries.remove(&rel) else {
                        // Never knew about it; nothing to report.
                        continue;
                    };
                    let key = prev.path.clone();

                    if changes.added.remove(&key).is_some() {
                        // Added earlier in this batch: absent before and
                        // after, nets to nothing.
                        continue;
                    }
                    changes.changed.remove(&key);
                    let mut tombstone = prev;
                    tombstone.exists = Some(false);
                    changes.deleted.insert(key, tombstone);
                }
            }
        }

        debug!(
            added = changes.added.len(),
            changed = changes.changed.len(),
            deleted = changes.deleted.len(),
            index = self.entries.len(),
            "applied event batch"
        );

        changes
    }

    pub fn clear(&mut self) {
        self.entries.clear();
    }
}
