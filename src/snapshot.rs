//! Immutable configuration snapshots
//!
//! A [`ConfigSnapshot`] pairs the entry store with the group registry of one
//! reload. Snapshots are assembled through a [`SnapshotBuilder`] owned by the
//! materializer and only handed out once the whole pass has succeeded, so a
//! partially-built store is never visible to readers.

use crate::entry::{Entry, EntryStore};
use crate::error::{Error, Result};
use crate::registry::ProgramGroupRegistry;
use serde::Serialize;
use std::collections::HashMap;
use tracing::warn;

/// What to do when two entries resolve to the same store key.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum CollisionPolicy {
    /// The later entry replaces the earlier one.
    #[default]
    Overwrite,
    /// Fail the reload.
    Reject,
}

/// A program instance dropped because one of its templates failed to evaluate.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct SkippedInstance {
    pub program: String,
    pub process_num: usize,
    pub reason: String,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct ConfigSnapshot {
    entries: EntryStore,
    registry: ProgramGroupRegistry,
    loaded_programs: Vec<String>,
    skipped: Vec<SkippedInstance>,
}

impl ConfigSnapshot {
    pub fn entries(&self) -> &EntryStore {
        &self.entries
    }

    pub fn registry(&self) -> &ProgramGroupRegistry {
        &self.registry
    }

    /// Resolved instance names in materialization order.
    pub fn loaded_programs(&self) -> &[String] {
        &self.loaded_programs
    }

    pub fn skipped(&self) -> &[SkippedInstance] {
        &self.skipped
    }

    pub fn get(&self, key: &str) -> Option<&Entry> {
        self.entries.get(key)
    }

    /// The group owning `program`, defaulting to the program's own name.
    pub fn group_of<'a>(&'a self, program: &'a str) -> &'a str {
        self.registry.get_group(program, program)
    }

    pub fn into_parts(self) -> (EntryStore, ProgramGroupRegistry, Vec<String>) {
        (self.entries, self.registry, self.loaded_programs)
    }
}

/// Accumulates one reload's output before it is published.
#[derive(Debug, Default)]
pub struct SnapshotBuilder {
    policy: CollisionPolicy,
    entries: EntryStore,
    registry: ProgramGroupRegistry,
    loaded_programs: Vec<String>,
    skipped: Vec<SkippedInstance>,
    /// Store key to a description of the section that produced it.
    origins: HashMap<String, String>,
}

impl SnapshotBuilder {
    pub fn new(policy: CollisionPolicy) -> Self {
        Self {
            policy,
            ..Self::default()
        }
    }

    pub fn registry(&self) -> &ProgramGroupRegistry {
        &self.registry
    }

    pub fn register_member(&mut self, group: &str, program: &str) {
        self.registry.add(group, program);
    }

    /// Insert `entry` under `key`.
    ///
    /// # Errors
    ///
    /// Returns [`Error::NameCollision`] when `key` is taken and the policy is
    /// [`CollisionPolicy::Reject`].
    pub fn insert(&mut self, key: &str, entry: Entry, origin: String) -> Result<()> {
        if let Some(existing) = self.origins.get(key) {
            match self.policy {
                CollisionPolicy::Reject => {
                    return Err(Error::NameCollision {
                        name: key.to_string(),
                        existing: existing.clone(),
                        incoming: origin,
                    });
                }
                CollisionPolicy::Overwrite => {
                    warn!(
                        "Entry '{}' from {} overwrites the one from {}",
                        key, origin, existing
                    );
                }
            }
        }

        self.origins.insert(key.to_string(), origin);
        self.entries.insert(key, entry);
        Ok(())
    }

    pub fn record_loaded(&mut self, process_name: &str) {
        self.loaded_programs.push(process_name.to_string());
    }

    pub fn record_skipped(&mut self, skipped: SkippedInstance) {
        self.skipped.push(skipped);
    }

    pub fn build(self) -> ConfigSnapshot {
        ConfigSnapshot {
            entries: self.entries,
            registry: self.registry,
            loaded_programs: self.loaded_programs,
            skipped: self.skipped,
        }
    }
}
