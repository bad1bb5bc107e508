//! Materialized entries
//!
//! An [`Entry`] is the runtime-ready record for one configuration section:
//! a singleton section, a group, or a single program instance. Entries are
//! collected in an [`EntryStore`] keyed by section name, `group:<name>`, or
//! the resolved process name of a program instance.

use serde::Serialize;
use std::collections::BTreeMap;
use std::path::{Path, PathBuf};

pub const GROUP_PREFIX: &str = "group:";
pub const PROGRAM_PREFIX: &str = "program:";
pub const EVENT_LISTENER_PREFIX: &str = "eventlistener:";

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Entry {
    pub name: String,
    /// Owning group; `None` for singleton sections.
    pub group: Option<String>,
    pub config_directory: PathBuf,
    pub key_values: BTreeMap<String, String>,
}

impl Entry {
    pub fn new(name: impl Into<String>, config_directory: &Path) -> Self {
        Self {
            name: name.into(),
            group: None,
            config_directory: config_directory.to_path_buf(),
            key_values: BTreeMap::new(),
        }
    }

    pub fn is_program(&self) -> bool {
        self.name.starts_with(PROGRAM_PREFIX)
    }

    pub fn is_event_listener(&self) -> bool {
        self.name.starts_with(EVENT_LISTENER_PREFIX)
    }

    pub fn is_group(&self) -> bool {
        self.name.starts_with(GROUP_PREFIX)
    }

    /// Resolved process name for program and listener entries.
    pub fn program_name(&self) -> Option<&str> {
        self.name
            .strip_prefix(PROGRAM_PREFIX)
            .or_else(|| self.name.strip_prefix(EVENT_LISTENER_PREFIX))
    }

    pub fn get(&self, key: &str) -> Option<&str> {
        self.key_values.get(key).map(String::as_str)
    }

    pub fn set(&mut self, key: impl Into<String>, value: impl Into<String>) {
        self.key_values.insert(key.into(), value.into());
    }

    pub fn get_string(&self, key: &str, default: &str) -> String {
        self.get(key).unwrap_or(default).to_string()
    }

    pub fn get_int(&self, key: &str, default: i64) -> i64 {
        self.get(key)
            .and_then(|v| v.trim().parse().ok())
            .unwrap_or(default)
    }

    /// Supervisor-style booleans: `true`/`yes`/`on`/`1` and their negations.
    pub fn get_bool(&self, key: &str, default: bool) -> bool {
        match self.get(key).map(|v| v.trim().to_ascii_lowercase()) {
            Some(v) if matches!(v.as_str(), "true" | "yes" | "on" | "1") => true,
            Some(v) if matches!(v.as_str(), "false" | "no" | "off" | "0") => false,
            _ => default,
        }
    }

    /// Comma-separated value split into trimmed, non-empty items.
    pub fn get_string_list(&self, key: &str) -> Vec<String> {
        self.get(key)
            .map(|v| {
                v.split(',')
                    .map(str::trim)
                    .filter(|s| !s.is_empty())
                    .map(str::to_string)
                    .collect()
            })
            .unwrap_or_default()
    }

    /// Parse the composed `environment` value back into pairs.
    pub fn environment_pairs(&self) -> Vec<(String, String)> {
        self.get("environment")
            .map(parse_environment)
            .unwrap_or_default()
    }
}

/// Parse `KEY="value",KEY2=value2` honoring double quotes around values.
///
/// Commas inside quoted values do not split pairs. Items without `=` are
/// ignored.
pub fn parse_environment(env: &str) -> Vec<(String, String)> {
    let mut pairs = Vec::new();
    let mut item = String::new();
    let mut in_quotes = false;

    for ch in env.chars() {
        match ch {
            '"' => {
                in_quotes = !in_quotes;
                item.push(ch);
            }
            ',' if !in_quotes => {
                push_pair(&mut pairs, &item);
                item.clear();
            }
            _ => item.push(ch),
        }
    }
    push_pair(&mut pairs, &item);

    pairs
}

fn push_pair(pairs: &mut Vec<(String, String)>, item: &str) {
    let Some((key, value)) = item.split_once('=') else {
        return;
    };
    let key = key.trim();
    if key.is_empty() {
        return;
    }
    let value = value.trim();
    let value = value
        .strip_prefix('"')
        .and_then(|v| v.strip_suffix('"'))
        .unwrap_or(value);
    pairs.push((key.to_string(), value.to_string()));
}

/// Keyed collection of materialized entries.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
#[serde(transparent)]
pub struct EntryStore {
    entries: BTreeMap<String, Entry>,
}

impl EntryStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Insert `entry` under `key`, returning the entry it replaced.
    pub fn insert(&mut self, key: impl Into<String>, entry: Entry) -> Option<Entry> {
        self.entries.insert(key.into(), entry)
    }

    pub fn get(&self, key: &str) -> Option<&Entry> {
        self.entries.get(key)
    }

    pub fn get_mut(&mut self, key: &str) -> Option<&mut Entry> {
        self.entries.get_mut(key)
    }

    pub fn contains_key(&self, key: &str) -> bool {
        self.entries.contains_key(key)
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn keys(&self) -> impl Iterator<Item = &str> {
        self.entries.keys().map(String::as_str)
    }

    pub fn iter(&self) -> impl Iterator<Item = (&str, &Entry)> {
        self.entries.iter().map(|(k, v)| (k.as_str(), v))
    }

    /// Program and event listener instances.
    pub fn programs(&self) -> impl Iterator<Item = &Entry> {
        self.entries
            .values()
            .filter(|e| e.is_program() || e.is_event_listener())
    }

    pub fn groups(&self) -> impl Iterator<Item = &Entry> {
        self.entries.values().filter(|e| e.is_group())
    }

    /// Instances whose owning group is `group`.
    pub fn program_entries_in_group<'a>(
        &'a self,
        group: &'a str,
    ) -> impl Iterator<Item = &'a Entry> + 'a {
        self.programs()
            .filter(move |e| e.group.as_deref() == Some(group))
    }
}
