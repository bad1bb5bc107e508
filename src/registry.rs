//! Program to group membership
//!
//! Groups list their member programs in the order they were first declared.
//! The reverse lookup falls back to a caller-supplied name, so every program
//! resolves to some group even when no `[group:x]` section mentions it.

use serde::Serialize;
use std::collections::HashMap;

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct ProgramGroupRegistry {
    /// Group name and its members, in first-registration order.
    groups: Vec<(String, Vec<String>)>,
    #[serde(skip)]
    group_index: HashMap<String, usize>,
    #[serde(skip)]
    program_groups: HashMap<String, String>,
}

impl ProgramGroupRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register `program` as a member of `group`.
    ///
    /// Adding the same pair twice is a no-op. The reverse lookup keeps the
    /// first group a program was registered under.
    pub fn add(&mut self, group: &str, program: &str) {
        let idx = match self.group_index.get(group) {
            Some(&idx) => idx,
            None => {
                self.groups.push((group.to_string(), Vec::new()));
                self.group_index
                    .insert(group.to_string(), self.groups.len() - 1);
                self.groups.len() - 1
            }
        };

        let members = &mut self.groups[idx].1;
        if !members.iter().any(|p| p == program) {
            members.push(program.to_string());
        }

        self.program_groups
            .entry(program.to_string())
            .or_insert_with(|| group.to_string());
    }

    /// The group owning `program`, or `fallback` when it was never registered.
    pub fn get_group<'a>(&'a self, program: &str, fallback: &'a str) -> &'a str {
        self.program_groups
            .get(program)
            .map(String::as_str)
            .unwrap_or(fallback)
    }

    /// Members of `group` in registration order; empty for unknown groups.
    pub fn programs(&self, group: &str) -> &[String] {
        self.group_index
            .get(group)
            .map(|&idx| self.groups[idx].1.as_slice())
            .unwrap_or(&[])
    }

    /// Group names in first-registration order.
    pub fn groups(&self) -> impl Iterator<Item = &str> {
        self.groups.iter().map(|(name, _)| name.as_str())
    }

    pub fn contains_group(&self, group: &str) -> bool {
        self.group_index.contains_key(group)
    }

    pub fn len(&self) -> usize {
        self.groups.len()
    }

    pub fn is_empty(&self) -> bool {
        self.groups.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_add_and_lookup() {
        let mut registry = ProgramGroupRegistry::new();
        registry.add("webapp", "a");
        registry.add("webapp", "b");

        assert_eq!(registry.get_group("a", "a"), "webapp");
        assert_eq!(registry.get_group("b", "b"), "webapp");
        assert_eq!(registry.get_group("z", "z"), "z");
    }

    #[test]
    fn test_add_is_idempotent() {
        let mut registry = ProgramGroupRegistry::new();
        registry.add("g", "x");
        registry.add("g", "y");
        registry.add("g", "x");

        assert_eq!(registry.programs("g"), ["x", "y"]);
        assert_eq!(registry.len(), 1);
    }

    #[test]
    fn test_preserves_insertion_order() {
        let mut registry = ProgramGroupRegistry::new();
        registry.add("second", "c");
        registry.add("first", "b");
        registry.add("second", "a");

        assert_eq!(registry.groups().collect::<Vec<_>>(), ["second", "first"]);
        assert_eq!(registry.programs("second"), ["c", "a"]);
    }

    #[test]
    fn test_first_group_wins_reverse_lookup() {
        let mut registry = ProgramGroupRegistry::new();
        registry.add("one", "shared");
        registry.add("two", "shared");

        assert_eq!(registry.get_group("shared", "shared"), "one");
        assert_eq!(registry.programs("two"), ["shared"]);
    }

    #[test]
    fn test_unknown_group_is_empty() {
        let registry = ProgramGroupRegistry::new();
        assert!(registry.programs("nope").is_empty());
        assert!(!registry.contains_group("nope"));
        assert!(registry.is_empty());
    }
}
