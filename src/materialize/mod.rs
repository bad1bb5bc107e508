//! Expansion of a decoded configuration tree into entries
//!
//! One pass over the tree produces a [`ConfigSnapshot`]:
//!
//! 1. Singleton sections become one entry each, named after the section.
//! 2. Groups become `group:<name>` entries and populate the registry.
//! 3. Programs expand into `numprocs` instances. Each instance gets its own
//!    copy of the program's fields, fallback fields from the `default`
//!    pseudo-program, evaluated templates and a composed environment.
//! 4. Event listeners expand exactly like programs.
//!
//! A template that fails to evaluate drops only the affected instance.

use crate::config::{ConfigTree, FieldMap, FieldValue, GroupDefinition, DEFAULT_PROGRAM};
use crate::entry::{Entry, EVENT_LISTENER_PREFIX, GROUP_PREFIX, PROGRAM_PREFIX};
use crate::error::Result;
use crate::snapshot::{CollisionPolicy, ConfigSnapshot, SkippedInstance, SnapshotBuilder};
use crate::template::{
    references_token, TemplateError, TokenEvaluator, GROUP_NAME, HERE, HOST_NODE_NAME, NUMPROCS,
    PROCESS_NUM, PROGRAM_NAME,
};
use std::collections::BTreeMap;
use std::path::PathBuf;
use tracing::{debug, info, warn};

#[cfg(test)]
mod tests;

/// Fields besides `command` that are evaluated as templates when present.
pub const EXPANDED_PATH_FIELDS: &[&str] = &["directory", "stdout_logfile", "stderr_logfile"];

/// Instance counts above this are logged as suspicious; they are not capped.
pub const LARGE_NUMPROCS: usize = 1000;

/// Inputs to a materialization pass that do not come from the tree itself.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct MaterializeOptions {
    /// Directory of the configuration source, bound as `%(here)s`.
    pub config_directory: PathBuf,
    pub collision_policy: CollisionPolicy,
    /// Bound as `%(host_node_name)s` when set.
    pub host_node_name: Option<String>,
    /// Bound as `%(ENV_<NAME>)s`.
    pub environment: BTreeMap<String, String>,
}

impl MaterializeOptions {
    pub fn new(config_directory: impl Into<PathBuf>) -> Self {
        Self {
            config_directory: config_directory.into(),
            ..Self::default()
        }
    }

    pub fn with_collision_policy(mut self, policy: CollisionPolicy) -> Self {
        self.collision_policy = policy;
        self
    }

    pub fn with_host_node_name(mut self, host: impl Into<String>) -> Self {
        self.host_node_name = Some(host.into());
        self
    }

    pub fn with_environment<I, K, V>(mut self, vars: I) -> Self
    where
        I: IntoIterator<Item = (K, V)>,
        K: Into<String>,
        V: Into<String>,
    {
        self.environment
            .extend(vars.into_iter().map(|(k, v)| (k.into(), v.into())));
        self
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum TemplateKind {
    Program,
    EventListener,
}

impl TemplateKind {
    fn prefix(self) -> &'static str {
        match self {
            TemplateKind::Program => PROGRAM_PREFIX,
            TemplateKind::EventListener => EVENT_LISTENER_PREFIX,
        }
    }

    fn label(self) -> &'static str {
        match self {
            TemplateKind::Program => "program",
            TemplateKind::EventListener => "eventlistener",
        }
    }
}

/// Materialize `tree` into a snapshot.
///
/// # Errors
///
/// Fails only when an entry name collides under
/// [`CollisionPolicy::Reject`]. Template failures skip the instance and are
/// reported through [`ConfigSnapshot::skipped`].
pub fn materialize(tree: &ConfigTree, options: &MaterializeOptions) -> Result<ConfigSnapshot> {
    Materializer::new(tree, options).run()
}

/// Single-use expansion pass over one tree.
pub struct Materializer<'a> {
    tree: &'a ConfigTree,
    options: &'a MaterializeOptions,
    builder: SnapshotBuilder,
}

impl<'a> Materializer<'a> {
    pub fn new(tree: &'a ConfigTree, options: &'a MaterializeOptions) -> Self {
        Self {
            tree,
            options,
            builder: SnapshotBuilder::new(options.collision_policy),
        }
    }

    pub fn run(mut self) -> Result<ConfigSnapshot> {
        let tree = self.tree;

        for (name, fields) in tree.sections() {
            self.add_section(name, fields)?;
        }

        for (name, group) in &tree.groups {
            self.add_group(name, group)?;
        }

        for (name, fields) in &tree.programs {
            if name == DEFAULT_PROGRAM {
                continue;
            }
            self.expand(TemplateKind::Program, name, fields)?;
        }

        for (name, fields) in &tree.eventlisteners {
            self.expand(TemplateKind::EventListener, name, fields)?;
        }

        let snapshot = self.builder.build();
        info!(
            "Materialized {} entries ({} instances, {} skipped)",
            snapshot.entries().len(),
            snapshot.loaded_programs().len(),
            snapshot.skipped().len()
        );
        Ok(snapshot)
    }

    fn add_section(&mut self, name: &str, fields: &FieldMap) -> Result<()> {
        let mut entry = Entry::new(name, &self.options.config_directory);
        entry.key_values = render_fields(fields);

        debug!("Materialized section '{}'", name);
        self.builder
            .insert(name, entry, format!("section '{name}'"))
    }

    fn add_group(&mut self, name: &str, group: &GroupDefinition) -> Result<()> {
        for program in group.programs.names() {
            self.builder.register_member(name, program);
        }

        let key = format!("{GROUP_PREFIX}{name}");
        let mut entry = Entry::new(key.clone(), &self.options.config_directory);
        entry.group = Some(name.to_string());
        entry.key_values = render_fields(&group.fields);
        entry.set("programs", group.programs.joined());

        debug!(
            "Materialized group '{}' with programs [{}]",
            name,
            group.programs.joined()
        );
        self.builder.insert(&key, entry, format!("group '{name}'"))
    }

    fn expand(&mut self, kind: TemplateKind, name: &str, fields: &FieldMap) -> Result<()> {
        let count = instance_count(fields);
        let base_name = fields
            .get("process_name")
            .map(FieldValue::render)
            .unwrap_or_else(|| name.to_string());
        let group = self.builder.registry().get_group(name, name).to_string();
        if count > LARGE_NUMPROCS {
            warn!(
                "{} '{}' requests {} instances (numprocs above {})",
                kind.label(),
                name,
                count,
                LARGE_NUMPROCS
            );
        }

        for process_num in 1..=count {
            match self.expand_instance(kind, name, fields, &base_name, &group, process_num, count) {
                Ok((process_name, entry)) => {
                    debug!(
                        "Materialized {} '{}' instance {} as '{}'",
                        kind.label(),
                        name,
                        process_num,
                        process_name
                    );
                    self.builder.record_loaded(&process_name);
                    self.builder.insert(
                        &process_name,
                        entry,
                        format!("{} '{name}' instance {process_num}", kind.label()),
                    )?;
                }
                Err(e) => {
                    warn!(
                        "Skipping {} '{}' instance {}: {}",
                        kind.label(),
                        name,
                        process_num,
                        e
                    );
                    self.builder.record_skipped(SkippedInstance {
                        program: name.to_string(),
                        process_num,
                        reason: e.to_string(),
                    });
                }
            }
        }

        Ok(())
    }

    #[allow(clippy::too_many_arguments)]
    fn expand_instance(
        &self,
        kind: TemplateKind,
        name: &str,
        fields: &FieldMap,
        base_name: &str,
        group: &str,
        process_num: usize,
        count: usize,
    ) -> std::result::Result<(String, Entry), TemplateError> {
        let mut instance_fields = fields.clone();
        if let Some(defaults) = self.tree.default_fields() {
            merge_defaults(&mut instance_fields, defaults);
        }

        let mut entry = Entry::new(String::new(), &self.options.config_directory);
        entry.key_values = render_fields(&instance_fields);

        let evaluator = self.evaluator(name, group, process_num, count);
        let command = evaluator.eval(entry.get("command").unwrap_or(""))?;
        for field in EXPANDED_PATH_FIELDS {
            if let Some(value) = entry.get(field) {
                let expanded = evaluator.eval(value)?;
                entry.set(*field, expanded);
            }
        }

        let process_name = resolve_process_name(&evaluator, base_name, process_num, count)?;
        let environment = compose_environment(entry.get("environment"), name, &process_name);

        entry.set("command", command);
        entry.set("environment", environment);
        entry.set("process_name", process_name.clone());
        entry.set("numprocs_start", (process_num - 1).to_string());
        entry.set("process_num", process_num.to_string());
        entry.name = format!("{}{}", kind.prefix(), process_name);
        entry.group = Some(group.to_string());

        Ok((process_name, entry))
    }

    fn evaluator(&self, name: &str, group: &str, process_num: usize, count: usize) -> TokenEvaluator {
        let mut evaluator = TokenEvaluator::new()
            .with_environment(&self.options.environment)
            .with_binding(PROGRAM_NAME, name)
            .with_binding(PROCESS_NUM, process_num.to_string())
            .with_binding(GROUP_NAME, group)
            .with_binding(HERE, self.options.config_directory.display().to_string())
            .with_binding(NUMPROCS, count.to_string());
        if let Some(host) = &self.options.host_node_name {
            evaluator.bind(HOST_NODE_NAME, host.clone());
        }
        evaluator
    }
}

/// `numprocs` as a positive count; anything unusable means one instance.
pub fn instance_count(fields: &FieldMap) -> usize {
    fields
        .get("numprocs")
        .and_then(FieldValue::as_int)
        .filter(|n| *n > 0)
        .and_then(|n| usize::try_from(n).ok())
        .unwrap_or(1)
}

/// Fill fields missing from `fields` with the ones in `defaults`.
pub fn merge_defaults(fields: &mut FieldMap, defaults: &FieldMap) {
    for (key, value) in defaults {
        fields
            .entry(key.clone())
            .or_insert_with(|| value.clone());
    }
}

/// Name of one instance.
///
/// A single instance keeps the base template verbatim. Multiple instances
/// evaluate the template when it mentions `process_num`, and otherwise get a
/// `_<n>` suffix.
pub fn resolve_process_name(
    evaluator: &TokenEvaluator,
    base_name: &str,
    process_num: usize,
    count: usize,
) -> std::result::Result<String, TemplateError> {
    if count <= 1 {
        return Ok(base_name.to_string());
    }
    if references_token(base_name, PROCESS_NUM) {
        return evaluator.eval(base_name);
    }
    Ok(format!("{base_name}_{process_num}"))
}

/// Append the `PROC_NAME`/`INST_NAME` pair to an existing environment string.
pub fn compose_environment(existing: Option<&str>, program: &str, process_name: &str) -> String {
    let synthetic = format!("PROC_NAME=\"{program}\",INST_NAME=\"{process_name}\"");
    match existing.map(str::trim) {
        Some(prior) if !prior.is_empty() => format!("{prior},{synthetic}"),
        _ => synthetic,
    }
}

fn render_fields(fields: &FieldMap) -> BTreeMap<String, String> {
    fields
        .iter()
        .map(|(key, value)| (key.clone(), value.render()))
        .collect()
}
