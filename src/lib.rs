//! # procfleet
//!
//! Expands a process-supervisor configuration tree into a flat table of
//! ready-to-run process entries, one per process instance.
//!
//! ## Usage
//!
//! ```bash
//! procfleet expand supervisord.toml [--format yaml] [--reject-collisions]
//! ```
//!
//! ## Modules
//!
//! - `config` - Decoded configuration tree and file loading with hot reload
//! - `template` - `%(name)s` / `%(name)d` token evaluation
//! - `registry` - Program to group membership
//! - `entry` - Materialized entries and the entry store
//! - `materialize` - Expansion of programs into process instances
//! - `snapshot` - Immutable result of one materialization pass
pub mod app;
pub mod cli;
pub mod config;
pub mod entry;
pub mod error;
pub mod materialize;
pub mod registry;
pub mod snapshot;
pub mod template;

pub use config::{ConfigTree, FieldMap, FieldValue, GroupDefinition, ProgramList};
pub use entry::{Entry, EntryStore};
pub use error::{Error, Result};
pub use materialize::{materialize, MaterializeOptions};
pub use registry::ProgramGroupRegistry;
pub use snapshot::{CollisionPolicy, ConfigSnapshot, SkippedInstance};
pub use template::{TemplateError, TokenEvaluator};
