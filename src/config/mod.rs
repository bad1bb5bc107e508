//! Decoded supervisor configuration
//!
//! The tree mirrors the sections of a supervisor configuration file:
//! singleton sections for the daemon and its control endpoints, program
//! templates, groups and event listeners. Every field value is decoded once
//! into a [`FieldValue`], so the materializer never inspects raw document
//! types. Anything that does not fit these shapes is a structural decode
//! error and fails the load.

use crate::error::{Error, Result};
use serde::{Deserialize, Deserializer, Serialize};
use std::collections::BTreeMap;
use std::fmt;
use std::path::Path;

pub mod loader;

pub use loader::{config_directory, load_snapshot, ConfigLoader};

/// Name of the pseudo-program supplying fallback fields.
pub const DEFAULT_PROGRAM: &str = "default";

pub const SUPERVISORD: &str = "supervisord";
pub const INET_HTTP_SERVER: &str = "inet_http_server";
pub const UNIX_HTTP_SERVER: &str = "unix_http_server";
pub const SUPERVISORCTL: &str = "supervisorctl";

/// A loosely-typed directive value.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum FieldValue {
    /// An empty YAML value or JSON `null`; renders as the empty string.
    Null,
    Bool(bool),
    Int(i64),
    Float(f64),
    Str(String),
    List(Vec<FieldValue>),
    Map(BTreeMap<String, FieldValue>),
}

pub type FieldMap = BTreeMap<String, FieldValue>;

impl FieldValue {
    /// Flat string form used in entry key-values.
    ///
    /// Lists are comma-joined; maps become `KEY="value"` pairs in key order.
    pub fn render(&self) -> String {
        match self {
            FieldValue::Null => String::new(),
            FieldValue::Bool(b) => b.to_string(),
            FieldValue::Int(i) => i.to_string(),
            FieldValue::Float(f) => f.to_string(),
            FieldValue::Str(s) => s.clone(),
            FieldValue::List(items) => items
                .iter()
                .map(FieldValue::render)
                .collect::<Vec<_>>()
                .join(","),
            FieldValue::Map(map) => render_env_pairs(map),
        }
    }

    /// Integer view; numeric strings are parsed and floats truncated.
    pub fn as_int(&self) -> Option<i64> {
        match self {
            FieldValue::Int(i) => Some(*i),
            FieldValue::Float(f) => float_to_int(*f),
            FieldValue::Str(s) => {
                let s = s.trim();
                s.parse()
                    .ok()
                    .or_else(|| s.parse::<f64>().ok().and_then(float_to_int))
            }
            _ => None,
        }
    }

    pub fn as_str(&self) -> Option<&str> {
        match self {
            FieldValue::Str(s) => Some(s),
            _ => None,
        }
    }
}

impl fmt::Display for FieldValue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.render())
    }
}

impl From<&str> for FieldValue {
    fn from(s: &str) -> Self {
        FieldValue::Str(s.to_string())
    }
}

impl From<String> for FieldValue {
    fn from(s: String) -> Self {
        FieldValue::Str(s)
    }
}

impl From<i64> for FieldValue {
    fn from(i: i64) -> Self {
        FieldValue::Int(i)
    }
}

impl From<bool> for FieldValue {
    fn from(b: bool) -> Self {
        FieldValue::Bool(b)
    }
}

fn float_to_int(f: f64) -> Option<i64> {
    if !f.is_finite() || f < i64::MIN as f64 || f >= i64::MAX as f64 {
        return None;
    }
    Some(f.trunc() as i64)
}

/// Flatten an environment mapping into `KEY="value",KEY2="value2"`.
pub fn render_env_pairs(map: &FieldMap) -> String {
    map.iter()
        .map(|(key, value)| format!("{key}=\"{}\"", value.render()))
        .collect::<Vec<_>>()
        .join(",")
}

/// Ordered program names of a group.
///
/// Accepts either a sequence or a single comma-separated string. Names are
/// trimmed and empty names dropped; members that are neither strings nor
/// integers are omitted.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
#[serde(transparent)]
pub struct ProgramList(Vec<String>);

impl ProgramList {
    pub fn new<I, S>(names: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: AsRef<str>,
    {
        Self(
            names
                .into_iter()
                .map(|n| n.as_ref().trim().to_string())
                .filter(|n| !n.is_empty())
                .collect(),
        )
    }

    /// Parse a comma-separated member list.
    pub fn parse(list: &str) -> Self {
        Self::new(list.split(','))
    }

    pub fn names(&self) -> &[String] {
        &self.0
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    /// Canonical comma-joined form.
    pub fn joined(&self) -> String {
        self.0.join(",")
    }
}

impl<'de> Deserialize<'de> for ProgramList {
    fn deserialize<D>(deserializer: D) -> std::result::Result<Self, D::Error>
    where
        D: Deserializer<'de>,
    {
        #[derive(Deserialize)]
        #[serde(untagged)]
        enum Raw {
            Nothing,
            One(String),
            Many(Vec<FieldValue>),
        }

        Ok(match Raw::deserialize(deserializer)? {
            Raw::Nothing => ProgramList::default(),
            Raw::One(list) => ProgramList::parse(&list),
            Raw::Many(items) => ProgramList::new(items.iter().filter_map(|item| match item {
                FieldValue::Str(_) | FieldValue::Int(_) => Some(item.render()),
                other => {
                    tracing::debug!("Omitting unusable group member: {:?}", other);
                    None
                }
            })),
        })
    }
}

/// A `[group:x]` section.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct GroupDefinition {
    #[serde(default)]
    pub programs: ProgramList,
    #[serde(flatten)]
    pub fields: FieldMap,
}

/// The decoded configuration tree.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct ConfigTree {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub supervisord: Option<FieldMap>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub inet_http_server: Option<FieldMap>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub unix_http_server: Option<FieldMap>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub supervisorctl: Option<FieldMap>,
    #[serde(default)]
    pub programs: BTreeMap<String, FieldMap>,
    #[serde(default)]
    pub groups: BTreeMap<String, GroupDefinition>,
    #[serde(default)]
    pub eventlisteners: BTreeMap<String, FieldMap>,
}

impl ConfigTree {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn from_toml_str(content: &str) -> Result<Self> {
        Ok(toml::from_str(content)?)
    }

    pub fn from_yaml_str(content: &str) -> Result<Self> {
        Ok(serde_yaml::from_str(content)?)
    }

    pub fn from_json_str(content: &str) -> Result<Self> {
        Ok(serde_json::from_str(content)?)
    }

    /// Read and decode a file, choosing the decoder by extension.
    pub fn from_file(path: &Path) -> Result<Self> {
        let format = ConfigFormat::from_path(path)?;
        let content = std::fs::read_to_string(path)?;
        format.decode(&content)
    }

    /// Singleton sections that are present, in a fixed order.
    pub fn sections(&self) -> impl Iterator<Item = (&'static str, &FieldMap)> {
        [
            (SUPERVISORD, &self.supervisord),
            (INET_HTTP_SERVER, &self.inet_http_server),
            (UNIX_HTTP_SERVER, &self.unix_http_server),
            (SUPERVISORCTL, &self.supervisorctl),
        ]
        .into_iter()
        .filter_map(|(name, section)| section.as_ref().map(|map| (name, map)))
    }

    /// Fallback fields from the `default` pseudo-program.
    pub fn default_fields(&self) -> Option<&FieldMap> {
        self.programs.get(DEFAULT_PROGRAM)
    }

    pub fn with_section(mut self, name: &str, fields: FieldMap) -> Result<Self> {
        let slot = match name {
            SUPERVISORD => &mut self.supervisord,
            INET_HTTP_SERVER => &mut self.inet_http_server,
            UNIX_HTTP_SERVER => &mut self.unix_http_server,
            SUPERVISORCTL => &mut self.supervisorctl,
            other => {
                return Err(Error::StructuralDecode(format!(
                    "unknown section '{other}'"
                )))
            }
        };
        *slot = Some(fields);
        Ok(self)
    }

    pub fn with_program(mut self, name: impl Into<String>, fields: FieldMap) -> Self {
        self.programs.insert(name.into(), fields);
        self
    }

    pub fn with_group(mut self, name: impl Into<String>, group: GroupDefinition) -> Self {
        self.groups.insert(name.into(), group);
        self
    }

    pub fn with_event_listener(mut self, name: impl Into<String>, fields: FieldMap) -> Self {
        self.eventlisteners.insert(name.into(), fields);
        self
    }
}

/// Structured document formats accepted for a configuration tree.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ConfigFormat {
    Toml,
    Yaml,
    Json,
}

impl ConfigFormat {
    pub fn from_path(path: &Path) -> Result<Self> {
        match path.extension().and_then(|ext| ext.to_str()) {
            Some("toml") => Ok(ConfigFormat::Toml),
            Some("yaml") | Some("yml") => Ok(ConfigFormat::Yaml),
            Some("json") => Ok(ConfigFormat::Json),
            _ => Err(Error::UnsupportedFormat(path.to_path_buf())),
        }
    }

    pub fn decode(self, content: &str) -> Result<ConfigTree> {
        match self {
            ConfigFormat::Toml => ConfigTree::from_toml_str(content),
            ConfigFormat::Yaml => ConfigTree::from_yaml_str(content),
            ConfigFormat::Json => ConfigTree::from_json_str(content),
        }
    }
}
