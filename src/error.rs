use std::path::PathBuf;
use thiserror::Error;

use crate::template::TemplateError;

#[derive(Error, Debug)]
pub enum Error {
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Structural decode error: {0}")]
    StructuralDecode(String),

    #[error("Template error: {0}")]
    Template(#[from] TemplateError),

    #[error("Entry name collision: '{name}' from {incoming} already produced by {existing}")]
    NameCollision {
        name: String,
        existing: String,
        incoming: String,
    },

    #[error("Unsupported configuration format: {}", .0.display())]
    UnsupportedFormat(PathBuf),

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    #[error("TOML error: {0}")]
    Toml(#[from] toml::de::Error),

    #[error("YAML error: {0}")]
    Yaml(#[from] serde_yaml::Error),

    #[error("Notify error: {0}")]
    Notify(#[from] notify::Error),
}

impl Error {
    /// Whether the error means the input document had the wrong shape.
    pub fn is_structural(&self) -> bool {
        matches!(
            self,
            Error::StructuralDecode(_) | Error::Toml(_) | Error::Yaml(_) | Error::Json(_)
        )
    }
}

pub type Result<T> = std::result::Result<T, Error>;
