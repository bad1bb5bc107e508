//! Temporary configuration files for loader and CLI tests

use anyhow::Result;
use std::fs;
use std::path::{Path, PathBuf};
use tempfile::TempDir;

/// Sample tree exercising sections, groups, defaults and multi-instance programs.
pub const SAMPLE_TOML: &str = r#"
[supervisord]
logfile = "/var/log/supervisord.log"

[unix_http_server]
file = "/run/supervisor.sock"

[programs.default]
autostart = "true"
autorestart = "unexpected"

[programs.web]
command = "%(here)s/bin/web --port=80%(process_num)02d"
numprocs = 2

[programs.web.environment]
MODE = "prod"

[programs.worker]
command = "%(program_name)s --queue=%(group_name)s"
autostart = "false"

[groups.webapp]
programs = "web, worker"
priority = 100
"#;

/// A temporary directory holding one configuration file.
pub struct ConfigFixture {
    /// Temporary directory (automatically cleaned up on drop)
    pub temp_dir: TempDir,
    /// Path to the configuration file
    pub config_path: PathBuf,
}

impl ConfigFixture {
    /// Create a fixture with `content` written to `file_name`
    pub fn new(file_name: &str, content: &str) -> Result<Self> {
        let temp_dir = TempDir::new()?;
        let config_path = temp_dir.path().join(file_name);
        fs::write(&config_path, content)?;

        Ok(Self {
            temp_dir,
            config_path,
        })
    }

    /// Fixture holding [`SAMPLE_TOML`]
    pub fn sample() -> Result<Self> {
        Self::new("supervisord.toml", SAMPLE_TOML)
    }

    /// Replace the configuration file contents
    pub fn rewrite(&self, content: &str) -> Result<()> {
        fs::write(&self.config_path, content)?;
        Ok(())
    }

    /// Replace the configuration file by renaming a fully written sibling
    /// over it, so a watcher never observes a partial file
    pub fn replace(&self, content: &str) -> Result<()> {
        let staging = self.temp_dir.path().join(".staging");
        fs::write(&staging, content)?;
        fs::rename(&staging, &self.config_path)?;
        Ok(())
    }

    /// Canonical directory of the configuration file
    pub fn here(&self) -> PathBuf {
        self.temp_dir
            .path()
            .canonicalize()
            .unwrap_or_else(|_| self.temp_dir.path().to_path_buf())
    }

    pub fn path(&self) -> &Path {
        &self.config_path
    }
}
