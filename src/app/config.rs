//! Application configuration
//!
//! This module handles application-wide configuration settings.

/// Environment variable that overrides the verbosity-derived log filter.
pub const LOG_ENV_VAR: &str = "PROCFLEET_LOG";

/// Application configuration structure
#[derive(Debug, Clone, Default)]
pub struct AppConfig {
    /// Verbosity level for logging
    pub verbose: u8,
    /// Explicit log filter, taking precedence over `verbose`
    pub log_filter: Option<String>,
}

impl AppConfig {
    /// Create a new application configuration, reading [`LOG_ENV_VAR`]
    pub fn new(verbose: u8) -> Self {
        Self {
            verbose,
            log_filter: std::env::var(LOG_ENV_VAR).ok().filter(|f| !f.is_empty()),
        }
    }

    pub fn with_log_filter(mut self, filter: impl Into<String>) -> Self {
        self.log_filter = Some(filter.into());
        self
    }

    /// Get the log filter based on verbosity, unless overridden
    pub fn log_level(&self) -> &str {
        if let Some(filter) = &self.log_filter {
            return filter;
        }
        match self.verbose {
            0 => "info",
            1 => "debug",
            _ => "trace",
        }
    }
}
