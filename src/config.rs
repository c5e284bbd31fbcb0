//! Configuration options for a bridge.

use crate::error::{Error, Result};
use crate::host::Priority;
use crate::types::WriterIdentity;
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};

/// Configuration options for creating a [`crate::Bridge`].
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct BridgeOptions {
    /// Identity that bridge-originated writes are attributed to.
    /// Default: `$USER@$HOSTNAME`
    pub writer: WriterIdentity,

    /// Access security file loaded at bridge start, which also installs
    /// audit logging.
    /// Default: None
    pub access_security_file: Option<PathBuf>,

    /// Wall-clock limit for one script run, in milliseconds.
    /// Default: None (no limit)
    pub script_timeout_ms: Option<u64>,

    /// Priority used when a script signals completion without one.
    /// Default: Priority::Medium
    pub default_priority: Priority,
}

impl Default for BridgeOptions {
    fn default() -> Self {
        Self {
            writer: WriterIdentity::default(),
            access_security_file: None,
            script_timeout_ms: None,
            default_priority: Priority::Medium,
        }
    }
}

impl BridgeOptions {
    /// Creates options with default values.
    pub fn new() -> Self {
        Self::default()
    }

    /// Sets the writer identity.
    pub fn writer(mut self, user: impl Into<String>, host: impl Into<String>) -> Self {
        self.writer = WriterIdentity::new(user, host);
        self
    }

    /// Sets the access security file.
    pub fn access_security_file(mut self, path: impl Into<PathBuf>) -> Self {
        self.access_security_file = Some(path.into());
        self
    }

    /// Sets the script timeout.
    pub fn script_timeout_ms(mut self, timeout_ms: u64) -> Self {
        self.script_timeout_ms = Some(timeout_ms);
        self
    }

    /// Sets the default completion priority.
    pub fn default_priority(mut self, priority: Priority) -> Self {
        self.default_priority = priority;
        self
    }

    /// Parses options from JSON. Missing keys take their defaults.
    pub fn from_json_str(text: &str) -> Result<Self> {
        let options: Self = serde_json::from_str(text)?;
        options.validate()?;
        Ok(options)
    }

    /// Reads options from a JSON file.
    pub fn from_json_file(path: &Path) -> Result<Self> {
        let text = std::fs::read_to_string(path)?;
        Self::from_json_str(&text)
    }

    /// Validates the options and returns an error if any are invalid.
    pub fn validate(&self) -> Result<()> {
        for (what, value) in [("user", &self.writer.user), ("host", &self.writer.host)] {
            if value.is_empty() {
                return Err(Error::config(format!("writer {} must not be empty", what)));
            }
            if value.chars().any(char::is_whitespace) {
                return Err(Error::config(format!("writer {} must not contain whitespace: {:?}", what, value)));
            }
        }
        if self.script_timeout_ms == Some(0) {
            return Err(Error::config("script_timeout_ms must be > 0"));
        }
        Ok(())
    }
}
