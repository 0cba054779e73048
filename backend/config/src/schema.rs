//! On-disk configuration schema.

use std::path::PathBuf;

use serde::{Deserialize, Serialize};

use crate::policy::{SecurityConfig, SecurityLevel};

/// Root of `config.yaml`.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ActGuardConfig {
    /// Kept as text so an unknown level degrades to `minimal` instead of
    /// failing the whole load.
    #[serde(default = "default_security_level")]
    pub security_level: String,

    #[serde(default)]
    pub allow_dangerous_commands: bool,

    #[serde(default)]
    pub workspace: WorkspaceConfig,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub log_level: Option<String>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub log_dir: Option<PathBuf>,
}

fn default_security_level() -> String {
    SecurityLevel::default().as_str().to_string()
}

impl Default for ActGuardConfig {
    fn default() -> Self {
        Self {
            security_level: default_security_level(),
            allow_dangerous_commands: false,
            workspace: WorkspaceConfig::default(),
            log_level: None,
            log_dir: None,
        }
    }
}

impl ActGuardConfig {
    pub fn level(&self) -> SecurityLevel {
        SecurityLevel::parse_lenient(&self.security_level)
    }

    /// Gate toggles for the configured level plus the dangerous-command override.
    pub fn security_config(&self) -> SecurityConfig {
        SecurityConfig::for_level(self.level())
            .with_allow_dangerous_commands(self.allow_dangerous_commands)
    }
}

/// Workspace roots and their trust state.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct WorkspaceConfig {
    #[serde(default)]
    pub roots: Vec<PathBuf>,

    #[serde(default = "default_true")]
    pub trusted: bool,

    #[serde(default = "default_true")]
    pub allow_reads: bool,
}

fn default_true() -> bool {
    true
}

impl Default for WorkspaceConfig {
    fn default() -> Self {
        Self {
            roots: Vec::new(),
            trusted: true,
            allow_reads: true,
        }
    }
}
