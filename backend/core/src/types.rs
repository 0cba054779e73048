use std::fmt;

use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// Ordinal severity assigned to a command or content string.
///
/// Ordering is meaningful: combining two assessments keeps the maximum.
#[derive(
    Debug, Clone, Copy, Default, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize,
)]
#[serde(rename_all = "lowercase")]
pub enum RiskLevel {
    #[default]
    Low,
    Medium,
    High,
    Critical,
}

impl RiskLevel {
    /// Monotone combination of two levels.
    pub fn combine(self, other: RiskLevel) -> RiskLevel {
        self.max(other)
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            RiskLevel::Low => "low",
            RiskLevel::Medium => "medium",
            RiskLevel::High => "high",
            RiskLevel::Critical => "critical",
        }
    }
}

impl fmt::Display for RiskLevel {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// The kind of operation an action descriptor requests.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum OperationKind {
    Read,
    Write,
    Execute,
    Delete,
}

impl OperationKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            OperationKind::Read => "read",
            OperationKind::Write => "write",
            OperationKind::Execute => "execute",
            OperationKind::Delete => "delete",
        }
    }
}

impl fmt::Display for OperationKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl std::str::FromStr for OperationKind {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "read" => Ok(OperationKind::Read),
            "write" => Ok(OperationKind::Write),
            "execute" | "exec" => Ok(OperationKind::Execute),
            "delete" => Ok(OperationKind::Delete),
            other => Err(format!("unknown operation kind '{other}'")),
        }
    }
}

/// Rate-limit key for terminal command execution.
pub const TERMINAL_COMMANDS: &str = "terminal_commands";
/// Rate-limit key for file reads, writes and deletes.
pub const FILE_OPERATIONS: &str = "file_operations";

/// A structured request for a potentially destructive action.
///
/// Produced by an external extractor; the gateway only ever decides on it.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ActionDescriptor {
    pub kind: OperationKind,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub path: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub content: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub command: Option<String>,
    /// The caller already holds a backup of the target file.
    #[serde(default, skip_serializing_if = "std::ops::Not::not")]
    pub has_backup: bool,
}

impl ActionDescriptor {
    /// Run a shell command.
    pub fn command(command: impl Into<String>) -> Self {
        Self {
            kind: OperationKind::Execute,
            path: None,
            content: None,
            command: Some(command.into()),
            has_backup: false,
        }
    }

    pub fn read(path: impl Into<String>) -> Self {
        Self::file(OperationKind::Read, path)
    }

    pub fn write(path: impl Into<String>, content: impl Into<String>) -> Self {
        Self {
            content: Some(content.into()),
            ..Self::file(OperationKind::Write, path)
        }
    }

    pub fn delete(path: impl Into<String>) -> Self {
        Self::file(OperationKind::Delete, path)
    }

    /// Execute a file directly rather than through a shell command.
    pub fn execute_file(path: impl Into<String>) -> Self {
        Self::file(OperationKind::Execute, path)
    }

    fn file(kind: OperationKind, path: impl Into<String>) -> Self {
        Self {
            kind,
            path: Some(path.into()),
            content: None,
            command: None,
            has_backup: false,
        }
    }

    pub fn with_backup(mut self) -> Self {
        self.has_backup = true;
        self
    }

    /// The operation class used as the rate-limit key.
    pub fn rate_limit_key(&self) -> &'static str {
        match self.kind {
            OperationKind::Execute => TERMINAL_COMMANDS,
            _ => FILE_OPERATIONS,
        }
    }

    /// The command or path this action targets, for audit and prompts.
    pub fn subject(&self) -> Option<&str> {
        self.command.as_deref().or(self.path.as_deref())
    }
}

/// Three-way outcome of a gate.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Verdict {
    Allow,
    Deny,
    NeedsConfirmation,
}

impl Verdict {
    pub fn as_str(&self) -> &'static str {
        match self {
            Verdict::Allow => "allow",
            Verdict::Deny => "deny",
            Verdict::NeedsConfirmation => "needs_confirmation",
        }
    }
}

/// Outcome of command validation.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ValidationResult {
    pub allowed: bool,
    pub reason: String,
    pub requires_confirmation: bool,
}

impl ValidationResult {
    pub fn allow(reason: impl Into<String>) -> Self {
        Self {
            allowed: true,
            reason: reason.into(),
            requires_confirmation: false,
        }
    }

    pub fn deny(reason: impl Into<String>) -> Self {
        Self {
            allowed: false,
            reason: reason.into(),
            requires_confirmation: false,
        }
    }

    pub fn confirm(reason: impl Into<String>) -> Self {
        Self {
            allowed: false,
            reason: reason.into(),
            requires_confirmation: true,
        }
    }

    pub fn verdict(&self) -> Verdict {
        verdict_of(self.allowed, self.requires_confirmation)
    }
}

/// Outcome of a path permission check.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PermissionResult {
    pub allowed: bool,
    pub reason: String,
    pub requires_confirmation: bool,
    /// Consequence description shown alongside a confirmation prompt.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub details: Option<String>,
}

impl PermissionResult {
    pub fn allow(reason: impl Into<String>) -> Self {
        Self {
            allowed: true,
            reason: reason.into(),
            requires_confirmation: false,
            details: None,
        }
    }

    pub fn deny(reason: impl Into<String>) -> Self {
        Self {
            allowed: false,
            reason: reason.into(),
            requires_confirmation: false,
            details: None,
        }
    }

    pub fn confirm(reason: impl Into<String>, details: impl Into<String>) -> Self {
        Self {
            allowed: false,
            reason: reason.into(),
            requires_confirmation: true,
            details: Some(details.into()),
        }
    }

    pub fn verdict(&self) -> Verdict {
        verdict_of(self.allowed, self.requires_confirmation)
    }
}

fn verdict_of(allowed: bool, requires_confirmation: bool) -> Verdict {
    match (allowed, requires_confirmation) {
        (true, _) => Verdict::Allow,
        (false, true) => Verdict::NeedsConfirmation,
        (false, false) => Verdict::Deny,
    }
}

/// Final gateway decision returned to the caller.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Decision {
    pub id: Uuid,
    pub allowed: bool,
    pub reason: String,
    pub requires_confirmation: bool,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub retry_after_seconds: Option<u64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub risk_level: Option<RiskLevel>,
    /// Consequence description for a decision that needs confirmation.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub details: Option<String>,
}

impl Decision {
    pub fn allow(reason: impl Into<String>) -> Self {
        Self::new(true, reason, false)
    }

    pub fn deny(reason: impl Into<String>) -> Self {
        Self::new(false, reason, false)
    }

    pub fn confirm(reason: impl Into<String>) -> Self {
        Self::new(false, reason, true)
    }

    fn new(allowed: bool, reason: impl Into<String>, requires_confirmation: bool) -> Self {
        Self {
            id: Uuid::new_v4(),
            allowed,
            reason: reason.into(),
            requires_confirmation,
            retry_after_seconds: None,
            risk_level: None,
            details: None,
        }
    }

    pub fn with_risk(mut self, level: RiskLevel) -> Self {
        self.risk_level = Some(level);
        self
    }

    pub fn with_details(mut self, details: Option<String>) -> Self {
        self.details = details;
        self
    }

    pub fn verdict(&self) -> Verdict {
        verdict_of(self.allowed, self.requires_confirmation)
    }
}
