//! Security primitives for the decision gateway.
//!
//! Each piece decides one thing: how risky a string is, whether a command may
//! run, whether a path operation is permitted. The gateway combines them.

pub mod audit;
pub mod command;
pub mod permissions;
pub mod risk;
pub mod sanitize;

pub use audit::{AuditEntry, AuditKind, AuditLog, DEFAULT_AUDIT_CAPACITY};
pub use command::{is_blacklisted, is_root_wipe, is_whitelisted, CommandCheck, CommandValidator};
pub use permissions::{PermissionOptions, PermissionsGate, Workspace, DEFAULT_CACHE_TTL};
pub use risk::{score, ApprovalSet, RiskAssessment, RiskAssessor, RuleEntry, RULE_TABLE};
pub use sanitize::{sanitize, sanitize_command, sanitize_content, MAX_COMMAND_CHARS, MAX_CONTENT_CHARS};
