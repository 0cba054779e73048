//! Config validation: schema checks with user-friendly messages.

use thiserror::Error;

use crate::policy::SecurityLevel;
use crate::schema::ActGuardConfig;

/// A config validation error with field path and message.
#[derive(Debug, Error)]
#[error("Config validation error at '{path}': {message}")]
pub struct ConfigValidationError {
    pub path: String,
    pub message: String,
}

/// A collection of validation errors found in one pass.
#[derive(Debug, Default)]
pub struct ValidationReport {
    pub errors: Vec<ConfigValidationError>,
    pub warnings: Vec<ConfigValidationError>,
}

impl ValidationReport {
    pub fn is_valid(&self) -> bool {
        self.errors.is_empty()
    }

    fn error(&mut self, path: impl Into<String>, message: impl Into<String>) {
        self.errors.push(ConfigValidationError {
            path: path.into(),
            message: message.into(),
        });
    }

    fn warn(&mut self, path: impl Into<String>, message: impl Into<String>) {
        self.warnings.push(ConfigValidationError {
            path: path.into(),
            message: message.into(),
        });
    }
}

/// Validate the config and return a report of all errors and warnings.
pub fn validate(config: &ActGuardConfig) -> ValidationReport {
    let mut report = ValidationReport::default();
    validate_level(config, &mut report);
    validate_workspace(config, &mut report);
    validate_logging(config, &mut report);
    report
}

fn validate_level(config: &ActGuardConfig, report: &mut ValidationReport) {
    let level = match config.security_level.parse::<SecurityLevel>() {
        Ok(level) => level,
        Err(_) => {
            report.warn(
                "securityLevel",
                format!(
                    "Unknown security level '{}'; falling back to 'minimal'",
                    config.security_level
                ),
            );
            SecurityLevel::Minimal
        }
    };

    if level == SecurityLevel::Disabled {
        report.warn(
            "securityLevel",
            "Security is disabled; only the filesystem-root wipe is still blocked",
        );
    }
    if config.allow_dangerous_commands && level == SecurityLevel::Strict {
        report.warn(
            "allowDangerousCommands",
            "allowDangerousCommands weakens the 'strict' level; high-risk commands run without confirmation",
        );
    }
}

fn validate_workspace(config: &ActGuardConfig, report: &mut ValidationReport) {
    let workspace = &config.workspace;
    if workspace.roots.is_empty() {
        report.warn(
            "workspace.roots",
            "No workspace roots configured; every file operation will be denied",
        );
    }
    for (i, root) in workspace.roots.iter().enumerate() {
        if root.as_os_str().is_empty() {
            report.error(format!("workspace.roots[{i}]"), "Workspace root cannot be empty");
        } else if !root.is_absolute() {
            report.error(
                format!("workspace.roots[{i}]"),
                format!("Workspace root '{}' must be an absolute path", root.display()),
            );
        }
    }
}

fn validate_logging(config: &ActGuardConfig, report: &mut ValidationReport) {
    let Some(level) = &config.log_level else { return };
    if !matches!(
        level.to_ascii_lowercase().as_str(),
        "trace" | "debug" | "info" | "warn" | "error"
    ) {
        report.warn(
            "logLevel",
            format!("Unknown log level '{level}'; use trace, debug, info, warn or error"),
        );
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::path::PathBuf;

    fn with_root(root: &str) -> ActGuardConfig {
        let mut cfg = ActGuardConfig::default();
        cfg.workspace.roots = vec![PathBuf::from(root)];
        cfg
    }

    #[test]
    fn absolute_root_is_valid() {
        let report = validate(&with_root("/srv/project"));
        assert!(report.is_valid(), "errors: {:?}", report.errors);
        assert!(report.warnings.is_empty());
    }

    #[test]
    fn relative_root_is_error() {
        let report = validate(&with_root("project"));
        assert!(!report.is_valid());
        assert!(report.errors[0].path.contains("workspace.roots[0]"));
    }

    #[test]
    fn unknown_level_is_warning_not_error() {
        let mut cfg = with_root("/srv/project");
        cfg.security_level = "paranoid".into();
        let report = validate(&cfg);
        assert!(report.is_valid());
        assert!(report.warnings.iter().any(|w| w.message.contains("minimal")));
    }

    #[test]
    fn missing_roots_warns() {
        let report = validate(&ActGuardConfig::default());
        assert!(report.is_valid());
        assert_eq!(report.warnings[0].path, "workspace.roots");
    }
}
