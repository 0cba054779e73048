//! `actguard-config` — security levels and runtime configuration.
//!
//! Provides:
//! - The `SecurityLevel` → `SecurityConfig` lookup table
//! - YAML config read/write
//! - Environment overrides for the level, the dangerous-command flag and the workspace
//! - Validation with warnings for degraded-but-usable settings

pub mod env;
pub mod io;
pub mod policy;
pub mod schema;
pub mod validation;

pub use env::{apply_env_overrides, apply_env_overrides_with};
pub use io::{config_dir, config_file_path, load_config, write_config};
pub use policy::{ContentPolicy, SecurityConfig, SecurityLevel};
pub use schema::{ActGuardConfig, WorkspaceConfig};
pub use validation::{validate, ConfigValidationError, ValidationReport};

use anyhow::{bail, Result};
use std::path::Path;

/// Load a config file, apply environment overrides and validate it.
///
/// Warnings are logged; any validation error aborts the load.
pub async fn load_and_prepare(path: &Path) -> Result<ActGuardConfig> {
    let config = apply_env_overrides(load_config(path).await?);

    let report = validate(&config);
    for warning in &report.warnings {
        tracing::warn!(path = %warning.path, message = %warning.message, "Config warning");
    }
    for error in &report.errors {
        tracing::error!(path = %error.path, message = %error.message, "Config error");
    }
    if !report.is_valid() {
        bail!(
            "config at {} has {} error(s): {}",
            path.display(),
            report.errors.len(),
            report.errors[0]
        );
    }

    Ok(config)
}
