//! Environment overrides for the two runtime knobs and the workspace.
//!
//! `ACTGUARD_SECURITY_LEVEL` replaces `securityLevel`,
//! `ACTGUARD_ALLOW_DANGEROUS` (`1`/`true`/`yes`) sets the override flag and
//! `ACTGUARD_WORKSPACE` (a platform path list) replaces the workspace roots.

use std::collections::HashMap;
use std::path::PathBuf;

use tracing::debug;

use crate::schema::ActGuardConfig;

pub const ENV_SECURITY_LEVEL: &str = "ACTGUARD_SECURITY_LEVEL";
pub const ENV_ALLOW_DANGEROUS: &str = "ACTGUARD_ALLOW_DANGEROUS";
pub const ENV_WORKSPACE: &str = "ACTGUARD_WORKSPACE";

/// Apply overrides from the process environment.
pub fn apply_env_overrides(config: ActGuardConfig) -> ActGuardConfig {
    apply_env_overrides_with(config, &std::env::vars().collect())
}

/// Apply overrides from a provided map (useful for testing).
pub fn apply_env_overrides_with(
    mut config: ActGuardConfig,
    env: &HashMap<String, String>,
) -> ActGuardConfig {
    if let Some(level) = non_empty(env, ENV_SECURITY_LEVEL) {
        debug!(level = %level, "Security level overridden from environment");
        config.security_level = level.to_string();
    }

    if let Some(flag) = non_empty(env, ENV_ALLOW_DANGEROUS) {
        config.allow_dangerous_commands = parse_flag(flag);
    }

    if let Some(roots) = non_empty(env, ENV_WORKSPACE) {
        config.workspace.roots = std::env::split_paths(roots).collect::<Vec<PathBuf>>();
    }

    config
}

fn non_empty<'a>(env: &'a HashMap<String, String>, key: &str) -> Option<&'a str> {
    env.get(key).map(|v| v.trim()).filter(|v| !v.is_empty())
}

fn parse_flag(raw: &str) -> bool {
    matches!(raw.to_ascii_lowercase().as_str(), "1" | "true" | "yes" | "on")
}

#[cfg(test)]
mod tests {
    use super::*;

    fn env(pairs: &[(&str, &str)]) -> HashMap<String, String> {
        pairs
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect()
    }

    #[test]
    fn level_and_flag_override_file_values() {
        let cfg = apply_env_overrides_with(
            ActGuardConfig::default(),
            &env(&[(ENV_SECURITY_LEVEL, "minimal"), (ENV_ALLOW_DANGEROUS, "yes")]),
        );
        assert_eq!(cfg.security_level, "minimal");
        assert!(cfg.allow_dangerous_commands);
    }

    #[test]
    fn blank_values_are_ignored() {
        let cfg = apply_env_overrides_with(
            ActGuardConfig::default(),
            &env(&[(ENV_SECURITY_LEVEL, "  ")]),
        );
        assert_eq!(cfg.security_level, "standard");
    }

    #[test]
    fn workspace_roots_come_from_path_list() {
        let joined = std::env::join_paths(["/a", "/b"]).unwrap();
        let cfg = apply_env_overrides_with(
            ActGuardConfig::default(),
            &env(&[(ENV_WORKSPACE, joined.to_str().unwrap())]),
        );
        assert_eq!(
            cfg.workspace.roots,
            vec![PathBuf::from("/a"), PathBuf::from("/b")]
        );
    }
}
