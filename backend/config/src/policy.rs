//! Named security levels and the gate toggles they map to.

use std::fmt;
use std::str::FromStr;

use actguard_core::GateError;
use serde::{Deserialize, Serialize};
use tracing::warn;

/// The single configuration selector for the gateway.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SecurityLevel {
    Disabled,
    Minimal,
    #[default]
    Standard,
    Strict,
}

impl SecurityLevel {
    pub const ALL: [SecurityLevel; 4] = [
        SecurityLevel::Disabled,
        SecurityLevel::Minimal,
        SecurityLevel::Standard,
        SecurityLevel::Strict,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            SecurityLevel::Disabled => "disabled",
            SecurityLevel::Minimal => "minimal",
            SecurityLevel::Standard => "standard",
            SecurityLevel::Strict => "strict",
        }
    }

    /// Parse a level name, falling back to `Minimal` for anything unknown.
    pub fn parse_lenient(raw: &str) -> SecurityLevel {
        raw.parse().unwrap_or_else(|err: GateError| {
            warn!(level = %raw, error = %err, "Unknown security level, falling back to minimal");
            SecurityLevel::Minimal
        })
    }
}

impl fmt::Display for SecurityLevel {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for SecurityLevel {
    type Err = GateError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "disabled" | "off" | "none" => Ok(SecurityLevel::Disabled),
            "minimal" => Ok(SecurityLevel::Minimal),
            "standard" => Ok(SecurityLevel::Standard),
            "strict" => Ok(SecurityLevel::Strict),
            other => Err(GateError::ConfigInvalid(format!(
                "unknown security level '{other}'"
            ))),
        }
    }
}

/// Content-security strictness for rendering assistant output.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ContentPolicy {
    #[default]
    Relaxed,
    Standard,
    Strict,
}

impl ContentPolicy {
    pub fn as_str(&self) -> &'static str {
        match self {
            ContentPolicy::Relaxed => "relaxed",
            ContentPolicy::Standard => "standard",
            ContentPolicy::Strict => "strict",
        }
    }

    /// `Content-Security-Policy` header value for a webview host.
    pub fn csp_header(&self) -> &'static str {
        match self {
            ContentPolicy::Relaxed => "default-src * 'unsafe-inline' 'unsafe-eval' data: blob:",
            ContentPolicy::Standard => {
                "default-src 'self'; script-src 'self'; style-src 'self' 'unsafe-inline'; img-src 'self' data:"
            }
            ContentPolicy::Strict => {
                "default-src 'none'; script-src 'self'; style-src 'self'; img-src 'self'; connect-src 'self'; frame-ancestors 'none'"
            }
        }
    }
}

/// Gate toggles derived from a [`SecurityLevel`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SecurityConfig {
    pub level: SecurityLevel,
    pub rate_limiting: bool,
    pub input_sanitization: bool,
    pub command_validation: bool,
    pub file_permissions: bool,
    pub audit_logging: bool,
    pub strict_content_policy: bool,
    pub allow_dangerous_commands: bool,
    pub content_policy: ContentPolicy,
}

impl SecurityConfig {
    /// Pure lookup from level to toggles.
    pub fn for_level(level: SecurityLevel) -> Self {
        match level {
            SecurityLevel::Disabled => Self {
                level,
                rate_limiting: false,
                input_sanitization: false,
                command_validation: false,
                file_permissions: false,
                audit_logging: false,
                strict_content_policy: false,
                allow_dangerous_commands: false,
                content_policy: ContentPolicy::Relaxed,
            },
            SecurityLevel::Minimal => Self {
                level,
                rate_limiting: true,
                input_sanitization: true,
                command_validation: true,
                file_permissions: false,
                audit_logging: false,
                strict_content_policy: false,
                allow_dangerous_commands: false,
                content_policy: ContentPolicy::Relaxed,
            },
            SecurityLevel::Standard | SecurityLevel::Strict => Self {
                level,
                rate_limiting: true,
                input_sanitization: true,
                command_validation: true,
                file_permissions: true,
                audit_logging: true,
                strict_content_policy: true,
                allow_dangerous_commands: false,
                content_policy: if level == SecurityLevel::Strict {
                    ContentPolicy::Strict
                } else {
                    ContentPolicy::Standard
                },
            },
        }
    }

    pub fn with_allow_dangerous_commands(mut self, allow: bool) -> Self {
        self.allow_dangerous_commands = allow;
        self
    }
}

impl Default for SecurityConfig {
    fn default() -> Self {
        Self::for_level(SecurityLevel::default())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn disabled_turns_every_gate_off() {
        let cfg = SecurityConfig::for_level(SecurityLevel::Disabled);
        assert!(!cfg.rate_limiting);
        assert!(!cfg.input_sanitization);
        assert!(!cfg.command_validation);
        assert!(!cfg.file_permissions);
        assert!(!cfg.audit_logging);
        assert!(!cfg.strict_content_policy);
        assert!(!cfg.allow_dangerous_commands);
    }

    #[test]
    fn minimal_keeps_rate_sanitize_and_commands() {
        let cfg = SecurityConfig::for_level(SecurityLevel::Minimal);
        assert!(cfg.rate_limiting && cfg.input_sanitization && cfg.command_validation);
        assert!(!cfg.file_permissions && !cfg.audit_logging && !cfg.strict_content_policy);
    }

    #[test]
    fn standard_and_strict_differ_only_in_content_policy() {
        let standard = SecurityConfig::for_level(SecurityLevel::Standard);
        let strict = SecurityConfig::for_level(SecurityLevel::Strict);
        assert_eq!(standard.content_policy, ContentPolicy::Standard);
        assert_eq!(strict.content_policy, ContentPolicy::Strict);
        let normalized = SecurityConfig {
            level: SecurityLevel::Standard,
            content_policy: ContentPolicy::Standard,
            ..strict
        };
        assert_eq!(normalized, standard);
    }

    #[test]
    fn no_level_allows_dangerous_commands_by_default() {
        for level in SecurityLevel::ALL {
            assert!(!SecurityConfig::for_level(level).allow_dangerous_commands);
        }
        let overridden =
            SecurityConfig::for_level(SecurityLevel::Standard).with_allow_dangerous_commands(true);
        assert!(overridden.allow_dangerous_commands);
    }

    #[test]
    fn unknown_level_falls_back_to_minimal() {
        assert!("paranoid".parse::<SecurityLevel>().is_err());
        assert_eq!(SecurityLevel::parse_lenient("paranoid"), SecurityLevel::Minimal);
        assert_eq!(SecurityLevel::parse_lenient(" Strict "), SecurityLevel::Strict);
    }

    #[test]
    fn strict_csp_forbids_framing() {
        assert!(ContentPolicy::Strict.csp_header().contains("frame-ancestors 'none'"));
    }
}
