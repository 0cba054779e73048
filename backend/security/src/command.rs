//! Command validation — whitelist, blacklist and risk level combined into
//! allow / deny / needs-confirmation for terminal commands.

use std::sync::Arc;

use actguard_core::{RiskLevel, ValidationResult};
use tracing::{debug, warn};

use crate::risk::{RiskAssessment, RiskAssessor};

/// Commands allowed without risk scoring. Single words match the leading
/// program name; multi-word entries match as a prefix.
pub static WHITELIST: &[&str] = &[
    "ls", "pwd", "echo", "cat", "head", "tail", "wc", "grep", "which", "whoami", "date", "uname",
    "tree", "git status", "git log", "git diff", "git show", "git branch", "npm test",
    "npm run", "npm ls", "cargo build", "cargo test", "cargo check", "cargo fmt", "cargo clippy",
    "node --version", "npm --version", "python --version", "python3 --version",
];

/// Substrings that deny a command outright, whatever its risk level.
pub static BLACKLIST: &[&str] = &[
    "rm -rf /*",
    ":(){",
    "mkfs",
    "dd if=/dev/zero",
    "dd if=/dev/urandom",
    "> /dev/sda",
    "chmod -r 777 /",
    "shutdown -h",
    "shutdown now",
    "poweroff",
    "format c:",
    "del /f /s /q c:\\",
];

/// Shell syntax that chains, substitutes or redirects. Commands containing
/// any of these never match the whitelist.
const SHELL_SYNTAX: &[&str] = &[";", "&&", "||", "|", "`", "$(", ">", "<", "&", "\n"];

/// Validation outcome plus the assessment behind it, when one was made.
#[derive(Debug, Clone)]
pub struct CommandCheck {
    pub result: ValidationResult,
    pub risk: Option<RiskAssessment>,
}

impl CommandCheck {
    pub fn risk_level(&self) -> Option<RiskLevel> {
        self.risk.as_ref().map(|r| r.level)
    }
}

pub struct CommandValidator {
    assessor: Arc<RiskAssessor>,
}

impl CommandValidator {
    pub fn new(assessor: Arc<RiskAssessor>) -> Self {
        Self { assessor }
    }

    pub fn assessor(&self) -> &Arc<RiskAssessor> {
        &self.assessor
    }

    /// Whitelist, then risk: the order used for a single command.
    pub fn validate(&self, command: &str) -> ValidationResult {
        self.check(command).result
    }

    /// Blacklist first, then [`validate`](Self::validate). A whitelisted
    /// command never escapes a blacklist hit.
    pub fn evaluate(&self, command: &str) -> CommandCheck {
        if let Some(entry) = blacklist_hit(command) {
            warn!(entry, "Blacklisted command rejected");
            return CommandCheck {
                result: ValidationResult::deny(format!("blacklisted: matches '{entry}'")),
                risk: None,
            };
        }
        self.check(command)
    }

    pub fn check(&self, command: &str) -> CommandCheck {
        if is_whitelisted(command) {
            debug!("Whitelisted command");
            return CommandCheck {
                result: ValidationResult::allow("whitelisted"),
                risk: None,
            };
        }

        let risk = self.assessor.assess(command);
        let result = match risk.level {
            RiskLevel::Critical => {
                warn!(concerns = ?risk.concerns, "Critical command denied");
                ValidationResult::deny(format!("critical risk: {}", risk.concerns.join(", ")))
            }
            RiskLevel::High if risk.approved => {
                ValidationResult::allow("high risk, approved earlier this session")
            }
            RiskLevel::High => ValidationResult::confirm(format!(
                "high risk, confirmation required: {}",
                risk.concerns.join(", ")
            )),
            level => ValidationResult::allow(format!("{level} risk")),
        };

        CommandCheck {
            result,
            risk: Some(risk),
        }
    }
}

/// The blacklist entry `command` contains, if any (case-insensitive).
pub fn blacklist_hit(command: &str) -> Option<&'static str> {
    let lower = command.to_lowercase();
    BLACKLIST.iter().copied().find(|entry| lower.contains(entry))
}

pub fn is_blacklisted(command: &str) -> bool {
    blacklist_hit(command).is_some()
}

pub fn is_whitelisted(command: &str) -> bool {
    let lower = command.trim().to_lowercase();
    if lower.is_empty() || SHELL_SYNTAX.iter().any(|s| lower.contains(s)) {
        return false;
    }
    let program = lower
        .split_whitespace()
        .next()
        .map(|p| p.rsplit('/').next().unwrap_or(p))
        .unwrap_or("");

    WHITELIST.iter().any(|entry| {
        if entry.contains(' ') {
            lower == *entry || lower.starts_with(&format!("{entry} "))
        } else {
            program == *entry
        }
    })
}

/// Recursive deletion of the filesystem root (`rm -rf /` and close variants).
///
/// This check is independent of every security level.
pub fn is_root_wipe(command: &str) -> bool {
    command
        .split(|c| matches!(c, ';' | '|' | '&' | '\n'))
        .any(segment_wipes_root)
}

fn segment_wipes_root(segment: &str) -> bool {
    let mut words = segment
        .split_whitespace()
        .skip_while(|w| matches!(*w, "sudo" | "doas" | "command" | "exec") || is_env_assignment(w));

    let Some(program) = words.next() else {
        return false;
    };
    if program.rsplit('/').next() != Some("rm") {
        return false;
    }

    let mut recursive = false;
    let mut targets_root = false;
    for word in words {
        match word {
            "--recursive" => recursive = true,
            "--no-preserve-root" | "--force" | "--" => {}
            flag if flag.starts_with('-') && !flag.starts_with("--") => {
                recursive |= flag.contains('r') || flag.contains('R');
            }
            target => {
                let target = target.trim_matches(|c| c == '"' || c == '\'');
                targets_root |= matches!(target, "/" | "/*" | "/." | "//");
            }
        }
    }
    recursive && targets_root
}

fn is_env_assignment(word: &str) -> bool {
    word.split_once('=').is_some_and(|(name, _)| {
        !name.is_empty() && name.chars().all(|c| c.is_ascii_alphanumeric() || c == '_')
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    fn validator() -> CommandValidator {
        CommandValidator::new(Arc::new(RiskAssessor::new()))
    }

    #[test]
    fn git_status_is_whitelisted() {
        let check = validator().evaluate("git status");
        assert!(check.result.allowed);
        assert_eq!(check.result.reason, "whitelisted");
        assert!(check.risk.is_none());
    }

    #[test]
    fn chained_commands_skip_the_whitelist() {
        assert!(!is_whitelisted("ls; rm -rf ~"));
        assert!(!is_whitelisted("cat notes.txt > /etc/passwd"));
        assert!(is_whitelisted("/bin/ls -la"));
        assert!(!is_whitelisted("git stash"));
    }

    #[test]
    fn whitelisted_words_elsewhere_in_a_command_do_not_match() {
        assert!(!is_whitelisted("sudo ls"));
        assert!(!is_whitelisted("chmod 777 git status"));
        assert!(!is_whitelisted("lsblk"));
        assert!(!is_whitelisted("xgit status"));
        assert!(is_whitelisted("GIT STATUS --short"));
    }

    #[test]
    fn critical_is_denied_even_when_approved() {
        let v = validator();
        v.assessor().approve("sudo rm -rf /");
        let result = v.validate("sudo rm -rf /");
        assert!(!result.allowed);
        assert!(!result.requires_confirmation);
        assert!(result.reason.contains("Recursive forced deletion"));
    }

    #[test]
    fn high_risk_needs_confirmation_until_approved() {
        let v = validator();
        let first = v.validate("chmod 777 deploy.sh");
        assert!(!first.allowed);
        assert!(first.requires_confirmation);

        v.assessor().approve("chmod 777 deploy.sh");
        let second = v.validate("chmod 777 deploy.sh");
        assert!(second.allowed);
        assert!(!second.requires_confirmation);
    }

    #[test]
    fn medium_risk_is_allowed() {
        let check = validator().evaluate("npm install");
        assert!(check.result.allowed);
        assert_eq!(check.risk_level(), Some(RiskLevel::Medium));
    }

    #[test]
    fn blacklist_beats_whitelist() {
        // `echo` is whitelisted by program name but the text hits `mkfs`.
        assert!(is_whitelisted("echo mkfs"));
        let check = validator().evaluate("echo mkfs");
        assert!(!check.result.allowed);
        assert!(check.result.reason.starts_with("blacklisted"));
    }

    #[test]
    fn detects_root_wipes() {
        assert!(is_root_wipe("rm -rf /"));
        assert!(is_root_wipe("sudo rm -rf /"));
        assert!(is_root_wipe("rm -r -f /*"));
        assert!(is_root_wipe("rm --recursive --no-preserve-root /"));
        assert!(is_root_wipe("cd /tmp && rm -fr '/'"));
        assert!(is_root_wipe("LANG=C /bin/rm -Rf /"));
    }

    #[test]
    fn ignores_scoped_deletes() {
        assert!(!is_root_wipe("rm -rf /tmp/build"));
        assert!(!is_root_wipe("rm -rf ./"));
        assert!(!is_root_wipe("rm /"));
        assert!(!is_root_wipe("echo rm -rf /"));
    }
}
