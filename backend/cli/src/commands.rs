//! Subcommand implementations.

use std::path::Path;

use actguard_config::{SecurityConfig, SecurityLevel};
use actguard_core::{ActionDescriptor, Decision, GateError, Verdict};
use actguard_gateway::Gateway;
use actguard_security::RiskAssessor;
use anyhow::{Context, Result};
use serde_json::json;
use tracing::info;

use crate::output::{policy_rows, render_assessment, render_decision, render_table, supports_color};

pub const EXIT_OK: u8 = 0;
pub const EXIT_DENIED: u8 = 1;
pub const EXIT_NEEDS_CONFIRMATION: u8 = 2;
pub const EXIT_RATE_LIMITED: u8 = 3;

pub fn assess(command: &str, as_json: bool) -> Result<u8> {
    let assessment = RiskAssessor::new().assess(command);
    if as_json {
        println!("{}", serde_json::to_string_pretty(&assessment)?);
    } else {
        print!("{}", render_assessment(&assessment, supports_color()));
    }
    Ok(EXIT_OK)
}

pub async fn check(gateway: &Gateway, action: &ActionDescriptor, as_json: bool) -> Result<u8> {
    let outcome = gateway.evaluate(action).await;
    let code = exit_code(&outcome);
    match outcome {
        Ok(decision) if as_json => println!("{}", serde_json::to_string_pretty(&decision)?),
        Ok(decision) => println!("{}", render_decision(&decision, supports_color())),
        Err(err) => print_rate_limit(&err, as_json)?,
    }
    Ok(code)
}

/// Evaluate one JSON descriptor per line; print one JSON result per line.
pub async fn batch(gateway: &Gateway, file: &Path, with_audit: bool) -> Result<u8> {
    let raw = tokio::fs::read_to_string(file)
        .await
        .with_context(|| format!("failed to read {}", file.display()))?;

    let mut evaluated = 0usize;
    let mut denied = 0usize;
    for (idx, line) in raw.lines().enumerate() {
        let line = line.trim();
        if line.is_empty() || line.starts_with('#') {
            continue;
        }
        let action: ActionDescriptor = serde_json::from_str(line)
            .with_context(|| format!("{}:{}: invalid action descriptor", file.display(), idx + 1))?;

        let record = match gateway.evaluate(&action).await {
            Ok(decision) => {
                if decision.verdict() != Verdict::Allow {
                    denied += 1;
                }
                json!({ "line": idx + 1, "decision": decision })
            }
            Err(err) => {
                denied += 1;
                json!({
                    "line": idx + 1,
                    "error": err.to_string(),
                    "retryAfterSeconds": err.retry_after_secs(),
                })
            }
        };
        evaluated += 1;
        println!("{}", serde_json::to_string(&record)?);
    }

    info!(evaluated, denied, "Batch complete");
    if with_audit {
        print!("{}", gateway.audit().export_ndjson().await?);
    }
    Ok(if denied == 0 { EXIT_OK } else { EXIT_DENIED })
}

pub fn levels(show_csp: bool) {
    let color = supports_color();
    let configs: Vec<SecurityConfig> = SecurityLevel::ALL
        .iter()
        .map(|level| SecurityConfig::for_level(*level))
        .collect();
    print!(
        "{}",
        render_table(
            &["level", "rate", "sanitize", "commands", "files", "audit", "content"],
            &policy_rows(&configs, color),
            color,
        )
    );
    if show_csp {
        println!();
        for config in &configs {
            println!("{}: {}", config.level, config.content_policy.csp_header());
        }
    }
}

fn exit_code(outcome: &Result<Decision, GateError>) -> u8 {
    match outcome {
        Ok(decision) => match decision.verdict() {
            Verdict::Allow => EXIT_OK,
            Verdict::Deny => EXIT_DENIED,
            Verdict::NeedsConfirmation => EXIT_NEEDS_CONFIRMATION,
        },
        Err(_) => EXIT_RATE_LIMITED,
    }
}

fn print_rate_limit(err: &GateError, as_json: bool) -> Result<()> {
    if as_json {
        let body = json!({
            "allowed": false,
            "reason": err.to_string(),
            "requiresConfirmation": false,
            "retryAfterSeconds": err.retry_after_secs(),
        });
        println!("{}", serde_json::to_string_pretty(&body)?);
    } else {
        eprintln!("{err}");
    }
    Ok(())
}
