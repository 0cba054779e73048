//! Terminal rendering for decisions, assessments and the policy table.

use actguard_config::SecurityConfig;
use actguard_core::{Decision, RiskLevel, Verdict};
use actguard_security::RiskAssessment;

const RESET: &str = "\x1b[0m";
const BOLD: &str = "\x1b[1m";
const DIM: &str = "\x1b[2m";
const RED: &str = "\x1b[31m";
const GREEN: &str = "\x1b[32m";
const YELLOW: &str = "\x1b[33m";
const MAGENTA: &str = "\x1b[35m";

/// Color unless `NO_COLOR` is set or the terminal is dumb.
pub fn supports_color() -> bool {
    std::env::var_os("NO_COLOR").is_none()
        && std::env::var("TERM").map(|t| t != "dumb").unwrap_or(false)
}

fn paint(color: &str, text: &str, enabled: bool) -> String {
    if enabled {
        format!("{color}{BOLD}{text}{RESET}")
    } else {
        text.to_string()
    }
}

fn risk_color(level: RiskLevel) -> &'static str {
    match level {
        RiskLevel::Low => GREEN,
        RiskLevel::Medium => YELLOW,
        RiskLevel::High => RED,
        RiskLevel::Critical => MAGENTA,
    }
}

pub fn verdict_badge(verdict: Verdict, color: bool) -> String {
    match verdict {
        Verdict::Allow => paint(GREEN, "ALLOW", color),
        Verdict::Deny => paint(RED, "DENY", color),
        Verdict::NeedsConfirmation => paint(YELLOW, "CONFIRM", color),
    }
}

pub fn render_decision(decision: &Decision, color: bool) -> String {
    let mut line = format!("{} {}", verdict_badge(decision.verdict(), color), decision.reason);
    if let Some(level) = decision.risk_level {
        line.push_str(&format!(" [{}]", paint(risk_color(level), level.as_str(), color)));
    }
    if let Some(secs) = decision.retry_after_seconds {
        line.push_str(&format!(" (retry in {secs}s)"));
    }
    if let Some(details) = &decision.details {
        line.push_str(&format!("\n  {details}"));
    }
    line
}

pub fn render_assessment(assessment: &RiskAssessment, color: bool) -> String {
    let mut out = format!(
        "risk: {}\n",
        paint(risk_color(assessment.level), assessment.level.as_str(), color)
    );
    if assessment.concerns.is_empty() {
        out.push_str("no concerns\n");
    }
    for concern in &assessment.concerns {
        out.push_str(&format!("  - {concern}\n"));
    }
    if assessment.approved {
        out.push_str("approved earlier this session\n");
    }
    out
}

/// Left-aligned table. ANSI sequences do not count toward column width.
pub fn render_table(headers: &[&str], rows: &[Vec<String>], color: bool) -> String {
    let mut widths: Vec<usize> = headers.iter().map(|h| h.chars().count()).collect();
    for row in rows {
        for (width, cell) in widths.iter_mut().zip(row) {
            *width = (*width).max(visible_len(cell));
        }
    }

    let pad = |cell: &str, width: usize| {
        format!("{cell}{}", " ".repeat(width.saturating_sub(visible_len(cell))))
    };
    let header: Vec<String> = headers
        .iter()
        .zip(&widths)
        .map(|(h, w)| pad(h, *w))
        .collect();

    let mut out = String::new();
    if color {
        out.push_str(&format!("{BOLD}{}{RESET}\n", header.join("  ").trim_end()));
    } else {
        out.push_str(&format!("{}\n", header.join("  ").trim_end()));
    }
    let rule: Vec<String> = widths.iter().map(|w| "-".repeat(*w)).collect();
    out.push_str(&format!("{}\n", rule.join("  ")));
    for row in rows {
        let cells: Vec<String> = row.iter().zip(&widths).map(|(c, w)| pad(c, *w)).collect();
        out.push_str(&format!("{}\n", cells.join("  ").trim_end()));
    }
    out
}

pub fn policy_rows(configs: &[SecurityConfig], color: bool) -> Vec<Vec<String>> {
    let flag = |on: bool| {
        if on {
            paint(GREEN, "on", color)
        } else if color {
            format!("{DIM}off{RESET}")
        } else {
            "off".to_string()
        }
    };
    configs
        .iter()
        .map(|c| {
            vec![
                c.level.as_str().to_string(),
                flag(c.rate_limiting),
                flag(c.input_sanitization),
                flag(c.command_validation),
                flag(c.file_permissions),
                flag(c.audit_logging),
                c.content_policy.as_str().to_string(),
            ]
        })
        .collect()
}

fn visible_len(s: &str) -> usize {
    let mut len = 0;
    let mut chars = s.chars();
    while let Some(c) = chars.next() {
        if c == '\x1b' {
            for next in chars.by_ref() {
                if next == 'm' {
                    break;
                }
            }
        } else {
            len += 1;
        }
    }
    len
}

#[cfg(test)]
mod tests {
    use actguard_config::SecurityLevel;

    use super::*;

    #[test]
    fn colored_cells_keep_alignment() {
        let rows = policy_rows(&[SecurityConfig::for_level(SecurityLevel::Minimal)], true);
        let table = render_table(
            &["level", "rate", "sanitize", "commands", "files", "audit", "content"],
            &rows,
            true,
        );
        assert_eq!(visible_len(&rows[0][1]), 2);
        assert!(table.contains("minimal"));
    }

    #[test]
    fn plain_decision_line() {
        let decision = Decision::confirm("high risk").with_risk(RiskLevel::High);
        assert_eq!(render_decision(&decision, false), "CONFIRM high risk [high]");
    }

    #[test]
    fn table_without_color() {
        let table = render_table(&["a", "bb"], &[vec!["xyz".into(), "1".into()]], false);
        assert_eq!(table, "a    bb\n---  --\nxyz  1\n");
    }
}
