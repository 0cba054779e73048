//! Interactive confirmation on the controlling terminal.

use std::io::{self, BufRead, Write};

use actguard_gateway::{ConfirmationHandler, ConfirmationRequest};
use async_trait::async_trait;
use tracing::warn;

pub struct TerminalPrompt;

#[async_trait]
impl ConfirmationHandler for TerminalPrompt {
    async fn confirm(&self, request: &ConfirmationRequest) -> bool {
        let mut question = match &request.risk_level {
            Some(level) => format!("{} ({level} risk): {}", request.summary, request.reason),
            None => format!("{}: {}", request.summary, request.reason),
        };
        if let Some(details) = &request.details {
            question.push_str(&format!(". {details}"));
        }

        let answer = tokio::task::spawn_blocking(move || -> io::Result<String> {
            let mut stderr = io::stderr().lock();
            write!(stderr, "Allow {question}? [y/N] ")?;
            stderr.flush()?;
            let mut line = String::new();
            io::stdin().lock().read_line(&mut line)?;
            Ok(line)
        })
        .await;

        match answer {
            Ok(Ok(line)) => is_yes(&line),
            Ok(Err(e)) => {
                warn!(error = %e, "Could not read confirmation; treating as no");
                false
            }
            Err(e) => {
                warn!(error = %e, "Confirmation prompt task failed");
                false
            }
        }
    }
}

fn is_yes(line: &str) -> bool {
    matches!(line.trim().to_ascii_lowercase().as_str(), "y" | "yes")
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn only_explicit_yes_counts() {
        assert!(is_yes("y\n"));
        assert!(is_yes(" YES "));
        assert!(!is_yes(""));
        assert!(!is_yes("sure"));
    }
}
