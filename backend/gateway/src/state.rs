//! Per-request state trace.
//!
//! ```text
//! Received → RiskScored → PermissionChecked → RateChecked → Decided
//!          → [AwaitingUser → Resolved] → Audited
//! ```
//!
//! Risk, permission and rate stages are skipped when the active policy turns
//! them off or an earlier stage already denied.

use std::fmt;

use actguard_core::{GateError, GateResult, Verdict};
use serde::Serialize;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum Resolution {
    Approved,
    Denied,
    Cancelled,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RequestState {
    Received,
    RiskScored,
    PermissionChecked,
    RateChecked,
    Decided(Verdict),
    AwaitingUser,
    Resolved(Resolution),
    Audited,
}

impl RequestState {
    fn can_follow(self, prev: RequestState) -> bool {
        use RequestState::*;
        match (prev, self) {
            (Received, RiskScored | PermissionChecked | RateChecked | Decided(_)) => true,
            (RiskScored, PermissionChecked | RateChecked | Decided(_)) => true,
            (PermissionChecked, RiskScored | RateChecked | Decided(_)) => true,
            (RateChecked, Decided(_)) => true,
            (Decided(Verdict::NeedsConfirmation), AwaitingUser) => true,
            (Decided(_), Audited) => true,
            (AwaitingUser, Resolved(_)) => true,
            (Resolved(_), Audited) => true,
            _ => false,
        }
    }
}

impl fmt::Display for RequestState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            RequestState::Received => f.write_str("received"),
            RequestState::RiskScored => f.write_str("risk_scored"),
            RequestState::PermissionChecked => f.write_str("permission_checked"),
            RequestState::RateChecked => f.write_str("rate_checked"),
            RequestState::Decided(verdict) => write!(f, "decided:{}", verdict.as_str()),
            RequestState::AwaitingUser => f.write_str("awaiting_user"),
            RequestState::Resolved(Resolution::Approved) => f.write_str("resolved:approved"),
            RequestState::Resolved(Resolution::Denied) => f.write_str("resolved:denied"),
            RequestState::Resolved(Resolution::Cancelled) => f.write_str("resolved:cancelled"),
            RequestState::Audited => f.write_str("audited"),
        }
    }
}

/// Ordered states one request passed through.
#[derive(Debug, Clone)]
pub struct RequestTrace {
    states: Vec<RequestState>,
}

impl Default for RequestTrace {
    fn default() -> Self {
        Self::new()
    }
}

impl RequestTrace {
    pub fn new() -> Self {
        Self {
            states: vec![RequestState::Received],
        }
    }

    pub fn current(&self) -> RequestState {
        self.states
            .last()
            .copied()
            .unwrap_or(RequestState::Received)
    }

    /// Move to `next`, rejecting transitions the pipeline never makes.
    ///
    /// Risk and permission stages may run in either order, but each at most
    /// once per request.
    pub fn advance(&mut self, next: RequestState) -> GateResult<()> {
        let current = self.current();
        let repeated = matches!(
            next,
            RequestState::RiskScored | RequestState::PermissionChecked
        ) && self.states.contains(&next);
        if repeated || !next.can_follow(current) {
            return Err(GateError::Internal(format!(
                "invalid request transition {current} -> {next}"
            )));
        }
        self.states.push(next);
        Ok(())
    }

    pub fn states(&self) -> &[RequestState] {
        &self.states
    }

    pub fn labels(&self) -> Vec<String> {
        self.states.iter().map(ToString::to_string).collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn full_confirmation_path() {
        let mut trace = RequestTrace::new();
        for state in [
            RequestState::RiskScored,
            RequestState::RateChecked,
            RequestState::Decided(Verdict::NeedsConfirmation),
            RequestState::AwaitingUser,
            RequestState::Resolved(Resolution::Approved),
            RequestState::Audited,
        ] {
            trace.advance(state).unwrap();
        }
        assert_eq!(
            trace.labels(),
            vec![
                "received",
                "risk_scored",
                "rate_checked",
                "decided:needs_confirmation",
                "awaiting_user",
                "resolved:approved",
                "audited"
            ]
        );
    }

    #[test]
    fn allow_cannot_await_user() {
        let mut trace = RequestTrace::new();
        trace.advance(RequestState::Decided(Verdict::Allow)).unwrap();
        let err = trace.advance(RequestState::AwaitingUser).unwrap_err();
        assert!(err.to_string().contains("decided:allow -> awaiting_user"));
    }

    #[test]
    fn risk_and_permission_stages_run_once() {
        let mut trace = RequestTrace::new();
        trace.advance(RequestState::PermissionChecked).unwrap();
        trace.advance(RequestState::RiskScored).unwrap();
        let err = trace.advance(RequestState::PermissionChecked).unwrap_err();
        assert!(err.to_string().contains("risk_scored -> permission_checked"));
        assert!(trace.advance(RequestState::RiskScored).is_err());
        trace.advance(RequestState::RateChecked).unwrap();
        assert_eq!(trace.states().len(), 4);
    }

    #[test]
    fn audited_is_terminal() {
        let mut trace = RequestTrace::new();
        trace.advance(RequestState::Decided(Verdict::Deny)).unwrap();
        trace.advance(RequestState::Audited).unwrap();
        assert!(trace.advance(RequestState::Decided(Verdict::Allow)).is_err());
    }
}
