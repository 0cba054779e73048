//! The decision gateway.
//!
//! One call to [`Gateway::evaluate`] runs a single action through the gates
//! the active [`SecurityConfig`] enables, charges the rate limiter, asks for
//! confirmation when needed and records the outcome. The gateway fails
//! closed: gate errors and panics become deny decisions.

use std::panic::AssertUnwindSafe;
use std::sync::{Arc, Mutex, PoisonError, RwLock};
use std::time::Duration;

use actguard_config::{ActGuardConfig, SecurityConfig, SecurityLevel};
use actguard_core::{
    ActionDescriptor, Decision, GateError, GateResult, OperationKind, PermissionResult, RiskLevel,
    Verdict,
};
use actguard_security::{
    is_root_wipe, sanitize_command, AuditEntry, AuditKind, AuditLog, CommandValidator,
    PermissionOptions, PermissionsGate, RiskAssessor, Workspace, DEFAULT_AUDIT_CAPACITY,
    DEFAULT_CACHE_TTL,
};
use futures::FutureExt;
use serde_json::json;
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, warn};

use crate::confirmation::{await_confirmation, ConfirmationHandler, ConfirmationRequest};
use crate::rate_limit::RateLimiter;
use crate::state::{RequestState, RequestTrace, Resolution};
use crate::sweeper::{spawn_sweeper, DEFAULT_SWEEP_INTERVAL};

pub struct GatewayBuilder {
    policy: SecurityConfig,
    workspace: Option<Workspace>,
    audit_capacity: usize,
    cache_ttl: Duration,
    sweep_interval: Duration,
    confirmation: Option<Arc<dyn ConfirmationHandler>>,
}

impl Default for GatewayBuilder {
    fn default() -> Self {
        Self {
            policy: SecurityConfig::default(),
            workspace: None,
            audit_capacity: DEFAULT_AUDIT_CAPACITY,
            cache_ttl: DEFAULT_CACHE_TTL,
            sweep_interval: DEFAULT_SWEEP_INTERVAL,
            confirmation: None,
        }
    }
}

impl GatewayBuilder {
    pub fn policy(mut self, policy: SecurityConfig) -> Self {
        self.policy = policy;
        self
    }

    pub fn level(self, level: SecurityLevel) -> Self {
        let allow = self.policy.allow_dangerous_commands;
        self.policy(SecurityConfig::for_level(level).with_allow_dangerous_commands(allow))
    }

    pub fn workspace(mut self, workspace: Workspace) -> Self {
        self.workspace = Some(workspace);
        self
    }

    pub fn audit_capacity(mut self, capacity: usize) -> Self {
        self.audit_capacity = capacity;
        self
    }

    pub fn cache_ttl(mut self, ttl: Duration) -> Self {
        self.cache_ttl = ttl;
        self
    }

    pub fn sweep_interval(mut self, interval: Duration) -> Self {
        self.sweep_interval = interval;
        self
    }

    pub fn confirmation_handler(mut self, handler: Arc<dyn ConfirmationHandler>) -> Self {
        self.confirmation = Some(handler);
        self
    }

    /// Build the gateway and start its sweeper on the current runtime.
    pub fn build(self) -> Gateway {
        let assessor = Arc::new(RiskAssessor::new());
        let audit = Arc::new(AuditLog::new(self.audit_capacity));
        audit.set_mirror_to_tracing(self.policy.audit_logging);

        let mut permissions =
            PermissionsGate::new(assessor.clone(), audit.clone()).with_ttl(self.cache_ttl);
        if let Some(workspace) = self.workspace {
            permissions = permissions.with_workspace(workspace);
        }
        let permissions = Arc::new(permissions);
        let limiter = Arc::new(RateLimiter::new());

        let cancel = CancellationToken::new();
        let sweeper = spawn_sweeper(
            permissions.clone(),
            limiter.clone(),
            self.sweep_interval,
            cancel.child_token(),
        );

        info!(level = %self.policy.level, "Gateway started");
        Gateway {
            policy: RwLock::new(self.policy),
            validator: CommandValidator::new(assessor.clone()),
            assessor,
            permissions,
            limiter,
            audit,
            confirmation: RwLock::new(self.confirmation),
            cancel,
            sweeper: Mutex::new(sweeper),
        }
    }
}

pub struct Gateway {
    policy: RwLock<SecurityConfig>,
    assessor: Arc<RiskAssessor>,
    validator: CommandValidator,
    permissions: Arc<PermissionsGate>,
    limiter: Arc<RateLimiter>,
    audit: Arc<AuditLog>,
    confirmation: RwLock<Option<Arc<dyn ConfirmationHandler>>>,
    cancel: CancellationToken,
    sweeper: Mutex<Option<JoinHandle<()>>>,
}

impl Gateway {
    pub fn builder() -> GatewayBuilder {
        GatewayBuilder::default()
    }

    pub fn new(policy: SecurityConfig) -> Self {
        Self::builder().policy(policy).build()
    }

    /// Gateway configured from a loaded config file.
    pub fn from_config(config: &ActGuardConfig) -> Self {
        let mut builder = Self::builder().policy(config.security_config());
        if !config.workspace.roots.is_empty() {
            builder = builder.workspace(
                Workspace::new(config.workspace.roots.iter().cloned())
                    .with_trust(config.workspace.trusted)
                    .with_reads(config.workspace.allow_reads),
            );
        }
        builder.build()
    }

    pub fn policy(&self) -> SecurityConfig {
        *self.policy.read().unwrap_or_else(PoisonError::into_inner)
    }

    /// Switch level. The dangerous-command override is kept as it was.
    pub fn set_level(&self, level: SecurityLevel) {
        let mut policy = self.policy.write().unwrap_or_else(PoisonError::into_inner);
        *policy = SecurityConfig::for_level(level)
            .with_allow_dangerous_commands(policy.allow_dangerous_commands);
        self.audit.set_mirror_to_tracing(policy.audit_logging);
        info!(%level, "Security level changed");
    }

    pub fn set_allow_dangerous_commands(&self, allow: bool) {
        let mut policy = self.policy.write().unwrap_or_else(PoisonError::into_inner);
        policy.allow_dangerous_commands = allow;
        if allow {
            warn!("Dangerous commands allowed without confirmation");
        }
    }

    pub fn set_confirmation_handler(&self, handler: Option<Arc<dyn ConfirmationHandler>>) {
        *self
            .confirmation
            .write()
            .unwrap_or_else(PoisonError::into_inner) = handler;
    }

    /// Approve a command for the rest of the session.
    pub fn approve_command(&self, command: &str) {
        self.assessor.approve(command);
    }

    pub fn assessor(&self) -> &Arc<RiskAssessor> {
        &self.assessor
    }

    pub fn audit(&self) -> &Arc<AuditLog> {
        &self.audit
    }

    pub fn permissions(&self) -> &Arc<PermissionsGate> {
        &self.permissions
    }

    pub fn rate_limiter(&self) -> &Arc<RateLimiter> {
        &self.limiter
    }

    /// Decide on `action`. Only a rate-limit denial is returned as an error.
    pub async fn evaluate(&self, action: &ActionDescriptor) -> GateResult<Decision> {
        self.evaluate_with_cancel(action, self.cancel.child_token())
            .await
    }

    /// [`evaluate`](Self::evaluate), with `cancel` ending any confirmation
    /// wait early. A cancelled confirmation is denied.
    pub async fn evaluate_with_cancel(
        &self,
        action: &ActionDescriptor,
        cancel: CancellationToken,
    ) -> GateResult<Decision> {
        let outcome = AssertUnwindSafe(self.run(action, &cancel))
            .catch_unwind()
            .await;

        match outcome {
            Ok(Ok(decision)) => Ok(decision),
            Ok(Err(err)) if err.is_rate_limit() => Err(err),
            Ok(Err(err)) => Ok(self.fail_closed(action, err.to_string()).await),
            Err(panic) => {
                let message = panic
                    .downcast_ref::<&str>()
                    .map(|s| (*s).to_string())
                    .or_else(|| panic.downcast_ref::<String>().cloned())
                    .unwrap_or_else(|| "panic".to_string());
                Ok(self.fail_closed(action, message).await)
            }
        }
    }

    async fn fail_closed(&self, action: &ActionDescriptor, message: String) -> Decision {
        error!(kind = %action.kind, error = %message, "Gate failed; denying");
        let decision = Decision::deny(format!("internal error: {message}"));
        let mut entry = AuditEntry::new(AuditKind::PermissionError, false)
            .with_detail("decisionId", decision.id.to_string())
            .with_detail("operation", action.kind.as_str())
            .with_detail("error", message);
        if let Some(subject) = action.subject() {
            entry = entry.with_subject(subject);
        }
        self.audit.append(entry).await;
        decision
    }

    async fn run(
        &self,
        action: &ActionDescriptor,
        cancel: &CancellationToken,
    ) -> GateResult<Decision> {
        let policy = self.policy();
        let mut trace = RequestTrace::new();

        if action.command.as_deref().is_some_and(is_root_wipe) {
            warn!("Root wipe denied");
            let decision =
                Decision::deny("recursive deletion of the filesystem root is never allowed")
                    .with_risk(RiskLevel::Critical);
            return self.finish(action, &policy, trace, decision).await;
        }

        let decision = match (action.kind, &action.command, &action.path) {
            (OperationKind::Execute, Some(command), _) => {
                self.gate_command(command, &policy, &mut trace).await?
            }
            (_, _, Some(path)) => self.gate_path(action, path, &policy, &mut trace).await?,
            _ => Decision::deny(format!(
                "malformed {} action: missing {}",
                action.kind,
                if action.kind == OperationKind::Execute {
                    "command or path"
                } else {
                    "path"
                }
            )),
        };

        // Denials are never charged.
        if decision.verdict() != Verdict::Deny && policy.rate_limiting {
            self.charge(action, &policy, &mut trace).await?;
        }

        self.finish_with_confirmation(action, &policy, trace, decision, cancel)
            .await
    }

    async fn gate_command(
        &self,
        command: &str,
        policy: &SecurityConfig,
        trace: &mut RequestTrace,
    ) -> GateResult<Decision> {
        if !policy.command_validation {
            return Ok(Decision::allow("command validation disabled"));
        }

        let check = self.validator.evaluate(command);
        trace.advance(RequestState::RiskScored)?;

        let mut entry = AuditEntry::new(AuditKind::CommandValidation, check.result.allowed)
            .with_subject(self.displayed(command, policy))
            .with_detail("outcome", check.result.verdict().as_str())
            .with_detail("reason", check.result.reason.clone());
        if let Some(risk) = &check.risk {
            entry = entry
                .with_detail("riskLevel", risk.level.as_str())
                .with_detail("concerns", risk.concerns.clone());
        }
        self.audit.append(entry).await;

        let level = check.risk_level().unwrap_or(RiskLevel::Low);
        let result = check.result;
        let decision = match result.verdict() {
            Verdict::Allow => Decision::allow(result.reason),
            Verdict::Deny => Decision::deny(result.reason),
            Verdict::NeedsConfirmation if policy.allow_dangerous_commands => {
                debug!("High-risk command allowed by override");
                Decision::allow(format!("{} (allowed by dangerous-command override)", result.reason))
            }
            Verdict::NeedsConfirmation => Decision::confirm(result.reason),
        };
        Ok(decision.with_risk(level))
    }

    async fn gate_path(
        &self,
        action: &ActionDescriptor,
        path: &str,
        policy: &SecurityConfig,
        trace: &mut RequestTrace,
    ) -> GateResult<Decision> {
        if !policy.file_permissions {
            return Ok(Decision::allow("file permission checks disabled"));
        }

        let content = match (action.kind, action.content.as_deref()) {
            (OperationKind::Write, Some(content)) => {
                let result = self.permissions.check_content(path, content);
                trace.advance(RequestState::RiskScored)?;
                Some(result)
            }
            _ => None,
        };

        let options = PermissionOptions {
            has_backup: action.has_backup,
            bypass_cache: false,
        };
        let permission = self.permissions.check(path, action.kind, options).await?;
        trace.advance(RequestState::PermissionChecked)?;

        Ok(combine(permission, content))
    }

    async fn charge(
        &self,
        action: &ActionDescriptor,
        policy: &SecurityConfig,
        trace: &mut RequestTrace,
    ) -> GateResult<()> {
        let key = action.rate_limit_key();
        let result = self.limiter.check_limit(key, None).await?;
        trace.advance(RequestState::RateChecked)?;
        if result.allowed {
            return Ok(());
        }

        let retry_after_secs = result.retry_after_secs.unwrap_or(1);
        let mut entry = AuditEntry::new(AuditKind::RateLimit, false)
            .with_detail("key", key)
            .with_detail("reason", result.reason.unwrap_or_default())
            .with_detail("retryAfterSecs", retry_after_secs)
            .with_detail("trace", trace.labels());
        if let Some(subject) = action.subject() {
            entry = entry.with_subject(self.displayed(subject, policy));
        }
        self.audit.append(entry).await;

        Err(GateError::RateLimitExceeded {
            key: key.to_string(),
            retry_after_secs,
        })
    }

    async fn finish_with_confirmation(
        &self,
        action: &ActionDescriptor,
        policy: &SecurityConfig,
        mut trace: RequestTrace,
        mut decision: Decision,
        cancel: &CancellationToken,
    ) -> GateResult<Decision> {
        trace.advance(RequestState::Decided(decision.verdict()))?;

        let handler = self
            .confirmation
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .clone();
        if let (Verdict::NeedsConfirmation, Some(handler)) = (decision.verdict(), handler) {
            trace.advance(RequestState::AwaitingUser)?;
            let request = ConfirmationRequest {
                id: decision.id,
                summary: action
                    .subject()
                    .map(|s| self.displayed(s, policy))
                    .unwrap_or_else(|| action.kind.to_string()),
                reason: decision.reason.clone(),
                details: decision.details.clone(),
                risk_level: decision.risk_level,
            };
            let resolution = await_confirmation(handler.as_ref(), &request, cancel).await;
            trace.advance(RequestState::Resolved(resolution))?;

            let mut entry =
                AuditEntry::new(AuditKind::Confirmation, resolution == Resolution::Approved)
                    .with_detail("decisionId", decision.id.to_string())
                    .with_detail("resolution", json!(resolution));
            if let Some(subject) = action.subject() {
                entry = entry.with_subject(self.displayed(subject, policy));
            }
            self.audit.append(entry).await;

            decision.requires_confirmation = false;
            decision.allowed = resolution == Resolution::Approved;
            decision.reason = match resolution {
                Resolution::Approved => {
                    if let Some(command) = &action.command {
                        self.assessor.approve(command);
                    }
                    format!("approved by user: {}", decision.reason)
                }
                Resolution::Denied => format!("denied by user: {}", decision.reason),
                Resolution::Cancelled => "confirmation cancelled".to_string(),
            };
        }

        self.record(action, policy, trace, decision).await
    }

    /// Short path for decisions made before any gate ran.
    async fn finish(
        &self,
        action: &ActionDescriptor,
        policy: &SecurityConfig,
        mut trace: RequestTrace,
        decision: Decision,
    ) -> GateResult<Decision> {
        trace.advance(RequestState::Decided(decision.verdict()))?;
        self.record(action, policy, trace, decision).await
    }

    async fn record(
        &self,
        action: &ActionDescriptor,
        policy: &SecurityConfig,
        mut trace: RequestTrace,
        decision: Decision,
    ) -> GateResult<Decision> {
        trace.advance(RequestState::Audited)?;

        let mut entry = AuditEntry::new(AuditKind::Decision, decision.allowed)
            .with_detail("decisionId", decision.id.to_string())
            .with_detail("operation", action.kind.as_str())
            .with_detail("outcome", decision.verdict().as_str())
            .with_detail("reason", decision.reason.clone())
            .with_detail("level", policy.level.as_str())
            .with_detail("trace", trace.labels());
        if let Some(level) = decision.risk_level {
            entry = entry.with_detail("riskLevel", level.as_str());
        }
        if let Some(subject) = action.subject() {
            entry = entry.with_subject(self.displayed(subject, policy));
        }
        self.audit.append(entry).await;

        match decision.verdict() {
            Verdict::Deny => warn!(kind = %action.kind, reason = %decision.reason, "Action denied"),
            Verdict::NeedsConfirmation => {
                info!(kind = %action.kind, reason = %decision.reason, "Action needs confirmation")
            }
            Verdict::Allow => debug!(kind = %action.kind, "Action allowed"),
        }
        Ok(decision)
    }

    fn displayed(&self, subject: &str, policy: &SecurityConfig) -> String {
        if policy.input_sanitization {
            sanitize_command(subject)
        } else {
            subject.to_string()
        }
    }

    /// Stop the sweeper and cancel pending confirmations.
    pub async fn shutdown(&self) {
        self.cancel.cancel();
        let handle = self
            .sweeper
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .take();
        if let Some(handle) = handle {
            if let Err(e) = handle.await {
                warn!(error = %e, "Sweeper task ended abnormally");
            }
        }
        info!("Gateway shut down");
    }

    pub fn is_shut_down(&self) -> bool {
        self.cancel.is_cancelled()
    }
}

impl Drop for Gateway {
    fn drop(&mut self) {
        self.cancel.cancel();
    }
}

/// Path result and optional content result: any deny wins, then any
/// confirmation, otherwise allow.
fn combine(permission: PermissionResult, content: Option<PermissionResult>) -> Decision {
    let Some(content) = content else {
        return from_permission(permission);
    };
    match (permission.verdict(), content.verdict()) {
        (Verdict::Deny, _) => from_permission(permission),
        (_, Verdict::Deny) => from_permission(content).with_risk(RiskLevel::Critical),
        (Verdict::NeedsConfirmation, Verdict::NeedsConfirmation) => {
            let details = match (permission.details, content.details) {
                (Some(a), Some(b)) => Some(format!("{a}. {b}")),
                (a, b) => a.or(b),
            };
            Decision::confirm(format!("{}; {}", permission.reason, content.reason))
                .with_risk(RiskLevel::High)
                .with_details(details)
        }
        (Verdict::NeedsConfirmation, _) => from_permission(permission),
        (_, Verdict::NeedsConfirmation) => from_permission(content).with_risk(RiskLevel::High),
        _ => from_permission(permission),
    }
}

fn from_permission(result: PermissionResult) -> Decision {
    match (result.allowed, result.requires_confirmation) {
        (true, _) => Decision::allow(result.reason),
        (false, true) => Decision::confirm(result.reason).with_details(result.details),
        (false, false) => Decision::deny(result.reason),
    }
}
