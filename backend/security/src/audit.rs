//! Audit log — bounded, append-only record of every gateway decision.
//!
//! Entries are kept in memory in arrival order; once the log reaches its
//! capacity the oldest entry is dropped for each new one. Readers only ever
//! receive copies.

use std::collections::VecDeque;
use std::sync::atomic::{AtomicBool, Ordering};

use actguard_logging::redact_sensitive_data;
use anyhow::Result;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use tokio::sync::Mutex;
use tracing::info;
use uuid::Uuid;

/// Default number of entries retained.
pub const DEFAULT_AUDIT_CAPACITY: usize = 1000;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum AuditKind {
    PermissionCheck,
    PermissionError,
    CommandValidation,
    RateLimit,
    Confirmation,
    Decision,
}

impl AuditKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            AuditKind::PermissionCheck => "permission_check",
            AuditKind::PermissionError => "permission_error",
            AuditKind::CommandValidation => "command_validation",
            AuditKind::RateLimit => "rate_limit",
            AuditKind::Confirmation => "confirmation",
            AuditKind::Decision => "decision",
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AuditEntry {
    pub id: Uuid,
    pub kind: AuditKind,
    pub timestamp: DateTime<Utc>,
    pub approved: bool,
    /// Path or command the decision was about, with secrets redacted.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub subject: Option<String>,
    #[serde(default, skip_serializing_if = "Map::is_empty")]
    pub details: Map<String, Value>,
}

impl AuditEntry {
    /// New entry stamped with the current time.
    pub fn new(kind: AuditKind, approved: bool) -> Self {
        Self {
            id: Uuid::new_v4(),
            kind,
            timestamp: Utc::now(),
            approved,
            subject: None,
            details: Map::new(),
        }
    }

    pub fn with_subject(mut self, subject: impl AsRef<str>) -> Self {
        self.subject = Some(redact_sensitive_data(subject.as_ref()));
        self
    }

    pub fn with_detail(mut self, key: &str, value: impl Into<Value>) -> Self {
        self.details.insert(key.to_string(), value.into());
        self
    }
}

pub struct AuditLog {
    entries: Mutex<VecDeque<AuditEntry>>,
    capacity: usize,
    mirror_to_tracing: AtomicBool,
}

impl Default for AuditLog {
    fn default() -> Self {
        Self::new(DEFAULT_AUDIT_CAPACITY)
    }
}

impl AuditLog {
    pub fn new(capacity: usize) -> Self {
        let capacity = capacity.max(1);
        Self {
            entries: Mutex::new(VecDeque::with_capacity(capacity)),
            capacity,
            mirror_to_tracing: AtomicBool::new(true),
        }
    }

    /// Toggle whether appended entries are also emitted as log lines.
    pub fn set_mirror_to_tracing(&self, enabled: bool) {
        self.mirror_to_tracing.store(enabled, Ordering::Relaxed);
    }

    pub async fn append(&self, entry: AuditEntry) {
        if self.mirror_to_tracing.load(Ordering::Relaxed) {
            info!(
                target: "actguard::audit",
                kind = entry.kind.as_str(),
                approved = entry.approved,
                subject = entry.subject.as_deref().unwrap_or(""),
                "[Audit] {}",
                entry.kind.as_str()
            );
        }

        let mut entries = self.entries.lock().await;
        entries.push_back(entry);
        while entries.len() > self.capacity {
            entries.pop_front();
        }
    }

    /// Owned copy of every retained entry, oldest first.
    pub async fn snapshot(&self) -> Vec<AuditEntry> {
        self.entries.lock().await.iter().cloned().collect()
    }

    /// The newest `limit` entries, newest first.
    pub async fn recent(&self, limit: usize) -> Vec<AuditEntry> {
        self.entries
            .lock()
            .await
            .iter()
            .rev()
            .take(limit)
            .cloned()
            .collect()
    }

    pub async fn by_kind(&self, kind: AuditKind) -> Vec<AuditEntry> {
        self.entries
            .lock()
            .await
            .iter()
            .filter(|e| e.kind == kind)
            .cloned()
            .collect()
    }

    /// One JSON object per line, oldest first.
    pub async fn export_ndjson(&self) -> Result<String> {
        let mut out = String::new();
        for entry in self.snapshot().await {
            out.push_str(&serde_json::to_string(&entry)?);
            out.push('\n');
        }
        Ok(out)
    }

    pub async fn len(&self) -> usize {
        self.entries.lock().await.len()
    }

    pub async fn is_empty(&self) -> bool {
        self.entries.lock().await.is_empty()
    }

    pub fn capacity(&self) -> usize {
        self.capacity
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn numbered(i: usize) -> AuditEntry {
        AuditEntry::new(AuditKind::Decision, true).with_detail("seq", i as u64)
    }

    #[tokio::test]
    async fn evicts_oldest_past_capacity() {
        let log = AuditLog::new(1000);
        for i in 0..1005 {
            log.append(numbered(i)).await;
        }
        let snapshot = log.snapshot().await;
        assert_eq!(snapshot.len(), 1000);
        assert_eq!(snapshot[0].details["seq"], 5);
        assert_eq!(snapshot[999].details["seq"], 1004);
        assert!(snapshot.iter().all(|e| e.details["seq"].as_u64().unwrap() >= 5));
    }

    #[tokio::test]
    async fn snapshot_is_detached_from_live_log() {
        let log = AuditLog::new(10);
        log.append(numbered(0)).await;
        let snapshot = log.snapshot().await;
        log.append(numbered(1)).await;
        assert_eq!(snapshot.len(), 1);
        assert_eq!(log.len().await, 2);
    }

    #[tokio::test]
    async fn recent_is_newest_first() {
        let log = AuditLog::new(10);
        for i in 0..4 {
            log.append(numbered(i)).await;
        }
        let recent = log.recent(2).await;
        assert_eq!(recent[0].details["seq"], 3);
        assert_eq!(recent[1].details["seq"], 2);
    }

    #[tokio::test]
    async fn subjects_are_redacted() {
        let log = AuditLog::new(10);
        log.append(
            AuditEntry::new(AuditKind::CommandValidation, false)
                .with_subject("curl -H 'Authorization: Bearer abc.def.ghi' https://x"),
        )
        .await;
        let subject = log.snapshot().await[0].subject.clone().unwrap();
        assert!(!subject.contains("abc.def.ghi"));
    }

    #[tokio::test]
    async fn exports_one_line_per_entry() {
        let log = AuditLog::new(10);
        log.append(AuditEntry::new(AuditKind::PermissionCheck, true).with_subject("src/lib.rs"))
            .await;
        log.append(AuditEntry::new(AuditKind::RateLimit, false)).await;
        let ndjson = log.export_ndjson().await.unwrap();
        let lines: Vec<_> = ndjson.lines().collect();
        assert_eq!(lines.len(), 2);
        assert!(lines[0].contains("\"permission_check\""));
        assert_eq!(log.by_kind(AuditKind::RateLimit).await.len(), 1);
    }
}
