//! Rate limiting — a sliding window per key plus a shorter burst counter.
//!
//! The burst counter resets on its own fixed interval, independent of the
//! window. A request is charged against both counters in one critical
//! section, or against neither.

use std::collections::{HashMap, VecDeque};
use std::sync::{PoisonError, RwLock};
use std::time::Duration;

use actguard_core::{GateError, GateResult, KeyedSlots, FILE_OPERATIONS, TERMINAL_COMMANDS};
use chrono::{DateTime, Utc};
use serde::Serialize;
use tokio::time::Instant;
use tracing::{debug, warn};

pub const DEFAULT_WINDOW: Duration = Duration::from_secs(60);
pub const DEFAULT_BURST_RESET: Duration = Duration::from_secs(10);

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RateLimitConfig {
    pub max_requests: u32,
    pub window: Duration,
    pub burst_allowance: u32,
    pub burst_reset: Duration,
}

impl RateLimitConfig {
    /// A window limit whose burst allowance equals the window limit.
    pub fn new(max_requests: u32, window: Duration) -> Self {
        Self {
            max_requests,
            window,
            burst_allowance: max_requests,
            burst_reset: DEFAULT_BURST_RESET,
        }
    }

    pub fn with_burst(mut self, burst_allowance: u32) -> Self {
        self.burst_allowance = burst_allowance;
        self
    }

    /// Built-in limits for the well-known operation classes.
    pub fn for_key(key: &str) -> Self {
        match key {
            TERMINAL_COMMANDS => Self::new(30, DEFAULT_WINDOW).with_burst(5),
            FILE_OPERATIONS => Self::new(100, DEFAULT_WINDOW).with_burst(20),
            _ => Self::new(100, DEFAULT_WINDOW).with_burst(10),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct RateLimitResult {
    pub allowed: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub reason: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub retry_after_secs: Option<u64>,
    pub remaining_requests: u32,
    /// When the oldest request in the window falls out of it.
    pub reset_time: DateTime<Utc>,
}

/// Read-only usage report for one key.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct RateLimitStatus {
    pub key: String,
    pub used: u32,
    pub max_requests: u32,
    pub burst_used: u32,
    pub burst_allowance: u32,
}

#[derive(Debug)]
struct RateLimitEntry {
    timestamps: VecDeque<Instant>,
    burst_count: u32,
    last_burst_reset: Instant,
    /// Limits of the most recent charge; the sweep prunes with these.
    config: RateLimitConfig,
}

impl RateLimitEntry {
    fn new(now: Instant, config: RateLimitConfig) -> Self {
        Self {
            timestamps: VecDeque::new(),
            burst_count: 0,
            last_burst_reset: now,
            config,
        }
    }

    /// Nothing left in the window and the burst counter has reset.
    fn is_idle(&self) -> bool {
        self.timestamps.is_empty() && self.burst_count == 0
    }

    fn prune(&mut self, now: Instant, config: &RateLimitConfig) {
        while let Some(oldest) = self.timestamps.front() {
            if now.duration_since(*oldest) >= config.window {
                self.timestamps.pop_front();
            } else {
                break;
            }
        }
        if now.duration_since(self.last_burst_reset) >= config.burst_reset {
            self.burst_count = 0;
            self.last_burst_reset = now;
        }
    }

    fn reset_time(&self, now: Instant, config: &RateLimitConfig) -> DateTime<Utc> {
        let until = self
            .timestamps
            .front()
            .map(|oldest| config.window.saturating_sub(now.duration_since(*oldest)))
            .unwrap_or_default();
        Utc::now() + chrono::Duration::from_std(until).unwrap_or_else(|_| chrono::Duration::zero())
    }
}

/// Whole seconds, rounded up, never zero.
fn ceil_secs(duration: Duration) -> u64 {
    (duration.as_millis() as u64).div_ceil(1000).max(1)
}

#[derive(Default)]
pub struct RateLimiter {
    entries: KeyedSlots<String, RateLimitEntry>,
    overrides: RwLock<HashMap<String, RateLimitConfig>>,
}

impl RateLimiter {
    pub fn new() -> Self {
        Self::default()
    }

    /// Replace the built-in limits for `key`.
    pub fn set_config(&self, key: impl Into<String>, config: RateLimitConfig) {
        self.overrides
            .write()
            .unwrap_or_else(PoisonError::into_inner)
            .insert(key.into(), config);
    }

    pub fn config_for(&self, key: &str) -> RateLimitConfig {
        self.overrides
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .get(key)
            .copied()
            .unwrap_or_else(|| RateLimitConfig::for_key(key))
    }

    /// Charge one request against `key`, unless a counter is exhausted.
    pub async fn check_limit(
        &self,
        key: &str,
        config: Option<RateLimitConfig>,
    ) -> GateResult<RateLimitResult> {
        let config = config.unwrap_or_else(|| self.config_for(key));
        let now = Instant::now();

        let result = self
            .entries
            .with_slot(
                &key.to_string(),
                || RateLimitEntry::new(now, config),
                |entry| {
                    entry.config = config;
                    entry.prune(now, &config);

                    if entry.burst_count >= config.burst_allowance {
                        let wait = config
                            .burst_reset
                            .saturating_sub(now.duration_since(entry.last_burst_reset));
                        return RateLimitResult {
                            allowed: false,
                            reason: Some(format!(
                                "burst limit of {} per {}s reached",
                                config.burst_allowance,
                                config.burst_reset.as_secs()
                            )),
                            retry_after_secs: Some(ceil_secs(wait)),
                            remaining_requests: config
                                .max_requests
                                .saturating_sub(entry.timestamps.len() as u32),
                            reset_time: entry.reset_time(now, &config),
                        };
                    }

                    if entry.timestamps.len() as u32 >= config.max_requests {
                        let wait = entry
                            .timestamps
                            .front()
                            .map(|oldest| config.window.saturating_sub(now.duration_since(*oldest)))
                            .unwrap_or(config.window);
                        return RateLimitResult {
                            allowed: false,
                            reason: Some(format!(
                                "limit of {} requests per {}s reached",
                                config.max_requests,
                                config.window.as_secs()
                            )),
                            retry_after_secs: Some(ceil_secs(wait)),
                            remaining_requests: 0,
                            reset_time: entry.reset_time(now, &config),
                        };
                    }

                    entry.timestamps.push_back(now);
                    entry.burst_count += 1;
                    RateLimitResult {
                        allowed: true,
                        reason: None,
                        retry_after_secs: None,
                        remaining_requests: config
                            .max_requests
                            .saturating_sub(entry.timestamps.len() as u32),
                        reset_time: entry.reset_time(now, &config),
                    }
                },
            )
            .await?;

        if result.allowed {
            debug!(key, remaining = result.remaining_requests, "Rate limit OK");
        } else {
            warn!(key, retry_after = ?result.retry_after_secs, "Rate limit exceeded");
        }
        Ok(result)
    }

    /// [`check_limit`](Self::check_limit), with a denial turned into
    /// [`GateError::RateLimitExceeded`].
    pub async fn enforce(
        &self,
        key: &str,
        config: Option<RateLimitConfig>,
    ) -> GateResult<RateLimitResult> {
        let result = self.check_limit(key, config).await?;
        if result.allowed {
            Ok(result)
        } else {
            Err(GateError::RateLimitExceeded {
                key: key.to_string(),
                retry_after_secs: result.retry_after_secs.unwrap_or(1),
            })
        }
    }

    /// Current usage for `key`, measured against the limits it was last
    /// charged with. Does not charge or prune.
    pub async fn status(&self, key: &str) -> RateLimitStatus {
        let now = Instant::now();
        let (config, used, burst_used) = self
            .entries
            .peek(&key.to_string(), |entry| {
                let config = entry.config;
                let used = entry
                    .timestamps
                    .iter()
                    .filter(|t| now.duration_since(**t) < config.window)
                    .count() as u32;
                let burst = if now.duration_since(entry.last_burst_reset) >= config.burst_reset {
                    0
                } else {
                    entry.burst_count
                };
                (config, used, burst)
            })
            .await
            .unwrap_or_else(|| (self.config_for(key), 0, 0));

        RateLimitStatus {
            key: key.to_string(),
            used,
            max_requests: config.max_requests,
            burst_used,
            burst_allowance: config.burst_allowance,
        }
    }

    /// Prune every key with the limits it was charged under and drop the
    /// ones idle for longer than their window.
    pub async fn sweep(&self) -> usize {
        let now = Instant::now();
        self.entries
            .retain(|_, entry| {
                let config = entry.config;
                entry.prune(now, &config);
                !entry.is_idle()
            })
            .await
    }

    pub async fn tracked_keys(&self) -> usize {
        self.entries.len().await
    }
}
