//! Logging for ActGuard.
//!
//! Console plus optional rolling JSON file output, and redaction of secrets
//! before commands or paths reach a log line or audit record.

pub mod logger;
pub mod redact;

pub use logger::{init_logger, LoggerGuard};
pub use redact::redact_sensitive_data;
