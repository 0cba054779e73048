//! Core types shared by every ActGuard crate: action descriptors, gate
//! outcomes, the error taxonomy and per-key serialized state.

pub mod error;
pub mod slots;
pub mod types;

pub use error::{GateError, GateResult};
pub use slots::KeyedSlots;
pub use types::{
    ActionDescriptor, Decision, OperationKind, PermissionResult, RiskLevel, ValidationResult,
    Verdict, FILE_OPERATIONS, TERMINAL_COMMANDS,
};
