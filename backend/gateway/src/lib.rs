//! ActGuard decision gateway.
//!
//! Combines the security gates into one `evaluate` call, with rate limiting,
//! human confirmation and a background sweep of expired state.

pub mod confirmation;
pub mod gateway;
pub mod middleware;
pub mod rate_limit;
pub mod state;
pub mod sweeper;

pub use confirmation::{ConfirmationHandler, ConfirmationRequest, StaticConfirmation};
pub use gateway::{Gateway, GatewayBuilder};
pub use middleware::rate_limited;
pub use rate_limit::{RateLimitConfig, RateLimitResult, RateLimitStatus, RateLimiter};
pub use state::{RequestState, RequestTrace, Resolution};
