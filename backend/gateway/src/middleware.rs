//! Wrap an async operation so every call is charged against a rate-limit key.

use std::future::Future;
use std::sync::Arc;

use actguard_core::GateResult;
use futures::future::BoxFuture;
use futures::FutureExt;

use crate::rate_limit::RateLimiter;

/// Returns a callable that runs [`RateLimiter::enforce`] for `key` and only
/// then starts `op`. A denied call never reaches `op`.
pub fn rate_limited<F, Fut, T>(
    limiter: Arc<RateLimiter>,
    key: impl Into<String>,
    op: F,
) -> impl Fn() -> BoxFuture<'static, GateResult<T>> + Send + Sync
where
    F: Fn() -> Fut + Send + Sync + 'static,
    Fut: Future<Output = GateResult<T>> + Send + 'static,
    T: Send + 'static,
{
    let key: Arc<str> = Arc::from(key.into());
    let op = Arc::new(op);
    move || {
        let limiter = limiter.clone();
        let key = key.clone();
        let op = op.clone();
        async move {
            limiter.enforce(&key, None).await?;
            op().await
        }
        .boxed()
    }
}
