//! Asking a human before a risky action goes ahead.

use actguard_core::RiskLevel;
use async_trait::async_trait;
use serde::Serialize;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info};
use uuid::Uuid;

use crate::state::Resolution;

/// What the user is being asked to approve.
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ConfirmationRequest {
    /// Same id as the decision being confirmed.
    pub id: Uuid,
    pub summary: String,
    pub reason: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub details: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub risk_level: Option<RiskLevel>,
}

/// Answers confirmation prompts. Implementations may wait indefinitely;
/// the gateway cancels the wait on shutdown or when the caller's token fires.
#[async_trait]
pub trait ConfirmationHandler: Send + Sync {
    async fn confirm(&self, request: &ConfirmationRequest) -> bool;
}

/// Gives the same answer to every prompt.
#[derive(Debug, Clone, Copy)]
pub struct StaticConfirmation(pub bool);

#[async_trait]
impl ConfirmationHandler for StaticConfirmation {
    async fn confirm(&self, request: &ConfirmationRequest) -> bool {
        debug!(id = %request.id, approved = self.0, "Static confirmation");
        self.0
    }
}

/// Wait for `handler`, or for `cancel`, whichever happens first.
pub async fn await_confirmation(
    handler: &dyn ConfirmationHandler,
    request: &ConfirmationRequest,
    cancel: &CancellationToken,
) -> Resolution {
    info!(id = %request.id, summary = %request.summary, "Awaiting confirmation");
    tokio::select! {
        () = cancel.cancelled() => {
            info!(id = %request.id, "Confirmation cancelled");
            Resolution::Cancelled
        }
        approved = handler.confirm(request) => {
            if approved {
                Resolution::Approved
            } else {
                Resolution::Denied
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    struct Never;

    #[async_trait]
    impl ConfirmationHandler for Never {
        async fn confirm(&self, _request: &ConfirmationRequest) -> bool {
            std::future::pending().await
        }
    }

    fn request() -> ConfirmationRequest {
        ConfirmationRequest {
            id: Uuid::new_v4(),
            summary: "chmod 777 deploy.sh".into(),
            reason: "high risk".into(),
            details: None,
            risk_level: Some(RiskLevel::High),
        }
    }

    #[tokio::test]
    async fn static_answers() {
        let token = CancellationToken::new();
        assert_eq!(
            await_confirmation(&StaticConfirmation(true), &request(), &token).await,
            Resolution::Approved
        );
        assert_eq!(
            await_confirmation(&StaticConfirmation(false), &request(), &token).await,
            Resolution::Denied
        );
    }

    #[tokio::test]
    async fn cancellation_ends_the_wait() {
        let token = CancellationToken::new();
        let child = token.child_token();
        let waiter = tokio::spawn(async move { await_confirmation(&Never, &request(), &child).await });
        token.cancel();
        assert_eq!(waiter.await.unwrap(), Resolution::Cancelled);
    }
}
