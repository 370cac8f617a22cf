/// Password reset token delivery
///
/// The raw reset token leaves the core exactly once, through a
/// [`ResetTokenDelivery`]. Production wires an email sender here; the
/// defaults shipped with the crate are:
///
/// - [`LogDelivery`]: logs that a token was issued (masked email only)
/// - [`OutboxDelivery`]: keeps messages in memory for tests and local runs

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use tokio::sync::Mutex;
use uuid::Uuid;

use crate::auth::token::mask_email;

/// Delivery failure
#[derive(Debug, thiserror::Error)]
#[error("Reset token delivery failed: {0}")]
pub struct DeliveryError(pub String);

/// One reset token on its way to the user
#[derive(Debug, Clone)]
pub struct ResetMessage {
    pub user_id: Uuid,
    pub tenant_id: Uuid,
    pub email: String,
    pub display_name: String,

    /// Raw token; never log this
    pub token: String,

    pub expires_at: DateTime<Utc>,
}

/// Out-of-band channel for reset tokens
#[async_trait]
pub trait ResetTokenDelivery: Send + Sync {
    async fn deliver(&self, message: ResetMessage) -> Result<(), DeliveryError>;
}

/// Logs the issue event without the token
#[derive(Debug, Clone, Copy, Default)]
pub struct LogDelivery;

#[async_trait]
impl ResetTokenDelivery for LogDelivery {
    async fn deliver(&self, message: ResetMessage) -> Result<(), DeliveryError> {
        tracing::info!(
            user_id = %message.user_id,
            email = %mask_email(&message.email),
            expires_at = %message.expires_at,
            "Password reset token issued"
        );
        Ok(())
    }
}

/// Collects messages in memory
#[derive(Debug, Default)]
pub struct OutboxDelivery {
    sent: Mutex<Vec<ResetMessage>>,
}

impl OutboxDelivery {
    pub fn new() -> Self {
        Self::default()
    }

    /// Every message delivered so far, oldest first
    pub async fn messages(&self) -> Vec<ResetMessage> {
        self.sent.lock().await.clone()
    }

    /// Token of the most recent message sent to `email`
    pub async fn last_token_for(&self, email: &str) -> Option<String> {
        self.sent
            .lock()
            .await
            .iter()
            .rev()
            .find(|m| m.email == email)
            .map(|m| m.token.clone())
    }
}

#[async_trait]
impl ResetTokenDelivery for OutboxDelivery {
    async fn deliver(&self, message: ResetMessage) -> Result<(), DeliveryError> {
        self.sent.lock().await.push(message);
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn message(email: &str, token: &str) -> ResetMessage {
        ResetMessage {
            user_id: Uuid::new_v4(),
            tenant_id: Uuid::new_v4(),
            email: email.to_string(),
            display_name: "Alice".to_string(),
            token: token.to_string(),
            expires_at: Utc::now(),
        }
    }

    #[tokio::test]
    async fn test_outbox_returns_latest_token() {
        let outbox = OutboxDelivery::new();
        outbox.deliver(message("a@acme.test", "first")).await.unwrap();
        outbox.deliver(message("b@acme.test", "other")).await.unwrap();
        outbox.deliver(message("a@acme.test", "second")).await.unwrap();

        assert_eq!(outbox.messages().await.len(), 3);
        assert_eq!(outbox.last_token_for("a@acme.test").await.as_deref(), Some("second"));
        assert!(outbox.last_token_for("c@acme.test").await.is_none());
    }

    #[tokio::test]
    async fn test_log_delivery_succeeds() {
        assert!(LogDelivery.deliver(message("a@acme.test", "t")).await.is_ok());
    }
}
