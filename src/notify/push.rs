use async_trait::async_trait;
use tracing::info;

use crate::notify::{PushError, PushMessage, PushSender};

/// Push sink for local runs: records the message in the log and reports
/// success. Production deployments plug a provider client in behind
/// [`PushSender`].
#[derive(Debug, Default, Clone)]
pub struct LogPushSender;

#[async_trait]
impl PushSender for LogPushSender {
    async fn send(&self, message: &PushMessage) -> Result<(), PushError> {
        if message.token.trim().is_empty() {
            return Err(PushError::InvalidToken);
        }

        info!(
            title = %message.title,
            body = %message.body,
            ride_id = message.data.get("ride_id").map(String::as_str).unwrap_or_default(),
            "push notification sent"
        );
        Ok(())
    }
}
