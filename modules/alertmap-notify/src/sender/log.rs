use async_trait::async_trait;
use tracing::info;

use super::{NotificationPayload, NotificationSender, SendOutcome};

/// Logs instead of sending. Used when no push transport is configured.
pub struct LogSender;

#[async_trait]
impl NotificationSender for LogSender {
    async fn send(&self, token: &str, payload: &NotificationPayload) -> SendOutcome {
        info!(
            token = redact_token(token).as_str(),
            title = payload.title.as_str(),
            "Would send notification"
        );
        SendOutcome::Delivered
    }
}

fn redact_token(token: &str) -> String {
    let head: String = token.chars().take(6).collect();
    format!("{head}…")
}
