//! Push delivery port and its implementations.

pub mod fcm;
pub mod log;

use std::collections::BTreeMap;
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use serde::Serialize;
use tracing::warn;

use crate::error::NotifyError;

pub use fcm::FcmSender;
pub use log::LogSender;

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct NotificationPayload {
    pub title: String,
    pub body: String,
    /// String-valued, as push transports require.
    pub data: BTreeMap<String, String>,
}

/// Result of one delivery attempt to one device.
#[derive(Debug, Clone, PartialEq)]
pub enum SendOutcome {
    Delivered,
    /// The token will never work again; the device should be forgotten.
    PermanentFailure(String),
    /// Worth retrying on a later run.
    TransientFailure(String),
}

impl SendOutcome {
    pub fn is_delivered(&self) -> bool {
        matches!(self, SendOutcome::Delivered)
    }

    pub fn error(&self) -> Option<&str> {
        match self {
            SendOutcome::Delivered => None,
            SendOutcome::PermanentFailure(e) | SendOutcome::TransientFailure(e) => Some(e),
        }
    }
}

/// Sends one payload to one device token. Implementations bound their own
/// network time and never return transport errors; those are
/// [`SendOutcome::TransientFailure`].
#[async_trait]
pub trait NotificationSender: Send + Sync {
    async fn send(&self, token: &str, payload: &NotificationPayload) -> SendOutcome;
}

/// FCM when a project is configured, otherwise log-only.
pub fn from_config(
    project_id: Option<&str>,
    access_token: Option<&str>,
    timeout: Duration,
) -> Result<Arc<dyn NotificationSender>, NotifyError> {
    match (project_id, access_token) {
        (Some(project), Some(token)) => Ok(Arc::new(FcmSender::new(project, token, timeout)?)),
        (Some(_), None) => Err(NotifyError::SenderConfig(
            "FCM_PROJECT_ID is set but FCM_ACCESS_TOKEN is missing".into(),
        )),
        (None, _) => {
            warn!("No push transport configured, notifications will only be logged");
            Ok(Arc::new(LogSender))
        }
    }
}
