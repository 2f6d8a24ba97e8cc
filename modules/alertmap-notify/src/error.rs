use thiserror::Error;

use alertmap_store::StoreError;

#[derive(Error, Debug)]
pub enum NotifyError {
    #[error("Store error: {0}")]
    Store(#[from] StoreError),

    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    #[error("Sender configuration error: {0}")]
    SenderConfig(String),

    #[error(transparent)]
    Other(#[from] anyhow::Error),
}

pub type Result<T> = std::result::Result<T, NotifyError>;
