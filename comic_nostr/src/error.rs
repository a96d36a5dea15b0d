use comic_core::SignerError;

use crate::pool::RelayError;

#[derive(Debug, thiserror::Error)]
pub enum NostrError {
    #[error(transparent)]
    Relay(#[from] RelayError),
    #[error(transparent)]
    Signer(#[from] SignerError),
    #[error("failed to encode event content: {0}")]
    Json(#[from] serde_json::Error),
    #[error("channel {0} not found")]
    UnknownChannel(String),
}
