use crate::event::{Event, UnsignedEvent};

#[derive(Debug, thiserror::Error)]
pub enum SignerError {
    #[error("no signer available")]
    Unavailable,
    #[error("signer rejected the request: {0}")]
    Rejected(String),
    #[error("signer returned an event whose id does not match its content")]
    InvalidId,
    #[error("signer returned an event for pubkey {got}, expected {expected}")]
    PubkeyMismatch { expected: String, got: String },
    #[error("signer protocol error: {0}")]
    Protocol(String),
    #[error(transparent)]
    Io(#[from] std::io::Error),
}

/// Key custody. Implementations hold (or reach) the user's private key; the
/// rest of the workspace only ever sees public keys and signed events.
#[async_trait::async_trait]
pub trait Signer: Send + Sync {
    /// Hex-encoded public key of the current user.
    async fn get_public_key(&self) -> Result<String, SignerError>;

    /// Fills in `id` and `sig`.
    async fn sign_event(&self, event: UnsignedEvent) -> Result<Event, SignerError>;
}

/// Signs with `signer` and checks that the returned event is the one that
/// was asked for.
pub async fn sign_checked<S: Signer + ?Sized>(
    signer: &S,
    event: UnsignedEvent,
) -> Result<Event, SignerError> {
    let expected_pubkey = event.pubkey.clone();
    let signed = signer.sign_event(event).await?;
    if signed.pubkey != expected_pubkey {
        return Err(SignerError::PubkeyMismatch {
            expected: expected_pubkey,
            got: signed.pubkey,
        });
    }
    if !signed.verify_id() {
        return Err(SignerError::InvalidId);
    }
    Ok(signed)
}

#[async_trait::async_trait]
impl<T: Signer + ?Sized> Signer for std::sync::Arc<T> {
    async fn get_public_key(&self) -> Result<String, SignerError> {
        (**self).get_public_key().await
    }

    async fn sign_event(&self, event: UnsignedEvent) -> Result<Event, SignerError> {
        (**self).sign_event(event).await
    }
}
