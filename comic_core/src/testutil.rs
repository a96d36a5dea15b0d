//! Test doubles for code that needs a [`Signer`].
//!
//! ```toml
//! [dev-dependencies]
//! comic_core = { workspace = true, features = ["testutil"] }
//! ```

use std::sync::Mutex;

use crate::event::{Event, UnsignedEvent};
use crate::signer::{Signer, SignerError};

/// Signs with a fixed pubkey and a zeroed signature. Event ids are computed
/// for real so id checks pass. Every signed event is recorded.
#[derive(Debug, Default)]
pub struct FakeSigner {
    pubkey: String,
    signed: Mutex<Vec<Event>>,
}

impl FakeSigner {
    pub fn new(pubkey: impl Into<String>) -> Self {
        Self {
            pubkey: pubkey.into(),
            signed: Mutex::new(Vec::new()),
        }
    }

    pub fn pubkey(&self) -> &str {
        &self.pubkey
    }

    /// Events signed so far, oldest first.
    pub fn signed(&self) -> Vec<Event> {
        self.signed.lock().map(|s| s.clone()).unwrap_or_default()
    }
}

#[async_trait::async_trait]
impl Signer for FakeSigner {
    async fn get_public_key(&self) -> Result<String, SignerError> {
        Ok(self.pubkey.clone())
    }

    async fn sign_event(&self, event: UnsignedEvent) -> Result<Event, SignerError> {
        let signed = Event {
            id: event.compute_id().to_hex(),
            pubkey: event.pubkey,
            created_at: event.created_at,
            kind: event.kind,
            tags: event.tags,
            content: event.content,
            sig: "00".repeat(64),
        };
        if let Ok(mut log) = self.signed.lock() {
            log.push(signed.clone());
        }
        Ok(signed)
    }
}

/// A signer that is never available, like a browser without an extension.
#[derive(Debug, Default)]
pub struct NoSigner;

#[async_trait::async_trait]
impl Signer for NoSigner {
    async fn get_public_key(&self) -> Result<String, SignerError> {
        Err(SignerError::Unavailable)
    }

    async fn sign_event(&self, _event: UnsignedEvent) -> Result<Event, SignerError> {
        Err(SignerError::Unavailable)
    }
}
