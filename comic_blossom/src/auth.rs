//! Blossom authorization tokens (kind 24242).

use base64::Engine;
use base64::engine::general_purpose::STANDARD;
use comic_core::event::tag;
use comic_core::{Kind, Signer, UnsignedEvent, sign_checked, unix_now};
use std::sync::Arc;
use tokio::sync::Mutex;

use crate::BlossomError;

/// How long a token stays valid.
pub const TOKEN_LIFETIME_SECS: u64 = 60 * 60 * 24;

/// Reuse a cached token only while it has at least this much life left.
const REUSE_MARGIN_SECS: u64 = 60;

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum AuthAction {
    List,
    Upload { sha256: String },
    Delete { sha256: String },
    Mirror { sha256: String },
}

impl AuthAction {
    fn verb(&self) -> &'static str {
        match self {
            AuthAction::List => "list",
            AuthAction::Upload { .. } | AuthAction::Mirror { .. } => "upload",
            AuthAction::Delete { .. } => "delete",
        }
    }

    fn content(&self) -> &'static str {
        match self {
            AuthAction::List => "List Blobs",
            AuthAction::Upload { .. } => "Upload Blobs",
            AuthAction::Delete { .. } => "Delete Blobs",
            AuthAction::Mirror { .. } => "Mirror Url",
        }
    }

    fn sha256(&self) -> Option<&str> {
        match self {
            AuthAction::List => None,
            AuthAction::Upload { sha256 }
            | AuthAction::Delete { sha256 }
            | AuthAction::Mirror { sha256 } => Some(sha256),
        }
    }
}

/// The unsigned authorization event for `action`, created at `now`.
pub fn auth_event(pubkey: &str, action: &AuthAction, now: u64) -> UnsignedEvent {
    let mut tags = vec![tag(["t", action.verb()])];
    if let Some(sha256) = action.sha256() {
        tags.push(tag(["x", sha256]));
    }
    tags.push(tag([
        "expiration".to_string(),
        (now + TOKEN_LIFETIME_SECS).to_string(),
    ]));
    UnsignedEvent::new(pubkey, now, Kind::BLOSSOM_AUTH)
        .with_tags(tags)
        .with_content(action.content())
}

struct CachedToken {
    header: String,
    expires_at: u64,
}

/// Signs authorization tokens and keeps the list token around until it
/// expires.
pub struct Authorizer {
    signer: Option<Arc<dyn Signer>>,
    list_token: Mutex<Option<CachedToken>>,
}

impl Authorizer {
    pub fn new(signer: Option<Arc<dyn Signer>>) -> Self {
        Self {
            signer,
            list_token: Mutex::new(None),
        }
    }

    /// `Authorization` header value for `action`: `Nostr <base64(event)>`.
    pub async fn header(&self, action: &AuthAction) -> Result<String, BlossomError> {
        if *action != AuthAction::List {
            return self.sign_header(action, unix_now()).await;
        }

        let mut cached = self.list_token.lock().await;
        let now = unix_now();
        if let Some(token) = cached.as_ref() {
            if token.expires_at > now + REUSE_MARGIN_SECS {
                return Ok(token.header.clone());
            }
        }
        let header = self.sign_header(action, now).await?;
        *cached = Some(CachedToken {
            header: header.clone(),
            expires_at: now + TOKEN_LIFETIME_SECS,
        });
        Ok(header)
    }

    async fn sign_header(&self, action: &AuthAction, now: u64) -> Result<String, BlossomError> {
        let signer = self.signer.as_ref().ok_or(comic_core::SignerError::Unavailable)?;
        let pubkey = signer.get_public_key().await?;
        let signed = sign_checked(signer.as_ref(), auth_event(&pubkey, action, now)).await?;
        let json = serde_json::to_string(&signed)?;
        log::debug!("signed blossom {} token", action.verb());
        Ok(format!("Nostr {}", STANDARD.encode(json)))
    }
}
