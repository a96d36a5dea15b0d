use std::sync::Arc;

use comic_core::{Event, Signer, SignerError, UnsignedEvent};
use comic_nostr::CommandSigner;

use crate::config::IdentityConfig;

/// Signer for profiles without a signing command: knows the configured
/// public key, if any, and refuses to sign.
#[derive(Debug, Clone)]
pub struct ReadOnlyIdentity {
    pubkey: Option<String>,
}

impl ReadOnlyIdentity {
    pub fn new(pubkey: Option<String>) -> Self {
        Self { pubkey }
    }
}

#[async_trait::async_trait]
impl Signer for ReadOnlyIdentity {
    async fn get_public_key(&self) -> Result<String, SignerError> {
        self.pubkey.clone().ok_or(SignerError::Unavailable)
    }

    async fn sign_event(&self, _event: UnsignedEvent) -> Result<Event, SignerError> {
        Err(SignerError::Unavailable)
    }
}

/// The signer for a profile, and whether it can sign at all. Blossom
/// requests go out without authorization when it cannot.
pub fn load_signer(identity: &IdentityConfig) -> (Arc<dyn Signer>, bool) {
    match CommandSigner::from_command(&identity.signer) {
        Some(signer) => (Arc::new(signer), true),
        None => (Arc::new(ReadOnlyIdentity::new(identity.pubkey.clone())), false),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn read_only_identity_never_signs() {
        let identity = ReadOnlyIdentity::new(Some("ab".repeat(32)));
        assert_eq!(identity.get_public_key().await.unwrap(), "ab".repeat(32));
        let unsigned = UnsignedEvent::new("ab".repeat(32), 1, 1);
        assert!(matches!(
            identity.sign_event(unsigned).await,
            Err(SignerError::Unavailable)
        ));

        let anonymous = ReadOnlyIdentity::new(None);
        assert!(matches!(
            anonymous.get_public_key().await,
            Err(SignerError::Unavailable)
        ));
    }

    #[test]
    fn signer_command_wins_over_pubkey() {
        let (_, can_sign) = load_signer(&IdentityConfig {
            pubkey: Some("ab".repeat(32)),
            signer: vec!["nak".into()],
        });
        assert!(can_sign);
        let (_, can_sign) = load_signer(&IdentityConfig::default());
        assert!(!can_sign);
    }
}
