//! Core types and traits shared by the comic crates.
//!
//! ## Protocol types
//!
//! - Content hashes (`hash::Sha256Hash`), the identifier of every Blossom blob
//! - Nostr events (`event::Event`, `event::UnsignedEvent`) and the event kinds
//!   the clients read and publish (`event::Kind`)
//! - Blossom drives (`drive::Drive`), a replaceable event describing a named
//!   collection of blob paths, folders and emotion keywords
//!
//! ## Collaborator traits
//!
//! - `Signer`: key custody lives outside this workspace. Everything that needs
//!   a signature goes through this trait.

pub mod drive;
pub mod event;
pub mod hash;
pub mod signer;
pub mod types;

// Test utilities (behind feature flag)
#[cfg(feature = "testutil")]
pub mod testutil;

pub use drive::{Drive, DriveEntry, Emotion};
pub use event::{Event, Kind, UnsignedEvent};
pub use hash::{ParseHashError, Sha256Hash};
pub use signer::{Signer, SignerError, sign_checked};
pub use types::{RelayUrl, Server, ServerOption, UserRelay};

/// Seconds since the unix epoch, the timestamp unit of Nostr events.
pub fn unix_now() -> u64 {
    std::time::SystemTime::now()
        .duration_since(std::time::UNIX_EPOCH)
        .map(|d| d.as_secs())
        .unwrap_or_default()
}
