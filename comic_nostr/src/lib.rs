//! Nostr side of the comic clients.
//!
//! - [`RelayPool`]: query, subscribe and publish across relays. [`WsRelayPool`]
//!   speaks NIP-01 over WebSockets.
//! - [`NostrService`]: relay lists (kind 10002), Blossom server lists
//!   (kind 10063) and drives (kind 30563) of the signed-in user.
//! - [`ChannelClient`] and [`ChannelDirectory`]: public chat channels
//!   (kinds 40, 41, 42) and the pinned list (kind 10005).
//! - [`CommandSigner`]: signs through an external program.

pub mod channels;
pub mod directory;
mod error;
pub mod filter;
pub mod message;
pub mod pool;
pub mod service;
mod signer;
mod ws;

// Test utilities (behind feature flag)
#[cfg(feature = "testutil")]
pub mod testutil;

pub use channels::{ChannelClient, ChannelContent, ChannelMetadata, ChannelQuery, ChannelWithPinned, ChatMessage};
pub use directory::{ChannelDirectory, ChannelListing};
pub use error::NostrError;
pub use filter::Filter;
pub use pool::{PublishOutcome, RelayError, RelayPool, Subscription, SubscriptionItem};
pub use service::{NostrConfig, NostrService};
pub use signer::CommandSigner;
pub use ws::{DEFAULT_RELAY_TIMEOUT, WsRelayPool};
