//! The channel list as the chat client shows it: cached pinned ids and
//! metadata, pin toggling and the list of opened channels.

use chrono::{DateTime, Utc};
use comic_cache::{Cache, CacheError, CacheResult, add_days, add_hours};
use comic_core::RelayUrl;
use serde_json::{Value, json};

use crate::channels::{ChannelClient, ChannelMetadata, ChannelWithPinned};
use crate::error::NostrError;

/// How long pinned ids and channel metadata stay cached.
pub const CHANNEL_CACHE_HOURS: i64 = 1;

pub const MAX_OPENED_CHANNELS: usize = 10;

/// How long the opened list is kept without being touched.
pub const OPENED_CACHE_DAYS: i64 = 365;

#[derive(Debug, Clone)]
pub struct ChannelListing {
    pub channels: Vec<ChannelWithPinned>,
    /// When the newer of the two underlying lists was fetched.
    pub fetched_at: DateTime<Utc>,
    /// Both lists came from the cache.
    pub from_cache: bool,
}

#[derive(Debug)]
pub struct ChannelDirectory {
    client: ChannelClient,
    cache: Cache,
}

fn pinned_key(write_relays: &[RelayUrl], pubkey: &str) -> Value {
    json!({"type": "pinned", "userWriteRelays": write_relays, "pubkey": pubkey})
}

fn metadata_key(fetch_relays: &[RelayUrl], user_pubkey: &str) -> Value {
    json!({"type": "metadata", "fetchRelays": fetch_relays, "userPubkey": user_pubkey})
}

fn opened_key(pubkey: &str) -> Value {
    json!({"type": "opened", "pubkey": pubkey})
}

/// `read` then `write`, without repeats.
fn union(read: &[RelayUrl], write: &[RelayUrl]) -> Vec<RelayUrl> {
    let mut all: Vec<RelayUrl> = Vec::with_capacity(read.len() + write.len());
    for relay in read.iter().chain(write) {
        if !all.contains(relay) {
            all.push(relay.clone());
        }
    }
    all
}

impl ChannelDirectory {
    pub fn new(client: ChannelClient, cache: Cache) -> Self {
        Self { client, cache }
    }

    pub fn client(&self) -> &ChannelClient {
        &self.client
    }

    pub async fn pinned_ids(
        &self,
        write_relays: &[RelayUrl],
        pubkey: &str,
    ) -> Result<CacheResult<Vec<String>>, NostrError> {
        self.cache
            .get_or_add(&pinned_key(write_relays, pubkey), add_hours(CHANNEL_CACHE_HOURS), || {
                self.client.fetch_pinned_channels(write_relays, pubkey)
            })
            .await
    }

    /// All known channels, each marked pinned or not. Channel metadata is
    /// fetched from the union of read and write relays.
    pub async fn list(
        &self,
        read_relays: &[RelayUrl],
        write_relays: &[RelayUrl],
        pubkey: &str,
        force_refresh: bool,
    ) -> Result<ChannelListing, NostrError> {
        let fetch_relays = union(read_relays, write_relays);
        let pinned_key = pinned_key(write_relays, pubkey);
        let metadata_key = metadata_key(&fetch_relays, pubkey);

        if force_refresh {
            for key in [&pinned_key, &metadata_key] {
                if let Err(err) = self.cache.clear(key).await {
                    tracing::warn!("failed to clear channel cache: {err}");
                }
            }
        }

        let pinned = self.pinned_ids(write_relays, pubkey).await?;
        let metadata = self
            .cache
            .get_or_add(&metadata_key, add_hours(CHANNEL_CACHE_HOURS), || {
                self.client.fetch_channel_metadata(&fetch_relays, pubkey)
            })
            .await?;

        let channels = metadata
            .data
            .into_iter()
            .map(|channel| ChannelWithPinned {
                pinned: pinned.data.contains(&channel.id),
                channel,
            })
            .collect();

        Ok(ChannelListing {
            channels,
            fetched_at: pinned.created_at.max(metadata.created_at),
            from_cache: pinned.from_cache && metadata.from_cache,
        })
    }

    /// Pins or unpins `channel`, publishes the new list and returns it. An
    /// unpinned channel stays reachable through the opened list.
    pub async fn set_pinned(
        &self,
        channel: &ChannelMetadata,
        pin: bool,
        write_relays: &[RelayUrl],
        pubkey: &str,
    ) -> Result<Vec<String>, NostrError> {
        let current = self.pinned_ids(write_relays, pubkey).await?.data;
        let updated: Vec<String> = if pin {
            let mut ids = current;
            if !ids.contains(&channel.id) {
                ids.push(channel.id.clone());
            }
            ids
        } else {
            current.into_iter().filter(|id| *id != channel.id).collect()
        };

        self.client
            .update_pinned_channels(write_relays, pubkey, &updated)
            .await?;
        if let Err(err) = self.cache.clear(&pinned_key(write_relays, pubkey)).await {
            tracing::warn!("failed to clear pinned channel cache: {err}");
        }

        if !pin && !self.opened(pubkey).await.iter().any(|c| c.id == channel.id) {
            if let Err(err) = self.open(pubkey, channel.clone()).await {
                tracing::warn!("failed to keep unpinned channel open: {err}");
            }
        }
        Ok(updated)
    }

    /// Channels `pubkey` has open, most recently opened first.
    pub async fn opened(&self, pubkey: &str) -> Vec<ChannelMetadata> {
        self.cache
            .get(&opened_key(pubkey))
            .await
            .map(|found| found.data)
            .unwrap_or_default()
    }

    /// Moves `channel` to the front of the opened list and returns the list.
    pub async fn open(&self, pubkey: &str, channel: ChannelMetadata) -> Result<Vec<ChannelMetadata>, CacheError> {
        let mut opened = self.opened(pubkey).await;
        opened.retain(|c| c.id != channel.id);
        opened.insert(0, channel);
        opened.truncate(MAX_OPENED_CHANNELS);
        self.cache
            .set(&opened_key(pubkey), &opened, add_days(OPENED_CACHE_DAYS))
            .await?;
        Ok(opened)
    }

    pub async fn close(&self, pubkey: &str, channel_id: &str) -> Result<Vec<ChannelMetadata>, CacheError> {
        let mut opened = self.opened(pubkey).await;
        opened.retain(|c| c.id != channel_id);
        self.cache
            .set(&opened_key(pubkey), &opened, add_days(OPENED_CACHE_DAYS))
            .await?;
        Ok(opened)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn relay_union_keeps_order() {
        let read: Vec<RelayUrl> = ["wss://a", "wss://b"].into_iter().map(RelayUrl::from).collect();
        let write: Vec<RelayUrl> = ["wss://b", "wss://c"].into_iter().map(RelayUrl::from).collect();
        let merged = union(&read, &write);
        let all: Vec<&str> = merged.iter().map(|r| r.as_str()).collect();
        assert_eq!(all, vec!["wss://a", "wss://b", "wss://c"]);
    }
}
