use std::path::Path;
use std::sync::Arc;

use anyhow::{Context, Result, bail};
use comic_blossom::BlossomClient;
use comic_cache::{Cache, add_hours};
use comic_core::types::{read_relays, write_relays};
use comic_core::{Drive, RelayUrl, Server, UserRelay};
use comic_nostr::{ChannelClient, ChannelDirectory, NostrService, RelayPool, WsRelayPool};
use serde_json::json;

use crate::config::ComicConfig;
use crate::identity::load_signer;

/// Everything a command needs, built from one profile.
pub struct App {
    pub config: ComicConfig,
    pub cache: Cache,
    pub nostr: NostrService,
    pub blossom: BlossomClient,
    pub channels: ChannelDirectory,
}

impl App {
    pub fn open(config: ComicConfig, data_dir: &Path) -> Result<Self> {
        let cache_dir = config.cache_dir(data_dir);
        let cache = Cache::open(&cache_dir)
            .with_context(|| format!("failed to open cache at {}", cache_dir.display()))?;

        let (signer, can_sign) = load_signer(&config.identity);
        let pool: Arc<dyn RelayPool> = Arc::new(WsRelayPool::default());

        let blossom_signer = can_sign.then(|| signer.clone());
        let blossom = BlossomClient::with_timeout(config.blossom_timeout(), blossom_signer)
            .context("failed to build http client")?;
        let nostr = NostrService::new(pool.clone(), signer.clone(), config.nostr_config());
        let channels = ChannelDirectory::new(
            ChannelClient::new(pool, signer, env!("CARGO_PKG_VERSION")),
            cache.clone(),
        );

        Ok(Self {
            config,
            cache,
            nostr,
            blossom,
            channels,
        })
    }

    pub async fn pubkey(&self) -> Result<String> {
        self.nostr
            .pubkey()
            .await
            .context("no identity: set identity.pubkey or identity.signer in the config file")
    }

    /// The user's relay list. A found list is cached for `cache.ttl_hours`;
    /// the fallback relays are used, uncached, when none is found.
    pub async fn user_relays(&self) -> Result<Vec<UserRelay>> {
        let pubkey = self.pubkey().await?;
        let key = json!({ "type": "relays", "pubkey": pubkey });
        let found = self
            .cache
            .get_or_add(&key, add_hours(self.config.cache.ttl_hours), || async {
                self.nostr
                    .fetch_relay_list(&pubkey)
                    .await
                    .ok_or(NoRelayList)
            })
            .await;
        match found {
            Ok(cached) => Ok(cached.data),
            Err(NoRelayList) => {
                tracing::warn!("no relay list found for {pubkey}, using fallback relays");
                Ok(self.nostr.fallback_relays())
            }
        }
    }

    pub async fn write_relays(&self) -> Result<Vec<RelayUrl>> {
        let relays = write_relays(&self.user_relays().await?);
        if relays.is_empty() {
            bail!("the relay list has no write relays");
        }
        Ok(relays)
    }

    pub async fn read_relays(&self) -> Result<Vec<RelayUrl>> {
        Ok(read_relays(&self.user_relays().await?))
    }

    /// Read relays, then write relays that are not also read relays.
    pub async fn all_relays(&self) -> Result<Vec<RelayUrl>> {
        let relays = self.user_relays().await?;
        let mut all = read_relays(&relays);
        for url in write_relays(&relays) {
            if !all.contains(&url) {
                all.push(url);
            }
        }
        Ok(all)
    }

    /// Servers from the user's published list, or the configured defaults
    /// when nothing is selected.
    pub async fn selected_servers(&self) -> Result<Vec<Server>> {
        let relays = self.user_relays().await?;
        let selected: Vec<Server> = self
            .nostr
            .get_blossom_servers(&relays)
            .await
            .into_iter()
            .filter_map(|(server, selected)| selected.then_some(server))
            .collect();
        if selected.is_empty() {
            return Ok(self.config.default_servers());
        }
        Ok(selected)
    }

    /// Finds a drive by name, falling back to its `d` identifier.
    pub async fn drive(&self, name_or_d: &str) -> Result<Drive> {
        let write = self.write_relays().await?;
        let drives = self.nostr.get_drives(&write).await?;
        find_drive(drives, name_or_d).with_context(|| format!("no drive named {name_or_d:?}"))
    }
}

#[derive(Debug)]
struct NoRelayList;

pub fn find_drive(drives: Vec<Drive>, name_or_d: &str) -> Option<Drive> {
    let by_name = drives.iter().position(|d| d.name == name_or_d);
    let index = by_name.or_else(|| drives.iter().position(|d| d.d == name_or_d))?;
    drives.into_iter().nth(index)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn drive(name: &str, d: &str) -> Drive {
        Drive {
            name: name.into(),
            d: d.into(),
            ..Drive::default()
        }
    }

    #[test]
    fn drives_match_name_before_identifier() {
        let drives = vec![drive("hero", "villain"), drive("villain", "x")];
        assert_eq!(find_drive(drives.clone(), "villain").unwrap().d, "x");
        assert_eq!(find_drive(drives.clone(), "hero").unwrap().d, "villain");
        assert!(find_drive(drives, "nobody").is_none());
    }
}
