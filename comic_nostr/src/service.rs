//! Relay lists, Blossom server lists and drives of the signed-in user.

use std::collections::HashMap;
use std::sync::Arc;
use std::time::{Duration, Instant};

use comic_core::types::write_relays;
use comic_core::{
    Drive, Event, Kind, RelayUrl, Server, ServerOption, Signer, UnsignedEvent, UserRelay, event::tag,
    sign_checked, unix_now,
};
use dashmap::DashMap;

use crate::error::NostrError;
use crate::filter::Filter;
use crate::pool::{RelayPool, publish_to_any};

pub const DEFAULT_RELAYLIST_RELAYS: &[&str] = &[
    "wss://purplepag.es",
    "wss://relay.nos.social",
    "wss://user.kindpag.es",
];

pub const DEFAULT_METADATA_QUERY_RELAYS: &[&str] = &[
    "wss://purplepag.es",
    "wss://relay.nos.social",
    "wss://user.kindpag.es",
];

pub const FALLBACK_RELAYS: &[&str] = &[
    "wss://relay.nostr.band",
    "wss://relay.damus.io",
    "wss://relay.snort.net",
];

pub const DEFAULT_BLOSSOM_SERVERS: &[&str] = &[
    "https://nostr.build/",
    "https://nostrcheck.me/",
    "https://satellite.earth/",
    "https://files.v0l.io/",
    "https://blossom.primal.net/",
];

pub const SERVER_LIST_TTL: Duration = Duration::from_secs(24 * 60 * 60);

#[derive(Debug, Clone)]
pub struct NostrConfig {
    /// Relays asked for kind 10002 relay lists.
    pub relay_list_relays: Vec<RelayUrl>,
    /// Used read+write when a user has no relay list.
    pub fallback_relays: Vec<RelayUrl>,
    pub default_servers: Vec<Server>,
    pub server_list_ttl: Duration,
}

impl Default for NostrConfig {
    fn default() -> Self {
        Self {
            relay_list_relays: DEFAULT_RELAYLIST_RELAYS.iter().copied().map(RelayUrl::from).collect(),
            fallback_relays: FALLBACK_RELAYS.iter().copied().map(RelayUrl::from).collect(),
            default_servers: DEFAULT_BLOSSOM_SERVERS.iter().copied().map(Server::from).collect(),
            server_list_ttl: SERVER_LIST_TTL,
        }
    }
}

pub struct NostrService {
    pool: Arc<dyn RelayPool>,
    signer: Arc<dyn Signer>,
    config: NostrConfig,
    relay_lists: DashMap<String, Vec<UserRelay>>,
    server_lists: DashMap<String, (Instant, Vec<ServerOption>)>,
}

impl std::fmt::Debug for NostrService {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("NostrService")
            .field("config", &self.config)
            .field("cached_relay_lists", &self.relay_lists.len())
            .field("cached_server_lists", &self.server_lists.len())
            .finish()
    }
}

impl NostrService {
    pub fn new(pool: Arc<dyn RelayPool>, signer: Arc<dyn Signer>, config: NostrConfig) -> Self {
        Self {
            pool,
            signer,
            config,
            relay_lists: DashMap::new(),
            server_lists: DashMap::new(),
        }
    }

    pub fn pool(&self) -> &Arc<dyn RelayPool> {
        &self.pool
    }

    pub fn signer(&self) -> &Arc<dyn Signer> {
        &self.signer
    }

    pub fn config(&self) -> &NostrConfig {
        &self.config
    }

    pub async fn pubkey(&self) -> Result<String, NostrError> {
        Ok(self.signer.get_public_key().await?)
    }

    /// The user's NIP-65 relays. Found lists are remembered per pubkey; the
    /// fallback list is not, so a later call can still find the real one.
    pub async fn get_user_relay_list(&self, pubkey: &str) -> Vec<UserRelay> {
        if let Some(cached) = self.relay_lists.get(pubkey) {
            return cached.clone();
        }
        match self.fetch_relay_list(pubkey).await {
            Some(relays) => {
                self.relay_lists.insert(pubkey.to_string(), relays.clone());
                relays
            }
            None => self.fallback_relays(),
        }
    }

    /// The newest kind 10002 list of `pubkey`, bypassing the memory cache.
    pub async fn fetch_relay_list(&self, pubkey: &str) -> Option<Vec<UserRelay>> {
        let filter = Filter::new().author(pubkey).kind(Kind::RELAY_LIST);
        match self.pool.get(&self.config.relay_list_relays, &filter).await {
            Ok(Some(event)) => {
                let relays = parse_relay_list(&event);
                tracing::debug!("found {} relays for {pubkey}", relays.len());
                Some(relays)
            }
            Ok(None) => {
                tracing::info!("no relay list for {pubkey}, using fallback relays");
                None
            }
            Err(err) => {
                tracing::warn!("relay list lookup for {pubkey} failed: {err}");
                None
            }
        }
    }

    /// The configured fallback relays, read and write.
    pub fn fallback_relays(&self) -> Vec<UserRelay> {
        self.config
            .fallback_relays
            .iter()
            .cloned()
            .map(UserRelay::read_write)
            .collect()
    }

    /// The user's Blossom servers (selected) followed by the defaults they do
    /// not list (unselected). Empty when there is no signer or the relays
    /// could not be queried.
    pub async fn get_blossom_servers(&self, user_relays: &[UserRelay]) -> Vec<ServerOption> {
        let pubkey = match self.signer.get_public_key().await {
            Ok(pubkey) => pubkey,
            Err(err) => {
                tracing::warn!("cannot look up Blossom servers: {err}");
                return Vec::new();
            }
        };

        if let Some(entry) = self.server_lists.get(&pubkey) {
            let (fetched_at, servers) = entry.value();
            if fetched_at.elapsed() < self.config.server_list_ttl {
                return servers.clone();
            }
        }

        let relays = write_relays(user_relays);
        tracing::debug!("write relays for fetching Blossom servers: {relays:?}");
        let filter = Filter::new()
            .kind(Kind::BLOSSOM_SERVER_LIST)
            .author(&pubkey)
            .limit(1);

        let servers = match self.pool.get(&relays, &filter).await {
            Ok(Some(event)) => server_options(&event, &self.config.default_servers),
            Ok(None) => self
                .config
                .default_servers
                .iter()
                .map(|s| (s.clone(), false))
                .collect(),
            Err(err) => {
                tracing::error!("failed to get Blossom servers: {err}");
                return Vec::new();
            }
        };
        self.server_lists
            .insert(pubkey, (Instant::now(), servers.clone()));
        servers
    }

    /// The signer's drives, one per `d` identifier, newest version each.
    pub async fn get_drives(&self, write_relays: &[RelayUrl]) -> Result<Vec<Drive>, NostrError> {
        let pubkey = self.pubkey().await?;
        let filter = Filter::new().kind(Kind::BLOSSOM_DRIVE).author(pubkey);
        let events = self.pool.query(write_relays, &filter, None).await?;
        Ok(latest_by_identifier(events).iter().map(Drive::from_event).collect())
    }

    /// Signs and publishes `drive` with `servers` as its server list.
    pub async fn publish_drive(
        &self,
        drive: &Drive,
        servers: &[Server],
        write_relays: &[RelayUrl],
    ) -> Result<Event, NostrError> {
        let pubkey = self.pubkey().await?;
        let unsigned = drive.to_unsigned_event(&pubkey, servers, unix_now());
        let event = self.sign_and_publish(unsigned, write_relays).await?;
        tracing::info!("published drive {} ({})", drive.name, event.id);
        Ok(event)
    }

    /// Publishes the user's Blossom server list (kind 10063).
    pub async fn publish_servers(
        &self,
        servers: &[Server],
        write_relays: &[RelayUrl],
    ) -> Result<Event, NostrError> {
        let pubkey = self.pubkey().await?;
        let unsigned = UnsignedEvent::new(&pubkey, unix_now(), Kind::BLOSSOM_SERVER_LIST)
            .with_tags(servers.iter().map(|s| tag(["server", s.as_str()])).collect());
        let event = self.sign_and_publish(unsigned, write_relays).await?;
        self.server_lists.remove(&pubkey);
        Ok(event)
    }

    /// Publishes `updated`, then refetches every drive. Returns the drives
    /// and the one named `selected_name`, if it is still there.
    pub async fn update_drive(
        &self,
        updated: &Drive,
        selected_name: &str,
        servers: &[Server],
        write_relays: &[RelayUrl],
    ) -> Result<(Vec<Drive>, Option<Drive>), NostrError> {
        self.publish_drive(updated, servers, write_relays).await?;
        let drives = self.get_drives(write_relays).await?;
        let selected = drives.iter().find(|d| d.name == selected_name).cloned();
        Ok((drives, selected))
    }

    async fn sign_and_publish(
        &self,
        unsigned: UnsignedEvent,
        relays: &[RelayUrl],
    ) -> Result<Event, NostrError> {
        let event = sign_checked(self.signer.as_ref(), unsigned).await?;
        publish_to_any(self.pool.as_ref(), relays, &event).await?;
        Ok(event)
    }
}

/// `r` tags of a kind 10002 event. A missing or empty marker means both.
pub fn parse_relay_list(event: &Event) -> Vec<UserRelay> {
    event
        .tags_named("r")
        .filter_map(|t| {
            let url = t.get(1)?;
            let marker = t.get(2).map(String::as_str).filter(|m| !m.is_empty());
            Some(UserRelay {
                url: RelayUrl::from(url.as_str()),
                read: matches!(marker, None | Some("read")),
                write: matches!(marker, None | Some("write")),
            })
        })
        .collect()
}

/// Servers from a kind 10063 event marked selected, then the defaults the
/// event does not mention.
pub fn server_options(event: &Event, defaults: &[Server]) -> Vec<ServerOption> {
    let listed: Vec<Server> = event.tag_values("server").map(Server::from).collect();
    let remaining: Vec<ServerOption> = defaults
        .iter()
        .filter(|d| !listed.contains(d))
        .map(|d| (d.clone(), false))
        .collect();
    listed
        .into_iter()
        .map(|s| (s, true))
        .chain(remaining)
        .collect()
}

/// One event per `d` tag, the newest `created_at` winning; the first seen
/// wins ties. Events without `d` are dropped. Keeps first-seen order.
pub fn latest_by_identifier(events: Vec<Event>) -> Vec<Event> {
    let mut order: Vec<String> = Vec::new();
    let mut newest: HashMap<String, Event> = HashMap::new();
    for event in events {
        let Some(d) = event.tag_value("d").filter(|d| !d.is_empty()).map(str::to_string) else {
            continue;
        };
        match newest.get(&d) {
            Some(existing) if existing.created_at >= event.created_at => {}
            Some(_) => {
                newest.insert(d, event);
            }
            None => {
                order.push(d.clone());
                newest.insert(d, event);
            }
        }
    }
    order.into_iter().filter_map(|d| newest.remove(&d)).collect()
}
