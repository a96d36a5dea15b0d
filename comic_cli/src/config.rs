use std::path::{Path, PathBuf};
use std::time::Duration;

use anyhow::Context;
use comic_core::{RelayUrl, Server};
use comic_nostr::NostrConfig;
use comic_nostr::service::{DEFAULT_BLOSSOM_SERVERS, DEFAULT_RELAYLIST_RELAYS, FALLBACK_RELAYS};
use serde::{Deserialize, Serialize};

/// One profile file, `~/.config/comic/<profile>.toml`.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct ComicConfig {
    pub identity: IdentityConfig,
    pub relays: RelaysConfig,
    pub blossom: BlossomConfig,
    pub cache: CacheConfig,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct IdentityConfig {
    /// Hex pubkey for read-only use when no signer is configured.
    pub pubkey: Option<String>,
    /// `[program, args...]` of the external signer.
    pub signer: Vec<String>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct RelaysConfig {
    pub relay_list: Vec<String>,
    pub fallback: Vec<String>,
}

impl Default for RelaysConfig {
    fn default() -> Self {
        Self {
            relay_list: DEFAULT_RELAYLIST_RELAYS.iter().map(|s| s.to_string()).collect(),
            fallback: FALLBACK_RELAYS.iter().map(|s| s.to_string()).collect(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct BlossomConfig {
    pub default_servers: Vec<String>,
    pub timeout_secs: u64,
}

impl Default for BlossomConfig {
    fn default() -> Self {
        Self {
            default_servers: DEFAULT_BLOSSOM_SERVERS.iter().map(|s| s.to_string()).collect(),
            timeout_secs: 30,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct CacheConfig {
    /// Defaults to `cache` under the profile's data directory.
    pub path: Option<PathBuf>,
    /// How long a found relay list is reused across runs.
    pub ttl_hours: i64,
}

impl Default for CacheConfig {
    fn default() -> Self {
        Self {
            path: None,
            ttl_hours: 24,
        }
    }
}

impl ComicConfig {
    /// Reads `file`; a missing file means all defaults.
    pub fn load(file: &Path) -> anyhow::Result<Self> {
        if !file.exists() {
            tracing::warn!("no config at {file:?}, using defaults (run `comic config init`)");
            return Ok(Self::default());
        }
        let content = std::fs::read_to_string(file)
            .with_context(|| format!("failed to read {}", file.display()))?;
        toml::from_str(&content).with_context(|| format!("invalid config file {}", file.display()))
    }

    pub fn nostr_config(&self) -> NostrConfig {
        NostrConfig {
            relay_list_relays: self.relays.relay_list.iter().map(|r| RelayUrl::from(r.as_str())).collect(),
            fallback_relays: self.relays.fallback.iter().map(|r| RelayUrl::from(r.as_str())).collect(),
            default_servers: self.default_servers(),
            ..NostrConfig::default()
        }
    }

    pub fn default_servers(&self) -> Vec<Server> {
        self.blossom
            .default_servers
            .iter()
            .map(|s| Server::from(s.as_str()))
            .collect()
    }

    pub fn blossom_timeout(&self) -> Duration {
        Duration::from_secs(self.blossom.timeout_secs)
    }

    pub fn cache_dir(&self, data_dir: &Path) -> PathBuf {
        self.cache.path.clone().unwrap_or_else(|| data_dir.join("cache"))
    }
}
