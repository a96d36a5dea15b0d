use std::fmt;

use serde::{Deserialize, Serialize};

/// Base URL of a Blossom server, as written in `server` tags.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Server(String);

impl Server {
    pub fn new(url: impl Into<String>) -> Self {
        Self(url.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }

    /// The URL without a single trailing slash, ready for `{base}/{path}` joins.
    pub fn base(&self) -> &str {
        self.0.strip_suffix('/').unwrap_or(&self.0)
    }

    pub fn join(&self, path: &str) -> String {
        format!("{}/{}", self.base(), path)
    }
}

impl fmt::Display for Server {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl From<&str> for Server {
    fn from(value: &str) -> Self {
        Self::new(value)
    }
}

impl From<String> for Server {
    fn from(value: String) -> Self {
        Self(value)
    }
}

/// WebSocket URL of a Nostr relay.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct RelayUrl(String);

impl RelayUrl {
    pub fn new(url: impl Into<String>) -> Self {
        Self(url.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for RelayUrl {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl From<&str> for RelayUrl {
    fn from(value: &str) -> Self {
        Self::new(value)
    }
}

impl From<String> for RelayUrl {
    fn from(value: String) -> Self {
        Self(value)
    }
}

/// One entry of a user's relay list (NIP-65).
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct UserRelay {
    pub url: RelayUrl,
    pub read: bool,
    pub write: bool,
}

impl UserRelay {
    pub fn read_write(url: impl Into<RelayUrl>) -> Self {
        Self {
            url: url.into(),
            read: true,
            write: true,
        }
    }
}

/// A Blossom server and whether the user has it in their published list.
pub type ServerOption = (Server, bool);

pub fn write_relays(relays: &[UserRelay]) -> Vec<RelayUrl> {
    relays
        .iter()
        .filter(|r| r.write)
        .map(|r| r.url.clone())
        .collect()
}

pub fn read_relays(relays: &[UserRelay]) -> Vec<RelayUrl> {
    relays
        .iter()
        .filter(|r| r.read)
        .map(|r| r.url.clone())
        .collect()
}
