//! Blossom client.
//!
//! Blossom servers store blobs addressed by their SHA-256 hash. A drive lists
//! several servers for the same content, so every read races all of them and
//! keeps the first response that verifies, while writes (upload, delete,
//! mirror) go to every server and report one outcome per server.
//!
//! ## Example
//!
//! ```ignore
//! let client = BlossomClient::new(Some(signer));
//! let blob = client.fetch_file(&sha256, &drive.servers, Some("image/svg+xml")).await?;
//! ```

pub mod auth;
mod client;
mod fetch;

pub use auth::{AuthAction, Authorizer};
pub use client::{BlossomClient, DriveBlob};
pub use fetch::extension_for;

use bytes::Bytes;
use comic_core::{Server, SignerError};
use serde::{Deserialize, Serialize};

/// Server answer to upload, mirror and list requests.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct BlobDescriptor {
    pub url: String,
    pub sha256: String,
    pub size: u64,
    #[serde(rename = "type", default, skip_serializing_if = "Option::is_none")]
    pub mime: Option<String>,
    #[serde(default)]
    pub uploaded: u64,
}

/// A blob whose content was checked against its hash.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FetchedBlob {
    pub bytes: Bytes,
    pub size: u64,
    /// Where the blob was served from.
    pub url: String,
    pub sha256: String,
}

/// Result of a write against one server.
#[derive(Debug)]
pub struct ServerOutcome<T> {
    pub server: Server,
    pub result: Result<T, BlossomError>,
}

impl<T> ServerOutcome<T> {
    pub fn is_ok(&self) -> bool {
        self.result.is_ok()
    }
}

/// Why one server did not deliver.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ServerFailure {
    pub server: Server,
    pub reason: String,
}

#[derive(Debug, thiserror::Error)]
pub enum BlossomError {
    #[error("no servers to ask")]
    NoServers,
    #[error("all servers failed: {}", format_failures(.0))]
    AllFailed(Vec<ServerFailure>),
    #[error("content of {url} hashes to {actual}, expected {expected}")]
    HashMismatch {
        url: String,
        expected: String,
        actual: String,
    },
    #[error("{url} served content type {got:?}, expected {expected}")]
    ContentTypeMismatch {
        url: String,
        expected: String,
        got: Option<String>,
    },
    #[error("{url} answered with status {status}")]
    Status { url: String, status: u16 },
    #[error("no sha256 in url {0}")]
    InvalidUrl(String),
    #[error("authorization failed: {0}")]
    Auth(#[from] SignerError),
    #[error(transparent)]
    Http(#[from] reqwest::Error),
    #[error(transparent)]
    Json(#[from] serde_json::Error),
}

fn format_failures(failures: &[ServerFailure]) -> String {
    failures
        .iter()
        .map(|f| format!("{}: {}", f.server, f.reason))
        .collect::<Vec<_>>()
        .join(", ")
}
