use bytes::Bytes;
use comic_core::{Drive, DriveEntry, Server, Sha256Hash, Signer};
use dashmap::DashMap;
use futures::future::join_all;
use reqwest::StatusCode;
use reqwest::header::{AUTHORIZATION, CONTENT_TYPE};
use std::sync::Arc;
use std::time::Duration;

use crate::auth::{AuthAction, Authorizer};
use crate::fetch;
use crate::{BlobDescriptor, BlossomError, FetchedBlob, ServerOutcome};

/// One drive entry and what fetching it produced.
#[derive(Debug)]
pub struct DriveBlob {
    pub entry: DriveEntry,
    pub result: Result<FetchedBlob, BlossomError>,
}

/// HTTP client for a set of Blossom servers.
///
/// Verified blobs are kept in memory by hash, so repeated reads of the
/// same asset never hit the network twice.
pub struct BlossomClient {
    http: reqwest::Client,
    auth: Authorizer,
    files: DashMap<String, FetchedBlob>,
}

impl std::fmt::Debug for BlossomClient {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("BlossomClient")
            .field("cached_files", &self.files.len())
            .finish()
    }
}

impl BlossomClient {
    /// Client without a request timeout. Pass `None` for read-only use.
    pub fn new(signer: Option<Arc<dyn Signer>>) -> Self {
        Self::with_http(reqwest::Client::new(), signer)
    }

    pub fn with_timeout(
        timeout: Duration,
        signer: Option<Arc<dyn Signer>>,
    ) -> Result<Self, BlossomError> {
        let http = reqwest::Client::builder().timeout(timeout).build()?;
        Ok(Self::with_http(http, signer))
    }

    pub fn with_http(http: reqwest::Client, signer: Option<Arc<dyn Signer>>) -> Self {
        Self {
            http,
            auth: Authorizer::new(signer),
            files: DashMap::new(),
        }
    }

    /// Fetches `sha256` from whichever server first returns content that
    /// matches the hash (and `mime`, when given).
    pub async fn fetch_file(
        &self,
        sha256: &str,
        servers: &[Server],
        mime: Option<&str>,
    ) -> Result<FetchedBlob, BlossomError> {
        let key = sha256.to_ascii_lowercase();
        if let Some(hit) = self.files.get(&key) {
            log::debug!("serving {} from memory", sha256);
            return Ok(hit.value().clone());
        }
        let blob = fetch::race(&self.http, servers, sha256, mime).await?;
        self.files.insert(key, blob.clone());
        Ok(blob)
    }

    /// Fetches every entry of `drive` from the drive's servers.
    pub async fn fetch_drive(&self, drive: &Drive) -> Vec<DriveBlob> {
        join_all(drive.x.iter().map(|entry| async move {
            let mime = (!entry.mime.is_empty()).then_some(entry.mime.as_str());
            DriveBlob {
                entry: entry.clone(),
                result: self.fetch_file(&entry.sha256, &drive.servers, mime).await,
            }
        }))
        .await
    }

    /// Uploads `bytes` to every server. The returned error covers signing
    /// the token; server failures are reported per outcome.
    pub async fn upload(
        &self,
        bytes: Bytes,
        servers: &[Server],
        content_type: Option<&str>,
    ) -> Result<Vec<ServerOutcome<BlobDescriptor>>, BlossomError> {
        let sha256 = Sha256Hash::new(&bytes).to_hex();
        let auth = self.auth.header(&AuthAction::Upload { sha256 }).await?;

        Ok(join_all(servers.iter().map(|server| {
            let auth = auth.clone();
            let bytes = bytes.clone();
            async move {
                let mut req = self
                    .http
                    .put(server.join("upload"))
                    .header(AUTHORIZATION, auth)
                    .body(bytes);
                if let Some(ct) = content_type {
                    req = req.header(CONTENT_TYPE, ct);
                }
                ServerOutcome {
                    server: server.clone(),
                    result: descriptor(req).await,
                }
            }
        }))
        .await)
    }

    /// Deletes `sha256` from every server.
    pub async fn delete(
        &self,
        sha256: &str,
        servers: &[Server],
    ) -> Result<Vec<ServerOutcome<()>>, BlossomError> {
        let auth = self
            .auth
            .header(&AuthAction::Delete {
                sha256: sha256.to_string(),
            })
            .await?;
        self.files.remove(&sha256.to_ascii_lowercase());

        Ok(join_all(servers.iter().map(|server| {
            let auth = auth.clone();
            async move {
                let url = server.join(sha256);
                let result = async {
                    let res = self.http.delete(&url).header(AUTHORIZATION, auth).send().await?;
                    ensure_success(&url, res.status())
                }
                .await;
                if result.is_ok() {
                    log::info!("deleted {} from {}", sha256, server);
                }
                ServerOutcome {
                    server: server.clone(),
                    result,
                }
            }
        }))
        .await)
    }

    /// Asks every server to copy the blob at `url`. The hash is read from
    /// the last path segment of `url`, up to the first `.`.
    pub async fn mirror(
        &self,
        url: &str,
        servers: &[Server],
    ) -> Result<Vec<ServerOutcome<BlobDescriptor>>, BlossomError> {
        let sha256 = sha256_from_url(url).ok_or_else(|| BlossomError::InvalidUrl(url.to_string()))?;
        let auth = self
            .auth
            .header(&AuthAction::Mirror {
                sha256: sha256.to_string(),
            })
            .await?;
        let body = serde_json::json!({ "url": url });

        Ok(join_all(servers.iter().map(|server| {
            let auth = auth.clone();
            let body = &body;
            async move {
                let req = self
                    .http
                    .put(server.join("mirror"))
                    .header(AUTHORIZATION, auth)
                    .json(body);
                ServerOutcome {
                    server: server.clone(),
                    result: descriptor(req).await,
                }
            }
        }))
        .await)
    }

    /// Blobs `pubkey` has stored on `server`.
    pub async fn list(&self, server: &Server, pubkey: &str) -> Result<Vec<BlobDescriptor>, BlossomError> {
        let auth = self.auth.header(&AuthAction::List).await?;
        let url = server.join(&format!("list/{pubkey}"));
        let res = self.http.get(&url).header(AUTHORIZATION, auth).send().await?;
        ensure_success(&url, res.status())?;
        Ok(res.json().await?)
    }

    /// Downloads `url` as is, without hash or content type checks.
    pub async fn download(&self, url: &str) -> Result<Bytes, BlossomError> {
        let res = self.http.get(url).send().await?;
        ensure_success(url, res.status())?;
        let bytes = res.bytes().await?;
        log::debug!("downloaded {} bytes from {}", bytes.len(), url);
        Ok(bytes)
    }

    /// Whether `server` has `sha256`.
    pub async fn has(&self, server: &Server, sha256: &str) -> Result<bool, BlossomError> {
        let url = server.join(sha256);
        let res = self.http.head(&url).send().await?;
        match res.status() {
            s if s.is_success() => Ok(true),
            StatusCode::NOT_FOUND => Ok(false),
            s => Err(BlossomError::Status {
                url,
                status: s.as_u16(),
            }),
        }
    }
}

fn ensure_success(url: &str, status: StatusCode) -> Result<(), BlossomError> {
    if status.is_success() {
        Ok(())
    } else {
        Err(BlossomError::Status {
            url: url.to_string(),
            status: status.as_u16(),
        })
    }
}

async fn descriptor(req: reqwest::RequestBuilder) -> Result<BlobDescriptor, BlossomError> {
    let res = req.send().await?;
    let url = res.url().to_string();
    ensure_success(&url, res.status())?;
    Ok(res.json().await?)
}

/// `https://cdn.example.com/ab12.svg` -> `ab12`
pub(crate) fn sha256_from_url(url: &str) -> Option<&str> {
    let last = url.rsplit('/').next()?;
    let sha256 = last.split('.').next()?;
    (!sha256.is_empty()).then_some(sha256)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn hash_from_mirror_url() {
        assert_eq!(sha256_from_url("https://a.example/abc.svg"), Some("abc"));
        assert_eq!(sha256_from_url("https://a.example/abc"), Some("abc"));
        assert_eq!(sha256_from_url("https://a.example/"), None);
    }
}
