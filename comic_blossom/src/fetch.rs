//! Racing verified fetch across several servers.

use comic_core::{Server, Sha256Hash};
use futures::stream::{FuturesUnordered, StreamExt};
use reqwest::header::CONTENT_TYPE;

use crate::{BlossomError, FetchedBlob, ServerFailure};

/// File extension appended to the hash in `GET` URLs: `.svg` for any SVG
/// mime, the mime subtype otherwise, nothing without a mime.
pub fn extension_for(mime: Option<&str>) -> String {
    match mime {
        None => String::new(),
        Some(m) if m.contains("svg") => ".svg".to_string(),
        Some(m) => match m.split('/').nth(1) {
            Some(subtype) => format!(".{subtype}"),
            None => String::new(),
        },
    }
}

/// `image/svg+xml; charset=utf-8` -> `image/svg+xml`
fn essence(content_type: &str) -> String {
    content_type
        .split(';')
        .next()
        .unwrap_or_default()
        .trim()
        .to_ascii_lowercase()
}

/// Fetches `sha256` from one server and checks status, content type and hash.
pub(crate) async fn fetch_verified(
    http: &reqwest::Client,
    server: &Server,
    sha256: &str,
    mime: Option<&str>,
) -> Result<FetchedBlob, BlossomError> {
    let url = server.join(&format!("{sha256}{}", extension_for(mime)));
    let res = http.get(&url).send().await?;
    if !res.status().is_success() {
        return Err(BlossomError::Status {
            url,
            status: res.status().as_u16(),
        });
    }

    if let Some(expected) = mime {
        let got = res
            .headers()
            .get(CONTENT_TYPE)
            .and_then(|v| v.to_str().ok())
            .map(str::to_string);
        if got.as_deref().map(essence) != Some(essence(expected)) {
            return Err(BlossomError::ContentTypeMismatch {
                url,
                expected: expected.to_string(),
                got,
            });
        }
    }

    let served_from = res.url().to_string();
    let bytes = res.bytes().await?;
    let actual = Sha256Hash::new(&bytes).to_hex();
    if !actual.eq_ignore_ascii_case(sha256) {
        return Err(BlossomError::HashMismatch {
            url: served_from,
            expected: sha256.to_string(),
            actual,
        });
    }

    Ok(FetchedBlob {
        size: bytes.len() as u64,
        bytes,
        url: served_from,
        sha256: sha256.to_string(),
    })
}

/// Asks every server at once and returns the first blob that verifies.
/// Slower requests are dropped as soon as one succeeds.
pub(crate) async fn race(
    http: &reqwest::Client,
    servers: &[Server],
    sha256: &str,
    mime: Option<&str>,
) -> Result<FetchedBlob, BlossomError> {
    if servers.is_empty() {
        return Err(BlossomError::NoServers);
    }

    let mut pending: FuturesUnordered<_> = servers
        .iter()
        .map(|server| async move { (server, fetch_verified(http, server, sha256, mime).await) })
        .collect();

    let mut failures = Vec::new();
    while let Some((server, result)) = pending.next().await {
        match result {
            Ok(blob) => {
                log::info!("fetched {} from {}", sha256, blob.url);
                return Ok(blob);
            }
            Err(err) => {
                log::debug!("fetch of {} from {} failed: {}", sha256, server, err);
                failures.push(ServerFailure {
                    server: server.clone(),
                    reason: err.to_string(),
                });
            }
        }
    }

    log::warn!("could not fetch {} from any of {} servers", sha256, servers.len());
    Err(BlossomError::AllFailed(failures))
}
