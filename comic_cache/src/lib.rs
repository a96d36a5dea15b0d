//! Expiring key-value cache.
//!
//! Values are stored as JSON under a key derived from the request
//! parameters ([`hash_params`]), so any serializable description of a
//! request (`{"kind": "pinned", "pubkey": ...}`) can be used as a cache key.
//! The storage itself is pluggable: [`MemoryStorage`] for tests and
//! short-lived processes, [`RedbStorage`] for the on-disk cache the CLI uses.

mod redb_storage;
mod storage;

pub use redb_storage::RedbStorage;
pub use storage::{CacheStorage, MemoryStorage};

use chrono::{DateTime, TimeDelta, TimeZone, Utc};
use serde::{Deserialize, Serialize, de::DeserializeOwned};
use std::future::Future;
use std::sync::Arc;

/// Prefix of every key written by [`Cache`].
pub const KEY_PREFIX: &str = "cache_";

#[derive(Debug, thiserror::Error)]
pub enum CacheError {
    #[error("cache storage: {0}")]
    Storage(#[from] anyhow::Error),
    #[error("cache parameters are not serializable: {0}")]
    Params(#[from] serde_json::Error),
}

/// What is stored per key.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CacheEntry<T> {
    pub data: T,
    pub expires_at_ms: i64,
    pub created_at_ms: i64,
}

#[derive(Debug, Clone, PartialEq)]
pub struct CacheResult<T> {
    pub data: T,
    pub created_at: DateTime<Utc>,
    pub from_cache: bool,
}

/// Derives the storage key for `params`.
///
/// The parameters are serialized to JSON with object keys in sorted order,
/// then hashed with the 32-bit `h = h * 31 + unit` string hash over UTF-16
/// code units. The key is `cache_` followed by the absolute hash in base 36.
pub fn hash_params<P: Serialize + ?Sized>(params: &P) -> Result<String, serde_json::Error> {
    // `serde_json::Map` is ordered by key unless `preserve_order` is enabled.
    let canonical = serde_json::to_value(params)?.to_string();

    let mut hash: i32 = 0;
    for unit in canonical.encode_utf16() {
        hash = hash.wrapping_mul(31).wrapping_add(unit as i32);
    }
    Ok(format!("{KEY_PREFIX}{}", to_base36(i64::from(hash).unsigned_abs())))
}

fn to_base36(mut n: u64) -> String {
    const DIGITS: &[u8; 36] = b"0123456789abcdefghijklmnopqrstuvwxyz";
    if n == 0 {
        return "0".to_string();
    }
    let mut out = Vec::new();
    while n > 0 {
        out.push(DIGITS[(n % 36) as usize]);
        n /= 36;
    }
    out.reverse();
    String::from_utf8_lossy(&out).into_owned()
}

/// Expiration `hours` from now.
pub fn add_hours(hours: i64) -> DateTime<Utc> {
    Utc::now() + TimeDelta::hours(hours)
}

/// Expiration `days` from now.
pub fn add_days(days: i64) -> DateTime<Utc> {
    Utc::now() + TimeDelta::days(days)
}

#[derive(Debug, Clone)]
pub struct Cache {
    storage: Arc<dyn CacheStorage>,
}

impl Cache {
    pub fn new(storage: impl CacheStorage) -> Self {
        Self {
            storage: Arc::new(storage),
        }
    }

    /// In-memory cache.
    pub fn memory() -> Self {
        Self::new(MemoryStorage::new())
    }

    /// Persistent cache in `dir`.
    pub fn open(dir: impl AsRef<std::path::Path>) -> anyhow::Result<Self> {
        Ok(Self::new(RedbStorage::open(dir)?))
    }

    /// Returns the unexpired entry for `params`, or runs `getter` and stores
    /// what it returns until `expires_at`.
    ///
    /// Errors of `getter` are returned as is and nothing is stored. Failing
    /// to read or write the cache only degrades to a miss.
    pub async fn get_or_add<P, T, E, F, Fut>(
        &self,
        params: &P,
        expires_at: DateTime<Utc>,
        getter: F,
    ) -> Result<CacheResult<T>, E>
    where
        P: Serialize + ?Sized,
        T: Serialize + DeserializeOwned,
        F: FnOnce() -> Fut,
        Fut: Future<Output = Result<T, E>>,
    {
        let key = match hash_params(params) {
            Ok(key) => Some(key),
            Err(err) => {
                tracing::warn!("cache bypassed, parameters not serializable: {err}");
                None
            }
        };
        let now = Utc::now();

        if let Some(key) = &key {
            if let Some(hit) = self.lookup::<T>(key, now).await {
                return Ok(hit);
            }
            tracing::debug!("cache miss for key: {key}, fetching fresh data");
        }

        let data = getter().await?;

        if let Some(key) = &key {
            if let Err(err) = self.store(key, &data, now, expires_at).await {
                tracing::warn!("failed to store cache for key {key}: {err}");
            }
        }

        Ok(CacheResult {
            data,
            created_at: now,
            from_cache: false,
        })
    }

    /// The unexpired entry for `params`, if any.
    pub async fn get<P, T>(&self, params: &P) -> Option<CacheResult<T>>
    where
        P: Serialize + ?Sized,
        T: DeserializeOwned,
    {
        let key = match hash_params(params) {
            Ok(key) => key,
            Err(err) => {
                tracing::warn!("cache bypassed, parameters not serializable: {err}");
                return None;
            }
        };
        self.lookup(&key, Utc::now()).await
    }

    /// Stores `data` for `params` until `expires_at`, replacing any entry.
    pub async fn set<P, T>(&self, params: &P, data: &T, expires_at: DateTime<Utc>) -> Result<(), CacheError>
    where
        P: Serialize + ?Sized,
        T: Serialize,
    {
        let key = hash_params(params)?;
        self.store(&key, data, Utc::now(), expires_at).await
    }

    async fn store<T: Serialize>(
        &self,
        key: &str,
        data: &T,
        now: DateTime<Utc>,
        expires_at: DateTime<Utc>,
    ) -> Result<(), CacheError> {
        let entry = CacheEntry {
            data,
            expires_at_ms: expires_at.timestamp_millis(),
            created_at_ms: now.timestamp_millis(),
        };
        let bytes = serde_json::to_vec(&entry)?;
        self.storage.set(key, bytes).await?;
        tracing::debug!("cached {key} until {}", expires_at.to_rfc3339());
        Ok(())
    }

    async fn lookup<T: DeserializeOwned>(&self, key: &str, now: DateTime<Utc>) -> Option<CacheResult<T>> {
        let bytes = match self.storage.get(key).await {
            Ok(Some(bytes)) => bytes,
            Ok(None) => return None,
            Err(err) => {
                tracing::warn!("failed to read cache for key {key}: {err}");
                return None;
            }
        };

        let entry: CacheEntry<T> = match serde_json::from_slice(&bytes) {
            Ok(entry) => entry,
            Err(err) => {
                tracing::warn!("removing corrupted cache entry {key}: {err}");
                self.remove_quietly(key).await;
                return None;
            }
        };

        if entry.expires_at_ms > now.timestamp_millis() {
            tracing::debug!("cache hit for key: {key}");
            let created_at = Utc
                .timestamp_millis_opt(entry.created_at_ms)
                .single()
                .unwrap_or(now);
            Some(CacheResult {
                data: entry.data,
                created_at,
                from_cache: true,
            })
        } else {
            tracing::debug!("cache expired for key: {key}");
            self.remove_quietly(key).await;
            None
        }
    }

    async fn remove_quietly(&self, key: &str) {
        if let Err(err) = self.storage.remove(key).await {
            tracing::warn!("failed to remove cache entry {key}: {err}");
        }
    }

    /// Drops the entry for `params`.
    pub async fn clear<P: Serialize + ?Sized>(&self, params: &P) -> Result<(), CacheError> {
        let key = hash_params(params)?;
        self.storage.remove(&key).await?;
        tracing::debug!("cleared cache for key: {key}");
        Ok(())
    }

    /// Drops every entry this cache wrote. Returns how many were removed.
    pub async fn clear_all(&self) -> Result<usize, CacheError> {
        let mut removed = 0;
        for key in self.storage.keys().await? {
            if key.starts_with(KEY_PREFIX) {
                self.storage.remove(&key).await?;
                removed += 1;
            }
        }
        tracing::debug!("cleared {removed} cache entries");
        Ok(removed)
    }
}
