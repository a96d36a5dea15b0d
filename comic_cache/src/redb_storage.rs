//! Persistent cache storage backed by redb.

use redb::{Database, ReadableDatabase, ReadableTable, TableDefinition};
use std::{path::Path, sync::Arc};

use crate::storage::CacheStorage;

const TABLE: TableDefinition<&str, &[u8]> = TableDefinition::new("cache");

/// One `cache.redb` file inside the cache directory.
#[derive(Clone)]
pub struct RedbStorage {
    db: Arc<Database>,
}

impl RedbStorage {
    pub fn open<P: AsRef<Path>>(dir: P) -> anyhow::Result<Self> {
        let dir = dir.as_ref();
        std::fs::create_dir_all(dir)?;
        let db = Database::create(dir.join("cache.redb"))?;

        // Create the table up front so the first read on a fresh file
        // does not fail with a missing table.
        {
            let write_txn = db.begin_write()?;
            {
                let _ = write_txn.open_table(TABLE)?;
            }
            write_txn.commit()?;
        }

        Ok(Self { db: Arc::new(db) })
    }
}

impl std::fmt::Debug for RedbStorage {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("RedbStorage").finish()
    }
}

#[async_trait::async_trait]
impl CacheStorage for RedbStorage {
    async fn get(&self, key: &str) -> anyhow::Result<Option<Vec<u8>>> {
        let db = self.db.clone();
        let key = key.to_string();

        tokio::task::spawn_blocking(move || -> anyhow::Result<Option<Vec<u8>>> {
            let read_txn = db.begin_read()?;
            let table = read_txn.open_table(TABLE)?;
            Ok(table.get(key.as_str())?.map(|guard| guard.value().to_vec()))
        })
        .await
        .map_err(|e| anyhow::anyhow!("redb read task failed: {}", e))?
    }

    async fn set(&self, key: &str, value: Vec<u8>) -> anyhow::Result<()> {
        let db = self.db.clone();
        let key = key.to_string();

        tokio::task::spawn_blocking(move || -> anyhow::Result<()> {
            let write_txn = db.begin_write()?;
            {
                let mut table = write_txn.open_table(TABLE)?;
                table.insert(key.as_str(), value.as_slice())?;
            }
            write_txn.commit()?;
            Ok(())
        })
        .await
        .map_err(|e| anyhow::anyhow!("redb write task failed: {}", e))?
    }

    async fn remove(&self, key: &str) -> anyhow::Result<()> {
        let db = self.db.clone();
        let key = key.to_string();

        tokio::task::spawn_blocking(move || -> anyhow::Result<()> {
            let write_txn = db.begin_write()?;
            {
                let mut table = write_txn.open_table(TABLE)?;
                table.remove(key.as_str())?;
            }
            write_txn.commit()?;
            Ok(())
        })
        .await
        .map_err(|e| anyhow::anyhow!("redb delete task failed: {}", e))?
    }

    async fn keys(&self) -> anyhow::Result<Vec<String>> {
        let db = self.db.clone();

        tokio::task::spawn_blocking(move || -> anyhow::Result<Vec<String>> {
            let read_txn = db.begin_read()?;
            let table = read_txn.open_table(TABLE)?;
            let mut keys = Vec::new();
            for item in table.iter()? {
                let (key, _) = item?;
                keys.push(key.value().to_string());
            }
            Ok(keys)
        })
        .await
        .map_err(|e| anyhow::anyhow!("redb scan task failed: {}", e))?
    }
}
