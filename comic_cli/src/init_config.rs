use std::{fs, io::Write, path::PathBuf};

use anyhow::Context;
use clap::Subcommand;
use toml_edit::{Array, DocumentMut, Item, Table, value};
use tracing::info;

use crate::config::{BlossomConfig, CacheConfig, RelaysConfig};

#[derive(Subcommand)]
pub enum CmdConfig {
    /// Creates the profile's config file if it doesn't exist and fills in
    /// missing settings with their defaults
    Init,
}

fn strings<'a>(items: impl IntoIterator<Item = &'a String>) -> Item {
    value(items.into_iter().map(String::as_str).collect::<Array>())
}

fn section<'a>(doc: &'a mut DocumentMut, name: &str) -> anyhow::Result<&'a mut Table> {
    doc.entry(name)
        .or_insert(Item::Table(Table::new()))
        .as_table_mut()
        .with_context(|| format!("[{name}] in config file is not a table"))
}

/// Inserts `item` under `key` unless the user already set it.
fn default_key(table: &mut Table, key: &str, item: Item) {
    table.entry(key).or_insert(item);
}

impl CmdConfig {
    pub fn run(self, config_file: PathBuf) -> anyhow::Result<()> {
        let mut doc = if config_file.exists() {
            fs::read_to_string(&config_file)?
        } else {
            let parent = config_file
                .parent()
                .context("config file path has no parent directory")?;
            fs::create_dir_all(parent)?;
            "".to_owned()
        }
        .parse::<DocumentMut>()
        .context("could not parse config file")?;

        match self {
            Self::Init => {
                let identity = section(&mut doc, "identity")?;
                default_key(identity, "signer", strings(&Vec::new()));

                let relays = RelaysConfig::default();
                let table = section(&mut doc, "relays")?;
                default_key(table, "relay_list", strings(&relays.relay_list));
                default_key(table, "fallback", strings(&relays.fallback));

                let blossom = BlossomConfig::default();
                let table = section(&mut doc, "blossom")?;
                default_key(table, "default_servers", strings(&blossom.default_servers));
                default_key(table, "timeout_secs", value(blossom.timeout_secs as i64));

                let cache = CacheConfig::default();
                let table = section(&mut doc, "cache")?;
                default_key(table, "ttl_hours", value(cache.ttl_hours));
            }
        }

        info!("writing to config file {config_file:?}");

        let tmp_path = config_file.with_extension("tmp");
        let mut tmp = fs::OpenOptions::new()
            .write(true)
            .create(true)
            .truncate(true)
            .open(&tmp_path)?;
        tmp.write_all(doc.to_string().as_bytes())?;
        tmp.sync_all()?;
        fs::rename(&tmp_path, config_file)?;
        Ok(())
    }
}
