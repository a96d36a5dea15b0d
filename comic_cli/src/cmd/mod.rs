use std::path::{Path, PathBuf};

use anyhow::Result;

use crate::config::ComicConfig;
use crate::context::App;

mod blobs;
mod cache;
mod channels;
mod drives;
mod relays;
mod servers;

pub use blobs::run_blobs;
pub use cache::run_cache;
pub use channels::run_channels;
pub use drives::run_drives;
pub use relays::run_relays;
pub use servers::run_servers;

pub async fn run_command(
    config_file: PathBuf,
    data_dir: &Path,
    cmd: crate::Commands,
) -> Result<()> {
    if let crate::Commands::Config { cmd } = cmd {
        return cmd.run(config_file);
    }

    let config = ComicConfig::load(&config_file)?;
    let app = App::open(config, data_dir)?;

    match cmd {
        crate::Commands::Relays => run_relays(&app).await,
        crate::Commands::Servers { cmd } => run_servers(cmd, &app).await,
        crate::Commands::Drives { cmd } => run_drives(cmd, &app).await,
        crate::Commands::Blobs { cmd } => run_blobs(cmd, &app).await,
        crate::Commands::Channels { cmd } => run_channels(cmd, &app).await,
        crate::Commands::Cache { cmd } => run_cache(cmd, &app).await,
        crate::Commands::Config { .. } => unreachable!(),
    }
}
