use anyhow::{Context, Result};

use crate::CacheCmd;
use crate::context::App;

pub async fn run_cache(cmd: CacheCmd, app: &App) -> Result<()> {
    match cmd {
        CacheCmd::Clear => {
            let removed = app.cache.clear_all().await.context("failed to clear cache")?;
            println!("cleared {removed} cache entries");
        }
    }
    Ok(())
}
