use anyhow::{Context, Result};
use comic_core::Server;

use crate::ServersCmd;
use crate::context::App;

pub async fn run_servers(cmd: ServersCmd, app: &App) -> Result<()> {
    match cmd {
        ServersCmd::List => {
            let relays = app.user_relays().await?;
            let servers = app.nostr.get_blossom_servers(&relays).await;
            if servers.is_empty() {
                println!("no servers (is a signer configured?)");
            }
            for (server, selected) in servers {
                println!("[{}] {}", if selected { "x" } else { " " }, server);
            }
        }
        ServersCmd::Set { urls } => {
            let servers: Vec<Server> = urls.into_iter().map(Server::from).collect();
            let write = app.write_relays().await?;
            let event = app
                .nostr
                .publish_servers(&servers, &write)
                .await
                .context("failed to publish server list")?;
            println!("published server list {} ({} servers)", event.id, servers.len());
        }
    }
    Ok(())
}
