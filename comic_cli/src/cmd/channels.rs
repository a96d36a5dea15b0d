use anyhow::{Context, Result};
use chrono::{DateTime, Utc};
use comic_core::RelayUrl;
use comic_nostr::{ChannelContent, ChannelMetadata, ChannelQuery};

use crate::context::App;
use crate::{ChannelArgs, ChannelsCmd};

impl From<ChannelArgs> for ChannelContent {
    fn from(args: ChannelArgs) -> Self {
        Self {
            name: args.name,
            about: args.about,
            picture: args.picture,
            relays: args.relays.into_iter().map(RelayUrl::from).collect(),
        }
    }
}

fn format_time(created_at: u64) -> String {
    i64::try_from(created_at)
        .ok()
        .and_then(|secs| DateTime::<Utc>::from_timestamp(secs, 0))
        .map(|t| t.format("%Y-%m-%d %H:%M").to_string())
        .unwrap_or_else(|| created_at.to_string())
}

async fn find_channel(app: &App, id: &str) -> Result<ChannelMetadata> {
    let pubkey = app.pubkey().await?;
    let read = app.read_relays().await?;
    let write = app.write_relays().await?;
    let listing = app.channels.list(&read, &write, &pubkey, false).await?;
    listing
        .channels
        .into_iter()
        .map(|c| c.channel)
        .find(|c| c.id == id)
        .with_context(|| format!("no channel with id {id}"))
}

pub async fn run_channels(cmd: ChannelsCmd, app: &App) -> Result<()> {
    match cmd {
        ChannelsCmd::List {
            comic,
            mine,
            search,
            refresh,
        } => {
            let pubkey = app.pubkey().await?;
            let read = app.read_relays().await?;
            let write = app.write_relays().await?;
            let listing = app.channels.list(&read, &write, &pubkey, refresh).await?;
            let query = ChannelQuery {
                comic_only: comic,
                mine_only: mine,
                search,
            };
            let mut channels = query.apply(listing.channels);
            channels.sort_by(|a, b| b.pinned.cmp(&a.pinned).then(b.channel.created_at.cmp(&a.channel.created_at)));

            for entry in &channels {
                let channel = &entry.channel;
                println!(
                    "{} {} {}{}",
                    if entry.pinned { "*" } else { " " },
                    channel.id,
                    channel.name,
                    if channel.is_comic_chat() { " [comic]" } else { "" }
                );
                if !channel.about.is_empty() {
                    println!("      {}", channel.about);
                }
            }
            println!(
                "{} channels{} (fetched {})",
                channels.len(),
                if listing.from_cache { ", cached" } else { "" },
                listing.fetched_at.to_rfc3339()
            );
        }
        ChannelsCmd::Create { content } => {
            let write = app.write_relays().await?;
            let id = app
                .channels
                .client()
                .create_channel(&write, &content.into())
                .await
                .context("failed to create channel")?;
            println!("created channel {id}");
        }
        ChannelsCmd::Update { id, content } => {
            let write = app.write_relays().await?;
            let update = app
                .channels
                .client()
                .update_channel(&write, &id, &content.into())
                .await
                .context("failed to update channel")?;
            println!("updated channel {id} ({update})");
        }
        ChannelsCmd::Pin { id } => set_pinned(app, &id, true).await?,
        ChannelsCmd::Unpin { id } => set_pinned(app, &id, false).await?,
        ChannelsCmd::Messages { id, limit } => {
            let relays = app.all_relays().await?;
            let messages = app
                .channels
                .client()
                .fetch_messages(&id, &relays, limit)
                .await
                .context("failed to fetch messages")?;
            for message in messages {
                let short = message.pubkey.get(..8).unwrap_or(&message.pubkey);
                println!("[{}] {short}: {}", format_time(message.created_at), message.content);
            }
        }
        ChannelsCmd::Send { id, text } => {
            let write = app.write_relays().await?;
            let message = app
                .channels
                .client()
                .send_message(&id, &write, &text)
                .await
                .context("failed to send message")?;
            println!("sent {}", message.id);
        }
        ChannelsCmd::Opened => {
            let pubkey = app.pubkey().await?;
            let opened = app.channels.opened(&pubkey).await;
            for channel in &opened {
                println!("{} {}", channel.id, channel.name);
            }
            println!("{} opened channels", opened.len());
        }
        ChannelsCmd::Open { id } => {
            let channel = find_channel(app, &id).await?;
            let pubkey = app.pubkey().await?;
            let opened = app
                .channels
                .open(&pubkey, channel.clone())
                .await
                .context("failed to save opened channels")?;
            println!("opened {}, {} opened channels", channel.name, opened.len());
        }
        ChannelsCmd::Close { id } => {
            let pubkey = app.pubkey().await?;
            let opened = app
                .channels
                .close(&pubkey, &id)
                .await
                .context("failed to save opened channels")?;
            println!("closed {id}, {} opened channels", opened.len());
        }
    }
    Ok(())
}

async fn set_pinned(app: &App, id: &str, pin: bool) -> Result<()> {
    let channel = find_channel(app, id).await?;
    let pubkey = app.pubkey().await?;
    let write = app.write_relays().await?;
    let pinned = app
        .channels
        .set_pinned(&channel, pin, &write, &pubkey)
        .await
        .context("failed to update pinned channels")?;
    println!(
        "{} {}, {} pinned channels",
        if pin { "pinned" } else { "unpinned" },
        channel.name,
        pinned.len()
    );
    Ok(())
}
