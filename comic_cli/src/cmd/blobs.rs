use anyhow::{Context, Result, bail};
use bytes::Bytes;
use comic_blossom::ServerOutcome;
use comic_core::{Server, Sha256Hash};

use crate::BlobsCmd;
use crate::context::App;

pub(crate) fn parse_sha256(s: &str) -> Result<String> {
    let hash = Sha256Hash::from_hex(s.trim())
        .with_context(|| format!("expected 64-character hex sha256, got {s:?}"))?;
    Ok(hash.to_hex())
}

/// Prints one line per server and fails when no server succeeded.
fn report<T>(action: &str, outcomes: &[ServerOutcome<T>], describe: impl Fn(&T) -> String) -> Result<()> {
    let mut ok = 0;
    for outcome in outcomes {
        match &outcome.result {
            Ok(value) => {
                ok += 1;
                println!("{action} on {}: {}", outcome.server, describe(value));
            }
            Err(err) => println!("{action} on {} failed: {err}", outcome.server),
        }
    }
    if ok == 0 {
        bail!("{action} failed on every server");
    }
    Ok(())
}

pub async fn run_blobs(cmd: BlobsCmd, app: &App) -> Result<()> {
    match cmd {
        BlobsCmd::Get { sha256, out, mime } => {
            let sha256 = parse_sha256(&sha256)?;
            let servers = app.selected_servers().await?;
            let blob = app
                .blossom
                .fetch_file(&sha256, &servers, mime.as_deref())
                .await
                .context("failed to download blob")?;
            tokio::fs::write(&out, &blob.bytes)
                .await
                .with_context(|| format!("failed to write to {}", out.display()))?;
            println!("downloaded {} bytes from {} to {}", blob.size, blob.url, out.display());
        }
        BlobsCmd::Upload { path, mime } => {
            let bytes = Bytes::from(
                tokio::fs::read(&path)
                    .await
                    .with_context(|| format!("failed to read {}", path.display()))?,
            );
            let servers = app.selected_servers().await?;
            let outcomes = app
                .blossom
                .upload(bytes, &servers, mime.as_deref())
                .await
                .context("failed to authorize upload")?;
            report("upload", &outcomes, |d| format!("{} ({} bytes)", d.url, d.size))?;
        }
        BlobsCmd::Delete { sha256 } => {
            let sha256 = parse_sha256(&sha256)?;
            let servers = app.selected_servers().await?;
            let outcomes = app
                .blossom
                .delete(&sha256, &servers)
                .await
                .context("failed to authorize delete")?;
            report("delete", &outcomes, |_| "deleted".to_string())?;
        }
        BlobsCmd::Mirror { url } => {
            let servers = app.selected_servers().await?;
            let outcomes = app.blossom.mirror(&url, &servers).await?;
            report("mirror", &outcomes, |d| d.url.clone())?;
        }
        BlobsCmd::List { server } => {
            let pubkey = app.pubkey().await?;
            let servers = match server {
                Some(server) => vec![Server::from(server)],
                None => app.selected_servers().await?,
            };
            for server in servers {
                match app.blossom.list(&server, &pubkey).await {
                    Ok(blobs) => {
                        println!("{server} ({} blobs)", blobs.len());
                        for blob in blobs {
                            println!(
                                "  {} {:>10} {}",
                                blob.sha256,
                                blob.size,
                                blob.mime.as_deref().unwrap_or("-")
                            );
                        }
                    }
                    Err(err) => println!("{server}: {err}"),
                }
            }
        }
    }
    Ok(())
}
