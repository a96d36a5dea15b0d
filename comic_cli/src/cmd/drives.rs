use std::path::Path;

use anyhow::{Context, Result, anyhow, bail};
use bytes::Bytes;
use comic_core::{Drive, Server, Sha256Hash};
use comic_drive::{AssetNode, DriveUpdate, SVG_MIME, build_tree, edit, get_node_by_path, path, render_tree};

use crate::DrivesCmd;
use super::blobs::parse_sha256;
use crate::context::App;

fn node<'a>(root: &'a AssetNode, at: &str) -> Result<&'a AssetNode> {
    let at = path::normalize(at);
    get_node_by_path(root, &at).with_context(|| format!("no file or folder at {at}"))
}

/// Publishes `updated` with the drive's servers, or the selected ones when
/// the drive lists none.
async fn publish(app: &App, original: &Drive, updated: &Drive) -> Result<Drive> {
    let servers = if original.servers.is_empty() {
        app.selected_servers().await?
    } else {
        original.servers.clone()
    };
    let write = app.write_relays().await?;
    let (_, selected) = app
        .nostr
        .update_drive(updated, &original.name, &servers, &write)
        .await
        .context("failed to publish drive")?;
    selected.with_context(|| format!("drive {} not found after publishing", original.name))
}

async fn apply(app: &App, drive: &Drive, update: DriveUpdate) -> Result<Drive> {
    let published = publish(app, drive, &update.drive).await?;
    println!("published {} ({} files)", published.name, published.x.len());
    Ok(published)
}

pub async fn run_drives(cmd: DrivesCmd, app: &App) -> Result<()> {
    match cmd {
        DrivesCmd::List => {
            let write = app.write_relays().await?;
            let drives = app.nostr.get_drives(&write).await?;
            if drives.is_empty() {
                println!("no drives");
            }
            for drive in drives {
                println!(
                    "{} (d={}) files={} folders={} servers={}",
                    drive.name,
                    drive.d,
                    drive.x.len(),
                    drive.folders.len(),
                    drive.servers.len()
                );
                if !drive.description.is_empty() {
                    println!("    {}", drive.description);
                }
            }
        }
        DrivesCmd::Tree { drive } => {
            let drive = app.drive(&drive).await?;
            print!("{}", render_tree(&build_tree(&drive)));
        }
        DrivesCmd::Fetch { drive, out } => {
            let drive = app.drive(&drive).await?;
            fetch_into(app, &drive, &out).await?;
        }
        DrivesCmd::Mkdir { drive, at, name } => {
            let drive = app.drive(&drive).await?;
            let root = build_tree(&drive);
            let update = edit::new_folder(&drive, node(&root, &at)?, &name)?;
            apply(app, &drive, update).await?;
        }
        DrivesCmd::Rm {
            drive,
            path,
            keep_blobs,
        } => {
            let drive = app.drive(&drive).await?;
            let root = build_tree(&drive);
            let update = edit::delete(&drive, node(&root, &path)?)?;
            let removed = update.removed_blobs.clone();
            apply(app, &drive, update).await?;
            if !keep_blobs {
                delete_blobs(app, &drive, &removed).await;
            }
        }
        DrivesCmd::Cp {
            drive,
            path,
            new_path,
        } => {
            let drive = app.drive(&drive).await?;
            let root = build_tree(&drive);
            let update = edit::duplicate(&drive, &root, node(&root, &path)?, &new_path)?;
            apply(app, &drive, update).await?;
        }
        DrivesCmd::Mv {
            drive,
            path,
            new_path,
        } => {
            let drive = app.drive(&drive).await?;
            let root = build_tree(&drive);
            let update = edit::edit_path(&drive, &root, node(&root, &path)?, &new_path)?;
            apply(app, &drive, update).await?;
        }
        DrivesCmd::Upload {
            drive,
            at,
            file,
            url,
            hash,
            name,
        } => {
            let drive = app.drive(&drive).await?;
            let root = build_tree(&drive);
            let target = node(&root, &at)?;
            let servers = if drive.servers.is_empty() {
                app.selected_servers().await?
            } else {
                drive.servers.clone()
            };

            let (file_name, sha256, size) = match (file, url, hash) {
                (_, _, Some(hash)) => {
                    let sha256 = parse_sha256(&hash)?;
                    let blob = app
                        .blossom
                        .fetch_file(&sha256, &servers, Some(SVG_MIME))
                        .await
                        .with_context(|| format!("blob {sha256} is not available as SVG"))?;
                    let name = name.context("--hash needs --name")?;
                    (format!("{name}.svg"), sha256, blob.size)
                }
                (_, Some(url), None) => {
                    let bytes = app
                        .blossom
                        .download(&url)
                        .await
                        .with_context(|| format!("failed to download {url}"))?;
                    upload_svg(app, &servers, path::name_from_url(&url), bytes).await?
                }
                (Some(file), None, None) => {
                    let file_name = file
                        .file_name()
                        .and_then(|n| n.to_str())
                        .with_context(|| format!("invalid file name {}", file.display()))?
                        .to_string();
                    let bytes = Bytes::from(
                        tokio::fs::read(&file)
                            .await
                            .with_context(|| format!("failed to read {}", file.display()))?,
                    );
                    upload_svg(app, &servers, file_name, bytes).await?
                }
                (None, None, None) => bail!("give a file, --url or --hash"),
            };

            let update = edit::place_upload(&drive, &root, target, &file_name, &sha256, size)?;
            apply(app, &drive, update).await?;
        }
        DrivesCmd::Emotion {
            drive,
            path,
            keywords,
        } => {
            let drive = app.drive(&drive).await?;
            let root = build_tree(&drive);
            let asset = node(&root, &path)?;
            if asset.is_dir() {
                bail!("{} is a folder, emotions belong to files", asset.path);
            }
            let mut updated = drive.clone();
            updated.emotions = edit::set_emotion_keywords(&drive.emotions, &asset.path, &keywords);
            let update = DriveUpdate {
                drive: updated,
                removed_blobs: Vec::new(),
            };
            apply(app, &drive, update).await?;
        }
    }
    Ok(())
}

/// Uploads `bytes` as SVG and returns the entry fields for it. Fails only
/// when no server accepted the blob.
async fn upload_svg(app: &App, servers: &[Server], file_name: String, bytes: Bytes) -> Result<(String, String, u64)> {
    let sha256 = Sha256Hash::new(&bytes).to_hex();
    let size = bytes.len() as u64;
    let outcomes = app
        .blossom
        .upload(bytes, servers, Some(SVG_MIME))
        .await
        .context("failed to authorize upload")?;
    let mut uploaded = 0;
    for outcome in &outcomes {
        match &outcome.result {
            Ok(_) => uploaded += 1,
            Err(err) => tracing::warn!("upload to {} failed: {err}", outcome.server),
        }
    }
    if uploaded == 0 {
        bail!("upload failed on every server");
    }
    println!("uploaded {sha256} to {uploaded}/{} servers", outcomes.len());
    Ok((file_name, sha256, size))
}

async fn fetch_into(app: &App, drive: &Drive, out: &Path) -> Result<()> {
    let mut failed = 0;
    for blob in app.blossom.fetch_drive(drive).await {
        let fetched = match blob.result {
            Ok(fetched) => fetched,
            Err(err) => {
                tracing::warn!("failed to fetch {}: {err}", blob.entry.path);
                failed += 1;
                continue;
            }
        };
        if path::segments(&blob.entry.path).contains(&"..") {
            tracing::warn!("skipping {}, path leaves the output directory", blob.entry.path);
            failed += 1;
            continue;
        }
        let target = out.join(blob.entry.path.trim_start_matches('/'));
        if let Some(parent) = target.parent() {
            tokio::fs::create_dir_all(parent).await?;
        }
        tokio::fs::write(&target, &fetched.bytes)
            .await
            .with_context(|| format!("failed to write to {}", target.display()))?;
        println!("{} ({} bytes) from {}", target.display(), fetched.size, fetched.url);
    }
    for folder in drive.folders.iter().filter(|f| !path::segments(f).contains(&"..")) {
        tokio::fs::create_dir_all(out.join(folder.trim_start_matches('/'))).await?;
    }
    if failed > 0 {
        return Err(anyhow!("{failed} of {} files could not be fetched", drive.x.len()));
    }
    Ok(())
}

async fn delete_blobs(app: &App, drive: &Drive, hashes: &[String]) {
    for sha256 in hashes {
        match app.blossom.delete(sha256, &drive.servers).await {
            Ok(outcomes) => {
                for outcome in &outcomes {
                    if let Err(err) = &outcome.result {
                        tracing::warn!("failed to delete {sha256} from {}: {err}", outcome.server);
                    }
                }
            }
            Err(err) => tracing::warn!("not deleting {sha256}: {err}"),
        }
    }
}
