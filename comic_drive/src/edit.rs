//! File-explorer edits on a drive.
//!
//! Each operation takes the current drive, the tree built from it and the
//! selected node, and returns the drive to publish. Blobs that are no longer
//! referenced are reported in [`DriveUpdate::removed_blobs`] so the caller
//! can delete them from the Blossom servers.

use comic_core::{Drive, DriveEntry, Emotion};

use crate::SVG_MIME;
use crate::path;
use crate::tree::{AssetNode, NodeKind, find_parent_folder, get_node_by_path};

#[derive(Debug, thiserror::Error, PartialEq, Eq)]
pub enum EditError {
    #[error("path already exists: {0}")]
    PathExists(String),
    #[error("invalid move: {0}")]
    InvalidMove(String),
    #[error("not found: {0}")]
    NotFound(String),
    #[error("name must not be empty")]
    EmptyName,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DriveUpdate {
    pub drive: Drive,
    /// Hashes of blobs the drive no longer references.
    pub removed_blobs: Vec<String>,
}

impl DriveUpdate {
    fn keep(drive: Drive) -> Self {
        Self {
            drive,
            removed_blobs: Vec::new(),
        }
    }
}

fn ensure_free(root: &AssetNode, path: &str) -> Result<(), EditError> {
    if get_node_by_path(root, path).is_some() {
        return Err(EditError::PathExists(path.to_string()));
    }
    Ok(())
}

/// Creates an empty folder `name` inside the selected directory, or next to
/// the selected file.
pub fn new_folder(drive: &Drive, node: &AssetNode, name: &str) -> Result<DriveUpdate, EditError> {
    let name = name.trim().trim_matches('/');
    if name.is_empty() {
        return Err(EditError::EmptyName);
    }
    let new_path = path::join(&node.target_dir(), name);

    let mut drive = drive.clone();
    let taken = drive.folders.iter().any(|f| *f == new_path)
        || drive.x.iter().any(|x| path::is_within(&x.path, &new_path));
    if taken {
        return Err(EditError::PathExists(new_path));
    }
    log::debug!("new folder {new_path}");
    drive.folders.push(new_path);
    Ok(DriveUpdate::keep(drive))
}

/// Removes the selected file, or the selected directory with everything
/// below it. Blobs still used by a remaining entry are not released.
pub fn delete(drive: &Drive, node: &AssetNode) -> Result<DriveUpdate, EditError> {
    if node.is_root() {
        return Err(EditError::InvalidMove("the root folder cannot be deleted".to_string()));
    }
    let mut drive = drive.clone();
    let mut removed_blobs = Vec::new();

    match &node.kind {
        NodeKind::Svg(entry) => {
            let before = drive.x.len();
            drive.x.retain(|x| x.path != node.path);
            if drive.x.len() == before {
                return Err(EditError::NotFound(node.path.clone()));
            }
            removed_blobs.push(entry.sha256.clone());
        }
        NodeKind::Directory => {
            drive.folders.retain(|f| !path::is_within(f, &node.path));
            drive.x.retain(|x| {
                if path::is_within(&x.path, &node.path) {
                    if x.path.ends_with(".svg") {
                        removed_blobs.push(x.sha256.clone());
                    }
                    false
                } else {
                    true
                }
            });
        }
    }

    removed_blobs.sort();
    removed_blobs.dedup();
    removed_blobs.retain(|sha| !drive.x.iter().any(|x| x.sha256 == *sha));

    log::debug!("deleted {} ({} blobs released)", node.path, removed_blobs.len());
    Ok(DriveUpdate {
        drive,
        removed_blobs,
    })
}

/// Copies the selected file, or every file below the selected directory, to
/// `new_path`. Blobs are shared between the copies.
pub fn duplicate(
    drive: &Drive,
    root: &AssetNode,
    node: &AssetNode,
    new_path: &str,
) -> Result<DriveUpdate, EditError> {
    let new_path = path::normalize(new_path);
    ensure_free(root, &new_path)?;

    let mut drive = drive.clone();
    match &node.kind {
        NodeKind::Svg(entry) => {
            drive.x.push(DriveEntry {
                path: new_path,
                ..entry.clone()
            });
        }
        NodeKind::Directory => {
            let copies: Vec<DriveEntry> = drive
                .x
                .iter()
                .filter(|x| x.path.ends_with(".svg") && path::is_within(&x.path, &node.path))
                .map(|x| DriveEntry {
                    path: path::rebase(&x.path, &node.path, &new_path),
                    ..x.clone()
                })
                .collect();
            let folders: Vec<String> = drive
                .folders
                .iter()
                .filter(|f| path::is_within(f, &node.path))
                .map(|f| path::rebase(f, &node.path, &new_path))
                .collect();
            drive.x.extend(copies);
            drive.folders.extend(folders);
        }
    }
    drive.sort_entries();
    Ok(DriveUpdate::keep(drive))
}

/// Moves or renames the selected node to `new_path`.
pub fn edit_path(
    drive: &Drive,
    root: &AssetNode,
    node: &AssetNode,
    new_path: &str,
) -> Result<DriveUpdate, EditError> {
    let new_path = path::normalize(new_path);
    if new_path == node.path {
        return Ok(DriveUpdate::keep(drive.clone()));
    }
    ensure_free(root, &new_path)?;

    let mut drive = drive.clone();
    match &node.kind {
        NodeKind::Svg(_) => {
            let Some(entry) = drive.x.iter_mut().find(|x| x.path == node.path) else {
                return Err(EditError::NotFound(node.path.clone()));
            };
            entry.path = new_path.clone();

            let target_folder = path::parent(&new_path).to_string();
            drive.folders.retain(|f| *f != target_folder);

            let source_folder = path::parent(&node.path).to_string();
            let source_empty = !drive
                .x
                .iter()
                .any(|x| path::parent(&x.path) == source_folder);
            if !source_folder.is_empty() && source_empty && !drive.folders.contains(&source_folder) {
                drive.folders.push(source_folder);
            }
            drive.folders.sort();
        }
        NodeKind::Directory => {
            if node.is_root() {
                return Err(EditError::InvalidMove("the drive root cannot be moved".into()));
            }
            if path::is_within(&new_path, &node.path) {
                return Err(EditError::InvalidMove(format!(
                    "{} cannot move into itself",
                    node.path
                )));
            }
            for x in drive.x.iter_mut() {
                if path::is_within(&x.path, &node.path) {
                    x.path = path::rebase(&x.path, &node.path, &new_path);
                }
            }
            for f in drive.folders.iter_mut() {
                if path::is_within(f, &node.path) {
                    *f = path::rebase(f, &node.path, &new_path);
                }
            }
        }
    }
    drive.sort_entries();
    log::debug!("moved {} to {}", node.path, new_path);
    Ok(DriveUpdate::keep(drive))
}

/// Drag-and-drop: moves `dragged` into the directory `target`, or next to
/// `target` when it is a file.
pub fn drop_onto(
    drive: &Drive,
    root: &AssetNode,
    dragged: &AssetNode,
    target: &AssetNode,
) -> Result<DriveUpdate, EditError> {
    if dragged.path == target.path {
        return Err(EditError::InvalidMove(format!(
            "{} dropped onto itself",
            dragged.path
        )));
    }
    if dragged.is_dir() && path::is_within(&target.path, &dragged.path) {
        return Err(EditError::InvalidMove(format!(
            "{} cannot move into its own subtree",
            dragged.path
        )));
    }
    let new_path = path::join(&target.target_dir(), &dragged.name);
    edit_path(drive, root, dragged, &new_path)
}

/// Records an uploaded blob under the selected directory, or next to the
/// selected file.
pub fn place_upload(
    drive: &Drive,
    root: &AssetNode,
    node: &AssetNode,
    file_name: &str,
    sha256: &str,
    size: u64,
) -> Result<DriveUpdate, EditError> {
    let folder = if node.is_dir() {
        node.path.clone()
    } else {
        find_parent_folder(root, &node.path).ok_or_else(|| EditError::NotFound(node.path.clone()))?
    };
    let new_path = path::join(&folder, path::file_name(file_name));
    ensure_free(root, &new_path)?;

    let mut drive = drive.clone();
    drive.x.push(DriveEntry {
        sha256: sha256.to_string(),
        path: new_path,
        size,
        mime: SVG_MIME.to_string(),
    });
    drive.folders.retain(|f| *f != folder);
    drive.sort_entries();
    Ok(DriveUpdate::keep(drive))
}

/// Sets the keywords of the emotion named after `asset_path`.
/// `keywords_csv` is comma-separated; an empty list removes the emotion.
pub fn set_emotion_keywords(
    emotions: &[Emotion],
    asset_path: &str,
    keywords_csv: &str,
) -> Vec<Emotion> {
    let name = path::stem(asset_path);
    let keywords: Vec<String> = keywords_csv
        .split(',')
        .map(str::trim)
        .filter(|k| !k.is_empty())
        .map(str::to_string)
        .collect();

    let mut emotions = emotions.to_vec();
    if keywords.is_empty() {
        emotions.retain(|e| e.name != name);
    } else if let Some(existing) = emotions.iter_mut().find(|e| e.name == name) {
        existing.keywords = keywords;
    } else {
        emotions.push(Emotion {
            name: name.to_string(),
            keywords,
        });
    }
    emotions
}
