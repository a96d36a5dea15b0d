//! Directory tree view of a drive.

use comic_core::{Drive, DriveEntry};

use crate::path;

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum NodeKind {
    Directory,
    Svg(DriveEntry),
}

/// One node of the tree built by [`build_tree`]. SVG nodes never have
/// children.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AssetNode {
    pub name: String,
    pub path: String,
    pub kind: NodeKind,
    pub children: Vec<AssetNode>,
}

impl AssetNode {
    fn directory(name: impl Into<String>, path: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            path: path.into(),
            kind: NodeKind::Directory,
            children: Vec::new(),
        }
    }

    pub fn is_dir(&self) -> bool {
        matches!(self.kind, NodeKind::Directory)
    }

    pub fn is_root(&self) -> bool {
        self.path == "/"
    }

    /// The drive entry behind an SVG node.
    pub fn entry(&self) -> Option<&DriveEntry> {
        match &self.kind {
            NodeKind::Svg(entry) => Some(entry),
            NodeKind::Directory => None,
        }
    }

    /// Directory a new item would go into when this node is selected:
    /// the node itself for directories, its parent directory for files.
    pub fn target_dir(&self) -> String {
        if self.is_dir() {
            self.path.clone()
        } else {
            let parent = path::parent(&self.path);
            if parent.is_empty() { "/".to_string() } else { parent.to_string() }
        }
    }

    fn sort_recursive(&mut self) {
        self.children.sort_by(|a, b| {
            a.path
                .to_lowercase()
                .cmp(&b.path.to_lowercase())
                .then_with(|| a.path.cmp(&b.path))
        });
        for child in &mut self.children {
            child.sort_recursive();
        }
    }
}

/// Returns the child directory `name` of `children`, creating it if needed.
fn ensure_dir<'a>(
    children: &'a mut Vec<AssetNode>,
    name: &str,
    full_path: &str,
) -> &'a mut Vec<AssetNode> {
    let idx = match children.iter().position(|c| c.is_dir() && c.name == name) {
        Some(idx) => idx,
        None => {
            children.push(AssetNode::directory(name, full_path));
            children.len() - 1
        }
    };
    &mut children[idx].children
}

/// Walks `segments` from the root, creating directories along the way, and
/// returns the children list of the last one.
fn ensure_dirs<'a>(root: &'a mut AssetNode, segments: &[&str]) -> &'a mut Vec<AssetNode> {
    let mut children = &mut root.children;
    for i in 0..segments.len() {
        let full_path = format!("/{}", segments[..=i].join("/"));
        children = ensure_dir(children, segments[i], &full_path);
    }
    children
}

/// Builds the directory tree of `drive`.
///
/// The root is a directory named after the drive with path `/`. Declared
/// folders are created first, then the directories of every `x` entry.
/// Only entries whose path ends in `.svg` become leaves; other files are
/// hidden but still make their folders appear. Children are ordered by
/// path, ignoring case.
pub fn build_tree(drive: &Drive) -> AssetNode {
    let mut root = AssetNode::directory(drive.name.clone(), "/");

    for folder in &drive.folders {
        let segments = path::segments(folder);
        ensure_dirs(&mut root, &segments);
    }

    for entry in &drive.x {
        let segments = path::segments(&entry.path);
        let Some((file_name, dirs)) = segments.split_last() else {
            log::debug!("skipping drive entry with empty path: {}", entry.sha256);
            continue;
        };
        let children = ensure_dirs(&mut root, dirs);
        if !file_name.ends_with(".svg") {
            continue;
        }
        children.push(AssetNode {
            name: file_name.to_string(),
            path: entry.path.clone(),
            kind: NodeKind::Svg(entry.clone()),
            children: Vec::new(),
        });
    }

    root.sort_recursive();
    root
}

/// Depth-first search for the node at `path`.
pub fn get_node_by_path<'a>(root: &'a AssetNode, path: &str) -> Option<&'a AssetNode> {
    if root.path == path {
        return Some(root);
    }
    root.children.iter().find_map(|c| get_node_by_path(c, path))
}

/// Path of the directory that directly contains the node at `path`.
pub fn find_parent_folder(root: &AssetNode, path: &str) -> Option<String> {
    if root.children.iter().any(|c| c.path == path) {
        return Some(root.path.clone());
    }
    root.children
        .iter()
        .filter(|c| c.is_dir())
        .find_map(|c| find_parent_folder(c, path))
}

struct Frame<'a> {
    prefix: String,
    entries: &'a [AssetNode],
    index: usize,
}

/// Renders the tree with box-drawing branches, one node per line.
pub fn render_tree(root: &AssetNode) -> String {
    let mut out = format!("{}/ [drive]\n", root.name);
    let mut stack = vec![Frame {
        prefix: String::new(),
        entries: &root.children,
        index: 0,
    }];

    while let Some(frame) = stack.last_mut() {
        if frame.index >= frame.entries.len() {
            stack.pop();
            continue;
        }

        let entries = frame.entries;
        let node = &entries[frame.index];
        let is_last = frame.index + 1 == entries.len();
        frame.index += 1;

        let (branch, child_piece) = if is_last {
            ("└── ", "    ")
        } else {
            ("├── ", "│   ")
        };
        let child_prefix = format!("{}{}", frame.prefix, child_piece);
        out.push_str(&frame.prefix);
        out.push_str(branch);

        match &node.kind {
            NodeKind::Directory => {
                out.push_str(&format!("{}/\n", node.name));
                if !node.children.is_empty() {
                    stack.push(Frame {
                        prefix: child_prefix,
                        entries: &node.children,
                        index: 0,
                    });
                }
            }
            NodeKind::Svg(entry) => {
                let short = entry.sha256.get(..8).unwrap_or(&entry.sha256);
                out.push_str(&format!(
                    "{} [size={} sha256={}...]\n",
                    node.name, entry.size, short
                ));
            }
        }
    }

    out
}
