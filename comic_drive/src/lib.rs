//! Virtual filesystem overlay for Blossom drives.
//!
//! A drive stores its contents as two flat tag lists: `x` entries (a blob
//! hash plus a slash-separated path) and `folder` entries for directories
//! that have no files yet. This crate turns those lists into a directory
//! tree ([`tree`]) and implements the file-explorer edits on top of it
//! ([`edit`]). Every edit is a pure function from a drive to an updated
//! drive; publishing the result is the caller's job.

pub mod edit;
pub mod path;
pub mod tree;

pub use edit::{DriveUpdate, EditError};
pub use tree::{AssetNode, build_tree, find_parent_folder, get_node_by_path, render_tree};

/// Mime type given to every asset the editor creates.
pub const SVG_MIME: &str = "image/svg+xml";
