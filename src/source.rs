//! Reads bookmarks out of a Chromium `Bookmarks` file.
//!
//! The file is a JSON tree. Every node is either a folder (`name`,
//! `children`) or a link (`name`, `url`); the top object keeps one node per
//! root under `roots`.

use std::collections::HashMap;
use std::path::{Path, PathBuf};

use homedir::my_home;
use serde::Deserialize;

use crate::bookmarks::BookmarkRecord;

/// Roots walked by [`read_bookmarks`], in this order.
pub const DEFAULT_ROOTS: [&str; 3] = ["bookmark_bar", "other", "synced"];

#[derive(Debug, thiserror::Error)]
pub enum SourceError {
    #[error("bookmarks file not found at {}. Set BOOKMARKS_PATH to the correct location", .0.display())]
    NotFound(PathBuf),

    #[error("could not determine home directory; set BOOKMARKS_PATH explicitly")]
    NoHomeDir,

    #[error("io error: {0}")]
    Io(#[from] std::io::Error),

    #[error("malformed bookmarks file: {0}")]
    Parse(#[from] serde_json::Error),
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct BookmarkNode {
    #[serde(default)]
    pub name: String,
    #[serde(default)]
    pub url: Option<String>,
    #[serde(default)]
    pub children: Option<Vec<BookmarkNode>>,
}

#[derive(Debug, Default, Deserialize)]
struct BookmarkFile {
    #[serde(default)]
    roots: HashMap<String, serde_json::Value>,
}

/// Flatten a list of nodes into records, depth-first in source order.
///
/// Folder paths are built as `parent_folder + "/" + name`, so links directly
/// under a root get an empty folder and nested ones get `/A/B`.
pub fn extract_bookmarks(nodes: &[BookmarkNode], parent_folder: &str) -> Vec<BookmarkRecord> {
    let mut extracted = vec![];
    walk(nodes, parent_folder, &mut extracted);
    extracted
}

fn walk(nodes: &[BookmarkNode], parent_folder: &str, out: &mut Vec<BookmarkRecord>) {
    for node in nodes {
        if let Some(children) = &node.children {
            let folder = format!("{parent_folder}/{}", node.name);
            walk(children, &folder, out);
        } else if let Some(url) = &node.url {
            out.push(BookmarkRecord::new(parent_folder, node.name.clone(), url.clone()));
        }
    }
}

/// Parse the contents of a bookmarks file and flatten the default roots.
pub fn parse_bookmarks(data: &str) -> Result<Vec<BookmarkRecord>, SourceError> {
    let file: BookmarkFile = serde_json::from_str(data)?;

    let mut records = vec![];
    for root in DEFAULT_ROOTS {
        let Some(value) = file.roots.get(root) else {
            continue;
        };
        let node = BookmarkNode::deserialize(value)?;
        if let Some(children) = &node.children {
            records.extend(extract_bookmarks(children, ""));
        }
    }

    Ok(records)
}

/// Read and flatten the bookmarks file at `path`.
pub fn read_bookmarks(path: &Path) -> Result<Vec<BookmarkRecord>, SourceError> {
    log::info!("Reading bookmarks from {}", path.display());

    let data = match std::fs::read_to_string(path) {
        Ok(data) => data,
        Err(err) if err.kind() == std::io::ErrorKind::NotFound => {
            return Err(SourceError::NotFound(path.to_path_buf()))
        }
        Err(err) => return Err(err.into()),
    };

    let records = parse_bookmarks(&data)?;
    log::info!("Extracted {} bookmarks", records.len());

    Ok(records)
}

/// Resolve the bookmarks file location.
///
/// An explicit override wins (a leading `~` is expanded), otherwise the
/// Chrome default profile location for the current OS is used.
pub fn resolve_bookmarks_path(override_path: Option<&Path>) -> Result<PathBuf, SourceError> {
    match override_path {
        Some(path) => expand_home(path),
        None => default_bookmarks_path(),
    }
}

/// Existing bookmarks file, or [`SourceError::NotFound`].
pub fn locate_bookmarks(override_path: Option<&Path>) -> Result<PathBuf, SourceError> {
    let path = resolve_bookmarks_path(override_path)?;
    if !path.is_file() {
        return Err(SourceError::NotFound(path));
    }
    Ok(path)
}

#[cfg(target_os = "windows")]
pub fn default_bookmarks_path() -> Result<PathBuf, SourceError> {
    let base = match std::env::var_os("USERPROFILE") {
        Some(profile) => PathBuf::from(profile),
        None => home_dir()?,
    };
    Ok(base
        .join("AppData")
        .join("Local")
        .join("Google")
        .join("Chrome")
        .join("User Data")
        .join("Default")
        .join("Bookmarks"))
}

#[cfg(target_os = "macos")]
pub fn default_bookmarks_path() -> Result<PathBuf, SourceError> {
    Ok(home_dir()?
        .join("Library")
        .join("Application Support")
        .join("Google")
        .join("Chrome")
        .join("Default")
        .join("Bookmarks"))
}

#[cfg(not(any(target_os = "windows", target_os = "macos")))]
pub fn default_bookmarks_path() -> Result<PathBuf, SourceError> {
    Ok(home_dir()?
        .join(".config")
        .join("google-chrome")
        .join("Default")
        .join("Bookmarks"))
}

fn home_dir() -> Result<PathBuf, SourceError> {
    my_home().ok().flatten().ok_or(SourceError::NoHomeDir)
}

fn expand_home(path: &Path) -> Result<PathBuf, SourceError> {
    match path.strip_prefix("~") {
        Ok(rest) => Ok(home_dir()?.join(rest)),
        Err(_) => Ok(path.to_path_buf()),
    }
}
