//! File collection: turns the `uploads` setting into an [`UploadGroup`].
//!
//! Items are stored in an arena and addressed by [`ItemId`], so upload workers can be handed
//! owned jobs and their results written back to the exact item afterwards.

use std::collections::{BTreeMap, HashSet};
use std::path::{Component, Path, PathBuf};

use tracing::{debug, error, info};
use walkdir::WalkDir;

/// Replacement for `..` segments in object keys.
const PARENT_TOKEN: &str = "up";

/// Stable handle of an item inside an [`UploadGroup`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct ItemId(usize);

/// One file queued for upload.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct UploadItem {
    /// File name shown in the comment.
    pub name: String,
    /// Cleaned local path.
    pub path: PathBuf,
    /// Object store key derived from `path`.
    pub key: String,
    /// Public URL, set once the upload succeeded.
    pub url: Option<String>,
}

impl UploadItem {
    /// Public URL, if the upload succeeded.
    pub fn public_url(&self) -> Option<&str> {
        self.url.as_deref()
    }
}

/// Items of one origin directory, in collection order.
#[derive(Debug)]
pub struct UploadDir<'a> {
    pub dir: &'a str,
    pub items: Vec<&'a UploadItem>,
}

/// All collected items, partitioned by the directory of their source path.
#[derive(Debug, Default, Clone)]
pub struct UploadGroup {
    items: Vec<UploadItem>,
    dirs: BTreeMap<String, Vec<ItemId>>,
    seen: HashSet<PathBuf>,
}

impl UploadGroup {
    pub fn new() -> Self {
        Self::default()
    }

    /// Add the file at `path` (already cleaned). Returns `None` if it was collected before.
    pub fn insert(&mut self, path: PathBuf) -> Option<ItemId> {
        if !self.seen.insert(path.clone()) {
            debug!(path = %path.display(), "Skipping file collected twice");
            return None;
        }
        let id = ItemId(self.items.len());
        let dir = dir_key(&path);
        let name = path
            .file_name()
            .map(|n| n.to_string_lossy().into_owned())
            .unwrap_or_default();
        let key = object_key(&path);
        self.items.push(UploadItem {
            name,
            path,
            key,
            url: None,
        });
        self.dirs.entry(dir).or_default().push(id);
        Some(id)
    }

    pub fn len(&self) -> usize {
        self.items.len()
    }

    pub fn is_empty(&self) -> bool {
        self.items.is_empty()
    }

    pub fn get(&self, id: ItemId) -> Option<&UploadItem> {
        self.items.get(id.0)
    }

    /// Record the public URL of an uploaded item.
    pub fn set_url(&mut self, id: ItemId, url: String) {
        if let Some(item) = self.items.get_mut(id.0) {
            item.url = Some(url);
        }
    }

    /// Every item with its handle, directory by directory.
    pub fn iter(&self) -> impl Iterator<Item = (ItemId, &UploadItem)> + '_ {
        self.dirs
            .values()
            .flatten()
            .map(move |id| (*id, &self.items[id.0]))
    }

    /// The directory listing used by the comment template.
    pub fn groups(&self) -> Vec<UploadDir<'_>> {
        self.dirs
            .iter()
            .map(|(dir, ids)| UploadDir {
                dir: dir.as_str(),
                items: ids.iter().map(|id| &self.items[id.0]).collect(),
            })
            .collect()
    }

    /// Number of items that carry a URL.
    pub fn uploaded(&self) -> usize {
        self.items.iter().filter(|item| item.url.is_some()).count()
    }
}

/// Expand a comma separated list of files and directories into an [`UploadGroup`].
///
/// Entries that cannot be stat'ed are logged and skipped. Directories are walked recursively
/// and only regular files are kept. A file is only kept if it can be opened for reading, so an
/// unreadable file is reported here rather than as a failed upload.
pub fn collect(raw: &str) -> UploadGroup {
    let mut group = UploadGroup::new();

    for entry in raw.split(',') {
        let entry = entry.trim();
        if entry.is_empty() {
            continue;
        }
        let clean = clean_path(Path::new(entry));
        let meta = match std::fs::metadata(&clean) {
            Ok(meta) => meta,
            Err(e) => {
                error!(path = %clean.display(), error = %e, "Failed to stat upload path, skipping");
                continue;
            }
        };

        if meta.is_dir() {
            collect_dir(&clean, &mut group);
        } else if meta.is_file() {
            insert_readable(clean, &mut group);
        } else {
            debug!(path = %clean.display(), "Skipping upload path that is not a regular file");
        }
    }

    info!(files = group.len(), "Collected upload files");
    group
}

fn collect_dir(root: &Path, group: &mut UploadGroup) {
    for entry in WalkDir::new(root).follow_links(false) {
        let entry = match entry {
            Ok(entry) => entry,
            Err(e) => {
                error!(path = %root.display(), error = %e, "Error walking upload directory");
                continue;
            }
        };
        if !entry.file_type().is_file() {
            continue;
        }
        insert_readable(clean_path(entry.path()), group);
    }
}

fn insert_readable(path: PathBuf, group: &mut UploadGroup) {
    match std::fs::File::open(&path) {
        Ok(_) => {
            group.insert(path);
        }
        Err(e) => {
            error!(path = %path.display(), error = %e, "Failed to open upload file, skipping");
        }
    }
}

/// Lexically clean a path: drop `.` segments and redundant separators, keep `..` segments.
pub fn clean_path(path: &Path) -> PathBuf {
    let cleaned: PathBuf = path
        .components()
        .filter(|c| !matches!(c, Component::CurDir))
        .collect();
    if cleaned.as_os_str().is_empty() {
        PathBuf::from(".")
    } else {
        cleaned
    }
}

/// Object key for a cleaned path: `..` segments become `up`, the leading separator is dropped
/// and segments are joined with `/`.
pub fn object_key(path: &Path) -> String {
    path.components()
        .filter_map(|c| match c {
            Component::RootDir | Component::CurDir => None,
            Component::ParentDir => Some(PARENT_TOKEN.to_string()),
            Component::Prefix(prefix) => Some(
                prefix
                    .as_os_str()
                    .to_string_lossy()
                    .trim_end_matches(':')
                    .to_string(),
            ),
            Component::Normal(segment) => Some(segment.to_string_lossy().into_owned()),
        })
        .collect::<Vec<_>>()
        .join("/")
}

/// Grouping key: the directory portion of a cleaned path.
fn dir_key(path: &Path) -> String {
    match path.parent() {
        Some(parent) if !parent.as_os_str().is_empty() => parent.display().to_string(),
        _ => ".".to_string(),
    }
}
