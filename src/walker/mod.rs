//! Library Walker (4.G): recursive directory enumeration producing video
//! and sidecar sets as canonical absolute paths.

use std::collections::HashSet;
use std::path::{Path, PathBuf};
use walkdir::WalkDir;

pub const VIDEO_EXTENSIONS: &[&str] = &["mkv", "mp4", "avi", "mov", "wmv", "flv", "m4v"];
pub const SIDECAR_EXTENSION: &str = "nfo";

/// The deduplicated result of walking a library root.
#[derive(Debug, Default)]
pub struct WalkResult {
    pub videos: Vec<PathBuf>,
    pub sidecars: Vec<PathBuf>,
}

/// Walk `root` recursively, classifying files by extension. Symlink loops
/// are broken by tracking visited canonical directories; not parallel,
/// since the Pipeline is the bottleneck, not directory I/O.
pub fn walk(root: &Path) -> WalkResult {
    let mut result = WalkResult::default();
    let mut seen_videos = HashSet::new();
    let mut seen_sidecars = HashSet::new();
    let mut visited_real_dirs = HashSet::new();

    for entry in WalkDir::new(root).follow_links(true).into_iter().filter_entry(|entry| {
        if !entry.file_type().is_dir() {
            return true;
        }
        match entry.path().canonicalize() {
            Ok(real) => visited_real_dirs.insert(real),
            Err(_) => true,
        }
    }) {
        let entry = match entry {
            Ok(entry) => entry,
            Err(_) => continue,
        };

        if !entry.file_type().is_file() {
            continue;
        }

        let path = entry.path();
        if is_hidden_or_system(path) {
            continue;
        }

        let Some(ext) = path.extension().map(|e| e.to_string_lossy().to_lowercase()) else {
            continue;
        };

        let canonical = path.canonicalize().unwrap_or_else(|_| path.to_path_buf());

        if VIDEO_EXTENSIONS.contains(&ext.as_str()) {
            if seen_videos.insert(canonical.clone()) {
                result.videos.push(canonical);
            }
        } else if ext == SIDECAR_EXTENSION && seen_sidecars.insert(canonical.clone()) {
            result.sidecars.push(canonical);
        }
    }

    result
}

fn is_hidden_or_system(path: &Path) -> bool {
    path.components().any(|component| {
        let name = component.as_os_str().to_string_lossy();
        name.starts_with('.') || name == "@eaDir"
    })
}
