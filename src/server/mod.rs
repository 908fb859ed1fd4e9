//! Media Server Client (4.B): rate-limited, retrying HTTP wrapper around
//! item lookup, field edit, and subtitle upload.
//!
//! The source's dynamic attribute-name probing (multiple candidate field
//! names tried in sequence to reach an item's file list) abstracts here to
//! a single capability: [`MediaItem::files`].

pub mod plex;

use crate::error::ServerError;
use async_trait::async_trait;
use std::path::{Path, PathBuf};

/// A subset of server-item fields the Apply Pipeline can edit, each
/// additionally locked against future agent overwrites when present.
#[derive(Debug, Clone, Default)]
pub struct EditFields {
    pub title: Option<String>,
    pub summary: Option<String>,
    pub aired: Option<String>,
}

impl EditFields {
    pub fn is_empty(&self) -> bool {
        self.title.is_none() && self.summary.is_none() && self.aired.is_none()
    }
}

/// A server item's view relevant to the Pipeline: its opaque id and the
/// absolute file paths backing it.
#[async_trait]
pub trait MediaItem: Send + Sync {
    fn id(&self) -> &str;
    fn files(&self) -> Vec<PathBuf>;
}

/// The media-server API surface the Pipeline depends on. Implementations
/// own their own HTTP session, concurrency bound, and pacing.
#[async_trait]
pub trait MediaServerClient: Send + Sync {
    /// Search each library id's episode/movie-typed items (or a generic
    /// fallback) for one whose file list contains `abs_path`.
    async fn find_item_by_file(
        &self,
        abs_path: &Path,
        library_ids: &[i64],
    ) -> Result<Option<Box<dyn MediaItem>>, ServerError>;

    /// Direct id lookup. Returns `None` on 404 or lookup error.
    async fn fetch_item(&self, server_id: &str) -> Result<Option<Box<dyn MediaItem>>, ServerError>;

    /// Batch-apply `fields`, locking every field supplied, then the
    /// sort-title if present (dedicated setter, falling back to the
    /// generic edit path). Reloads to confirm.
    async fn edit_item(
        &self,
        item: &dyn MediaItem,
        fields: &EditFields,
        title_sort: Option<&str>,
    ) -> Result<(), ServerError>;

    /// Optional subtitle side path (§6).
    async fn upload_subtitle(
        &self,
        item: &dyn MediaItem,
        path: &Path,
        lang: &str,
    ) -> Result<(), ServerError>;
}
