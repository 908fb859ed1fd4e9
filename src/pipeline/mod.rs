//! Apply Pipeline (4.D): per-video reconciliation. Re-expresses the
//! source's exception-driven control flow as a straight-line composition
//! over [`PipelineOutcome`].

use crate::cache::Cache;
use crate::descriptor;
use crate::server::{EditFields, MediaServerClient};
use std::path::Path;

/// The result of a single apply attempt.
#[derive(Debug, PartialEq, Eq)]
pub enum PipelineOutcome {
    /// A server edit was actually issued.
    Applied,
    /// The idempotence gate skipped a would-be edit because the descriptor
    /// hash hadn't changed; the sidecar may still have been removed per
    /// policy, but no server call was made.
    CacheHit,
    /// No sidecar, or resolution failed in one-shot mode (placeholder
    /// recorded; repair will retry).
    Deferred,
    /// No sidecar present; nothing to do, no placeholder recorded.
    NothingToDo,
    /// A definitive per-attempt failure: descriptor error, resolution miss
    /// in watch mode, or a rejected edit.
    Failed,
}

/// Policy knobs the Supervisor threads through explicitly rather than via
/// global state.
#[derive(Debug, Clone, Copy)]
pub struct ApplyPolicy {
    pub always_apply: bool,
    pub delete_sidecar_on_apply: bool,
    /// One-shot mode records an id-less placeholder on resolution miss
    /// instead of failing; watch mode fails to drive a retry.
    pub one_shot: bool,
}

/// Run the 10-step apply algorithm for video `video_path` with sidecar
/// `sidecar_path` (which may not exist).
pub async fn apply(
    cache: &Cache,
    server: &dyn MediaServerClient,
    library_ids: &[i64],
    video_path: &Path,
    sidecar_path: &Path,
    policy: ApplyPolicy,
) -> PipelineOutcome {
    let video_path = canonicalize_best_effort(video_path);

    if !sidecar_exists_and_nonempty(sidecar_path) {
        return PipelineOutcome::NothingToDo;
    }
    let sidecar_path = canonicalize_best_effort(sidecar_path);

    let (fields, hash) = match descriptor::read(&sidecar_path) {
        Ok(result) => result,
        Err(err) => {
            tracing::warn!(path = %sidecar_path.display(), error = %err, "descriptor read/parse failed");
            return PipelineOutcome::Failed;
        }
    };

    let cached = cache.get(&video_path);

    if !policy.always_apply && cached.descriptor_hash.as_deref() == Some(hash.as_str()) {
        tracing::info!(path = %video_path.display(), "cache hit, skipping apply");
        if policy.delete_sidecar_on_apply {
            best_effort_delete(&sidecar_path);
        }
        return PipelineOutcome::CacheHit;
    }

    let item = match resolve_item(cache, server, library_ids, &video_path, &cached, policy.one_shot).await {
        ResolveResult::Found(item) => item,
        ResolveResult::Deferred => return PipelineOutcome::Deferred,
        ResolveResult::Failed => return PipelineOutcome::Failed,
    };

    let edit_fields = EditFields {
        title: fields.title.clone(),
        summary: fields.summary.clone(),
        aired: fields.aired.clone(),
    };

    if let Err(err) = server
        .edit_item(item.as_ref(), &edit_fields, fields.title_sort.as_deref())
        .await
    {
        tracing::warn!(path = %video_path.display(), error = %err, "edit_item failed");
        return PipelineOutcome::Failed;
    }

    cache.update(&video_path, Some(item.id().to_string()), Some(hash));

    if policy.delete_sidecar_on_apply {
        best_effort_delete(&sidecar_path);
    }

    tracing::info!(path = %video_path.display(), server_id = item.id(), "sidecar applied");
    PipelineOutcome::Applied
}

enum ResolveResult {
    Found(Box<dyn crate::server::MediaItem>),
    Deferred,
    Failed,
}

async fn resolve_item(
    cache: &Cache,
    server: &dyn MediaServerClient,
    library_ids: &[i64],
    video_path: &Path,
    cached: &crate::cache::CacheEntry,
    one_shot: bool,
) -> ResolveResult {
    if let Some(server_id) = &cached.server_id {
        match server.fetch_item(server_id).await {
            Ok(Some(item)) => return ResolveResult::Found(item),
            Ok(None) => {}
            Err(err) => {
                tracing::warn!(path = %video_path.display(), error = %err, "fetch_item failed");
            }
        }
    }

    match server.find_item_by_file(video_path, library_ids).await {
        Ok(Some(item)) => {
            cache.update(video_path, Some(item.id().to_string()), None);
            return ResolveResult::Found(item);
        }
        Ok(None) => {}
        Err(err) => {
            tracing::warn!(path = %video_path.display(), error = %err, "find_item_by_file failed");
        }
    }

    if one_shot {
        cache.update(video_path, Some(String::new()), None);
        ResolveResult::Deferred
    } else {
        ResolveResult::Failed
    }
}

fn sidecar_exists_and_nonempty(path: &Path) -> bool {
    match std::fs::metadata(path) {
        Ok(meta) => meta.is_file() && meta.len() > 0,
        Err(_) => false,
    }
}

fn canonicalize_best_effort(path: &Path) -> std::path::PathBuf {
    path.canonicalize().unwrap_or_else(|_| path.to_path_buf())
}

fn best_effort_delete(path: &Path) {
    if let Err(err) = std::fs::remove_file(path) {
        tracing::warn!(path = %path.display(), error = %err, "failed to delete sidecar after apply");
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::server::MediaItem;
    use async_trait::async_trait;
    use std::collections::HashMap;
    use std::path::PathBuf;
    use std::sync::Mutex;

    struct FakeItem {
        id: String,
        files: Vec<PathBuf>,
    }

    #[async_trait]
    impl MediaItem for FakeItem {
        fn id(&self) -> &str {
            &self.id
        }
        fn files(&self) -> Vec<PathBuf> {
            self.files.clone()
        }
    }

    #[derive(Default)]
    struct FakeServer {
        items_by_file: Mutex<HashMap<PathBuf, String>>,
        edits: Mutex<u32>,
    }

    #[async_trait]
    impl MediaServerClient for FakeServer {
        async fn find_item_by_file(
            &self,
            abs_path: &Path,
            _library_ids: &[i64],
        ) -> Result<Option<Box<dyn MediaItem>>, crate::error::ServerError> {
            let map = self.items_by_file.lock().unwrap();
            Ok(map.get(abs_path).map(|id| {
                Box::new(FakeItem {
                    id: id.clone(),
                    files: vec![abs_path.to_path_buf()],
                }) as Box<dyn MediaItem>
            }))
        }

        async fn fetch_item(
            &self,
            server_id: &str,
        ) -> Result<Option<Box<dyn MediaItem>>, crate::error::ServerError> {
            let map = self.items_by_file.lock().unwrap();
            if map.values().any(|v| v == server_id) {
                Ok(Some(Box::new(FakeItem {
                    id: server_id.to_string(),
                    files: vec![],
                })))
            } else {
                Ok(None)
            }
        }

        async fn edit_item(
            &self,
            _item: &dyn MediaItem,
            _fields: &EditFields,
            _title_sort: Option<&str>,
        ) -> Result<(), crate::error::ServerError> {
            *self.edits.lock().unwrap() += 1;
            Ok(())
        }

        async fn upload_subtitle(
            &self,
            _item: &dyn MediaItem,
            _path: &Path,
            _lang: &str,
        ) -> Result<(), crate::error::ServerError> {
            Ok(())
        }
    }

    fn policy(one_shot: bool) -> ApplyPolicy {
        ApplyPolicy {
            always_apply: false,
            delete_sidecar_on_apply: true,
            one_shot,
        }
    }

    #[tokio::test]
    async fn missing_sidecar_is_nothing_to_do() {
        let dir = tempfile::tempdir().unwrap();
        let cache = Cache::load(&dir.path().join("cache.json")).unwrap();
        let server = FakeServer::default();
        let video = dir.path().join("a.mkv");
        std::fs::write(&video, b"x").unwrap();

        let outcome = apply(&cache, &server, &[1], &video, &dir.path().join("a.nfo"), policy(true)).await;
        assert_eq!(outcome, PipelineOutcome::NothingToDo);
    }

    #[tokio::test]
    async fn empty_sidecar_is_nothing_to_do() {
        let dir = tempfile::tempdir().unwrap();
        let cache = Cache::load(&dir.path().join("cache.json")).unwrap();
        let server = FakeServer::default();
        let video = dir.path().join("a.mkv");
        let sidecar = dir.path().join("a.nfo");
        std::fs::write(&video, b"x").unwrap();
        std::fs::write(&sidecar, b"").unwrap();

        let outcome = apply(&cache, &server, &[1], &video, &sidecar, policy(true)).await;
        assert_eq!(outcome, PipelineOutcome::NothingToDo);
    }

    #[tokio::test]
    async fn applies_and_deletes_sidecar_on_success() {
        let dir = tempfile::tempdir().unwrap();
        let cache = Cache::load(&dir.path().join("cache.json")).unwrap();
        let server = FakeServer::default();
        let video = dir.path().join("a.mkv");
        let sidecar = dir.path().join("a.nfo");
        std::fs::write(&video, b"x").unwrap();
        std::fs::write(&sidecar, "<x><title>T</title></x>").unwrap();

        server
            .items_by_file
            .lock()
            .unwrap()
            .insert(video.canonicalize().unwrap(), "42".to_string());

        let outcome = apply(&cache, &server, &[1], &video, &sidecar, policy(true)).await;
        assert_eq!(outcome, PipelineOutcome::Applied);
        assert!(!sidecar.exists());
        assert_eq!(*server.edits.lock().unwrap(), 1);

        let entry = cache.get(&video.canonicalize().unwrap());
        assert_eq!(entry.server_id.as_deref(), Some("42"));
        assert!(entry.descriptor_hash.is_some());
    }

    #[tokio::test]
    async fn idempotence_gate_short_circuits_second_apply() {
        let dir = tempfile::tempdir().unwrap();
        let cache = Cache::load(&dir.path().join("cache.json")).unwrap();
        let server = FakeServer::default();
        std::fs::write(dir.path().join("a.mkv"), b"x").unwrap();
        let video = dir.path().join("a.mkv").canonicalize().unwrap();
        let sidecar = dir.path().join("a.nfo");
        std::fs::write(&sidecar, "<x><title>T</title></x>").unwrap();

        server.items_by_file.lock().unwrap().insert(video.clone(), "42".to_string());

        let _ = apply(&cache, &server, &[1], &video, &sidecar, policy(true)).await;
        assert_eq!(*server.edits.lock().unwrap(), 1);

        // Re-create an identical sidecar (apply deleted the first one).
        std::fs::write(&sidecar, "<x><title>T</title></x>").unwrap();
        let outcome = apply(&cache, &server, &[1], &video, &sidecar, policy(true)).await;
        assert_eq!(outcome, PipelineOutcome::CacheHit);
        assert_eq!(*server.edits.lock().unwrap(), 1, "second apply must not re-edit");
    }

    #[tokio::test]
    async fn one_shot_resolution_miss_is_deferred_with_placeholder() {
        let dir = tempfile::tempdir().unwrap();
        let cache = Cache::load(&dir.path().join("cache.json")).unwrap();
        let server = FakeServer::default();
        let video = dir.path().join("a.mkv");
        std::fs::write(&video, b"x").unwrap();
        let sidecar = dir.path().join("a.nfo");
        std::fs::write(&sidecar, "<x><title>T</title></x>").unwrap();

        let outcome = apply(&cache, &server, &[1], &video, &sidecar, policy(true)).await;
        assert_eq!(outcome, PipelineOutcome::Deferred);

        let entry = cache.get(&video.canonicalize().unwrap());
        assert_eq!(entry.server_id.as_deref(), Some(""));
    }

    #[tokio::test]
    async fn watch_mode_resolution_miss_fails_to_drive_retry() {
        let dir = tempfile::tempdir().unwrap();
        let cache = Cache::load(&dir.path().join("cache.json")).unwrap();
        let server = FakeServer::default();
        let video = dir.path().join("a.mkv");
        std::fs::write(&video, b"x").unwrap();
        let sidecar = dir.path().join("a.nfo");
        std::fs::write(&sidecar, "<x><title>T</title></x>").unwrap();

        let outcome = apply(&cache, &server, &[1], &video, &sidecar, policy(false)).await;
        assert_eq!(outcome, PipelineOutcome::Failed);
    }
}
