use async_trait::async_trait;
use sidecar_sync::cache::Cache;
use sidecar_sync::config::Config;
use sidecar_sync::context::AppContext;
use sidecar_sync::error::ServerError;
use sidecar_sync::server::{EditFields, MediaItem, MediaServerClient};
use sidecar_sync::supervisor;
use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicU32, Ordering};
use std::sync::{Arc, Mutex};

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
    by_path: Mutex<HashMap<PathBuf, String>>,
    edit_count: AtomicU32,
}

#[async_trait]
impl MediaServerClient for FakeServer {
    async fn find_item_by_file(
        &self,
        abs_path: &Path,
        _library_ids: &[i64],
    ) -> Result<Option<Box<dyn MediaItem>>, ServerError> {
        let map = self.by_path.lock().unwrap();
        Ok(map.get(abs_path).map(|id| {
            Box::new(FakeItem { id: id.clone(), files: vec![abs_path.to_path_buf()] }) as Box<dyn MediaItem>
        }))
    }

    async fn fetch_item(&self, server_id: &str) -> Result<Option<Box<dyn MediaItem>>, ServerError> {
        let map = self.by_path.lock().unwrap();
        Ok(map
            .iter()
            .find(|(_, id)| id.as_str() == server_id)
            .map(|(path, id)| Box::new(FakeItem { id: id.clone(), files: vec![path.clone()] }) as Box<dyn MediaItem>))
    }

    async fn edit_item(&self, _item: &dyn MediaItem, _fields: &EditFields, _title_sort: Option<&str>) -> Result<(), ServerError> {
        self.edit_count.fetch_add(1, Ordering::SeqCst);
        Ok(())
    }

    async fn upload_subtitle(&self, _item: &dyn MediaItem, _path: &Path, _lang: &str) -> Result<(), ServerError> {
        Ok(())
    }
}

#[tokio::test]
async fn one_shot_run_applies_sidecars_and_deletes_them() {
    let dir = tempfile::tempdir().unwrap();
    let library = dir.path().join("library");
    std::fs::create_dir_all(&library).unwrap();

    for i in 0..5 {
        let video = library.join(format!("video{i}.mkv"));
        std::fs::write(&video, b"x").unwrap();
        if i < 3 {
            let sidecar = library.join(format!("video{i}.nfo"));
            std::fs::write(&sidecar, format!("<x><title>Title {i}</title></x>")).unwrap();
        }
    }

    let server = Arc::new(FakeServer::default());
    {
        let mut map = server.by_path.lock().unwrap();
        for i in 0..5 {
            let video = library.join(format!("video{i}.mkv")).canonicalize().unwrap();
            map.insert(video, format!("id-{i}"));
        }
    }

    let cache = Arc::new(Cache::load(&dir.path().join("cache.json")).unwrap());
    let config = Config {
        server_base_url: "http://example.invalid".to_string(),
        server_token: "token".to_string(),
        library_ids: vec![1],
        ..Config::default()
    };

    let ctx = Arc::new(AppContext::new(cache.clone(), server.clone(), config, None, None));
    let summary = supervisor::run_one_shot(ctx, &[library.clone()]).await;

    assert_eq!(summary.videos_seen, 5);
    assert_eq!(summary.sidecars_applied, 3);
    assert_eq!(summary.sidecars_deleted, 3);
    assert_eq!(server.edit_count.load(Ordering::SeqCst), 3);

    for i in 0..3 {
        assert!(!library.join(format!("video{i}.nfo")).exists());
    }
}
