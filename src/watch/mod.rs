//! Event Intake & Retry Engine (4.F): debounced filesystem-event
//! consumer, per-path exponential-backoff retry, repair scheduling.

pub mod repair;
pub mod retry;

use crate::context::AppContext;
use crate::pipeline::{self, ApplyPolicy, PipelineOutcome};
use crate::subtitles;
use crate::walker::{self, SIDECAR_EXTENSION, VIDEO_EXTENSIONS};
use anyhow::{Context, Result};
use notify::{Event, EventKind, RecommendedWatcher, RecursiveMode, Watcher};
use retry::{Debouncer, Kind, RetryQueue};
use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex};
use std::time::Duration;
use tokio::sync::mpsc;

/// Shared, explicitly constructed state for the watch-mode subsystem —
/// the source's process-wide event-handler global becomes this value,
/// built once by the Supervisor.
pub struct EventIntake {
    ctx: Arc<AppContext>,
    debounce_delay: Duration,
    delay_after_new_file: Duration,
    debouncer: Mutex<Debouncer>,
    retry_queue: Mutex<RetryQueue>,
    _watcher: Mutex<Option<RecommendedWatcher>>,
}

impl EventIntake {
    pub fn new(ctx: Arc<AppContext>, debounce_delay: Duration, delay_after_new_file: Duration) -> Self {
        Self {
            ctx,
            debounce_delay,
            delay_after_new_file,
            debouncer: Mutex::new(Debouncer::new()),
            retry_queue: Mutex::new(RetryQueue::new()),
            _watcher: Mutex::new(None),
        }
    }

    /// Start observers on every root and the single consumer task. Returns
    /// once watching is established; the consumer loop runs until
    /// `cancel` fires.
    pub fn start(
        self: &Arc<Self>,
        roots: &[PathBuf],
        cancel: tokio::sync::watch::Receiver<bool>,
    ) -> Result<()> {
        let (event_tx, event_rx) = mpsc::channel::<notify::Result<Event>>(256);

        let mut watcher = RecommendedWatcher::new(
            move |res: notify::Result<Event>| {
                let _ = event_tx.blocking_send(res);
            },
            notify::Config::default(),
        )
        .context("failed to create file watcher")?;

        for root in roots {
            if root.exists() {
                watcher
                    .watch(root, RecursiveMode::Recursive)
                    .with_context(|| format!("failed to watch {}", root.display()))?;
                tracing::info!(root = %root.display(), "watching directory");
            } else {
                tracing::warn!(root = %root.display(), "watch root does not exist");
            }
        }

        *self._watcher.lock().expect("watcher mutex poisoned") = Some(watcher);

        tokio::spawn(Arc::clone(self).consume_fs_events(event_rx));
        tokio::spawn(Arc::clone(self).run_consumer_loop(cancel));

        Ok(())
    }

    async fn consume_fs_events(self: Arc<Self>, mut event_rx: mpsc::Receiver<notify::Result<Event>>) {
        while let Some(result) = event_rx.recv().await {
            match result {
                Ok(event) => self.handle_fs_event(event),
                Err(err) => tracing::warn!(error = %err, "watcher error"),
            }
        }
    }

    fn handle_fs_event(&self, event: Event) {
        match event.kind {
            EventKind::Remove(_) => {
                for path in &event.paths {
                    self.on_removed(path);
                }
            }
            EventKind::Create(_) | EventKind::Modify(_) => {
                for path in &event.paths {
                    self.on_created_or_modified(path);
                }
            }
            _ => {}
        }
    }

    fn on_removed(&self, path: &Path) {
        self.ctx.cache.remove(path);
        self.retry_queue.lock().expect("retry mutex poisoned").remove(path);
    }

    fn on_created_or_modified(&self, path: &Path) {
        if is_ignored(path) {
            return;
        }

        if path.is_dir() {
            let result = walker::walk(path);
            for video in result.videos {
                self.enqueue(video, Kind::Video);
            }
            for sidecar in result.sidecars {
                self.enqueue(sidecar, Kind::Sidecar);
            }
            return;
        }

        let Some(kind) = classify(path) else { return };

        if !self
            .debouncer
            .lock()
            .expect("debounce mutex poisoned")
            .should_proceed(path, self.debounce_delay)
        {
            return;
        }

        self.enqueue(path.to_path_buf(), kind);
    }

    fn enqueue(&self, path: PathBuf, kind: Kind) {
        self.retry_queue.lock().expect("retry mutex poisoned").enqueue(path, kind);
    }

    /// The single-threaded consumer: wakes every second, drains ready
    /// entries, dispatches each through the Apply Pipeline, and
    /// reschedules failures at doubled delay.
    async fn run_consumer_loop(self: Arc<Self>, mut cancel: tokio::sync::watch::Receiver<bool>) {
        let mut ticker = tokio::time::interval(Duration::from_secs(1));

        loop {
            tokio::select! {
                _ = ticker.tick() => {
                    self.process_ready_batch().await;
                }
                _ = cancel.changed() => {
                    if *cancel.borrow() {
                        tracing::info!("event intake consumer stopping");
                        return;
                    }
                }
            }
        }
    }

    async fn process_ready_batch(&self) {
        let ready = {
            let mut queue = self.retry_queue.lock().expect("retry mutex poisoned");
            queue.drain_ready(std::time::Instant::now())
        };

        if ready.is_empty() {
            return;
        }

        for (path, item) in ready {
            if !path.exists() {
                self.ctx.cache.remove(&path);
                continue;
            }

            let (video_path, sidecar_path) = match item.kind {
                Kind::Video => (path.clone(), path.with_extension(SIDECAR_EXTENSION)),
                Kind::Sidecar => match companion_video(&path) {
                    Some(video) => (video, path.clone()),
                    None => {
                        self.reschedule_or_drop(path, item);
                        continue;
                    }
                },
            };

            let policy = ApplyPolicy {
                always_apply: self.ctx.config.always_apply_nfo,
                delete_sidecar_on_apply: self.ctx.config.delete_nfo_after_apply,
                one_shot: false,
            };

            let outcome = pipeline::apply(
                &self.ctx.cache,
                self.ctx.server.as_ref(),
                &self.ctx.config.library_ids,
                &video_path,
                &sidecar_path,
                policy,
            )
            .await;

            match outcome {
                PipelineOutcome::Applied => {
                    subtitles::maybe_process(&self.ctx, &video_path).await;
                }
                PipelineOutcome::CacheHit | PipelineOutcome::NothingToDo => {}
                PipelineOutcome::Deferred | PipelineOutcome::Failed => {
                    self.schedule_bonus_repair();
                    self.reschedule_or_drop(path, item);
                    continue;
                }
            }
        }

        self.ctx.cache.flush();
    }

    fn reschedule_or_drop(&self, path: PathBuf, item: retry::RetryItem) {
        let mut queue = self.retry_queue.lock().expect("retry mutex poisoned");
        if !queue.reschedule_after_failure(path.clone(), item) {
            tracing::warn!(path = %path.display(), "max retry attempts reached, dropping");
        }
    }

    fn schedule_bonus_repair(&self) {
        repair::spawn_bonus_repair(
            self.ctx.cache.clone(),
            self.ctx.server.clone(),
            self.ctx.config.library_ids.clone(),
            self.delay_after_new_file,
        );
    }
}

fn classify(path: &Path) -> Option<Kind> {
    let ext = path.extension()?.to_string_lossy().to_lowercase();
    if VIDEO_EXTENSIONS.contains(&ext.as_str()) {
        Some(Kind::Video)
    } else if ext == SIDECAR_EXTENSION {
        Some(Kind::Sidecar)
    } else {
        None
    }
}

fn is_ignored(path: &Path) -> bool {
    path.components().any(|component| {
        let name = component.as_os_str().to_string_lossy();
        name.starts_with('.') || name == "@eaDir"
    })
}

/// The companion video for a sidecar: same stem, first extant extension
/// across the video-extension list in order.
fn companion_video(sidecar_path: &Path) -> Option<PathBuf> {
    for ext in VIDEO_EXTENSIONS {
        let candidate = sidecar_path.with_extension(ext);
        if candidate.exists() {
            return Some(candidate);
        }
    }
    None
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn classifies_video_and_sidecar_extensions() {
        assert_eq!(classify(Path::new("/a.mkv")), Some(Kind::Video));
        assert_eq!(classify(Path::new("/a.nfo")), Some(Kind::Sidecar));
        assert_eq!(classify(Path::new("/a.txt")), None);
    }

    #[test]
    fn ignores_hidden_and_system_paths() {
        assert!(is_ignored(Path::new("/media/.hidden/a.mkv")));
        assert!(is_ignored(Path::new("/media/@eaDir/a.mkv")));
        assert!(!is_ignored(Path::new("/media/show/a.mkv")));
    }

    #[test]
    fn companion_video_picks_first_extant_extension() {
        let dir = tempfile::tempdir().unwrap();
        let sidecar = dir.path().join("a.nfo");
        std::fs::write(&sidecar, b"x").unwrap();
        assert_eq!(companion_video(&sidecar), None);

        let video = dir.path().join("a.mp4");
        std::fs::write(&video, b"x").unwrap();
        assert_eq!(companion_video(&sidecar), Some(video));
    }
}
