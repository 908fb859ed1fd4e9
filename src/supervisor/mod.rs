//! Supervisor (4.H): lifecycle — mode selection, periodic cache flush,
//! repair tick, graceful shutdown.

use crate::context::AppContext;
use crate::pipeline::{self, ApplyPolicy};
use crate::subtitles;
use crate::walker;
use crate::watch::{repair, EventIntake};
use crate::workers::{self, Task, TaskKind};
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

const CACHE_FLUSH_INTERVAL: Duration = Duration::from_secs(60);

pub struct RunSummary {
    pub videos_seen: usize,
    pub items_resolved: usize,
    pub sidecars_applied: usize,
    pub sidecars_deleted: usize,
}

/// One-shot mode: Walker → Pool full run → final flush → exit.
pub async fn run_one_shot(ctx: Arc<AppContext>, roots: &[PathBuf]) -> RunSummary {
    let config = &ctx.config;
    let cache = ctx.cache.clone();
    let server = ctx.server.clone();

    let mut videos = Vec::new();
    let mut orphan_sidecars = Vec::new();

    for root in roots {
        let result = walker::walk(root);
        let video_set: std::collections::HashSet<_> = result
            .videos
            .iter()
            .map(|v| v.with_extension(walker::SIDECAR_EXTENSION))
            .collect();

        for sidecar in &result.sidecars {
            if !video_set.contains(sidecar) {
                orphan_sidecars.push(sidecar.clone());
            }
        }
        videos.extend(result.videos);
    }

    let videos_seen = videos.len();

    let mut tasks: Vec<Task> = videos
        .into_iter()
        .map(|path| Task { kind: TaskKind::Video, path })
        .collect();
    tasks.extend(orphan_sidecars.into_iter().map(|path| Task { kind: TaskKind::Sidecar, path }));

    let policy = ApplyPolicy {
        always_apply: config.always_apply_nfo,
        delete_sidecar_on_apply: config.delete_nfo_after_apply,
        one_shot: true,
    };
    let library_ids = config.library_ids.clone();

    let items_resolved = Arc::new(std::sync::atomic::AtomicUsize::new(0));
    let sidecars_applied = Arc::new(std::sync::atomic::AtomicUsize::new(0));
    let sidecars_deleted = Arc::new(std::sync::atomic::AtomicUsize::new(0));

    {
        let ctx = ctx.clone();
        let cache = cache.clone();
        let server = server.clone();
        let library_ids = library_ids.clone();
        let items_resolved = items_resolved.clone();
        let sidecars_applied = sidecars_applied.clone();
        let sidecars_deleted = sidecars_deleted.clone();

        workers::run_to_completion(tasks.drain(..).collect(), config.threads, move |task| {
            let ctx = ctx.clone();
            let cache = cache.clone();
            let server = server.clone();
            let library_ids = library_ids.clone();
            let items_resolved = items_resolved.clone();
            let sidecars_applied = sidecars_applied.clone();
            let sidecars_deleted = sidecars_deleted.clone();

            async move {
                let sidecar_existed_before = match task.kind {
                    TaskKind::Video => task.path.with_extension(walker::SIDECAR_EXTENSION).exists(),
                    TaskKind::Sidecar => task.path.exists(),
                };

                let (video_path, sidecar_path) = match task.kind {
                    TaskKind::Video => {
                        let sidecar = task.path.with_extension(walker::SIDECAR_EXTENSION);
                        (task.path, sidecar)
                    }
                    TaskKind::Sidecar => {
                        let video = task.path.with_extension("");
                        (video, task.path)
                    }
                };

                let outcome = pipeline::apply(&cache, server.as_ref(), &library_ids, &video_path, &sidecar_path, policy).await;

                use pipeline::PipelineOutcome::*;
                match outcome {
                    Applied => {
                        items_resolved.fetch_add(1, std::sync::atomic::Ordering::Relaxed);
                        sidecars_applied.fetch_add(1, std::sync::atomic::Ordering::Relaxed);
                        if sidecar_existed_before && !sidecar_path.exists() {
                            sidecars_deleted.fetch_add(1, std::sync::atomic::Ordering::Relaxed);
                        }
                        subtitles::maybe_process(&ctx, &video_path).await;
                        true
                    }
                    CacheHit => {
                        // No edit was issued; don't count it as resolved or
                        // applied, but a cache-hit skip may still have
                        // deleted the sidecar per policy.
                        if sidecar_existed_before && !sidecar_path.exists() {
                            sidecars_deleted.fetch_add(1, std::sync::atomic::Ordering::Relaxed);
                        }
                        true
                    }
                    Deferred => true,
                    NothingToDo => true,
                    Failed => false,
                }
            }
        })
        .await;
    }

    cache.flush();

    RunSummary {
        videos_seen,
        items_resolved: items_resolved.load(std::sync::atomic::Ordering::Relaxed),
        sidecars_applied: sidecars_applied.load(std::sync::atomic::Ordering::Relaxed),
        sidecars_deleted: sidecars_deleted.load(std::sync::atomic::Ordering::Relaxed),
    }
}

/// Watch mode: start Event Intake, the consumer loop, the cache-flush
/// ticker, and the repair timer, then block until `cancel` fires.
pub async fn run_watch(ctx: Arc<AppContext>, roots: Vec<PathBuf>) -> anyhow::Result<()> {
    let config = &ctx.config;
    let cache = ctx.cache.clone();
    let server = ctx.server.clone();

    let (cancel_tx, cancel_rx) = tokio::sync::watch::channel(false);

    let intake = Arc::new(EventIntake::new(
        ctx.clone(),
        Duration::from_secs_f64(config.watch_debounce_delay),
        Duration::from_secs(config.delay_after_new_file),
    ));
    intake.start(&roots, cancel_rx.clone())?;

    let repair_cache = cache.clone();
    let repair_server = server.clone();
    let repair_library_ids = config.library_ids.clone();
    let repair_interval = Duration::from_secs(config.cache_repair_interval);
    tokio::spawn(repair::run_periodic(
        repair_cache,
        repair_server,
        repair_library_ids,
        repair_interval,
        cancel_rx.clone(),
    ));

    let flush_cache = cache.clone();
    let mut flush_cancel = cancel_rx.clone();
    tokio::spawn(async move {
        let mut ticker = tokio::time::interval(CACHE_FLUSH_INTERVAL);
        loop {
            tokio::select! {
                _ = ticker.tick() => flush_cache.flush(),
                _ = flush_cancel.changed() => {
                    if *flush_cancel.borrow() {
                        return;
                    }
                }
            }
        }
    });

    wait_for_shutdown_signal().await?;
    tracing::info!("shutdown signal received");
    let _ = cancel_tx.send(true);
    cache.flush();

    Ok(())
}

#[cfg(unix)]
async fn wait_for_shutdown_signal() -> anyhow::Result<()> {
    use tokio::signal::unix::{signal, SignalKind};

    let mut sigterm = signal(SignalKind::terminate())?;
    tokio::select! {
        _ = tokio::signal::ctrl_c() => {}
        _ = sigterm.recv() => {}
    }
    Ok(())
}

#[cfg(not(unix))]
async fn wait_for_shutdown_signal() -> anyhow::Result<()> {
    tokio::signal::ctrl_c().await?;
    Ok(())
}
