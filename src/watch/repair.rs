//! Repair sweep (4.F): periodically reconciles cache entries missing a
//! server id against the server, plus a bonus one-shot tick shortly after
//! any new file the Pipeline could not resolve.

use crate::cache::Cache;
use crate::server::MediaServerClient;
use std::sync::Arc;
use std::time::Duration;

/// Snapshot entries missing a `server_id`; for each still-extant path,
/// re-resolve via `find_item_by_file`. Flushes once at the end.
pub async fn run_once(cache: &Cache, server: &dyn MediaServerClient, library_ids: &[i64]) {
    let missing = cache.entries_missing_server_id();
    let mut resolved = 0;

    for path in missing {
        if !path.exists() {
            continue;
        }
        match server.find_item_by_file(&path, library_ids).await {
            Ok(Some(item)) => {
                cache.update(&path, Some(item.id().to_string()), None);
                resolved += 1;
            }
            Ok(None) => {}
            Err(err) => {
                tracing::warn!(path = %path.display(), error = %err, "repair sweep lookup failed");
            }
        }
    }

    tracing::info!(resolved, "repair sweep complete");
    cache.flush();
}

/// Self-rescheduling repair timer, cancelled when `cancel` resolves
/// (driven by the Supervisor's shutdown signal).
pub async fn run_periodic(
    cache: Arc<Cache>,
    server: Arc<dyn MediaServerClient>,
    library_ids: Vec<i64>,
    interval: Duration,
    mut cancel: tokio::sync::watch::Receiver<bool>,
) {
    let mut ticker = tokio::time::interval(interval);
    ticker.tick().await; // first tick fires immediately; skip it at startup

    loop {
        tokio::select! {
            _ = ticker.tick() => {
                run_once(&cache, server.as_ref(), &library_ids).await;
            }
            _ = cancel.changed() => {
                if *cancel.borrow() {
                    tracing::info!("repair timer cancelled");
                    return;
                }
            }
        }
    }
}

/// Schedule a single bonus repair tick `delay` after an unresolved new
/// file, compressing the gap between the server indexing it and the next
/// scheduled sweep.
pub fn spawn_bonus_repair(
    cache: Arc<Cache>,
    server: Arc<dyn MediaServerClient>,
    library_ids: Vec<i64>,
    delay: Duration,
) {
    tokio::spawn(async move {
        tokio::time::sleep(delay).await;
        run_once(&cache, server.as_ref(), &library_ids).await;
    });
}
