//! Worker Pool (4.E): bounded-parallel execution of per-file tasks over a
//! finite set, used by one-shot mode.

use std::path::PathBuf;
use std::sync::Arc;
use tokio::sync::Semaphore;
use tokio::task::JoinSet;

/// The kind of path a task carries, mirroring the Event Intake's
/// classification.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TaskKind {
    Video,
    Sidecar,
}

/// One unit of work submitted to the pool.
#[derive(Debug, Clone)]
pub struct Task {
    pub kind: TaskKind,
    pub path: PathBuf,
}

/// Run `tasks` through `handler` with at most `workers` running
/// concurrently, returning only the count that succeeded. Per-task
/// logging is the handler's own concern; the pool itself reports nothing
/// beyond a boolean per task.
pub async fn run_to_completion<F, Fut>(tasks: Vec<Task>, workers: usize, handler: F) -> usize
where
    F: Fn(Task) -> Fut + Send + Sync + 'static,
    Fut: std::future::Future<Output = bool> + Send + 'static,
{
    let semaphore = Arc::new(Semaphore::new(workers.max(1)));
    let handler = Arc::new(handler);
    let mut join_set = JoinSet::new();

    for task in tasks {
        let semaphore = semaphore.clone();
        let handler = handler.clone();
        join_set.spawn(async move {
            let _permit = semaphore.acquire_owned().await.expect("semaphore not closed");
            handler(task).await
        });
    }

    let mut succeeded = 0;
    while let Some(result) = join_set.join_next().await {
        if matches!(result, Ok(true)) {
            succeeded += 1;
        }
    }
    succeeded
}
