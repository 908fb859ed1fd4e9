//! The retry map (Design Notes §9): the source's timer-per-path and
//! dictionary-swept queue collapse into one map keyed by path, polled once
//! per second by a single consumer.

use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::time::{Duration, Instant};

pub const MAX_RETRY_DELAY: Duration = Duration::from_secs(600);
pub const MAX_SIDECAR_ATTEMPTS: u32 = 5;

pub const VIDEO_INITIAL_DELAY: Duration = Duration::from_secs(5);
pub const SIDECAR_INITIAL_DELAY: Duration = Duration::from_secs(30);

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Kind {
    Video,
    Sidecar,
}

impl Kind {
    fn initial_delay(self) -> Duration {
        match self {
            Kind::Video => VIDEO_INITIAL_DELAY,
            Kind::Sidecar => SIDECAR_INITIAL_DELAY,
        }
    }
}

#[derive(Debug, Clone)]
pub struct RetryItem {
    pub due_at: Instant,
    pub current_delay: Duration,
    pub attempt_count: u32,
    pub kind: Kind,
}

/// A mapping path → `RetryItem`, plus the per-path debounce timestamps
/// Event Intake consults before ever reaching this map.
#[derive(Default)]
pub struct RetryQueue {
    items: HashMap<PathBuf, RetryItem>,
}

impl RetryQueue {
    pub fn new() -> Self {
        Self::default()
    }

    /// Enqueue `path` at its kind-specific initial delay. A duplicate
    /// event for an already-queued path is a no-op: never shorten an
    /// outstanding delay.
    pub fn enqueue(&mut self, path: PathBuf, kind: Kind) {
        if self.items.contains_key(&path) {
            return;
        }
        let delay = kind.initial_delay();
        self.items.insert(
            path,
            RetryItem {
                due_at: Instant::now() + delay,
                current_delay: delay,
                attempt_count: 0,
                kind,
            },
        );
    }

    pub fn remove(&mut self, path: &Path) {
        self.items.remove(path);
    }

    pub fn contains(&self, path: &Path) -> bool {
        self.items.contains_key(path)
    }

    /// Snapshot of paths whose `due_at` has passed, removing them from the
    /// map. Callers reschedule failures via [`Self::reschedule_after_failure`]
    /// or drop them permanently.
    pub fn drain_ready(&mut self, now: Instant) -> Vec<(PathBuf, RetryItem)> {
        let ready: Vec<PathBuf> = self
            .items
            .iter()
            .filter(|(_, item)| item.due_at <= now)
            .map(|(path, _)| path.clone())
            .collect();

        ready
            .into_iter()
            .filter_map(|path| self.items.remove(&path).map(|item| (path, item)))
            .collect()
    }

    /// Double the delay (capped) and reinsert. Returns `false` if a
    /// sidecar has exhausted its attempt cap and should be dropped instead.
    pub fn reschedule_after_failure(&mut self, path: PathBuf, mut item: RetryItem) -> bool {
        item.attempt_count += 1;
        if item.kind == Kind::Sidecar && item.attempt_count >= MAX_SIDECAR_ATTEMPTS {
            return false;
        }
        item.current_delay = (item.current_delay * 2).min(MAX_RETRY_DELAY);
        item.due_at = Instant::now() + item.current_delay;
        self.items.insert(path, item);
        true
    }

    pub fn len(&self) -> usize {
        self.items.len()
    }

    pub fn is_empty(&self) -> bool {
        self.items.is_empty()
    }
}

/// Per-path last-seen monotonic timestamps for debounce.
#[derive(Default)]
pub struct Debouncer {
    last_seen: HashMap<PathBuf, Instant>,
}

impl Debouncer {
    pub fn new() -> Self {
        Self::default()
    }

    /// Returns `true` if this event should proceed (i.e. it's not within
    /// `delay` of the previous event for the same path).
    pub fn should_proceed(&mut self, path: &Path, delay: Duration) -> bool {
        let now = Instant::now();
        if let Some(last) = self.last_seen.get(path) {
            if now.duration_since(*last) < delay {
                return false;
            }
        }
        self.last_seen.insert(path.to_path_buf(), now);
        true
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn enqueue_of_queued_path_does_not_shorten_delay() {
        let mut queue = RetryQueue::new();
        queue.enqueue(PathBuf::from("/a.mkv"), Kind::Video);
        let first_due = queue.items.get(Path::new("/a.mkv")).unwrap().due_at;

        queue.enqueue(PathBuf::from("/a.mkv"), Kind::Video);
        let second_due = queue.items.get(Path::new("/a.mkv")).unwrap().due_at;

        assert_eq!(first_due, second_due);
    }

    #[test]
    fn backoff_doubles_and_caps() {
        let mut queue = RetryQueue::new();
        queue.enqueue(PathBuf::from("/a.mkv"), Kind::Video);
        let (path, item) = queue.drain_ready(Instant::now() + Duration::from_secs(10)).remove(0);

        assert_eq!(item.current_delay, VIDEO_INITIAL_DELAY);
        queue.reschedule_after_failure(path.clone(), item);
        let item = queue.items.get(&path).unwrap();
        assert_eq!(item.current_delay, VIDEO_INITIAL_DELAY * 2);
    }

    #[test]
    fn sidecar_drops_after_max_attempts() {
        let mut queue = RetryQueue::new();
        let mut item = RetryItem {
            due_at: Instant::now(),
            current_delay: SIDECAR_INITIAL_DELAY,
            attempt_count: MAX_SIDECAR_ATTEMPTS - 1,
            kind: Kind::Sidecar,
        };
        let path = PathBuf::from("/a.nfo");
        let kept = queue.reschedule_after_failure(path.clone(), item.clone());
        assert!(!kept);

        item.attempt_count = 0;
        let kept = queue.reschedule_after_failure(path, item);
        assert!(kept);
    }

    #[test]
    fn video_kind_has_no_attempt_cap() {
        let mut queue = RetryQueue::new();
        let item = RetryItem {
            due_at: Instant::now(),
            current_delay: MAX_RETRY_DELAY,
            attempt_count: 1000,
            kind: Kind::Video,
        };
        let kept = queue.reschedule_after_failure(PathBuf::from("/a.mkv"), item);
        assert!(kept);
    }

    #[test]
    fn debounce_drops_events_within_window() {
        let mut debouncer = Debouncer::new();
        let path = PathBuf::from("/a.mkv");
        assert!(debouncer.should_proceed(&path, Duration::from_secs(2)));
        assert!(!debouncer.should_proceed(&path, Duration::from_secs(2)));
    }
}
