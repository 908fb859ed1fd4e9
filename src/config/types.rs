use serde::{Deserialize, Serialize};

/// Top-level configuration, loaded from the JSON file named by `--config` /
/// `CONFIG_FILE` (see spec §6).
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct Config {
    /// Media-server root URL.
    pub server_base_url: String,

    /// Auth token, sent as `X-Plex-Token` on every request.
    pub server_token: String,

    /// Libraries to consider for item resolution.
    #[serde(default)]
    pub library_ids: Vec<i64>,

    /// Raise log level to warnings only.
    #[serde(default)]
    pub silent: bool,

    /// Lower log level to debug.
    #[serde(default)]
    pub detail: bool,

    /// Enable the subtitle extract-and-upload side path.
    #[serde(default)]
    pub subtitles: bool,

    /// Worker pool size.
    #[serde(default = "default_threads")]
    pub threads: usize,

    /// Media server API semaphore size.
    #[serde(default = "default_max_concurrent_requests")]
    pub max_concurrent_requests: usize,

    /// Post-call pacing, in seconds.
    #[serde(default = "default_request_delay")]
    pub request_delay: f64,

    /// Enable watch mode.
    #[serde(default)]
    pub watch_folders: bool,

    /// Per-path event debounce, in seconds.
    #[serde(default = "default_watch_debounce_delay")]
    pub watch_debounce_delay: f64,

    /// Bypass the descriptor-hash idempotence gate.
    #[serde(default = "default_always_apply_nfo")]
    pub always_apply_nfo: bool,

    /// Remove sidecar on successful apply.
    #[serde(default = "default_delete_nfo_after_apply")]
    pub delete_nfo_after_apply: bool,

    /// Repair sweep period, in seconds.
    #[serde(default = "default_cache_repair_interval")]
    pub cache_repair_interval: u64,

    /// Bonus repair tick after an unresolved new file, in seconds.
    #[serde(default = "default_delay_after_new_file")]
    pub delay_after_new_file: u64,
}

fn default_threads() -> usize {
    8
}
fn default_max_concurrent_requests() -> usize {
    2
}
fn default_request_delay() -> f64 {
    0.1
}
fn default_watch_debounce_delay() -> f64 {
    2.0
}
fn default_always_apply_nfo() -> bool {
    true
}
fn default_delete_nfo_after_apply() -> bool {
    true
}
fn default_cache_repair_interval() -> u64 {
    300
}
fn default_delay_after_new_file() -> u64 {
    60
}

impl Default for Config {
    fn default() -> Self {
        Self {
            server_base_url: String::new(),
            server_token: String::new(),
            library_ids: Vec::new(),
            silent: false,
            detail: false,
            subtitles: false,
            threads: default_threads(),
            max_concurrent_requests: default_max_concurrent_requests(),
            request_delay: default_request_delay(),
            watch_folders: false,
            watch_debounce_delay: default_watch_debounce_delay(),
            always_apply_nfo: default_always_apply_nfo(),
            delete_nfo_after_apply: default_delete_nfo_after_apply(),
            cache_repair_interval: default_cache_repair_interval(),
            delay_after_new_file: default_delay_after_new_file(),
        }
    }
}

impl Config {
    /// Sanity-check the loaded config, returning human-readable warnings
    /// rather than failing — only malformed JSON is treated as fatal
    /// (spec §7).
    pub fn validate(&self) -> Vec<String> {
        let mut warnings = Vec::new();

        if self.server_base_url.is_empty() {
            warnings.push("server_base_url is empty".to_string());
        }
        if self.server_token.is_empty() {
            warnings.push("server_token is empty".to_string());
        }
        if self.library_ids.is_empty() {
            warnings.push("library_ids is empty; item resolution will never succeed".to_string());
        }
        if self.threads == 0 {
            warnings.push("threads is 0; no work will be processed".to_string());
        }
        if self.max_concurrent_requests == 0 {
            warnings.push("max_concurrent_requests is 0; all server calls will stall".to_string());
        }

        warnings
    }
}
