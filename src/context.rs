//! The application context (Design Notes §9): the source's process-wide
//! globals for the cache, event handler, and HTTP session become this
//! explicitly constructed value, built once by the Supervisor and passed
//! down rather than reached for.

use crate::cache::Cache;
use crate::config::Config;
use crate::server::MediaServerClient;
use std::path::PathBuf;
use std::sync::Arc;

#[derive(Clone)]
pub struct AppContext {
    pub cache: Arc<Cache>,
    pub server: Arc<dyn MediaServerClient>,
    pub config: Config,
    /// Resolved by the ffmpeg/ffprobe provisioner (spec §4.H startup
    /// order) before mode dispatch; `None` when a binary could not be
    /// found, in which case the subtitle side path is skipped.
    pub ffmpeg_bin: Option<PathBuf>,
    pub ffprobe_bin: Option<PathBuf>,
}

impl AppContext {
    pub fn new(
        cache: Arc<Cache>,
        server: Arc<dyn MediaServerClient>,
        config: Config,
        ffmpeg_bin: Option<PathBuf>,
        ffprobe_bin: Option<PathBuf>,
    ) -> Self {
        Self {
            cache,
            server,
            config,
            ffmpeg_bin,
            ffprobe_bin,
        }
    }
}
