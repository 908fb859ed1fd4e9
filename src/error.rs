//! Error taxonomy shared across the cache, descriptor reader, and media
//! server client. Component boundaries return these typed variants; the
//! apply pipeline reduces them to a [`crate::pipeline::PipelineOutcome`].

use std::path::PathBuf;

/// Errors surfaced by [`crate::cache::Cache`] loading.
#[derive(Debug, thiserror::Error)]
pub enum CacheLoadError {
    #[error("failed to read cache file {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("cache file {path} is not valid JSON: {source}")]
    Malformed {
        path: PathBuf,
        #[source]
        source: serde_json::Error,
    },
}

/// Errors surfaced by [`crate::descriptor`] reading/parsing a sidecar file.
#[derive(Debug, thiserror::Error)]
pub enum DescriptorError {
    #[error("failed to read sidecar {path}: {source}")]
    Read {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("sidecar {path} could not be parsed even leniently: {reason}")]
    Parse { path: PathBuf, reason: String },
}

/// Errors surfaced by [`crate::server`] implementations.
#[derive(Debug, thiserror::Error)]
pub enum ServerError {
    /// A transient transport failure (connection reset, timeout, 5xx after
    /// retries exhausted). Callers should treat this as retryable.
    #[error("server transport error: {0}")]
    Transport(#[from] reqwest::Error),

    /// A well-formed 4xx response from the server. Not retried.
    #[error("server rejected request ({status}): {body}")]
    Client { status: u16, body: String },
}

/// Top-level configuration error (fatal at startup).
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("failed to read config file {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("config file {path} is not valid JSON: {source}")]
    Malformed {
        path: PathBuf,
        #[source]
        source: serde_json::Error,
    },
}
