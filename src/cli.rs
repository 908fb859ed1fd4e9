use clap::{Parser, Subcommand};
use std::path::PathBuf;

#[derive(Parser)]
#[command(name = "sidecar-sync")]
#[command(author, version, about = "Keeps a media server's library metadata in sync with .nfo sidecar files")]
pub struct Cli {
    /// Path to the JSON config file (defaults to CONFIG_FILE env var, then ./config.json).
    #[arg(long, global = true)]
    pub config: Option<PathBuf>,

    /// Override the library root(s) normally discovered from the server.
    #[arg(long, global = true)]
    pub base_dir: Option<PathBuf>,

    /// Force a one-shot run even if watch_folders is configured.
    #[arg(long, global = true)]
    pub disable_watchdog: bool,

    /// Lower log level to debug.
    #[arg(long, global = true)]
    pub detail: bool,

    /// Log HTTP request/response bodies at trace level.
    #[arg(long, global = true)]
    pub debug_http: bool,

    /// Lower log level to debug (alias kept for wire compatibility with detail).
    #[arg(long, global = true)]
    pub debug: bool,

    #[command(subcommand)]
    pub command: Option<Commands>,
}

#[derive(Subcommand)]
pub enum Commands {
    /// Check that ffmpeg/ffprobe are resolvable.
    CheckTools,

    /// Validate a config file without running.
    Validate,

    /// Convert a downloader JSON sidecar into a .nfo file.
    JsonToNfo {
        /// Path to the downloader's .info.json file.
        json_path: PathBuf,
    },

    /// Print version information.
    Version,
}
