mod cli;

use cli::{Cli, Commands};
use clap::Parser;
use sidecar_sync::cache::Cache;
use sidecar_sync::config::{self, ConfigLoad};
use sidecar_sync::server::plex::PlexClient;
use sidecar_sync::server::MediaServerClient;
use sidecar_sync::supervisor;
use sidecar_sync::tools;
use std::path::PathBuf;
use std::process::ExitCode;
use std::sync::Arc;
use tracing_subscriber::EnvFilter;

fn main() -> ExitCode {
    let cli = Cli::parse();
    init_tracing(&cli);

    let rt = tokio::runtime::Runtime::new().expect("failed to start tokio runtime");
    rt.block_on(run(cli))
}

fn init_tracing(cli: &Cli) {
    let default_filter = if cli.debug_http {
        "sidecar_sync=trace,reqwest=debug"
    } else if cli.detail || cli.debug {
        "sidecar_sync=debug"
    } else {
        "sidecar_sync=info"
    };

    let env_filter = std::env::var("RUST_LOG").unwrap_or_else(|_| default_filter.to_string());

    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::new(env_filter))
        .init();
}

async fn run(cli: Cli) -> ExitCode {
    match &cli.command {
        Some(Commands::Version) => {
            println!("sidecar-sync {}", env!("CARGO_PKG_VERSION"));
            return ExitCode::SUCCESS;
        }
        Some(Commands::JsonToNfo { json_path }) => {
            return match sidecar_sync::json_to_nfo::convert(json_path) {
                Ok(path) => {
                    println!("wrote {}", path.display());
                    ExitCode::SUCCESS
                }
                Err(err) => {
                    eprintln!("json-to-nfo failed: {err}");
                    ExitCode::FAILURE
                }
            };
        }
        _ => {}
    }

    let config_path = config::resolve_config_path(cli.config.as_deref());
    let loaded = match config::load_or_bootstrap(&config_path) {
        Ok(loaded) => loaded,
        Err(err) => {
            eprintln!("config error: {err}");
            return ExitCode::FAILURE;
        }
    };

    let config = match loaded {
        ConfigLoad::Bootstrapped(path) => {
            println!(
                "No config found; wrote a default one to {}. Edit it and run again.",
                path.display()
            );
            return ExitCode::SUCCESS;
        }
        ConfigLoad::Loaded(config) => config,
    };

    for warning in config.validate() {
        tracing::warn!(%warning, "config warning");
    }

    match &cli.command {
        Some(Commands::CheckTools) => {
            return run_check_tools();
        }
        Some(Commands::Validate) => {
            println!("config at {} is valid", config_path.display());
            return ExitCode::SUCCESS;
        }
        _ => {}
    }

    let cache_path = cache_path_for(&config_path);
    let cache = match Cache::load(&cache_path) {
        Ok(cache) => Arc::new(cache),
        Err(err) => {
            eprintln!("cache load failed: {err}");
            return ExitCode::FAILURE;
        }
    };

    let plex_client = PlexClient::new(
        config.server_base_url.clone(),
        config.server_token.clone(),
        config.max_concurrent_requests,
        config.request_delay,
    );
    if let Err(err) = plex_client.check_connection().await {
        eprintln!("server connection failed: {err}");
        return ExitCode::FAILURE;
    }
    let server: Arc<dyn MediaServerClient> = Arc::new(plex_client);

    let tool_statuses = tools::discover(None, None);
    let ffmpeg_bin = tool_statuses.iter().find(|t| t.name == "ffmpeg").and_then(|t| t.path.clone());
    let ffprobe_bin = tool_statuses.iter().find(|t| t.name == "ffprobe").and_then(|t| t.path.clone());
    if config.subtitles && (ffmpeg_bin.is_none() || ffprobe_bin.is_none()) {
        tracing::warn!("subtitles enabled but ffmpeg/ffprobe could not be resolved on PATH");
    }

    let roots = match resolve_base_dirs(&cli) {
        Some(roots) => roots,
        None => {
            eprintln!("no base directory configured: pass --base-dir or set BASE_DIR");
            return ExitCode::FAILURE;
        }
    };

    let watch_mode = config.watch_folders && !cli.disable_watchdog;

    let ctx = Arc::new(sidecar_sync::context::AppContext::new(
        cache, server, config, ffmpeg_bin, ffprobe_bin,
    ));

    if watch_mode {
        if let Err(err) = supervisor::run_watch(ctx, roots).await {
            eprintln!("watch mode failed: {err}");
            return ExitCode::FAILURE;
        }
    } else {
        let summary = supervisor::run_one_shot(ctx, &roots).await;
        println!(
            "videos seen: {}, items resolved: {}, sidecars applied: {}, sidecars deleted: {}",
            summary.videos_seen, summary.items_resolved, summary.sidecars_applied, summary.sidecars_deleted
        );
    }

    ExitCode::SUCCESS
}

fn cache_path_for(config_path: &std::path::Path) -> PathBuf {
    config_path.with_file_name("cache.json")
}

fn resolve_base_dirs(cli: &cli::Cli) -> Option<Vec<PathBuf>> {
    if let Some(dir) = &cli.base_dir {
        return Some(vec![dir.clone()]);
    }
    std::env::var("BASE_DIR").ok().map(|raw| {
        raw.split(',')
            .map(|s| PathBuf::from(s.trim()))
            .filter(|p| !p.as_os_str().is_empty())
            .collect()
    })
}

fn run_check_tools() -> ExitCode {
    let statuses = tools::discover(None, None);
    let mut all_ok = true;
    for status in &statuses {
        let state = if status.available() { "OK" } else { all_ok = false; "MISSING" };
        println!("[{state:>7}] {}", status.name);
    }
    if all_ok {
        ExitCode::SUCCESS
    } else {
        ExitCode::FAILURE
    }
}
