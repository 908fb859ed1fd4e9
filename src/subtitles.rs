//! Subtitle extract-and-upload side path (peripheral, spec §1/§6): when
//! enabled, probes a video's subtitle streams with `ffprobe` and uploads
//! newly-extracted `.srt` files not already present.

use crate::server::{MediaItem, MediaServerClient};
use serde::Deserialize;
use std::path::{Path, PathBuf};
use tokio::process::Command;

const SKIPPED_CODECS: &[&str] = &["pgs", "dvdsub", "hdmv_pgs", "vobsub"];

#[derive(Debug, Deserialize)]
struct ProbeOutput {
    #[serde(default)]
    streams: Vec<ProbeStream>,
}

#[derive(Debug, Deserialize)]
struct ProbeStream {
    index: u32,
    #[serde(default)]
    codec_name: String,
    #[serde(default)]
    tags: ProbeTags,
}

#[derive(Debug, Default, Deserialize)]
struct ProbeTags {
    #[serde(default)]
    language: Option<String>,
}

/// Probe `video_path` for extractable subtitle streams, extract each to a
/// sibling `.srt` (skipping languages already on disk), and return the
/// `(path, lang)` pairs produced.
pub async fn extract(ffprobe_bin: &Path, ffmpeg_bin: &Path, video_path: &Path) -> Vec<(PathBuf, String)> {
    let mut extracted = Vec::new();

    let output = match Command::new(ffprobe_bin)
        .args([
            "-v", "error", "-select_streams", "s",
            "-show_entries", "stream=index:stream_tags=language,codec_name",
            "-of", "json",
        ])
        .arg(video_path)
        .output()
        .await
    {
        Ok(output) if output.status.success() => output,
        Ok(output) => {
            tracing::warn!(path = %video_path.display(), status = ?output.status, "ffprobe failed");
            return extracted;
        }
        Err(err) => {
            tracing::warn!(path = %video_path.display(), error = %err, "failed to spawn ffprobe");
            return extracted;
        }
    };

    let probe: ProbeOutput = match serde_json::from_slice(&output.stdout) {
        Ok(probe) => probe,
        Err(err) => {
            tracing::warn!(path = %video_path.display(), error = %err, "could not parse ffprobe output");
            return extracted;
        }
    };

    let base = video_path.with_extension("");

    for stream in probe.streams {
        let codec = stream.codec_name.to_lowercase();
        if SKIPPED_CODECS.contains(&codec.as_str()) {
            tracing::warn!(path = %video_path.display(), codec, "skipping unsupported subtitle codec");
            continue;
        }

        let lang = stream.tags.language.unwrap_or_else(|| "und".to_string());
        let srt_path = PathBuf::from(format!("{}.{}.srt", base.display(), lang));
        if srt_path.exists() {
            continue;
        }

        let status = Command::new(ffmpeg_bin)
            .args(["-y", "-i"])
            .arg(video_path)
            .args(["-map", &format!("0:s:{}", stream.index)])
            .arg(&srt_path)
            .status()
            .await;

        match status {
            Ok(status) if status.success() => extracted.push((srt_path, lang)),
            Ok(status) => tracing::warn!(path = %video_path.display(), ?status, "ffmpeg subtitle extraction failed"),
            Err(err) => tracing::warn!(path = %video_path.display(), error = %err, "failed to spawn ffmpeg"),
        }
    }

    extracted
}

/// Upload every extracted `(path, lang)` pair to the server item.
pub async fn upload_all(
    server: &dyn MediaServerClient,
    item: &dyn MediaItem,
    srt_files: &[(PathBuf, String)],
) {
    for (path, lang) in srt_files {
        if let Err(err) = server.upload_subtitle(item, path, lang).await {
            tracing::error!(path = %path.display(), error = %err, "subtitle upload failed");
        }
    }
}

/// Run the subtitle side path for `video_path` after a successful apply, if
/// `config.subtitles` is enabled and both tools resolved at startup. A no-op
/// whenever the feature is off, the tools are missing, or the cache doesn't
/// yet hold a resolved server id for this path.
pub async fn maybe_process(ctx: &crate::context::AppContext, video_path: &Path) {
    if !ctx.config.subtitles {
        return;
    }
    let (Some(ffmpeg), Some(ffprobe)) = (ctx.ffmpeg_bin.as_deref(), ctx.ffprobe_bin.as_deref()) else {
        tracing::warn!(path = %video_path.display(), "subtitles enabled but ffmpeg/ffprobe not found");
        return;
    };

    let entry = ctx.cache.get(video_path);
    let Some(server_id) = entry.server_id.filter(|id| !id.is_empty()) else {
        return;
    };
    let item = match ctx.server.fetch_item(&server_id).await {
        Ok(Some(item)) => item,
        Ok(None) => return,
        Err(err) => {
            tracing::warn!(path = %video_path.display(), error = %err, "fetch_item failed before subtitle extraction");
            return;
        }
    };

    let extracted = extract(ffprobe, ffmpeg, video_path).await;
    if extracted.is_empty() {
        return;
    }
    upload_all(ctx.server.as_ref(), item.as_ref(), &extracted).await;
}
