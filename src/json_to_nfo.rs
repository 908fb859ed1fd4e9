//! One-off descriptor-from-JSON converter (peripheral, spec §1/§4):
//! reads a downloader JSON sidecar and emits a `.nfo` compatible with the
//! Descriptor Reader (title, plot, aired, titleSort).

use serde::Deserialize;
use std::path::{Path, PathBuf};

#[derive(Debug, Deserialize)]
struct DownloaderInfo {
    #[serde(default)]
    title: Option<String>,
    #[serde(default)]
    description: Option<String>,
    #[serde(default)]
    upload_date: Option<String>,
    #[serde(default)]
    fulltitle: Option<String>,
}

/// Convert the downloader JSON at `json_path` to a sibling `.nfo` file,
/// returning the path written.
pub fn convert(json_path: &Path) -> anyhow::Result<PathBuf> {
    let content = std::fs::read_to_string(json_path)?;
    let info: DownloaderInfo = serde_json::from_str(&content)?;

    let title = info.title.or(info.fulltitle).unwrap_or_default();
    let plot = info.description.unwrap_or_default();
    let aired = info
        .upload_date
        .as_deref()
        .and_then(format_upload_date)
        .unwrap_or_default();

    let nfo = format!(
        "<episodedetails>\n  <title>{title}</title>\n  <plot>{plot}</plot>\n  <aired>{aired}</aired>\n  <titleSort>{title}</titleSort>\n</episodedetails>\n",
        title = escape_xml(&title),
        plot = escape_xml(&plot),
        aired = escape_xml(&aired),
    );

    let nfo_path = nfo_path_for(json_path);
    std::fs::write(&nfo_path, nfo)?;
    Ok(nfo_path)
}

fn nfo_path_for(json_path: &Path) -> PathBuf {
    let stem = json_path
        .file_stem()
        .map(|s| s.to_string_lossy().into_owned())
        .unwrap_or_default();
    let stem = stem.strip_suffix(".info").unwrap_or(&stem);
    json_path.with_file_name(format!("{stem}.nfo"))
}

/// `YYYYMMDD` → `YYYY-MM-DD`, matching the source's upload_date format.
fn format_upload_date(raw: &str) -> Option<String> {
    if raw.len() != 8 || !raw.chars().all(|c| c.is_ascii_digit()) {
        return None;
    }
    Some(format!("{}-{}-{}", &raw[0..4], &raw[4..6], &raw[6..8]))
}

fn escape_xml(value: &str) -> String {
    value
        .replace('&', "&amp;")
        .replace('<', "&lt;")
        .replace('>', "&gt;")
}
