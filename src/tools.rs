//! `ffmpeg`/`ffprobe` binary provisioner (peripheral, spec §1/§4): resolves
//! configured paths or falls back to a `PATH` lookup, consulted before
//! subtitle extraction and exposed via the `check-tools` subcommand.

use std::path::PathBuf;

#[derive(Debug, Clone)]
pub struct ToolStatus {
    pub name: &'static str,
    pub path: Option<PathBuf>,
}

impl ToolStatus {
    pub fn available(&self) -> bool {
        self.path.is_some()
    }
}

/// Locate `ffmpeg` and `ffprobe`, preferring an explicit override, then
/// falling back to `PATH`.
pub fn discover(ffmpeg_override: Option<&str>, ffprobe_override: Option<&str>) -> Vec<ToolStatus> {
    vec![
        ToolStatus {
            name: "ffmpeg",
            path: resolve("ffmpeg", ffmpeg_override),
        },
        ToolStatus {
            name: "ffprobe",
            path: resolve("ffprobe", ffprobe_override),
        },
    ]
}

fn resolve(binary: &str, configured: Option<&str>) -> Option<PathBuf> {
    if let Some(path) = configured {
        let candidate = PathBuf::from(path);
        if candidate.is_file() {
            return Some(candidate);
        }
    }
    which::which(binary).ok()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn configured_override_wins_when_it_exists() {
        let dir = tempfile::tempdir().unwrap();
        let fake = dir.path().join("ffmpeg");
        std::fs::write(&fake, b"#!/bin/sh").unwrap();

        let resolved = resolve("ffmpeg", Some(fake.to_str().unwrap()));
        assert_eq!(resolved, Some(fake));
    }

    #[test]
    fn missing_override_falls_back_to_path_lookup() {
        let resolved = resolve("ffmpeg", Some("/nonexistent/ffmpeg"));
        // Either PATH has it or it doesn't; either way this must not panic
        // and must not silently return the nonexistent override.
        assert_ne!(resolved, Some(PathBuf::from("/nonexistent/ffmpeg")));
    }
}
