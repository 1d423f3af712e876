//! Audio files, content types, media URLs and time formatting

use std::ffi::OsStr;
use std::path::{Component, Path, PathBuf};

use rand::seq::SliceRandom;
use url::Url;
use walkdir::WalkDir;

use crate::error::{PlayerError, Result};

/// File extensions treated as playable audio, lowercase
pub const AUDIO_EXTENSIONS: &[&str] = &["mp3", "flac", "m4a", "aac", "mp4", "ogg", "oga", "opus", "wav"];

/// Content type for an audio file extension (case-insensitive)
pub fn content_type_for_extension(extension: &str) -> Option<&'static str> {
    let content_type = match extension.to_ascii_lowercase().as_str() {
        "mp3" => "audio/mpeg",
        "flac" => "audio/flac",
        "m4a" | "aac" | "mp4" => "audio/mp4",
        "ogg" | "oga" => "audio/ogg",
        "opus" => "audio/opus",
        "wav" => "audio/wav",
        _ => return None,
    };
    Some(content_type)
}

/// Content type for an audio file, defaulting to `audio/mpeg`
pub fn content_type_for(path: &Path) -> &'static str {
    path.extension()
        .and_then(OsStr::to_str)
        .and_then(content_type_for_extension)
        .unwrap_or("audio/mpeg")
}

/// Whether `path` has one of the [`AUDIO_EXTENSIONS`]
pub fn is_audio_file(path: &Path) -> bool {
    path.extension()
        .and_then(OsStr::to_str)
        .is_some_and(|ext| content_type_for_extension(ext).is_some())
}

/// Recursively collect the audio files below `folder`, sorted.
///
/// # Errors
///
/// `FolderNotFound` when `folder` is not a directory.
pub fn find_audio_files(folder: &Path) -> Result<Vec<PathBuf>> {
    if !folder.is_dir() {
        return Err(PlayerError::FolderNotFound(folder.to_path_buf()));
    }

    let mut files: Vec<PathBuf> = WalkDir::new(folder)
        .follow_links(true)
        .into_iter()
        .filter_map(|entry| entry.ok())
        .filter(|entry| entry.file_type().is_file() && is_audio_file(entry.path()))
        .map(|entry| entry.into_path())
        .collect();
    files.sort();
    Ok(files)
}

/// Audio files below `folder` in random order
pub fn shuffled_audio_files(folder: &Path) -> Result<Vec<PathBuf>> {
    let mut files = find_audio_files(folder)?;
    files.shuffle(&mut rand::rng());
    Ok(files)
}

/// Absolute form of `path` with `.` and `..` resolved lexically.
///
/// Symlinks are not followed and the path need not exist.
pub fn absolute_path(path: &Path) -> Result<PathBuf> {
    let absolute = std::path::absolute(path)?;
    let mut normalized = PathBuf::new();
    for component in absolute.components() {
        match component {
            Component::CurDir => {}
            Component::ParentDir => {
                normalized.pop();
            }
            other => normalized.push(other.as_os_str()),
        }
    }
    Ok(normalized)
}

/// URL under `base_url` at which the file server exposes `path`.
///
/// `path` is taken relative to `serve_root`; each component is
/// percent-encoded as its own URL segment.
pub fn media_url(base_url: &Url, serve_root: &Path, path: &Path) -> Result<Url> {
    let root = absolute_path(serve_root)?;
    let file = absolute_path(path)?;
    let relative = file
        .strip_prefix(&root)
        .map_err(|_| PlayerError::OutsideServeRoot {
            path: file.clone(),
            root: root.clone(),
        })?;

    let mut url = base_url.clone();
    {
        let mut segments = url
            .path_segments_mut()
            .map_err(|()| url::ParseError::RelativeUrlWithCannotBeABaseBase)?;
        segments.pop_if_empty();
        for component in relative.components() {
            segments.push(&component.as_os_str().to_string_lossy());
        }
    }
    Ok(url)
}

/// How precisely [`to_min_sec`] renders the seconds
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum TimeResolution {
    /// `mm:ss`, rounded to the nearest second
    #[default]
    Seconds,
    /// `mm:ss.t`
    Tenths,
    /// `mm:ss.hh`
    Hundredths,
}

/// Format a duration in seconds as minutes and seconds.
///
/// Negative and non-finite inputs render as zero.
pub fn to_min_sec(seconds: f64, resolution: TimeResolution) -> String {
    let seconds = if seconds.is_finite() { seconds.max(0.0) } else { 0.0 };
    let scale: u64 = match resolution {
        TimeResolution::Seconds => 1,
        TimeResolution::Tenths => 10,
        TimeResolution::Hundredths => 100,
    };

    let units = (seconds * scale as f64).round() as u64;
    let whole = units / scale;
    let fraction = units % scale;
    let (mins, secs) = (whole / 60, whole % 60);

    match resolution {
        TimeResolution::Seconds => format!("{:02}:{:02}", mins, secs),
        TimeResolution::Tenths => format!("{:02}:{:02}.{:01}", mins, secs, fraction),
        TimeResolution::Hundredths => format!("{:02}:{:02}.{:02}", mins, secs, fraction),
    }
}
