//! Track tags and cover art

use std::fs;
use std::io;
use std::path::Path;

use lofty::{config::ParseOptions, picture::PictureType, prelude::*, probe::Probe};

pub const UNKNOWN_ARTIST: &str = "Unknown artist";
pub const UNKNOWN_TITLE: &str = "Unknown title";
pub const UNKNOWN_ALBUM: &str = "Unknown album";

/// Tags read from an audio file.
///
/// Missing or unreadable tags fall back to the `Unknown ...` placeholders.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TrackTags {
    pub artist: String,
    pub title: String,
    pub album: String,
    /// Embedded cover image, front cover preferred
    pub cover: Option<Vec<u8>>,
}

impl Default for TrackTags {
    fn default() -> Self {
        Self {
            artist: UNKNOWN_ARTIST.to_string(),
            title: UNKNOWN_TITLE.to_string(),
            album: UNKNOWN_ALBUM.to_string(),
            cover: None,
        }
    }
}

impl TrackTags {
    /// Read tags from `path`, never failing.
    pub fn read(path: &Path) -> Self {
        match Self::try_read(path) {
            Ok(tags) => tags,
            Err(e) => {
                tracing::debug!(path = %path.display(), "no readable tags: {}", e);
                Self::default()
            }
        }
    }

    fn try_read(path: &Path) -> Result<Self, lofty::error::LoftyError> {
        let tagged_file = Probe::open(path)?.options(ParseOptions::new()).read()?;
        let mut tags = Self::default();

        let Some(tag) = tagged_file.primary_tag().or_else(|| tagged_file.first_tag()) else {
            return Ok(tags);
        };

        if let Some(artist) = tag.artist().filter(|s| !s.is_empty()) {
            tags.artist = artist.to_string();
        }
        if let Some(title) = tag.title().filter(|s| !s.is_empty()) {
            tags.title = title.to_string();
        }
        if let Some(album) = tag.album().filter(|s| !s.is_empty()) {
            tags.album = album.to_string();
        }

        let pictures = tag.pictures();
        tags.cover = pictures
            .iter()
            .find(|p| p.pic_type() == PictureType::CoverFront)
            .or_else(|| pictures.first())
            .map(|p| p.data().to_vec());

        Ok(tags)
    }
}

/// Replace the cover image at `cover_path`.
///
/// Any previous image is deleted first (a missing one is fine); the new
/// one is written only when `cover` is given. Returns whether an image was
/// written.
pub fn replace_cover(cover_path: &Path, cover: Option<&[u8]>) -> io::Result<bool> {
    match fs::remove_file(cover_path) {
        Ok(()) => {}
        Err(e) if e.kind() == io::ErrorKind::NotFound => {}
        Err(e) => return Err(e),
    }

    match cover {
        Some(bytes) => {
            fs::write(cover_path, bytes)?;
            Ok(true)
        }
        None => Ok(false),
    }
}
