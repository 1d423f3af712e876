//! Player configuration

use std::path::PathBuf;
use std::time::Duration;

use url::Url;

/// Volume step used by the interactive controls
pub const INTERACTIVE_VOLUME_STEP: f32 = 0.05;

/// Volume step used by one-shot commands
pub const ONE_SHOT_VOLUME_STEP: f32 = 0.1;

/// Default playlist folder, relative to the working directory
pub const DEFAULT_FOLDER: &str = "ZPL";

/// Timings of a playback session
#[derive(Debug, Clone, PartialEq)]
pub struct SessionConfig {
    /// How long to wait for the receiver to report an active media session after a load
    pub active_wait: Duration,
    /// How long status queries may keep failing before the device counts as gone
    pub failure_window: Duration,
    /// Minimum gap between PLAYING/INTERRUPTED notifications that marks a new track
    pub interrupt_gap: Duration,
}

impl Default for SessionConfig {
    fn default() -> Self {
        Self {
            active_wait: Duration::from_secs(3),
            failure_window: Duration::from_secs(4),
            interrupt_gap: Duration::from_secs(2),
        }
    }
}

/// Where the receiver fetches media from
#[derive(Debug, Clone, PartialEq)]
pub struct MediaSource {
    /// Base URL of the local file server, e.g. `http://192.168.1.10:8000/`
    pub base_url: Url,
    /// Directory the file server serves; media paths are made relative to it
    pub serve_root: PathBuf,
    /// Where the current track's cover art is written, if anywhere
    pub cover_path: Option<PathBuf>,
    /// URL the receiver fetches the cover art from
    pub cover_url: Option<Url>,
}

impl MediaSource {
    pub fn new(base_url: Url, serve_root: impl Into<PathBuf>) -> Self {
        Self {
            base_url,
            serve_root: serve_root.into(),
            cover_path: None,
            cover_url: None,
        }
    }

    /// Write cover art to `cover_path`, which the file server publishes at `cover_url`.
    pub fn with_cover(mut self, cover_path: impl Into<PathBuf>, cover_url: Url) -> Self {
        self.cover_path = Some(cover_path.into());
        self.cover_url = Some(cover_url);
        self
    }
}

/// Configuration shared by every session the registry creates
#[derive(Debug, Clone, PartialEq)]
pub struct PlayerConfig {
    pub default_folder: PathBuf,
    pub volume_step: f32,
    pub session: SessionConfig,
    pub media: MediaSource,
}

impl PlayerConfig {
    pub fn new(media: MediaSource) -> Self {
        Self {
            default_folder: PathBuf::from(DEFAULT_FOLDER),
            volume_step: INTERACTIVE_VOLUME_STEP,
            session: SessionConfig::default(),
            media,
        }
    }

    pub fn with_default_folder(mut self, folder: impl Into<PathBuf>) -> Self {
        self.default_folder = folder.into();
        self
    }

    pub fn with_volume_step(mut self, step: f32) -> Self {
        self.volume_step = step;
        self
    }

    pub fn with_session(mut self, session: SessionConfig) -> Self {
        self.session = session;
        self
    }
}
