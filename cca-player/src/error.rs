//! Error types for the player core

use std::path::PathBuf;

use cca_device::DeviceError;
use thiserror::Error;

/// Errors surfaced by sessions, the registry and the command facade
#[derive(Error, Debug)]
pub enum PlayerError {
    /// A device command failed
    #[error(transparent)]
    Device(#[from] DeviceError),

    /// Volume outside `0.0..=1.0`
    #[error("Invalid volume {0}: must be between 0.0 and 1.0")]
    InvalidVolume(f32),

    #[error("Playlist folder not found: {}", .0.display())]
    FolderNotFound(PathBuf),

    #[error("File not found: {}", .0.display())]
    FileNotFound(PathBuf),

    /// The file is not below the directory the HTTP server serves
    #[error("{} is not inside the served directory {}", path.display(), root.display())]
    OutsideServeRoot { path: PathBuf, root: PathBuf },

    /// More devices were discovered than selector keys exist
    #[error("Found {0} devices, at most 10 can be selected")]
    TooManyDevices(usize),

    #[error("No device is assigned to key '{0}'")]
    UnknownKey(char),

    #[error("Device not found: {name} (available: {})", available.join(", "))]
    DeviceNotFound { name: String, available: Vec<String> },

    #[error("No Chromecast devices found")]
    NoDevices,

    #[error("Invalid media URL: {0}")]
    Url(#[from] url::ParseError),

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
}

/// Result type for player operations
pub type Result<T> = std::result::Result<T, PlayerError>;
