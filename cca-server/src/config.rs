//! Server configuration and serve-root computation

use std::path::{Component, Path, PathBuf};

/// Default HTTP port
pub const DEFAULT_PORT: u16 = 8000;

/// Page `GET /` redirects to
pub const CONTROL_PAGE: &str = "/web_page.html";

/// Cover art of the current track, inside the web directory
pub const COVER_IMAGE: &str = "cover.jpg";

#[derive(Debug, Clone, PartialEq)]
pub struct ServerConfig {
    /// Port to listen on; `0` picks a free one
    pub port: u16,
    /// Directory holding the control page and its assets
    pub web_dir: PathBuf,
    /// Playlist folder whose files the receiver fetches
    pub playlist_folder: PathBuf,
}

impl ServerConfig {
    pub fn new(web_dir: impl Into<PathBuf>, playlist_folder: impl Into<PathBuf>) -> Self {
        Self {
            port: DEFAULT_PORT,
            web_dir: web_dir.into(),
            playlist_folder: playlist_folder.into(),
        }
    }

    pub fn with_port(mut self, port: u16) -> Self {
        self.port = port;
        self
    }

    /// Directory audio files are served from: the common ancestor of the
    /// web directory and the playlist folder.
    pub fn serve_root(&self) -> PathBuf {
        common_ancestor(&self.web_dir, &self.playlist_folder)
    }
}

/// Longest shared prefix of two paths, compared component by component.
///
/// Both paths are compared as given; callers pass absolute paths. Returns
/// an empty path when nothing is shared.
pub fn common_ancestor(a: &Path, b: &Path) -> PathBuf {
    a.components()
        .zip(b.components())
        .take_while(|(x, y)| x == y)
        .map(|(x, _)| x)
        .fold(PathBuf::new(), |mut acc, component: Component<'_>| {
            acc.push(component.as_os_str());
            acc
        })
}
