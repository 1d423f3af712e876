//! Ordered playlist with a wrapping cursor

use std::path::{Path, PathBuf};

/// A list of files and the index of the one currently playing.
///
/// The cursor is `Some` exactly when the list is non-empty.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Playlist {
    files: Vec<PathBuf>,
    cursor: Option<usize>,
}

impl Playlist {
    pub fn new() -> Self {
        Self::default()
    }

    /// Replace the whole list and rewind to the first entry.
    pub fn replace(&mut self, files: Vec<PathBuf>) {
        self.cursor = if files.is_empty() { None } else { Some(0) };
        self.files = files;
    }

    pub fn is_empty(&self) -> bool {
        self.files.is_empty()
    }

    pub fn len(&self) -> usize {
        self.files.len()
    }

    pub fn cursor(&self) -> Option<usize> {
        self.cursor
    }

    pub fn files(&self) -> &[PathBuf] {
        &self.files
    }

    pub fn current(&self) -> Option<&Path> {
        self.cursor.map(|i| self.files[i].as_path())
    }

    /// Move to the next entry, wrapping to the start.
    pub fn advance(&mut self) -> Option<&Path> {
        let len = self.files.len();
        self.cursor = self.cursor.map(|i| (i + 1) % len);
        self.current()
    }

    /// Move to the previous entry, wrapping to the end.
    pub fn retreat(&mut self) -> Option<&Path> {
        let len = self.files.len();
        self.cursor = self.cursor.map(|i| (i + len - 1) % len);
        self.current()
    }

    /// Point the cursor at `index`. Out-of-range indices are ignored.
    pub fn seek(&mut self, index: usize) {
        if index < self.files.len() {
            self.cursor = Some(index);
        }
    }
}
