//! Logical player state

use std::fmt;

/// State of a playback session as last reported by the receiver
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub enum PlayerState {
    /// No status received yet
    #[default]
    Unknown,
    Idle,
    Playing,
    Paused,
    Buffering,
}

impl PlayerState {
    pub fn label(self) -> &'static str {
        match self {
            PlayerState::Unknown => "UNKNOWN",
            PlayerState::Idle => "IDLE",
            PlayerState::Playing => "PLAYING",
            PlayerState::Paused => "PAUSED",
            PlayerState::Buffering => "BUFFERING",
        }
    }

    /// Whether the receiver has media loaded in this state
    pub fn has_media(self) -> bool {
        matches!(
            self,
            PlayerState::Playing | PlayerState::Paused | PlayerState::Buffering
        )
    }
}

impl fmt::Display for PlayerState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.label())
    }
}
