//! Media status and load request types.
//!
//! These are the protocol-neutral shapes the rest of the player works with.
//! Conversion from rust_cast's status entries lives here too.

use rust_cast::channels::media::{self, Metadata};

/// Remote player state as reported by the receiver.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum RemoteState {
    Idle,
    Playing,
    Paused,
    Buffering,
}

/// Why the remote player went idle (or, for `Interrupted`, why playback
/// was re-reported while playing).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum IdleReason {
    Cancelled,
    Interrupted,
    Finished,
    Error,
}

/// A single media status notification.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct MediaStatus {
    pub player_state: Option<RemoteState>,
    pub idle_reason: Option<IdleReason>,
    pub artist: Option<String>,
    pub title: Option<String>,
    pub album: Option<String>,
    /// Playback position in seconds
    pub current_time: Option<f64>,
    /// Track duration in seconds
    pub duration: Option<f64>,
}

impl MediaStatus {
    pub fn new(player_state: RemoteState, idle_reason: Option<IdleReason>) -> Self {
        Self {
            player_state: Some(player_state),
            idle_reason,
            ..Default::default()
        }
    }

    /// Whether the receiver has a media session that is not idle.
    pub fn is_active(&self) -> bool {
        matches!(
            self.player_state,
            Some(RemoteState::Playing | RemoteState::Paused | RemoteState::Buffering)
        )
    }
}

/// Everything needed to start a track on the receiver.
#[derive(Debug, Clone, PartialEq)]
pub struct LoadRequest {
    /// URL the receiver fetches the audio from
    pub url: String,
    pub content_type: String,
    pub title: String,
    pub artist: String,
    pub album: String,
    /// Optional cover art URL
    pub cover_url: Option<String>,
}

impl From<&media::PlayerState> for RemoteState {
    fn from(state: &media::PlayerState) -> Self {
        match state {
            media::PlayerState::Idle => RemoteState::Idle,
            media::PlayerState::Playing => RemoteState::Playing,
            media::PlayerState::Paused => RemoteState::Paused,
            media::PlayerState::Buffering => RemoteState::Buffering,
        }
    }
}

impl From<&media::IdleReason> for IdleReason {
    fn from(reason: &media::IdleReason) -> Self {
        match reason {
            media::IdleReason::Cancelled => IdleReason::Cancelled,
            media::IdleReason::Interrupted => IdleReason::Interrupted,
            media::IdleReason::Finished => IdleReason::Finished,
            media::IdleReason::Error => IdleReason::Error,
        }
    }
}

impl From<&media::StatusEntry> for MediaStatus {
    fn from(entry: &media::StatusEntry) -> Self {
        let mut status = MediaStatus {
            player_state: Some(RemoteState::from(&entry.player_state)),
            idle_reason: entry.idle_reason.as_ref().map(IdleReason::from),
            current_time: entry.current_time.map(f64::from),
            ..Default::default()
        };

        if let Some(loaded) = &entry.media {
            status.duration = loaded.duration.map(f64::from);
            match &loaded.metadata {
                Some(Metadata::MusicTrack(track)) => {
                    status.artist = track.artist.clone();
                    status.title = track.title.clone();
                    status.album = track.album_name.clone();
                }
                Some(Metadata::Generic(generic)) => {
                    status.title = generic.title.clone();
                }
                _ => {}
            }
        }

        status
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_is_active() {
        assert!(MediaStatus::new(RemoteState::Playing, None).is_active());
        assert!(MediaStatus::new(RemoteState::Paused, None).is_active());
        assert!(MediaStatus::new(RemoteState::Buffering, None).is_active());
        assert!(!MediaStatus::new(RemoteState::Idle, Some(IdleReason::Finished)).is_active());
        assert!(!MediaStatus::default().is_active());
    }

    #[test]
    fn test_state_conversion() {
        assert_eq!(RemoteState::from(&media::PlayerState::Buffering), RemoteState::Buffering);
        assert_eq!(IdleReason::from(&media::IdleReason::Interrupted), IdleReason::Interrupted);
    }
}
