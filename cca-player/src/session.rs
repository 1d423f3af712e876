//! Playback session state machine
//!
//! A [`PlaybackSession`] owns one device handle and reconciles the
//! receiver's asynchronous status notifications with the playlist, volume
//! and mute state kept on this side. Notifications are delivered by the
//! owner through [`PlaybackSession::handle_status`]; the session never
//! spawns threads itself.

use std::path::{Path, PathBuf};
use std::time::Instant;

use cca_device::{DeviceHandle, IdleReason, LoadRequest, MediaStatus, RemoteState};
use tracing::{debug, info, warn};
use url::Url;

use crate::config::{MediaSource, SessionConfig};
use crate::error::{PlayerError, Result};
use crate::failure::{FailureWindow, StatusProbe};
use crate::media::{content_type_for, media_url, shuffled_audio_files, to_min_sec, TimeResolution};
use crate::playlist::Playlist;
use crate::state::PlayerState;
use crate::tags::{replace_cover, TrackTags};

/// Callback run once for every processed status notification
pub type StatusObserver = Box<dyn Fn(PlayerState) + Send>;

/// Live track information rendered for display.
///
/// Fields are empty when unknown.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct TrackInfo {
    pub artist: String,
    pub title: String,
    pub album: String,
    /// `mm:ss`
    pub current_time: String,
    /// `mm:ss`
    pub duration: String,
}

impl TrackInfo {
    fn from_status(status: &MediaStatus) -> Self {
        let time = |t: Option<f64>| t.map(|s| to_min_sec(s, TimeResolution::Seconds)).unwrap_or_default();
        Self {
            artist: status.artist.clone().unwrap_or_default(),
            title: status.title.clone().unwrap_or_default(),
            album: status.album.clone().unwrap_or_default(),
            current_time: time(status.current_time),
            duration: time(status.duration),
        }
    }

    pub fn is_empty(&self) -> bool {
        *self == TrackInfo::default()
    }
}

/// Result of starting a folder
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FolderOutcome {
    Started { count: usize },
    NoFiles,
}

/// What [`PlaybackSession::toggle_play_pause_or_start`] did
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ToggleAction {
    Paused,
    Resumed,
    Started { count: usize },
    NoFiles,
}

impl ToggleAction {
    pub fn label(self) -> &'static str {
        match self {
            ToggleAction::Paused => "PAUSED",
            ToggleAction::Resumed => "RESUMED",
            ToggleAction::Started { .. } => "STARTED",
            ToggleAction::NoFiles => "NO FILES",
        }
    }
}

/// One cast device's playback state, playlist and volume bookkeeping
pub struct PlaybackSession {
    device: Box<dyn DeviceHandle>,
    config: SessionConfig,
    media: MediaSource,
    state: PlayerState,
    playlist: Playlist,
    muted: bool,
    pre_mute_volume: f32,
    failures: FailureWindow,
    last_interrupt: Instant,
    verbose: bool,
    observer: Option<StatusObserver>,
}

impl PlaybackSession {
    pub fn new(device: Box<dyn DeviceHandle>, config: SessionConfig, media: MediaSource) -> Self {
        Self {
            device,
            failures: FailureWindow::new(config.failure_window),
            config,
            media,
            state: PlayerState::Unknown,
            playlist: Playlist::new(),
            muted: false,
            pre_mute_volume: 0.0,
            last_interrupt: Instant::now(),
            verbose: false,
            observer: None,
        }
    }

    pub fn set_observer(&mut self, observer: StatusObserver) {
        self.observer = Some(observer);
    }

    pub fn device(&self) -> &dyn DeviceHandle {
        self.device.as_ref()
    }

    pub fn device_name(&self) -> &str {
        self.device.name()
    }

    pub fn state(&self) -> PlayerState {
        self.state
    }

    pub fn playlist(&self) -> &Playlist {
        &self.playlist
    }

    pub fn is_muted(&self) -> bool {
        self.muted
    }

    pub fn pre_mute_volume(&self) -> f32 {
        self.pre_mute_volume
    }

    pub fn consecutive_failures(&self) -> u32 {
        self.failures.consecutive_failures()
    }

    pub fn media_source(&self) -> &MediaSource {
        &self.media
    }

    fn log_status(&self, msg: &str) {
        if self.verbose {
            info!(device = %self.device.name(), "Status: {}", msg);
        } else {
            debug!(device = %self.device.name(), "Status: {}", msg);
        }
    }

    // ---- status notifications ----

    /// Process one status notification from the receiver.
    ///
    /// May start the next playlist entry when the current one finished.
    /// The observer runs afterwards whether or not the state changed.
    pub fn handle_status(&mut self, status: &MediaStatus) -> Result<()> {
        self.handle_status_at(status, Instant::now())
    }

    pub fn handle_status_at(&mut self, status: &MediaStatus, now: Instant) -> Result<()> {
        let advance = self.apply_status(status, now);

        let result = if advance { self.advance_and_play() } else { Ok(()) };

        if let Some(observer) = &self.observer {
            observer(self.state);
        }
        result
    }

    /// Update `state` from a notification. Returns whether the playlist
    /// should advance.
    fn apply_status(&mut self, status: &MediaStatus, now: Instant) -> bool {
        let Some(player_state) = status.player_state else {
            return false;
        };

        match (player_state, status.idle_reason) {
            (RemoteState::Idle, Some(IdleReason::Finished)) => {
                if self.state == PlayerState::Idle {
                    return false;
                }
                self.log_status("FINISHED");
                self.state = PlayerState::Idle;
                !self.playlist.is_empty()
            }
            (RemoteState::Idle, Some(IdleReason::Cancelled)) => {
                if self.state != PlayerState::Idle {
                    self.log_status("STOPPED");
                    self.state = PlayerState::Idle;
                }
                false
            }
            (RemoteState::Idle, _) => false,
            (RemoteState::Playing, Some(IdleReason::Interrupted)) => {
                match self.state {
                    PlayerState::Paused => self.log_status("RESUMED"),
                    PlayerState::Playing => {
                        if now.saturating_duration_since(self.last_interrupt) >= self.config.interrupt_gap {
                            self.log_status("STARTED_NEW_SONG (interrupting previous)");
                        }
                        self.last_interrupt = now;
                    }
                    _ => self.log_status("Spurious PLAYING/INTERRUPTED"),
                }
                self.state = PlayerState::Playing;
                false
            }
            (RemoteState::Playing, _) => {
                if self.state != PlayerState::Playing {
                    self.log_status(match self.state {
                        PlayerState::Idle => "STARTED_FROM_IDLE",
                        _ => "PLAYING",
                    });
                    self.state = PlayerState::Playing;
                }
                false
            }
            (RemoteState::Paused, _) => {
                self.log_status("PAUSED");
                self.state = PlayerState::Paused;
                false
            }
            (RemoteState::Buffering, _) => {
                self.log_status("BUFFERING");
                self.state = PlayerState::Buffering;
                false
            }
        }
    }

    fn advance_and_play(&mut self) -> Result<()> {
        let Some(next) = self.playlist.advance().map(Path::to_path_buf) else {
            return Ok(());
        };
        let verbose = self.verbose;
        self.play_track(&next, verbose)
    }

    // ---- playback ----

    /// Load `path` on the receiver and wait briefly for it to start.
    ///
    /// The URL is `path` relative to the serve root, under `base_url`.
    /// Tags default to `Unknown ...`; embedded cover art replaces the cover
    /// image when a cover path is configured.
    pub fn play_file(&mut self, path: &Path, mime_type: &str, base_url: &Url) -> Result<()> {
        self.load_file(path, mime_type, base_url, true)
    }

    fn play_track(&mut self, path: &Path, verbose: bool) -> Result<()> {
        let base_url = self.media.base_url.clone();
        self.load_file(path, content_type_for(path), &base_url, verbose)
    }

    fn load_file(&mut self, path: &Path, mime_type: &str, base_url: &Url, verbose: bool) -> Result<()> {
        self.verbose = verbose;

        let url = media_url(base_url, &self.media.serve_root, path)?;
        info!(device = %self.device.name(), "Play: {}", url);

        let tags = TrackTags::read(path);
        let cover_url = self.update_cover(&tags);

        let request = LoadRequest {
            url: url.to_string(),
            content_type: mime_type.to_string(),
            title: tags.title,
            artist: tags.artist,
            album: tags.album,
            cover_url,
        };
        self.device.load(&request)?;

        if !self.device.wait_until_active(self.config.active_wait)? {
            debug!(device = %self.device.name(), "media session not active after {:?}", self.config.active_wait);
        }
        Ok(())
    }

    /// Swap the cover image for the track's art. Returns its URL if written.
    fn update_cover(&self, tags: &TrackTags) -> Option<String> {
        let cover_path = self.media.cover_path.as_ref()?;
        match replace_cover(cover_path, tags.cover.as_deref()) {
            Ok(true) => self.media.cover_url.as_ref().map(Url::to_string),
            Ok(false) => None,
            Err(e) => {
                warn!(path = %cover_path.display(), "failed to update cover art: {}", e);
                None
            }
        }
    }

    /// Replace the playlist and play its first entry.
    pub fn play_playlist(&mut self, files: Vec<PathBuf>) -> Result<()> {
        self.playlist.replace(files);
        match self.playlist.current().map(Path::to_path_buf) {
            Some(first) => self.play_track(&first, false),
            None => Ok(()),
        }
    }

    /// Shuffle the audio files below `folder` into a new playlist.
    pub fn play_folder(&mut self, folder: &Path) -> Result<FolderOutcome> {
        let files = shuffled_audio_files(folder)?;
        if files.is_empty() {
            info!("No files found under playlist folder: {}", folder.display());
            return Ok(FolderOutcome::NoFiles);
        }

        let count = files.len();
        info!("Playing playlist folder ({}) with {} files", folder.display(), count);
        self.play_playlist(files)?;
        Ok(FolderOutcome::Started { count })
    }

    pub fn next_track(&mut self) -> Result<()> {
        match self.playlist.advance().map(Path::to_path_buf) {
            Some(next) => self.play_track(&next, false),
            None => Ok(()),
        }
    }

    pub fn previous_track(&mut self) -> Result<()> {
        match self.playlist.retreat().map(Path::to_path_buf) {
            Some(previous) => self.play_track(&previous, false),
            None => Ok(()),
        }
    }

    pub fn pause(&mut self) -> Result<()> {
        info!(device = %self.device.name(), "Pause");
        Ok(self.device.pause()?)
    }

    pub fn resume(&mut self) -> Result<()> {
        info!(device = %self.device.name(), "Resume");
        Ok(self.device.play()?)
    }

    pub fn stop(&mut self) -> Result<()> {
        info!(device = %self.device.name(), "Stop");
        Ok(self.device.stop()?)
    }

    /// Pause when playing, resume when paused, otherwise start `default_folder`.
    ///
    /// Returns the state before the call and what was done.
    pub fn toggle_play_pause_or_start(&mut self, default_folder: &Path) -> Result<(PlayerState, ToggleAction)> {
        let previous = self.state;
        let action = match previous {
            PlayerState::Playing => {
                self.pause()?;
                ToggleAction::Paused
            }
            PlayerState::Paused => {
                self.resume()?;
                ToggleAction::Resumed
            }
            _ => match self.play_folder(default_folder)? {
                FolderOutcome::Started { count } => ToggleAction::Started { count },
                FolderOutcome::NoFiles => ToggleAction::NoFiles,
            },
        };
        Ok((previous, action))
    }

    // ---- volume ----

    pub fn volume(&self) -> Result<f32> {
        Ok(self.device.volume()?)
    }

    /// Set an absolute volume in `0.0..=1.0`.
    pub fn set_volume(&mut self, level: f32) -> Result<()> {
        if !(0.0..=1.0).contains(&level) {
            return Err(PlayerError::InvalidVolume(level));
        }
        info!(device = %self.device.name(), "SetVol: Setting volume to {:.2}", level);
        Ok(self.device.set_volume(level)?)
    }

    /// Raise the volume by `step`, capped at 1.0. When muted this unmutes
    /// instead. Returns the volume before and after.
    pub fn volume_up(&mut self, step: f32) -> Result<(f32, f32)> {
        self.step_volume(step)
    }

    /// Lower the volume by `step`, floored at 0.0. When muted this unmutes
    /// instead. Returns the volume before and after.
    pub fn volume_down(&mut self, step: f32) -> Result<(f32, f32)> {
        self.step_volume(-step)
    }

    fn step_volume(&mut self, delta: f32) -> Result<(f32, f32)> {
        let current = self.device.volume()?;
        if self.muted {
            self.toggle_mute()?;
            return Ok((current, self.pre_mute_volume));
        }

        let target = (current + delta).clamp(0.0, 1.0);
        info!(
            device = %self.device.name(),
            "Vol{}: Adjusting volume from {:.2} -> {:.2}",
            if delta >= 0.0 { "Up" } else { "Down" },
            current,
            target
        );
        self.device.set_volume(target)?;
        Ok((current, target))
    }

    /// Mute by setting the volume to zero, or restore the pre-mute volume.
    ///
    /// Returns whether the session is muted afterwards.
    pub fn toggle_mute(&mut self) -> Result<bool> {
        if self.muted {
            self.device.set_volume(self.pre_mute_volume)?;
            self.muted = false;
            info!(device = %self.device.name(), "Vol UNMuted");
        } else {
            let current = self.device.volume()?;
            self.device.set_volume(0.0)?;
            self.pre_mute_volume = current;
            self.muted = true;
            info!(device = %self.device.name(), "Vol Muted");
        }
        Ok(self.muted)
    }

    // ---- status queries ----

    /// Live track information, or `None` once the device is considered gone.
    ///
    /// Outside PLAYING, PAUSED and BUFFERING nothing is queried and the
    /// fields are empty. A failed query also yields empty fields until
    /// failures have persisted for the configured window; then the state
    /// drops to IDLE and `None` is returned. The caller must tear the
    /// session down.
    pub fn get_track_info(&mut self) -> Option<TrackInfo> {
        self.get_track_info_at(Instant::now())
    }

    pub fn get_track_info_at(&mut self, now: Instant) -> Option<TrackInfo> {
        if !self.state.has_media() {
            return Some(TrackInfo::default());
        }

        match StatusProbe::from(self.device.query_status()) {
            StatusProbe::Ok(status) => {
                self.failures.reset();
                Some(status.as_ref().map(TrackInfo::from_status).unwrap_or_default())
            }
            StatusProbe::Transient(e) => {
                debug!(
                    device = %self.device.name(),
                    failures = self.failures.consecutive_failures() + 1,
                    "status query failed: {}", e
                );
                if self.failures.record_failure(now) {
                    warn!(device = %self.device.name(), "no status for {:?}, disconnecting", self.config.failure_window);
                    self.mark_disconnected();
                    None
                } else {
                    Some(TrackInfo::default())
                }
            }
            StatusProbe::Disconnected(e) => {
                warn!(device = %self.device.name(), "device lost: {}", e);
                self.mark_disconnected();
                None
            }
        }
    }

    fn mark_disconnected(&mut self) {
        self.state = PlayerState::Idle;
        self.failures.reset();
    }

    /// Close the device connection.
    pub fn disconnect(&mut self) {
        self.device.disconnect();
    }
}

impl std::fmt::Debug for PlaybackSession {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("PlaybackSession")
            .field("device", &self.device.name())
            .field("state", &self.state)
            .field("playlist", &self.playlist)
            .field("muted", &self.muted)
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::testing::FakeDevice;
    use cca_device::DeviceError;
    use rstest::rstest;
    use std::fs;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::sync::Arc;
    use std::time::Duration;

    const ROOT: &str = "/music";

    fn session_with(device: &FakeDevice) -> PlaybackSession {
        session_in(device, Path::new(ROOT))
    }

    fn session_in(device: &FakeDevice, root: &Path) -> PlaybackSession {
        let media = MediaSource::new(Url::parse("http://127.0.0.1:8000/").unwrap(), root);
        PlaybackSession::new(Box::new(device.clone()), SessionConfig::default(), media)
    }

    fn status(state: RemoteState, reason: Option<IdleReason>) -> MediaStatus {
        MediaStatus::new(state, reason)
    }

    fn drive(session: &mut PlaybackSession, steps: &[(RemoteState, Option<IdleReason>)]) {
        for (state, reason) in steps {
            session.handle_status(&status(*state, *reason)).unwrap();
        }
    }

    fn files(names: &[&str]) -> Vec<PathBuf> {
        names.iter().map(|n| Path::new(ROOT).join(n)).collect()
    }

    use IdleReason::*;
    use RemoteState::*;

    #[rstest]
    #[case(&[], (Idle, Some(Finished)), PlayerState::Idle)]
    #[case(&[], (Idle, Some(Cancelled)), PlayerState::Idle)]
    #[case(&[], (Idle, None), PlayerState::Unknown)]
    #[case(&[], (Idle, Some(Error)), PlayerState::Unknown)]
    #[case(&[(Idle, Some(Cancelled))], (Playing, None), PlayerState::Playing)]
    #[case(&[(Idle, Some(Cancelled))], (Playing, Some(Finished)), PlayerState::Playing)]
    #[case(&[(Idle, Some(Cancelled))], (Playing, Some(Interrupted)), PlayerState::Playing)]
    #[case(&[(Playing, None)], (Paused, None), PlayerState::Paused)]
    #[case(&[(Idle, Some(Cancelled))], (Paused, None), PlayerState::Paused)]
    #[case(&[(Playing, None), (Paused, None)], (Playing, Some(Interrupted)), PlayerState::Playing)]
    #[case(&[(Playing, None)], (Playing, Some(Interrupted)), PlayerState::Playing)]
    #[case(&[(Playing, None)], (Buffering, None), PlayerState::Buffering)]
    #[case(&[(Paused, None)], (Buffering, None), PlayerState::Buffering)]
    #[case(&[(Playing, None)], (Idle, Some(Cancelled)), PlayerState::Idle)]
    #[case(&[(Playing, None)], (Idle, None), PlayerState::Playing)]
    fn test_status_transitions(
        #[case] setup: &[(RemoteState, Option<IdleReason>)],
        #[case] event: (RemoteState, Option<IdleReason>),
        #[case] expected: PlayerState,
    ) {
        let device = FakeDevice::new("Den");
        let mut session = session_with(&device);
        drive(&mut session, setup);

        session.handle_status(&status(event.0, event.1)).unwrap();
        assert_eq!(session.state(), expected);
    }

    #[test]
    fn test_notification_without_player_state_is_ignored() {
        let device = FakeDevice::new("Den");
        let mut session = session_with(&device);
        drive(&mut session, &[(Playing, None)]);

        session.handle_status(&MediaStatus::default()).unwrap();
        assert_eq!(session.state(), PlayerState::Playing);
    }

    #[test]
    fn test_finished_advances_and_wraps_playlist() {
        let device = FakeDevice::new("Den");
        let mut session = session_with(&device);
        session.play_playlist(files(&["a.mp3", "b.mp3", "c.mp3"])).unwrap();
        session.next_track().unwrap();
        session.next_track().unwrap();
        assert_eq!(session.playlist().cursor(), Some(2));
        drive(&mut session, &[(Playing, None)]);

        session.handle_status(&status(Idle, Some(Finished))).unwrap();

        assert_eq!(session.state(), PlayerState::Idle);
        assert_eq!(session.playlist().cursor(), Some(0));
        let loads = device.loads();
        assert_eq!(loads.len(), 4);
        assert_eq!(loads[3].url, "http://127.0.0.1:8000/a.mp3");
    }

    #[test]
    fn test_finished_while_idle_does_not_advance() {
        let device = FakeDevice::new("Den");
        let mut session = session_with(&device);
        session.play_playlist(files(&["a.mp3", "b.mp3"])).unwrap();
        drive(&mut session, &[(Idle, Some(Cancelled))]);

        session.handle_status(&status(Idle, Some(Finished))).unwrap();

        assert_eq!(session.playlist().cursor(), Some(0));
        assert_eq!(device.loads().len(), 1);
    }

    #[test]
    fn test_finished_without_playlist_only_goes_idle() {
        let device = FakeDevice::new("Den");
        let mut session = session_with(&device);
        drive(&mut session, &[(Playing, None), (Idle, Some(Finished))]);

        assert_eq!(session.state(), PlayerState::Idle);
        assert!(device.loads().is_empty());
    }

    #[test]
    fn test_observer_runs_once_per_notification() {
        let device = FakeDevice::new("Den");
        let mut session = session_with(&device);
        let count = Arc::new(AtomicUsize::new(0));
        let seen = Arc::clone(&count);
        session.set_observer(Box::new(move |_| {
            seen.fetch_add(1, Ordering::SeqCst);
        }));

        drive(&mut session, &[(Playing, None), (Playing, None), (Idle, None)]);
        assert_eq!(count.load(Ordering::SeqCst), 3);
    }

    #[test]
    fn test_interrupted_while_playing_stays_playing() {
        let device = FakeDevice::new("Den");
        let mut session = session_with(&device);
        drive(&mut session, &[(Playing, None)]);
        let start = Instant::now();

        for offset in [0, 500, 3000, 3100] {
            session
                .handle_status_at(&status(Playing, Some(Interrupted)), start + Duration::from_millis(offset))
                .unwrap();
            assert_eq!(session.state(), PlayerState::Playing);
        }
        assert!(device.loads().is_empty());
    }

    #[test]
    fn test_next_and_previous_wrap() {
        let device = FakeDevice::new("Den");
        let mut session = session_with(&device);
        session.play_playlist(files(&["a.mp3", "b.mp3", "c.mp3"])).unwrap();

        session.previous_track().unwrap();
        assert_eq!(session.playlist().cursor(), Some(2));
        for _ in 0..3 {
            session.next_track().unwrap();
        }
        assert_eq!(session.playlist().cursor(), Some(2));

        let urls: Vec<_> = device.loads().into_iter().map(|l| l.url).collect();
        assert_eq!(urls[0], "http://127.0.0.1:8000/a.mp3");
        assert_eq!(urls[1], "http://127.0.0.1:8000/c.mp3");
        assert_eq!(urls[2], "http://127.0.0.1:8000/a.mp3");
    }

    #[test]
    fn test_track_commands_without_playlist_are_noops() {
        let device = FakeDevice::new("Den");
        let mut session = session_with(&device);

        session.next_track().unwrap();
        session.previous_track().unwrap();
        session.play_playlist(Vec::new()).unwrap();
        assert!(device.loads().is_empty());
        assert_eq!(session.playlist().cursor(), None);
    }

    #[test]
    fn test_play_file_builds_load_request() {
        let dir = tempfile::tempdir().unwrap();
        let song = dir.path().join("ZPL").join("My Song.mp3");
        fs::create_dir_all(song.parent().unwrap()).unwrap();
        fs::write(&song, b"not audio").unwrap();
        let cover = dir.path().join("cover.jpg");
        fs::write(&cover, b"stale").unwrap();

        let device = FakeDevice::new("Den");
        let media = MediaSource::new(Url::parse("http://10.0.0.2:8000/").unwrap(), dir.path())
            .with_cover(&cover, Url::parse("http://10.0.0.2:8000/cover.jpg").unwrap());
        let mut session = PlaybackSession::new(Box::new(device.clone()), SessionConfig::default(), media);
        let base = session.media_source().base_url.clone();

        session.play_file(&song, "audio/mpeg", &base).unwrap();

        let loads = device.loads();
        assert_eq!(loads.len(), 1);
        assert_eq!(loads[0].url, "http://10.0.0.2:8000/ZPL/My%20Song.mp3");
        assert_eq!(loads[0].content_type, "audio/mpeg");
        assert_eq!(loads[0].artist, "Unknown artist");
        assert_eq!(loads[0].title, "Unknown title");
        assert_eq!(loads[0].album, "Unknown album");
        assert_eq!(loads[0].cover_url, None);
        assert!(!cover.exists());
    }

    #[test]
    fn test_cover_art_is_published_at_cover_url() {
        let dir = tempfile::tempdir().unwrap();
        let cover = dir.path().join("web").join("cover.jpg");
        fs::create_dir_all(cover.parent().unwrap()).unwrap();

        let device = FakeDevice::new("Den");
        let media = MediaSource::new(Url::parse("http://10.0.0.2:8000/").unwrap(), dir.path())
            .with_cover(&cover, Url::parse("http://10.0.0.2:8000/cover.jpg").unwrap());
        let session = PlaybackSession::new(Box::new(device), SessionConfig::default(), media);
        let tags = TrackTags {
            cover: Some(b"jpeg bytes".to_vec()),
            ..TrackTags::default()
        };

        let url = session.update_cover(&tags);

        assert_eq!(url.as_deref(), Some("http://10.0.0.2:8000/cover.jpg"));
        assert_eq!(fs::read(&cover).unwrap(), b"jpeg bytes");
    }

    #[test]
    fn test_play_file_outside_root_fails_before_load() {
        let device = FakeDevice::new("Den");
        let mut session = session_with(&device);
        let base = session.media_source().base_url.clone();

        let err = session.play_file(Path::new("/elsewhere/a.mp3"), "audio/mpeg", &base).unwrap_err();
        assert!(matches!(err, PlayerError::OutsideServeRoot { .. }));
        assert!(device.loads().is_empty());
    }

    #[test]
    fn test_load_failure_propagates() {
        let device = FakeDevice::new("Den");
        device.fail_commands(DeviceError::Command {
            command: "load",
            reason: "LOAD_FAILED".into(),
        });
        let mut session = session_with(&device);

        let err = session.play_playlist(files(&["a.mp3"])).unwrap_err();
        assert!(matches!(err, PlayerError::Device(DeviceError::Command { .. })));
    }

    #[test]
    fn test_pause_and_resume_leave_state_alone() {
        let device = FakeDevice::new("Den");
        let mut session = session_with(&device);
        drive(&mut session, &[(Playing, None)]);

        session.pause().unwrap();
        assert_eq!(session.state(), PlayerState::Playing);
        session.resume().unwrap();
        session.stop().unwrap();
        assert_eq!(device.calls(), vec!["pause", "play", "stop"]);
    }

    #[test]
    fn test_toggle_play_pause() {
        let device = FakeDevice::new("Den");
        let mut session = session_with(&device);
        drive(&mut session, &[(Playing, None)]);
        let folder = Path::new("/unused");

        let (previous, action) = session.toggle_play_pause_or_start(folder).unwrap();
        assert_eq!((previous, action), (PlayerState::Playing, ToggleAction::Paused));

        drive(&mut session, &[(Paused, None)]);
        let (previous, action) = session.toggle_play_pause_or_start(folder).unwrap();
        assert_eq!((previous, action), (PlayerState::Paused, ToggleAction::Resumed));
    }

    #[test]
    fn test_toggle_starts_default_folder_when_idle() {
        let dir = tempfile::tempdir().unwrap();
        for name in ["a.mp3", "b.mp3"] {
            fs::write(dir.path().join(name), b"").unwrap();
        }
        let device = FakeDevice::new("Den");
        let mut session = session_in(&device, dir.path());

        let (previous, action) = session.toggle_play_pause_or_start(dir.path()).unwrap();
        assert_eq!(previous, PlayerState::Unknown);
        assert_eq!(action, ToggleAction::Started { count: 2 });
        assert_eq!(session.playlist().len(), 2);
        assert_eq!(device.loads().len(), 1);
    }

    #[test]
    fn test_play_folder_without_files() {
        let dir = tempfile::tempdir().unwrap();
        fs::write(dir.path().join("readme.txt"), b"").unwrap();
        let device = FakeDevice::new("Den");
        let mut session = session_in(&device, dir.path());

        assert_eq!(session.play_folder(dir.path()).unwrap(), FolderOutcome::NoFiles);
        assert!(session.playlist().is_empty());
        assert!(device.loads().is_empty());

        let err = session.play_folder(&dir.path().join("missing")).unwrap_err();
        assert!(matches!(err, PlayerError::FolderNotFound(_)));
    }

    #[rstest]
    #[case(0.97, 0.05, 1.0)]
    #[case(1.0, 0.05, 1.0)]
    #[case(0.5, 0.1, 0.6)]
    fn test_volume_up_clamps(#[case] start: f32, #[case] step: f32, #[case] expected: f32) {
        let device = FakeDevice::new("Den").with_volume(start);
        let mut session = session_with(&device);

        let (before, after) = session.volume_up(step).unwrap();
        assert_eq!(before, start);
        assert!((after - expected).abs() < 1e-6);
        assert!(device.volume_level() <= 1.0);
    }

    #[rstest]
    #[case(0.02, 0.05, 0.0)]
    #[case(0.0, 0.05, 0.0)]
    #[case(0.5, 0.1, 0.4)]
    fn test_volume_down_clamps(#[case] start: f32, #[case] step: f32, #[case] expected: f32) {
        let device = FakeDevice::new("Den").with_volume(start);
        let mut session = session_with(&device);

        let (_, after) = session.volume_down(step).unwrap();
        assert!((after - expected).abs() < 1e-6);
        assert!(device.volume_level() >= 0.0);
    }

    #[test]
    fn test_mute_round_trip() {
        let device = FakeDevice::new("Den").with_volume(0.37);
        let mut session = session_with(&device);

        assert!(session.toggle_mute().unwrap());
        assert_eq!(device.volume_level(), 0.0);
        assert_eq!(session.pre_mute_volume(), 0.37);

        assert!(!session.toggle_mute().unwrap());
        assert_eq!(device.volume_level(), 0.37);
    }

    #[test]
    fn test_volume_step_while_muted_unmutes() {
        let device = FakeDevice::new("Den").with_volume(0.6);
        let mut session = session_with(&device);
        session.toggle_mute().unwrap();

        let (before, after) = session.volume_down(0.05).unwrap();
        assert_eq!(before, 0.0);
        assert_eq!(after, 0.6);
        assert!(!session.is_muted());
        assert_eq!(device.volume_level(), 0.6);
    }

    #[rstest]
    #[case(-0.1)]
    #[case(1.01)]
    #[case(f32::NAN)]
    fn test_set_volume_rejects_out_of_range(#[case] level: f32) {
        let device = FakeDevice::new("Den");
        let mut session = session_with(&device);

        assert!(matches!(session.set_volume(level), Err(PlayerError::InvalidVolume(_))));
        assert!(device.calls().is_empty());
    }

    #[test]
    fn test_track_info_formats_status() {
        let device = FakeDevice::new("Den");
        let mut session = session_with(&device);
        drive(&mut session, &[(Playing, None)]);
        device.push_status(Ok(Some(MediaStatus {
            player_state: Some(Playing),
            artist: Some("Band".into()),
            title: Some("Song".into()),
            album: None,
            current_time: Some(65.2),
            duration: Some(215.0),
            ..Default::default()
        })));

        let info = session.get_track_info().unwrap();
        assert_eq!(info.artist, "Band");
        assert_eq!(info.title, "Song");
        assert_eq!(info.album, "");
        assert_eq!(info.current_time, "01:05");
        assert_eq!(info.duration, "03:35");
    }

    #[test]
    fn test_track_info_not_queried_without_media() {
        let device = FakeDevice::new("Den");
        device.set_default_status(Err(DeviceError::NotConnected("Den".into())));
        let mut session = session_with(&device);

        for _ in 0..5 {
            assert_eq!(session.get_track_info(), Some(TrackInfo::default()));
        }
        assert_eq!(session.state(), PlayerState::Unknown);
        assert_eq!(session.consecutive_failures(), 0);
        assert!(device.calls().is_empty());
    }

    #[test]
    fn test_sustained_failures_disconnect_after_window() {
        let device = FakeDevice::new("Den");
        let mut session = session_with(&device);
        drive(&mut session, &[(Playing, None)]);
        device.set_default_status(Err(DeviceError::ControllerUnavailable("Den".into())));
        let start = Instant::now();

        for ms in [0, 1000, 2000, 3000, 3999] {
            let info = session.get_track_info_at(start + Duration::from_millis(ms));
            assert_eq!(info, Some(TrackInfo::default()));
        }
        assert_eq!(session.consecutive_failures(), 5);

        assert_eq!(session.get_track_info_at(start + Duration::from_secs(4)), None);
        assert_eq!(session.state(), PlayerState::Idle);
        assert_eq!(session.consecutive_failures(), 0);
    }

    #[test]
    fn test_success_resets_failure_streak() {
        let device = FakeDevice::new("Den");
        let mut session = session_with(&device);
        drive(&mut session, &[(Playing, None)]);
        let start = Instant::now();

        device.push_status(Err(DeviceError::Timeout("status".into())));
        device.push_status(Ok(None));
        device.push_status(Err(DeviceError::Timeout("status".into())));

        assert!(session.get_track_info_at(start).is_some());
        assert!(session.get_track_info_at(start + Duration::from_secs(3)).is_some());
        assert_eq!(session.consecutive_failures(), 0);
        assert!(session.get_track_info_at(start + Duration::from_secs(5)).is_some());
        assert_eq!(session.consecutive_failures(), 1);
        assert_eq!(session.state(), PlayerState::Playing);
    }

    #[test]
    fn test_closed_handle_disconnects_immediately() {
        let device = FakeDevice::new("Den");
        let mut session = session_with(&device);
        drive(&mut session, &[(Paused, None)]);
        device.push_status(Err(DeviceError::Closed));

        assert_eq!(session.get_track_info(), None);
        assert_eq!(session.state(), PlayerState::Idle);
    }
}
