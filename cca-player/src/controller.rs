//! Thread-safe command facade
//!
//! The console loop and the HTTP handlers both drive the player through a
//! [`Controller`]. Every command runs with the registry lock held, so
//! commands from different threads are serialized. Status notifications
//! from the device are pumped into the registry under the same lock by a
//! thread per session.

use std::fmt;
use std::str::FromStr;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::thread;

use cca_discovery::DeviceDescriptor;
use parking_lot::Mutex;
use thiserror::Error;
use tracing::{debug, info, warn};

use crate::error::Result;
use crate::registry::{SessionRegistry, StatusFeed, StatusReport};
use crate::session::{FolderOutcome, ToggleAction};
use crate::state::PlayerState;

/// Commands understood by the facade
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Command {
    ToggleMute,
    VolumeUp,
    VolumeDown,
    PreviousTrack,
    NextTrack,
    PlayPauseResume,
    PlayFolder,
    SelectDevice(char),
    GetStatus,
    ScanDevices,
}

impl Command {
    pub fn name(&self) -> &'static str {
        match self {
            Command::ToggleMute => "volume_toggle_mute",
            Command::VolumeUp => "volume_up",
            Command::VolumeDown => "volume_down",
            Command::PreviousTrack => "prev_track",
            Command::NextTrack => "next_track",
            Command::PlayPauseResume => "play_pause_resume",
            Command::PlayFolder => "play_folder",
            Command::SelectDevice(_) => "select_device",
            Command::GetStatus => "get_status",
            Command::ScanDevices => "scan_devices",
        }
    }
}

impl fmt::Display for Command {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Command::SelectDevice(key) => write!(f, "select_device {}", key),
            other => f.write_str(other.name()),
        }
    }
}

/// Command text that is not part of the remote command set
#[derive(Error, Debug, Clone, PartialEq, Eq)]
#[error("Unknown command: {0:?}")]
pub struct UnknownCommand(pub String);

impl FromStr for Command {
    type Err = UnknownCommand;

    /// Parse the text of a remote command.
    ///
    /// Only the commands the web page sends are accepted; `play_folder` is
    /// reserved for the console.
    fn from_str(text: &str) -> std::result::Result<Self, Self::Err> {
        let command = match text {
            "volume_toggle_mute" => Command::ToggleMute,
            "volume_up" => Command::VolumeUp,
            "volume_down" => Command::VolumeDown,
            "prev_track" => Command::PreviousTrack,
            "next_track" => Command::NextTrack,
            "play_pause_resume" => Command::PlayPauseResume,
            "get_status" => Command::GetStatus,
            "scan_devices" => Command::ScanDevices,
            other => {
                let key = other
                    .strip_prefix("select_device ")
                    .and_then(|arg| {
                        let mut chars = arg.chars();
                        match (chars.next(), chars.next()) {
                            (Some(key), None) => Some(key),
                            _ => None,
                        }
                    })
                    .ok_or_else(|| UnknownCommand(text.to_string()))?;
                Command::SelectDevice(key)
            }
        };
        Ok(command)
    }
}

/// What a command did
#[derive(Debug, Clone, PartialEq)]
pub enum Outcome {
    /// Nothing to report, including commands ignored for lack of a device
    Done,
    Status(StatusReport),
    Devices(Vec<(char, DeviceDescriptor)>),
    Selected { name: String, model: String },
    AlreadySelected { name: String },
    Volume { before: f32, after: f32 },
    Muted(bool),
    Toggled { previous: PlayerState, action: ToggleAction },
    Folder(FolderOutcome),
}

impl Outcome {
    /// Plain-text response body for remote callers
    pub fn body(&self) -> String {
        match self {
            Outcome::Status(report) => report.to_string(),
            Outcome::Devices(devices) => devices
                .iter()
                .map(|(key, device)| format!("{},{}", key, device.name))
                .collect::<Vec<_>>()
                .join("\n"),
            _ => String::new(),
        }
    }
}

/// Clonable handle serializing access to the registry
#[derive(Clone)]
pub struct Controller {
    registry: Arc<Mutex<SessionRegistry>>,
    connected: Arc<AtomicBool>,
}

impl Controller {
    pub fn new(mut registry: SessionRegistry) -> Self {
        let connected = Arc::new(AtomicBool::new(false));

        let flag = Arc::clone(&connected);
        registry.set_observer(Arc::new(move |state| {
            if flag
                .compare_exchange(false, true, Ordering::AcqRel, Ordering::Acquire)
                .is_ok()
            {
                info!(state = %state, "first status received, connected");
            }
        }));

        Self {
            registry: Arc::new(Mutex::new(registry)),
            connected,
        }
    }

    /// Whether the active session has received a status notification yet
    pub fn is_connected(&self) -> bool {
        self.connected.load(Ordering::Acquire)
    }

    /// Run `f` with the registry locked
    pub fn with_registry<R>(&self, f: impl FnOnce(&mut SessionRegistry) -> R) -> R {
        f(&mut self.registry.lock())
    }

    /// Execute one command.
    ///
    /// Playback and volume commands are ignored when no device is selected.
    pub fn execute(&self, command: Command) -> Result<Outcome> {
        match command {
            Command::SelectDevice(key) => {
                let device = self.with_registry(|registry| registry.device_for_key(key).cloned());
                match device {
                    Some(device) => self.select(&device),
                    None => Err(crate::PlayerError::UnknownKey(key)),
                }
            }
            Command::ScanDevices => {
                let devices = self.with_registry(|registry| registry.scan().map(|d| d.to_vec()))?;
                Ok(Outcome::Devices(devices))
            }
            Command::GetStatus => Ok(Outcome::Status(self.status())),
            _ => self.with_session_command(command),
        }
    }

    /// Make `device` active, starting a status pump for the new session.
    pub fn select(&self, device: &DeviceDescriptor) -> Result<Outcome> {
        let mut registry = self.registry.lock();
        match registry.select(device)? {
            Some(feed) => {
                self.connected.store(false, Ordering::Release);
                self.spawn_status_pump(feed);
                Ok(Outcome::Selected {
                    name: device.name.clone(),
                    model: device.model_name.clone(),
                })
            }
            None => Ok(Outcome::AlreadySelected {
                name: device.name.clone(),
            }),
        }
    }

    pub fn status(&self) -> StatusReport {
        self.registry.lock().active_status()
    }

    /// Disconnect the active session
    pub fn shutdown(&self) {
        self.registry.lock().disconnect();
    }

    fn with_session_command(&self, command: Command) -> Result<Outcome> {
        let mut registry = self.registry.lock();
        let config = registry.config().clone();
        let Some(session) = registry.session_mut() else {
            debug!(%command, "no device selected, ignoring");
            return Ok(Outcome::Done);
        };

        let outcome = match command {
            Command::ToggleMute => Outcome::Muted(session.toggle_mute()?),
            Command::VolumeUp => {
                let (before, after) = session.volume_up(config.volume_step)?;
                Outcome::Volume { before, after }
            }
            Command::VolumeDown => {
                let (before, after) = session.volume_down(config.volume_step)?;
                Outcome::Volume { before, after }
            }
            Command::PreviousTrack => {
                session.previous_track()?;
                Outcome::Done
            }
            Command::NextTrack => {
                session.next_track()?;
                Outcome::Done
            }
            Command::PlayPauseResume => {
                let (previous, action) = session.toggle_play_pause_or_start(&config.default_folder)?;
                info!(previous = %previous, action = action.label(), "play/pause");
                Outcome::Toggled { previous, action }
            }
            Command::PlayFolder => Outcome::Folder(session.play_folder(&config.default_folder)?),
            Command::SelectDevice(_) | Command::GetStatus | Command::ScanDevices => Outcome::Done,
        };
        Ok(outcome)
    }

    /// Feed the session's notifications into the registry until the session
    /// is replaced or its device stops sending.
    fn spawn_status_pump(&self, feed: StatusFeed) {
        let registry = Arc::clone(&self.registry);
        let generation = feed.generation;

        let spawned = thread::Builder::new()
            .name(format!("status-pump-{}", generation))
            .spawn(move || {
                for status in feed.updates.iter() {
                    let mut registry = registry.lock();
                    match registry.dispatch_status(generation, &status) {
                        Ok(true) => {}
                        Ok(false) => break,
                        Err(e) => warn!(generation, "status update failed: {}", e),
                    }
                }
                debug!(generation, "status pump finished");
            });

        if let Err(e) = spawned {
            warn!("failed to start status pump: {}", e);
        }
    }
}

impl fmt::Debug for Controller {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Controller")
            .field("connected", &self.is_connected())
            .finish()
    }
}
