//! Device selector keys and the active session
//!
//! The registry maps single-character selector keys to discovered devices
//! and owns at most one [`PlaybackSession`]. Each session it creates gets a
//! generation number; status notifications are delivered tagged with it so
//! that updates from a replaced device are dropped.

use std::fmt;
use std::sync::{mpsc, Arc};
use std::time::Duration;

use cca_device::{ChromecastDevice, DeviceHandle, MediaStatus};
use cca_discovery::{DeviceDescriptor, Discovered};
use tracing::{info, warn};

use crate::config::PlayerConfig;
use crate::error::{PlayerError, Result};
use crate::session::PlaybackSession;
use crate::state::PlayerState;

/// Selector keys in assignment order
pub const SELECTOR_KEYS: [char; 10] = ['1', '2', '3', '4', '5', '6', '7', '8', '9', '0'];

/// Where devices come from and how they are connected to
pub trait DeviceProvider: Send + Sync {
    fn discover(&self) -> Discovered;

    fn connect(&self, device: &DeviceDescriptor) -> cca_device::Result<Box<dyn DeviceHandle>>;
}

/// Discovers over mDNS and connects with [`ChromecastDevice`]
#[derive(Debug, Clone)]
pub struct NetworkProvider {
    timeout: Duration,
}

impl NetworkProvider {
    pub fn new(timeout: Duration) -> Self {
        Self { timeout }
    }
}

impl Default for NetworkProvider {
    fn default() -> Self {
        Self::new(cca_discovery::DEFAULT_TIMEOUT)
    }
}

impl DeviceProvider for NetworkProvider {
    fn discover(&self) -> Discovered {
        cca_discovery::discover_with_timeout(self.timeout)
    }

    fn connect(&self, device: &DeviceDescriptor) -> cca_device::Result<Box<dyn DeviceHandle>> {
        let handle = ChromecastDevice::connect(device)?;
        Ok(Box::new(handle))
    }
}

/// Assign selector keys: audio devices from the front of
/// [`SELECTOR_KEYS`], groups at the back so the last group gets `'0'`.
///
/// Both lists are expected sorted by name, as [`Discovered`] keeps them.
/// The result is in key order.
pub fn assign_keys(discovered: &Discovered) -> Result<Vec<(char, DeviceDescriptor)>> {
    let total = discovered.len();
    if total > SELECTOR_KEYS.len() {
        return Err(PlayerError::TooManyDevices(total));
    }

    let audios = discovered.audios.iter().zip(SELECTOR_KEYS.iter());
    let group_keys = &SELECTOR_KEYS[SELECTOR_KEYS.len() - discovered.groups.len()..];
    let groups = discovered.groups.iter().zip(group_keys.iter());

    Ok(audios
        .chain(groups)
        .map(|(device, key)| (*key, device.clone()))
        .collect())
}

/// Status notifications for one session generation
#[derive(Debug)]
pub struct StatusFeed {
    pub generation: u64,
    pub updates: mpsc::Receiver<MediaStatus>,
}

/// Nine-field status line shown by the console and the web page
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct StatusReport {
    pub connected: bool,
    pub device: String,
    /// `(0.40)`, or `(0.40x)` with the pre-mute volume while muted
    pub volume: String,
    pub artist: String,
    pub title: String,
    pub album: String,
    pub current_time: String,
    pub duration: String,
    pub paused: bool,
}

impl StatusReport {
    /// The report as its nine fields. Without a connected device every field
    /// but the flag is empty.
    pub fn fields(&self) -> [String; 9] {
        let flag = |b: bool| if b { "1" } else { "0" }.to_string();
        [
            flag(self.connected),
            self.device.clone(),
            self.volume.clone(),
            self.artist.clone(),
            self.title.clone(),
            self.album.clone(),
            self.current_time.clone(),
            self.duration.clone(),
            if self.connected {
                flag(self.paused)
            } else {
                String::new()
            },
        ]
    }
}

impl fmt::Display for StatusReport {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.fields().join("\n"))
    }
}

/// Shared callback installed on every new session
pub type SharedObserver = Arc<dyn Fn(PlayerState) + Send + Sync>;

struct ActiveSession {
    generation: u64,
    session: PlaybackSession,
}

/// Selector keys, discovered devices and the one active session
pub struct SessionRegistry {
    provider: Arc<dyn DeviceProvider>,
    config: PlayerConfig,
    devices: Vec<(char, DeviceDescriptor)>,
    active: Option<ActiveSession>,
    generation: u64,
    observer: Option<SharedObserver>,
}

impl SessionRegistry {
    pub fn new(provider: Arc<dyn DeviceProvider>, config: PlayerConfig) -> Self {
        Self {
            provider,
            config,
            devices: Vec::new(),
            active: None,
            generation: 0,
            observer: None,
        }
    }

    pub fn config(&self) -> &PlayerConfig {
        &self.config
    }

    pub fn set_observer(&mut self, observer: SharedObserver) {
        self.observer = Some(observer);
    }

    /// Rediscover devices and rebuild the key mapping.
    ///
    /// On error the previous mapping is kept.
    pub fn scan(&mut self) -> Result<&[(char, DeviceDescriptor)]> {
        let discovered = self.provider.discover();
        self.devices = assign_keys(&discovered)?;
        info!(
            audios = discovered.audios.len(),
            groups = discovered.groups.len(),
            "device scan complete"
        );
        Ok(&self.devices)
    }

    pub fn devices(&self) -> &[(char, DeviceDescriptor)] {
        &self.devices
    }

    pub fn device_for_key(&self, key: char) -> Option<&DeviceDescriptor> {
        self.devices
            .iter()
            .find(|(k, _)| *k == key)
            .map(|(_, device)| device)
    }

    /// Make the device on `key` the active one.
    ///
    /// Returns `None` when that device is already active. Otherwise the old
    /// session is disconnected before the new device is connected, and the
    /// new session's status feed is returned for the caller to pump.
    pub fn select_device(&mut self, key: char) -> Result<Option<StatusFeed>> {
        let device = self
            .device_for_key(key)
            .cloned()
            .ok_or(PlayerError::UnknownKey(key))?;
        self.select(&device)
    }

    /// Make `device` the active one. See [`SessionRegistry::select_device`].
    pub fn select(&mut self, device: &DeviceDescriptor) -> Result<Option<StatusFeed>> {
        if self.active_name() == Some(device.name.as_str()) {
            return Ok(None);
        }

        self.disconnect();

        let handle = self.provider.connect(device)?;
        let (tx, updates) = mpsc::channel();
        handle.register_status_listener(tx)?;

        let mut session = PlaybackSession::new(
            handle,
            self.config.session.clone(),
            self.config.media.clone(),
        );
        if let Some(observer) = &self.observer {
            let observer = Arc::clone(observer);
            session.set_observer(Box::new(move |state| observer(state)));
        }

        self.generation += 1;
        self.active = Some(ActiveSession {
            generation: self.generation,
            session,
        });
        info!(device = %device.name, model = %device.model_name, "Selected");

        Ok(Some(StatusFeed {
            generation: self.generation,
            updates,
        }))
    }

    /// Hand a notification to the session of `generation`.
    ///
    /// Returns `false` when that session is no longer active.
    pub fn dispatch_status(&mut self, generation: u64, status: &MediaStatus) -> Result<bool> {
        match self.active.as_mut() {
            Some(active) if active.generation == generation => {
                active.session.handle_status(status)?;
                Ok(true)
            }
            _ => Ok(false),
        }
    }

    pub fn active_name(&self) -> Option<&str> {
        self.active.as_ref().map(|a| a.session.device_name())
    }

    pub fn active_generation(&self) -> Option<u64> {
        self.active.as_ref().map(|a| a.generation)
    }

    pub fn session(&self) -> Option<&PlaybackSession> {
        self.active.as_ref().map(|a| &a.session)
    }

    pub fn session_mut(&mut self) -> Option<&mut PlaybackSession> {
        self.active.as_mut().map(|a| &mut a.session)
    }

    /// Disconnect and drop the active session, if any.
    pub fn disconnect(&mut self) {
        if let Some(mut active) = self.active.take() {
            info!(device = %active.session.device_name(), "closing session");
            active.session.disconnect();
        }
    }

    /// Assemble the status report from the active session.
    ///
    /// When the session reports its device gone, the session is torn down
    /// and the report says disconnected, still naming the device.
    pub fn active_status(&mut self) -> StatusReport {
        let Some(active) = self.active.as_mut() else {
            return StatusReport::default();
        };
        let session = &mut active.session;

        let device = session.device_name().to_string();

        let Some(info) = session.get_track_info() else {
            warn!(device = %device, "device disconnected");
            self.disconnect();
            return StatusReport {
                connected: false,
                device,
                ..Default::default()
            };
        };

        // A device that is failing status queries would fail this too.
        let volume = if session.is_muted() {
            format!("({:.2}x)", session.pre_mute_volume())
        } else if session.consecutive_failures() > 0 {
            "(?)".to_string()
        } else {
            match session.volume() {
                Ok(level) => format!("({:.2})", level),
                Err(_) => "(?)".to_string(),
            }
        };

        StatusReport {
            connected: true,
            device,
            volume,
            artist: info.artist,
            title: info.title,
            album: info.album,
            current_time: info.current_time,
            duration: info.duration,
            paused: session.state() == PlayerState::Paused,
        }
    }
}

impl Drop for SessionRegistry {
    fn drop(&mut self) {
        self.disconnect();
    }
}

impl fmt::Debug for SessionRegistry {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("SessionRegistry")
            .field("devices", &self.devices)
            .field("active", &self.active_name())
            .field("generation", &self.generation)
            .finish()
    }
}
