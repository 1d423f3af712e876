//! In-memory devices for driving the player without a network
//!
//! [`FakeDevice`] records every call and answers status queries from a
//! script. Clones share state, so a test keeps one clone for inspection
//! while the session owns another.
//!
//! Built for this crate's tests and with the `test-support` feature.

use std::collections::{HashMap, VecDeque};
use std::sync::{mpsc, Arc};
use std::time::Duration;

use cca_device::{DeviceError, DeviceHandle, LoadRequest, MediaStatus};
use cca_discovery::{CastKind, DeviceDescriptor, Discovered};
use parking_lot::Mutex;

use crate::registry::DeviceProvider;

#[derive(Debug)]
struct FakeState {
    volume: f32,
    calls: Vec<String>,
    loads: Vec<LoadRequest>,
    scripted_status: VecDeque<cca_device::Result<Option<MediaStatus>>>,
    default_status: cca_device::Result<Option<MediaStatus>>,
    listeners: Vec<mpsc::Sender<MediaStatus>>,
    command_error: Option<DeviceError>,
    active: bool,
    disconnected: bool,
}

/// Scriptable [`DeviceHandle`]
#[derive(Debug, Clone)]
pub struct FakeDevice {
    name: String,
    state: Arc<Mutex<FakeState>>,
}

impl FakeDevice {
    pub fn new(name: &str) -> Self {
        Self {
            name: name.to_string(),
            state: Arc::new(Mutex::new(FakeState {
                volume: 0.5,
                calls: Vec::new(),
                loads: Vec::new(),
                scripted_status: VecDeque::new(),
                default_status: Ok(None),
                listeners: Vec::new(),
                command_error: None,
                active: true,
                disconnected: false,
            })),
        }
    }

    pub fn with_volume(self, volume: f32) -> Self {
        self.state.lock().volume = volume;
        self
    }

    pub fn volume_level(&self) -> f32 {
        self.state.lock().volume
    }

    /// Names of the calls made so far, in order
    pub fn calls(&self) -> Vec<String> {
        self.state.lock().calls.clone()
    }

    pub fn loads(&self) -> Vec<LoadRequest> {
        self.state.lock().loads.clone()
    }

    /// Queue one answer for `query_status`
    pub fn push_status(&self, result: cca_device::Result<Option<MediaStatus>>) {
        self.state.lock().scripted_status.push_back(result);
    }

    /// Answer for `query_status` once the queue is empty
    pub fn set_default_status(&self, result: cca_device::Result<Option<MediaStatus>>) {
        self.state.lock().default_status = result;
    }

    /// Make every playback and volume command fail with `error`
    pub fn fail_commands(&self, error: DeviceError) {
        self.state.lock().command_error = Some(error);
    }

    pub fn set_active(&self, active: bool) {
        self.state.lock().active = active;
    }

    /// Send a notification to every registered listener
    pub fn emit(&self, status: MediaStatus) {
        self.state
            .lock()
            .listeners
            .retain(|listener| listener.send(status.clone()).is_ok());
    }

    pub fn listener_count(&self) -> usize {
        self.state.lock().listeners.len()
    }

    pub fn is_disconnected(&self) -> bool {
        self.state.lock().disconnected
    }

    fn command(&self, call: &str) -> cca_device::Result<()> {
        let mut state = self.state.lock();
        if state.disconnected {
            return Err(DeviceError::Closed);
        }
        state.calls.push(call.to_string());
        match &state.command_error {
            Some(error) => Err(error.clone()),
            None => Ok(()),
        }
    }
}

impl DeviceHandle for FakeDevice {
    fn name(&self) -> &str {
        &self.name
    }

    fn volume(&self) -> cca_device::Result<f32> {
        let state = self.state.lock();
        if state.disconnected {
            return Err(DeviceError::Closed);
        }
        Ok(state.volume)
    }

    fn set_volume(&self, level: f32) -> cca_device::Result<()> {
        self.command(&format!("set_volume {:.2}", level))?;
        self.state.lock().volume = level;
        Ok(())
    }

    fn load(&self, request: &LoadRequest) -> cca_device::Result<()> {
        self.command("load")?;
        self.state.lock().loads.push(request.clone());
        Ok(())
    }

    fn wait_until_active(&self, _timeout: Duration) -> cca_device::Result<bool> {
        Ok(self.state.lock().active)
    }

    fn play(&self) -> cca_device::Result<()> {
        self.command("play")
    }

    fn pause(&self) -> cca_device::Result<()> {
        self.command("pause")
    }

    fn stop(&self) -> cca_device::Result<()> {
        self.command("stop")
    }

    fn query_status(&self) -> cca_device::Result<Option<MediaStatus>> {
        let mut state = self.state.lock();
        if state.disconnected {
            return Err(DeviceError::Closed);
        }
        state.calls.push("query_status".to_string());
        match state.scripted_status.pop_front() {
            Some(result) => result,
            None => state.default_status.clone(),
        }
    }

    fn register_status_listener(&self, listener: mpsc::Sender<MediaStatus>) -> cca_device::Result<()> {
        self.state.lock().listeners.push(listener);
        Ok(())
    }

    fn disconnect(&mut self) {
        let mut state = self.state.lock();
        state.disconnected = true;
        state.listeners.clear();
    }
}

/// Descriptor for a fake device
pub fn descriptor(name: &str, kind: CastKind) -> DeviceDescriptor {
    let model_name = match kind {
        CastKind::Group => cca_discovery::device::GROUP_MODEL,
        _ => cca_discovery::device::AUDIO_MODEL,
    };
    DeviceDescriptor {
        id: format!("fake-{}", name.to_lowercase().replace(' ', "-")),
        name: name.to_string(),
        model_name: model_name.to_string(),
        kind,
        ip_address: "127.0.0.1".to_string(),
        port: 8009,
    }
}

/// [`DeviceProvider`] handing out [`FakeDevice`]s
#[derive(Debug, Clone, Default)]
pub struct FakeProvider {
    discovered: Arc<Mutex<Discovered>>,
    devices: Arc<Mutex<HashMap<String, FakeDevice>>>,
}

impl FakeProvider {
    pub fn new(audios: &[&str], groups: &[&str]) -> Self {
        let provider = Self::default();
        provider.set_devices(audios, groups);
        provider
    }

    /// Change what the next scan finds
    pub fn set_devices(&self, audios: &[&str], groups: &[&str]) {
        let devices = audios
            .iter()
            .map(|name| descriptor(name, CastKind::Audio))
            .chain(groups.iter().map(|name| descriptor(name, CastKind::Group)));
        *self.discovered.lock() = Discovered::from_devices(devices);
    }

    /// The most recent device connected under `name`
    pub fn device(&self, name: &str) -> Option<FakeDevice> {
        self.devices.lock().get(name).cloned()
    }

    /// Pre-create the device handed out for `name`
    pub fn insert(&self, device: FakeDevice) {
        self.devices.lock().insert(device.name.clone(), device);
    }
}

impl DeviceProvider for FakeProvider {
    fn discover(&self) -> Discovered {
        self.discovered.lock().clone()
    }

    fn connect(&self, device: &DeviceDescriptor) -> cca_device::Result<Box<dyn DeviceHandle>> {
        let mut devices = self.devices.lock();
        let fake = devices
            .entry(device.name.clone())
            .or_insert_with(|| FakeDevice::new(&device.name));
        if fake.is_disconnected() {
            *fake = FakeDevice::new(&device.name);
        }
        Ok(Box::new(fake.clone()))
    }
}
