//! Chromecast Audio device discovery library
//!
//! This crate finds Chromecast Audio devices and cast groups on a local
//! network by browsing the `_googlecast._tcp` mDNS service. Video
//! Chromecasts are ignored.
//!
//! # Quick Start
//!
//! ```no_run
//! use cca_discovery::discover;
//!
//! let found = discover();
//! for device in &found.audios {
//!     println!("Audio: {} ({})", device.name, device.model_name);
//! }
//! for group in &found.groups {
//!     println!("Group: {}", group.name);
//! }
//! ```
//!
//! # Iterator-based Discovery
//!
//! ```no_run
//! use cca_discovery::{get_iter, DeviceEvent};
//!
//! for event in get_iter() {
//!     match event {
//!         DeviceEvent::Found(device) => {
//!             println!("Found: {}", device.name);
//!             break;
//!         }
//!     }
//! }
//! ```

mod error;
pub mod device;
mod discovery;

pub use discovery::{DiscoveryIterator, CAST_SERVICE_TYPE};
pub use error::{DiscoveryError, Result};

use std::time::Duration;

/// Default browse window.
pub const DEFAULT_TIMEOUT: Duration = Duration::from_secs(3);

/// What kind of cast endpoint a device is.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum CastKind {
    /// A single audio-only receiver
    Audio,
    /// A multi-room speaker group
    Group,
    /// A video Chromecast or TV; never returned by [`discover`]
    Video,
}

/// Information about a discovered cast device.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DeviceDescriptor {
    /// Device id from the `id` TXT property
    pub id: String,
    /// Friendly name, unique on the network and used as lookup key
    pub name: String,
    /// Model name (e.g. "Chromecast Audio", "Google Cast Group")
    pub model_name: String,
    pub kind: CastKind,
    /// IPv4 address of the receiver
    pub ip_address: String,
    /// Cast channel port (8009 for devices, varies for groups)
    pub port: u16,
}

/// Events emitted during device discovery.
#[derive(Debug, Clone)]
pub enum DeviceEvent {
    /// A cast device was found on the network
    Found(DeviceDescriptor),
}

/// Result of a discovery pass, split by kind and sorted by name.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Discovered {
    pub audios: Vec<DeviceDescriptor>,
    pub groups: Vec<DeviceDescriptor>,
}

impl Discovered {
    /// Split a flat device list into sorted audio devices and groups.
    pub fn from_devices(devices: impl IntoIterator<Item = DeviceDescriptor>) -> Self {
        let mut found = Discovered::default();
        for device in devices {
            match device.kind {
                CastKind::Audio => found.audios.push(device),
                CastKind::Group => found.groups.push(device),
                CastKind::Video => {}
            }
        }
        found.audios.sort_by(|a, b| a.name.cmp(&b.name));
        found.groups.sort_by(|a, b| a.name.cmp(&b.name));
        found
    }

    pub fn is_empty(&self) -> bool {
        self.audios.is_empty() && self.groups.is_empty()
    }

    pub fn len(&self) -> usize {
        self.audios.len() + self.groups.len()
    }

    /// Look a device up by exact name, audio devices first.
    pub fn find(&self, name: &str) -> Option<&DeviceDescriptor> {
        self.audios
            .iter()
            .chain(self.groups.iter())
            .find(|device| device.name == name)
    }

    /// First audio device, else first group.
    pub fn first(&self) -> Option<&DeviceDescriptor> {
        self.audios.first().or_else(|| self.groups.first())
    }

    pub fn iter(&self) -> impl Iterator<Item = &DeviceDescriptor> {
        self.audios.iter().chain(self.groups.iter())
    }
}

/// Discover audio devices and groups with the default 3-second window.
pub fn discover() -> Discovered {
    discover_with_timeout(DEFAULT_TIMEOUT)
}

/// Discover audio devices and groups, browsing for `timeout`.
pub fn discover_with_timeout(timeout: Duration) -> Discovered {
    Discovered::from_devices(get_with_timeout(timeout))
}

/// Discover all cast audio devices and groups with a default 3-second timeout.
///
/// Devices are returned in discovery order. Use [`discover`] for the
/// sorted, split view.
pub fn get() -> Vec<DeviceDescriptor> {
    get_with_timeout(DEFAULT_TIMEOUT)
}

/// Discover all cast audio devices and groups with a custom timeout.
pub fn get_with_timeout(timeout: Duration) -> Vec<DeviceDescriptor> {
    get_iter_with_timeout(timeout)
        .map(|event| match event {
            DeviceEvent::Found(device) => device,
        })
        .collect()
}

/// Get an iterator for discovering cast devices with a default 3-second timeout.
pub fn get_iter() -> DiscoveryIterator {
    get_iter_with_timeout(DEFAULT_TIMEOUT)
}

/// Get an iterator for discovering cast devices with a custom timeout.
///
/// If the mDNS daemon cannot be started the iterator is empty; the failure
/// is logged.
pub fn get_iter_with_timeout(timeout: Duration) -> DiscoveryIterator {
    DiscoveryIterator::new(timeout).unwrap_or_else(|e| {
        tracing::warn!("discovery unavailable: {}", e);
        DiscoveryIterator::empty()
    })
}
