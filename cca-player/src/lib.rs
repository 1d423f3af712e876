//! Playback core for Chromecast Audio streaming
//!
//! - [`PlaybackSession`]: one device's play/pause/idle state machine,
//!   playlist, volume and mute bookkeeping, and the bounded-retry policy
//!   for status queries.
//! - [`SessionRegistry`]: selector keys for discovered devices and the
//!   single active session.
//! - [`Controller`]: the thread-safe command facade used by the console and
//!   the HTTP endpoint.
//!
//! ```no_run
//! use std::sync::Arc;
//! use cca_player::{Command, Controller, MediaSource, NetworkProvider, PlayerConfig, SessionRegistry};
//!
//! let media = MediaSource::new("http://192.168.1.10:8000/".parse()?, "/home/me");
//! let registry = SessionRegistry::new(Arc::new(NetworkProvider::default()), PlayerConfig::new(media));
//! let controller = Controller::new(registry);
//!
//! controller.execute(Command::ScanDevices)?;
//! controller.execute(Command::SelectDevice('1'))?;
//! controller.execute(Command::PlayFolder)?;
//! println!("{}", controller.status());
//! # Ok::<(), Box<dyn std::error::Error>>(())
//! ```

pub mod config;
mod controller;
mod error;
mod failure;
pub mod media;
mod playlist;
mod registry;
mod session;
mod state;
pub mod tags;
#[cfg(any(test, feature = "test-support"))]
pub mod testing;

pub use config::{MediaSource, PlayerConfig, SessionConfig};
pub use controller::{Command, Controller, Outcome, UnknownCommand};
pub use error::{PlayerError, Result};
pub use failure::{FailureWindow, StatusProbe};
pub use playlist::Playlist;
pub use registry::{
    assign_keys, DeviceProvider, NetworkProvider, SessionRegistry, SharedObserver, StatusFeed,
    StatusReport, SELECTOR_KEYS,
};
pub use session::{FolderOutcome, PlaybackSession, StatusObserver, ToggleAction, TrackInfo};
pub use state::PlayerState;
