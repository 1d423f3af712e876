//! Remote device handle for Chromecast Audio receivers
//!
//! The [`DeviceHandle`] trait is the capability the player drives: volume,
//! media load, playback controls, status queries and asynchronous status
//! notifications. [`ChromecastDevice`] implements it over the Cast v2
//! protocol using rust_cast.
//!
//! ```no_run
//! use cca_device::{ChromecastDevice, DeviceHandle};
//!
//! let found = cca_discovery::discover();
//! if let Some(descriptor) = found.first() {
//!     let device = ChromecastDevice::connect(descriptor)?;
//!     println!("{} volume {:.2}", device.name(), device.volume()?);
//! }
//! # Ok::<(), cca_device::DeviceError>(())
//! ```

mod chromecast;
mod error;
mod status;
mod worker;

pub use chromecast::ChromecastDevice;
pub use error::{DeviceError, Result};
pub use status::{IdleReason, LoadRequest, MediaStatus, RemoteState};
pub use worker::DEFAULT_MEDIA_RECEIVER_APP_ID;

use std::sync::mpsc;
use std::time::Duration;

/// Operations the player needs from a cast receiver.
///
/// Playback controls act on the receiver's current media session. None of
/// them wait for the resulting state change; that arrives later as a status
/// notification on every registered listener.
pub trait DeviceHandle: Send {
    /// Friendly name of the device
    fn name(&self) -> &str;

    /// Current receiver volume in `0.0..=1.0`
    fn volume(&self) -> Result<f32>;

    fn set_volume(&self, level: f32) -> Result<()>;

    /// Load a track and start playing it
    fn load(&self, request: &LoadRequest) -> Result<()>;

    /// Block until a media session is active or `timeout` passes.
    ///
    /// Returns whether the session became active.
    fn wait_until_active(&self, timeout: Duration) -> Result<bool>;

    fn play(&self) -> Result<()>;

    fn pause(&self) -> Result<()>;

    fn stop(&self) -> Result<()>;

    /// Query the live media status. `Ok(None)` means no media is loaded.
    fn query_status(&self) -> Result<Option<MediaStatus>>;

    /// Receive every media status notification on `listener`
    fn register_status_listener(&self, listener: mpsc::Sender<MediaStatus>) -> Result<()>;

    /// Close the connection. Further calls fail with [`DeviceError::Closed`].
    fn disconnect(&mut self);
}
