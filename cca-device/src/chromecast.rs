//! rust_cast-backed device handle.

use std::sync::{mpsc, Arc};
use std::thread::JoinHandle;
use std::time::{Duration, Instant};

use cca_discovery::DeviceDescriptor;

use crate::error::{DeviceError, Result};
use crate::status::{LoadRequest, MediaStatus};
use crate::worker::{spawn_device_worker, Command, Control, Liveness, Reply};
use crate::DeviceHandle;

const CONNECT_TIMEOUT: Duration = Duration::from_secs(10);
const COMMAND_TIMEOUT: Duration = Duration::from_secs(10);
const STATUS_TIMEOUT: Duration = Duration::from_secs(2);
const ACTIVE_POLL_INTERVAL: Duration = Duration::from_millis(100);

/// A worker stuck on the network this long is treated as disconnected.
const STALL_LIMIT: Duration = Duration::from_secs(3);

/// Handle to a Chromecast receiver.
///
/// Every call is forwarded to a dedicated worker thread that owns the
/// connection; calls block until the worker replies or a timeout passes.
/// Dropping the handle shuts the worker down.
pub struct ChromecastDevice {
    name: String,
    commands: mpsc::Sender<Command>,
    worker: Option<JoinHandle<()>>,
    liveness: Arc<Liveness>,
}

impl ChromecastDevice {
    /// Connect to a discovered device.
    pub fn connect(descriptor: &DeviceDescriptor) -> Result<Self> {
        Self::connect_to(&descriptor.name, &descriptor.ip_address, descriptor.port)
    }

    /// Connect to a receiver by address.
    pub fn connect_to(name: &str, host: &str, port: u16) -> Result<Self> {
        let (command_tx, command_rx) = mpsc::channel();
        let (ready_tx, ready_rx) = mpsc::channel();
        let liveness = Arc::new(Liveness::default());

        let worker = spawn_device_worker(
            name.to_string(),
            host.to_string(),
            port,
            command_rx,
            ready_tx,
            Arc::clone(&liveness),
        );

        match ready_rx.recv_timeout(CONNECT_TIMEOUT) {
            Ok(Ok(())) => Ok(Self {
                name: name.to_string(),
                commands: command_tx,
                worker: Some(worker),
                liveness,
            }),
            Ok(Err(e)) => Err(e),
            Err(_) => Err(DeviceError::Timeout(format!("connection to {}", name))),
        }
    }

    fn request<T>(
        &self,
        what: &str,
        timeout: Duration,
        build: impl FnOnce(Reply<T>) -> Command,
    ) -> Result<T> {
        let stalled = self.liveness.stalled_for();
        if stalled >= STALL_LIMIT {
            return Err(DeviceError::NotConnected(format!(
                "{} (no answer for {:.1}s)",
                self.name,
                stalled.as_secs_f32()
            )));
        }

        let (reply_tx, reply_rx) = mpsc::channel();
        self.commands
            .send(build(reply_tx))
            .map_err(|_| DeviceError::Closed)?;

        match reply_rx.recv_timeout(timeout) {
            Ok(result) => result,
            Err(mpsc::RecvTimeoutError::Timeout) => {
                Err(DeviceError::Timeout(format!("{} on {}", what, self.name)))
            }
            Err(mpsc::RecvTimeoutError::Disconnected) => Err(DeviceError::Closed),
        }
    }

    fn control(&self, control: Control) -> Result<()> {
        self.request("playback control", COMMAND_TIMEOUT, |reply| Command::Control {
            control,
            reply,
        })
    }
}

impl DeviceHandle for ChromecastDevice {
    fn name(&self) -> &str {
        &self.name
    }

    fn volume(&self) -> Result<f32> {
        self.request("volume", STATUS_TIMEOUT, |reply| Command::Volume { reply })
    }

    fn set_volume(&self, level: f32) -> Result<()> {
        self.request("set volume", COMMAND_TIMEOUT, |reply| Command::SetVolume {
            level,
            reply,
        })
    }

    fn load(&self, request: &LoadRequest) -> Result<()> {
        self.request("load", COMMAND_TIMEOUT, |reply| Command::Load {
            request: request.clone(),
            reply,
        })
    }

    fn wait_until_active(&self, timeout: Duration) -> Result<bool> {
        let deadline = Instant::now() + timeout;
        loop {
            if self.request("session state", STATUS_TIMEOUT, |reply| Command::IsActive { reply })? {
                return Ok(true);
            }
            if Instant::now() >= deadline {
                return Ok(false);
            }
            std::thread::sleep(ACTIVE_POLL_INTERVAL);
        }
    }

    fn play(&self) -> Result<()> {
        self.control(Control::Play)
    }

    fn pause(&self) -> Result<()> {
        self.control(Control::Pause)
    }

    fn stop(&self) -> Result<()> {
        self.control(Control::Stop)
    }

    fn query_status(&self) -> Result<Option<MediaStatus>> {
        self.request("media status", STATUS_TIMEOUT, |reply| Command::QueryStatus { reply })
    }

    fn register_status_listener(&self, listener: mpsc::Sender<MediaStatus>) -> Result<()> {
        self.commands
            .send(Command::Subscribe { listener })
            .map_err(|_| DeviceError::Closed)
    }

    fn disconnect(&mut self) {
        if self.worker.take().is_some() {
            let _ = self.commands.send(Command::Shutdown);
            tracing::info!(device = %self.name, "disconnected");
        }
    }
}

impl Drop for ChromecastDevice {
    fn drop(&mut self) {
        self.disconnect();
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn detached(name: &str) -> (ChromecastDevice, mpsc::Receiver<Command>) {
        let (commands, command_rx) = mpsc::channel();
        let device = ChromecastDevice {
            name: name.to_string(),
            commands,
            worker: None,
            liveness: Arc::new(Liveness::default()),
        };
        (device, command_rx)
    }

    #[test]
    fn test_stalled_worker_fails_fast() {
        let (device, _commands) = detached("Den");
        let blocked_since = Instant::now().checked_sub(STALL_LIMIT * 2).unwrap();
        device.liveness.enter_at(blocked_since);

        let started = Instant::now();
        let err = device.query_status().unwrap_err();

        assert!(matches!(err, DeviceError::NotConnected(_)));
        assert!(err.is_transient());
        assert!(started.elapsed() < Duration::from_millis(500));
    }

    #[test]
    fn test_unanswered_status_query_times_out() {
        let (device, _commands) = detached("Den");

        let err = device.query_status().unwrap_err();

        assert!(matches!(err, DeviceError::Timeout(_)));
    }

    #[test]
    fn test_gone_worker_reports_closed() {
        let (device, commands) = detached("Den");
        drop(commands);

        assert_eq!(device.volume(), Err(DeviceError::Closed));
    }
}
