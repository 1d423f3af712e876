//! Background worker thread owning the Cast connection
//!
//! rust_cast's `CastDevice` is a blocking, single-threaded client, so one
//! thread owns it and everything else talks to that thread over a command
//! channel. Between commands the worker sends a heartbeat ping and reads
//! until the matching pong, which answers the receiver's own pings and
//! forwards any media status broadcasts that arrived in the meantime.
//!
//! rust_cast reads without a timeout, so a half-open connection can block
//! the worker indefinitely. The worker marks itself busy around every step
//! that touches the network; handles use that [`Liveness`] to fail fast
//! instead of waiting out their reply timeouts.

use std::sync::mpsc::{self, RecvTimeoutError};
use std::sync::{Arc, Once};
use std::thread::{self, JoinHandle};
use std::time::{Duration, Instant};

use rust_cast::channels::heartbeat::HeartbeatResponse;
use rust_cast::channels::media::{
    self, Image, Media, MediaResponse, Metadata, MusicTrackMediaMetadata, StreamType,
};
use rust_cast::channels::receiver::{self, CastDeviceApp, ReceiverResponse};
use parking_lot::Mutex;
use rust_cast::{CastDevice, ChannelMessage};

use crate::error::{DeviceError, Result};
use crate::status::{LoadRequest, MediaStatus};

const DEFAULT_DESTINATION_ID: &str = "receiver-0";

/// App id of the Default Media Receiver.
pub const DEFAULT_MEDIA_RECEIVER_APP_ID: &str = "CC1AD845";

/// How long the worker waits for a command before servicing the connection.
const TICK: Duration = Duration::from_millis(500);

const RECONNECT_INTERVAL: Duration = Duration::from_secs(2);

/// Upper bound on messages read per heartbeat fence.
const MAX_DRAIN_MESSAGES: usize = 64;

/// Longest a heartbeat fence keeps reading while messages keep arriving.
const DRAIN_DEADLINE: Duration = Duration::from_secs(2);

/// When the worker last started talking to the receiver, if it still is
#[derive(Debug, Default)]
pub(crate) struct Liveness {
    busy_since: Mutex<Option<Instant>>,
}

impl Liveness {
    pub(crate) fn enter(&self) {
        *self.busy_since.lock() = Some(Instant::now());
    }

    #[cfg(test)]
    pub(crate) fn enter_at(&self, at: Instant) {
        *self.busy_since.lock() = Some(at);
    }

    pub(crate) fn leave(&self) {
        *self.busy_since.lock() = None;
    }

    /// How long the current step has been running; zero when idle.
    pub(crate) fn stalled_for(&self) -> Duration {
        self.busy_since
            .lock()
            .map_or(Duration::ZERO, |since| since.elapsed())
    }
}

pub(crate) type Reply<T> = mpsc::Sender<Result<T>>;

/// Playback controls that act on the current media session
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum Control {
    Play,
    Pause,
    Stop,
}

impl Control {
    fn name(self) -> &'static str {
        match self {
            Control::Play => "play",
            Control::Pause => "pause",
            Control::Stop => "stop",
        }
    }
}

/// Commands sent from a `ChromecastDevice` handle to its worker
#[derive(Debug)]
pub(crate) enum Command {
    Volume { reply: Reply<f32> },
    SetVolume { level: f32, reply: Reply<()> },
    Load { request: LoadRequest, reply: Reply<()> },
    Control { control: Control, reply: Reply<()> },
    QueryStatus { reply: Reply<Option<MediaStatus>> },
    IsActive { reply: Reply<bool> },
    Subscribe { listener: mpsc::Sender<MediaStatus> },
    Shutdown,
}

/// Ensures the rustls crypto provider is installed exactly once.
fn ensure_crypto_provider() {
    static INIT: Once = Once::new();

    INIT.call_once(|| {
        let _ = rustls::crypto::CryptoProvider::install_default(
            rustls::crypto::aws_lc_rs::default_provider(),
        );
    });
}

/// Spawns the worker thread for one receiver.
///
/// The initial connection attempt is made on the worker thread; its outcome
/// is reported on `ready_tx` before any command is processed. The worker
/// exits if that first attempt fails.
pub(crate) fn spawn_device_worker(
    name: String,
    host: String,
    port: u16,
    command_rx: mpsc::Receiver<Command>,
    ready_tx: mpsc::Sender<Result<()>>,
    liveness: Arc<Liveness>,
) -> JoinHandle<()> {
    thread::spawn(move || {
        let mut worker = Worker::new(name, host, port, liveness);

        match worker.open() {
            Ok(()) => {
                let _ = ready_tx.send(Ok(()));
            }
            Err(e) => {
                let _ = ready_tx.send(Err(e));
                return;
            }
        }

        worker.run(command_rx);
    })
}

/// Receiver-side application session we are attached to.
#[derive(Debug, Clone)]
struct AppSession {
    transport_id: String,
    session_id: String,
    media_session_id: Option<i32>,
}

struct Worker {
    name: String,
    host: String,
    port: u16,
    conn: Option<CastDevice<'static>>,
    app: Option<AppSession>,
    listeners: Vec<mpsc::Sender<MediaStatus>>,
    last_attempt: Instant,
    liveness: Arc<Liveness>,
}

impl Worker {
    fn new(name: String, host: String, port: u16, liveness: Arc<Liveness>) -> Self {
        Self {
            name,
            host,
            port,
            conn: None,
            app: None,
            listeners: Vec::new(),
            last_attempt: Instant::now(),
            liveness,
        }
    }

    fn run(&mut self, command_rx: mpsc::Receiver<Command>) {
        tracing::debug!(device = %self.name, "device worker started");

        loop {
            let command = match command_rx.recv_timeout(TICK) {
                Ok(Command::Shutdown) => break,
                Ok(command) => Some(command),
                Err(RecvTimeoutError::Timeout) => None,
                Err(RecvTimeoutError::Disconnected) => break,
            };

            self.liveness.enter();
            if let Some(command) = command {
                self.handle(command);
            }
            self.service();
            self.liveness.leave();
        }

        self.close();
        tracing::debug!(device = %self.name, "device worker stopped");
    }

    /// Connect to the receiver and attach to a running media app, if any.
    fn open(&mut self) -> Result<()> {
        ensure_crypto_provider();
        self.last_attempt = Instant::now();

        let connect_err = |reason: String| DeviceError::Connect {
            host: self.host.clone(),
            port: self.port,
            reason,
        };

        let conn = CastDevice::connect_without_host_verification(self.host.clone(), self.port)
            .map_err(|e| connect_err(e.to_string()))?;
        conn.connection
            .connect(DEFAULT_DESTINATION_ID.to_string())
            .map_err(|e| connect_err(e.to_string()))?;
        conn.heartbeat.ping().map_err(|e| connect_err(e.to_string()))?;

        let status = conn
            .receiver
            .get_status()
            .map_err(|e| connect_err(e.to_string()))?;

        self.app = None;
        if let Some(app) = find_media_app(&status) {
            match conn.connection.connect(app.transport_id.clone()) {
                Ok(()) => {
                    let media_session_id = conn
                        .media
                        .get_status(app.transport_id.clone(), None)
                        .ok()
                        .and_then(|s| s.entries.first().map(|e| e.media_session_id));
                    tracing::debug!(
                        device = %self.name,
                        transport = %app.transport_id,
                        ?media_session_id,
                        "attached to running media receiver"
                    );
                    self.app = Some(AppSession {
                        transport_id: app.transport_id.clone(),
                        session_id: app.session_id.clone(),
                        media_session_id,
                    });
                }
                Err(e) => {
                    tracing::warn!(device = %self.name, "failed to attach to media receiver: {}", e);
                }
            }
        }

        self.conn = Some(conn);
        tracing::info!(device = %self.name, host = %self.host, port = self.port, "connected");
        Ok(())
    }

    fn close(&mut self) {
        if let Some(conn) = self.conn.take() {
            if let Some(app) = self.app.take() {
                let _ = conn.connection.disconnect(app.transport_id);
            }
            let _ = conn.connection.disconnect(DEFAULT_DESTINATION_ID.to_string());
        }
    }

    fn drop_connection(&mut self, err: impl std::fmt::Display) {
        tracing::warn!(device = %self.name, "connection lost: {}", err);
        self.conn = None;
        self.app = None;
        self.last_attempt = Instant::now();
    }

    /// Reconnect when down, otherwise run one heartbeat fence.
    fn service(&mut self) {
        if self.conn.is_none() {
            if self.last_attempt.elapsed() >= RECONNECT_INTERVAL {
                if let Err(e) = self.open() {
                    tracing::debug!(device = %self.name, "reconnect failed: {}", e);
                }
            }
            return;
        }
        self.drain();
    }

    fn drain(&mut self) {
        let Some(conn) = self.conn.take() else {
            return;
        };

        if let Err(e) = conn.heartbeat.ping() {
            self.drop_connection(e);
            return;
        }

        let deadline = Instant::now() + DRAIN_DEADLINE;
        for _ in 0..MAX_DRAIN_MESSAGES {
            if Instant::now() >= deadline {
                tracing::debug!(device = %self.name, "heartbeat fence cut short");
                break;
            }
            match conn.receive() {
                Ok(ChannelMessage::Heartbeat(HeartbeatResponse::Pong)) => break,
                Ok(ChannelMessage::Heartbeat(HeartbeatResponse::Ping)) => {
                    if let Err(e) = conn.heartbeat.pong() {
                        self.drop_connection(e);
                        return;
                    }
                }
                Ok(ChannelMessage::Media(MediaResponse::Status(status))) => {
                    self.publish(&status);
                }
                Ok(ChannelMessage::Receiver(ReceiverResponse::Status(status))) => {
                    self.track_receiver(&status);
                }
                Ok(_) => {}
                Err(e) => {
                    self.drop_connection(e);
                    return;
                }
            }
        }

        self.conn = Some(conn);
    }

    /// Forward media status entries to listeners, dropping closed ones.
    fn publish(&mut self, status: &media::Status) {
        for entry in &status.entries {
            if let Some(app) = self.app.as_mut() {
                app.media_session_id = Some(entry.media_session_id);
            }
            let update = MediaStatus::from(entry);
            self.listeners.retain(|listener| listener.send(update.clone()).is_ok());
        }
    }

    fn track_receiver(&mut self, status: &receiver::Status) {
        let still_running = self.app.as_ref().map_or(true, |app| {
            status
                .applications
                .iter()
                .any(|running| running.session_id == app.session_id)
        });
        if !still_running {
            tracing::info!(device = %self.name, "media receiver app was closed");
            self.app = None;
        }
    }

    fn handle(&mut self, command: Command) {
        match command {
            Command::Volume { reply } => {
                let _ = reply.send(self.volume());
            }
            Command::SetVolume { level, reply } => {
                let _ = reply.send(self.set_volume(level));
            }
            Command::Load { request, reply } => {
                let _ = reply.send(self.load(&request));
            }
            Command::Control { control, reply } => {
                let _ = reply.send(self.control(control));
            }
            Command::QueryStatus { reply } => {
                let _ = reply.send(self.query_status());
            }
            Command::IsActive { reply } => {
                let active = self
                    .app
                    .as_ref()
                    .is_some_and(|app| app.media_session_id.is_some());
                let _ = reply.send(Ok(active));
            }
            Command::Subscribe { listener } => {
                let current = self.query_status().ok().flatten();
                self.subscribe(listener, current);
            }
            Command::Shutdown => {}
        }
    }

    /// Add a listener, first telling it what is playing right now.
    fn subscribe(&mut self, listener: mpsc::Sender<MediaStatus>, current: Option<MediaStatus>) {
        if let Some(status) = current {
            if listener.send(status).is_err() {
                return;
            }
        }
        self.listeners.push(listener);
    }

    fn connection(&self) -> Result<&CastDevice<'static>> {
        self.conn
            .as_ref()
            .ok_or_else(|| DeviceError::NotConnected(self.name.clone()))
    }

    fn volume(&self) -> Result<f32> {
        let status = self
            .connection()?
            .receiver
            .get_status()
            .map_err(|e| DeviceError::command("get volume", e))?;
        Ok(status.volume.level.unwrap_or(0.0))
    }

    fn set_volume(&self, level: f32) -> Result<()> {
        self.connection()?
            .receiver
            .set_volume(level)
            .map_err(|e| DeviceError::command("set volume", e))?;
        Ok(())
    }

    /// Launch the Default Media Receiver unless we are already attached.
    fn ensure_app(&mut self) -> Result<AppSession> {
        if let Some(app) = &self.app {
            return Ok(app.clone());
        }

        let conn = self.connection()?;
        let launched = conn
            .receiver
            .launch_app(&CastDeviceApp::DefaultMediaReceiver)
            .map_err(|e| DeviceError::command("launch app", e))?;
        conn.connection
            .connect(launched.transport_id.clone())
            .map_err(|e| DeviceError::command("connect transport", e))?;

        tracing::debug!(
            device = %self.name,
            session = %launched.session_id,
            transport = %launched.transport_id,
            "launched media receiver"
        );

        let app = AppSession {
            transport_id: launched.transport_id,
            session_id: launched.session_id,
            media_session_id: None,
        };
        self.app = Some(app.clone());
        Ok(app)
    }

    fn load(&mut self, request: &LoadRequest) -> Result<()> {
        let app = self.ensure_app()?;
        let media = build_media(request);

        let status = self
            .connection()?
            .media
            .load(app.transport_id, app.session_id, &media)
            .map_err(|e| DeviceError::command("load", e))?;

        self.publish(&status);
        Ok(())
    }

    fn control(&mut self, control: Control) -> Result<()> {
        let app = self
            .app
            .clone()
            .ok_or_else(|| DeviceError::ControllerUnavailable(self.name.clone()))?;
        let media_session_id = app
            .media_session_id
            .ok_or_else(|| DeviceError::ControllerUnavailable(self.name.clone()))?;

        let conn = self.connection()?;
        let entry = match control {
            Control::Play => conn.media.play(app.transport_id, media_session_id),
            Control::Pause => conn.media.pause(app.transport_id, media_session_id),
            Control::Stop => conn.media.stop(app.transport_id, media_session_id),
        }
        .map_err(|e| DeviceError::command(control.name(), e))?;

        let update = MediaStatus::from(&entry);
        self.listeners.retain(|listener| listener.send(update.clone()).is_ok());
        Ok(())
    }

    fn query_status(&mut self) -> Result<Option<MediaStatus>> {
        let app = self
            .app
            .clone()
            .ok_or_else(|| DeviceError::ControllerUnavailable(self.name.clone()))?;

        let status = self
            .connection()?
            .media
            .get_status(app.transport_id, app.media_session_id)
            .map_err(|e| DeviceError::NotConnected(format!("{}: {}", self.name, e)))?;

        let entry = status.entries.first();
        if let (Some(app), Some(entry)) = (self.app.as_mut(), entry) {
            app.media_session_id = Some(entry.media_session_id);
        }
        Ok(entry.map(MediaStatus::from))
    }
}

fn find_media_app(status: &receiver::Status) -> Option<&receiver::Application> {
    status
        .applications
        .iter()
        .find(|app| app.app_id == DEFAULT_MEDIA_RECEIVER_APP_ID)
}

fn build_media(request: &LoadRequest) -> Media {
    let images = request
        .cover_url
        .as_ref()
        .map(|url| {
            vec![Image {
                url: url.clone(),
                dimensions: None,
            }]
        })
        .unwrap_or_default();

    Media {
        content_id: request.url.clone(),
        content_type: request.content_type.clone(),
        stream_type: StreamType::Buffered,
        metadata: Some(Metadata::MusicTrack(MusicTrackMediaMetadata {
            title: Some(request.title.clone()),
            artist: Some(request.artist.clone()),
            album_name: Some(request.album.clone()),
            images,
            ..Default::default()
        })),
        duration: None,
    }
}
