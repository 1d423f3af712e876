//! One-shot commands

use std::io::Write;
use std::thread;
use std::time::{Duration, Instant};

use anyhow::{anyhow, Result};
use cca_discovery::{DeviceDescriptor, Discovered};
use cca_player::media::content_type_for;
use cca_player::{
    Command, Controller, FolderOutcome, Outcome, PlaybackSession, PlayerError, PlayerState, TrackInfo,
};
use cca_server::CommandServer;
use tracing::info;

use crate::{Config, OneShot, DISCOVERY_TIMEOUT};

const STATUS_POLL: Duration = Duration::from_millis(250);
const PLAYLIST_POLL: Duration = Duration::from_secs(1);

/// How long `playfile` waits for playback to begin before giving up
const START_TIMEOUT: Duration = Duration::from_secs(10);

pub fn run(config: &Config, command: &OneShot) -> Result<()> {
    let discovered = cca_discovery::discover_with_timeout(DISCOVERY_TIMEOUT);

    if *command == OneShot::List {
        print!("{}", device_listing(&discovered));
        return Ok(());
    }

    let device = match resolve_device(&discovered, config.device.as_deref()) {
        Ok(device) => device.clone(),
        Err(e @ PlayerError::DeviceNotFound { .. }) => {
            println!("Available devices:");
            print!("{}", device_listing(&discovered));
            return Err(e.into());
        }
        Err(e) => return Err(e.into()),
    };
    if config.device.is_none() {
        println!("Defaulting to device ('{}')", device.name);
    }

    let controller = config.controller(true);
    controller.select(&device)?;

    let result = run_on_device(config, &controller, command);
    controller.shutdown();
    result
}

fn run_on_device(config: &Config, controller: &Controller, command: &OneShot) -> Result<()> {
    match command {
        OneShot::List => Ok(()),
        OneShot::Volup => report_volume(controller.execute(Command::VolumeUp)?),
        OneShot::Voldown => report_volume(controller.execute(Command::VolumeDown)?),
        OneShot::Setvol { level } => with_session(controller, |s| s.set_volume(*level)),
        OneShot::Pause => with_session(controller, PlaybackSession::pause),
        OneShot::Resume => with_session(controller, PlaybackSession::resume),
        OneShot::Stop => with_session(controller, PlaybackSession::stop),
        OneShot::Status => monitor_status(controller),
        OneShot::Playfolder => {
            let server = CommandServer::start(&config.server, controller.clone())?;
            let outcome = with_session(controller, |s| s.play_folder(&config.folder))?;
            match outcome {
                FolderOutcome::Started { count } => {
                    println!("Playing playlist with {} files", count);
                    follow_playlist(controller);
                }
                FolderOutcome::NoFiles => {
                    println!("No files found under playlist folder: {}", config.folder.display());
                }
            }
            server.shutdown();
            Ok(())
        }
        OneShot::Playfile { file } => {
            if !file.is_file() {
                return Err(PlayerError::FileNotFound(file.clone()).into());
            }
            let server = CommandServer::start(&config.server, controller.clone())?;
            let base_url = config.media.base_url.clone();
            with_session(controller, |s| s.play_file(file, content_type_for(file), &base_url))?;
            wait_for_playback(controller);
            server.shutdown();
            Ok(())
        }
    }
}

/// Pick the device for a one-shot command: the named one, else the first
/// audio device, else the first group.
pub fn resolve_device<'a>(
    discovered: &'a Discovered,
    name: Option<&str>,
) -> cca_player::Result<&'a DeviceDescriptor> {
    if discovered.is_empty() {
        return Err(PlayerError::NoDevices);
    }
    match name {
        Some(name) => discovered.find(name).ok_or_else(|| PlayerError::DeviceNotFound {
            name: name.to_string(),
            available: discovered.iter().map(|d| d.name.clone()).collect(),
        }),
        None => discovered.first().ok_or(PlayerError::NoDevices),
    }
}

pub fn device_listing(discovered: &Discovered) -> String {
    let mut out = String::new();
    for (label, devices) in [("Audio", &discovered.audios), ("Group", &discovered.groups)] {
        out.push_str(&format!("Found {} Chromecast {} devices:\n", devices.len(), label));
        for device in devices {
            out.push_str(&format!("  '{}' ({})\n", device.name, device.model_name));
        }
    }
    out
}

pub fn track_line(info: &TrackInfo) -> String {
    format!("{} - {} ({})", info.artist, info.title, info.album)
}

fn with_session<R>(
    controller: &Controller,
    f: impl FnOnce(&mut PlaybackSession) -> cca_player::Result<R>,
) -> Result<R> {
    controller.with_registry(|registry| {
        let session = registry
            .session_mut()
            .ok_or_else(|| anyhow!("Device disconnected"))?;
        Ok(f(session)?)
    })
}

fn report_volume(outcome: Outcome) -> Result<()> {
    if let Outcome::Volume { before, after } = outcome {
        println!("Volume: {:.2} -> {:.2}", before, after);
    }
    Ok(())
}

/// State and track info of the active session; `None` once it is gone.
fn poll(controller: &Controller) -> Option<(PlayerState, TrackInfo)> {
    controller.with_registry(|registry| {
        let session = registry.session_mut()?;
        let info = session.get_track_info()?;
        Some((session.state(), info))
    })
}

fn monitor_status(controller: &Controller) -> Result<()> {
    let mut previous = None;
    loop {
        let Some((state, info)) = poll(controller) else {
            println!();
            println!("Device disconnected");
            return Ok(());
        };

        if previous != Some(state) {
            if state == PlayerState::Playing {
                info!("State change -> {}: {}", state, track_line(&info));
            } else {
                info!("State change -> {}", state);
            }
            previous = Some(state);
        }
        if state == PlayerState::Playing {
            print!("{} {}/{} \r", track_line(&info), info.current_time, info.duration);
            let _ = std::io::stdout().flush();
        }

        thread::sleep(STATUS_POLL);
    }
}

/// Keep serving while the playlist plays, logging the position as it moves.
fn follow_playlist(controller: &Controller) {
    let mut last_cursor = None;
    loop {
        let position = controller.with_registry(|registry| {
            let session = registry.session_mut()?;
            session.get_track_info()?;
            let playlist = session.playlist();
            Some((playlist.cursor(), playlist.len()))
        });
        match position {
            Some((cursor, len)) if len > 0 => {
                if cursor != last_cursor {
                    if let Some(index) = cursor {
                        info!("Playlist position {} of {}", index + 1, len);
                    }
                    last_cursor = cursor;
                }
            }
            _ => {
                info!("Playlist ended");
                return;
            }
        }
        thread::sleep(PLAYLIST_POLL);
    }
}

/// Wait until the file has played through, or never started.
fn wait_for_playback(controller: &Controller) {
    let started_at = Instant::now();
    let mut started = false;
    while let Some((state, _)) = poll(controller) {
        if state.has_media() {
            started = true;
        } else if started || started_at.elapsed() > START_TIMEOUT {
            break;
        }
        thread::sleep(STATUS_POLL);
    }
}
