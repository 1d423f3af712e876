//! Interactive keyboard player
//!
//! Polls the keyboard at about 20 Hz in raw mode, refreshes a one-line
//! status every 250 ms and runs key commands through the shared
//! [`Controller`], the same one the HTTP server uses.

use std::io::{self, Write};
use std::time::{Duration, Instant};

use anyhow::{Context, Result};
use cca_player::{Command, Controller, FolderOutcome, Outcome, PlayerError, StatusReport, ToggleAction};
use cca_server::CommandServer;
use crossterm::cursor::MoveToColumn;
use crossterm::event::{self, Event, KeyCode, KeyEvent, KeyEventKind, KeyModifiers};
use crossterm::style::Print;
use crossterm::terminal::{self, Clear, ClearType};
use crossterm::{execute, queue};
use tracing::{info, warn};

use crate::Config;

const KEY_POLL: Duration = Duration::from_millis(50);
const STATUS_REFRESH: Duration = Duration::from_millis(250);

/// What a key press asks for
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum KeyAction {
    Run(Command),
    Help,
    Quit,
}

/// Map a key to its action; `None` for unmapped keys.
pub fn action_for_key(key: char) -> Option<KeyAction> {
    let action = match key {
        '0'..='9' => KeyAction::Run(Command::SelectDevice(key)),
        '+' | '=' => KeyAction::Run(Command::VolumeUp),
        '-' | '_' => KeyAction::Run(Command::VolumeDown),
        'm' => KeyAction::Run(Command::ToggleMute),
        'p' => KeyAction::Run(Command::PlayFolder),
        ',' | '<' => KeyAction::Run(Command::PreviousTrack),
        '.' | '>' => KeyAction::Run(Command::NextTrack),
        ' ' => KeyAction::Run(Command::PlayPauseResume),
        's' => KeyAction::Run(Command::ScanDevices),
        '?' => KeyAction::Help,
        'q' => KeyAction::Quit,
        _ => return None,
    };
    Some(action)
}

/// `device (vol): artist - title (album) cur/dur >`
pub fn status_line(report: &StatusReport) -> String {
    if !report.connected {
        return if report.device.is_empty() {
            "No connected device: >".to_string()
        } else {
            format!("{} (disconnected): >", report.device)
        };
    }

    let mut line = format!("{} {}: ", report.device, report.volume);
    if !report.title.is_empty() || !report.artist.is_empty() {
        line.push_str(&format!("{} - {} ({}) ", report.artist, report.title, report.album));
    }
    if !report.current_time.is_empty() {
        line.push_str(&format!("{}/{} ", report.current_time, report.duration));
    }
    line.push('>');
    line
}

/// Key legend and device list shown at start and on `?`
pub fn key_mappings(devices: &[(char, cca_discovery::DeviceDescriptor)]) -> String {
    let divider = "-".repeat(66);
    let mapping = |keys: &str, description: &str| format!("{:^7} = {}\n", keys, description);

    let mut out = format!("{}\nDevices:\n", divider);
    for (key, device) in devices {
        out.push_str(&format!(" {} = {} ({})\n", key, device.name, device.model_name));
    }
    out.push('\n');
    out.push_str(&mapping("0-9", "select device"));
    out.push_str(&mapping("- +", "volume down/up"));
    out.push_str(&mapping("m", "mute/unmute"));
    out.push_str(&mapping("p", "play folder"));
    out.push_str(&mapping(",< >.", "previous/next track"));
    out.push_str(&mapping("<SPACE>", "pause/resume"));
    out.push_str(&mapping("s", "rescan devices"));
    out.push_str(&mapping("q", "quit"));
    out.push_str(&mapping("?", "show key mappings"));
    out.push_str(&divider);
    out.push('\n');
    out
}

/// Restores the terminal when dropped
struct RawMode;

impl RawMode {
    fn enable() -> io::Result<Self> {
        terminal::enable_raw_mode()?;
        Ok(RawMode)
    }
}

impl Drop for RawMode {
    fn drop(&mut self) {
        if let Err(e) = terminal::disable_raw_mode() {
            warn!("failed to restore terminal: {}", e);
        }
    }
}

/// Run the interactive player until `q`.
pub fn run(config: &Config) -> Result<()> {
    let controller = config.controller(false);
    let devices = controller.with_registry(|registry| registry.scan().map(|d| d.to_vec()));
    let devices = match devices {
        Ok(devices) if devices.is_empty() => return Err(PlayerError::NoDevices.into()),
        Ok(devices) => devices,
        Err(PlayerError::TooManyDevices(count)) => {
            return Err(anyhow::anyhow!("{} Chromecast devices found, only 10 can be selected", count));
        }
        Err(e) => return Err(e.into()),
    };

    let server = CommandServer::start(&config.server, controller.clone()).context("Failed to start HTTP server")?;
    println!("Server started");
    print!("{}", key_mappings(&devices));

    let result = main_loop(&controller, config);

    server.shutdown();
    controller.shutdown();
    println!("Quitting");
    result
}

fn main_loop(controller: &Controller, config: &Config) -> Result<()> {
    let _raw = RawMode::enable().context("Failed to enable raw terminal mode")?;
    let mut stdout = io::stdout();
    let mut last_refresh: Option<Instant> = None;

    loop {
        if last_refresh.map_or(true, |at| at.elapsed() >= STATUS_REFRESH) {
            let line = status_line(&controller.status());
            queue!(stdout, MoveToColumn(0), Clear(ClearType::CurrentLine), Print(line))?;
            stdout.flush()?;
            last_refresh = Some(Instant::now());
        }

        if !event::poll(KEY_POLL)? {
            continue;
        }
        let Event::Key(KeyEvent { code: KeyCode::Char(key), modifiers, kind, .. }) = event::read()? else {
            continue;
        };
        if kind != KeyEventKind::Press {
            continue;
        }
        if modifiers.contains(KeyModifiers::CONTROL) && key == 'c' {
            return Ok(());
        }

        match action_for_key(key) {
            Some(KeyAction::Quit) => return Ok(()),
            Some(KeyAction::Help) => {
                let devices = controller.with_registry(|registry| registry.devices().to_vec());
                say(&mut stdout, "Help")?;
                say(&mut stdout, &key_mappings(&devices))?;
            }
            Some(KeyAction::Run(command)) => {
                info!(%command, "key command");
                let message = describe(controller.execute(command), config);
                if let Some(message) = message {
                    say(&mut stdout, &message)?;
                }
            }
            None => say(&mut stdout, &format!("Unmapped key pressed: {}", key))?,
        }
        last_refresh = None;
    }
}

/// Console message for a command result
fn describe(result: cca_player::Result<Outcome>, config: &Config) -> Option<String> {
    let outcome = match result {
        Ok(outcome) => outcome,
        Err(PlayerError::UnknownKey(key)) => return Some(format!("No device on key {}", key)),
        Err(e) => return Some(format!("Error: {}", e)),
    };

    match outcome {
        Outcome::Selected { name, model } => Some(format!("Selected: {} ({})", name, model)),
        Outcome::Devices(devices) => Some(key_mappings(&devices)),
        Outcome::Folder(FolderOutcome::Started { count })
        | Outcome::Toggled { action: ToggleAction::Started { count }, .. } => Some(format!(
            "Playing playlist folder ({}) with {} files",
            config.folder.display(),
            count
        )),
        Outcome::Folder(FolderOutcome::NoFiles) | Outcome::Toggled { action: ToggleAction::NoFiles, .. } => {
            Some(format!("No files found under playlist folder: {}", config.folder.display()))
        }
        _ => None,
    }
}

/// Print a message on its own lines without disturbing the status line.
fn say(stdout: &mut io::Stdout, message: &str) -> io::Result<()> {
    execute!(stdout, MoveToColumn(0), Clear(ClearType::CurrentLine))?;
    for line in message.trim_end().lines() {
        execute!(stdout, Print(line), Print("\r\n"))?;
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use cca_discovery::CastKind;
    use cca_player::testing::descriptor;
    use rstest::rstest;

    #[rstest]
    #[case('3', Some(KeyAction::Run(Command::SelectDevice('3'))))]
    #[case('0', Some(KeyAction::Run(Command::SelectDevice('0'))))]
    #[case('+', Some(KeyAction::Run(Command::VolumeUp)))]
    #[case('=', Some(KeyAction::Run(Command::VolumeUp)))]
    #[case('-', Some(KeyAction::Run(Command::VolumeDown)))]
    #[case('_', Some(KeyAction::Run(Command::VolumeDown)))]
    #[case('m', Some(KeyAction::Run(Command::ToggleMute)))]
    #[case('p', Some(KeyAction::Run(Command::PlayFolder)))]
    #[case('<', Some(KeyAction::Run(Command::PreviousTrack)))]
    #[case('.', Some(KeyAction::Run(Command::NextTrack)))]
    #[case(' ', Some(KeyAction::Run(Command::PlayPauseResume)))]
    #[case('s', Some(KeyAction::Run(Command::ScanDevices)))]
    #[case('?', Some(KeyAction::Help))]
    #[case('q', Some(KeyAction::Quit))]
    #[case('x', None)]
    #[case('Q', None)]
    fn test_key_actions(#[case] key: char, #[case] expected: Option<KeyAction>) {
        assert_eq!(action_for_key(key), expected);
    }

    #[test]
    fn test_status_line_without_device() {
        assert_eq!(status_line(&StatusReport::default()), "No connected device: >");
    }

    #[test]
    fn test_status_line_playing() {
        let report = StatusReport {
            connected: true,
            device: "Den".into(),
            volume: "(0.40)".into(),
            artist: "Nina Simone".into(),
            title: "Sinnerman".into(),
            album: "Pastel Blues".into(),
            current_time: "01:05".into(),
            duration: "10:22".into(),
            paused: false,
        };
        assert_eq!(
            status_line(&report),
            "Den (0.40): Nina Simone - Sinnerman (Pastel Blues) 01:05/10:22 >"
        );
    }

    #[test]
    fn test_status_line_idle_device() {
        let report = StatusReport {
            connected: true,
            device: "Den".into(),
            volume: "(0.40x)".into(),
            ..Default::default()
        };
        assert_eq!(status_line(&report), "Den (0.40x): >");
    }

    #[test]
    fn test_key_mappings_lists_devices() {
        let devices = vec![
            ('1', descriptor("Den", CastKind::Audio)),
            ('0', descriptor("Whole House", CastKind::Group)),
        ];
        let text = key_mappings(&devices);
        assert!(text.contains(" 1 = Den (Chromecast Audio)\n"));
        assert!(text.contains(" 0 = Whole House (Google Cast Group)\n"));
        assert!(text.contains("<SPACE> = pause/resume\n"));
        assert!(text.contains("   q    = quit\n"));
    }
}
