//! Command parsing and dispatch through the controller

use std::fs;
use std::path::Path;
use std::sync::Arc;
use std::thread;
use std::time::{Duration, Instant};

use cca_device::{IdleReason, MediaStatus, RemoteState};
use cca_player::testing::FakeProvider;
use cca_player::{
    Command, Controller, MediaSource, Outcome, PlayerConfig, PlayerState, SessionRegistry,
    ToggleAction, UnknownCommand,
};
use rstest::rstest;
use tempfile::TempDir;

fn controller_for(provider: &FakeProvider, serve_root: &Path) -> Controller {
    let media = MediaSource::new("http://127.0.0.1:8000/".parse().unwrap(), serve_root);
    let config = PlayerConfig::new(media).with_default_folder(serve_root.join("ZPL"));
    Controller::new(SessionRegistry::new(Arc::new(provider.clone()), config))
}

fn wait_for(mut condition: impl FnMut() -> bool) -> bool {
    let deadline = Instant::now() + Duration::from_secs(2);
    while Instant::now() < deadline {
        if condition() {
            return true;
        }
        thread::sleep(Duration::from_millis(10));
    }
    false
}

#[rstest]
#[case("volume_toggle_mute", Command::ToggleMute)]
#[case("volume_up", Command::VolumeUp)]
#[case("volume_down", Command::VolumeDown)]
#[case("prev_track", Command::PreviousTrack)]
#[case("next_track", Command::NextTrack)]
#[case("play_pause_resume", Command::PlayPauseResume)]
#[case("get_status", Command::GetStatus)]
#[case("scan_devices", Command::ScanDevices)]
#[case("select_device 3", Command::SelectDevice('3'))]
#[case("select_device 0", Command::SelectDevice('0'))]
fn test_parse_command(#[case] text: &str, #[case] expected: Command) {
    assert_eq!(text.parse::<Command>(), Ok(expected));
    assert_eq!(expected.to_string(), text);
}

#[rstest]
#[case("bogus_command")]
#[case("")]
#[case("play_folder")]
#[case("select_device")]
#[case("select_device ")]
#[case("select_device 12")]
#[case("VOLUME_UP")]
#[case("volume_up ")]
fn test_reject_unknown_command(#[case] text: &str) {
    assert_eq!(text.parse::<Command>(), Err(UnknownCommand(text.to_string())));
}

#[rstest]
#[case(Command::ToggleMute)]
#[case(Command::VolumeUp)]
#[case(Command::VolumeDown)]
#[case(Command::PreviousTrack)]
#[case(Command::NextTrack)]
#[case(Command::PlayPauseResume)]
#[case(Command::PlayFolder)]
fn test_commands_without_device_are_ignored(#[case] command: Command) {
    let dir = TempDir::new().unwrap();
    let controller = controller_for(&FakeProvider::new(&["Den"], &[]), dir.path());

    assert_eq!(controller.execute(command).unwrap(), Outcome::Done);
}

#[test]
fn test_get_status_without_device() {
    let dir = TempDir::new().unwrap();
    let controller = controller_for(&FakeProvider::default(), dir.path());

    let body = controller.execute(Command::GetStatus).unwrap().body();

    assert_eq!(body.split('\n').count(), 9);
    assert!(body.starts_with("0\n"));
}

#[test]
fn test_scan_devices_body() {
    let dir = TempDir::new().unwrap();
    let controller = controller_for(&FakeProvider::new(&["Kitchen", "Den"], &["Whole House"]), dir.path());

    let outcome = controller.execute(Command::ScanDevices).unwrap();

    assert_eq!(outcome.body(), "1,Den\n2,Kitchen\n0,Whole House");
}

#[test]
fn test_select_unscanned_key_fails() {
    let dir = TempDir::new().unwrap();
    let controller = controller_for(&FakeProvider::new(&["Den"], &[]), dir.path());

    assert!(controller.execute(Command::SelectDevice('1')).is_err());
}

#[test]
fn test_select_and_receive_notifications() {
    let dir = TempDir::new().unwrap();
    let provider = FakeProvider::new(&["Den"], &[]);
    let controller = controller_for(&provider, dir.path());
    controller.execute(Command::ScanDevices).unwrap();

    let outcome = controller.execute(Command::SelectDevice('1')).unwrap();
    assert!(matches!(outcome, Outcome::Selected { ref name, .. } if name == "Den"));
    assert!(!controller.is_connected());

    let again = controller.execute(Command::SelectDevice('1')).unwrap();
    assert_eq!(again, Outcome::AlreadySelected { name: "Den".to_string() });

    provider
        .device("Den")
        .unwrap()
        .emit(MediaStatus::new(RemoteState::Playing, None));

    assert!(wait_for(|| controller.is_connected()));
    assert!(wait_for(|| controller.with_registry(|r| {
        r.session().map(|s| s.state()) == Some(PlayerState::Playing)
    })));

    let status = controller.execute(Command::GetStatus).unwrap().body();
    let lines: Vec<&str> = status.split('\n').collect();
    assert_eq!(lines.len(), 9);
    assert_eq!(lines[0], "1");
    assert_eq!(lines[1], "Den");
    assert_eq!(lines[2], "(0.50)");
}

#[test]
fn test_play_pause_resume_cycle() {
    let dir = TempDir::new().unwrap();
    let folder = dir.path().join("ZPL");
    fs::create_dir(&folder).unwrap();
    fs::write(folder.join("one.mp3"), b"").unwrap();
    fs::write(folder.join("two.flac"), b"").unwrap();
    fs::write(folder.join("notes.txt"), b"").unwrap();

    let provider = FakeProvider::new(&["Den"], &[]);
    let controller = controller_for(&provider, dir.path());
    controller.execute(Command::ScanDevices).unwrap();
    controller.execute(Command::SelectDevice('1')).unwrap();

    let started = controller.execute(Command::PlayPauseResume).unwrap();
    assert_eq!(
        started,
        Outcome::Toggled {
            previous: PlayerState::Unknown,
            action: ToggleAction::Started { count: 2 },
        }
    );
    let device = provider.device("Den").unwrap();
    assert_eq!(device.loads().len(), 1);

    controller.with_registry(|r| {
        let generation = r.active_generation().unwrap();
        r.dispatch_status(generation, &MediaStatus::new(RemoteState::Playing, None))
            .unwrap();
    });

    let paused = controller.execute(Command::PlayPauseResume).unwrap();
    assert!(matches!(paused, Outcome::Toggled { action: ToggleAction::Paused, .. }));
    assert_eq!(device.calls().last().map(String::as_str), Some("pause"));
}

#[test]
fn test_finished_track_advances_through_status_pump() {
    let dir = TempDir::new().unwrap();
    let folder = dir.path().join("ZPL");
    fs::create_dir(&folder).unwrap();
    fs::write(folder.join("one.mp3"), b"").unwrap();
    fs::write(folder.join("two.mp3"), b"").unwrap();

    let provider = FakeProvider::new(&["Den"], &[]);
    let controller = controller_for(&provider, dir.path());
    controller.execute(Command::ScanDevices).unwrap();
    controller.execute(Command::SelectDevice('1')).unwrap();
    controller.execute(Command::PlayFolder).unwrap();
    let device = provider.device("Den").unwrap();
    assert_eq!(device.loads().len(), 1);

    device.emit(MediaStatus::new(RemoteState::Playing, None));
    device.emit(MediaStatus::new(RemoteState::Idle, Some(IdleReason::Finished)));

    assert!(wait_for(|| device.loads().len() == 2));
    let loads = device.loads();
    assert_ne!(loads[0].url, loads[1].url);
    assert_eq!(controller.with_registry(|r| r.session().unwrap().playlist().cursor()), Some(1));
}

#[test]
fn test_play_pause_resume_with_empty_folder() {
    let dir = TempDir::new().unwrap();
    let provider = FakeProvider::new(&["Den"], &[]);
    let controller = controller_for(&provider, dir.path());
    fs::create_dir(dir.path().join("ZPL")).unwrap();
    controller.execute(Command::ScanDevices).unwrap();
    controller.execute(Command::SelectDevice('1')).unwrap();

    let outcome = controller.execute(Command::PlayPauseResume).unwrap();

    assert!(matches!(outcome, Outcome::Toggled { action: ToggleAction::NoFiles, .. }));
    assert!(provider.device("Den").unwrap().loads().is_empty());
}

#[test]
fn test_volume_commands_use_configured_step() {
    let dir = TempDir::new().unwrap();
    let provider = FakeProvider::new(&["Den"], &[]);
    let controller = controller_for(&provider, dir.path());
    controller.execute(Command::ScanDevices).unwrap();
    controller.execute(Command::SelectDevice('1')).unwrap();

    let outcome = controller.execute(Command::VolumeUp).unwrap();

    match outcome {
        Outcome::Volume { before, after } => {
            assert_eq!(before, 0.5);
            assert!((after - 0.55).abs() < 1e-6);
        }
        other => panic!("unexpected outcome {:?}", other),
    }
    assert_eq!(controller.execute(Command::ToggleMute).unwrap(), Outcome::Muted(true));
    assert_eq!(provider.device("Den").unwrap().volume_level(), 0.0);
}

#[test]
fn test_shutdown_disconnects() {
    let dir = TempDir::new().unwrap();
    let provider = FakeProvider::new(&["Den"], &[]);
    let controller = controller_for(&provider, dir.path());
    controller.execute(Command::ScanDevices).unwrap();
    controller.execute(Command::SelectDevice('1')).unwrap();

    controller.shutdown();

    assert!(provider.device("Den").unwrap().is_disconnected());
    assert_eq!(controller.status().to_string(), "0\n\n\n\n\n\n\n\n");
}
