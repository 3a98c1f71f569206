//! Integration tests for the AppService → registry → hardware pipeline.
//!
//! These run on the host (x86_64) and drive the service with the same
//! commands the HTTP layer sends, checking both the response bodies and
//! the pin activity they cause.

use railyard::app::commands::{AppCommand, Response};
use railyard::app::events::AppEvent;
use railyard::app::service::AppService;
use railyard::config::SystemConfig;
use railyard::device::{BeamParams, PinSet};
use railyard::error::{DeviceError, Error, ProfileError};
use railyard::registry::DeviceAddress;

use crate::mock_hw::{MockHardware, MockNvs, RecordingSink};

fn make_app() -> (AppService<MockNvs>, MockHardware, RecordingSink) {
    let mut app = AppService::new(SystemConfig::default(), MockNvs::new());
    let mut hw = MockHardware::new();
    let mut sink = RecordingSink::new();
    app.initialize(&mut hw, &mut sink);
    (app, hw, sink)
}

fn pins(p: &[u8]) -> PinSet {
    PinSet::new(p).unwrap()
}

fn devices(resp: Response) -> Vec<railyard::device::DeviceRecord> {
    match resp {
        Response::Devices { devices } => devices,
        other => panic!("expected a device list, got {other:?}"),
    }
}

// ── Boot ──────────────────────────────────────────────────────

#[test]
fn first_boot_uses_the_factory_layout() {
    let (app, _hw, sink) = make_app();
    assert!(app.is_initialized());
    assert_eq!(app.registry().len(), 12);
    assert_eq!(
        sink.events,
        vec![AppEvent::Started {
            devices: 12,
            profile: None
        }]
    );
}

#[test]
fn favourite_profile_is_restored_on_boot() {
    let flash = MockNvs::new();
    let mut app = AppService::new(SystemConfig::default(), flash.clone());
    let mut hw = MockHardware::new();
    let mut sink = RecordingSink::new();
    app.initialize(&mut hw, &mut sink);
    app.handle_command(AppCommand::RemoveDevice(pins(&[1, 2])), &mut hw, &mut sink)
        .unwrap();
    app.handle_command(AppCommand::Off(DeviceAddress::Index(1)), &mut hw, &mut sink)
        .unwrap();
    app.handle_command(AppCommand::SaveProfile("yard".into()), &mut hw, &mut sink)
        .unwrap();
    app.handle_command(AppCommand::SetFavorite("yard".into()), &mut hw, &mut sink)
        .unwrap();
    let saved = app.registry().records();

    // Reboot onto the same flash.
    drop(app);
    let mut rebooted = AppService::new(SystemConfig::default(), flash);
    let mut hw = MockHardware::new();
    let mut sink = RecordingSink::new();
    rebooted.initialize(&mut hw, &mut sink);

    assert_eq!(rebooted.registry().records(), saved);
    assert_eq!(rebooted.registry().devices()[0].state(), Some("turn"));
    assert_eq!(
        sink.events,
        vec![
            AppEvent::ProfileLoaded("yard".into()),
            AppEvent::Started {
                devices: 11,
                profile: Some("yard".into())
            }
        ]
    );
}

#[test]
fn broken_favourite_falls_back_to_the_factory_layout() {
    let mut storage = MockNvs::new();
    railyard::app::ports::StoragePort::write(&mut storage, "profiles", "bad", b"{not json").unwrap();
    railyard::app::ports::StoragePort::write(&mut storage, "profiles", "__favorite__", b"bad").unwrap();

    let mut app = AppService::new(SystemConfig::default(), storage);
    let mut hw = MockHardware::new();
    let mut sink = RecordingSink::new();
    app.initialize(&mut hw, &mut sink);

    assert_eq!(app.registry().len(), 12);
    assert!(matches!(
        sink.events[0],
        AppEvent::FallbackLayout(Error::Profile(ProfileError::Malformed(_)))
    ));
}

// ── Device management ─────────────────────────────────────────

#[test]
fn create_reports_the_whole_registry() {
    let (mut app, mut hw, mut sink) = make_app();
    let resp = app
        .handle_command(
            AppCommand::CreateDevice {
                pins: pins(&[21]),
                kind: "LightBeam".into(),
                params: Some(BeamParams {
                    n: Some(30),
                    r: Some(0),
                    g: Some(0),
                    b: Some(255),
                    ..BeamParams::default()
                }),
            },
            &mut hw,
            &mut sink,
        )
        .unwrap();

    let list = devices(resp);
    assert_eq!(list.len(), 13);
    let beam = list.last().unwrap();
    assert_eq!(beam.name, "LightBeam");
    assert_eq!(beam.params.as_ref().and_then(|p| p.n), Some(30));
    assert_eq!(
        sink.events.last(),
        Some(&AppEvent::DeviceCreated {
            pins: pins(&[21]).key(),
            kind: "LightBeam"
        })
    );
}

#[test]
fn failed_create_is_returned_not_fatal() {
    let (mut app, mut hw, mut sink) = make_app();
    let err = app
        .handle_command(
            AppCommand::CreateDevice {
                pins: pins(&[1, 42]),
                kind: "relay".into(),
                params: None,
            },
            &mut hw,
            &mut sink,
        )
        .unwrap_err();
    assert_eq!(err, Error::Device(DeviceError::PinUnavailable(1)));
    assert_eq!(app.registry().len(), 12);
    assert_eq!(sink.events.len(), 1, "only the start event");
}

#[test]
fn change_reports_only_the_changed_device() {
    let (mut app, mut hw, mut sink) = make_app();
    let resp = app
        .handle_command(
            AppCommand::ChangeDevice {
                pins: pins(&[3, 4]),
                kind: "SpurTrainSwitch".into(),
            },
            &mut hw,
            &mut sink,
        )
        .unwrap();
    let list = devices(resp);
    assert_eq!(list.len(), 1);
    assert_eq!(list[0].name, "SpurTrainSwitch");
    assert_eq!(app.registry().devices()[1].name(), "SpurTrainSwitch");
}

#[test]
fn kinds_can_be_filtered_by_pin_count() {
    let (mut app, mut hw, mut sink) = make_app();
    let Response::Kinds { kinds } = app
        .handle_command(AppCommand::ListKinds(Some(1)), &mut hw, &mut sink)
        .unwrap()
    else {
        panic!("expected kinds");
    };
    assert!(kinds.contains(&"OnOff"));
    assert!(!kinds.contains(&"RelayTrainSwitch"));

    let resp = app
        .handle_command(AppCommand::AvailablePins, &mut hw, &mut sink)
        .unwrap();
    assert_eq!(resp, Response::Pins { pins: vec![21, 42] });
}

// ── Actions ───────────────────────────────────────────────────

#[test]
fn toggle_alternates_and_emits_state_changes() {
    let (mut app, mut hw, mut sink) = make_app();
    let addr = DeviceAddress::Pins(pins(&[5, 6]));

    app.handle_command(AppCommand::Toggle(addr.clone()), &mut hw, &mut sink).unwrap();
    let resp = app.handle_command(AppCommand::Toggle(addr.clone()), &mut hw, &mut sink).unwrap();
    assert_eq!(devices(resp)[0].state.as_deref(), Some("turn"));

    let changes: Vec<_> = sink
        .events
        .iter()
        .filter(|e| matches!(e, AppEvent::StateChanged { .. }))
        .collect();
    assert_eq!(changes.len(), 2);
}

#[test]
fn steps_round_trip_for_a_stepper() {
    let (mut app, mut hw, mut sink) = make_app();
    app.handle_command(
        AppCommand::ChangeDevice {
            pins: pins(&[7, 8]),
            kind: "StepperMotor".into(),
        },
        &mut hw,
        &mut sink,
    )
    .unwrap();
    let addr = DeviceAddress::Pins(pins(&[7, 8]));

    let resp = app.handle_command(AppCommand::GetSteps(addr.clone()), &mut hw, &mut sink).unwrap();
    assert_eq!(resp, Response::Steps { steps: 30 });
    app.handle_command(AppCommand::SetSteps(addr.clone(), 5), &mut hw, &mut sink).unwrap();
    let resp = app.handle_command(AppCommand::GetSteps(addr), &mut hw, &mut sink).unwrap();
    assert_eq!(resp, Response::Steps { steps: 5 });
}

// ── Profiles ──────────────────────────────────────────────────

#[test]
fn bad_profile_load_keeps_the_current_devices() {
    let (mut app, mut hw, mut sink) = make_app();
    let before = app.registry().records();
    let err = app
        .handle_command(AppCommand::LoadProfile("ghost".into()), &mut hw, &mut sink)
        .unwrap_err();
    assert_eq!(err, Error::Profile(ProfileError::NotFound("ghost".into())));
    assert_eq!(app.registry().records(), before);
}

#[test]
fn favourite_name_is_reserved() {
    let (mut app, mut hw, mut sink) = make_app();
    let err = app
        .handle_command(AppCommand::SaveProfile("__favorite__".into()), &mut hw, &mut sink)
        .unwrap_err();
    assert_eq!(err, Error::Profile(ProfileError::ProtectedName));
}

// ── Shutdown / reset ──────────────────────────────────────────

#[test]
fn shutdown_releases_every_pin() {
    let (mut app, mut hw, mut sink) = make_app();
    let resp = app.handle_command(AppCommand::Shutdown, &mut hw, &mut sink).unwrap();
    assert_eq!(resp, Response::Done);
    assert!(app.registry().is_empty());
    assert!((0..64).all(|p| !hw.is_claimed(p)));
    assert_eq!(sink.events.last(), Some(&AppEvent::ShutdownComplete));
}

#[test]
fn reset_waits_before_restarting() {
    let (mut app, mut hw, mut sink) = make_app();
    assert!(!app.restart_pending());
    let resp = app.handle_command(AppCommand::Reset, &mut hw, &mut sink).unwrap();
    assert_eq!(resp, Response::Restarting { restart_in_secs: 3 });
    assert!(app.restart_pending());
    assert!(!app.restart_due(hw.now() + 2_999));
    assert!(app.restart_due(hw.now() + 3_000));
}
