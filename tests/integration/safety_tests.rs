//! Disconnect interlock and periodic multiplexer, driven through the
//! application service the way the main loop drives them.

use railyard::app::commands::AppCommand;
use railyard::app::events::AppEvent;
use railyard::app::service::AppService;
use railyard::config::SystemConfig;
use railyard::device::{BeamParams, PinSet};
use railyard::events::Event;
use railyard::registry::{DeviceAddress, DeviceRegistry};
use railyard::safety::OVERDUE_GRACE_MS;

use crate::mock_hw::{HwCall, MockHardware, MockNvs, RecordingSink};

fn pins(p: &[u8]) -> PinSet {
    PinSet::new(p).unwrap()
}

fn empty_service() -> (AppService<MockNvs>, MockHardware, RecordingSink) {
    (
        AppService::new(SystemConfig::default(), MockNvs::new()),
        MockHardware::new(),
        RecordingSink::new(),
    )
}

fn create(app: &mut AppService<MockNvs>, hw: &mut MockHardware, sink: &mut RecordingSink, p: &[u8], kind: &str) {
    app.handle_command(
        AppCommand::CreateDevice {
            pins: pins(p),
            kind: kind.into(),
            params: None,
        },
        hw,
        sink,
    )
    .unwrap();
}

// ── Disconnect ────────────────────────────────────────────────

#[test]
fn energized_disconnect_is_forced_off_on_expiry() {
    let (mut app, mut hw, mut sink) = empty_service();
    create(&mut app, &mut hw, &mut sink, &[9], "Disconnect");
    let addr = DeviceAddress::Index(1);

    app.handle_command(AppCommand::On(addr.clone()), &mut hw, &mut sink).unwrap();
    let id = app.registry().devices()[0].id();
    assert!(!hw.level(9), "active-low relay energized");
    assert!(hw.calls.contains(&HwCall::ArmOneshot { id, delay_ms: 4000 }));
    let generation = hw.oneshot_generation(id).unwrap();

    assert!(hw.advance(3999).is_empty());
    let fired = hw.advance(1);
    assert_eq!(fired, vec![Event::SafetyTimeout(id, generation)]);
    for event in fired {
        app.handle_event(event, &mut hw, &mut sink);
    }

    assert!(hw.level(9));
    assert_eq!(app.registry().get(&addr).unwrap().state(), Some("off"));
    assert_eq!(
        sink.events.last(),
        Some(&AppEvent::SafetyShutdown {
            pins: pins(&[9]).key()
        })
    );
}

#[test]
fn switching_off_first_cancels_the_timeout() {
    let (mut app, mut hw, mut sink) = empty_service();
    create(&mut app, &mut hw, &mut sink, &[9], "disconnect");
    let addr = DeviceAddress::Index(1);
    let id = app.registry().devices()[0].id();

    app.handle_command(AppCommand::On(addr.clone()), &mut hw, &mut sink).unwrap();
    let generation = hw.oneshot_generation(id).unwrap();
    app.handle_command(AppCommand::Off(addr.clone()), &mut hw, &mut sink).unwrap();
    assert!(hw.calls.contains(&HwCall::CancelOneshot(id)));
    assert!(hw.advance(10_000).is_empty());

    // An expiry that was already queued when the cancel ran.
    let events = sink.events.len();
    let writes = hw.writes_to(9);
    app.handle_event(Event::SafetyTimeout(id, generation), &mut hw, &mut sink);
    assert_eq!(hw.writes_to(9), writes);
    assert_eq!(sink.events.len(), events);
}

#[test]
fn re_energizing_replaces_the_pending_timeout() {
    let (mut app, mut hw, mut sink) = empty_service();
    create(&mut app, &mut hw, &mut sink, &[9], "disconnect");
    let addr = DeviceAddress::Index(1);
    let id = app.registry().devices()[0].id();

    app.handle_command(AppCommand::On(addr.clone()), &mut hw, &mut sink).unwrap();
    app.handle_command(AppCommand::Off(addr.clone()), &mut hw, &mut sink).unwrap();
    hw.advance(2000);
    app.handle_command(AppCommand::On(addr.clone()), &mut hw, &mut sink).unwrap();

    // The first window would have closed here.
    assert!(hw.advance(2500).is_empty());
    assert!(!hw.level(9));
    let fired = hw.advance(1500);
    assert!(matches!(fired.as_slice(), [Event::SafetyTimeout(i, _)] if *i == id));
    app.handle_event(fired[0], &mut hw, &mut sink);
    assert!(hw.level(9));
}

#[test]
fn energized_disconnect_holds_the_multiplexer() {
    let (mut app, mut hw, mut sink) = empty_service();
    create(&mut app, &mut hw, &mut sink, &[15], "light_beam");
    create(&mut app, &mut hw, &mut sink, &[9], "disconnect");

    app.handle_command(AppCommand::On(DeviceAddress::Index(1)), &mut hw, &mut sink).unwrap();
    assert!(hw.periodic().is_some());

    app.handle_command(AppCommand::On(DeviceAddress::Index(2)), &mut hw, &mut sink).unwrap();
    assert_eq!(hw.periodic(), None);
    assert!(app.registry().multiplexer().is_suspended());

    let id = app.registry().devices()[1].id();
    for event in hw.advance(4000) {
        assert!(matches!(event, Event::SafetyTimeout(i, _) if i == id));
        app.handle_event(event, &mut hw, &mut sink);
    }
    assert!(!app.registry().multiplexer().is_suspended());
    assert_eq!(hw.periodic(), Some(app.registry().multiplexer().period_ms()));
}

#[test]
fn queued_expiry_from_an_earlier_window_is_ignored() {
    let (mut app, mut hw, mut sink) = empty_service();
    create(&mut app, &mut hw, &mut sink, &[9], "disconnect");
    let addr = DeviceAddress::Index(1);
    let id = app.registry().devices()[0].id();

    app.handle_command(AppCommand::On(addr.clone()), &mut hw, &mut sink).unwrap();
    // The window closes, but the expiry is still in the queue when the
    // operator switches the track off and on again.
    let held = hw.advance(4000);
    assert_eq!(held.len(), 1);
    app.handle_command(AppCommand::Off(addr.clone()), &mut hw, &mut sink).unwrap();
    app.handle_command(AppCommand::On(addr.clone()), &mut hw, &mut sink).unwrap();

    let events = sink.events.len();
    for event in held {
        app.handle_event(event, &mut hw, &mut sink);
    }
    assert_eq!(app.registry().get(&addr).unwrap().state(), Some("on"));
    assert!(!hw.level(9), "new window still running");
    assert_eq!(sink.events.len(), events);

    // The new window is enforced on its own schedule.
    assert!(hw.advance(3999).is_empty());
    for event in hw.advance(1) {
        assert!(matches!(event, Event::SafetyTimeout(i, _) if i == id));
        app.handle_event(event, &mut hw, &mut sink);
    }
    assert!(hw.level(9));
    assert_eq!(app.registry().get(&addr).unwrap().state(), Some("off"));
}

#[test]
fn lost_expiry_is_forced_by_the_deadline_sweep() {
    let (mut app, mut hw, mut sink) = empty_service();
    create(&mut app, &mut hw, &mut sink, &[9], "disconnect");
    let addr = DeviceAddress::Index(1);
    app.handle_command(AppCommand::On(addr.clone()), &mut hw, &mut sink).unwrap();

    // The timer fires but its event never makes it into the queue.
    assert_eq!(hw.advance(4000).len(), 1);
    app.enforce_safety_deadlines(&mut hw, &mut sink);
    assert!(!hw.level(9), "still inside the grace period");

    hw.advance(OVERDUE_GRACE_MS);
    app.enforce_safety_deadlines(&mut hw, &mut sink);
    assert!(hw.level(9));
    assert_eq!(app.registry().get(&addr).unwrap().state(), Some("off"));
    assert_eq!(
        sink.events.last(),
        Some(&AppEvent::SafetyShutdown {
            pins: pins(&[9]).key()
        })
    );
    assert_eq!(app.registry().interlock().pending(), 0);
}

// ── Multiplexer ───────────────────────────────────────────────

#[test]
fn period_is_buffer_plus_every_registered_duration() {
    let mut hw = MockHardware::new();
    let mut reg = DeviceRegistry::new(SystemConfig::default());
    let slow = BeamParams {
        n: Some(8),
        delay: Some(20),
        ..BeamParams::default()
    };
    reg.create(&mut hw, pins(&[14]), "light_beam", None).unwrap();
    reg.create(&mut hw, pins(&[15]), "light_beam", Some(&slow)).unwrap();

    // (2n + beam_length - 1) * delay
    let d1 = (2 * 8 + 3 - 1) * 10;
    let d2 = (2 * 8 + 3 - 1) * 20;

    reg.on(&mut hw, &DeviceAddress::Index(1)).unwrap();
    assert_eq!(hw.periodic(), Some(100 + d1));
    reg.on(&mut hw, &DeviceAddress::Index(2)).unwrap();
    assert_eq!(hw.periodic(), Some(100 + d1 + d2));

    reg.off(&mut hw, &DeviceAddress::Index(1)).unwrap();
    assert_eq!(hw.periodic(), Some(100 + d2));
    reg.off(&mut hw, &DeviceAddress::Index(2)).unwrap();
    assert_eq!(hw.periodic(), None);

    // Every reprogramming went through a disarm.
    let arms = hw.calls.iter().filter(|c| matches!(c, HwCall::ArmPeriodic(_))).count();
    let disarms = hw.calls.iter().filter(|c| **c == HwCall::DisarmPeriodic).count();
    assert_eq!(arms, 3);
    assert_eq!(disarms, 3);
}

#[test]
fn measured_beam_duration_matches_the_real_run() {
    let mut hw = MockHardware::new();
    let mut reg = DeviceRegistry::new(SystemConfig::default());
    let reversing = BeamParams {
        n: Some(12),
        beam_length: Some(4),
        reverse_at_end: Some(1),
        ..BeamParams::default()
    };
    reg.create(&mut hw, pins(&[15]), "light_beam", Some(&reversing)).unwrap();
    reg.on(&mut hw, &DeviceAddress::Index(1)).unwrap();
    let measured = reg.multiplexer().period_ms() - 100;
    assert_eq!(measured, 2 * (2 * 12 + 4 - 1) * 10);

    let before = hw.now();
    reg.run_tick(&mut hw);
    assert_eq!(hw.now() - before, u64::from(measured));
    assert_eq!(reg.multiplexer().overruns(), 0);
    assert_eq!(hw.frame(15).unwrap(), vec![(0, 0, 0); 12].as_slice());
}

#[test]
fn tick_lights_the_strip_in_the_beam_colour() {
    let (mut app, mut hw, mut sink) = empty_service();
    create(&mut app, &mut hw, &mut sink, &[15], "light_beam");
    app.handle_command(AppCommand::On(DeviceAddress::Index(1)), &mut hw, &mut sink).unwrap();

    hw.calls.clear();
    app.handle_event(Event::MultiplexTick, &mut hw, &mut sink);
    let frames = hw.calls.iter().filter(|c| **c == HwCall::Pixels { pin: 15 }).count();
    // One write per lit pixel and one per darkened pixel.
    assert_eq!(frames, 16);
}
