//! Registry behaviour against the recording mock board.

use railyard::config::SystemConfig;
use railyard::device::PinSet;
use railyard::error::{DeviceError, HalError};
use railyard::pins::{ACCESSORY_MASK, DEFAULT_KIND, DEFAULT_LAYOUT};
use railyard::registry::{DeviceAddress, DeviceRegistry};

use crate::mock_hw::{HwCall, MockHardware};

fn pins(p: &[u8]) -> PinSet {
    PinSet::new(p).unwrap()
}

fn setup() -> (MockHardware, DeviceRegistry) {
    (MockHardware::new(), DeviceRegistry::new(SystemConfig::default()))
}

#[test]
fn second_device_cannot_reuse_a_pin() {
    let (mut hw, mut reg) = setup();
    assert_eq!(
        reg.create(&mut hw, pins(&[2]), "RelayTrainSwitch", None).unwrap_err(),
        DeviceError::InvalidPinCount { expected: 2, found: 1 }
    );
    reg.create(&mut hw, pins(&[2, 3]), "RelayTrainSwitch", None).unwrap();
    assert_eq!(
        reg.create(&mut hw, pins(&[3, 4]), "RelayTrainSwitch", None).unwrap_err(),
        DeviceError::PinUnavailable(3)
    );
    assert!(!hw.is_claimed(4));
    assert_eq!(reg.available_pins().len(), 24);
}

#[test]
fn relay_rests_released_and_pulses_the_lower_coil() {
    let (mut hw, mut reg) = setup();
    reg.create(&mut hw, pins(&[3, 2]), "relay", None).unwrap();
    // Active-low board: released is high.
    assert!(hw.level(2) && hw.level(3));

    let addr = DeviceAddress::Pins(pins(&[2, 3]));
    let before = hw.now();
    reg.on(&mut hw, &addr).unwrap();
    assert_eq!(hw.now() - before, 100, "one blink");
    assert_eq!(
        hw.calls,
        vec![
            HwCall::Write { pin: 2, high: true },
            HwCall::Write { pin: 2, high: false },
            HwCall::Write { pin: 2, high: true },
        ]
    );
    assert_eq!(reg.get(&addr).unwrap().state(), Some("straight"));

    hw.calls.clear();
    reg.off(&mut hw, &addr).unwrap();
    assert_eq!(hw.writes_to(3), 3);
    assert_eq!(hw.writes_to(2), 0);
    assert_eq!(reg.get(&addr).unwrap().state(), Some("turn"));
}

#[test]
fn repeating_the_current_state_touches_nothing() {
    let (mut hw, mut reg) = setup();
    reg.create(&mut hw, pins(&[6]), "onoff", None).unwrap();
    let addr = DeviceAddress::Index(1);
    reg.on(&mut hw, &addr).unwrap();
    let calls = hw.calls.len();
    reg.on(&mut hw, &addr).unwrap();
    assert_eq!(hw.calls.len(), calls);
}

#[test]
fn failed_effect_keeps_the_previous_state() {
    let (mut hw, mut reg) = setup();
    reg.create(&mut hw, pins(&[6]), "onoff", None).unwrap();
    let addr = DeviceAddress::Index(1);
    reg.on(&mut hw, &addr).unwrap();

    hw.broken.push(6);
    assert_eq!(
        reg.off(&mut hw, &addr).unwrap_err(),
        DeviceError::Hardware(HalError::GpioWriteFailed(6))
    );
    assert_eq!(reg.get(&addr).unwrap().state(), Some("on"));
}

#[test]
fn unknown_command_is_rejected() {
    let (mut hw, mut reg) = setup();
    reg.create(&mut hw, pins(&[2, 3]), "relay", None).unwrap();
    assert_eq!(
        reg.action(&mut hw, &DeviceAddress::Index(1), Some("sideways")).unwrap_err(),
        DeviceError::InvalidCommand("sideways".into())
    );
}

#[test]
fn change_between_pin_counts_leaves_the_device() {
    let (mut hw, mut reg) = setup();
    reg.create(&mut hw, pins(&[2, 3]), "relay", None).unwrap();
    reg.off(&mut hw, &DeviceAddress::Index(1)).unwrap();

    assert!(matches!(
        reg.change(&mut hw, &pins(&[2, 3]), "ServoTrainSwitch"),
        Err(DeviceError::PinCountMismatch { .. })
    ));
    let d = &reg.devices()[0];
    assert_eq!(d.name(), "RelayTrainSwitch");
    assert_eq!(d.state(), Some("turn"));
    assert!(hw.is_claimed(2) && hw.is_claimed(3));
}

#[test]
fn change_rebuilds_on_the_same_pins() {
    let (mut hw, mut reg) = setup();
    reg.create(&mut hw, pins(&[1, 2]), "relay", None).unwrap();
    reg.create(&mut hw, pins(&[3, 4]), "relay", None).unwrap();
    let old = reg.devices()[0].id();

    let changed = reg.change(&mut hw, &pins(&[1, 2]), "DoubleOnOff").unwrap();
    assert_eq!(changed.name(), "DoubleOnOff");
    assert_ne!(changed.id(), old);
    assert_eq!(reg.devices()[1].name(), "RelayTrainSwitch");
    assert!(hw.calls.contains(&HwCall::Release(1)));
    assert!(hw.is_claimed(1) && hw.is_claimed(2));
}

#[test]
fn remove_releases_pins_to_the_board() {
    let (mut hw, mut reg) = setup();
    reg.create(&mut hw, pins(&[4, 5]), "stepper", None).unwrap();
    reg.remove(&mut hw, &pins(&[4, 5])).unwrap();
    assert!(!hw.is_claimed(4) && !hw.is_claimed(5));
    assert_eq!(reg.available_pins().len(), 26);
    reg.create(&mut hw, pins(&[4, 5]), "dc_motor", None).unwrap();
}

#[test]
fn default_layout_stays_off_flash_usb_and_strap_pins() {
    let (mut hw, mut reg) = setup();
    reg.load_default_layout(&mut hw);
    assert_eq!(reg.len(), DEFAULT_LAYOUT.len());
    assert!(reg.devices().iter().all(|d| d.name() == DEFAULT_KIND && d.state().is_none()));
    assert!(reg.devices().iter().all(|d| d.pins().mask() & !ACCESSORY_MASK == 0));
    for reserved in [0, 19, 20, 26, 32, 45, 46] {
        assert!(!hw.is_claimed(reserved), "GPIO{reserved} was driven");
    }
    assert_eq!(reg.available_pins(), vec![21, 42]);
}

#[test]
fn servo_moves_between_calibrated_angles() {
    let (mut hw, mut reg) = setup();
    reg.create(&mut hw, pins(&[10]), "servo", None).unwrap();
    let addr = DeviceAddress::Index(1);
    reg.on(&mut hw, &addr).unwrap();
    reg.off(&mut hw, &addr).unwrap();

    let duties: Vec<u16> = hw
        .calls
        .iter()
        .filter_map(|c| match c {
            HwCall::Duty { pin: 10, duty } => Some(*duty),
            _ => None,
        })
        .collect();
    // 2400 us then 400 us of a 20 ms frame.
    assert_eq!(duties, vec![7864, 1310]);
    assert_eq!(reg.get(&addr).unwrap().state(), Some("turn"));
}
