//! A fan layout applied end to end against the in-memory register file.

use std::sync::Arc;
use std::time::Duration;

use pwm_tach::config::ControllerConfig;
use pwm_tach::governor::{GovernorConfig, StepWiseGovernor};
use pwm_tach::regs::{Access, MemoryRegisters};
use pwm_tach::{ChannelIndex, CoolingDevice, Error, PwmTachController};
use tokio::sync::watch;
use tokio_util::sync::CancellationToken;

const CLOCK_HZ: u32 = 200_000_000;
const FULL_MEASUREMENT: u32 = 1 << 20;

const LAYOUT: &str = r#"
{
  "fans": [
    {
      "name": "fan",
      "pwm_channel": 0,
      "cooling_levels": [0, 64, 128, 255],
      "tach_channels": [0, 1]
    },
    {
      "name": "rear",
      "pwm_channel": 2,
      "pwm_frequency_hz": 20000,
      "tach_channels": [2],
      "pulses_per_revolution": 4,
      "tach_divider_exponent": 3
    }
  ]
}
"#;

fn ch(index: u8) -> ChannelIndex {
    ChannelIndex::new(index).unwrap()
}

fn apply() -> (
    Arc<PwmTachController<MemoryRegisters>>,
    Vec<pwm_tach::PwmCoolingDevice<MemoryRegisters>>,
) {
    let config = ControllerConfig::from_json_str(LAYOUT).unwrap();
    let controller = Arc::new(PwmTachController::new(MemoryRegisters::new(), CLOCK_HZ));
    let devices = config.apply(&controller).unwrap();
    (controller, devices)
}

#[test]
fn should_program_channels_in_layout_order() {
    let (controller, _devices) = apply();

    let writes = controller.registers().writes();
    let offsets: Vec<u32> = writes.iter().map(|&(offset, _)| offset).collect();
    assert_eq!(
        offsets,
        vec![
            // fan: duty, control, enable, then both tach channels
            0x04, 0x00, 0x00, 0x08, 0x18,
            // rear: duty, control, enable, then its tach channel
            0x24, 0x20, 0x20, 0x28,
        ]
    );

    let regs = controller.registers();
    assert_eq!(regs.value(0x04), 0xff00_000a);
    assert_eq!(regs.value(0x00), 31 | (1 << 16) | (1 << 12));
    assert_eq!(regs.value(0x08), (1 << 28) | (5 << 20));
    assert_eq!(regs.value(0x28), (1 << 28) | (3 << 20));
}

#[test]
fn should_create_cooling_device_only_where_levels_are_listed() {
    let (controller, devices) = apply();

    assert_eq!(devices.len(), 1);
    let device = &devices[0];
    assert_eq!(device.name(), "fan0");
    assert_eq!(device.max_state(), 3);
    assert_eq!(device.cur_state(), 0);

    assert!(matches!(controller.set_duty(ch(0), 50), Err(Error::CoolingOwned(0))));
    controller.set_duty(ch(2), 50).unwrap();
    assert_eq!(controller.get_duty(ch(2)).unwrap(), 50);
}

#[test]
fn should_drive_fan_through_cooling_states() {
    let (controller, devices) = apply();
    let device = &devices[0];

    device.set_cur_state(2).unwrap();
    assert_eq!(controller.get_duty(ch(0)).unwrap(), 128);
    assert_eq!(controller.registers().value(0x04), 0xff00_0080);

    device.set_cur_state(0).unwrap();
    assert_eq!(controller.registers().value(0x00) & ((1 << 16) | (1 << 12)), 0);

    controller.registers().clear_log();
    assert!(device.set_cur_state(4).is_err());
    assert_eq!(device.cur_state(), 0);
    assert!(controller.registers().accesses().is_empty());
}

#[test]
fn should_read_rpm_with_each_fans_tach_settings() {
    let (controller, _devices) = apply();
    let regs = controller.registers();
    regs.script_reads(0x0c, [FULL_MEASUREMENT | 99]);
    regs.script_reads(0x2c, [FULL_MEASUREMENT | 99]);

    // 200e6 / (100 * 1024 * 2) = 976, * 60
    assert_eq!(controller.get_rpm(ch(0)).unwrap(), 58_560);
    // 200e6 / (100 * 64 * 4) = 7812, * 60
    assert_eq!(controller.get_rpm(ch(2)).unwrap(), 468_720);
    assert!(matches!(controller.get_rpm(ch(3)), Err(Error::TachChannelAbsent(3))));
}

#[test]
fn should_flag_stale_reading_without_failing() {
    let (controller, _devices) = apply();
    controller.registers().script_reads(0x1c, [7, 8, 99]);

    let reading = controller.read_rpm(ch(1)).unwrap();

    assert!(reading.stale);
    assert_eq!(reading.raw, 99);
    let status_reads = controller
        .registers()
        .accesses()
        .into_iter()
        .filter(|access| matches!(access, Access::Read { offset: 0x1c, .. }))
        .count();
    assert_eq!(status_reads, 3);
}

#[tokio::test(start_paused = true)]
async fn should_let_governor_spin_fan_up() {
    let (controller, mut devices) = apply();
    let device = Arc::new(devices.remove(0));
    let (temp_tx, temp_rx) = watch::channel(Some(90.0_f32));

    let tick = Duration::from_secs(1);
    let governor = StepWiseGovernor::new(GovernorConfig::default(), Arc::clone(&device), temp_rx)
        .with_tick_duration(tick);
    let cancellation = CancellationToken::new();
    let handle = tokio::spawn(governor.run(cancellation.clone()));

    tokio::time::sleep(tick * 5).await;
    assert_eq!(device.cur_state(), 3);
    assert_eq!(controller.get_duty(ch(0)).unwrap(), 255);
    assert_eq!(controller.registers().value(0x04), 0xff00_0000);

    temp_tx.send(Some(30.0)).unwrap();
    tokio::time::sleep(tick * 5).await;
    assert_eq!(device.cur_state(), 0);

    cancellation.cancel();
    handle.await.unwrap();
}
