//! Fan layout configuration.
//!
//! Describes which PWM channel drives each fan, which tach channels
//! watch it, and an optional cooling level table. Parsed from JSON:
//!
//! ```json
//! {
//!   "fans": [
//!     { "name": "fan", "pwm_channel": 0, "cooling_levels": [0, 64, 128, 255],
//!       "tach_channels": [0, 1] }
//!   ]
//! }
//! ```

use std::collections::HashSet;
use std::sync::Arc;

use serde::{Deserialize, Serialize};

use crate::channel::{
    ChannelIndex, DEFAULT_PULSES_PER_REVOLUTION, DEFAULT_TACH_DIVIDER_EXPONENT,
    DEFAULT_TARGET_FREQUENCY_HZ, TachChannelConfig,
};
use crate::controller::PwmTachController;
use crate::cooling::PwmCoolingDevice;
use crate::error::{Error, Result};
use crate::regs::RegisterAccess;
use crate::tracing::prelude::*;

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ControllerConfig {
    #[serde(default)]
    pub fans: Vec<FanConfig>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct FanConfig {
    /// Prefix of the cooling device name.
    #[serde(default = "default_name")]
    pub name: String,

    pub pwm_channel: ChannelIndex,

    #[serde(default = "default_frequency")]
    pub pwm_frequency_hz: u32,

    /// Duty per cooling state. Empty means the fan gets no cooling
    /// device and keeps its duty under direct control.
    #[serde(default)]
    pub cooling_levels: Vec<u8>,

    pub tach_channels: Vec<ChannelIndex>,

    #[serde(default = "default_pulses")]
    pub pulses_per_revolution: u8,

    #[serde(default = "default_exponent")]
    pub tach_divider_exponent: u8,
}

fn default_name() -> String {
    "fan".into()
}

fn default_frequency() -> u32 {
    DEFAULT_TARGET_FREQUENCY_HZ
}

fn default_pulses() -> u8 {
    DEFAULT_PULSES_PER_REVOLUTION
}

fn default_exponent() -> u8 {
    DEFAULT_TACH_DIVIDER_EXPONENT
}

impl FanConfig {
    fn tach_config(&self) -> TachChannelConfig {
        TachChannelConfig {
            pulses_per_revolution: self.pulses_per_revolution,
            divider_exponent: self.tach_divider_exponent,
            ..Default::default()
        }
    }
}

impl ControllerConfig {
    pub fn from_json_str(json: &str) -> Result<Self> {
        let config: Self = serde_json::from_str(json)?;
        config.validate()?;
        Ok(config)
    }

    /// Check every fan before anything is programmed.
    ///
    /// Rejects fans without tach channels, bad tach parameters, and any
    /// PWM or tach channel claimed twice.
    pub fn validate(&self) -> Result<()> {
        let mut pwm_seen = HashSet::new();
        let mut tach_seen = HashSet::new();

        for fan in &self.fans {
            if fan.tach_channels.is_empty() {
                return Err(Error::InvalidConfig(format!(
                    "fan on PWM channel {} lists no tach channels",
                    fan.pwm_channel
                )));
            }
            fan.tach_config().validate()?;

            if !pwm_seen.insert(fan.pwm_channel) {
                return Err(Error::InvalidConfig(format!(
                    "PWM channel {} used by more than one fan",
                    fan.pwm_channel
                )));
            }
            for &tach in &fan.tach_channels {
                if !tach_seen.insert(tach) {
                    return Err(Error::InvalidConfig(format!(
                        "tach channel {tach} used more than once"
                    )));
                }
            }
        }
        Ok(())
    }

    /// Program every fan and return the cooling devices created.
    ///
    /// Each fan's PWM channel is enabled with its default duty, then its
    /// cooling device is created, then its tach channels are enabled.
    /// If a step fails, the devices created so far are dropped and their
    /// channels go back to direct duty control.
    pub fn apply<R: RegisterAccess>(
        &self,
        controller: &Arc<PwmTachController<R>>,
    ) -> Result<Vec<PwmCoolingDevice<R>>> {
        self.validate()?;

        let mut devices = Vec::new();
        for fan in &self.fans {
            controller.enable_pwm_channel(fan.pwm_channel, fan.pwm_frequency_hz)?;

            if !fan.cooling_levels.is_empty() {
                let device = PwmCoolingDevice::register(
                    Arc::clone(controller),
                    fan.pwm_channel,
                    &fan.name,
                    fan.cooling_levels.clone(),
                )?;
                info!(
                    name = device.name(),
                    channel = %fan.pwm_channel,
                    "Cooling device registered"
                );
                devices.push(device);
            }

            let tach = fan.tach_config();
            for &channel in &fan.tach_channels {
                controller.enable_tach_channel(channel, tach)?;
            }
        }

        debug!(
            fans = self.fans.len(),
            cooling_devices = devices.len(),
            "Configuration applied"
        );
        Ok(devices)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::regs::MemoryRegisters;
    use test_case::test_case;

    #[test]
    fn should_fill_defaults() {
        let config = ControllerConfig::from_json_str(
            r#"{ "fans": [ { "pwm_channel": 3, "tach_channels": [4] } ] }"#,
        )
        .unwrap();

        let fan = &config.fans[0];
        assert_eq!(fan.name, "fan");
        assert_eq!(fan.pwm_frequency_hz, 25_000);
        assert_eq!(fan.pulses_per_revolution, 2);
        assert_eq!(fan.tach_divider_exponent, 5);
        assert!(fan.cooling_levels.is_empty());
    }

    #[test_case(r#"{ "fans": [ { "pwm_channel": 0, "tach_channels": [] } ] }"#; "no tach channels")]
    #[test_case(r#"{ "fans": [ { "pwm_channel": 0, "tach_channels": [0], "pulses_per_revolution": 0 } ] }"#; "zero pulses")]
    #[test_case(r#"{ "fans": [ { "pwm_channel": 0, "tach_channels": [0], "tach_divider_exponent": 16 } ] }"#; "exponent too large")]
    #[test_case(r#"{ "fans": [ { "pwm_channel": 0, "tach_channels": [0] }, { "pwm_channel": 0, "tach_channels": [1] } ] }"#; "shared PWM channel")]
    #[test_case(r#"{ "fans": [ { "pwm_channel": 0, "tach_channels": [0] }, { "pwm_channel": 1, "tach_channels": [0] } ] }"#; "shared tach channel")]
    fn should_reject_invalid_layout(json: &str) {
        assert!(ControllerConfig::from_json_str(json).is_err());
    }

    #[test]
    fn should_reject_out_of_range_channel_while_parsing() {
        let result = ControllerConfig::from_json_str(
            r#"{ "fans": [ { "pwm_channel": 16, "tach_channels": [0] } ] }"#,
        );
        assert!(matches!(result, Err(Error::ConfigParse(_))));
    }

    #[test]
    fn should_not_touch_registers_when_invalid() {
        let config = ControllerConfig {
            fans: vec![
                FanConfig {
                    name: "fan".into(),
                    pwm_channel: ChannelIndex::new(0).unwrap(),
                    pwm_frequency_hz: 25_000,
                    cooling_levels: vec![],
                    tach_channels: vec![ChannelIndex::new(0).unwrap()],
                    pulses_per_revolution: 2,
                    tach_divider_exponent: 5,
                },
                FanConfig {
                    name: "fan".into(),
                    pwm_channel: ChannelIndex::new(1).unwrap(),
                    pwm_frequency_hz: 25_000,
                    cooling_levels: vec![],
                    tach_channels: vec![],
                    pulses_per_revolution: 2,
                    tach_divider_exponent: 5,
                },
            ],
        };
        let controller = Arc::new(PwmTachController::new(MemoryRegisters::new(), 200_000_000));

        assert!(matches!(config.apply(&controller), Err(Error::InvalidConfig(_))));
        assert!(controller.registers().accesses().is_empty());
    }

    #[test]
    fn should_release_cooling_channels_when_apply_fails() {
        let config = ControllerConfig::from_json_str(
            r#"{ "fans": [
                { "pwm_channel": 0, "cooling_levels": [0, 255], "tach_channels": [0] },
                { "pwm_channel": 2, "cooling_levels": [0, 255], "tach_channels": [2] }
            ] }"#,
        )
        .unwrap();
        let controller = Arc::new(PwmTachController::new(MemoryRegisters::new(), 200_000_000));
        controller.registers().fail_writes_to(0x28);

        assert!(matches!(config.apply(&controller), Err(Error::Register(_))));

        for index in [0, 2] {
            let channel = ChannelIndex::new(index).unwrap();
            controller.set_duty(channel, 0x40).unwrap();
            assert_eq!(controller.get_duty(channel).unwrap(), 0x40);
        }
    }
}
