//! Per-channel parameter records and the store that owns them.

use parking_lot::{Mutex, MutexGuard};
use serde::{Deserialize, Serialize};
use strum::{Display, EnumString};

use crate::cooling::CoolingLevels;
use crate::divider::DividerSetting;
use crate::error::{Error, Result};

/// Number of PWM channels, and of tachometer channels.
pub const NUM_CHANNELS: usize = 16;

pub const DEFAULT_TARGET_FREQUENCY_HZ: u32 = 25_000;
pub const DEFAULT_FALLING_POINT: u8 = 0x0a;
pub const DEFAULT_FAILSAFE_POINT: u8 = 0x10;
pub const DEFAULT_PULSES_PER_REVOLUTION: u8 = 2;

/// Covers roughly 5 to 5 859 375 RPM.
pub const DEFAULT_TACH_DIVIDER_EXPONENT: u8 = 5;

pub const MAX_TACH_DIVIDER_EXPONENT: u8 = 15;
pub const MAX_TACH_THRESHOLD: u32 = 0xf_ffff;

/// Index of a PWM or tachometer channel, guaranteed below [`NUM_CHANNELS`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(try_from = "u8", into = "u8")]
pub struct ChannelIndex(u8);

impl ChannelIndex {
    pub fn new(index: u8) -> Result<Self> {
        Self::try_from(u32::from(index))
    }

    pub fn get(self) -> u8 {
        self.0
    }

    pub fn all() -> impl Iterator<Item = ChannelIndex> {
        (0..NUM_CHANNELS as u8).map(ChannelIndex)
    }

    fn slot(self) -> usize {
        usize::from(self.0)
    }
}

impl TryFrom<u32> for ChannelIndex {
    type Error = Error;

    fn try_from(index: u32) -> Result<Self> {
        if index as usize >= NUM_CHANNELS {
            return Err(Error::ChannelOutOfRange(index));
        }
        Ok(Self(index as u8))
    }
}

impl TryFrom<u8> for ChannelIndex {
    type Error = Error;

    fn try_from(index: u8) -> Result<Self> {
        Self::try_from(u32::from(index))
    }
}

impl From<ChannelIndex> for u8 {
    fn from(index: ChannelIndex) -> u8 {
        index.0
    }
}

impl std::fmt::Display for ChannelIndex {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Edge on which the watchdog fail-safe duty is loaded.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize, Display, EnumString)]
#[serde(rename_all = "kebab-case")]
#[strum(serialize_all = "kebab-case")]
pub enum FailsafeEdge {
    Rising,
    #[default]
    Falling,
}

/// Optional duty value loaded by hardware when the watchdog fires.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct WatchdogFailsafe {
    pub enabled: bool,
    pub edge_selection: FailsafeEdge,
    pub failsafe_point: u8,
}

impl Default for WatchdogFailsafe {
    fn default() -> Self {
        Self {
            enabled: false,
            edge_selection: FailsafeEdge::Falling,
            failsafe_point: DEFAULT_FAILSAFE_POINT,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct PwmChannelConfig {
    pub target_frequency_hz: u32,
    /// 0 is off, 255 is fully on.
    pub duty_falling_point: u8,
    pub watchdog_failsafe: WatchdogFailsafe,
    pub duty_sync_disabled: bool,
    pub output_inverted: bool,
}

impl Default for PwmChannelConfig {
    fn default() -> Self {
        Self {
            target_frequency_hz: DEFAULT_TARGET_FREQUENCY_HZ,
            duty_falling_point: DEFAULT_FALLING_POINT,
            watchdog_failsafe: WatchdogFailsafe::default(),
            duty_sync_disabled: false,
            output_inverted: false,
        }
    }
}

/// Which edges delimit one tachometer measurement.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize, Display, EnumString)]
#[serde(rename_all = "kebab-case")]
#[strum(serialize_all = "kebab-case")]
pub enum TachEdge {
    #[default]
    FallingToFalling,
    RisingToRising,
    Both,
}

impl TachEdge {
    pub fn code(self) -> u8 {
        match self {
            TachEdge::FallingToFalling => 0b00,
            TachEdge::RisingToRising => 0b01,
            TachEdge::Both => 0b10,
        }
    }
}

/// Input debounce, as the 2-bit level the hardware takes.
///
/// Level 0 filters glitches shorter than three clocks, level 3 disables
/// filtering.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize, Display, EnumString)]
#[serde(rename_all = "kebab-case")]
#[strum(serialize_all = "kebab-case")]
pub enum Debounce {
    #[default]
    ThreeClocks,
    TwoClocks,
    OneClock,
    Off,
}

impl Debounce {
    pub fn from_level(level: u8) -> Result<Self> {
        match level {
            0 => Ok(Debounce::ThreeClocks),
            1 => Ok(Debounce::TwoClocks),
            2 => Ok(Debounce::OneClock),
            3 => Ok(Debounce::Off),
            _ => Err(Error::InvalidTachParams(format!(
                "debounce level {level} out of range (0..=3)"
            ))),
        }
    }

    pub fn level(self) -> u8 {
        match self {
            Debounce::ThreeClocks => 0,
            Debounce::TwoClocks => 1,
            Debounce::OneClock => 2,
            Debounce::Off => 3,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct TachChannelConfig {
    pub edge_mode: TachEdge,
    pub debounce: Debounce,
    pub pulses_per_revolution: u8,
    /// Effective divider is `2^(2 * exponent)`.
    pub divider_exponent: u8,
    pub inverse_limit_comparison: bool,
    /// Count threshold for the interrupt; 0 leaves the interrupt off.
    pub threshold: u32,
}

impl Default for TachChannelConfig {
    fn default() -> Self {
        Self {
            edge_mode: TachEdge::FallingToFalling,
            debounce: Debounce::ThreeClocks,
            pulses_per_revolution: DEFAULT_PULSES_PER_REVOLUTION,
            divider_exponent: DEFAULT_TACH_DIVIDER_EXPONENT,
            inverse_limit_comparison: false,
            threshold: 0,
        }
    }
}

impl TachChannelConfig {
    pub fn validate(&self) -> Result<()> {
        if self.pulses_per_revolution == 0 {
            return Err(Error::InvalidTachParams(
                "pulses per revolution must be at least 1".into(),
            ));
        }
        if self.divider_exponent > MAX_TACH_DIVIDER_EXPONENT {
            return Err(Error::InvalidTachParams(format!(
                "divider exponent {} out of range (0..={MAX_TACH_DIVIDER_EXPONENT})",
                self.divider_exponent
            )));
        }
        if self.threshold > MAX_TACH_THRESHOLD {
            return Err(Error::InvalidTachParams(format!(
                "threshold {:#x} wider than 20 bits",
                self.threshold
            )));
        }
        Ok(())
    }
}

/// Everything the store keeps for one PWM channel.
#[derive(Debug, Default)]
pub struct PwmSlot {
    pub present: bool,
    pub config: PwmChannelConfig,
    /// Divider resolved at the last enable.
    pub divider: Option<DividerSetting>,
    /// Duty and control words for the current divider have been written.
    /// Until then only a full program may turn the output on.
    pub programmed: bool,
    /// Set while a cooling device owns this channel's duty.
    pub cooling: Option<CoolingLevels>,
}

/// Everything the store keeps for one tachometer channel.
#[derive(Debug, Default)]
pub struct TachSlot {
    pub present: bool,
    pub config: TachChannelConfig,
    /// `2^(2 * divider_exponent)`, cached at enable time.
    pub divider: u32,
}

/// Owns every channel record, each behind its own lock.
///
/// A caller holds the channel's guard for the whole compute-then-write
/// sequence so concurrent duty, cooling, and setup calls on the same
/// channel serialize.
#[derive(Debug)]
pub struct ChannelStore {
    pwm: [Mutex<PwmSlot>; NUM_CHANNELS],
    tach: [Mutex<TachSlot>; NUM_CHANNELS],
}

impl Default for ChannelStore {
    fn default() -> Self {
        Self {
            pwm: std::array::from_fn(|_| Mutex::new(PwmSlot::default())),
            tach: std::array::from_fn(|_| Mutex::new(TachSlot::default())),
        }
    }
}

impl ChannelStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn pwm(&self, channel: ChannelIndex) -> MutexGuard<'_, PwmSlot> {
        self.pwm[channel.slot()].lock()
    }

    pub fn tach(&self, channel: ChannelIndex) -> MutexGuard<'_, TachSlot> {
        self.tach[channel.slot()].lock()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use test_case::test_case;

    #[test]
    fn channel_index_bounds() {
        assert_eq!(ChannelIndex::new(15).unwrap().get(), 15);
        assert!(matches!(
            ChannelIndex::new(16),
            Err(Error::ChannelOutOfRange(16))
        ));
        assert!(matches!(
            ChannelIndex::try_from(1_000u32),
            Err(Error::ChannelOutOfRange(1_000))
        ));
        assert_eq!(ChannelIndex::all().count(), NUM_CHANNELS);
    }

    #[test]
    fn channel_index_deserializes_with_bounds_check() {
        let index: ChannelIndex = serde_json::from_str("7").unwrap();
        assert_eq!(index.get(), 7);
        assert!(serde_json::from_str::<ChannelIndex>("16").is_err());
    }

    #[test]
    fn every_slot_starts_from_the_same_defaults() {
        let store = ChannelStore::new();
        for channel in ChannelIndex::all() {
            let pwm = store.pwm(channel);
            assert!(!pwm.present);
            assert_eq!(pwm.config, PwmChannelConfig::default());
            assert!(pwm.divider.is_none());
            assert!(!pwm.programmed);

            let tach = store.tach(channel);
            assert_eq!(tach.config, TachChannelConfig::default());
        }
    }

    #[test]
    fn pwm_defaults() {
        let config = PwmChannelConfig::default();
        assert_eq!(config.target_frequency_hz, 25_000);
        assert_eq!(config.duty_falling_point, 0x0a);
        assert!(!config.watchdog_failsafe.enabled);
        assert_eq!(config.watchdog_failsafe.failsafe_point, 0x10);
        assert_eq!(config.watchdog_failsafe.edge_selection, FailsafeEdge::Falling);
    }

    #[test_case(0, Debounce::ThreeClocks)]
    #[test_case(1, Debounce::TwoClocks)]
    #[test_case(2, Debounce::OneClock)]
    #[test_case(3, Debounce::Off)]
    fn debounce_levels(level: u8, expected: Debounce) {
        let debounce = Debounce::from_level(level).unwrap();
        assert_eq!(debounce, expected);
        assert_eq!(debounce.level(), level);
    }

    #[test]
    fn debounce_level_out_of_range() {
        assert!(Debounce::from_level(4).is_err());
    }

    #[test_case(TachChannelConfig { pulses_per_revolution: 0, ..Default::default() }; "zero pulses")]
    #[test_case(TachChannelConfig { divider_exponent: 16, ..Default::default() }; "exponent too large")]
    #[test_case(TachChannelConfig { threshold: 0x10_0000, ..Default::default() }; "threshold too wide")]
    fn invalid_tach_params(config: TachChannelConfig) {
        assert!(matches!(config.validate(), Err(Error::InvalidTachParams(_))));
    }

    #[test]
    fn edge_modes_parse_from_kebab_case() {
        assert_eq!("both".parse::<TachEdge>().unwrap(), TachEdge::Both);
        assert_eq!(
            "rising-to-rising".parse::<TachEdge>().unwrap(),
            TachEdge::RisingToRising
        );
        assert_eq!(TachEdge::FallingToFalling.to_string(), "falling-to-falling");
    }
}
