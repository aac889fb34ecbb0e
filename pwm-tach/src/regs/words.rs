//! Bit-packed register words.
//!
//! Fields are listed least-significant first. Each word converts to and
//! from the raw `u32` seen on the bus with [`from_raw`](PwmControl::from_raw)
//! and [`to_raw`](PwmControl::to_raw).

use modular_bitfield::prelude::*;

macro_rules! raw_word {
    ($name:ident) => {
        impl $name {
            pub fn from_raw(raw: u32) -> Self {
                Self::from_bytes(raw.to_le_bytes())
            }

            pub fn to_raw(self) -> u32 {
                u32::from_le_bytes(self.into_bytes())
            }
        }
    };
}

/// PWM control register.
#[bitfield]
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct PwmControl {
    /// Linear divider, effective divisor `fine + 1`.
    pub div_fine: B8,
    /// Exponential divider, effective divisor `2^coarse`.
    pub div_coarse: B4,
    pub pin_enable: bool,
    pub open_drain: bool,
    pub inverse: bool,
    pub level_output: bool,
    pub clock_enable: bool,
    pub duty_sync_disable: bool,
    /// Load the fail-safe point on watchdog timeout.
    pub failsafe_load_enable: bool,
    /// Edge on which the fail-safe point is loaded; set selects falling.
    pub failsafe_edge_falling: bool,
    #[skip]
    __: B12,
}

raw_word!(PwmControl);

/// PWM duty register.
#[bitfield]
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct PwmDuty {
    pub falling_point: B8,
    pub rising_point: B8,
    pub failsafe_point: B8,
    pub period: B8,
}

raw_word!(PwmDuty);

impl PwmDuty {
    /// Mask covering only the falling point.
    pub fn falling_mask() -> u32 {
        Self::new().with_falling_point(u8::MAX).to_raw()
    }

    /// Mask covering the rising and falling points.
    pub fn points_mask() -> u32 {
        Self::new()
            .with_falling_point(u8::MAX)
            .with_rising_point(u8::MAX)
            .to_raw()
    }
}

/// Tachometer control register.
#[bitfield]
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct TachControl {
    pub threshold: B20,
    pub clock_divider: B4,
    pub edge: B2,
    pub debounce: B2,
    pub enable: bool,
    pub loopback: bool,
    pub inverse_limit: bool,
    pub interrupt_enable: bool,
}

raw_word!(TachControl);

/// Tachometer status register.
#[bitfield]
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct TachStatus {
    /// Captured count minus one.
    pub value: B20,
    pub full_measurement: bool,
    pub value_updated: bool,
    pub raw_input: bool,
    pub debounced_input: bool,
    pub pwm_oen: bool,
    pub pwm_out: bool,
    #[skip]
    __: B5,
    pub interrupt: bool,
}

raw_word!(TachStatus);
