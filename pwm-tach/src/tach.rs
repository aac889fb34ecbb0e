//! Tachometer channel setup and RPM conversion.

use crate::channel::{ChannelIndex, TachChannelConfig};
use crate::regs::words::{TachControl, TachStatus};
use crate::regs::{Register, RegisterAccess, RegisterError, TachControlFlags};
use crate::tracing::prelude::*;

/// Status reads before settling for an incomplete measurement.
pub const POLL_ATTEMPTS: usize = 3;

/// Count reported when the counter saturates, i.e. the fan turns slower
/// than the configured divider can resolve.
pub const COUNTER_SATURATED: u32 = 0xf_ffff;

const SECONDS_PER_MINUTE: u64 = 60;

/// One RPM measurement.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RpmReading {
    pub rpm: u32,
    /// Count field as read, before the +1 correction.
    pub raw: u32,
    /// The full-measurement flag was never seen within [`POLL_ATTEMPTS`].
    pub stale: bool,
}

/// Effective sampling divider for an exponent: `2^(2 * exponent)`.
pub fn divider_for_exponent(exponent: u8) -> u32 {
    1 << (u32::from(exponent) << 1)
}

/// Tach control register contents for an enabled channel.
///
/// A non-zero threshold also turns the limit interrupt on.
pub(crate) fn control_word(config: &TachChannelConfig) -> TachControl {
    let mut word = TachControl::new()
        .with_enable(true)
        .with_edge(config.edge_mode.code())
        .with_clock_divider(config.divider_exponent)
        .with_debounce(config.debounce.level())
        .with_inverse_limit(config.inverse_limit_comparison);

    if config.threshold != 0 {
        word.set_interrupt_enable(true);
        word.set_threshold(config.threshold);
    }

    word
}

/// Write the control word for an enabled channel. `config` must already
/// be validated.
pub(crate) fn enable<R: RegisterAccess + ?Sized>(
    regs: &R,
    channel: ChannelIndex,
    config: &TachChannelConfig,
) -> Result<(), RegisterError> {
    let word = control_word(config).to_raw();
    debug!(
        channel = %channel,
        control_word = %format!("{word:#010x}"),
        "Enabling tach channel"
    );
    regs.write(Register::TachControl.offset(channel), word)
}

pub fn disable<R: RegisterAccess + ?Sized>(
    regs: &R,
    channel: ChannelIndex,
) -> Result<(), RegisterError> {
    regs.update_bits(
        Register::TachControl.offset(channel),
        TachControlFlags::ENABLE.bits(),
        0,
    )
}

/// Convert a raw count to RPM.
///
/// The hardware reports the count minus one; the saturated count means
/// no usable signal and reads as 0 RPM. The clock is divided by the
/// effective divisor before scaling to minutes, truncating at each step.
pub fn rpm_from_raw(input_clock_hz: u32, raw: u32, divider: u32, pulses_per_revolution: u8) -> u32 {
    if raw == COUNTER_SATURATED {
        return 0;
    }

    let count = u64::from(raw) + 1;
    let effective_divisor = count * u64::from(divider) * u64::from(pulses_per_revolution);
    if effective_divisor == 0 {
        return 0;
    }

    let rpm = (u64::from(input_clock_hz) / effective_divisor) * SECONDS_PER_MINUTE;
    u32::try_from(rpm).unwrap_or(u32::MAX)
}

/// Read the status register until a full measurement shows up.
///
/// Gives up after [`POLL_ATTEMPTS`] reads and returns the last value
/// with the stale flag set.
pub fn poll_status<R: RegisterAccess + ?Sized>(
    regs: &R,
    channel: ChannelIndex,
) -> Result<(TachStatus, bool), RegisterError> {
    let offset = Register::TachStatus.offset(channel);
    let mut status = TachStatus::new();
    for _ in 0..POLL_ATTEMPTS {
        status = TachStatus::from_raw(regs.read(offset)?);
        if status.full_measurement() {
            return Ok((status, false));
        }
    }
    Ok((status, true))
}

/// Poll and convert one channel.
pub fn read_rpm<R: RegisterAccess + ?Sized>(
    regs: &R,
    channel: ChannelIndex,
    input_clock_hz: u32,
    divider: u32,
    pulses_per_revolution: u8,
) -> Result<RpmReading, RegisterError> {
    let (status, stale) = poll_status(regs, channel)?;
    let raw = status.value();
    let rpm = rpm_from_raw(input_clock_hz, raw, divider, pulses_per_revolution);

    if stale {
        debug!(channel = %channel, raw, "Tach measurement incomplete, using last count");
    }
    trace!(channel = %channel, raw, divider, rpm, "Tach reading");

    Ok(RpmReading { rpm, raw, stale })
}
