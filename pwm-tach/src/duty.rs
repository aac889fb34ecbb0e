//! Duty cycle programming.
//!
//! Word synthesis ([`duty_word`], [`control_word`]) is pure. The
//! register sequences ([`program`], [`update_falling_point`]) issue
//! accesses in a fixed order and stop at the first failed access.

use crate::channel::{ChannelIndex, FailsafeEdge, PwmChannelConfig};
use crate::divider::{DividerSetting, PERIOD_TICKS};
use crate::regs::words::{PwmControl, PwmDuty};
use crate::regs::{PwmControlFlags, Register, RegisterAccess, RegisterError};
use crate::tracing::prelude::*;

/// Duty value meaning "output permanently high".
pub const DUTY_FULL: u8 = PERIOD_TICKS as u8;

/// Duty value meaning "channel off".
pub const DUTY_OFF: u8 = 0;

/// Duty register contents for `duty`.
///
/// Full duty clears both points instead of encoding a falling point
/// equal to the period.
pub fn duty_word(config: &PwmChannelConfig, duty: u8) -> PwmDuty {
    let mut word = PwmDuty::new().with_period(DUTY_FULL);
    if duty != DUTY_FULL {
        word.set_rising_point(0);
        word.set_falling_point(duty);
    }

    let failsafe = &config.watchdog_failsafe;
    if failsafe.enabled {
        word.set_failsafe_point(failsafe.failsafe_point);
    }

    word
}

/// Control register contents, without the output enable bits.
pub fn control_word(config: &PwmChannelConfig, divider: &DividerSetting) -> PwmControl {
    let mut word = PwmControl::new()
        .with_div_fine(divider.fine)
        .with_div_coarse(divider.coarse)
        .with_duty_sync_disable(config.duty_sync_disabled)
        .with_inverse(config.output_inverted);

    let failsafe = &config.watchdog_failsafe;
    if failsafe.enabled {
        word.set_failsafe_load_enable(true);
        word.set_failsafe_edge_falling(failsafe.edge_selection == FailsafeEdge::Falling);
    }

    word
}

/// Gate or ungate the channel's clock and pin.
pub fn set_output_enabled<R: RegisterAccess + ?Sized>(
    regs: &R,
    channel: ChannelIndex,
    enable: bool,
) -> Result<(), RegisterError> {
    let mask = PwmControlFlags::OUTPUT.bits();
    regs.update_bits(
        Register::PwmControl.offset(channel),
        mask,
        if enable { mask } else { 0 },
    )
}

/// Program a channel for `duty` from scratch.
///
/// Duty 0 only gates the output. Any other duty writes the duty word,
/// then the control word, then sets the enable bits; the duty target is
/// staged before the control word so the output never runs with a stale
/// duty.
pub fn program<R: RegisterAccess + ?Sized>(
    regs: &R,
    channel: ChannelIndex,
    config: &PwmChannelConfig,
    divider: &DividerSetting,
    duty: u8,
) -> Result<(), RegisterError> {
    if duty == DUTY_OFF {
        debug!(channel = %channel, "PWM output disabled");
        return set_output_enabled(regs, channel, false);
    }

    let duty_value = duty_word(config, duty).to_raw();
    let ctrl_value = control_word(config, divider).to_raw();

    debug!(
        channel = %channel,
        duty,
        duty_word = %format!("{duty_value:#010x}"),
        control_word = %format!("{ctrl_value:#010x}"),
        "Programming PWM channel"
    );

    regs.write(Register::PwmDuty.offset(channel), duty_value)?;
    regs.write(Register::PwmControl.offset(channel), ctrl_value)?;
    set_output_enabled(regs, channel, true)
}

/// Change only the falling point of a channel that is already programmed.
///
/// Issues a single masked write of the point fields (or the disable
/// read-modify-write for duty 0), and re-enables the output only when
/// the previous duty was 0.
pub fn update_falling_point<R: RegisterAccess + ?Sized>(
    regs: &R,
    channel: ChannelIndex,
    previous: u8,
    duty: u8,
) -> Result<(), RegisterError> {
    let offset = Register::PwmDuty.offset(channel);
    match duty {
        DUTY_OFF => set_output_enabled(regs, channel, false)?,
        DUTY_FULL => regs.update_bits(offset, PwmDuty::points_mask(), 0)?,
        _ => regs.update_bits(
            offset,
            PwmDuty::falling_mask(),
            PwmDuty::new().with_falling_point(duty).to_raw(),
        )?,
    }

    if previous == DUTY_OFF && duty != DUTY_OFF {
        set_output_enabled(regs, channel, true)?;
    }

    Ok(())
}
