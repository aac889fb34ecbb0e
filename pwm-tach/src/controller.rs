//! The PWM and tachometer controller.
//!
//! Owns the register port, the input clock rate, and one locked record
//! per channel. Every operation that computes register words and writes
//! them holds that channel's lock from the first read of the record to
//! the last update of it, so duty writes, cooling transitions, and setup
//! on one channel never interleave. A failed register access aborts the
//! sequence and leaves the cached record as it was.

use crate::channel::{ChannelIndex, ChannelStore, PwmChannelConfig, TachChannelConfig};
use crate::cooling::CoolingLevels;
use crate::divider::{self, DividerSetting};
use crate::duty;
use crate::error::{Error, Result};
use crate::regs::RegisterAccess;
use crate::tach::{self, RpmReading};
use crate::tracing::prelude::*;

pub struct PwmTachController<R: RegisterAccess> {
    regs: R,
    input_clock_hz: u32,
    channels: ChannelStore,
}

impl<R: RegisterAccess> PwmTachController<R> {
    /// Controller with every channel absent and holding default settings.
    pub fn new(regs: R, input_clock_hz: u32) -> Self {
        Self {
            regs,
            input_clock_hz,
            channels: ChannelStore::new(),
        }
    }

    pub fn registers(&self) -> &R {
        &self.regs
    }

    pub fn input_clock_hz(&self) -> u32 {
        self.input_clock_hz
    }

    /// Replace a PWM channel's settings ahead of [`enable_pwm_channel`].
    ///
    /// Only an absent channel accepts new settings; once enabled, the
    /// duty changes through [`set_duty`] and the rest stays fixed.
    ///
    /// [`enable_pwm_channel`]: Self::enable_pwm_channel
    /// [`set_duty`]: Self::set_duty
    pub fn configure_pwm_channel(&self, channel: ChannelIndex, config: PwmChannelConfig) -> Result<()> {
        let mut slot = self.channels.pwm(channel);
        if slot.present {
            return Err(Error::PwmChannelEnabled(channel.get()));
        }
        slot.config = config;
        Ok(())
    }

    /// Resolve the divider for `target_hz` and program the channel with
    /// its configured duty.
    ///
    /// When the target cannot be undercut the channel still runs on the
    /// fallback divider; the returned setting says so.
    pub fn enable_pwm_channel(&self, channel: ChannelIndex, target_hz: u32) -> Result<DividerSetting> {
        let mut slot = self.channels.pwm(channel);

        let setting = divider::resolve(self.input_clock_hz, target_hz);
        debug!(
            channel = %channel,
            target_hz,
            coarse = setting.coarse,
            fine = setting.fine,
            achieved_hz = setting.achieved_hz,
            "Resolved PWM divider"
        );
        if !setting.meets_target {
            warn!(
                channel = %channel,
                target_hz,
                achieved_hz = setting.achieved_hz,
                input_clock_hz = self.input_clock_hz,
                "No divider undercuts the target frequency, using the largest divisor"
            );
        }

        let mut config = slot.config;
        config.target_frequency_hz = target_hz;
        duty::program(&self.regs, channel, &config, &setting, config.duty_falling_point)?;

        slot.config = config;
        slot.divider = Some(setting);
        slot.programmed = config.duty_falling_point != duty::DUTY_OFF;
        slot.present = true;

        info!(
            channel = %channel,
            achieved_hz = setting.achieved_hz,
            duty = config.duty_falling_point,
            "PWM channel enabled"
        );
        Ok(setting)
    }

    /// Program `value` as the channel's duty, from scratch.
    ///
    /// 0 gates the output; any other value re-enables it. Repeating a
    /// call repeats the same register accesses.
    pub fn set_duty(&self, channel: ChannelIndex, value: u32) -> Result<()> {
        let duty = duty_from(value)?;
        let mut slot = self.channels.pwm(channel);
        let setting = owned_divider(channel, slot.present, slot.divider, slot.cooling.is_some())?;

        duty::program(&self.regs, channel, &slot.config, &setting, duty)?;
        slot.config.duty_falling_point = duty;
        slot.programmed |= duty != duty::DUTY_OFF;

        debug!(channel = %channel, duty, "Duty set");
        Ok(())
    }

    /// Change the duty with the fewest register accesses.
    ///
    /// Writes only the falling point of an already programmed channel and
    /// does nothing when the value is unchanged. A channel that has only
    /// ever been gated off gets the full sequence instead.
    pub fn adjust_duty(&self, channel: ChannelIndex, value: u32) -> Result<()> {
        let duty = duty_from(value)?;
        let mut slot = self.channels.pwm(channel);
        let setting = owned_divider(channel, slot.present, slot.divider, slot.cooling.is_some())?;

        let previous = slot.config.duty_falling_point;
        if previous == duty {
            return Ok(());
        }

        if slot.programmed {
            duty::update_falling_point(&self.regs, channel, previous, duty)?;
        } else {
            duty::program(&self.regs, channel, &slot.config, &setting, duty)?;
            slot.programmed = duty != duty::DUTY_OFF;
        }
        slot.config.duty_falling_point = duty;

        trace!(channel = %channel, previous, duty, "Duty adjusted");
        Ok(())
    }

    pub fn get_duty(&self, channel: ChannelIndex) -> Result<u8> {
        let slot = self.channels.pwm(channel);
        if !slot.present {
            return Err(Error::PwmChannelAbsent(channel.get()));
        }
        Ok(slot.config.duty_falling_point)
    }

    /// Output frequency the channel actually runs at.
    pub fn achieved_frequency(&self, channel: ChannelIndex) -> Result<u32> {
        self.divider_setting(channel).map(|setting| setting.achieved_hz)
    }

    pub fn divider_setting(&self, channel: ChannelIndex) -> Result<DividerSetting> {
        let slot = self.channels.pwm(channel);
        match (slot.present, slot.divider) {
            (true, Some(setting)) => Ok(setting),
            _ => Err(Error::PwmChannelAbsent(channel.get())),
        }
    }

    pub fn pwm_config(&self, channel: ChannelIndex) -> PwmChannelConfig {
        self.channels.pwm(channel).config
    }

    /// Validate `config` and start measuring on a tach channel.
    ///
    /// Invalid parameters are rejected before any register is touched.
    pub fn enable_tach_channel(&self, channel: ChannelIndex, config: TachChannelConfig) -> Result<()> {
        config.validate()?;

        let mut slot = self.channels.tach(channel);
        tach::enable(&self.regs, channel, &config)?;

        slot.config = config;
        slot.divider = tach::divider_for_exponent(config.divider_exponent);
        slot.present = true;

        info!(
            channel = %channel,
            edge = %config.edge_mode,
            debounce = %config.debounce,
            divider = slot.divider,
            pulses_per_revolution = config.pulses_per_revolution,
            "Tach channel enabled"
        );
        Ok(())
    }

    pub fn disable_tach_channel(&self, channel: ChannelIndex) -> Result<()> {
        let mut slot = self.channels.tach(channel);
        if !slot.present {
            return Err(Error::TachChannelAbsent(channel.get()));
        }

        tach::disable(&self.regs, channel)?;
        slot.present = false;

        info!(channel = %channel, "Tach channel disabled");
        Ok(())
    }

    pub fn tach_config(&self, channel: ChannelIndex) -> TachChannelConfig {
        self.channels.tach(channel).config
    }

    /// Poll and convert one tach channel, reporting whether the count
    /// came from a completed measurement.
    pub fn read_rpm(&self, channel: ChannelIndex) -> Result<RpmReading> {
        let slot = self.channels.tach(channel);
        if !slot.present {
            return Err(Error::TachChannelAbsent(channel.get()));
        }

        let reading = tach::read_rpm(
            &self.regs,
            channel,
            self.input_clock_hz,
            slot.divider,
            slot.config.pulses_per_revolution,
        )?;
        Ok(reading)
    }

    pub fn get_rpm(&self, channel: ChannelIndex) -> Result<u32> {
        self.read_rpm(channel).map(|reading| reading.rpm)
    }

    /// Hand the channel's duty over to a cooling level table.
    pub(crate) fn attach_cooling(&self, channel: ChannelIndex, levels: CoolingLevels) -> Result<()> {
        let mut slot = self.channels.pwm(channel);
        if !slot.present {
            return Err(Error::PwmChannelAbsent(channel.get()));
        }
        if slot.cooling.is_some() {
            return Err(Error::CoolingOwned(channel.get()));
        }

        info!(
            channel = %channel,
            levels = ?levels.levels(),
            max_state = levels.max_state(),
            "Cooling device attached"
        );
        slot.cooling = Some(levels);
        Ok(())
    }

    /// Return the channel's duty to direct control. The duty last
    /// programmed stays in effect.
    pub(crate) fn detach_cooling(&self, channel: ChannelIndex) {
        let mut slot = self.channels.pwm(channel);
        if slot.cooling.take().is_some() {
            info!(channel = %channel, "Cooling device detached");
        }
    }

    pub(crate) fn cooling_max_state(&self, channel: ChannelIndex) -> usize {
        self.channels
            .pwm(channel)
            .cooling
            .as_ref()
            .map_or(0, CoolingLevels::max_state)
    }

    pub(crate) fn cooling_cur_state(&self, channel: ChannelIndex) -> usize {
        self.channels
            .pwm(channel)
            .cooling
            .as_ref()
            .map_or(0, CoolingLevels::current_state)
    }

    /// Program the duty level of `state` and record the transition.
    pub(crate) fn set_cooling_state(&self, channel: ChannelIndex, state: usize) -> Result<()> {
        let mut slot = self.channels.pwm(channel);
        let (previous, level) = match slot.cooling.as_ref() {
            Some(levels) => (levels.current_state(), levels.level(state)?),
            None => return Err(Error::PwmChannelAbsent(channel.get())),
        };
        let setting = slot
            .divider
            .ok_or(Error::PwmChannelAbsent(channel.get()))?;

        duty::program(&self.regs, channel, &slot.config, &setting, level)?;
        slot.config.duty_falling_point = level;
        slot.programmed |= level != duty::DUTY_OFF;
        if let Some(levels) = slot.cooling.as_mut() {
            levels.commit(state);
        }

        if previous != state {
            debug!(channel = %channel, previous, state, duty = level, "Cooling state changed");
        }
        Ok(())
    }
}

fn duty_from(value: u32) -> Result<u8> {
    u8::try_from(value).map_err(|_| Error::DutyOutOfRange(value))
}

/// Divider of a channel that accepts direct duty writes.
fn owned_divider(
    channel: ChannelIndex,
    present: bool,
    divider: Option<DividerSetting>,
    cooling_owned: bool,
) -> Result<DividerSetting> {
    let setting = match (present, divider) {
        (true, Some(setting)) => setting,
        _ => return Err(Error::PwmChannelAbsent(channel.get())),
    };
    if cooling_owned {
        return Err(Error::CoolingOwned(channel.get()));
    }
    Ok(setting)
}
