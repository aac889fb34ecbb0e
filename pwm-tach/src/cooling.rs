//! Cooling devices backed by PWM channels.
//!
//! A thermal governor sees a cooling device as an ordinal state in
//! `0..=max_state`. Each state maps to a duty level through a table
//! fixed at creation; setting a state programs that level immediately.
//!
//! ```text
//!   state:   0     1     2     3
//!   levels: [0,   64,  128,  255]
//!            |     |     |     |
//!            v     v     v     v
//!           off  ~25%  ~50%  full        (PWM duty on the owned channel)
//! ```
//!
//! Any state is reachable from any other in one call; there is no
//! ramping or hysteresis here. Smoothing belongs to the governor.

use std::sync::Arc;

use crate::channel::ChannelIndex;
use crate::controller::PwmTachController;
use crate::error::{Error, Result};
use crate::regs::RegisterAccess;

/// Longest cooling device name, matching the thermal framework's limit
/// minus the terminator.
pub const MAX_NAME_LEN: usize = 15;

/// Operations a thermal governor drives.
pub trait CoolingDevice: Send + Sync {
    fn max_state(&self) -> usize;

    fn cur_state(&self) -> usize;

    /// Move to `state` and apply its duty level.
    ///
    /// Fails without side effects when `state > max_state()`.
    fn set_cur_state(&self, state: usize) -> Result<()>;
}

/// Level table and current position.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CoolingLevels {
    levels: Vec<u8>,
    current_state: usize,
}

impl CoolingLevels {
    /// Table with the device starting in state 0.
    ///
    /// Creating the table does not program the channel.
    pub fn new(levels: Vec<u8>) -> Result<Self> {
        if levels.is_empty() {
            return Err(Error::InvalidConfig("cooling levels must not be empty".into()));
        }
        Ok(Self {
            levels,
            current_state: 0,
        })
    }

    pub fn max_state(&self) -> usize {
        self.levels.len() - 1
    }

    pub fn current_state(&self) -> usize {
        self.current_state
    }

    pub fn levels(&self) -> &[u8] {
        &self.levels
    }

    /// Duty level for `state`.
    pub fn level(&self, state: usize) -> Result<u8> {
        self.levels
            .get(state)
            .copied()
            .ok_or(Error::CoolingStateOutOfRange {
                requested: state,
                max: self.max_state(),
            })
    }

    /// Record that `state` has been applied. Callers check the range
    /// with [`level`](Self::level) first.
    pub(crate) fn commit(&mut self, state: usize) {
        debug_assert!(state <= self.max_state());
        self.current_state = state;
    }
}

/// Cooling device that owns one PWM channel of a controller.
pub struct PwmCoolingDevice<R: RegisterAccess> {
    controller: Arc<PwmTachController<R>>,
    channel: ChannelIndex,
    name: String,
}

impl<R: RegisterAccess> PwmCoolingDevice<R> {
    /// Attach a cooling device to an enabled PWM channel.
    ///
    /// Until the device is dropped the controller rejects direct duty
    /// writes to `channel`. The device is named `<prefix><channel>`, cut to
    /// [`MAX_NAME_LEN`] characters.
    pub fn register(
        controller: Arc<PwmTachController<R>>,
        channel: ChannelIndex,
        prefix: &str,
        levels: Vec<u8>,
    ) -> Result<Self> {
        let levels = CoolingLevels::new(levels)?;
        controller.attach_cooling(channel, levels)?;

        let name: String = format!("{prefix}{channel}").chars().take(MAX_NAME_LEN).collect();
        Ok(Self {
            controller,
            channel,
            name,
        })
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn channel(&self) -> ChannelIndex {
        self.channel
    }
}

impl<R: RegisterAccess> CoolingDevice for PwmCoolingDevice<R> {
    fn max_state(&self) -> usize {
        self.controller.cooling_max_state(self.channel)
    }

    fn cur_state(&self) -> usize {
        self.controller.cooling_cur_state(self.channel)
    }

    fn set_cur_state(&self, state: usize) -> Result<()> {
        self.controller.set_cooling_state(self.channel, state)
    }
}

impl<R: RegisterAccess> Drop for PwmCoolingDevice<R> {
    fn drop(&mut self) {
        self.controller.detach_cooling(self.channel);
    }
}

impl<R: RegisterAccess> std::fmt::Debug for PwmCoolingDevice<R> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("PwmCoolingDevice")
            .field("name", &self.name)
            .field("channel", &self.channel)
            .finish()
    }
}
