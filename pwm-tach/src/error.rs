//! Crate-wide error type.

use thiserror::Error;

use crate::regs::RegisterError;

pub type Result<T> = std::result::Result<T, Error>;

#[derive(Error, Debug)]
pub enum Error {
    #[error("channel index {0} out of range (0..16)")]
    ChannelOutOfRange(u32),

    #[error("PWM channel {0} is not enabled")]
    PwmChannelAbsent(u8),

    #[error("tachometer channel {0} is not enabled")]
    TachChannelAbsent(u8),

    #[error("duty value {0} out of range (0..=255)")]
    DutyOutOfRange(u32),

    #[error("cooling state {requested} exceeds max state {max}")]
    CoolingStateOutOfRange { requested: usize, max: usize },

    #[error("PWM channel {0} is already enabled, settings are fixed")]
    PwmChannelEnabled(u8),

    #[error("PWM channel {0} is owned by a cooling device")]
    CoolingOwned(u8),

    #[error("invalid tachometer parameter: {0}")]
    InvalidTachParams(String),

    #[error("invalid configuration: {0}")]
    InvalidConfig(String),

    #[error("configuration parse error: {0}")]
    ConfigParse(#[from] serde_json::Error),

    #[error("register access failed: {0}")]
    Register(#[from] RegisterError),
}
