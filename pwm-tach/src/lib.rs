//! Control-parameter synthesis for a 16-channel PWM generator and a
//! 16-channel fan tachometer block.
//!
//! The crate resolves PWM clock dividers, packs duty and control
//! register words (including the watchdog fail-safe duty load), converts
//! raw tachometer counts to RPM, and layers a discrete cooling device on
//! top of the PWM channels. Register I/O goes through the
//! [`RegisterAccess`](regs::RegisterAccess) trait so the same logic runs
//! against real hardware or the in-memory [`MemoryRegisters`](regs::MemoryRegisters).

pub mod channel;
pub mod config;
pub mod controller;
pub mod cooling;
pub mod divider;
pub mod duty;
pub mod error;
pub mod governor;
pub mod regs;
pub mod tach;
pub mod tracing;

pub use channel::{ChannelIndex, NUM_CHANNELS};
pub use controller::PwmTachController;
pub use cooling::{CoolingDevice, PwmCoolingDevice};
pub use error::{Error, Result};
