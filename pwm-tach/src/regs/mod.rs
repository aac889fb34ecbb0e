//! Register access port and register map.
//!
//! Every channel owns four consecutive 32-bit registers in a 0x10-byte
//! window:
//!
//! ```text
//!   base = channel * 0x10
//!   +0x00  PWM control      divider fields, clock/pin enable, fail-safe mode
//!   +0x04  PWM duty         period, rising/falling points, fail-safe point
//!   +0x08  tach control     threshold, divider, edge, debounce, enable
//!   +0x0C  tach status      20-bit count and measurement flags
//! ```

mod memory;
pub mod words;

use bitflags::bitflags;
use thiserror::Error;

use crate::channel::ChannelIndex;

pub use memory::{Access, MemoryRegisters};

/// Byte distance between two channels' register windows.
pub const CHANNEL_STRIDE: u32 = 0x10;

/// Highest offset the block decodes.
pub const MAX_REGISTER: u32 = 0xfc;

/// Errors reported by a [`RegisterAccess`] implementation.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum RegisterError {
    #[error("offset {0:#05x} is outside the register window")]
    Unmapped(u32),

    #[error("offset {0:#05x} is not 32-bit aligned")]
    Misaligned(u32),

    #[error("bus error at {offset:#05x}: {reason}")]
    Bus { offset: u32, reason: String },
}

/// 32-bit register port keyed by byte offset.
///
/// Each call is expected to complete synchronously and atomically. No
/// ordering is promised across calls beyond program order, so callers
/// that need a particular order issue the calls in that order.
pub trait RegisterAccess: Send + Sync {
    fn read(&self, offset: u32) -> Result<u32, RegisterError>;

    fn write(&self, offset: u32, value: u32) -> Result<(), RegisterError>;

    /// Read-modify-write of the bits selected by `mask`.
    ///
    /// Always issues the write, even when the value is unchanged, so a
    /// repeated call produces the same access sequence.
    fn update_bits(&self, offset: u32, mask: u32, value: u32) -> Result<(), RegisterError> {
        let current = self.read(offset)?;
        self.write(offset, (current & !mask) | (value & mask))
    }
}

/// Per-channel registers.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Register {
    PwmControl = 0x00,
    PwmDuty = 0x04,
    TachControl = 0x08,
    TachStatus = 0x0C,
}

impl Register {
    /// Absolute offset of this register for `channel`.
    pub fn offset(self, channel: ChannelIndex) -> u32 {
        u32::from(channel.get()) * CHANNEL_STRIDE + self as u32
    }
}

bitflags! {
    /// Single-bit PWM control fields touched by read-modify-write.
    #[derive(Debug, Clone, Copy, PartialEq, Eq)]
    pub struct PwmControlFlags: u32 {
        const PIN_ENABLE = 1 << 12;
        const CLOCK_ENABLE = 1 << 16;

        /// Both bits that gate the channel's output.
        const OUTPUT = Self::PIN_ENABLE.bits() | Self::CLOCK_ENABLE.bits();
    }
}

bitflags! {
    /// Single-bit tachometer control fields touched by read-modify-write.
    #[derive(Debug, Clone, Copy, PartialEq, Eq)]
    pub struct TachControlFlags: u32 {
        const ENABLE = 1 << 28;
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use test_case::test_case;

    fn ch(index: u8) -> ChannelIndex {
        ChannelIndex::new(index).unwrap()
    }

    #[test_case(0, Register::PwmControl, 0x00; "first channel control")]
    #[test_case(0, Register::TachStatus, 0x0c; "first channel status")]
    #[test_case(3, Register::PwmDuty, 0x34; "channel three duty")]
    #[test_case(15, Register::TachStatus, 0xfc; "last channel status")]
    fn channel_offsets(index: u8, register: Register, expected: u32) {
        assert_eq!(register.offset(ch(index)), expected);
    }

    #[test]
    fn every_offset_is_inside_the_window() {
        for channel in ChannelIndex::all() {
            assert!(Register::TachStatus.offset(channel) <= MAX_REGISTER);
        }
    }

    #[test]
    fn update_bits_preserves_unmasked_bits() {
        let regs = MemoryRegisters::new();
        regs.preload(0x10, 0xffff_0000);

        regs.update_bits(0x10, 0x00ff_00ff, 0x0012_0034).unwrap();

        assert_eq!(regs.value(0x10), 0xff12_0034);
    }

    #[test]
    fn update_bits_writes_even_when_unchanged() {
        let regs = MemoryRegisters::new();
        regs.update_bits(0x00, PwmControlFlags::OUTPUT.bits(), 0)
            .unwrap();

        assert_eq!(
            regs.accesses(),
            vec![
                Access::Read { offset: 0x00, value: 0 },
                Access::Write { offset: 0x00, value: 0 },
            ]
        );
    }
}
