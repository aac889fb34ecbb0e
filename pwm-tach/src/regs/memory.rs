//! In-memory register file.
//!
//! Backs the register window with plain words and records every access
//! in order, so callers can inspect the exact write sequence a control
//! operation produced. Reads of a register can be scripted to return a
//! queue of values first (useful for status registers that change under
//! the driver), and writes to a register can be made to fail.

use std::collections::{BTreeMap, HashSet, VecDeque};

use parking_lot::Mutex;

use super::{MAX_REGISTER, RegisterAccess, RegisterError};
use crate::tracing::prelude::*;

/// One recorded register access.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Access {
    Read { offset: u32, value: u32 },
    Write { offset: u32, value: u32 },
}

#[derive(Debug, Default)]
struct Inner {
    values: BTreeMap<u32, u32>,
    scripted: BTreeMap<u32, VecDeque<u32>>,
    failing: HashSet<u32>,
    log: Vec<Access>,
}

/// Register file kept in memory.
#[derive(Debug, Default)]
pub struct MemoryRegisters {
    inner: Mutex<Inner>,
}

impl MemoryRegisters {
    pub fn new() -> Self {
        Self::default()
    }

    /// Set a register without recording an access.
    pub fn preload(&self, offset: u32, value: u32) {
        self.inner.lock().values.insert(offset, value);
    }

    /// Current value of a register, without recording an access.
    pub fn value(&self, offset: u32) -> u32 {
        self.inner.lock().values.get(&offset).copied().unwrap_or(0)
    }

    /// Queue values returned by the next reads of `offset`, before
    /// falling back to the stored value.
    pub fn script_reads(&self, offset: u32, values: impl IntoIterator<Item = u32>) {
        self.inner
            .lock()
            .scripted
            .entry(offset)
            .or_default()
            .extend(values);
    }

    /// Make every subsequent write to `offset` fail with a bus error.
    pub fn fail_writes_to(&self, offset: u32) {
        self.inner.lock().failing.insert(offset);
    }

    /// All accesses recorded so far, oldest first.
    pub fn accesses(&self) -> Vec<Access> {
        self.inner.lock().log.clone()
    }

    /// Recorded writes only, as `(offset, value)` pairs.
    pub fn writes(&self) -> Vec<(u32, u32)> {
        self.inner
            .lock()
            .log
            .iter()
            .filter_map(|access| match *access {
                Access::Write { offset, value } => Some((offset, value)),
                Access::Read { .. } => None,
            })
            .collect()
    }

    /// Forget recorded accesses, keeping register contents.
    pub fn clear_log(&self) {
        self.inner.lock().log.clear();
    }

    /// Non-zero registers in offset order.
    pub fn snapshot(&self) -> Vec<(u32, u32)> {
        self.inner
            .lock()
            .values
            .iter()
            .filter(|&(_, &value)| value != 0)
            .map(|(&offset, &value)| (offset, value))
            .collect()
    }

    fn check(offset: u32) -> Result<(), RegisterError> {
        if offset % 4 != 0 {
            return Err(RegisterError::Misaligned(offset));
        }
        if offset > MAX_REGISTER {
            return Err(RegisterError::Unmapped(offset));
        }
        Ok(())
    }
}

impl RegisterAccess for MemoryRegisters {
    fn read(&self, offset: u32) -> Result<u32, RegisterError> {
        Self::check(offset)?;

        let mut inner = self.inner.lock();
        let scripted = inner.scripted.get_mut(&offset).and_then(VecDeque::pop_front);
        let value = match scripted {
            Some(value) => value,
            None => inner.values.get(&offset).copied().unwrap_or(0),
        };
        inner.log.push(Access::Read { offset, value });

        trace!("read  {:#05x} -> {:#010x}", offset, value);
        Ok(value)
    }

    fn write(&self, offset: u32, value: u32) -> Result<(), RegisterError> {
        Self::check(offset)?;

        let mut inner = self.inner.lock();
        if inner.failing.contains(&offset) {
            return Err(RegisterError::Bus {
                offset,
                reason: "injected write failure".into(),
            });
        }
        inner.values.insert(offset, value);
        inner.log.push(Access::Write { offset, value });

        trace!("write {:#05x} <- {:#010x}", offset, value);
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn reads_back_written_value() {
        let regs = MemoryRegisters::new();
        regs.write(0x04, 0xdead_beef).unwrap();
        assert_eq!(regs.read(0x04).unwrap(), 0xdead_beef);
    }

    #[test]
    fn scripted_reads_take_precedence_then_drain() {
        let regs = MemoryRegisters::new();
        regs.preload(0x0c, 7);
        regs.script_reads(0x0c, [1, 2]);

        assert_eq!(regs.read(0x0c).unwrap(), 1);
        assert_eq!(regs.read(0x0c).unwrap(), 2);
        assert_eq!(regs.read(0x0c).unwrap(), 7);
    }

    #[test]
    fn rejects_bad_offsets() {
        let regs = MemoryRegisters::new();
        assert_eq!(regs.read(0x02), Err(RegisterError::Misaligned(0x02)));
        assert_eq!(regs.write(0x104, 0), Err(RegisterError::Unmapped(0x104)));
    }

    #[test]
    fn failed_write_leaves_register_untouched() {
        let regs = MemoryRegisters::new();
        regs.preload(0x00, 5);
        regs.fail_writes_to(0x00);

        assert!(matches!(regs.write(0x00, 9), Err(RegisterError::Bus { offset: 0, .. })));
        assert_eq!(regs.value(0x00), 5);
        assert!(regs.writes().is_empty());
    }
}
