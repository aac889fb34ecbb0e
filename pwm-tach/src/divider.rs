//! PWM clock divider resolution.
//!
//! The output frequency is derived from the input clock by two cascaded
//! dividers and the fixed 256-tick period:
//!
//! ```text
//! achieved = (input_clock / (PERIOD_TICKS + 1)) / (2^coarse * (fine + 1))
//! ```
//!
//! [`resolve`] scans `coarse` ascending, then `fine` ascending, and keeps
//! the first combination whose frequency is strictly below the target.

use serde::Serialize;

/// Ticks in one PWM period, minus one.
pub const PERIOD_TICKS: u32 = 255;

pub const MAX_COARSE: u8 = 0xf;
pub const MAX_FINE: u8 = 0xff;

/// Outcome of a divider search.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct DividerSetting {
    pub coarse: u8,
    pub fine: u8,
    pub achieved_hz: u32,
    /// False when no combination undercut the target and the search fell
    /// back to the largest divisor.
    pub meets_target: bool,
}

/// Frequency produced by a given divider pair.
pub fn achieved_frequency(input_clock_hz: u32, coarse: u8, fine: u8) -> u32 {
    let base = input_clock_hz / (PERIOD_TICKS + 1);
    base / ((1u32 << coarse) * (u32::from(fine) + 1))
}

/// Find the divider pair for `target_hz`.
///
/// Pure in its inputs. When the whole 16x256 space stays at or above the
/// target (a target of 0, or a clock so fast that even the largest
/// divisor is too little), the result is the maximal-divisor pair
/// `(15, 255)` with `meets_target` cleared.
pub fn resolve(input_clock_hz: u32, target_hz: u32) -> DividerSetting {
    for coarse in 0..=MAX_COARSE {
        for fine in 0..=MAX_FINE {
            let achieved_hz = achieved_frequency(input_clock_hz, coarse, fine);
            if achieved_hz < target_hz {
                return DividerSetting {
                    coarse,
                    fine,
                    achieved_hz,
                    meets_target: true,
                };
            }
        }
    }

    DividerSetting {
        coarse: MAX_COARSE,
        fine: MAX_FINE,
        achieved_hz: achieved_frequency(input_clock_hz, MAX_COARSE, MAX_FINE),
        meets_target: false,
    }
}
