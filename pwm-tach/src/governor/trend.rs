use super::config::GovernorConfig;

/// Direction of the next cooling state change.
#[derive(Debug, PartialEq, Clone, Copy)]
pub enum Trend {
    Raise,
    Hold,
    Lower,
}

impl Trend {
    pub fn from_temperature(temp: f32, config: &GovernorConfig) -> Self {
        if temp > config.trip_temperature_c {
            Trend::Raise
        } else if temp < config.trip_temperature_c - config.hysteresis_c {
            Trend::Lower
        } else {
            Trend::Hold
        }
    }

    /// Next state from `current`, kept within `0..=max_state`.
    pub fn apply(self, current: usize, max_state: usize) -> usize {
        match self {
            Trend::Raise => (current + 1).min(max_state),
            Trend::Hold => current.min(max_state),
            Trend::Lower => current.saturating_sub(1),
        }
    }
}
