use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct GovernorConfig {
    /// Above this (°C) the governor raises the cooling state each tick.
    pub trip_temperature_c: f32,

    /// Band below the trip point (°C) where the state is held. Below
    /// `trip_temperature_c - hysteresis_c` the state is lowered.
    pub hysteresis_c: f32,
}

impl Default for GovernorConfig {
    fn default() -> Self {
        Self {
            trip_temperature_c: 70.0,
            hysteresis_c: 3.0,
        }
    }
}
