use std::sync::Arc;
use std::time::Duration;

use tokio::sync::watch;
use tokio_util::sync::CancellationToken;

use super::config::GovernorConfig;
use super::trend::Trend;
use crate::cooling::CoolingDevice;
use crate::tracing::prelude::*;

const TICK_DURATION: Duration = Duration::from_secs(2);

/// Drives one cooling device from a temperature feed.
pub struct StepWiseGovernor<D: CoolingDevice> {
    config: GovernorConfig,
    tick_duration: Duration,
    device: Arc<D>,
    temperature_rx: watch::Receiver<Option<f32>>,
}

impl<D: CoolingDevice> StepWiseGovernor<D> {
    pub fn new(
        config: GovernorConfig,
        device: Arc<D>,
        temperature_rx: watch::Receiver<Option<f32>>,
    ) -> Self {
        Self {
            config,
            tick_duration: TICK_DURATION,
            device,
            temperature_rx,
        }
    }

    pub fn with_tick_duration(mut self, tick_duration: Duration) -> Self {
        self.tick_duration = tick_duration;
        self
    }

    pub async fn run(mut self, cancellation: CancellationToken) {
        let mut interval = tokio::time::interval(self.tick_duration);
        interval.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Skip);

        loop {
            tokio::select! {
                _ = cancellation.cancelled() => {
                    debug!("Governor stopped");
                    break;
                }
                _ = interval.tick() => {
                    self.tick();
                }
            }
        }
    }

    fn tick(&mut self) {
        let temperature = match *self.temperature_rx.borrow() {
            Some(temp) => temp,
            None => {
                debug!("Governor tick: no temperature reading available yet");
                return;
            }
        };

        let trend = Trend::from_temperature(temperature, &self.config);
        let current = self.device.cur_state();
        let next = trend.apply(current, self.device.max_state());

        trace!(
            temp_c = %temperature,
            trip_c = %self.config.trip_temperature_c,
            trend = ?trend,
            state = current,
            "Governor tick"
        );

        if next == current {
            return;
        }

        match self.device.set_cur_state(next) {
            Ok(()) => info!(
                previous_state = current,
                new_state = next,
                temp_c = %temperature,
                "Cooling state changed"
            ),
            Err(e) => warn!(error = %e, state = next, "Failed to set cooling state"),
        }
    }
}
