use crate::battery::ConsumptionEstimator;
use crate::geo::Position;

/// Where the monitor stands within a session.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MonitorState {
    /// Watching telemetry; the return has not started.
    Monitoring,
    /// Return mode commanded or observed; only terminal checks still act.
    Returning,
}

/// Mutable state owned by the decision loop for the span of one flight.
#[derive(Debug)]
pub struct FlightSession {
    /// Launch point the vehicle returns to. Set once, never moved.
    pub base_location: Position,
    /// Sample from the previous tick, for incremental distance.
    pub previous_location: Position,
    /// Path length flown so far, meters. Only ever grows.
    pub traveled_distance_m: f64,
    /// Effective (buffer-subtracted) battery level when monitoring began.
    pub initial_battery_pct: f64,
    /// Raw percent from the most recent battery report.
    pub last_battery_pct: f64,
    pub state: MonitorState,
    /// Latch so the engine commands the return at most once.
    pub return_commanded: bool,
    pub consumption: ConsumptionEstimator,
}

impl FlightSession {
    pub fn new(
        base_location: Position,
        start_location: Position,
        initial_battery_pct: f64,
        last_battery_pct: f64,
        consumption: ConsumptionEstimator,
    ) -> Self {
        Self {
            base_location,
            previous_location: start_location,
            traveled_distance_m: 0.0,
            initial_battery_pct,
            last_battery_pct,
            state: MonitorState::Monitoring,
            return_commanded: false,
            consumption,
        }
    }

    /// Battery drained since monitoring began, in effective percent points.
    pub fn consumed_pct(&self, effective_now_pct: f64) -> f64 {
        self.initial_battery_pct - effective_now_pct
    }
}
