//! The return decision engine: a fixed-period loop that keeps a running
//! account of distance flown and battery drained, projects how far the
//! vehicle can still fly, and orders it home before the two curves cross.

use std::time::Duration;

use anyhow::{Context, Result};
use serde::Deserialize;
use tokio::sync::watch;
use tracing::{debug, error, info, warn};

use crate::battery::{ConsumptionEstimator, RangeProjector};
use crate::geo::{self, Position};
use crate::session::{FlightSession, MonitorState};
use crate::telemetry::BatteryStatus;
use crate::vehicle::{FlightMode, Vehicle};

/// Monitor tuning. Field names match the `[monitor]` config section.
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct MonitorConfig {
    /// Battery percent reserved as an unusable safety margin.
    pub battery_buffer_pct: f64,
    /// Ground to cover before the consumption estimate is trusted.
    pub minimum_distance_threshold_m: f64,
    /// Decision tick period, seconds.
    pub poll_period_s: f64,
    /// A drained vehicle further out than this has crashed.
    pub crash_distance_threshold_m: f64,
    /// A returning vehicle closer than this may have landed.
    pub landed_distance_threshold_m: f64,
    /// Altitude below which a returning vehicle counts as on the ground.
    pub landed_altitude_threshold_m: f64,
}

impl Default for MonitorConfig {
    fn default() -> Self {
        Self {
            battery_buffer_pct: 5.0,
            minimum_distance_threshold_m: 300.0,
            poll_period_s: 0.5,
            crash_distance_threshold_m: 1.0,
            landed_distance_threshold_m: 1.0,
            landed_altitude_threshold_m: 1.0,
        }
    }
}

/// One tick's worth of vehicle truth.
#[derive(Debug, Clone, Copy)]
pub struct TelemetrySample {
    pub position: Position,
    pub battery: Option<BatteryStatus>,
    pub mode: FlightMode,
    pub groundspeed_mps: f64,
}

/// What the loop driver should do after a tick.
#[derive(Debug, Clone, PartialEq)]
pub enum TickDecision {
    /// Keep flying, keep watching.
    Continue,
    /// Remaining range no longer covers the trip home: command the return.
    TriggerReturn { remaining_range_m: f64, distance_to_home_m: f64 },
    /// A terminal condition fired; stop the loop.
    Finish(TerminalOutcome),
}

/// How a monitoring session ended.
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum TerminalOutcome {
    /// Return mode, at the base, on the ground.
    LandedSafely { traveled_distance_m: f64, final_battery_pct: f64 },
    /// Battery hit zero away from the base.
    Crashed { traveled_distance_m: f64, final_battery_pct: f64 },
}

impl TerminalOutcome {
    pub fn crashed(&self) -> bool {
        matches!(self, TerminalOutcome::Crashed { .. })
    }

    pub fn traveled_distance_m(&self) -> f64 {
        match *self {
            TerminalOutcome::LandedSafely { traveled_distance_m, .. }
            | TerminalOutcome::Crashed { traveled_distance_m, .. } => traveled_distance_m,
        }
    }

    pub fn final_battery_pct(&self) -> f64 {
        match *self {
            TerminalOutcome::LandedSafely { final_battery_pct, .. }
            | TerminalOutcome::Crashed { final_battery_pct, .. } => final_battery_pct,
        }
    }
}

/// Per-tick decision core. Synchronous and deterministic; the async driver
/// below owns the clock and the vehicle.
#[derive(Debug)]
pub struct ReturnMonitor {
    cfg: MonitorConfig,
    projector: RangeProjector,
    session: FlightSession,
}

impl ReturnMonitor {
    /// `initial_battery` is the first report of the session; the
    /// consumption baseline is its effective (buffer-subtracted) level, so
    /// later drops measure real drawdown with the buffer cancelled out.
    pub fn new(
        cfg: MonitorConfig,
        base_location: Position,
        start_location: Position,
        initial_battery: BatteryStatus,
    ) -> Self {
        let projector = RangeProjector::new(cfg.battery_buffer_pct);
        let estimator = ConsumptionEstimator::new(cfg.minimum_distance_threshold_m);
        let session = FlightSession::new(
            base_location,
            start_location,
            projector.effective_battery(initial_battery.remaining_pct),
            initial_battery.remaining_pct,
            estimator,
        );
        Self { cfg, projector, session }
    }

    pub fn session(&self) -> &FlightSession {
        &self.session
    }

    pub fn tick(&mut self, sample: &TelemetrySample) -> TickDecision {
        let s = &mut self.session;

        let delta_m = geo::ground_distance(s.previous_location, sample.position);
        s.traveled_distance_m += delta_m;
        s.previous_location = sample.position;
        let distance_to_home_m = geo::ground_distance(sample.position, s.base_location);

        debug!(
            "tick: moved {:.1} m, traveled {:.1} m, home {:.1} m, alt {:.1} m, speed {:.1} m/s, mode {}",
            delta_m,
            s.traveled_distance_m,
            distance_to_home_m,
            sample.position.alt_m,
            sample.groundspeed_mps,
            sample.mode
        );

        if sample.mode == FlightMode::Rtl && s.state == MonitorState::Monitoring {
            info!("return mode active, watching for touchdown");
            s.state = MonitorState::Returning;
        }

        let mut pending_return = None;
        if let Some(batt) = sample.battery {
            s.last_battery_pct = batt.remaining_pct;
            let effective_pct = self.projector.effective_battery(batt.remaining_pct);
            let consumed_pct = s.consumed_pct(effective_pct);

            if consumed_pct > 0.0 && s.traveled_distance_m >= self.cfg.minimum_distance_threshold_m {
                let rate = s.consumption.update(s.traveled_distance_m, consumed_pct);
                let remaining_range_m = self.projector.project(batt.remaining_pct, rate);
                info!(
                    "battery {:.0}% ({:.0}% usable) at {:.1} m/%, range {:.0} m, home {:.0} m",
                    batt.remaining_pct, effective_pct, rate, remaining_range_m, distance_to_home_m
                );
                if s.state == MonitorState::Monitoring
                    && !s.return_commanded
                    && remaining_range_m < distance_to_home_m
                {
                    pending_return = Some((remaining_range_m, distance_to_home_m));
                }
            } else {
                debug!(
                    "estimate not trusted yet (traveled {:.1} m, consumed {:.1}%), sample disregarded",
                    s.traveled_distance_m, consumed_pct
                );
            }

            // Crash detection works on the raw value: the buffer is a
            // planning margin, not evidence of exhaustion.
            if batt.remaining_pct <= 0.0 && distance_to_home_m > self.cfg.crash_distance_threshold_m {
                error!(
                    "battery exhausted {:.1} m from base after {:.1} m flown",
                    distance_to_home_m, s.traveled_distance_m
                );
                return TickDecision::Finish(TerminalOutcome::Crashed {
                    traveled_distance_m: s.traveled_distance_m,
                    final_battery_pct: batt.remaining_pct,
                });
            }
        } else {
            debug!("no battery report yet, decision deferred");
        }

        if sample.mode == FlightMode::Rtl
            && distance_to_home_m < self.cfg.landed_distance_threshold_m
            && sample.position.alt_m < self.cfg.landed_altitude_threshold_m
        {
            info!(
                "touched down {:.2} m from base with {:.0}% battery",
                distance_to_home_m, s.last_battery_pct
            );
            return TickDecision::Finish(TerminalOutcome::LandedSafely {
                traveled_distance_m: s.traveled_distance_m,
                final_battery_pct: s.last_battery_pct,
            });
        }

        if let Some((remaining_range_m, distance_to_home_m)) = pending_return {
            s.return_commanded = true;
            s.state = MonitorState::Returning;
            warn!(
                "remaining range {:.0} m no longer covers {:.0} m back to base, commanding return",
                remaining_range_m, distance_to_home_m
            );
            return TickDecision::TriggerReturn { remaining_range_m, distance_to_home_m };
        }

        TickDecision::Continue
    }
}

/// Runs the monitoring loop against a live vehicle until a terminal
/// condition fires or `shutdown` flips to true.
///
/// Returns `Ok(None)` when shut down before any terminal condition;
/// vehicle-interface failures surface as errors.
pub async fn run_monitoring<V: Vehicle>(
    vehicle: &V,
    cfg: &MonitorConfig,
    shutdown: &mut watch::Receiver<bool>,
) -> Result<Option<TerminalOutcome>> {
    let period = Duration::from_secs_f64(cfg.poll_period_s.max(0.05));

    // The consumption baseline needs a battery report; wait for the first.
    let initial_battery = loop {
        vehicle.check_link().context("vehicle no longer reachable")?;
        if let Some(b) = vehicle.latest_battery() {
            break b;
        }
        info!("waiting for the first battery report");
        if !sleep_through(period, shutdown).await {
            return Ok(None);
        }
    };

    let base = vehicle.home_position().context("monitoring needs the base position")?;
    let start = vehicle.current_position();
    let mut monitor = ReturnMonitor::new(cfg.clone(), base, start, initial_battery);
    info!(
        "monitoring from base ({:.6}, {:.6}), battery {:.0}%, tick {:?}",
        base.lat, base.lon, initial_battery.remaining_pct, period
    );

    loop {
        vehicle.check_link().context("vehicle no longer reachable")?;
        let sample = TelemetrySample {
            position: vehicle.current_position(),
            battery: vehicle.latest_battery(),
            mode: vehicle.current_mode(),
            groundspeed_mps: vehicle.groundspeed_mps(),
        };
        match monitor.tick(&sample) {
            TickDecision::Continue => {}
            TickDecision::TriggerReturn { .. } => {
                vehicle.set_mode(FlightMode::Rtl).context("command return to launch")?;
            }
            TickDecision::Finish(outcome) => return Ok(Some(outcome)),
        }
        if !sleep_through(period, shutdown).await {
            return Ok(None);
        }
    }
}

/// Sleeps one tick; false when the shutdown signal fired instead.
async fn sleep_through(period: Duration, shutdown: &mut watch::Receiver<bool>) -> bool {
    if *shutdown.borrow() {
        return false;
    }
    tokio::select! {
        _ = tokio::time::sleep(period) => true,
        changed = shutdown.changed() => match changed {
            Ok(()) => !*shutdown.borrow(),
            // Sender gone: nobody is left to stop us gracefully later.
            Err(_) => false,
        },
    }
}
