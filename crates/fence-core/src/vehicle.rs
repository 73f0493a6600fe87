use anyhow::Result;

use crate::geo::Position;
use crate::telemetry::BatteryStatus;

/// Flight mode as the supervisory loop cares about it.
///
/// Values outside the closed set are carried as `Other` so an unfamiliar
/// autopilot mode can still be logged without being mistaken for one we
/// act on.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FlightMode {
    Stabilize,
    Auto,
    Guided,
    Loiter,
    Rtl,
    Land,
    Other(u32),
}

impl std::fmt::Display for FlightMode {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            FlightMode::Stabilize => write!(f, "STABILIZE"),
            FlightMode::Auto => write!(f, "AUTO"),
            FlightMode::Guided => write!(f, "GUIDED"),
            FlightMode::Loiter => write!(f, "LOITER"),
            FlightMode::Rtl => write!(f, "RTL"),
            FlightMode::Land => write!(f, "LAND"),
            FlightMode::Other(n) => write!(f, "MODE({})", n),
        }
    }
}

/// What the monitor needs from a flying vehicle.
///
/// Telemetry getters are synchronous reads of locally cached state, never
/// round trips. `set_mode` requests the change and returns; the effect is
/// observed through later `current_mode` reads.
pub trait Vehicle {
    fn current_position(&self) -> Position;

    /// The launch point the vehicle will return to. Errors until the
    /// autopilot has produced a home fix.
    fn home_position(&self) -> Result<Position>;

    fn latest_battery(&self) -> Option<BatteryStatus>;

    fn current_mode(&self) -> FlightMode;

    fn is_armed(&self) -> bool;

    fn groundspeed_mps(&self) -> f64;

    /// Errors once the underlying link is no longer trustworthy; polled
    /// every tick so a dead transport stops the loop instead of letting it
    /// decide on stale telemetry.
    fn check_link(&self) -> Result<()> {
        Ok(())
    }

    fn set_mode(&self, mode: FlightMode) -> Result<()>;
}
