use std::sync::{Arc, Mutex};

use crate::geo::Position;

/// Most recent battery report from the vehicle, units normalized.
///
/// `remaining_pct` is the raw autopilot estimate; no safety buffer has been
/// applied to it.
#[derive(Debug, Clone, Copy, PartialEq, Default)]
pub struct BatteryStatus {
    pub remaining_pct: f64,
    pub voltage_mv: f64,
    pub current_consumed_mah: f64,
    pub energy_consumed_hj: f64,
}

/// Latest-value view of the telemetry the monitor consumes.
///
/// One writer (the vehicle link) overwrites the slots as messages arrive;
/// the decision loop reads them once per tick. Last write wins, nothing is
/// queued. The position slot is seeded at construction so reads are always
/// valid; the battery slot stays `None` until the first report, which is a
/// different state than a report of 0%.
///
/// Clones share the underlying slots, so one clone serves as the writer
/// handle and another as the reader.
#[derive(Debug, Clone)]
pub struct TelemetrySnapshot {
    inner: Arc<Mutex<Slots>>,
}

#[derive(Debug)]
struct Slots {
    position: Position,
    battery: Option<BatteryStatus>,
}

impl TelemetrySnapshot {
    pub fn new(initial_position: Position) -> Self {
        Self {
            inner: Arc::new(Mutex::new(Slots { position: initial_position, battery: None })),
        }
    }

    pub fn update_position(&self, position: Position) {
        self.inner.lock().unwrap().position = position;
    }

    pub fn update_battery(&self, battery: BatteryStatus) {
        self.inner.lock().unwrap().battery = Some(battery);
    }

    pub fn current_position(&self) -> Position {
        self.inner.lock().unwrap().position
    }

    pub fn latest_battery(&self) -> Option<BatteryStatus> {
        self.inner.lock().unwrap().battery
    }
}
