//! End-to-end monitoring scenarios against a scripted fake vehicle.
//!
//! The clock starts paused, so sleeps auto-advance and every timeline is
//! deterministic regardless of host load.

use std::sync::{Arc, Mutex};
use std::time::Duration;

use anyhow::{Context, Result};
use tokio::sync::watch;
use tokio::time::{sleep, timeout};

use fence_core::engine::{run_monitoring, MonitorConfig, TerminalOutcome};
use fence_core::geo::Position;
use fence_core::telemetry::BatteryStatus;
use fence_core::vehicle::{FlightMode, Vehicle};

/// Degrees of latitude per meter under the planar approximation.
const LAT_PER_M: f64 = 1.0 / 1.113195e5;

fn north(meters: f64) -> Position {
    Position { lat: meters * LAT_PER_M, lon: 0.0, alt_m: 30.0 }
}

fn batt(pct: f64) -> BatteryStatus {
    BatteryStatus { remaining_pct: pct, ..Default::default() }
}

#[derive(Clone, Copy)]
struct VehicleTruth {
    position: Position,
    battery: Option<BatteryStatus>,
    mode: FlightMode,
}

/// Scripted vehicle: tests mutate the truth on a timeline, the monitor
/// polls it like a live link.
struct FakeVehicle {
    home: Option<Position>,
    /// When set, a commanded mode change also takes effect on the truth.
    obeys_mode_commands: bool,
    truth: Mutex<VehicleTruth>,
    commanded: Mutex<Vec<FlightMode>>,
    link_error: Mutex<Option<String>>,
}

impl FakeVehicle {
    fn new(
        home: Option<Position>,
        obeys_mode_commands: bool,
        start: Position,
        battery: Option<BatteryStatus>,
    ) -> Arc<Self> {
        Arc::new(Self {
            home,
            obeys_mode_commands,
            truth: Mutex::new(VehicleTruth { position: start, battery, mode: FlightMode::Guided }),
            commanded: Mutex::new(Vec::new()),
            link_error: Mutex::new(None),
        })
    }

    /// Guided flight from the base at `north(0.0)`, ignoring mode commands.
    fn airborne(start: Position, battery: Option<BatteryStatus>) -> Arc<Self> {
        Self::new(Some(north(0.0)), false, start, battery)
    }

    fn set_truth(&self, position: Position, battery: Option<BatteryStatus>) {
        let mut truth = self.truth.lock().unwrap();
        truth.position = position;
        truth.battery = battery;
    }

    fn commanded_modes(&self) -> Vec<FlightMode> {
        self.commanded.lock().unwrap().clone()
    }

    fn fail_link(&self, reason: &str) {
        *self.link_error.lock().unwrap() = Some(reason.to_string());
    }
}

impl Vehicle for FakeVehicle {
    fn current_position(&self) -> Position {
        self.truth.lock().unwrap().position
    }

    fn home_position(&self) -> Result<Position> {
        self.home.context("fake vehicle has no home fix")
    }

    fn latest_battery(&self) -> Option<BatteryStatus> {
        self.truth.lock().unwrap().battery
    }

    fn current_mode(&self) -> FlightMode {
        self.truth.lock().unwrap().mode
    }

    fn is_armed(&self) -> bool {
        true
    }

    fn groundspeed_mps(&self) -> f64 {
        5.0
    }

    fn check_link(&self) -> Result<()> {
        if let Some(reason) = self.link_error.lock().unwrap().clone() {
            anyhow::bail!("{}", reason);
        }
        Ok(())
    }

    fn set_mode(&self, mode: FlightMode) -> Result<()> {
        self.commanded.lock().unwrap().push(mode);
        if self.obeys_mode_commands {
            self.truth.lock().unwrap().mode = mode;
        }
        Ok(())
    }
}

async fn run_guarded(
    vehicle: &FakeVehicle,
    cfg: &MonitorConfig,
    shutdown: &mut watch::Receiver<bool>,
) -> Result<Option<TerminalOutcome>> {
    timeout(Duration::from_secs(60), run_monitoring(vehicle, cfg, shutdown))
        .await
        .expect("monitor never terminated")
}

#[tokio::test(start_paused = true)]
async fn test_crash_is_reported() {
    let fake = FakeVehicle::airborne(north(0.0), Some(batt(100.0)));
    let (_tx, mut rx) = watch::channel(false);

    let timeline = fake.clone();
    tokio::spawn(async move {
        sleep(Duration::from_millis(600)).await;
        timeline.set_truth(north(50.0), Some(batt(0.0)));
    });

    let outcome = run_guarded(&fake, &MonitorConfig::default(), &mut rx).await.unwrap();
    match outcome {
        Some(TerminalOutcome::Crashed { traveled_distance_m, final_battery_pct }) => {
            assert!((traveled_distance_m - 50.0).abs() < 1e-6, "traveled {}", traveled_distance_m);
            assert_eq!(final_battery_pct, 0.0);
        }
        other => panic!("expected a crash, got {:?}", other),
    }
    assert!(fake.commanded_modes().is_empty());
}

#[tokio::test(start_paused = true)]
async fn test_return_commanded_once_when_range_falls_short() {
    let fake = FakeVehicle::airborne(north(0.0), Some(batt(100.0)));
    let (tx, mut rx) = watch::channel(false);

    let timeline = fake.clone();
    tokio::spawn(async move {
        // Warm-up leg establishes 60 m/%.
        sleep(Duration::from_millis(600)).await;
        timeline.set_truth(north(300.0), Some(batt(95.0)));
        // Far out with 25% usable: 1500 m of range against 4200 m home.
        sleep(Duration::from_millis(500)).await;
        timeline.set_truth(north(4200.0), Some(batt(30.0)));
    });
    tokio::spawn(async move {
        sleep(Duration::from_millis(3300)).await;
        let _ = tx.send(true);
    });

    let outcome = run_guarded(&fake, &MonitorConfig::default(), &mut rx).await.unwrap();
    assert_eq!(outcome, None);
    // Several more ticks ran with the range still short; the command fired once.
    assert_eq!(fake.commanded_modes(), vec![FlightMode::Rtl]);
}

#[tokio::test(start_paused = true)]
async fn test_lands_after_commanded_return() {
    let fake = FakeVehicle::new(Some(north(0.0)), true, north(0.0), Some(batt(100.0)));
    let (_tx, mut rx) = watch::channel(false);

    let timeline = fake.clone();
    tokio::spawn(async move {
        sleep(Duration::from_millis(600)).await;
        timeline.set_truth(north(400.0), Some(batt(90.0)));
        // Collapses under the buffer: zero usable range forces the return.
        sleep(Duration::from_millis(500)).await;
        timeline.set_truth(north(500.0), Some(batt(3.0)));
        sleep(Duration::from_millis(500)).await;
        timeline.set_truth(Position { lat: 0.5 * LAT_PER_M, lon: 0.0, alt_m: 0.3 }, Some(batt(2.0)));
    });

    let outcome = run_guarded(&fake, &MonitorConfig::default(), &mut rx).await.unwrap();
    match outcome {
        Some(TerminalOutcome::LandedSafely { traveled_distance_m, final_battery_pct }) => {
            assert!(traveled_distance_m > 900.0, "traveled {}", traveled_distance_m);
            assert_eq!(final_battery_pct, 2.0);
        }
        other => panic!("expected a safe landing, got {:?}", other),
    }
    assert_eq!(fake.commanded_modes(), vec![FlightMode::Rtl]);
    assert!(!outcome.unwrap().crashed());
}

#[tokio::test(start_paused = true)]
async fn test_waits_for_first_battery_report() {
    let fake = FakeVehicle::airborne(north(0.0), None);
    let (_tx, mut rx) = watch::channel(false);

    let timeline = fake.clone();
    tokio::spawn(async move {
        sleep(Duration::from_millis(1300)).await;
        timeline.set_truth(north(0.0), Some(batt(100.0)));
        sleep(Duration::from_millis(500)).await;
        timeline.set_truth(north(50.0), Some(batt(0.0)));
    });

    let outcome = run_guarded(&fake, &MonitorConfig::default(), &mut rx).await.unwrap();
    match outcome {
        Some(TerminalOutcome::Crashed { traveled_distance_m, .. }) => {
            // Distance counts from monitoring start, not from the delayed report.
            assert!((traveled_distance_m - 50.0).abs() < 1e-6, "traveled {}", traveled_distance_m);
        }
        other => panic!("expected a crash, got {:?}", other),
    }
}

#[tokio::test(start_paused = true)]
async fn test_shutdown_interrupts_without_outcome() {
    let fake = FakeVehicle::airborne(north(200.0), Some(batt(80.0)));
    let (tx, mut rx) = watch::channel(false);

    tokio::spawn(async move {
        sleep(Duration::from_millis(1200)).await;
        let _ = tx.send(true);
    });

    let outcome = run_guarded(&fake, &MonitorConfig::default(), &mut rx).await.unwrap();
    assert_eq!(outcome, None);
    assert!(fake.commanded_modes().is_empty());
}

#[tokio::test(start_paused = true)]
async fn test_dead_link_ends_with_error() {
    let fake = FakeVehicle::airborne(north(100.0), Some(batt(70.0)));
    let (_tx, mut rx) = watch::channel(false);

    let timeline = fake.clone();
    tokio::spawn(async move {
        sleep(Duration::from_millis(900)).await;
        timeline.fail_link("radio unplugged");
    });

    let err = run_guarded(&fake, &MonitorConfig::default(), &mut rx).await.unwrap_err();
    assert!(format!("{:#}", err).contains("no longer reachable"));
    assert!(fake.commanded_modes().is_empty());
}

#[tokio::test(start_paused = true)]
async fn test_missing_home_fix_is_an_error() {
    let fake = FakeVehicle::new(None, false, north(0.0), Some(batt(100.0)));
    let (_tx, mut rx) = watch::channel(false);

    let err = run_guarded(&fake, &MonitorConfig::default(), &mut rx).await.unwrap_err();
    assert!(format!("{:#}", err).contains("base position"));
}
