use anyhow::{Context, Result};
use clap::{Args, Parser, Subcommand};
use tracing::{info, warn};

use fence_core::doctor as core_doctor;
use fence_core::engine::{self, MonitorConfig};
use fence_core::vehicle::Vehicle;
use fence_fc::mav::{self, FcLink};
use fence_fc::FcConfig;

use tokio::sync::watch;

mod mission;
mod report;

#[derive(Debug, Parser)]
#[command(name = "batfence", version, about = "batfence - battery-aware return-to-base supervisor")]
struct Cli {
    #[arg(long)]
    config: String,

    #[command(subcommand)]
    cmd: Command,
}

#[derive(Debug, Subcommand)]
enum Command {
    /// Validate config and endpoints without flying.
    Doctor,
    /// Take off, fly the configured leg and supervise until touchdown.
    Fly(FlyArgs),
    /// Supervise an already airborne vehicle without commanding a mission.
    Monitor(MonitorArgs),
}

#[derive(Debug, Args)]
struct FlyArgs {
    /// Takeoff altitude in meters, overrides [flight] takeoff_alt_m.
    #[arg(long)]
    alt: Option<f64>,

    /// Leg length north in meters, overrides [flight] north_m.
    #[arg(long)]
    north: Option<f64>,

    /// Leg length east in meters, overrides [flight] east_m.
    #[arg(long)]
    east: Option<f64>,

    /// Case label stamped into the report, overrides [flight] case_name.
    #[arg(long)]
    case: Option<String>,
}

#[derive(Debug, Args)]
struct MonitorArgs {
    /// Case label stamped into the report.
    #[arg(long)]
    case: Option<String>,
}

#[derive(Debug, serde::Deserialize)]
struct Config {
    fc: FcConfig,

    #[serde(default)]
    monitor: MonitorConfig,

    flight: Option<FlightCfg>,

    #[serde(default)]
    report: ReportCfg,
}

#[derive(Debug, Clone, serde::Deserialize)]
struct FlightCfg {
    takeoff_alt_m: f64,
    north_m: f64,
    east_m: f64,
    case_name: String,
}

#[derive(Debug, serde::Deserialize)]
struct ReportCfg {
    dir: String,
}

impl Default for ReportCfg {
    fn default() -> Self {
        Self { dir: "reports".to_string() }
    }
}

fn load_config(path: &str) -> Result<Config> {
    let s = std::fs::read_to_string(path).context("read config")?;
    Ok(toml::from_str(&s).context("parse config toml")?)
}

#[tokio::main]
async fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(tracing_subscriber::EnvFilter::from_default_env())
        .init();

    let cli = Cli::parse();
    let cfg = load_config(&cli.config)?;

    match cli.cmd {
        Command::Doctor => doctor(&cfg)?,
        Command::Fly(args) => fly(&cfg, args).await?,
        Command::Monitor(args) => monitor(&cfg, args).await?,
    }
    Ok(())
}

fn doctor(cfg: &Config) -> Result<()> {
    info!("doctor: starting");

    core_doctor::check_monitor_config(&cfg.monitor)?;
    mav::check_connection(&cfg.fc.connection)?;

    if let Some(flight) = &cfg.flight {
        anyhow::ensure!(flight.takeoff_alt_m > 0.0, "flight.takeoff_alt_m must be positive");
        anyhow::ensure!(
            flight.north_m.abs() + flight.east_m.abs() > 0.0,
            "flight leg has zero length"
        );
    }
    report::check_report_dir(&cfg.report.dir)?;

    info!("doctor: OK");
    Ok(())
}

async fn fly(cfg: &Config, args: FlyArgs) -> Result<()> {
    let plan = resolve_flight(cfg, &args);
    info!(
        "fly: case {:?}, leg {:.0} m north / {:.0} m east at {:.0} m",
        plan.case_name, plan.north_m, plan.east_m, plan.takeoff_alt_m
    );

    // Connect before installing the shutdown handler so ctrl-c during a
    // blocking connect still kills the process.
    let link = FcLink::connect(&cfg.fc).context("FC connect")?;
    let mut shutdown = shutdown_channel();

    mission::prepare(&link)?;
    mission::arm_and_takeoff(&link, plan.takeoff_alt_m, &mut shutdown).await?;
    mission::move_to(&link, plan.north_m, plan.east_m)?;

    run_and_report(link.as_ref(), cfg, &plan.case_name, &mut shutdown).await
}

async fn monitor(cfg: &Config, args: MonitorArgs) -> Result<()> {
    let case_name = args
        .case
        .or_else(|| cfg.flight.as_ref().map(|f| f.case_name.clone()))
        .unwrap_or_default();

    let link = FcLink::connect(&cfg.fc).context("FC connect")?;
    let mut shutdown = shutdown_channel();
    run_and_report(link.as_ref(), cfg, &case_name, &mut shutdown).await
}

fn resolve_flight(cfg: &Config, args: &FlyArgs) -> mission::FlightPlan {
    let base = cfg.flight.as_ref();
    mission::FlightPlan {
        takeoff_alt_m: args.alt.or(base.map(|f| f.takeoff_alt_m)).unwrap_or(15.0),
        north_m: args.north.or(base.map(|f| f.north_m)).unwrap_or(10_000.0),
        east_m: args.east.or(base.map(|f| f.east_m)).unwrap_or(0.0),
        case_name: args
            .case
            .clone()
            .or_else(|| base.map(|f| f.case_name.clone()))
            .unwrap_or_default(),
    }
}

async fn run_and_report<V: Vehicle>(
    vehicle: &V,
    cfg: &Config,
    case_name: &str,
    shutdown: &mut watch::Receiver<bool>,
) -> Result<()> {
    match engine::run_monitoring(vehicle, &cfg.monitor, shutdown).await? {
        Some(outcome) => {
            if outcome.crashed() {
                warn!("flight ended in a crash");
            } else {
                info!("flight returned safely");
            }
            let path = report::write_report(&cfg.report.dir, case_name, &outcome).await?;
            println!("report: {}", path.display());
            Ok(())
        }
        None => {
            info!("monitoring interrupted, no report written");
            Ok(())
        }
    }
}

fn shutdown_channel() -> watch::Receiver<bool> {
    let (tx, rx) = watch::channel(false);
    tokio::spawn(async move {
        match tokio::signal::ctrl_c().await {
            Ok(()) => {
                warn!("interrupt, shutting down");
                let _ = tx.send(true);
            }
            Err(e) => {
                warn!("ctrl-c handler failed: {}", e);
                // Keep the sender alive so the loop is not torn down with it.
                std::future::pending::<()>().await;
            }
        }
    });
    rx
}
