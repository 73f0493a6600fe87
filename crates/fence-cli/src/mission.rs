//! Preflight, climb and leg commands for a guided mission.

use std::time::Duration;

use anyhow::{Context, Result};
use tokio::sync::watch;
use tracing::info;

use fence_core::geo;
use fence_core::vehicle::{FlightMode, Vehicle};
use fence_fc::mav::FcLink;

#[derive(Debug, Clone)]
pub struct FlightPlan {
    pub takeoff_alt_m: f64,
    pub north_m: f64,
    pub east_m: f64,
    pub case_name: String,
}

/// Refuses a vehicle that is not idle on the ground, then disables the
/// autopilot distance fence so a long leg is not cut short.
pub fn prepare(link: &FcLink) -> Result<()> {
    let mode = link.current_mode();
    if mode != FlightMode::Stabilize {
        anyhow::bail!(
            "vehicle is in {} and looks mid-mission; restart the autopilot first",
            mode
        );
    }
    link.set_param("FENCE_ENABLE", 0.0).context("disable autopilot fence")?;
    Ok(())
}

pub async fn arm_and_takeoff(
    link: &FcLink,
    alt_m: f64,
    shutdown: &mut watch::Receiver<bool>,
) -> Result<()> {
    while link.home_position().is_err() {
        info!("waiting for vehicle to initialise");
        link.request_home()?;
        wait_tick(shutdown).await?;
    }

    link.set_mode(FlightMode::Guided)?;
    while link.current_mode() != FlightMode::Guided {
        info!("waiting for guided mode");
        wait_tick(shutdown).await?;
        // The rate limiter spaces these retries out.
        link.set_mode(FlightMode::Guided)?;
    }

    link.arm()?;
    while !link.is_armed() {
        info!("waiting for arming");
        wait_tick(shutdown).await?;
    }

    link.takeoff(alt_m as f32).context("takeoff command")?;
    loop {
        let alt = link.current_position().alt_m;
        info!("altitude: {:.1} m", alt);
        if alt >= alt_m * 0.95 {
            info!("reached target altitude");
            return Ok(());
        }
        wait_tick(shutdown).await?;
    }
}

/// Sends the guided leg target relative to the current position.
pub fn move_to(link: &FcLink, north_m: f64, east_m: f64) -> Result<()> {
    let here = link.current_position();
    let target = geo::offset_position(here, north_m, east_m);
    info!("leg: {:.0} m north, {:.0} m east", north_m, east_m);
    link.goto_position(target)
}

async fn wait_tick(shutdown: &mut watch::Receiver<bool>) -> Result<()> {
    tokio::time::sleep(Duration::from_secs(1)).await;
    anyhow::ensure!(!*shutdown.borrow(), "interrupted");
    Ok(())
}
