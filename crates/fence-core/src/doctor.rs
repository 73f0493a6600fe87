//! Preflight validation of monitor tuning.

use anyhow::{ensure, Result};

use crate::engine::MonitorConfig;

pub fn check_monitor_config(cfg: &MonitorConfig) -> Result<()> {
    ensure!(
        (0.0..=50.0).contains(&cfg.battery_buffer_pct),
        "monitor.battery_buffer_pct should be 0..50, got {}",
        cfg.battery_buffer_pct
    );
    ensure!(
        cfg.minimum_distance_threshold_m > 0.0,
        "monitor.minimum_distance_threshold_m must be positive, got {}",
        cfg.minimum_distance_threshold_m
    );
    ensure!(
        (0.05..=10.0).contains(&cfg.poll_period_s),
        "monitor.poll_period_s should be 0.05..10 seconds, got {}",
        cfg.poll_period_s
    );
    ensure!(
        cfg.crash_distance_threshold_m > 0.0,
        "monitor.crash_distance_threshold_m must be positive, got {}",
        cfg.crash_distance_threshold_m
    );
    ensure!(
        cfg.landed_distance_threshold_m > 0.0,
        "monitor.landed_distance_threshold_m must be positive, got {}",
        cfg.landed_distance_threshold_m
    );
    ensure!(
        cfg.landed_altitude_threshold_m > 0.0,
        "monitor.landed_altitude_threshold_m must be positive, got {}",
        cfg.landed_altitude_threshold_m
    );
    Ok(())
}
