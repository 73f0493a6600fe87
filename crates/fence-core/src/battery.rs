//! Battery consumption estimation and range projection.
//!
//! Pure logic, no I/O or async. The estimator is a cumulative average over
//! the whole session: deliberately slow-moving, preferring the long-run
//! meters-per-percent figure over short-term draw fluctuations.

/// Meters-per-percent estimator, trusted only after a warm-up distance.
#[derive(Debug, Clone)]
pub struct ConsumptionEstimator {
    warmup_distance_m: f64,
    rate_m_per_pct: f64,
}

impl ConsumptionEstimator {
    pub fn new(warmup_distance_m: f64) -> Self {
        Self { warmup_distance_m, rate_m_per_pct: 0.0 }
    }

    /// Recomputes the cumulative average when the inputs are trustworthy.
    ///
    /// Below the warm-up distance, or before any battery has been drained,
    /// the previous value is kept; the early quotient of two near-zero
    /// numbers is noise, not an efficiency.
    pub fn update(&mut self, traveled_m: f64, consumed_pct: f64) -> f64 {
        if consumed_pct > 0.0 && traveled_m >= self.warmup_distance_m {
            self.rate_m_per_pct = traveled_m / consumed_pct;
        }
        self.rate_m_per_pct
    }

    pub fn rate_m_per_pct(&self) -> f64 {
        self.rate_m_per_pct
    }

    /// False until the first successful update.
    pub fn warmed_up(&self) -> bool {
        self.rate_m_per_pct > 0.0
    }
}

/// Projects remaining range from battery headroom and efficiency.
#[derive(Debug, Clone, Copy)]
pub struct RangeProjector {
    buffer_pct: f64,
}

impl RangeProjector {
    pub fn new(buffer_pct: f64) -> Self {
        Self { buffer_pct }
    }

    /// Battery percent usable for range, after the reserved buffer.
    /// Floors at 0 so a nearly drained pack never projects negative range.
    pub fn effective_battery(&self, raw_pct: f64) -> f64 {
        (raw_pct - self.buffer_pct).max(0.0)
    }

    /// Remaining range in meters. Zero while the estimator is cold.
    pub fn project(&self, raw_pct: f64, rate_m_per_pct: f64) -> f64 {
        self.effective_battery(raw_pct) * rate_m_per_pct
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_estimator_starts_cold() {
        let est = ConsumptionEstimator::new(300.0);
        assert_eq!(est.rate_m_per_pct(), 0.0);
        assert!(!est.warmed_up());
    }

    #[test]
    fn test_no_update_below_warmup_distance() {
        let mut est = ConsumptionEstimator::new(300.0);
        // A large battery delta alone is not enough.
        assert_eq!(est.update(299.9, 20.0), 0.0);
        assert!(!est.warmed_up());
    }

    #[test]
    fn test_no_update_without_consumption() {
        let mut est = ConsumptionEstimator::new(300.0);
        assert_eq!(est.update(5000.0, 0.0), 0.0);
        assert_eq!(est.update(5000.0, -2.0), 0.0);
    }

    #[test]
    fn test_update_is_cumulative_average() {
        let mut est = ConsumptionEstimator::new(300.0);
        assert_eq!(est.update(300.0, 5.0), 60.0);
        // Later samples recompute from session totals, not deltas.
        assert_eq!(est.update(900.0, 10.0), 90.0);
    }

    #[test]
    fn test_failed_precondition_keeps_last_rate() {
        let mut est = ConsumptionEstimator::new(300.0);
        est.update(600.0, 10.0);
        assert_eq!(est.update(601.0, 0.0), 60.0);
        assert_eq!(est.rate_m_per_pct(), 60.0);
    }

    #[test]
    fn test_effective_battery_subtracts_buffer() {
        let proj = RangeProjector::new(5.0);
        assert_eq!(proj.effective_battery(30.0), 25.0);
    }

    #[test]
    fn test_effective_battery_floors_at_zero() {
        let proj = RangeProjector::new(5.0);
        assert_eq!(proj.effective_battery(3.0), 0.0);
        assert_eq!(proj.project(3.0, 60.0), 0.0);
    }

    #[test]
    fn test_projection_monotonic_in_rate_and_battery() {
        let proj = RangeProjector::new(5.0);
        assert!(proj.project(50.0, 70.0) >= proj.project(50.0, 60.0));
        assert!(proj.project(60.0, 60.0) >= proj.project(50.0, 60.0));
    }

    #[test]
    fn test_projection_end_to_end_figures() {
        // 300 m over the first 5% gives 60 m/%; at 30% raw with a 5% buffer
        // that projects 1500 m of remaining range.
        let mut est = ConsumptionEstimator::new(300.0);
        let proj = RangeProjector::new(5.0);
        let rate = est.update(300.0, 5.0);
        assert_eq!(proj.project(30.0, rate), 1500.0);
    }
}
