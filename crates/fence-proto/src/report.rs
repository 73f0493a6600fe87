use serde::{Deserialize, Serialize};

/// Outcome summary written after every completed flight.
///
/// Field names are the historical report keys; downstream tooling matches
/// on them, so they stay spelled exactly like this.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct FlightReport {
    #[serde(rename = "Test for")]
    pub case_name: String,
    #[serde(rename = "Remaining battery")]
    pub remaining_battery: f64,
    #[serde(rename = "Traveled distance")]
    pub traveled_distance: f64,
    #[serde(rename = "Crashed")]
    pub crashed: bool,
    #[serde(rename = "Remaining battery unit")]
    pub remaining_battery_unit: String,
    #[serde(rename = "Traveled distance unit")]
    pub traveled_distance_unit: String,
}

impl FlightReport {
    pub fn new(
        case_name: impl Into<String>,
        remaining_battery_pct: f64,
        traveled_distance_m: f64,
        crashed: bool,
    ) -> Self {
        Self {
            case_name: case_name.into(),
            remaining_battery: remaining_battery_pct,
            traveled_distance: traveled_distance_m,
            crashed,
            remaining_battery_unit: "%".to_string(),
            traveled_distance_unit: "m".to_string(),
        }
    }
}
