use serde::{Deserialize, Serialize};

/// Meters per degree of latitude (or of longitude at the equator).
const DEG_TO_M: f64 = 1.113195e5;

const EARTH_RADIUS_M: f64 = 6_378_137.0;

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Position {
    pub lat: f64,
    pub lon: f64,
    /// Altitude above the launch point, meters.
    pub alt_m: f64,
}

// ----- Geometry -----

/// Planar approximate ground distance between two points, meters.
///
/// `sqrt(dlat^2 + dlon^2)` in degrees, scaled to meters. Ignores longitude
/// shrinkage with latitude and earth curvature; good to about 1% over
/// sub-kilometer separations at mid latitudes. All range accounting is
/// calibrated against this exact formula, so it must not be swapped for a
/// geodesic one.
pub fn ground_distance(a: Position, b: Position) -> f64 {
    let dlat = b.lat - a.lat;
    let dlon = b.lon - a.lon;
    (dlat * dlat + dlon * dlon).sqrt() * DEG_TO_M
}

/// Offsets `origin` by the given meters north and east, keeping altitude.
///
/// Spherical-earth approximation with the longitude step widened by the
/// latitude cosine. Not meant for legs beyond a few kilometers.
pub fn offset_position(origin: Position, north_m: f64, east_m: f64) -> Position {
    let dlat = north_m / EARTH_RADIUS_M;
    let dlon = east_m / (EARTH_RADIUS_M * origin.lat.to_radians().cos());
    Position {
        lat: origin.lat + dlat.to_degrees(),
        lon: origin.lon + dlon.to_degrees(),
        alt_m: origin.alt_m,
    }
}
