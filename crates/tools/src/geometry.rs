//! Spherical geometry shared by the measurement tools.

use fieldagent_core::context::Coordinate;
use fieldagent_core::error::ToolError;
use serde::Serialize;

/// WGS84 equatorial radius, as used by GeoJSON area calculations.
pub const EARTH_RADIUS_M: f64 = 6_378_137.0;

/// Mean earth radius for great-circle distances.
pub const MEAN_EARTH_RADIUS_M: f64 = 6_371_008.8;

pub const SQ_M_TO_SQ_KM: f64 = 1e-6;
pub const SQ_M_TO_ACRES: f64 = 0.000_247_105;
pub const SQ_M_TO_SQ_MILES: f64 = 3.861_02e-7;
pub const M_TO_MILES: f64 = 0.000_621_371;

/// An area expressed in every unit the tools report.
#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
pub struct AreaMeasurement {
    pub square_meters: f64,
    pub square_kilometers: f64,
    pub acres: f64,
    pub square_miles: f64,
}

impl AreaMeasurement {
    pub fn from_square_meters(square_meters: f64) -> Self {
        Self {
            square_meters,
            square_kilometers: square_meters * SQ_M_TO_SQ_KM,
            acres: square_meters * SQ_M_TO_ACRES,
            square_miles: square_meters * SQ_M_TO_SQ_MILES,
        }
    }
}

/// Area of a simple polygon on a sphere, in square metres.
///
/// Sums `(lng2 - lng1) * (2 + sin(lat1) + sin(lat2))` over successive vertex
/// pairs (wrapping back to the first vertex), scales by `R² / 2` and takes
/// the absolute value so winding order does not matter.
pub fn polygon_area(ring: &[Coordinate]) -> Result<f64, ToolError> {
    if ring.len() < 3 {
        return Err(ToolError::InvalidArguments(format!(
            "at least 3 coordinates are required to compute an area, got {}",
            ring.len()
        )));
    }

    let total: f64 = ring
        .iter()
        .zip(ring.iter().cycle().skip(1))
        .map(|(p1, p2)| {
            (p2.lng - p1.lng).to_radians()
                * (2.0 + p1.lat.to_radians().sin() + p2.lat.to_radians().sin())
        })
        .sum();

    Ok((total * EARTH_RADIUS_M * EARTH_RADIUS_M / 2.0).abs())
}

/// Great-circle distance between two points, in metres.
pub fn haversine_distance(a: Coordinate, b: Coordinate) -> f64 {
    let d_lat = (b.lat - a.lat).to_radians();
    let d_lng = (b.lng - a.lng).to_radians();
    let h = (d_lat / 2.0).sin().powi(2)
        + a.lat.to_radians().cos() * b.lat.to_radians().cos() * (d_lng / 2.0).sin().powi(2);
    2.0 * MEAN_EARTH_RADIUS_M * h.sqrt().asin()
}

/// Length of a path through `points`, optionally closed back to the start.
pub fn path_length(points: &[Coordinate], closed: bool) -> f64 {
    let open: f64 = points
        .windows(2)
        .map(|w| haversine_distance(w[0], w[1]))
        .sum();
    match (closed, points.first(), points.last()) {
        (true, Some(first), Some(last)) if points.len() > 2 => open + haversine_distance(*last, *first),
        _ => open,
    }
}

/// Parse and validate a JSON array of `{lat, lng}` objects.
pub fn parse_coordinates(value: &serde_json::Value) -> Result<Vec<Coordinate>, ToolError> {
    let coords: Vec<Coordinate> = serde_json::from_value(value.clone()).map_err(|e| {
        ToolError::InvalidArguments(format!("coordinates must be a list of {{lat, lng}}: {e}"))
    })?;
    validate_coordinates(coords)
}

/// Reject non-finite or out-of-range points, naming the first offender.
pub fn validate_coordinates(coords: Vec<Coordinate>) -> Result<Vec<Coordinate>, ToolError> {
    if let Some(bad) = coords.iter().position(|c| !c.is_valid()) {
        return Err(ToolError::InvalidArguments(format!(
            "coordinate #{} is out of range: lat must be within ±90, lng within ±180",
            bad + 1
        )));
    }
    Ok(coords)
}

/// Drop a repeated closing vertex from a ring written GeoJSON-style.
pub fn open_ring(mut ring: Vec<Coordinate>) -> Vec<Coordinate> {
    if ring.len() > 3 && ring.first() == ring.last() {
        ring.pop();
    }
    ring
}
