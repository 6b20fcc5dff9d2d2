//! Spherical Earth helpers: great-circle distances and cell areas.
//! All operations use f64 precision.

use crate::coords::LatLon;

/// Mean radius of Earth in metres (IUGG, GRS80 derived constant).
pub const MEAN_EARTH_RADIUS_M: f64 = 6_371_008.8;

/// Radius of the sphere with the same surface area as the WGS84 ellipsoid.
/// Used for all area computations in geographic coordinates.
pub const AUTHALIC_RADIUS_M: f64 = 6_371_007.2;

/// Great-circle distance in metres (haversine form, stable at short range).
pub fn haversine_m(a: LatLon, b: LatLon) -> f64 {
    let (lat1, lon1) = a.to_radians();
    let (lat2, lon2) = b.to_radians();
    let dlat = lat2 - lat1;
    let dlon = lon2 - lon1;
    let h = (dlat / 2.0).sin().powi(2) + lat1.cos() * lat2.cos() * (dlon / 2.0).sin().powi(2);
    2.0 * MEAN_EARTH_RADIUS_M * h.sqrt().clamp(0.0, 1.0).asin()
}

/// Great-circle distance in kilometres.
pub fn haversine_km(a: LatLon, b: LatLon) -> f64 {
    haversine_m(a, b) / 1000.0
}

/// Area (m²) of the spherical quadrangle bounded by two parallels and two meridians.
///
/// A = R² · Δλ · (sin φ_north − sin φ_south)
pub fn lat_lon_cell_area_m2(south_deg: f64, north_deg: f64, west_deg: f64, east_deg: f64) -> f64 {
    let dlon = (east_deg - west_deg).to_radians();
    let band = north_deg.to_radians().sin() - south_deg.to_radians().sin();
    AUTHALIC_RADIUS_M * AUTHALIC_RADIUS_M * dlon * band
}
