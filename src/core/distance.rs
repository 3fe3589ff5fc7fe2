use crate::models::BoundingBox;

/// Earth's radius in kilometers
pub const EARTH_RADIUS_KM: f64 = 6371.0;

/// Kilometers per degree of latitude, rounded down so boxes err on the large side
const KM_PER_DEGREE: f64 = 111.0;

/// Half of the last reported digit; a point this far past the radius still
/// rounds to within it
pub const DISTANCE_ROUNDING_SLACK_KM: f64 = 0.005;

/// Calculate the Haversine distance between two points in kilometers
///
/// # Arguments
/// * `lat1` - Latitude of first point in degrees
/// * `lon1` - Longitude of first point in degrees
/// * `lat2` - Latitude of second point in degrees
/// * `lon2` - Longitude of second point in degrees
///
/// Coordinates outside the usual ranges are accepted as-is. The result is
/// symmetric in its two points and exactly 0 for identical points.
#[inline]
pub fn haversine_distance(lat1: f64, lon1: f64, lat2: f64, lon2: f64) -> f64 {
    let lat1_rad = lat1.to_radians();
    let lat2_rad = lat2.to_radians();
    // absolute deltas keep the result bit-for-bit symmetric
    let delta_lat = (lat2 - lat1).abs().to_radians();
    let delta_lon = (lon2 - lon1).abs().to_radians();

    let a = (delta_lat / 2.0).sin().powi(2)
        + lat1_rad.cos() * lat2_rad.cos() * (delta_lon / 2.0).sin().powi(2);
    // rounding can push `a` a hair outside [0, 1] for antipodal points
    let a = a.clamp(0.0, 1.0);
    let c = 2.0 * a.sqrt().atan2((1.0 - a).sqrt());

    EARTH_RADIUS_KM * c
}

/// Calculate a bounding box around a center point
///
/// Used as a cheap pre-filter before the exact Haversine check, so it must
/// never exclude a point that lies within `radius_km`.
/// 1° latitude ≈ 111km, 1° longitude ≈ 111km * cos(latitude), taken at
/// the box edge nearest a pole.
///
/// Latitude bounds are clamped to the poles. When the longitude window
/// would wrap across the antimeridian, or the box touches a pole, the
/// longitude bounds cover the whole globe instead.
pub fn calculate_bounding_box(lat: f64, lon: f64, radius_km: f64) -> BoundingBox {
    let lat_delta = radius_km / KM_PER_DEGREE;
    let min_lat = (lat - lat_delta).max(-90.0);
    let max_lat = (lat + lat_delta).min(90.0);

    let touches_pole = min_lat <= -90.0 || max_lat >= 90.0;
    // longitude degrees are narrowest at the poleward edge of the box
    let poleward_lat = min_lat.abs().max(max_lat.abs());
    let lon_delta = radius_km / (KM_PER_DEGREE * poleward_lat.to_radians().cos());

    let (min_lon, max_lon) = if touches_pole
        || !lon_delta.is_finite()
        || lon - lon_delta < -180.0
        || lon + lon_delta > 180.0
    {
        (-180.0, 180.0)
    } else {
        (lon - lon_delta, lon + lon_delta)
    };

    BoundingBox {
        min_lat,
        max_lat,
        min_lon,
        max_lon,
    }
}

/// Check if a point is within a bounding box
#[inline]
pub fn is_within_bounding_box(lat: f64, lon: f64, bbox: &BoundingBox) -> bool {
    lat >= bbox.min_lat && lat <= bbox.max_lat && lon >= bbox.min_lon && lon <= bbox.max_lon
}

/// Round a distance to the two decimal places it is reported with
#[inline]
pub fn round_distance(distance_km: f64) -> f64 {
    (distance_km * 100.0).round() / 100.0
}
