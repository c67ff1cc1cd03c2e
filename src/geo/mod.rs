use crate::models::driver::GeoPoint;

const EARTH_RADIUS_KM: f64 = 6_371.0;
const METERS_PER_DEGREE_LAT: f64 = 111_195.0;

pub fn haversine_km(a: &GeoPoint, b: &GeoPoint) -> f64 {
    let lat1 = a.lat.to_radians();
    let lat2 = b.lat.to_radians();
    let delta_lat = (b.lat - a.lat).to_radians();
    let delta_lng = (b.lng - a.lng).to_radians();

    let sin_lat = (delta_lat / 2.0).sin();
    let sin_lng = (delta_lng / 2.0).sin();

    let haversine = sin_lat * sin_lat + lat1.cos() * lat2.cos() * sin_lng * sin_lng;
    let central_angle = 2.0 * haversine.min(1.0).sqrt().asin();

    EARTH_RADIUS_KM * central_angle
}

/// Absolute north-south and east-west displacement in meters, using an
/// equirectangular approximation around the mean latitude. Only meant for
/// short hops between consecutive samples.
pub fn axis_offsets_m(a: &GeoPoint, b: &GeoPoint) -> (f64, f64) {
    let mean_lat = ((a.lat + b.lat) / 2.0).to_radians();
    let north = (b.lat - a.lat).abs() * METERS_PER_DEGREE_LAT;
    let east = (b.lng - a.lng).abs() * METERS_PER_DEGREE_LAT * mean_lat.cos();
    (north, east)
}
