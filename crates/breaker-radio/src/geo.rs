//! Great-circle distance between two coordinates.

use breaker_types::models::Coordinate;

/// Mean earth radius in kilometers (IUGG).
const EARTH_RADIUS_KM: f64 = 6371.0088;

/// Haversine distance between two lat/lon pairs, in kilometers.
///
/// Spherical-earth model, sub-meter accurate at the ranges the propagation
/// model cares about (up to a few hundred kilometers). Pure and total.
/// Coordinates are not range-validated here; callers discard nonsensical
/// values upstream.
pub fn distance_km(a: Coordinate, b: Coordinate) -> f64 {
    let lat_a = a.lat.to_radians();
    let lat_b = b.lat.to_radians();
    let d_lat = (b.lat - a.lat).to_radians();
    let d_lon = (b.lon - a.lon).to_radians();

    let h = (d_lat / 2.0).sin().powi(2)
        + lat_a.cos() * lat_b.cos() * (d_lon / 2.0).sin().powi(2);

    2.0 * EARTH_RADIUS_KM * h.sqrt().asin()
}

#[cfg(test)]
mod tests {
    use super::*;

    fn coord(lat: f64, lon: f64) -> Coordinate {
        Coordinate::new(lat, lon)
    }

    #[test]
    fn zero_distance_for_identical_points() {
        let p = coord(48.8566, 2.3522);
        assert_eq!(distance_km(p, p), 0.0);
    }

    #[test]
    fn one_degree_of_latitude_at_equator() {
        // 1° of latitude is ~111.195 km on the spherical model.
        let d = distance_km(coord(0.0, 0.0), coord(1.0, 0.0));
        assert!((d - 111.195).abs() < 0.01, "got {d}");
    }

    #[test]
    fn paris_to_london() {
        // Notre-Dame to Westminster, ~342.9 km great-circle.
        let d = distance_km(coord(48.8530, 2.3499), coord(51.4994, -0.1245));
        assert!((d - 342.9).abs() < 1.0, "got {d}");
    }

    #[test]
    fn symmetric() {
        let a = coord(59.3293, 18.0686);
        let b = coord(55.6761, 12.5683);
        let ab = distance_km(a, b);
        let ba = distance_km(b, a);
        assert!((ab - ba).abs() < 1e-9);
    }

    #[test]
    fn short_range_is_stable_to_sub_meter() {
        // Two points ~2.9 km apart along a meridian. The threshold checks in
        // the proximity filter depend on this not flapping.
        let a = coord(52.0, 13.0);
        let b = coord(52.0 + 2.9 / 111.195, 13.0);
        let d = distance_km(a, b);
        assert!((d - 2.9).abs() < 0.001, "got {d}");
    }
}
