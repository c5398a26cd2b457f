//! Great-circle helpers on the WGS84 sphere approximation.
//!
//! Thin wrappers over the `geo` haversine algorithms that speak in
//! latitude/longitude order and compass bearings (`[0, 360)` degrees), which
//! is what the wire format and the waypoint model use.

use geo::{HaversineBearing, HaversineDestination, HaversineDistance, Point};
use serde::{Deserialize, Serialize};

/// A latitude/longitude pair in decimal degrees.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct GeoPoint {
    pub lat: f64,
    pub lon: f64,
}

impl GeoPoint {
    pub fn new(lat: f64, lon: f64) -> Self {
        Self { lat, lon }
    }

    fn to_geo(self) -> Point<f64> {
        // geo points are (x = lon, y = lat)
        Point::new(self.lon, self.lat)
    }

    fn from_geo(point: Point<f64>) -> Self {
        Self::new(point.y(), point.x())
    }
}

/// Great-circle distance in meters.
pub fn distance(p1: GeoPoint, p2: GeoPoint) -> f64 {
    p1.to_geo().haversine_distance(&p2.to_geo())
}

/// Initial bearing from `p1` toward `p2`, in degrees `[0, 360)`.
pub fn bearing(p1: GeoPoint, p2: GeoPoint) -> f64 {
    normalize_bearing(p1.to_geo().haversine_bearing(p2.to_geo()))
}

/// The point reached from `origin` after `distance_m` meters on `bearing_deg`.
pub fn destination(origin: GeoPoint, bearing_deg: f64, distance_m: f64) -> GeoPoint {
    GeoPoint::from_geo(origin.to_geo().haversine_destination(bearing_deg, distance_m))
}

/// Maps any angle in degrees onto `[0, 360)`.
pub fn normalize_bearing(degrees: f64) -> f64 {
    let wrapped = degrees.rem_euclid(360.0);
    // rem_euclid can round up to exactly 360 for tiny negative inputs
    if wrapped >= 360.0 {
        0.0
    } else {
        wrapped
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_relative_eq;
    use proptest::prelude::*;

    #[test]
    fn test_distance_one_degree_latitude() {
        let a = GeoPoint::new(39.0, -94.5);
        let b = GeoPoint::new(40.0, -94.5);

        // One degree of arc on the mean-radius sphere
        assert_relative_eq!(distance(a, b), 111_195.0, max_relative = 1e-3);
        assert_relative_eq!(distance(a, a), 0.0);
    }

    #[test]
    fn test_bearing_cardinal_directions() {
        let origin = GeoPoint::new(39.1, -94.5);

        assert_relative_eq!(bearing(origin, GeoPoint::new(39.2, -94.5)), 0.0, epsilon = 1e-9);
        assert_relative_eq!(bearing(origin, GeoPoint::new(39.0, -94.5)), 180.0, epsilon = 1e-9);
        assert_relative_eq!(bearing(origin, GeoPoint::new(39.1, -94.4)), 90.0, epsilon = 0.1);
        assert_relative_eq!(bearing(origin, GeoPoint::new(39.1, -94.6)), 270.0, epsilon = 0.1);
    }

    #[test]
    fn test_normalize_bearing() {
        assert_eq!(normalize_bearing(-90.0), 270.0);
        assert_eq!(normalize_bearing(360.0), 0.0);
        assert_eq!(normalize_bearing(725.0), 5.0);
        assert!(normalize_bearing(-1e-18) < 360.0);
    }

    #[test]
    fn test_destination_due_east() {
        let origin = GeoPoint::new(0.0, 0.0);
        let dest = destination(origin, 90.0, 1_000.0);

        assert_relative_eq!(dest.lat, 0.0, epsilon = 1e-9);
        assert!(dest.lon > 0.0);
        assert_relative_eq!(distance(origin, dest), 1_000.0, max_relative = 1e-9);
    }

    proptest! {
        #[test]
        fn prop_destination_inverts_distance_and_bearing(
            lat in -60.0f64..60.0,
            lon in -179.0f64..179.0,
            heading in 0.0f64..360.0,
            meters in 1.0f64..5_000.0,
        ) {
            let origin = GeoPoint::new(lat, lon);
            let dest = destination(origin, heading, meters);

            prop_assert!((distance(origin, dest) - meters).abs() < 1e-3);

            let back = bearing(origin, dest);
            let diff = (back - heading).abs();
            prop_assert!(diff.min(360.0 - diff) < 1e-3);
        }
    }
}
