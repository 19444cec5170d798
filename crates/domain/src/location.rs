//! Geographic coordinates.

use serde::{Deserialize, Serialize};

use crate::DomainError;

/// Mean Earth radius used for great-circle distances, in meters.
pub const EARTH_RADIUS_METERS: f64 = 6_371_000.0;

/// A WGS84 latitude/longitude pair in decimal degrees.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Location {
    pub lat: f64,
    pub lng: f64,
}

impl Location {
    pub fn new(lat: f64, lng: f64) -> Self {
        Self { lat, lng }
    }

    /// Creates a location after checking both coordinates are in range.
    pub fn try_new(lat: f64, lng: f64) -> Result<Self, DomainError> {
        let loc = Self::new(lat, lng);
        loc.validate()?;
        Ok(loc)
    }

    /// Checks latitude is within [-90, 90] and longitude within [-180, 180].
    ///
    /// NaN fails both range checks.
    pub fn validate(&self) -> Result<(), DomainError> {
        if !(-90.0..=90.0).contains(&self.lat) {
            return Err(DomainError::LatitudeOutOfRange(self.lat));
        }
        if !(-180.0..=180.0).contains(&self.lng) {
            return Err(DomainError::LongitudeOutOfRange(self.lng));
        }
        Ok(())
    }

    /// Great-circle (haversine) distance to `other`, in meters.
    pub fn haversine_meters(&self, other: &Location) -> f64 {
        let lat1 = self.lat.to_radians();
        let lat2 = other.lat.to_radians();
        let d_lat = (other.lat - self.lat).to_radians();
        let d_lng = (other.lng - self.lng).to_radians();

        let sin_lat = (d_lat / 2.0).sin();
        let sin_lng = (d_lng / 2.0).sin();

        let h = sin_lat * sin_lat + lat1.cos() * lat2.cos() * sin_lng * sin_lng;
        2.0 * EARTH_RADIUS_METERS * h.sqrt().min(1.0).asin()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn accepts_boundary_coordinates() {
        assert!(Location::new(90.0, 180.0).validate().is_ok());
        assert!(Location::new(-90.0, -180.0).validate().is_ok());
        assert!(Location::new(0.0, 0.0).validate().is_ok());
    }

    #[test]
    fn rejects_out_of_range_latitude() {
        assert_eq!(
            Location::new(90.5, 0.0).validate(),
            Err(DomainError::LatitudeOutOfRange(90.5))
        );
        assert!(Location::new(-91.0, 0.0).validate().is_err());
    }

    #[test]
    fn rejects_out_of_range_longitude() {
        assert_eq!(
            Location::try_new(10.0, 181.0),
            Err(DomainError::LongitudeOutOfRange(181.0))
        );
    }

    #[test]
    fn rejects_nan() {
        assert!(Location::new(f64::NAN, 0.0).validate().is_err());
        assert!(Location::new(0.0, f64::NAN).validate().is_err());
    }

    #[test]
    fn haversine_zero_for_same_point() {
        let p = Location::new(24.7136, 46.6753);
        assert_eq!(p.haversine_meters(&p), 0.0);
    }

    #[test]
    fn haversine_one_degree_of_latitude() {
        let a = Location::new(0.0, 0.0);
        let b = Location::new(1.0, 0.0);
        let d = a.haversine_meters(&b);
        // One degree of arc on a 6371 km sphere.
        assert!((d - 111_194.9).abs() < 1.0, "got {d}");
    }

    #[test]
    fn haversine_is_symmetric() {
        let a = Location::new(24.7136, 46.6753);
        let b = Location::new(24.7743, 46.7386);
        assert!((a.haversine_meters(&b) - b.haversine_meters(&a)).abs() < 1e-6);
    }
}
