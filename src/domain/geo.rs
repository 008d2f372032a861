use serde::{Deserialize, Serialize};

const EARTH_RADIUS_METERS: f64 = 6_371_008.8;

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct GeoPoint {
    pub latitude: f64,
    pub longitude: f64,
}

impl GeoPoint {
    pub fn new(latitude: f64, longitude: f64) -> Self {
        Self { latitude, longitude }
    }

    pub fn is_valid(&self) -> bool {
        self.latitude.is_finite()
            && self.longitude.is_finite()
            && (-90.0..=90.0).contains(&self.latitude)
            && (-180.0..=180.0).contains(&self.longitude)
    }

    /// Great-circle distance using the haversine formula.
    pub fn distance_meters(&self, other: &GeoPoint) -> f64 {
        let lat1 = self.latitude.to_radians();
        let lat2 = other.latitude.to_radians();
        let d_lat = (other.latitude - self.latitude).to_radians();
        let d_lng = (other.longitude - self.longitude).to_radians();

        let a = (d_lat / 2.0).sin().powi(2) + lat1.cos() * lat2.cos() * (d_lng / 2.0).sin().powi(2);
        2.0 * EARTH_RADIUS_METERS * a.sqrt().asin()
    }
}

/// Center plus radius filter used by the list endpoints.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct RadiusFilter {
    pub center: GeoPoint,
    pub radius_km: f64,
}

impl RadiusFilter {
    pub fn contains(&self, point: &GeoPoint) -> bool {
        self.center.distance_meters(point) <= self.radius_km * 1000.0
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn distance_between_identical_points_is_zero() {
        let p = GeoPoint::new(-23.55, -46.63);
        assert!(p.distance_meters(&p) < 1e-6);
    }

    #[test]
    fn distance_sao_paulo_to_rio_is_about_360km() {
        let sp = GeoPoint::new(-23.5505, -46.6333);
        let rio = GeoPoint::new(-22.9068, -43.1729);
        let km = sp.distance_meters(&rio) / 1000.0;
        assert!((355.0..=365.0).contains(&km), "got {km}");
    }

    #[test]
    fn validity_rejects_out_of_range_and_nan() {
        assert!(GeoPoint::new(90.0, 180.0).is_valid());
        assert!(!GeoPoint::new(90.1, 0.0).is_valid());
        assert!(!GeoPoint::new(0.0, -180.5).is_valid());
        assert!(!GeoPoint::new(f64::NAN, 0.0).is_valid());
    }

    #[test]
    fn radius_filter_includes_nearby_points_only() {
        let filter = RadiusFilter {
            center: GeoPoint::new(-23.55, -46.63),
            radius_km: 1.0,
        };
        assert!(filter.contains(&GeoPoint::new(-23.551, -46.631)));
        assert!(!filter.contains(&GeoPoint::new(-23.60, -46.63)));
    }
}
