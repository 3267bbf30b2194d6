/// Geofence math for physical check-in/out.
///
/// A configured radius above this cap is clamped; a post with no radius
/// gets the cap as its default.
pub const MAX_GEOFENCE_RADIUS_M: f64 = 1000.0;

/// Great-circle distance between two coordinates in meters (haversine).
pub fn haversine_distance_m(lat1: f64, lng1: f64, lat2: f64, lng2: f64) -> f64 {
    let r = 6371.0; // Earth's radius in km
    let d_lat = (lat2 - lat1).to_radians();
    let d_lng = (lng2 - lng1).to_radians();
    let a = (d_lat / 2.0).sin().powi(2)
        + lat1.to_radians().cos() * lat2.to_radians().cos() * (d_lng / 2.0).sin().powi(2);
    let c = 2.0 * a.sqrt().atan2((1.0 - a).sqrt());
    r * c * 1000.0
}

/// Allowed distance from the job site: the (capped) configured radius,
/// inflated by the device's reported accuracy.
pub fn geofence_allowance_m(configured_radius_m: Option<i32>, accuracy_m: f64) -> f64 {
    let radius = configured_radius_m
        .map(|r| r as f64)
        .unwrap_or(MAX_GEOFENCE_RADIUS_M)
        .min(MAX_GEOFENCE_RADIUS_M);
    radius + accuracy_m.max(0.0)
}

/// Ok(distance) when the sample falls inside the allowance, otherwise the
/// rounded (distance, allowance) pair for the caller's violation report.
pub fn check_geofence(
    site_lat: f64,
    site_lng: f64,
    sample_lat: f64,
    sample_lng: f64,
    configured_radius_m: Option<i32>,
    accuracy_m: f64,
) -> Result<f64, (i64, i64)> {
    let distance = haversine_distance_m(site_lat, site_lng, sample_lat, sample_lng);
    let allowance = geofence_allowance_m(configured_radius_m, accuracy_m);
    if distance <= allowance {
        Ok(distance)
    } else {
        Err((distance.round() as i64, allowance.round() as i64))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_haversine_zero_distance() {
        assert_eq!(haversine_distance_m(6.5244, 3.3792, 6.5244, 3.3792), 0.0);
    }

    #[test]
    fn test_haversine_known_distance() {
        // 0.009 degrees of latitude at the equator is just over 1km.
        let d = haversine_distance_m(0.0, 0.0, 0.009, 0.0);
        assert!((d - 1000.75).abs() < 2.0, "got {}", d);
    }

    #[test]
    fn test_allowance_uses_configured_radius() {
        assert_eq!(geofence_allowance_m(Some(500), 10.0), 510.0);
        assert_eq!(geofence_allowance_m(Some(250), 0.0), 250.0);
    }

    #[test]
    fn test_allowance_caps_radius() {
        assert_eq!(geofence_allowance_m(Some(5000), 10.0), 1010.0);
        assert_eq!(geofence_allowance_m(None, 25.0), 1025.0);
    }

    #[test]
    fn test_check_geofence_rejects_far_sample() {
        // ~1200m north of the site, 500m radius, 10m accuracy -> 510 allowance.
        let result = check_geofence(0.0, 0.0, 0.01078, 0.0, Some(500), 10.0);
        let (distance, allowance) = result.unwrap_err();
        assert_eq!(allowance, 510);
        assert!((1195..=1205).contains(&distance), "got {}", distance);
    }

    #[test]
    fn test_check_geofence_accepts_nearby_sample() {
        // ~100m away with a 500m radius.
        let result = check_geofence(0.0, 0.0, 0.0009, 0.0, Some(500), 10.0);
        assert!(result.is_ok());
    }

    #[test]
    fn test_accuracy_inflates_allowance() {
        // 520m away: outside the bare 500m radius, inside once the 30m
        // accuracy is added.
        let sample_lat = 0.004673; // ~520m
        assert!(check_geofence(0.0, 0.0, sample_lat, 0.0, Some(500), 0.0).is_err());
        assert!(check_geofence(0.0, 0.0, sample_lat, 0.0, Some(500), 30.0).is_ok());
    }
}
