use crate::occupancy::OccupancyResult;
use crate::solar_geometry::{CompassDirection, SolarAssessment};
use crate::types::{round_to, PlacementRecommendation};

/// One-line summary shown to the user.
pub fn placement_message(direction: CompassDirection, tilt_deg: f64) -> String {
    format!(
        "Place panels in largest shadow-free zones facing {} with tilt {:.1}°!",
        direction, tilt_deg
    )
}

/// Assembles the final payload. Pure field copying and formatting.
pub fn recommend(
    occupancy: &OccupancyResult,
    solar: &SolarAssessment,
    latitude: f64,
    longitude: f64,
) -> PlacementRecommendation {
    let orientation = &solar.orientation;

    PlacementRecommendation {
        free_area_percent: occupancy.free_area_percent,
        sun_altitude: round_to(solar.position.altitude_deg, 2),
        sun_azimuth: round_to(solar.position.azimuth_deg, 2),
        tilt_deg: orientation.tilt_deg,
        orientation_deg: orientation.orientation_deg,
        orientation_dir: orientation.orientation_dir,
        latitude,
        longitude,
        message: placement_message(orientation.orientation_dir, orientation.tilt_deg),
    }
}
