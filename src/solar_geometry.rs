//! Placement policy on top of the sun position: which compass direction the
//! panels face and how steeply they are tilted.

use crate::sun_position::SolarEphemeris;
use crate::types::{round_to, GeoMoment, PlacementError, SolarPosition};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum CompassDirection {
    North,
    Northeast,
    East,
    Southeast,
    South,
    Southwest,
    West,
    Northwest,
}

impl CompassDirection {
    pub fn as_str(&self) -> &'static str {
        match self {
            CompassDirection::North => "North",
            CompassDirection::Northeast => "Northeast",
            CompassDirection::East => "East",
            CompassDirection::Southeast => "Southeast",
            CompassDirection::South => "South",
            CompassDirection::Southwest => "Southwest",
            CompassDirection::West => "West",
            CompassDirection::Northwest => "Northwest",
        }
    }
}

impl fmt::Display for CompassDirection {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Anchor bearings in ascending order; 360 closes the circle back to North.
const ANCHORS: [(f64, CompassDirection); 9] = [
    (0.0, CompassDirection::North),
    (45.0, CompassDirection::Northeast),
    (90.0, CompassDirection::East),
    (135.0, CompassDirection::Southeast),
    (180.0, CompassDirection::South),
    (225.0, CompassDirection::Southwest),
    (270.0, CompassDirection::West),
    (315.0, CompassDirection::Northwest),
    (360.0, CompassDirection::North),
];

/// Nearest anchor by absolute angular difference; on an exact tie the lower
/// anchor wins (22.5 is North).
///
/// The input is not reduced modulo 360: values outside [0, 360] still pick
/// the nearest literal anchor, so -30 maps to North and 500 to North.
pub fn azimuth_to_direction(azimuth_deg: f64) -> CompassDirection {
    let mut best = ANCHORS[0];
    for anchor in &ANCHORS[1..] {
        if (azimuth_deg - anchor.0).abs() < (azimuth_deg - best.0).abs() {
            best = *anchor;
        }
    }
    best.1
}

/// Tilt heuristic: with the sun above 45 degrees use 70% of the latitude,
/// floored at 10 degrees; otherwise tilt equals the latitude. Both rounded to
/// one decimal.
pub fn suggested_tilt(latitude: f64, altitude_deg: f64) -> f64 {
    if altitude_deg > 45.0 {
        round_to(latitude * 0.7, 1).max(10.0)
    } else {
        round_to(latitude, 1)
    }
}

/// How the panels should be mounted.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct PanelOrientation {
    pub tilt_deg: f64,
    pub orientation_deg: f64,
    pub orientation_dir: CompassDirection,
}

pub fn orient(latitude: f64, position: &SolarPosition) -> PanelOrientation {
    let orientation_deg = round_to(position.azimuth_deg, 2);
    PanelOrientation {
        tilt_deg: suggested_tilt(latitude, position.altitude_deg),
        orientation_deg,
        orientation_dir: azimuth_to_direction(orientation_deg),
    }
}

/// Validates the coordinates, then asks `ephemeris` where the sun is.
/// Negative altitudes (night) are returned unchanged.
pub fn solar_position(
    latitude: f64,
    longitude: f64,
    instant: DateTime<Utc>,
    ephemeris: &dyn SolarEphemeris,
) -> Result<SolarPosition, PlacementError> {
    let moment = GeoMoment::new(latitude, longitude, Some(instant))?;
    ephemeris.position(&moment)
}

/// Sun position plus the orientation derived from it.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct SolarAssessment {
    pub position: SolarPosition,
    pub orientation: PanelOrientation,
}

pub fn assess(
    moment: &GeoMoment,
    ephemeris: &dyn SolarEphemeris,
) -> Result<SolarAssessment, PlacementError> {
    let position = ephemeris.position(moment)?;
    Ok(SolarAssessment {
        position,
        orientation: orient(moment.latitude(), &position),
    })
}
