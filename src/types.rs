use chrono::{DateTime, NaiveDateTime, TimeZone, Utc};
use chrono_tz::Tz;
use geo_types::Point;
use serde::{Deserialize, Serialize};
use std::fmt;

use crate::solar_geometry::CompassDirection;

/// Obstacle classes the detectors are trained on.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ObstacleLabel {
    Pole,
    Tank,
    Roof,
    Tree,
}

impl ObstacleLabel {
    pub const ALL: [ObstacleLabel; 4] = [
        ObstacleLabel::Pole,
        ObstacleLabel::Tank,
        ObstacleLabel::Roof,
        ObstacleLabel::Tree,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            ObstacleLabel::Pole => "pole",
            ObstacleLabel::Tank => "tank",
            ObstacleLabel::Roof => "roof",
            ObstacleLabel::Tree => "tree",
        }
    }
}

impl fmt::Display for ObstacleLabel {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Axis-aligned pixel rectangle `(x1, y1, x2, y2)`.
///
/// Coordinates sit on pixel boundaries: the box covers every pixel `(x, y)`
/// with `x1 <= x < x2` and `y1 <= y < y2`, so `(0, 0, W, H)` is the whole image.
/// Serialized as a 4-element array.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(from = "[i64; 4]", into = "[i64; 4]")]
pub struct BoundingBox {
    pub x1: i64,
    pub y1: i64,
    pub x2: i64,
    pub y2: i64,
}

impl BoundingBox {
    pub fn new(x1: i64, y1: i64, x2: i64, y2: i64) -> Self {
        Self { x1, y1, x2, y2 }
    }

    pub fn is_degenerate(&self) -> bool {
        self.x1 >= self.x2 || self.y1 >= self.y2
    }
}

impl From<[i64; 4]> for BoundingBox {
    fn from(c: [i64; 4]) -> Self {
        Self::new(c[0], c[1], c[2], c[3])
    }
}

impl From<BoundingBox> for [i64; 4] {
    fn from(b: BoundingBox) -> Self {
        [b.x1, b.y1, b.x2, b.y2]
    }
}

/// One obstruction reported by a detector.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Detection {
    pub label: ObstacleLabel,
    pub confidence: f64,
    pub bbox: BoundingBox,
}

impl Detection {
    pub fn new(
        label: ObstacleLabel,
        confidence: f64,
        bbox: BoundingBox,
    ) -> Result<Self, PlacementError> {
        let detection = Self {
            label,
            confidence,
            bbox,
        };
        detection.validate()?;
        Ok(detection)
    }

    /// Checks the confidence range and that the box is non-degenerate.
    /// Image bounds are checked by the rasterizer, which knows the dimensions.
    pub fn validate(&self) -> Result<(), PlacementError> {
        if !(0.0..=1.0).contains(&self.confidence) {
            return Err(PlacementError::InvalidConfidence(self.confidence));
        }
        if self.bbox.is_degenerate() {
            return Err(PlacementError::InvalidBoundingBox {
                bbox: self.bbox,
                reason: "degenerate rectangle (requires x1 < x2 and y1 < y2)".to_string(),
            });
        }
        Ok(())
    }
}

/// A place on Earth and the instant the sun is evaluated at.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(try_from = "GeoMomentRepr", into = "GeoMomentRepr")]
pub struct GeoMoment {
    /// x = longitude, y = latitude
    location: Point<f64>,
    instant: DateTime<Utc>,
}

/// Wire form of [`GeoMoment`]; deserializing goes through [`GeoMoment::new`].
#[derive(Serialize, Deserialize)]
struct GeoMomentRepr {
    latitude: f64,
    longitude: f64,
    instant: DateTime<Utc>,
}

impl TryFrom<GeoMomentRepr> for GeoMoment {
    type Error = PlacementError;

    fn try_from(repr: GeoMomentRepr) -> Result<Self, Self::Error> {
        GeoMoment::new(repr.latitude, repr.longitude, Some(repr.instant))
    }
}

impl From<GeoMoment> for GeoMomentRepr {
    fn from(moment: GeoMoment) -> Self {
        GeoMomentRepr {
            latitude: moment.latitude(),
            longitude: moment.longitude(),
            instant: moment.instant,
        }
    }
}

impl GeoMoment {
    /// Validates coordinates; `instant = None` means now.
    pub fn new(
        latitude: f64,
        longitude: f64,
        instant: Option<DateTime<Utc>>,
    ) -> Result<Self, PlacementError> {
        if !latitude.is_finite() || !(-90.0..=90.0).contains(&latitude) {
            return Err(PlacementError::LatitudeOutOfRange(latitude));
        }
        if !longitude.is_finite() || !(-180.0..=180.0).contains(&longitude) {
            return Err(PlacementError::LongitudeOutOfRange(longitude));
        }

        Ok(Self {
            location: Point::new(longitude, latitude),
            instant: instant.unwrap_or_else(Utc::now),
        })
    }

    /// Builds a moment from loosely typed request fields. Coordinates are
    /// required; the timestamp is parsed with [`parse_instant`].
    pub fn from_parts(
        latitude: Option<f64>,
        longitude: Option<f64>,
        time: Option<&str>,
        default_tz: Tz,
    ) -> Result<Self, PlacementError> {
        let latitude = latitude.ok_or_else(|| PlacementError::MissingField("latitude".into()))?;
        let longitude =
            longitude.ok_or_else(|| PlacementError::MissingField("longitude".into()))?;
        let instant = parse_instant(time, default_tz)?;
        Self::new(latitude, longitude, Some(instant))
    }

    pub fn latitude(&self) -> f64 {
        self.location.y()
    }

    pub fn longitude(&self) -> f64 {
        self.location.x()
    }

    pub fn location(&self) -> Point<f64> {
        self.location
    }

    pub fn instant(&self) -> DateTime<Utc> {
        self.instant
    }
}

const NAIVE_FORMATS: [&str; 4] = [
    "%Y-%m-%dT%H:%M:%S%.f",
    "%Y-%m-%dT%H:%M",
    "%Y-%m-%d %H:%M:%S%.f",
    "%Y-%m-%d %H:%M",
];

/// Parses a request timestamp into UTC.
///
/// RFC 3339 strings keep their offset. Naive timestamps are read as wall-clock
/// time in `default_tz`. A missing or blank value means now.
pub fn parse_instant(raw: Option<&str>, default_tz: Tz) -> Result<DateTime<Utc>, PlacementError> {
    let raw = match raw.map(str::trim) {
        None | Some("") => return Ok(Utc::now()),
        Some(raw) => raw,
    };

    if let Ok(dt) = DateTime::parse_from_rfc3339(raw) {
        return Ok(dt.with_timezone(&Utc));
    }
    // Offset without seconds, e.g. 2024-06-21T12:00+05:30
    if let Ok(dt) = DateTime::parse_from_str(raw, "%Y-%m-%dT%H:%M%:z") {
        return Ok(dt.with_timezone(&Utc));
    }

    let naive = NAIVE_FORMATS
        .iter()
        .find_map(|fmt| NaiveDateTime::parse_from_str(raw, fmt).ok())
        .ok_or_else(|| PlacementError::InvalidTimestamp(raw.to_string()))?;

    default_tz
        .from_local_datetime(&naive)
        .earliest()
        .map(|dt| dt.with_timezone(&Utc))
        .ok_or_else(|| {
            PlacementError::InvalidTimestamp(format!(
                "{} does not exist in {}",
                raw,
                default_tz.name()
            ))
        })
}

/// Sun position in degrees. Azimuth is clockwise from north, in [0, 360).
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct SolarPosition {
    pub altitude_deg: f64,
    pub azimuth_deg: f64,
}

impl SolarPosition {
    pub fn is_above_horizon(&self) -> bool {
        self.altitude_deg > 0.0
    }
}

/// Final per-request payload.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PlacementRecommendation {
    pub free_area_percent: f64,
    pub sun_altitude: f64,
    pub sun_azimuth: f64,
    pub tilt_deg: f64,
    pub orientation_deg: f64,
    pub orientation_dir: CompassDirection,
    pub latitude: f64,
    pub longitude: f64,
    pub message: String,
}

/// Rounds to `digits` decimals on the exact binary value, ties to even.
///
/// Fixed-precision formatting works from the full binary expansion, so
/// 88.5 * 0.7 (stored just below 61.95) gives 61.9 rather than 62.0.
pub fn round_to(value: f64, digits: usize) -> f64 {
    if !value.is_finite() {
        return value;
    }
    format!("{:.*}", digits, value).parse().unwrap_or(value)
}

#[derive(Debug, thiserror::Error)]
pub enum PlacementError {
    #[error("Invalid image dimensions {width}x{height}: {reason}")]
    InvalidDimensions {
        width: u32,
        height: u32,
        reason: &'static str,
    },
    #[error("Invalid bounding box {bbox:?}: {reason}")]
    InvalidBoundingBox { bbox: BoundingBox, reason: String },
    #[error("Invalid confidence {0}: must lie in [0, 1]")]
    InvalidConfidence(f64),
    #[error("Latitude {0} outside [-90, 90]")]
    LatitudeOutOfRange(f64),
    #[error("Longitude {0} outside [-180, 180]")]
    LongitudeOutOfRange(f64),
    #[error("Invalid timestamp '{0}'")]
    InvalidTimestamp(String),
    #[error("Invalid number for {field}: '{value}'")]
    InvalidNumber { field: String, value: String },
    #[error("Missing required field: {0}")]
    MissingField(String),
    #[error("Detector '{label}' failed: {message}")]
    Detector {
        label: ObstacleLabel,
        message: String,
    },
    #[error("Solar position lookup failed: {0}")]
    Ephemeris(String),
    #[error("Advisory service failed: {0}")]
    Advisory(String),
    #[error("{service} timed out after {seconds}s")]
    Timeout { service: String, seconds: u64 },
    #[error("Image error: {0}")]
    Image(#[from] image::ImageError),
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),
    #[error("Invalid configuration: {0}")]
    Config(String),
    #[error("Analysis worker failed: {0}")]
    Worker(String),
}

impl PlacementError {
    /// Caller supplied malformed input.
    pub fn is_validation(&self) -> bool {
        matches!(
            self,
            PlacementError::InvalidDimensions { .. }
                | PlacementError::InvalidBoundingBox { .. }
                | PlacementError::InvalidConfidence(_)
                | PlacementError::LatitudeOutOfRange(_)
                | PlacementError::LongitudeOutOfRange(_)
                | PlacementError::InvalidTimestamp(_)
                | PlacementError::InvalidNumber { .. }
                | PlacementError::MissingField(_)
                | PlacementError::Image(_)
        )
    }

    /// An external collaborator failed or timed out.
    pub fn is_upstream(&self) -> bool {
        matches!(
            self,
            PlacementError::Detector { .. }
                | PlacementError::Ephemeris(_)
                | PlacementError::Advisory(_)
                | PlacementError::Timeout { .. }
        )
    }
}
