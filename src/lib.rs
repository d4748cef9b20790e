//! Rooftop solar panel placement.
//!
//! Obstruction detections are rasterized into an occupancy mask, the sun's
//! position is computed for the site and time, and both are condensed into a
//! placement recommendation (free area, facing direction, tilt).

pub mod advisory;
pub mod analysis;
pub mod config;
pub mod detection;
pub mod occupancy;
pub mod raster_io;
pub mod recommender;
pub mod solar_geometry;
pub mod sun_position;
pub mod types;

#[cfg(feature = "http-server")]
pub mod http;

pub use analysis::{analyze_batch, analyze_detections, analyze_image, Analysis, AnalysisReport, PlacementRequest};
pub use config::Config;
pub use occupancy::{rasterize, OccupancyMask, OccupancyResult};
pub use solar_geometry::{azimuth_to_direction, solar_position, suggested_tilt, CompassDirection};
pub use sun_position::{FixedEphemeris, SolarEphemeris, SunCalculator};
pub use types::{
    BoundingBox, Detection, GeoMoment, ObstacleLabel, PlacementError, PlacementRecommendation,
    SolarPosition,
};
