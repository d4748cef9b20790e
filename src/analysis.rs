//! End-to-end analysis: detections and a place/time in, placement report out.

use crate::detection::DetectorSet;
use crate::occupancy::{rasterize, OccupancyMask};
use crate::raster_io::RoofImage;
use crate::recommender::recommend;
use crate::solar_geometry::assess;
use crate::sun_position::SolarEphemeris;
use crate::types::{Detection, GeoMoment, PlacementError, PlacementRecommendation};
use chrono_tz::Tz;
use rayon::prelude::*;
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use std::time::Instant;
use tracing::{info, warn};

/// What a caller gets back for one image.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AnalysisReport {
    pub image_width: u32,
    pub image_height: u32,
    pub obstructions: Vec<Detection>,
    #[serde(flatten)]
    pub recommendation: PlacementRecommendation,
}

/// Report plus the mask it was measured on (kept for export).
#[derive(Debug, Clone)]
pub struct Analysis {
    pub report: AnalysisReport,
    pub mask: OccupancyMask,
}

/// Detections already known, e.g. from a client-side model.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PlacementRequest {
    pub width: u32,
    pub height: u32,
    #[serde(default)]
    pub detections: Vec<Detection>,
    pub latitude: Option<f64>,
    pub longitude: Option<f64>,
    #[serde(default)]
    pub time: Option<String>,
}

impl PlacementRequest {
    pub fn moment(&self, default_tz: Tz) -> Result<GeoMoment, PlacementError> {
        GeoMoment::from_parts(self.latitude, self.longitude, self.time.as_deref(), default_tz)
    }
}

pub fn analyze_detections(
    width: u32,
    height: u32,
    detections: Vec<Detection>,
    moment: &GeoMoment,
    ephemeris: &dyn SolarEphemeris,
) -> Result<Analysis, PlacementError> {
    let start = Instant::now();

    let occupancy = rasterize(width, height, &detections)?;
    let solar = assess(moment, ephemeris)?;
    if !solar.position.is_above_horizon() {
        warn!(
            altitude = solar.position.altitude_deg,
            "sun is below the horizon at the requested time"
        );
    }
    let recommendation = recommend(&occupancy, &solar, moment.latitude(), moment.longitude());

    info!(
        width,
        height,
        obstructions = detections.len(),
        free_area_percent = recommendation.free_area_percent,
        direction = %recommendation.orientation_dir,
        tilt = recommendation.tilt_deg,
        elapsed_ms = start.elapsed().as_millis() as u64,
        "analysis complete"
    );

    Ok(Analysis {
        report: AnalysisReport {
            image_width: width,
            image_height: height,
            obstructions: detections,
            recommendation,
        },
        mask: occupancy.mask,
    })
}

pub fn analyze_request(
    request: &PlacementRequest,
    default_tz: Tz,
    ephemeris: &dyn SolarEphemeris,
) -> Result<Analysis, PlacementError> {
    let moment = request.moment(default_tz)?;
    analyze_detections(
        request.width,
        request.height,
        request.detections.clone(),
        &moment,
        ephemeris,
    )
}

/// Analyzes every request on the rayon pool. Output order matches input
/// order and each entry fails or succeeds on its own.
pub fn analyze_batch(
    requests: &[PlacementRequest],
    default_tz: Tz,
    ephemeris: &dyn SolarEphemeris,
) -> Vec<Result<AnalysisReport, PlacementError>> {
    let results: Vec<_> = requests
        .par_iter()
        .map(|request| analyze_request(request, default_tz, ephemeris).map(|a| a.report))
        .collect();

    let failed = results.iter().filter(|r| r.is_err()).count();
    info!(requests = requests.len(), failed, "batch analysis complete");
    results
}

/// Runs the detectors on an uploaded image, then analyzes what they found
/// on the blocking pool.
pub async fn analyze_image(
    image: &RoofImage,
    moment: GeoMoment,
    detectors: &DetectorSet,
    ephemeris: Arc<dyn SolarEphemeris>,
) -> Result<Analysis, PlacementError> {
    let detections = detectors.detect_all(image).await?;
    let (width, height) = (image.width(), image.height());

    tokio::task::spawn_blocking(move || {
        analyze_detections(width, height, detections, &moment, ephemeris.as_ref())
    })
    .await
    .map_err(|e| PlacementError::Worker(e.to_string()))?
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::detection::FixedDetector;
    use crate::solar_geometry::CompassDirection;
    use crate::sun_position::FixedEphemeris;
    use crate::types::{BoundingBox, ObstacleLabel};
    use image::{DynamicImage, GrayImage, ImageFormat};
    use std::io::Cursor;
    use std::time::Duration;

    fn left_half() -> Detection {
        Detection {
            label: ObstacleLabel::Roof,
            confidence: 0.8,
            bbox: BoundingBox::new(0, 0, 500, 1000),
        }
    }

    #[test]
    fn half_covered_roof_faces_southwest() {
        let moment = GeoMoment::new(37.5, -122.0, None).unwrap();
        let ephemeris = FixedEphemeris::new(50.0, 215.0);

        let analysis = analyze_detections(1000, 1000, vec![left_half()], &moment, &ephemeris).unwrap();
        let rec = &analysis.report.recommendation;

        assert_eq!(rec.free_area_percent, 50.0);
        assert_eq!(rec.orientation_dir, CompassDirection::Southwest);
        assert_eq!(rec.tilt_deg, 26.2);
        assert_eq!(analysis.mask.occupied_pixels(), 500_000);
        assert_eq!(analysis.report.obstructions.len(), 1);
    }

    #[test]
    fn report_flattens_recommendation() {
        let moment = GeoMoment::new(10.0, 10.0, None).unwrap();
        let analysis =
            analyze_detections(4, 4, Vec::new(), &moment, &FixedEphemeris::new(20.0, 90.0)).unwrap();
        let json = serde_json::to_value(&analysis.report).unwrap();

        assert_eq!(json["image_width"], 4);
        assert_eq!(json["free_area_percent"], 100.0);
        assert_eq!(json["orientation_dir"], "East");
        assert!(json["obstructions"].as_array().unwrap().is_empty());
        assert!(json.get("recommendation").is_none());
    }

    #[test]
    fn batch_isolates_failures() {
        let good = PlacementRequest {
            width: 10,
            height: 10,
            detections: Vec::new(),
            latitude: Some(20.0),
            longitude: Some(70.0),
            time: Some("2024-06-21T06:30:00Z".to_string()),
        };
        let missing_lat = PlacementRequest {
            latitude: None,
            ..good.clone()
        };
        let bad_box = PlacementRequest {
            detections: vec![Detection {
                label: ObstacleLabel::Tank,
                confidence: 0.5,
                bbox: BoundingBox::new(50, 50, 60, 60),
            }],
            ..good.clone()
        };

        let results = analyze_batch(
            &[good, missing_lat, bad_box],
            Tz::UTC,
            &FixedEphemeris::new(60.0, 100.0),
        );

        assert_eq!(results.len(), 3);
        assert!(results[0].is_ok());
        assert!(matches!(results[1], Err(PlacementError::MissingField(_))));
        assert!(matches!(results[2], Err(PlacementError::InvalidBoundingBox { .. })));
    }

    #[test]
    fn request_json_defaults() {
        let request: PlacementRequest =
            serde_json::from_str(r#"{"width":5,"height":5,"latitude":1.0,"longitude":2.0}"#).unwrap();
        assert!(request.detections.is_empty());
        assert!(request.time.is_none());
        assert!(request.moment(Tz::UTC).is_ok());
    }

    #[tokio::test]
    async fn image_analysis_uses_decoded_dimensions() {
        let mut buf = Vec::new();
        DynamicImage::ImageLuma8(GrayImage::new(20, 10))
            .write_to(&mut Cursor::new(&mut buf), ImageFormat::Png)
            .unwrap();
        let image = RoofImage::decode(buf).unwrap();

        let detectors = DetectorSet::new(Duration::from_secs(1)).with_detector(Arc::new(
            FixedDetector::new(
                ObstacleLabel::Tree,
                vec![Detection {
                    label: ObstacleLabel::Tree,
                    confidence: 0.7,
                    bbox: BoundingBox::new(0, 0, 10, 10),
                }],
            ),
        ));
        let moment = GeoMoment::new(45.0, 7.0, None).unwrap();

        let analysis = analyze_image(&image, moment, &detectors, Arc::new(FixedEphemeris::new(30.0, 180.0)))
            .await
            .unwrap();
        assert_eq!(analysis.report.image_width, 20);
        assert_eq!(analysis.report.image_height, 10);
        assert_eq!(analysis.report.recommendation.free_area_percent, 50.0);
        assert_eq!(analysis.report.recommendation.tilt_deg, 45.0);
    }
}
