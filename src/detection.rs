//! Obstruction detectors.
//!
//! The models themselves live outside this crate. A [`Detector`] turns an
//! uploaded image into labelled boxes for one obstacle class; a
//! [`DetectorSet`] fans an image out to every configured class.

use crate::config::DetectorConfig;
use crate::raster_io::RoofImage;
use crate::types::{round_to, BoundingBox, Detection, ObstacleLabel, PlacementError};
use async_trait::async_trait;
use serde::Deserialize;
use std::sync::Arc;
use std::time::Duration;
use tracing::{debug, warn};

#[async_trait]
pub trait Detector: Send + Sync {
    fn label(&self) -> ObstacleLabel;

    async fn detect(&self, image: &RoofImage) -> Result<Vec<Detection>, PlacementError>;
}

/// Returns a preset list regardless of the image.
#[derive(Debug, Clone)]
pub struct FixedDetector {
    label: ObstacleLabel,
    detections: Vec<Detection>,
}

impl FixedDetector {
    pub fn new(label: ObstacleLabel, detections: Vec<Detection>) -> Self {
        Self { label, detections }
    }
}

#[async_trait]
impl Detector for FixedDetector {
    fn label(&self) -> ObstacleLabel {
        self.label
    }

    async fn detect(&self, _image: &RoofImage) -> Result<Vec<Detection>, PlacementError> {
        Ok(self.detections.clone())
    }
}

#[derive(Debug, Deserialize)]
struct InferenceResponse {
    #[serde(default)]
    boxes: Vec<InferenceBox>,
}

#[derive(Debug, Deserialize)]
struct InferenceBox {
    xyxy: [f64; 4],
    conf: f64,
}

/// Client for an inference service exposing one model per class at
/// `POST {endpoint}/{label}` (raw image body, JSON boxes back).
#[derive(Debug, Clone)]
pub struct HttpDetector {
    client: reqwest::Client,
    endpoint: String,
    label: ObstacleLabel,
}

impl HttpDetector {
    pub fn new(client: reqwest::Client, endpoint: impl Into<String>, label: ObstacleLabel) -> Self {
        Self {
            client,
            endpoint: endpoint.into(),
            label,
        }
    }

    fn url(&self) -> String {
        format!("{}/{}", self.endpoint.trim_end_matches('/'), self.label)
    }

    fn failure(&self, message: impl Into<String>) -> PlacementError {
        PlacementError::Detector {
            label: self.label,
            message: message.into(),
        }
    }

    fn to_detection(&self, raw: InferenceBox) -> Detection {
        // Pixel coordinates truncate toward zero.
        let [x1, y1, x2, y2] = raw.xyxy;
        Detection {
            label: self.label,
            confidence: round_to(raw.conf, 3),
            bbox: BoundingBox::new(x1 as i64, y1 as i64, x2 as i64, y2 as i64),
        }
    }
}

#[async_trait]
impl Detector for HttpDetector {
    fn label(&self) -> ObstacleLabel {
        self.label
    }

    async fn detect(&self, image: &RoofImage) -> Result<Vec<Detection>, PlacementError> {
        let response = self
            .client
            .post(self.url())
            .header(reqwest::header::CONTENT_TYPE, "application/octet-stream")
            .body(image.bytes().to_vec())
            .send()
            .await
            .map_err(|e| self.failure(format!("request failed: {}", e)))?;

        let status = response.status();
        if !status.is_success() {
            let body = response
                .text()
                .await
                .unwrap_or_else(|_| "<empty response>".to_string());
            return Err(self.failure(format!("HTTP {}: {}", status, body.trim())));
        }

        let parsed: InferenceResponse = response
            .json()
            .await
            .map_err(|e| self.failure(format!("invalid response body: {}", e)))?;

        Ok(parsed
            .boxes
            .into_iter()
            .map(|raw| self.to_detection(raw))
            .collect())
    }
}

/// All detectors for one analysis, with the per-call timeout and confidence
/// cut-off applied uniformly.
#[derive(Clone)]
pub struct DetectorSet {
    detectors: Vec<Arc<dyn Detector>>,
    confidence_threshold: f64,
    timeout: Duration,
}

impl DetectorSet {
    pub fn new(timeout: Duration) -> Self {
        Self {
            detectors: Vec::new(),
            confidence_threshold: 0.0,
            timeout,
        }
    }

    /// HTTP detectors for every configured label, or an empty set when no
    /// endpoint is configured.
    pub fn from_config(config: &DetectorConfig) -> Result<Self, PlacementError> {
        let timeout = Duration::from_secs(config.timeout_secs);
        let mut set = Self::new(timeout).with_confidence_threshold(config.confidence_threshold);

        if let Some(endpoint) = &config.endpoint {
            let client = reqwest::Client::builder()
                .timeout(timeout)
                .build()
                .map_err(|e| PlacementError::Config(format!("Failed to build HTTP client: {}", e)))?;
            for label in &config.labels {
                set = set.with_detector(Arc::new(HttpDetector::new(
                    client.clone(),
                    endpoint.clone(),
                    *label,
                )));
            }
        }

        Ok(set)
    }

    pub fn with_detector(mut self, detector: Arc<dyn Detector>) -> Self {
        self.detectors.push(detector);
        self
    }

    pub fn with_confidence_threshold(mut self, threshold: f64) -> Self {
        self.confidence_threshold = threshold;
        self
    }

    pub fn is_empty(&self) -> bool {
        self.detectors.is_empty()
    }

    pub fn len(&self) -> usize {
        self.detectors.len()
    }

    pub fn labels(&self) -> Vec<ObstacleLabel> {
        self.detectors.iter().map(|d| d.label()).collect()
    }

    /// Runs every detector concurrently. Results keep detector order; the
    /// first failure fails the whole call.
    pub async fn detect_all(&self, image: &RoofImage) -> Result<Vec<Detection>, PlacementError> {
        let calls = self
            .detectors
            .iter()
            .map(|detector| self.detect_one(detector.as_ref(), image));
        let per_detector = futures::future::try_join_all(calls).await?;

        let detections: Vec<Detection> = per_detector
            .into_iter()
            .flatten()
            .filter(|d| d.confidence >= self.confidence_threshold)
            .collect();

        debug!(
            detectors = self.detectors.len(),
            detections = detections.len(),
            "detection finished"
        );
        Ok(detections)
    }

    async fn detect_one(
        &self,
        detector: &dyn Detector,
        image: &RoofImage,
    ) -> Result<Vec<Detection>, PlacementError> {
        let label = detector.label();
        match tokio::time::timeout(self.timeout, detector.detect(image)).await {
            Ok(Ok(detections)) => Ok(detections),
            Ok(Err(e)) => {
                warn!(%label, error = %e, "detector failed");
                Err(e)
            }
            Err(_) => {
                warn!(%label, timeout_secs = self.timeout.as_secs(), "detector timed out");
                Err(PlacementError::Timeout {
                    service: format!("{} detector", label),
                    seconds: self.timeout.as_secs(),
                })
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use image::{DynamicImage, GrayImage, ImageFormat};
    use std::io::Cursor;

    fn roof(width: u32, height: u32) -> RoofImage {
        let mut buf = Vec::new();
        DynamicImage::ImageLuma8(GrayImage::new(width, height))
            .write_to(&mut Cursor::new(&mut buf), ImageFormat::Png)
            .unwrap();
        RoofImage::decode(buf).unwrap()
    }

    fn det(label: ObstacleLabel, confidence: f64) -> Detection {
        Detection {
            label,
            confidence,
            bbox: BoundingBox::new(0, 0, 2, 2),
        }
    }

    struct FailingDetector;

    #[async_trait]
    impl Detector for FailingDetector {
        fn label(&self) -> ObstacleLabel {
            ObstacleLabel::Tank
        }

        async fn detect(&self, _image: &RoofImage) -> Result<Vec<Detection>, PlacementError> {
            Err(PlacementError::Detector {
                label: ObstacleLabel::Tank,
                message: "model not loaded".into(),
            })
        }
    }

    struct SlowDetector;

    #[async_trait]
    impl Detector for SlowDetector {
        fn label(&self) -> ObstacleLabel {
            ObstacleLabel::Tree
        }

        async fn detect(&self, _image: &RoofImage) -> Result<Vec<Detection>, PlacementError> {
            tokio::time::sleep(Duration::from_secs(5)).await;
            Ok(Vec::new())
        }
    }

    #[tokio::test]
    async fn concatenates_in_detector_order_and_filters_confidence() {
        let set = DetectorSet::new(Duration::from_secs(1))
            .with_confidence_threshold(0.25)
            .with_detector(Arc::new(FixedDetector::new(
                ObstacleLabel::Pole,
                vec![det(ObstacleLabel::Pole, 0.9), det(ObstacleLabel::Pole, 0.1)],
            )))
            .with_detector(Arc::new(FixedDetector::new(
                ObstacleLabel::Roof,
                vec![det(ObstacleLabel::Roof, 0.5)],
            )));

        let found = set.detect_all(&roof(8, 8)).await.unwrap();
        let labels: Vec<_> = found.iter().map(|d| d.label).collect();
        assert_eq!(labels, vec![ObstacleLabel::Pole, ObstacleLabel::Roof]);
        assert_eq!(set.labels(), vec![ObstacleLabel::Pole, ObstacleLabel::Roof]);
    }

    #[tokio::test]
    async fn empty_set_finds_nothing() {
        let set = DetectorSet::new(Duration::from_secs(1));
        assert!(set.is_empty());
        assert!(set.detect_all(&roof(4, 4)).await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn failures_propagate_unchanged() {
        let set = DetectorSet::new(Duration::from_secs(1))
            .with_detector(Arc::new(FixedDetector::new(ObstacleLabel::Pole, Vec::new())))
            .with_detector(Arc::new(FailingDetector));

        let err = set.detect_all(&roof(4, 4)).await.unwrap_err();
        assert!(matches!(err, PlacementError::Detector { label: ObstacleLabel::Tank, .. }));
        assert!(err.is_upstream());
    }

    #[tokio::test]
    async fn slow_detectors_time_out() {
        let set = DetectorSet::new(Duration::from_millis(100)).with_detector(Arc::new(SlowDetector));

        let err = set.detect_all(&roof(4, 4)).await.unwrap_err();
        assert!(matches!(err, PlacementError::Timeout { .. }));
        assert!(err.is_upstream());
    }

    #[test]
    fn http_detector_truncates_coordinates_and_rounds_confidence() {
        let detector = HttpDetector::new(reqwest::Client::new(), "http://models:9000/", ObstacleLabel::Tree);
        assert_eq!(detector.url(), "http://models:9000/tree");

        let parsed: InferenceResponse =
            serde_json::from_str(r#"{"boxes":[{"xyxy":[10.9,20.2,110.7,220.99],"conf":0.87654}]}"#)
                .unwrap();
        let detection = detector.to_detection(parsed.boxes.into_iter().next().unwrap());
        assert_eq!(detection.bbox, BoundingBox::new(10, 20, 110, 220));
        assert_eq!(detection.confidence, 0.877);
        assert_eq!(detection.label, ObstacleLabel::Tree);
    }
}
