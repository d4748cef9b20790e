//! HTTP handlers. Each one validates its input and delegates to
//! [`crate::analysis`] or the advisory service.

use axum::{
    extract::{Multipart, State},
    Json,
};
use base64::{engine::general_purpose::STANDARD, Engine as _};
use std::path::PathBuf;
use tracing::{info, warn};

use super::dto::{
    AdvisoryInput, AnalysisReport, BatchItem, HealthResponse, PlacementRequest, RecommendResponse,
};
use super::error::AppError;
use super::state::AppState;
use crate::analysis::{analyze_batch, analyze_detections, analyze_image, analyze_request, Analysis};
use crate::raster_io::{RasterIO, RoofImage};
use crate::types::{Detection, GeoMoment, PlacementError};

pub type HandlerResult<T> = Result<Json<T>, AppError>;

/// GET /health
pub async fn health_check(State(state): State<AppState>) -> HandlerResult<HealthResponse> {
    Ok(Json(HealthResponse {
        status: "ok".to_string(),
        version: env!("CARGO_PKG_VERSION").to_string(),
        detectors: state.detectors.labels(),
        advisor: state.advisor.is_some(),
    }))
}

/// Fields collected from an `/analyze` form.
#[derive(Default)]
struct AnalyzeForm {
    image: Option<Vec<u8>>,
    /// Webcam capture sent as a data URL; used when no file is uploaded.
    camera_image: Option<Vec<u8>>,
    latitude: Option<f64>,
    longitude: Option<f64>,
    time: Option<String>,
    detections: Option<Vec<Detection>>,
}

fn parse_coordinate(field: &str, raw: &str) -> Result<Option<f64>, PlacementError> {
    let raw = raw.trim();
    if raw.is_empty() {
        return Ok(None);
    }
    raw.parse::<f64>()
        .map(Some)
        .map_err(|_| PlacementError::InvalidNumber {
            field: field.to_string(),
            value: raw.to_string(),
        })
}

/// Decodes `data:<mime>;base64,<payload>` into raw bytes.
fn decode_data_url(raw: &str) -> Result<Vec<u8>, AppError> {
    let payload = match raw.trim().split_once(',') {
        Some((header, payload)) if header.starts_with("data:") && header.ends_with(";base64") => {
            payload
        }
        _ => {
            return Err(AppError::BadRequest(
                "camera_image must be a base64 data URL".to_string(),
            ))
        }
    };
    STANDARD
        .decode(payload.trim())
        .map_err(|e| AppError::BadRequest(format!("Invalid base64 in camera_image: {}", e)))
}

async fn read_form(mut multipart: Multipart) -> Result<AnalyzeForm, AppError> {
    let mut form = AnalyzeForm::default();

    while let Some(field) = multipart.next_field().await? {
        let name = field.name().unwrap_or_default().to_string();
        match name.as_str() {
            "image" => {
                let bytes = field.bytes().await?;
                if !bytes.is_empty() {
                    form.image = Some(bytes.to_vec());
                }
            }
            "camera_image" => {
                let text = field.text().await?;
                if !text.trim().is_empty() {
                    form.camera_image = Some(decode_data_url(&text)?);
                }
            }
            "latitude" => form.latitude = parse_coordinate("latitude", &field.text().await?)?,
            "longitude" => form.longitude = parse_coordinate("longitude", &field.text().await?)?,
            "time" => {
                let text = field.text().await?;
                form.time = (!text.trim().is_empty()).then_some(text);
            }
            "detections" => {
                let text = field.text().await?;
                let detections: Vec<Detection> = serde_json::from_str(&text).map_err(|e| {
                    AppError::BadRequest(format!("Invalid detections JSON: {}", e))
                })?;
                form.detections = Some(detections);
            }
            other => warn!(field = other, "ignoring unknown form field"),
        }
    }

    Ok(form)
}

/// Writes the mask and report next to each other. Failures are only logged.
async fn export(dir: Option<PathBuf>, analysis: Analysis) {
    let Some(dir) = dir else { return };
    let result = tokio::task::spawn_blocking(move || RasterIO::export_analysis(&dir, &analysis)).await;
    match result {
        Ok(Ok((mask, report))) => info!(mask = %mask.display(), report = %report.display(), "exported analysis"),
        Ok(Err(e)) => warn!(error = %e, "export failed"),
        Err(e) => warn!(error = %e, "export task failed"),
    }
}

/// POST /analyze
///
/// Multipart form: `image` (file) or `camera_image` (data URL), `latitude`,
/// `longitude`, optional `time`, and optional `detections` (JSON array) to
/// skip the detectors.
pub async fn analyze(
    State(state): State<AppState>,
    multipart: Multipart,
) -> HandlerResult<AnalysisReport> {
    let form = read_form(multipart).await?;
    let bytes = form
        .image
        .or(form.camera_image)
        .ok_or_else(|| AppError::BadRequest("No image provided".to_string()))?;
    let moment = GeoMoment::from_parts(
        form.latitude,
        form.longitude,
        form.time.as_deref(),
        state.default_tz,
    )?;

    let image = tokio::task::spawn_blocking(move || RoofImage::decode(bytes)).await??;
    let ephemeris = state.ephemeris.clone();

    let analysis = match form.detections {
        Some(detections) => {
            let (width, height) = (image.width(), image.height());
            tokio::task::spawn_blocking(move || {
                analyze_detections(width, height, detections, &moment, ephemeris.as_ref())
            })
            .await??
        }
        None if state.detectors.is_empty() => {
            return Err(AppError::BadRequest(
                "No detector is configured; supply a `detections` field".to_string(),
            ))
        }
        None => analyze_image(&image, moment, &state.detectors, ephemeris).await?,
    };

    let report = analysis.report.clone();
    export(state.export_dir.clone(), analysis).await;
    Ok(Json(report))
}

/// POST /placement
pub async fn placement(
    State(state): State<AppState>,
    Json(request): Json<PlacementRequest>,
) -> HandlerResult<AnalysisReport> {
    let ephemeris = state.ephemeris.clone();
    let tz = state.default_tz;
    let analysis =
        tokio::task::spawn_blocking(move || analyze_request(&request, tz, ephemeris.as_ref()))
            .await??;

    let report = analysis.report.clone();
    export(state.export_dir.clone(), analysis).await;
    Ok(Json(report))
}

/// POST /placement/batch
///
/// Always 200; each entry carries its own result.
pub async fn placement_batch(
    State(state): State<AppState>,
    Json(requests): Json<Vec<PlacementRequest>>,
) -> HandlerResult<Vec<BatchItem>> {
    let ephemeris = state.ephemeris.clone();
    let tz = state.default_tz;
    let results =
        tokio::task::spawn_blocking(move || analyze_batch(&requests, tz, ephemeris.as_ref()))
            .await?;

    Ok(Json(results.into_iter().map(BatchItem::from).collect()))
}

/// POST /recommend
pub async fn recommend(
    State(state): State<AppState>,
    Json(input): Json<AdvisoryInput>,
) -> HandlerResult<RecommendResponse> {
    let advisor = state
        .advisor
        .as_ref()
        .ok_or_else(|| AppError::Unavailable("Advisory service is not configured".to_string()))?;

    let recommendation = advisor.advise(&input).await?;
    Ok(Json(RecommendResponse { recommendation }))
}
