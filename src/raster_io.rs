use crate::analysis::Analysis;
use crate::occupancy::OccupancyMask;
use crate::types::PlacementError;
use image::{GrayImage, Luma};
use serde::Serialize;
use std::fs;
use std::path::{Path, PathBuf};

/// Uploaded rooftop photo: the encoded bytes (forwarded to detectors) and
/// its decoded dimensions.
#[derive(Debug, Clone)]
pub struct RoofImage {
    bytes: Vec<u8>,
    width: u32,
    height: u32,
}

impl RoofImage {
    /// Decodes just far enough to learn the dimensions. Fails on anything
    /// the `image` crate cannot read.
    pub fn decode(bytes: Vec<u8>) -> Result<Self, PlacementError> {
        let decoded = image::load_from_memory(&bytes)?;
        let (width, height) = (decoded.width(), decoded.height());
        if width == 0 || height == 0 {
            return Err(PlacementError::InvalidDimensions {
                width,
                height,
                reason: "decoded image is empty",
            });
        }

        Ok(Self {
            bytes,
            width,
            height,
        })
    }

    pub fn width(&self) -> u32 {
        self.width
    }

    pub fn height(&self) -> u32 {
        self.height
    }

    pub fn bytes(&self) -> &[u8] {
        &self.bytes
    }
}

pub struct RasterIO;

impl RasterIO {
    /// Occupied pixels white, free pixels black.
    pub fn mask_to_image(mask: &OccupancyMask) -> GrayImage {
        let grid = mask.as_array();
        GrayImage::from_fn(mask.width() as u32, mask.height() as u32, |x, y| {
            if grid[[y as usize, x as usize]] {
                Luma([255u8])
            } else {
                Luma([0u8])
            }
        })
    }

    pub fn write_mask_png(path: &Path, mask: &OccupancyMask) -> Result<(), PlacementError> {
        Self::mask_to_image(mask).save(path)?;
        Ok(())
    }

    pub fn write_json<T: Serialize>(path: &Path, value: &T) -> Result<(), PlacementError> {
        let file = fs::File::create(path)?;
        serde_json::to_writer_pretty(file, value)?;
        Ok(())
    }

    /// Writes `<stamp>_mask.png` and `<stamp>_placement.json` into `dir`,
    /// creating it if needed. Returns both paths.
    pub fn export_analysis(
        dir: &Path,
        analysis: &Analysis,
    ) -> Result<(PathBuf, PathBuf), PlacementError> {
        fs::create_dir_all(dir)?;

        let stamp = chrono::Local::now().format("%Y%m%d_%H%M%S_%3f");
        let mask_path = dir.join(format!("{}_mask.png", stamp));
        let report_path = dir.join(format!("{}_placement.json", stamp));

        Self::write_mask_png(&mask_path, &analysis.mask)?;
        Self::write_json(&report_path, &analysis.report)?;

        Ok((mask_path, report_path))
    }

    pub fn default_export_dir() -> PathBuf {
        match dirs::document_dir() {
            Some(dir) => dir.join("SolarPlacement_Exports"),
            None => std::env::current_dir()
                .unwrap_or_else(|_| PathBuf::from("."))
                .join("exports"),
        }
    }
}
