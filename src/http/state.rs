//! Shared state handed to every handler.

use crate::advisory::{AdvisoryService, GeminiAdvisor};
use crate::config::Config;
use crate::detection::DetectorSet;
use crate::sun_position::{SolarEphemeris, SunCalculator};
use crate::types::PlacementError;
use chrono_tz::Tz;
use std::path::PathBuf;
use std::sync::Arc;

#[derive(Clone)]
pub struct AppState {
    pub detectors: Arc<DetectorSet>,
    pub ephemeris: Arc<dyn SolarEphemeris>,
    /// Unset when no API key is configured; `/recommend` then answers 503.
    pub advisor: Option<Arc<dyn AdvisoryService>>,
    /// Zone for timestamps sent without an offset.
    pub default_tz: Tz,
    pub export_dir: Option<PathBuf>,
}

impl AppState {
    pub fn new(detectors: DetectorSet, ephemeris: Arc<dyn SolarEphemeris>) -> Self {
        Self {
            detectors: Arc::new(detectors),
            ephemeris,
            advisor: None,
            default_tz: Tz::UTC,
            export_dir: None,
        }
    }

    pub fn with_advisor(mut self, advisor: Arc<dyn AdvisoryService>) -> Self {
        self.advisor = Some(advisor);
        self
    }

    pub fn with_default_timezone(mut self, tz: Tz) -> Self {
        self.default_tz = tz;
        self
    }

    pub fn with_export_dir(mut self, dir: PathBuf) -> Self {
        self.export_dir = Some(dir);
        self
    }

    /// Production wiring: HTTP detectors, the built-in sun almanac and Gemini.
    pub fn from_config(config: &Config) -> Result<Self, PlacementError> {
        let mut state = Self::new(
            DetectorSet::from_config(&config.detector)?,
            Arc::new(SunCalculator::new()),
        )
        .with_default_timezone(config.analysis.timezone()?);

        if let Some(advisor) = GeminiAdvisor::from_config(&config.advisor)? {
            state = state.with_advisor(Arc::new(advisor));
        }
        if let Some(dir) = config.export_dir() {
            state = state.with_export_dir(dir);
        }
        Ok(state)
    }
}
