//! Service configuration.
//!
//! Loaded from an optional TOML file named by `SOLAR_PLACEMENT_CONFIG`, then
//! overridden by environment variables:
//!
//! - `HOST`, `PORT`: bind address
//! - `DETECTOR_ENDPOINT`: base URL of the inference service
//! - `GEMINI_API_KEY`: key for the advisory text service
//! - `DEFAULT_TIMEZONE`: IANA zone for timestamps without an offset

use crate::types::{ObstacleLabel, PlacementError};
use chrono_tz::Tz;
use serde::{Deserialize, Serialize};
use std::net::{IpAddr, SocketAddr};
use std::path::{Path, PathBuf};

pub const CONFIG_PATH_VAR: &str = "SOLAR_PLACEMENT_CONFIG";

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct Config {
    pub host: String,
    pub port: u16,
    pub detector: DetectorConfig,
    pub advisor: AdvisorConfig,
    pub analysis: AnalysisConfig,
    pub export: ExportConfig,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            host: "0.0.0.0".to_string(),
            port: 5000,
            detector: DetectorConfig::default(),
            advisor: AdvisorConfig::default(),
            analysis: AnalysisConfig::default(),
            export: ExportConfig::default(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct DetectorConfig {
    /// Unset means no detector: callers must supply detections.
    pub endpoint: Option<String>,
    pub labels: Vec<ObstacleLabel>,
    pub confidence_threshold: f64,
    pub timeout_secs: u64,
}

impl Default for DetectorConfig {
    fn default() -> Self {
        Self {
            endpoint: None,
            labels: ObstacleLabel::ALL.to_vec(),
            confidence_threshold: 0.0,
            timeout_secs: 30,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct AdvisorConfig {
    #[serde(skip_serializing)]
    pub api_key: Option<String>,
    pub model: String,
    pub endpoint: String,
    pub timeout_secs: u64,
}

impl Default for AdvisorConfig {
    fn default() -> Self {
        Self {
            api_key: None,
            model: "gemini-2.0-flash".to_string(),
            endpoint: "https://generativelanguage.googleapis.com/v1beta".to_string(),
            timeout_secs: 30,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct AnalysisConfig {
    pub default_timezone: String,
    /// Rayon pool size for batch analysis.
    pub worker_threads: usize,
}

impl Default for AnalysisConfig {
    fn default() -> Self {
        Self {
            default_timezone: "UTC".to_string(),
            worker_threads: num_cpus::get(),
        }
    }
}

impl AnalysisConfig {
    pub fn timezone(&self) -> Result<Tz, PlacementError> {
        self.default_timezone.parse::<Tz>().map_err(|e| {
            PlacementError::Config(format!(
                "unknown timezone '{}': {}",
                self.default_timezone, e
            ))
        })
    }
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct ExportConfig {
    pub enabled: bool,
    pub directory: Option<PathBuf>,
}

impl Config {
    pub fn from_toml_str(raw: &str) -> Result<Self, PlacementError> {
        let config: Config = toml::from_str(raw)
            .map_err(|e| PlacementError::Config(format!("Failed to parse config: {}", e)))?;
        config.validate()?;
        Ok(config)
    }

    pub fn from_file(path: &Path) -> Result<Self, PlacementError> {
        let raw = std::fs::read_to_string(path).map_err(|e| {
            PlacementError::Config(format!("Failed to read {}: {}", path.display(), e))
        })?;
        Self::from_toml_str(&raw)
    }

    /// File (if `SOLAR_PLACEMENT_CONFIG` is set) plus process environment.
    pub fn load() -> Result<Self, PlacementError> {
        let lookup = |key: &str| std::env::var(key).ok();
        let mut config = match lookup(CONFIG_PATH_VAR) {
            Some(path) => Self::from_file(Path::new(&path))?,
            None => Self::default(),
        };
        config.apply_overrides(lookup)?;
        Ok(config)
    }

    /// Applies environment-style overrides from `lookup`, then revalidates.
    pub fn apply_overrides<F>(&mut self, lookup: F) -> Result<(), PlacementError>
    where
        F: Fn(&str) -> Option<String>,
    {
        if let Some(host) = lookup("HOST") {
            self.host = host;
        }
        if let Some(port) = lookup("PORT") {
            self.port = port
                .parse()
                .map_err(|_| PlacementError::Config(format!("PORT must be a valid port number, got '{}'", port)))?;
        }
        if let Some(endpoint) = lookup("DETECTOR_ENDPOINT").filter(|v| !v.is_empty()) {
            self.detector.endpoint = Some(endpoint);
        }
        if let Some(key) = lookup("GEMINI_API_KEY").filter(|v| !v.is_empty()) {
            self.advisor.api_key = Some(key);
        }
        if let Some(tz) = lookup("DEFAULT_TIMEZONE") {
            self.analysis.default_timezone = tz;
        }
        self.validate()
    }

    pub fn validate(&self) -> Result<(), PlacementError> {
        if !(0.0..=1.0).contains(&self.detector.confidence_threshold) {
            return Err(PlacementError::Config(format!(
                "detector.confidence_threshold must lie in [0, 1], got {}",
                self.detector.confidence_threshold
            )));
        }
        if self.detector.timeout_secs == 0 || self.advisor.timeout_secs == 0 {
            return Err(PlacementError::Config(
                "timeouts must be at least one second".to_string(),
            ));
        }
        if self.analysis.worker_threads == 0 {
            return Err(PlacementError::Config(
                "analysis.worker_threads must be positive".to_string(),
            ));
        }
        self.analysis.timezone()?;
        self.socket_addr()?;
        Ok(())
    }

    /// Listen address. `host` is an IPv4 or IPv6 literal; brackets are optional.
    pub fn socket_addr(&self) -> Result<SocketAddr, PlacementError> {
        let host = self.host.trim().trim_start_matches('[').trim_end_matches(']');
        let ip: IpAddr = host.parse().map_err(|_| {
            PlacementError::Config(format!("host must be an IP address, got '{}'", self.host))
        })?;
        Ok(SocketAddr::from((ip, self.port)))
    }

    /// Directory for exports, if exporting is enabled.
    pub fn export_dir(&self) -> Option<PathBuf> {
        if !self.export.enabled {
            return None;
        }
        Some(
            self.export
                .directory
                .clone()
                .unwrap_or_else(crate::raster_io::RasterIO::default_export_dir),
        )
    }
}
