//! Free-text installation advice from a generative language model.

use crate::config::AdvisorConfig;
use crate::solar_geometry::CompassDirection;
use crate::types::{PlacementError, PlacementRecommendation};
use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use serde_json::json;
use std::time::Duration;
use tracing::{debug, warn};

/// Placement summary the advice is based on.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AdvisoryInput {
    pub free_area: f64,
    pub tilt: f64,
    pub orientation_dir: CompassDirection,
    pub orientation_deg: f64,
}

impl From<&PlacementRecommendation> for AdvisoryInput {
    fn from(rec: &PlacementRecommendation) -> Self {
        Self {
            free_area: rec.free_area_percent,
            tilt: rec.tilt_deg,
            orientation_dir: rec.orientation_dir,
            orientation_deg: rec.orientation_deg,
        }
    }
}

pub fn build_prompt(input: &AdvisoryInput) -> String {
    format!(
        "You are an expert solar consultant. Based on this data:\n\
         - Free area: {}%\n\
         - Tilt: {} degrees\n\
         - Orientation: {} ({} degrees)\n\
         \n\
         Provide concise recommendations (max 500 words) for solar utilization, \
         panel layout, and value-added features in clean bullet points without asterisks.\n",
        input.free_area, input.tilt, input.orientation_dir, input.orientation_deg
    )
}

#[async_trait]
pub trait AdvisoryService: Send + Sync {
    async fn advise(&self, input: &AdvisoryInput) -> Result<String, PlacementError>;
}

#[derive(Debug, Deserialize)]
struct GenerateResponse {
    #[serde(default)]
    candidates: Vec<Candidate>,
}

#[derive(Debug, Deserialize)]
struct Candidate {
    content: Option<Content>,
}

#[derive(Debug, Deserialize)]
struct Content {
    #[serde(default)]
    parts: Vec<Part>,
}

#[derive(Debug, Deserialize)]
struct Part {
    #[serde(default)]
    text: String,
}

impl GenerateResponse {
    /// Text of the first candidate, parts concatenated and trimmed.
    fn into_text(self) -> Option<String> {
        let content = self.candidates.into_iter().next()?.content?;
        let text: String = content.parts.into_iter().map(|p| p.text).collect();
        let trimmed = text.trim();
        (!trimmed.is_empty()).then(|| trimmed.to_string())
    }
}

/// Google Gemini `generateContent` client.
#[derive(Debug, Clone)]
pub struct GeminiAdvisor {
    client: reqwest::Client,
    endpoint: String,
    model: String,
    api_key: String,
    timeout_secs: u64,
}

impl GeminiAdvisor {
    pub fn new(
        client: reqwest::Client,
        endpoint: impl Into<String>,
        model: impl Into<String>,
        api_key: impl Into<String>,
    ) -> Self {
        Self {
            client,
            endpoint: endpoint.into(),
            model: model.into(),
            api_key: api_key.into(),
            timeout_secs: AdvisorConfig::default().timeout_secs,
        }
    }

    /// `None` when no API key is configured.
    pub fn from_config(config: &AdvisorConfig) -> Result<Option<Self>, PlacementError> {
        let Some(api_key) = config.api_key.clone() else {
            return Ok(None);
        };
        let client = reqwest::Client::builder()
            .timeout(Duration::from_secs(config.timeout_secs))
            .build()
            .map_err(|e| PlacementError::Config(format!("Failed to build HTTP client: {}", e)))?;
        let mut advisor = Self::new(client, config.endpoint.clone(), config.model.clone(), api_key);
        advisor.timeout_secs = config.timeout_secs;
        Ok(Some(advisor))
    }

    fn url(&self) -> String {
        format!(
            "{}/models/{}:generateContent",
            self.endpoint.trim_end_matches('/'),
            self.model
        )
    }
}

#[async_trait]
impl AdvisoryService for GeminiAdvisor {
    async fn advise(&self, input: &AdvisoryInput) -> Result<String, PlacementError> {
        let body = json!({
            "contents": [{ "parts": [{ "text": build_prompt(input) }] }]
        });
        debug!(model = %self.model, "requesting advisory text");

        let response = self
            .client
            .post(self.url())
            .header("x-goog-api-key", &self.api_key)
            .json(&body)
            .send()
            .await
            .map_err(|e| {
                if e.is_timeout() {
                    PlacementError::Timeout {
                        service: "advisory".to_string(),
                        seconds: self.timeout_secs,
                    }
                } else {
                    PlacementError::Advisory(format!("request failed: {}", e))
                }
            })?;

        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            warn!(%status, "advisory service rejected request");
            return Err(PlacementError::Advisory(format!("HTTP {}: {}", status, body.trim())));
        }

        let parsed: GenerateResponse = response
            .json()
            .await
            .map_err(|e| PlacementError::Advisory(format!("invalid response body: {}", e)))?;

        parsed
            .into_text()
            .ok_or_else(|| PlacementError::Advisory("response contained no text".to_string()))
    }
}

/// Canned reply, for wiring tests and offline use.
#[derive(Debug, Clone)]
pub struct StaticAdvisor {
    text: String,
}

impl StaticAdvisor {
    pub fn new(text: impl Into<String>) -> Self {
        Self { text: text.into() }
    }
}

#[async_trait]
impl AdvisoryService for StaticAdvisor {
    async fn advise(&self, _input: &AdvisoryInput) -> Result<String, PlacementError> {
        Ok(self.text.trim().to_string())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn input() -> AdvisoryInput {
        AdvisoryInput {
            free_area: 62.5,
            tilt: 26.2,
            orientation_dir: CompassDirection::Southwest,
            orientation_deg: 215.99,
        }
    }

    #[test]
    fn prompt_mentions_every_field() {
        let prompt = build_prompt(&input());
        assert!(prompt.starts_with("You are an expert solar consultant."));
        assert!(prompt.contains("- Free area: 62.5%"));
        assert!(prompt.contains("- Tilt: 26.2 degrees"));
        assert!(prompt.contains("- Orientation: Southwest (215.99 degrees)"));
        assert!(prompt.contains("max 500 words"));
        assert!(prompt.contains("without asterisks"));
    }

    #[test]
    fn input_json_labels() {
        let json = serde_json::to_value(input()).unwrap();
        assert_eq!(json["free_area"], 62.5);
        assert_eq!(json["tilt"], 26.2);
        assert_eq!(json["orientation_dir"], "Southwest");
        assert_eq!(json["orientation_deg"], 215.99);
    }

    #[test]
    fn response_text_is_joined_and_trimmed() {
        let parsed: GenerateResponse = serde_json::from_str(
            r#"{"candidates":[{"content":{"parts":[{"text":"\n- Use the south "},{"text":"face.\n\n"}]}}]}"#,
        )
        .unwrap();
        assert_eq!(parsed.into_text().unwrap(), "- Use the south face.");

        let empty: GenerateResponse = serde_json::from_str(r#"{"candidates":[]}"#).unwrap();
        assert!(empty.into_text().is_none());
    }

    #[test]
    fn gemini_requires_api_key() {
        let config = AdvisorConfig::default();
        assert!(GeminiAdvisor::from_config(&config).unwrap().is_none());

        let config = AdvisorConfig {
            api_key: Some("k".to_string()),
            ..AdvisorConfig::default()
        };
        let advisor = GeminiAdvisor::from_config(&config).unwrap().unwrap();
        assert_eq!(
            advisor.url(),
            "https://generativelanguage.googleapis.com/v1beta/models/gemini-2.0-flash:generateContent"
        );
    }

    #[tokio::test]
    async fn static_advisor_trims() {
        let advisor = StaticAdvisor::new("  tip  \n");
        assert_eq!(advisor.advise(&input()).await.unwrap(), "tip");
    }
}
