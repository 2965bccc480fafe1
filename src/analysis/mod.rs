//! Client for the external attentiveness analysis service.
//!
//! The service receives a still frame of the conferencing session and
//! answers with an aggregate concentration score. Every failure mode
//! collapses into [`Attentiveness::Unavailable`] so a flaky or absent
//! service never surfaces as an error to the operator.

use std::time::Duration;

use async_trait::async_trait;
use serde::{Deserialize, Serialize, Serializer};

use crate::config::env_or;
use crate::error::{HiveError, Result};

pub const DEFAULT_ANALYSIS_URL: &str = "http://localhost:8000/process_frame";
pub const DEFAULT_ANALYSIS_TIMEOUT_SECS: u64 = 10;

/// Text shown in place of a reading when the service could not provide one
pub const PLACEHOLDER: &str = "-";

#[derive(Debug, Clone)]
pub struct AnalysisConfig {
    pub url: String,
    pub timeout_secs: u64,
}

impl Default for AnalysisConfig {
    fn default() -> Self {
        Self {
            url: DEFAULT_ANALYSIS_URL.to_string(),
            timeout_secs: DEFAULT_ANALYSIS_TIMEOUT_SECS,
        }
    }
}

impl AnalysisConfig {
    pub fn from_env() -> Self {
        Self {
            url: std::env::var("ANALYSIS_URL").unwrap_or_else(|_| DEFAULT_ANALYSIS_URL.to_string()),
            timeout_secs: env_or("ANALYSIS_TIMEOUT_SECS", DEFAULT_ANALYSIS_TIMEOUT_SECS),
        }
    }
}

/// Request body for the analysis endpoint
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct FrameRequest {
    /// Data URL (`data:image/jpeg;base64,...`), raw base64, or empty
    pub frame: String,
}

/// Response body from the analysis endpoint
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AnalysisResponse {
    pub status: String,
    #[serde(default)]
    pub overall_concentration: Option<f64>,
    #[serde(default)]
    pub message: Option<String>,
}

/// Latest attentiveness reading for the session
#[derive(Debug, Clone, Copy, PartialEq, Default)]
pub enum Attentiveness {
    /// No poll has completed since the session connected
    #[default]
    Unknown,
    Value(f64),
    Unavailable,
}

impl std::fmt::Display for Attentiveness {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Attentiveness::Unknown => Ok(()),
            Attentiveness::Value(v) => write!(f, "{}", v),
            Attentiveness::Unavailable => f.write_str(PLACEHOLDER),
        }
    }
}

/// Serialized as `null`, a number, or the placeholder string
impl Serialize for Attentiveness {
    fn serialize<S: Serializer>(&self, serializer: S) -> std::result::Result<S::Ok, S::Error> {
        match self {
            Attentiveness::Unknown => serializer.serialize_none(),
            Attentiveness::Value(v) => serializer.serialize_f64(*v),
            Attentiveness::Unavailable => serializer.serialize_str(PLACEHOLDER),
        }
    }
}

/// Anything that can turn a frame into an attentiveness score
#[async_trait]
pub trait AttentivenessSource: Send + Sync {
    async fn measure(&self, frame: &str) -> Result<f64>;
}

pub struct AnalysisClient {
    config: AnalysisConfig,
    client: reqwest::Client,
}

impl AnalysisClient {
    pub fn new(config: AnalysisConfig) -> Result<Self> {
        let client = reqwest::Client::builder()
            .timeout(Duration::from_secs(config.timeout_secs))
            .build()
            .map_err(|e| HiveError::Internal(format!("Failed to create HTTP client: {}", e)))?;

        Ok(Self { config, client })
    }

    pub fn url(&self) -> &str {
        &self.config.url
    }
}

#[async_trait]
impl AttentivenessSource for AnalysisClient {
    async fn measure(&self, frame: &str) -> Result<f64> {
        let response = self
            .client
            .post(&self.config.url)
            .json(&FrameRequest {
                frame: frame.to_string(),
            })
            .send()
            .await?;

        if !response.status().is_success() {
            return Err(HiveError::AnalysisStatus(response.status().as_u16()));
        }

        let body: AnalysisResponse = response.json().await?;
        interpret(body)
    }
}

/// Extracts the score from a decoded response
pub fn interpret(body: AnalysisResponse) -> Result<f64> {
    if body.status != "ok" {
        return Err(HiveError::AnalysisRejected(
            body.message.unwrap_or(body.status),
        ));
    }
    body.overall_concentration
        .ok_or_else(|| HiveError::AnalysisRejected("missing overall_concentration".to_string()))
}

/// Performs one measurement, degrading any failure to the placeholder
pub async fn poll_once(source: &dyn AttentivenessSource, frame: &str) -> Attentiveness {
    match source.measure(frame).await {
        Ok(score) => {
            tracing::debug!(score = score, frame_len = frame.len(), "Attentiveness measured");
            Attentiveness::Value(score)
        }
        Err(e) => {
            tracing::warn!(error = %e, "Attentiveness unavailable");
            Attentiveness::Unavailable
        }
    }
}
