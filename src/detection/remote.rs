use std::future::Future;
use std::time::Duration;

use base64::Engine;
use base64::engine::general_purpose::STANDARD;
use serde::Deserialize;

use crate::error::{PipelineError, Result};

/// A raw prediction as returned by the detector, in center format.
#[derive(Debug, Clone, PartialEq, Deserialize)]
pub struct RawPrediction {
    #[serde(default = "default_class")]
    pub class: String,
    pub confidence: f32,
    pub x: f32,
    pub y: f32,
    pub width: f32,
    pub height: f32,
}

fn default_class() -> String {
    "hold".to_string()
}

/// External object detector that locates holds in a JPEG image.
pub trait HoldDetector: Send + Sync + 'static {
    /// Detect holds in `jpeg`, returning predictions in detector order.
    /// `min_confidence` is in `0..=1`.
    fn detect(
        &self,
        jpeg: &[u8],
        min_confidence: f32,
    ) -> impl Future<Output = Result<Vec<RawPrediction>>> + Send;
}

#[derive(Debug, Deserialize)]
struct PredictionResponse {
    #[serde(default)]
    predictions: Vec<RawPrediction>,
}

/// Hosted inference API client (`POST {url}/{model}?api_key=..&confidence=..`).
#[derive(Debug, Clone)]
pub struct RoboflowDetector {
    client: reqwest::Client,
    base_url: String,
    model: String,
    api_key: Option<String>,
}

impl RoboflowDetector {
    pub fn new(
        base_url: impl Into<String>,
        model: impl Into<String>,
        api_key: Option<String>,
        timeout: Duration,
    ) -> Result<Self> {
        let client = reqwest::Client::builder()
            .timeout(timeout)
            .build()
            .map_err(|e| PipelineError::UpstreamDetection(format!("building http client: {e}")))?;
        Ok(Self {
            client,
            base_url: base_url.into().trim_end_matches('/').to_string(),
            model: model.into().trim_matches('/').to_string(),
            api_key,
        })
    }
}

impl HoldDetector for RoboflowDetector {
    async fn detect(&self, jpeg: &[u8], min_confidence: f32) -> Result<Vec<RawPrediction>> {
        let api_key = self
            .api_key
            .as_deref()
            .ok_or_else(|| PipelineError::UpstreamDetection("ROBOFLOW_API_KEY is not set".to_string()))?;

        let url = format!("{}/{}", self.base_url, self.model);
        // The hosted API takes the threshold as a percentage.
        let confidence = (min_confidence * 100.0).round() as u32;
        let response = self
            .client
            .post(&url)
            .query(&[("api_key", api_key.to_string()), ("confidence", confidence.to_string())])
            .header(reqwest::header::CONTENT_TYPE, "application/x-www-form-urlencoded")
            .body(STANDARD.encode(jpeg))
            .send()
            .await
            .map_err(|e| PipelineError::UpstreamDetection(format!("request to {url} failed: {e}")))?;

        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            return Err(PipelineError::UpstreamDetection(format!(
                "detector returned {status}: {}",
                body.chars().take(200).collect::<String>()
            )));
        }

        let parsed: PredictionResponse = response
            .json()
            .await
            .map_err(|e| PipelineError::UpstreamDetection(format!("malformed detector response: {e}")))?;
        tracing::debug!(count = parsed.predictions.len(), "detector responded");
        Ok(parsed.predictions)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parses_hosted_response() {
        let json = r#"{
            "time": 0.2,
            "image": {"width": 1024, "height": 1024},
            "predictions": [
                {"x": 100.5, "y": 200, "width": 40, "height": 30, "confidence": 0.91, "class": "hold", "class_id": 0},
                {"x": 10, "y": 20, "width": 8, "height": 6, "confidence": 0.45}
            ]
        }"#;
        let parsed: PredictionResponse = serde_json::from_str(json).unwrap();
        assert_eq!(parsed.predictions.len(), 2);
        assert_eq!(parsed.predictions[0].x, 100.5);
        assert_eq!(parsed.predictions[1].class, "hold");
    }

    #[tokio::test]
    async fn test_missing_api_key_is_upstream_failure() {
        let detector =
            RoboflowDetector::new("http://127.0.0.1:9", "walls/1", None, Duration::from_secs(1)).unwrap();
        let err = detector.detect(b"jpeg", 0.4).await.unwrap_err();
        assert!(matches!(err, PipelineError::UpstreamDetection(_)));
    }
}
