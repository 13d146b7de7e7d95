//! Dedicated contradiction classifier
//!
//! An alternative to asking a chat model for a verdict: a standalone service
//! scores whether two utterances of a dialogue contradict each other.
//! `POST /predict` with `{ "utterances": [...], "annotation_target_pair": [i, j] }`
//! answers `{ "prediction": ... }`.

use super::LlmError;
use async_trait::async_trait;
use reqwest::Client;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::time::Duration;

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct PredictRequest {
    pub utterances: Vec<String>,
    pub annotation_target_pair: [usize; 2],
}

impl PredictRequest {
    /// Compare the last two non-empty user utterances. `None` if there are
    /// fewer than two; silent turns are dropped before indexing.
    pub fn latest_pair(mut utterances: Vec<String>) -> Option<Self> {
        utterances.retain(|u| !u.trim().is_empty());
        let n = utterances.len();
        if n < 2 {
            return None;
        }
        Some(Self {
            utterances,
            annotation_target_pair: [n - 2, n - 1],
        })
    }
}

#[derive(Debug, Deserialize)]
struct PredictResponse {
    #[serde(default)]
    prediction: Value,
}

/// Contradiction classifier interface
#[async_trait]
pub trait PredictorService: Send + Sync {
    /// Returns the prediction rendered as text, `None` if the service
    /// answered without one
    async fn predict(&self, request: &PredictRequest) -> Result<Option<String>, LlmError>;
}

/// HTTP client for the classifier service
pub struct HttpPredictor {
    client: Client,
    url: String,
}

impl HttpPredictor {
    pub fn new(base_url: &str, timeout: Duration) -> Result<Self, LlmError> {
        let client = Client::builder()
            .timeout(timeout)
            .build()
            .map_err(|e| LlmError::unknown(format!("Failed to create HTTP client: {e}")))?;
        Ok(Self {
            client,
            url: format!("{}/predict", base_url.trim_end_matches('/')),
        })
    }
}

#[async_trait]
impl PredictorService for HttpPredictor {
    async fn predict(&self, request: &PredictRequest) -> Result<Option<String>, LlmError> {
        let start = std::time::Instant::now();
        let response = self
            .client
            .post(&self.url)
            .json(request)
            .send()
            .await
            .map_err(|e| LlmError::from_reqwest(&e))?;

        let status = response.status();
        let body = response
            .text()
            .await
            .map_err(|e| LlmError::network(format!("Failed to read response: {e}")))?;
        if !status.is_success() {
            return Err(LlmError::from_status(status, &body));
        }

        let prediction = serde_json::from_str::<PredictResponse>(&body)
            .ok()
            .and_then(|r| render_prediction(&r.prediction));

        tracing::info!(
            duration_ms = %start.elapsed().as_millis(),
            pair = ?request.annotation_target_pair,
            prediction = ?prediction,
            "Contradiction prediction completed"
        );
        Ok(prediction)
    }
}

/// Render a prediction of any JSON scalar type as text
fn render_prediction(value: &Value) -> Option<String> {
    match value {
        Value::String(s) => Some(s.clone()),
        Value::Bool(b) => Some(if *b { "contradiction" } else { "no_contradiction" }.to_string()),
        Value::Number(n) => Some(n.to_string()),
        _ => None,
    }
}
