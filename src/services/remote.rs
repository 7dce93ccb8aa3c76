//! Remote sync adapter for the time study backend

use std::time::Duration;

use async_trait::async_trait;
use reqwest::{Client, Response, StatusCode};
use serde::{de::DeserializeOwned, Deserialize, Serialize};
use tracing::{debug, warn};

use crate::{
    error::TimerError,
    state::{Step, StepId, StudyId, StudyPatch, TimeStudy},
};

/// Persistence contract the session state machine relies on
#[async_trait]
pub trait RemoteSync: Send + Sync {
    /// Fetch the current representation of a study
    async fn fetch_study(&self, study_id: StudyId) -> Result<TimeStudy, TimerError>;

    /// Apply a partial update and return the authoritative result
    async fn update_study(&self, study_id: StudyId, patch: &StudyPatch) -> Result<TimeStudy, TimerError>;

    /// Persist the actual time of one step
    async fn save_step_time(&self, step_id: StepId, actual_seconds: u64) -> Result<Step, TimerError>;
}

#[derive(Debug, Serialize)]
struct StepTimeBody {
    actual_time: u64,
}

#[derive(Debug, Deserialize)]
struct BackendErrorBody {
    error: Option<String>,
}

/// `RemoteSync` over the backend's REST endpoints
#[derive(Debug, Clone)]
pub struct HttpRemoteSync {
    client: Client,
    base_url: String,
}

impl HttpRemoteSync {
    pub fn new(base_url: impl Into<String>, timeout: Duration) -> Result<Self, TimerError> {
        let client = Client::builder()
            .timeout(timeout)
            .build()
            .map_err(|e| TimerError::Internal(format!("failed to build http client: {}", e)))?;
        Ok(Self {
            client,
            base_url: base_url.into().trim_end_matches('/').to_string(),
        })
    }

    fn study_url(&self, study_id: StudyId) -> String {
        format!("{}/time_studies/{}", self.base_url, study_id)
    }

    fn step_url(&self, step_id: StepId) -> String {
        format!("{}/steps/{}", self.base_url, step_id)
    }

    /// Map an HTTP response to the adapter's error taxonomy
    async fn decode<T: DeserializeOwned>(response: Response, what: &str) -> Result<T, TimerError> {
        let status = response.status();
        if status.is_success() {
            return response.json::<T>().await.map_err(|e| {
                TimerError::Transport(format!("invalid {} payload from backend: {}", what, e))
            });
        }

        let body = response.text().await.unwrap_or_default();
        let message = serde_json::from_str::<BackendErrorBody>(&body)
            .ok()
            .and_then(|b| b.error)
            .unwrap_or_else(|| format!("http {}", status.as_u16()));
        warn!("Backend rejected {} request: {} ({})", what, status, message);

        Err(classify(status, what, message))
    }
}

fn classify(status: StatusCode, what: &str, message: String) -> TimerError {
    if status == StatusCode::NOT_FOUND {
        TimerError::NotFound(format!("{}: {}", what, message))
    } else if status.is_client_error() {
        TimerError::Validation(message)
    } else {
        TimerError::Transport(format!("backend error {}: {}", status.as_u16(), message))
    }
}

#[async_trait]
impl RemoteSync for HttpRemoteSync {
    async fn fetch_study(&self, study_id: StudyId) -> Result<TimeStudy, TimerError> {
        debug!("GET study {}", study_id);
        let response = self.client.get(self.study_url(study_id)).send().await?;
        Self::decode(response, &format!("study {}", study_id)).await
    }

    async fn update_study(&self, study_id: StudyId, patch: &StudyPatch) -> Result<TimeStudy, TimerError> {
        debug!("PUT study {} {:?}", study_id, patch);
        let response = self
            .client
            .put(self.study_url(study_id))
            .json(patch)
            .send()
            .await?;
        Self::decode(response, &format!("study {}", study_id)).await
    }

    async fn save_step_time(&self, step_id: StepId, actual_seconds: u64) -> Result<Step, TimerError> {
        debug!("PUT step {} actual_time={}", step_id, actual_seconds);
        let response = self
            .client
            .put(self.step_url(step_id))
            .json(&StepTimeBody {
                actual_time: actual_seconds,
            })
            .send()
            .await?;
        Self::decode(response, &format!("step {}", step_id)).await
    }
}
