//! HTTP client for the traffic camera backend API.
//!
//! All four read endpoints used by the dashboard are consolidated here so
//! error mapping and query encoding stay consistent.

use chrono::NaiveDate;
use reqwest::StatusCode;
use serde::de::DeserializeOwned;

use crate::time_format::{date_param, time_param};
use crate::types::{Artifact, ArtifactResponse, Sample};

/// Error type for backend operations.
#[derive(Debug, thiserror::Error)]
pub enum MonitorError {
    /// HTTP request failed
    #[error("HTTP error: {0}")]
    Http(String),
    /// Failed to parse response
    #[error("Parse error: {0}")]
    Parse(String),
    /// Connection failed
    #[error("Connection error: {0}")]
    Connection(String),
    /// Request timed out
    #[error("Timeout")]
    Timeout,
    /// Server returned an error status
    #[error("Server error (status {status}): {message}")]
    ServerError { status: u16, message: String },
    /// Image payload was not valid base64
    #[error("Decode error: {0}")]
    Decode(String),
    /// Base URL could not be used
    #[error("Invalid URL: {0}")]
    InvalidUrl(String),
}

impl From<reqwest::Error> for MonitorError {
    fn from(err: reqwest::Error) -> Self {
        if err.is_timeout() {
            MonitorError::Timeout
        } else if err.is_connect() {
            MonitorError::Connection(err.to_string())
        } else if err.is_decode() {
            MonitorError::Parse(err.to_string())
        } else {
            MonitorError::Http(err.to_string())
        }
    }
}

/// Client for the backend `/image/*` endpoints.
#[derive(Debug, Clone)]
pub struct MonitoringClient {
    base_url: String,
    http: reqwest::Client,
}

impl MonitoringClient {
    /// Create a new client pointing to the given base URL.
    ///
    /// # Arguments
    ///
    /// * `base_url` - Where the API is mounted (e.g., "http://localhost:8080/api")
    pub fn new(base_url: &str) -> Result<Self, MonitorError> {
        let base_url = base_url.trim_end_matches('/').to_string();
        if !(base_url.starts_with("http://") || base_url.starts_with("https://")) {
            return Err(MonitorError::InvalidUrl(base_url));
        }
        Ok(Self {
            base_url,
            http: reqwest::Client::new(),
        })
    }

    /// Get the base URL this client is configured for.
    pub fn base_url(&self) -> &str {
        &self.base_url
    }

    fn url(&self, path: &str) -> String {
        format!("{}{}", self.base_url, path)
    }

    async fn send(
        &self,
        path: &str,
        query: &[(&str, String)],
    ) -> Result<reqwest::Response, MonitorError> {
        Ok(self.http.get(self.url(path)).query(query).send().await?)
    }

    async fn read_json<T: DeserializeOwned>(response: reqwest::Response) -> Result<T, MonitorError> {
        if !response.status().is_success() {
            return Err(MonitorError::ServerError {
                status: response.status().as_u16(),
                message: response
                    .text()
                    .await
                    .unwrap_or_else(|_| "Unknown error".to_string()),
            });
        }

        response
            .json::<T>()
            .await
            .map_err(|e| MonitorError::Parse(e.to_string()))
    }

    async fn get<T: DeserializeOwned>(
        &self,
        path: &str,
        query: &[(&str, String)],
    ) -> Result<T, MonitorError> {
        let response = self.send(path, query).await?;
        Self::read_json(response).await
    }

    /// Get every sample recorded for a camera on a date, one per minute.
    pub async fn get_series(&self, camera: &str, date: NaiveDate) -> Result<Vec<Sample>, MonitorError> {
        self.get(
            "/image/general",
            &[("camera", camera.to_string()), ("date", date_param(date))],
        )
        .await
    }

    /// Get the sample for a single minute.
    ///
    /// # Returns
    ///
    /// `Ok(None)` when the backend has no frame for that minute yet.
    pub async fn get_sample(
        &self,
        camera: &str,
        date: NaiveDate,
        minute: u16,
    ) -> Result<Option<Sample>, MonitorError> {
        let response = self
            .send(
                "/image/specific/less",
                &[
                    ("camera", camera.to_string()),
                    ("date", date_param(date)),
                    ("time", time_param(minute)),
                ],
            )
            .await?;

        if response.status() == StatusCode::NOT_FOUND {
            return Ok(None);
        }
        Self::read_json(response).await.map(Some)
    }

    /// Get the annotated frame and detections for a single minute.
    pub async fn get_full_image(
        &self,
        camera: &str,
        date: NaiveDate,
        minute: u16,
    ) -> Result<Artifact, MonitorError> {
        let response: ArtifactResponse = self
            .get(
                "/image/specific",
                &[
                    ("camera", camera.to_string()),
                    ("date", date_param(date)),
                    ("time", time_param(minute)),
                    ("annotated", "true".to_string()),
                ],
            )
            .await?;
        response.into_artifact(date, minute)
    }

    /// Get the cameras that recorded anything on a date.
    pub async fn get_cameras(&self, date: NaiveDate) -> Result<Vec<String>, MonitorError> {
        self.get("/image/cameras", &[("date", date_param(date))])
            .await
    }
}
