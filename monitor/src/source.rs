//! Data source seams the scheduling core depends on.
//!
//! The poller and artifact loader only see these traits; the HTTP client is
//! one implementation and `test_util::ScriptedSource` is another.

use std::future::Future;

use chrono::NaiveDate;
use monitor_shared::{Artifact, MonitorError, MonitoringClient, Sample};

/// Per-camera vehicle counts and annotated frames.
pub trait DataSource: Send + Sync + 'static {
    /// Every sample for the day, at per-minute granularity.
    fn fetch_series(
        &self,
        camera: &str,
        date: NaiveDate,
    ) -> impl Future<Output = Result<Vec<Sample>, MonitorError>> + Send;

    /// The sample for one minute, `None` if nothing was recorded.
    fn fetch_sample(
        &self,
        camera: &str,
        date: NaiveDate,
        minute: u16,
    ) -> impl Future<Output = Result<Option<Sample>, MonitorError>> + Send;

    fn fetch_artifact(
        &self,
        camera: &str,
        date: NaiveDate,
        minute: u16,
    ) -> impl Future<Output = Result<Artifact, MonitorError>> + Send;
}

/// Which cameras have data on a given date.
pub trait CameraRegistry: Send + Sync + 'static {
    fn cameras(&self, date: NaiveDate)
        -> impl Future<Output = Result<Vec<String>, MonitorError>> + Send;
}

impl DataSource for MonitoringClient {
    async fn fetch_series(&self, camera: &str, date: NaiveDate) -> Result<Vec<Sample>, MonitorError> {
        self.get_series(camera, date).await
    }

    async fn fetch_sample(
        &self,
        camera: &str,
        date: NaiveDate,
        minute: u16,
    ) -> Result<Option<Sample>, MonitorError> {
        self.get_sample(camera, date, minute).await
    }

    async fn fetch_artifact(
        &self,
        camera: &str,
        date: NaiveDate,
        minute: u16,
    ) -> Result<Artifact, MonitorError> {
        self.get_full_image(camera, date, minute).await
    }
}

impl CameraRegistry for MonitoringClient {
    async fn cameras(&self, date: NaiveDate) -> Result<Vec<String>, MonitorError> {
        self.get_cameras(date).await
    }
}
