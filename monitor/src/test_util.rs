//! Deterministic stand-ins for the wall clock and the backend.
//!
//! Used by unit tests, integration tests and anyone embedding the core
//! without a live backend.

use std::collections::{HashMap, HashSet};
use std::sync::Mutex;
use std::time::Duration;

use chrono::{NaiveDate, NaiveDateTime};
use monitor_shared::{Artifact, BoundingBox, Detection, MonitorError, Sample};
use tokio::time::Instant;

use crate::clock::WallClock;
use crate::source::{CameraRegistry, DataSource};

/// Wall clock that starts at a fixed local time and advances with tokio's
/// clock, so `tokio::time::pause`/`advance` move it too.
#[derive(Debug, Clone)]
pub struct FakeClock {
    start: NaiveDateTime,
    origin: Instant,
}

impl FakeClock {
    pub fn starting_at(start: NaiveDateTime) -> Self {
        Self {
            start,
            origin: Instant::now(),
        }
    }
}

impl WallClock for FakeClock {
    fn now(&self) -> NaiveDateTime {
        let elapsed = Instant::now().duration_since(self.origin);
        self.start + chrono::Duration::from_std(elapsed).unwrap_or_else(|_| chrono::Duration::zero())
    }
}

/// A request observed by [`ScriptedSource`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SourceCall {
    Series { camera: String, date: NaiveDate },
    Sample { camera: String, minute: u16 },
    Artifact { camera: String, minute: u16 },
    Cameras { date: NaiveDate },
}

#[derive(Debug, Default)]
struct Script {
    series: HashMap<String, Vec<Sample>>,
    samples: HashMap<(String, u16), Sample>,
    artifacts: HashMap<(String, u16), Vec<Detection>>,
    cameras: Vec<String>,
    failing_samples: HashSet<u16>,
    failing_artifacts: HashSet<u16>,
    fail_cameras: bool,
    series_delays: HashMap<String, Duration>,
    artifact_delays: HashMap<u16, Duration>,
    calls: Vec<SourceCall>,
}

/// In-memory backend with injectable failures and per-request latency.
///
/// Data is keyed by camera and minute; dates are recorded in the call log
/// but otherwise ignored.
#[derive(Debug, Default)]
pub struct ScriptedSource {
    script: Mutex<Script>,
}

impl ScriptedSource {
    pub fn new() -> Self {
        Self::default()
    }

    fn with_script<R>(&self, f: impl FnOnce(&mut Script) -> R) -> R {
        let mut script = self.script.lock().unwrap_or_else(|e| e.into_inner());
        f(&mut script)
    }

    pub fn set_series(&self, camera: &str, samples: Vec<Sample>) {
        self.with_script(|s| s.series.insert(camera.to_string(), samples));
    }

    pub fn set_sample(&self, camera: &str, sample: Sample) {
        self.with_script(|s| s.samples.insert((camera.to_string(), sample.minute), sample));
    }

    /// Register an artifact whose detections carry the given labels.
    pub fn set_artifact(&self, camera: &str, minute: u16, labels: &[&str]) {
        let detections = labels
            .iter()
            .map(|label| Detection::new(*label, 0.9, BoundingBox::default()))
            .collect();
        self.with_script(|s| s.artifacts.insert((camera.to_string(), minute), detections));
    }

    pub fn set_cameras(&self, cameras: &[&str]) {
        self.with_script(|s| s.cameras = cameras.iter().map(|c| c.to_string()).collect());
    }

    pub fn fail_sample(&self, minute: u16) {
        self.with_script(|s| s.failing_samples.insert(minute));
    }

    pub fn fail_artifact(&self, minute: u16) {
        self.with_script(|s| s.failing_artifacts.insert(minute));
    }

    pub fn fail_cameras(&self, fail: bool) {
        self.with_script(|s| s.fail_cameras = fail);
    }

    pub fn delay_series(&self, camera: &str, delay: Duration) {
        self.with_script(|s| s.series_delays.insert(camera.to_string(), delay));
    }

    pub fn delay_artifact(&self, minute: u16, delay: Duration) {
        self.with_script(|s| s.artifact_delays.insert(minute, delay));
    }

    pub fn calls(&self) -> Vec<SourceCall> {
        self.with_script(|s| s.calls.clone())
    }

    pub fn sample_calls(&self) -> Vec<u16> {
        self.calls()
            .into_iter()
            .filter_map(|call| match call {
                SourceCall::Sample { minute, .. } => Some(minute),
                _ => None,
            })
            .collect()
    }

    pub fn series_calls(&self) -> usize {
        self.calls()
            .iter()
            .filter(|call| matches!(call, SourceCall::Series { .. }))
            .count()
    }
}

fn scripted_failure(what: &str) -> MonitorError {
    MonitorError::Connection(format!("scripted {what} failure"))
}

impl DataSource for ScriptedSource {
    async fn fetch_series(&self, camera: &str, date: NaiveDate) -> Result<Vec<Sample>, MonitorError> {
        let (samples, delay) = self.with_script(|s| {
            s.calls.push(SourceCall::Series {
                camera: camera.to_string(),
                date,
            });
            (
                s.series.get(camera).cloned().unwrap_or_default(),
                s.series_delays.get(camera).copied(),
            )
        });
        if let Some(delay) = delay {
            tokio::time::sleep(delay).await;
        }
        Ok(samples)
    }

    async fn fetch_sample(
        &self,
        camera: &str,
        _date: NaiveDate,
        minute: u16,
    ) -> Result<Option<Sample>, MonitorError> {
        self.with_script(|s| {
            s.calls.push(SourceCall::Sample {
                camera: camera.to_string(),
                minute,
            });
            if s.failing_samples.contains(&minute) {
                return Err(scripted_failure("sample"));
            }
            Ok(s.samples.get(&(camera.to_string(), minute)).copied())
        })
    }

    async fn fetch_artifact(
        &self,
        camera: &str,
        date: NaiveDate,
        minute: u16,
    ) -> Result<Artifact, MonitorError> {
        let (result, delay) = self.with_script(|s| {
            s.calls.push(SourceCall::Artifact {
                camera: camera.to_string(),
                minute,
            });
            let result = if s.failing_artifacts.contains(&minute) {
                Err(scripted_failure("artifact"))
            } else {
                s.artifacts
                    .get(&(camera.to_string(), minute))
                    .cloned()
                    .map(|detections| Artifact {
                        camera: camera.to_string(),
                        date,
                        minute,
                        image: minute.to_be_bytes().to_vec(),
                        detections,
                    })
                    .ok_or_else(|| MonitorError::ServerError {
                        status: 404,
                        message: "No images for the parameters sent".to_string(),
                    })
            };
            (result, s.artifact_delays.get(&minute).copied())
        });
        if let Some(delay) = delay {
            tokio::time::sleep(delay).await;
        }
        result
    }
}

impl CameraRegistry for ScriptedSource {
    async fn cameras(&self, date: NaiveDate) -> Result<Vec<String>, MonitorError> {
        self.with_script(|s| {
            s.calls.push(SourceCall::Cameras { date });
            if s.fail_cameras {
                Err(scripted_failure("camera list"))
            } else {
                Ok(s.cameras.clone())
            }
        })
    }
}
