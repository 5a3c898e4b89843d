//! Selection-driven loading of the annotated frame for one minute.
//!
//! Every request gets a sequence number; only the response to the most
//! recent request is applied. Earlier responses that resolve late are
//! dropped, so the displayed frame always matches the latest selection.

use std::sync::Arc;

use chrono::NaiveDate;
use monitor_shared::{Artifact, Detection, DetectionLabel, MonitorError};
use tokio::sync::mpsc::UnboundedSender;

use crate::source::DataSource;

/// Detection counts per label, in [`DetectionLabel::ALL`] order.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct DetectionHistogram([u32; 4]);

impl DetectionHistogram {
    /// Count detections by label. Unrecognized labels are skipped.
    pub fn from_detections(detections: &[Detection]) -> Self {
        let mut counts = [0u32; 4];
        for detection in detections {
            match detection.kind() {
                Some(label) => counts[label.index()] += 1,
                None => tracing::debug!("Skipping detection with unknown label {:?}", detection.label),
            }
        }
        Self(counts)
    }

    pub fn get(&self, label: DetectionLabel) -> u32 {
        self.0[label.index()]
    }

    /// Sum over known labels.
    pub fn total(&self) -> u32 {
        self.0.iter().sum()
    }

    pub fn iter(&self) -> impl Iterator<Item = (DetectionLabel, u32)> + '_ {
        DetectionLabel::ALL.iter().map(|label| (*label, self.get(*label)))
    }
}

/// The frame currently on screen and its breakdown.
#[derive(Debug, Clone, PartialEq)]
pub struct DisplayedArtifact {
    pub artifact: Artifact,
    pub histogram: DetectionHistogram,
}

impl DisplayedArtifact {
    pub fn new(artifact: Artifact) -> Self {
        let histogram = DetectionHistogram::from_detections(&artifact.detections);
        Self {
            artifact,
            histogram,
        }
    }

    pub fn minute(&self) -> u16 {
        self.artifact.minute
    }

    /// Every detection in the frame, including unknown labels.
    pub fn total_vehicles(&self) -> usize {
        self.artifact.detections.len()
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ArtifactRequest {
    pub seq: u64,
    pub camera: String,
    pub date: NaiveDate,
    pub minute: u16,
}

#[derive(Debug)]
pub enum ArtifactEvent {
    Loaded {
        request: ArtifactRequest,
        result: Result<Artifact, MonitorError>,
    },
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ArtifactOutcome {
    /// The frame for `minute` is now displayed.
    Applied { minute: u16 },
    /// Superseded by a newer request; discarded.
    Stale,
    /// The fetch failed; the previous frame stays on screen.
    Failed { minute: u16 },
}

pub struct ArtifactLoader<S> {
    source: Arc<S>,
    events: UnboundedSender<ArtifactEvent>,
    seq: u64,
    displayed: Option<DisplayedArtifact>,
}

impl<S: DataSource> ArtifactLoader<S> {
    pub fn new(source: Arc<S>, events: UnboundedSender<ArtifactEvent>) -> Self {
        Self {
            source,
            events,
            seq: 0,
            displayed: None,
        }
    }

    pub fn displayed(&self) -> Option<&DisplayedArtifact> {
        self.displayed.as_ref()
    }

    /// Sequence number of the latest request.
    pub fn seq(&self) -> u64 {
        self.seq
    }

    /// React to a selection change. Nothing is fetched without a camera or
    /// a selected minute.
    pub fn on_selection_changed(
        &mut self,
        camera: Option<&str>,
        date: NaiveDate,
        minute: Option<u16>,
    ) -> Option<ArtifactRequest> {
        let (Some(camera), Some(minute)) = (camera, minute) else {
            return None;
        };
        Some(self.load_artifact(camera, date, minute))
    }

    /// Issue a fetch that supersedes every earlier one.
    pub fn load_artifact(&mut self, camera: &str, date: NaiveDate, minute: u16) -> ArtifactRequest {
        self.seq += 1;
        let request = ArtifactRequest {
            seq: self.seq,
            camera: camera.to_string(),
            date,
            minute,
        };
        tracing::debug!("Loading artifact #{} for {} at minute {}", request.seq, camera, minute);

        let source = self.source.clone();
        let events = self.events.clone();
        let pending = request.clone();
        tokio::spawn(async move {
            let result = source
                .fetch_artifact(&pending.camera, pending.date, pending.minute)
                .await;
            let _ = events.send(ArtifactEvent::Loaded {
                request: pending,
                result,
            });
        });
        request
    }

    /// Apply a completed fetch if it is still the latest request.
    pub fn handle(&mut self, event: ArtifactEvent) -> ArtifactOutcome {
        let ArtifactEvent::Loaded { request, result } = event;
        if request.seq != self.seq {
            tracing::debug!(
                "Discarding artifact #{} for minute {}, latest is #{}",
                request.seq,
                request.minute,
                self.seq
            );
            return ArtifactOutcome::Stale;
        }

        match result {
            Ok(artifact) => {
                self.displayed = Some(DisplayedArtifact::new(artifact));
                ArtifactOutcome::Applied {
                    minute: request.minute,
                }
            }
            Err(e) => {
                tracing::warn!(
                    "Failed to load artifact for {} on {} at minute {}: {e}",
                    request.camera,
                    request.date,
                    request.minute
                );
                ArtifactOutcome::Failed {
                    minute: request.minute,
                }
            }
        }
    }

    /// Blank the display and invalidate every in-flight request.
    pub fn clear(&mut self) {
        self.seq += 1;
        self.displayed = None;
    }
}
