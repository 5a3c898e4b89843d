//! Vehicle count and detection types returned by the backend.

use std::fmt;

use base64::Engine;
use chrono::{NaiveDate, NaiveDateTime};
use serde::{Deserialize, Serialize};

use crate::client::MonitorError;

/// Number of minutes in one local day. Minute-of-day values live in `[0, MINUTES_PER_DAY)`.
pub const MINUTES_PER_DAY: u16 = 1440;

/// One vehicle count observation for a camera.
///
/// On the wire this is the backend's `{ "time": .., "number": .. }` object,
/// where `time` is minutes since local midnight.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct Sample {
    #[serde(rename = "time")]
    pub minute: u16,
    #[serde(rename = "number")]
    pub count: u32,
}

impl Sample {
    pub fn new(minute: u16, count: u32) -> Self {
        Self { minute, count }
    }
}

/// Vehicle classes the detection model emits.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum DetectionLabel {
    Car,
    Motorcycle,
    Bus,
    Vehicle,
}

impl DetectionLabel {
    /// All labels in histogram order.
    pub const ALL: [DetectionLabel; 4] = [
        DetectionLabel::Car,
        DetectionLabel::Motorcycle,
        DetectionLabel::Bus,
        DetectionLabel::Vehicle,
    ];

    /// Parse the label string used by the backend. Unknown labels yield `None`.
    pub fn from_label(label: &str) -> Option<Self> {
        match label {
            "Car" => Some(DetectionLabel::Car),
            "Motorcycle" => Some(DetectionLabel::Motorcycle),
            "Bus" => Some(DetectionLabel::Bus),
            "Vehicle" => Some(DetectionLabel::Vehicle),
            _ => None,
        }
    }

    /// Position of this label in [`DetectionLabel::ALL`].
    pub fn index(&self) -> usize {
        match self {
            DetectionLabel::Car => 0,
            DetectionLabel::Motorcycle => 1,
            DetectionLabel::Bus => 2,
            DetectionLabel::Vehicle => 3,
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            DetectionLabel::Car => "Car",
            DetectionLabel::Motorcycle => "Motorcycle",
            DetectionLabel::Bus => "Bus",
            DetectionLabel::Vehicle => "Vehicle",
        }
    }
}

impl fmt::Display for DetectionLabel {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Pixel-space box corners of a detection.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize, Default)]
pub struct BoundingBox {
    pub x1: f64,
    pub y1: f64,
    pub x2: f64,
    pub y2: f64,
}

/// A single object detection within an annotated frame.
///
/// The label is kept as the raw string so that frames containing classes
/// this client does not know about still deserialize.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Detection {
    pub label: String,
    pub confidence: f64,
    #[serde(flatten)]
    pub bbox: BoundingBox,
}

impl Detection {
    pub fn new(label: impl Into<String>, confidence: f64, bbox: BoundingBox) -> Self {
        Self {
            label: label.into(),
            confidence,
            bbox,
        }
    }

    /// Known label for this detection, if any.
    pub fn kind(&self) -> Option<DetectionLabel> {
        DetectionLabel::from_label(&self.label)
    }
}

/// Full image response from the `/image/specific` endpoint.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct ArtifactResponse {
    pub camera: String,
    /// Capture time; older backends omit it
    #[serde(default)]
    #[serde(skip_serializing_if = "Option::is_none")]
    pub datetime: Option<NaiveDateTime>,
    /// Base64-encoded (annotated) JPEG
    pub image: String,
    #[serde(default)]
    pub detections: Vec<Detection>,
}

impl ArtifactResponse {
    /// Decode the image payload and attach the request coordinates.
    pub fn into_artifact(self, date: NaiveDate, minute: u16) -> Result<Artifact, MonitorError> {
        let image = base64::engine::general_purpose::STANDARD
            .decode(self.image.as_bytes())
            .map_err(|e| MonitorError::Decode(e.to_string()))?;

        Ok(Artifact {
            camera: self.camera,
            date,
            minute,
            image,
            detections: self.detections,
        })
    }
}

/// Decoded annotated frame plus its detections for one camera minute.
#[derive(Clone, PartialEq)]
pub struct Artifact {
    pub camera: String,
    pub date: NaiveDate,
    pub minute: u16,
    pub image: Vec<u8>,
    pub detections: Vec<Detection>,
}

impl fmt::Debug for Artifact {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Artifact")
            .field("camera", &self.camera)
            .field("date", &self.date)
            .field("minute", &self.minute)
            .field("image_bytes", &self.image.len())
            .field("detections", &self.detections.len())
            .finish()
    }
}
