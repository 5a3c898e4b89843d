//! Types and client shared by everything that talks to the traffic camera
//! backend.
//!
//! The backend counts vehicles in camera snapshots taken once per minute.
//! [`MonitoringClient`] exposes its four read endpoints; the types in
//! [`types`] mirror the JSON it returns.

pub mod client;
pub mod time_format;
pub mod types;

pub use client::{MonitorError, MonitoringClient};
pub use time_format::{chart_label, date_param, minute_of_day, parse_date_param, time_param};
pub use types::{
    Artifact, ArtifactResponse, BoundingBox, Detection, DetectionLabel, Sample, MINUTES_PER_DAY,
};
