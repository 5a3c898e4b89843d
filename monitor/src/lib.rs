//! Scheduling core for the traffic camera dashboard.
//!
//! Keeps a camera's per-minute vehicle counts current by polling on
//! wall-clock aligned interval boundaries, and loads the annotated frame for
//! whichever minute is selected. Everything runs on one cooperative event
//! loop driven by [`MonitorSession`].

pub mod artifact;
pub mod camera_refresh;
pub mod clock;
pub mod config;
pub mod error;
pub mod poller;
pub mod selection;
pub mod session;
pub mod source;
#[cfg(any(test, feature = "test-util"))]
pub mod test_util;

pub use artifact::{ArtifactLoader, ArtifactOutcome, DetectionHistogram, DisplayedArtifact};
pub use camera_refresh::CameraRefresher;
pub use clock::{ClockDisplay, ClockEvent, ClockTracker, LocalClock, WallClock};
pub use config::{MonitorArgs, MonitorConfig};
pub use error::{ConfigError, SelectionError};
pub use poller::{align_first_poll, IntervalPoller, PollContext, PollerPhase, PollerUpdate, SamplingInterval};
pub use selection::{SelectionDelta, SelectionState, SelectionStore};
pub use session::{DashboardView, MonitorSession, SessionStep};
pub use source::{CameraRegistry, DataSource};
