//! Shared, observable selection state.
//!
//! The store is the single write point for which camera, day and minute are
//! on screen. Writers go through [`SelectionStore`] methods, which keep the
//! invariants (the selected minute is inside the day and on an interval
//! boundary); readers either take a snapshot or subscribe for changes.

use std::sync::Arc;

use chrono::NaiveDate;
use monitor_shared::MINUTES_PER_DAY;
use tokio::sync::watch;

use crate::error::SelectionError;
use crate::poller::{PollContext, SamplingInterval};

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SelectionState {
    pub camera: Option<String>,
    /// Cameras with data today, as last reported by the registry.
    pub cameras: Vec<String>,
    pub date: NaiveDate,
    pub minute: Option<u16>,
    pub interval: SamplingInterval,
    /// Newly polled samples become the selected minute.
    pub auto_follow: bool,
    day_generation: u64,
}

impl SelectionState {
    pub fn new(date: NaiveDate) -> Self {
        Self {
            camera: None,
            cameras: Vec::new(),
            date,
            minute: None,
            interval: SamplingInterval::default(),
            auto_follow: true,
            day_generation: 0,
        }
    }

    /// Bumped every time the store replaces the camera or the date.
    pub fn day_generation(&self) -> u64 {
        self.day_generation
    }

    /// The polling context this selection calls for, if a camera is chosen.
    pub fn poll_context(&self) -> Option<PollContext> {
        self.camera.as_ref().map(|camera| PollContext {
            camera: camera.clone(),
            date: self.date,
            interval: self.interval,
        })
    }
}

/// Which fields differ between two selection snapshots.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct SelectionDelta {
    pub camera: bool,
    pub cameras: bool,
    pub date: bool,
    pub minute: bool,
    pub interval: bool,
    pub auto_follow: bool,
    /// The camera or date was replaced, possibly with the same value.
    pub day_reset: bool,
}

impl SelectionDelta {
    pub fn between(old: &SelectionState, new: &SelectionState) -> Self {
        Self {
            camera: old.camera != new.camera,
            cameras: old.cameras != new.cameras,
            date: old.date != new.date,
            minute: old.minute != new.minute,
            interval: old.interval != new.interval,
            auto_follow: old.auto_follow != new.auto_follow,
            day_reset: old.day_generation != new.day_generation,
        }
    }

    /// Camera or day changed: the displayed day is a different one.
    pub fn day_changed(&self) -> bool {
        self.camera || self.date || self.day_reset
    }

    /// Anything that requires a new polling context.
    pub fn context_changed(&self) -> bool {
        self.day_changed() || self.interval
    }

    pub fn is_empty(&self) -> bool {
        *self == Self::default()
    }
}

/// Publish-subscribe store for [`SelectionState`]. Cheap to clone; all
/// clones share one state.
#[derive(Debug, Clone)]
pub struct SelectionStore {
    tx: Arc<watch::Sender<SelectionState>>,
}

impl SelectionStore {
    pub fn new(initial: SelectionState) -> Self {
        let (tx, _) = watch::channel(initial);
        Self { tx: Arc::new(tx) }
    }

    pub fn snapshot(&self) -> SelectionState {
        self.tx.borrow().clone()
    }

    /// A receiver notified after every effective write.
    pub fn subscribe(&self) -> watch::Receiver<SelectionState> {
        self.tx.subscribe()
    }

    fn update(&self, f: impl FnOnce(&mut SelectionState) -> bool) -> bool {
        self.tx.send_if_modified(f)
    }

    /// Select a camera. A different camera clears the selected minute.
    pub fn set_camera(&self, camera: Option<String>) -> bool {
        self.update(|state| {
            if state.camera == camera {
                return false;
            }
            state.camera = camera;
            state.minute = None;
            state.day_generation += 1;
            true
        })
    }

    /// Select a day. A different day clears the selected minute.
    pub fn set_date(&self, date: NaiveDate) -> bool {
        self.update(|state| {
            if state.date == date {
                return false;
            }
            state.date = date;
            state.minute = None;
            state.day_generation += 1;
            true
        })
    }

    fn check_minute(&self, minute: u16) -> Result<(), SelectionError> {
        if minute >= MINUTES_PER_DAY {
            return Err(SelectionError::OutOfRange(minute));
        }
        let interval = self.tx.borrow().interval;
        if !interval.is_aligned(minute) {
            return Err(SelectionError::Misaligned {
                minute,
                interval: interval.minutes(),
            });
        }
        Ok(())
    }

    /// Select a minute, or clear the selection with `None`.
    pub fn select_minute(&self, minute: Option<u16>) -> Result<bool, SelectionError> {
        if let Some(m) = minute {
            self.check_minute(m)?;
        }
        Ok(self.update(|state| {
            if state.minute == minute {
                return false;
            }
            state.minute = minute;
            true
        }))
    }

    /// Select `minute` only if no minute is selected yet. A selection made
    /// by someone else in the meantime wins.
    pub fn select_minute_if_unset(&self, minute: u16) -> Result<bool, SelectionError> {
        self.check_minute(minute)?;
        Ok(self.update(|state| {
            if state.minute.is_some() {
                return false;
            }
            state.minute = Some(minute);
            true
        }))
    }

    pub fn clear_minute(&self) -> bool {
        self.update(|state| state.minute.take().is_some())
    }

    /// Change the sampling interval, dropping a selected minute that is no
    /// longer on a boundary.
    pub fn set_interval(&self, interval: SamplingInterval) -> bool {
        self.update(|state| {
            if state.interval == interval {
                return false;
            }
            state.interval = interval;
            if state.minute.is_some_and(|m| !interval.is_aligned(m)) {
                state.minute = None;
            }
            true
        })
    }

    pub fn set_auto_follow(&self, auto_follow: bool) -> bool {
        self.update(|state| {
            if state.auto_follow == auto_follow {
                return false;
            }
            state.auto_follow = auto_follow;
            true
        })
    }

    /// Publish the registry's camera list.
    ///
    /// If nothing is selected, or the selected camera is no longer listed,
    /// the first listed camera is selected. An empty list keeps the current
    /// camera.
    pub fn set_cameras(&self, cameras: Vec<String>) -> bool {
        self.update(|state| {
            let mut changed = false;
            if let Some(first) = cameras.first() {
                let listed = state
                    .camera
                    .as_ref()
                    .is_some_and(|current| cameras.contains(current));
                if !listed {
                    tracing::info!("Switching to camera {first}");
                    state.camera = Some(first.clone());
                    state.minute = None;
                    state.day_generation += 1;
                    changed = true;
                }
            }
            if state.cameras != cameras {
                state.cameras = cameras;
                changed = true;
            }
            changed
        })
    }
}
