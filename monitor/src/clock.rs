//! Minute-aligned wall clock ticks and calendar-day rollover detection.
//!
//! [`ClockTracker`] spawns one background task that first sleeps until the
//! next minute boundary and then ticks every 60 s, so steady-state ticks land
//! on the boundary no matter when the tracker was started.

use std::sync::Arc;
use std::time::Duration;

use chrono::{Local, NaiveDate, NaiveDateTime, NaiveTime, Timelike};
use tokio::sync::mpsc::UnboundedSender;
use tokio::task::JoinHandle;
use tokio::time::MissedTickBehavior;

/// Length of one steady-state tick.
pub const MINUTE: Duration = Duration::from_secs(60);

/// Source of local wall-clock time.
pub trait WallClock: Send + Sync + 'static {
    fn now(&self) -> NaiveDateTime;

    fn today(&self) -> NaiveDate {
        self.now().date()
    }
}

/// The host's local time zone.
#[derive(Debug, Clone, Copy, Default)]
pub struct LocalClock;

impl WallClock for LocalClock {
    fn now(&self) -> NaiveDateTime {
        Local::now().naive_local()
    }
}

/// Time remaining until the next minute boundary, in `(0, 60s]`.
pub fn until_next_minute(now: NaiveTime) -> Duration {
    // nanosecond() exceeds 1e9 during a leap second
    let millis = (now.nanosecond() / 1_000_000).min(999);
    let elapsed_ms = u64::from(now.second()) * 1000 + u64::from(millis);
    Duration::from_millis(60_000 - elapsed_ms)
}

/// Human readable clock labels, refreshed on every tick.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ClockDisplay {
    /// `dd/mm/yyyy`
    pub date: String,
    /// `HHhMMmin`
    pub time: String,
}

impl ClockDisplay {
    pub fn at(now: NaiveDateTime) -> Self {
        Self {
            date: now.format("%d/%m/%Y").to_string(),
            time: now.format("%Hh%Mmin").to_string(),
        }
    }
}

/// Remembers the last observed calendar day.
#[derive(Debug, Clone, Default)]
pub struct DayTracker {
    day: Option<NaiveDate>,
}

impl DayTracker {
    pub fn new() -> Self {
        Self::default()
    }

    /// Record `now` and return the new day if it differs from the previous
    /// observation. The first observation only seeds the tracker.
    pub fn observe(&mut self, now: NaiveDateTime) -> Option<NaiveDate> {
        let today = now.date();
        match self.day.replace(today) {
            Some(previous) if previous != today => Some(today),
            _ => None,
        }
    }

    pub fn day(&self) -> Option<NaiveDate> {
        self.day
    }
}

/// Events emitted by the clock task.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ClockEvent {
    /// Emitted once on start and at every minute boundary.
    Tick {
        now: NaiveDateTime,
        display: ClockDisplay,
    },
    /// The local calendar date changed since the previous tick.
    DayRollover { day: NaiveDate },
}

/// Owner of the minute-aligned timer task.
///
/// The task is aborted on [`ClockTracker::stop`] and on drop.
#[derive(Debug, Default)]
pub struct ClockTracker {
    handle: Option<JoinHandle<()>>,
}

impl ClockTracker {
    pub fn new() -> Self {
        Self::default()
    }

    /// Start ticking into `events`. A running tracker is restarted.
    pub fn start<C: WallClock>(&mut self, clock: Arc<C>, events: UnboundedSender<ClockEvent>) {
        self.stop();

        let handle = tokio::spawn(async move {
            let mut days = DayTracker::new();
            if !emit(&mut days, clock.now(), &events) {
                return;
            }

            tokio::time::sleep(until_next_minute(clock.now().time())).await;

            // First tick completes immediately, right on the boundary.
            let mut ticker = tokio::time::interval(MINUTE);
            ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);
            loop {
                ticker.tick().await;
                if !emit(&mut days, clock.now(), &events) {
                    tracing::debug!("Clock event receiver dropped, stopping clock task");
                    return;
                }
            }
        });

        self.handle = Some(handle);
    }

    /// Cancel the pending boundary sleep and the repeating tick. Idempotent.
    pub fn stop(&mut self) {
        if let Some(handle) = self.handle.take() {
            handle.abort();
        }
    }

    pub fn is_running(&self) -> bool {
        self.handle.as_ref().is_some_and(|h| !h.is_finished())
    }
}

impl Drop for ClockTracker {
    fn drop(&mut self) {
        self.stop();
    }
}

/// Send a tick, preceded by a rollover event when the day changed.
/// Returns false once the receiver is gone.
fn emit(days: &mut DayTracker, now: NaiveDateTime, events: &UnboundedSender<ClockEvent>) -> bool {
    if let Some(day) = days.observe(now) {
        tracing::info!("Calendar day rolled over to {day}");
        if events.send(ClockEvent::DayRollover { day }).is_err() {
            return false;
        }
    }
    events
        .send(ClockEvent::Tick {
            now,
            display: ClockDisplay::at(now),
        })
        .is_ok()
}
