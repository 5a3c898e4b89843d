//! Interval-aligned polling of per-minute vehicle counts.
//!
//! One polling context exists per (camera, date, interval). Reconfiguring
//! aborts the context's timer task, clears the series and peak, bumps the
//! context epoch and starts over with a fresh day load and a fresh
//! alignment. Fetches already in flight are not cancelled; their results
//! carry the epoch they were issued under and are dropped if it is stale.
//!
//! Timing of the first poll: with `i` the interval in minutes and `m:s` the
//! current minute and second,
//!
//! ```text
//! delay = i*60 - (m mod i)*60 - s + 30      (seconds)
//! if delay > i*60 { delay -= i*60 }
//! ```
//!
//! The `+30` lets the backend finish processing the boundary frame before it
//! is requested. Subsequent polls repeat every `i` minutes.

use std::fmt;
use std::sync::Arc;
use std::time::Duration;

use chrono::{NaiveDate, NaiveTime, Timelike};
use monitor_shared::{minute_of_day, MonitorError, Sample, MINUTES_PER_DAY};
use serde::{Deserialize, Serialize};
use tokio::sync::mpsc::UnboundedSender;
use tokio::task::JoinHandle;
use tokio::time::MissedTickBehavior;

use crate::error::ConfigError;
use crate::source::DataSource;

/// Seconds after an interval boundary at which that boundary is polled.
pub const GRACE_PERIOD_SECS: u32 = 30;

/// Minutes between displayed and polled samples.
///
/// Always a positive divisor of 60, so minute-of-hour and minute-of-day
/// agree modulo the interval.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(try_from = "u16", into = "u16")]
pub struct SamplingInterval(u16);

impl SamplingInterval {
    /// Intervals offered in the settings screen.
    pub const PRESETS: [u16; 4] = [5, 10, 20, 30];

    pub fn new(minutes: u16) -> Result<Self, ConfigError> {
        if minutes == 0 || 60 % minutes != 0 {
            return Err(ConfigError::InvalidInterval(minutes));
        }
        Ok(Self(minutes))
    }

    pub fn minutes(self) -> u16 {
        self.0
    }

    pub fn period(self) -> Duration {
        Duration::from_secs(u64::from(self.0) * 60)
    }

    pub fn is_aligned(self, minute: u16) -> bool {
        minute % self.0 == 0
    }

    /// The minute one interval after `minute`, wrapping at midnight.
    pub fn advance(self, minute: u16) -> u16 {
        (minute + self.0) % MINUTES_PER_DAY
    }

    /// Largest aligned minute not after `minute`.
    pub fn floor(self, minute: u16) -> u16 {
        minute - minute % self.0
    }
}

impl Default for SamplingInterval {
    fn default() -> Self {
        Self(5)
    }
}

impl TryFrom<u16> for SamplingInterval {
    type Error = ConfigError;

    fn try_from(minutes: u16) -> Result<Self, Self::Error> {
        Self::new(minutes)
    }
}

impl From<SamplingInterval> for u16 {
    fn from(interval: SamplingInterval) -> Self {
        interval.0
    }
}

impl fmt::Display for SamplingInterval {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} min", self.0)
    }
}

/// Raw first-poll delay in seconds, before normalization.
pub fn raw_first_delay_secs(minute: u32, second: u32, interval: SamplingInterval) -> u32 {
    let period = u32::from(interval.minutes()) * 60;
    period - (minute % u32::from(interval.minutes())) * 60 - second + GRACE_PERIOD_SECS
}

/// When the first poll of a context fires and which minute it fetches.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Alignment {
    pub delay: Duration,
    /// The boundary the grace period waited for.
    pub first_minute: u16,
}

/// Compute the first poll for a context started at `now`.
///
/// The resulting delay lies in `(0, interval]` and the poll fires
/// [`GRACE_PERIOD_SECS`] after an interval boundary.
pub fn align_first_poll(now: NaiveTime, interval: SamplingInterval) -> Alignment {
    let period = u32::from(interval.minutes()) * 60;
    let mut delay_secs = raw_first_delay_secs(now.minute(), now.second(), interval);
    if delay_secs > period {
        delay_secs -= period;
    }

    let (fires_at, _) = now
        .with_nanosecond(0)
        .unwrap_or(now)
        .overflowing_add_signed(chrono::Duration::seconds(i64::from(delay_secs)));

    Alignment {
        delay: Duration::from_secs(u64::from(delay_secs)),
        first_minute: interval.floor(minute_of_day(fires_at)),
    }
}

/// Interval-filtered samples for the active day, in minute order.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Series {
    samples: Vec<Sample>,
}

impl Series {
    pub fn new() -> Self {
        Self::default()
    }

    /// Keep only samples on interval boundaries.
    pub fn from_day(day: &[Sample], interval: SamplingInterval) -> Self {
        let mut samples: Vec<Sample> = day
            .iter()
            .copied()
            .filter(|s| interval.is_aligned(s.minute))
            .collect();
        samples.sort_by_key(|s| s.minute);
        Self { samples }
    }

    /// Append a polled sample. Polls arrive in increasing minute order.
    pub fn push(&mut self, sample: Sample) {
        self.samples.push(sample);
    }

    /// The sample with the highest minute.
    pub fn latest(&self) -> Option<Sample> {
        self.samples.iter().copied().max_by_key(|s| s.minute)
    }

    pub fn samples(&self) -> &[Sample] {
        &self.samples
    }

    pub fn len(&self) -> usize {
        self.samples.len()
    }

    pub fn is_empty(&self) -> bool {
        self.samples.is_empty()
    }

    pub fn clear(&mut self) {
        self.samples.clear();
    }
}

/// Largest count seen today, across every minute regardless of interval.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct RunningPeak(u32);

impl RunningPeak {
    pub fn from_samples(samples: &[Sample]) -> Self {
        Self(samples.iter().map(|s| s.count).max().unwrap_or(0))
    }

    pub fn observe(&mut self, count: u32) {
        self.0 = self.0.max(count);
    }

    pub fn value(self) -> u32 {
        self.0
    }

    pub fn reset(&mut self) {
        self.0 = 0;
    }
}

/// The (camera, date, interval) triple a polling context serves.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PollContext {
    pub camera: String,
    pub date: NaiveDate,
    pub interval: SamplingInterval,
}

/// Lifecycle of a polling context.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum PollerPhase {
    /// No context, or a context for a past date that is never polled.
    #[default]
    Idle,
    /// Waiting for the first aligned poll.
    Aligning { first_minute: u16 },
    /// Repeating every interval; `next_minute` is the upcoming target.
    Polling { next_minute: u16 },
    /// Old context torn down, new one not yet armed.
    Reconfiguring,
    /// Torn down by shutdown or rollover.
    Stopped,
}

impl PollerPhase {
    fn accepts_polls(self) -> bool {
        matches!(self, PollerPhase::Aligning { .. } | PollerPhase::Polling { .. })
    }
}

/// Messages from the poller's timer and fetch tasks back to its owner.
#[derive(Debug)]
pub enum PollerEvent {
    SeriesLoaded {
        epoch: u64,
        result: Result<Vec<Sample>, MonitorError>,
    },
    PollDue {
        epoch: u64,
        minute: u16,
    },
    SampleLoaded {
        epoch: u64,
        minute: u16,
        result: Result<Option<Sample>, MonitorError>,
    },
}

impl PollerEvent {
    pub fn epoch(&self) -> u64 {
        match self {
            PollerEvent::SeriesLoaded { epoch, .. }
            | PollerEvent::PollDue { epoch, .. }
            | PollerEvent::SampleLoaded { epoch, .. } => *epoch,
        }
    }
}

/// What handling a [`PollerEvent`] changed.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum PollerUpdate {
    /// The day series replaced the previous one. `latest` is the most recent
    /// aligned sample, if any.
    SeriesReady { latest: Option<Sample> },
    /// A poll fired and its fetch was issued.
    Polling { minute: u16 },
    /// A polled sample was appended.
    Appended(Sample),
    /// The poll returned nothing for this minute; the series has a gap.
    Missing { minute: u16 },
    /// The fetch failed; the schedule is unaffected.
    FetchFailed { minute: Option<u16> },
    /// The event belonged to a torn-down context.
    Stale,
}

/// Keeps the series for the active context current.
pub struct IntervalPoller<S> {
    source: Arc<S>,
    events: UnboundedSender<PollerEvent>,
    context: Option<PollContext>,
    epoch: u64,
    phase: PollerPhase,
    series: Series,
    peak: RunningPeak,
    timer: Option<JoinHandle<()>>,
}

impl<S: DataSource> IntervalPoller<S> {
    pub fn new(source: Arc<S>, events: UnboundedSender<PollerEvent>) -> Self {
        Self {
            source,
            events,
            context: None,
            epoch: 0,
            phase: PollerPhase::Idle,
            series: Series::new(),
            peak: RunningPeak::default(),
            timer: None,
        }
    }

    pub fn context(&self) -> Option<&PollContext> {
        self.context.as_ref()
    }

    pub fn epoch(&self) -> u64 {
        self.epoch
    }

    pub fn phase(&self) -> PollerPhase {
        self.phase
    }

    pub fn series(&self) -> &Series {
        &self.series
    }

    pub fn peak(&self) -> u32 {
        self.peak.value()
    }

    fn transition(&mut self, next: PollerPhase) {
        if self.phase != next {
            tracing::debug!("Poller phase {:?} -> {:?}", self.phase, next);
            self.phase = next;
        }
    }

    /// Cancel the timer, drop day state and invalidate in-flight fetches.
    fn teardown(&mut self) {
        if let Some(timer) = self.timer.take() {
            timer.abort();
        }
        self.epoch += 1;
        self.series.clear();
        self.peak.reset();
    }

    /// Replace the active context and start it from scratch.
    ///
    /// `now` is the local wall-clock time; timers are only armed when the
    /// context's date is `now`'s date.
    pub fn reconfigure(&mut self, context: PollContext, now: chrono::NaiveDateTime) {
        self.teardown();
        if self.phase != PollerPhase::Idle {
            self.transition(PollerPhase::Reconfiguring);
        }
        tracing::info!(
            "Polling camera {} on {} every {}",
            context.camera,
            context.date,
            context.interval
        );

        self.load_initial_series(&context);

        if context.date == now.date() {
            let alignment = align_first_poll(now.time(), context.interval);
            self.arm(alignment, context.interval);
            self.transition(PollerPhase::Aligning {
                first_minute: alignment.first_minute,
            });
        } else {
            tracing::debug!("{} is not today, polling disabled", context.date);
            self.transition(PollerPhase::Idle);
        }
        self.context = Some(context);
    }

    /// Tear down and forget the active context.
    pub fn stop(&mut self) {
        self.teardown();
        self.context = None;
        self.transition(PollerPhase::Stopped);
    }

    fn load_initial_series(&self, context: &PollContext) {
        let source = self.source.clone();
        let events = self.events.clone();
        let epoch = self.epoch;
        let camera = context.camera.clone();
        let date = context.date;
        tokio::spawn(async move {
            let result = source.fetch_series(&camera, date).await;
            let _ = events.send(PollerEvent::SeriesLoaded { epoch, result });
        });
    }

    fn arm(&mut self, alignment: Alignment, interval: SamplingInterval) {
        let events = self.events.clone();
        let epoch = self.epoch;
        tracing::debug!(
            "First poll for minute {} in {:?}",
            alignment.first_minute,
            alignment.delay
        );

        self.timer = Some(tokio::spawn(async move {
            tokio::time::sleep(alignment.delay).await;
            let mut minute = alignment.first_minute;
            if events.send(PollerEvent::PollDue { epoch, minute }).is_err() {
                return;
            }

            let period = interval.period();
            let mut ticker = tokio::time::interval_at(tokio::time::Instant::now() + period, period);
            ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);
            loop {
                ticker.tick().await;
                minute = interval.advance(minute);
                if events.send(PollerEvent::PollDue { epoch, minute }).is_err() {
                    return;
                }
            }
        }));
    }

    fn fetch_sample(&self, minute: u16) {
        let Some(context) = &self.context else {
            return;
        };
        let source = self.source.clone();
        let events = self.events.clone();
        let epoch = self.epoch;
        let camera = context.camera.clone();
        let date = context.date;
        tokio::spawn(async move {
            let result = source.fetch_sample(&camera, date, minute).await;
            let _ = events.send(PollerEvent::SampleLoaded {
                epoch,
                minute,
                result,
            });
        });
    }

    /// Apply a timer or fetch result.
    pub fn handle(&mut self, event: PollerEvent) -> PollerUpdate {
        if event.epoch() != self.epoch {
            tracing::debug!("Dropping poller event from epoch {}", event.epoch());
            return PollerUpdate::Stale;
        }

        match event {
            PollerEvent::SeriesLoaded { result, .. } => self.apply_series(result),
            PollerEvent::PollDue { minute, .. } => {
                if !self.phase.accepts_polls() {
                    return PollerUpdate::Stale;
                }
                let interval = self
                    .context
                    .as_ref()
                    .map(|c| c.interval)
                    .unwrap_or_default();
                self.transition(PollerPhase::Polling {
                    next_minute: interval.advance(minute),
                });
                self.fetch_sample(minute);
                PollerUpdate::Polling { minute }
            }
            PollerEvent::SampleLoaded { minute, result, .. } => self.apply_sample(minute, result),
        }
    }

    fn apply_series(&mut self, result: Result<Vec<Sample>, MonitorError>) -> PollerUpdate {
        let day = match result {
            Ok(day) => day,
            Err(e) => {
                if let Some(context) = &self.context {
                    tracing::warn!(
                        "Failed to load series for {} on {}: {e}",
                        context.camera,
                        context.date
                    );
                }
                return PollerUpdate::FetchFailed { minute: None };
            }
        };

        let interval = self
            .context
            .as_ref()
            .map(|c| c.interval)
            .unwrap_or_default();
        let loaded = Series::from_day(&day, interval);
        // Samples polled before the day load finished are newer than the load.
        let polled: Vec<Sample> = self
            .series
            .samples()
            .iter()
            .copied()
            .filter(|s| !loaded.samples().iter().any(|l| l.minute == s.minute))
            .collect();

        self.series = loaded;
        for sample in polled {
            self.series.push(sample);
        }
        self.peak = RunningPeak::from_samples(&day);
        for sample in self.series.samples() {
            self.peak.observe(sample.count);
        }

        tracing::debug!(
            "Loaded {} of {} samples, peak {}",
            self.series.len(),
            day.len(),
            self.peak.value()
        );
        PollerUpdate::SeriesReady {
            latest: self.series.latest(),
        }
    }

    fn apply_sample(
        &mut self,
        minute: u16,
        result: Result<Option<Sample>, MonitorError>,
    ) -> PollerUpdate {
        match result {
            Ok(Some(sample)) => {
                self.series.push(sample);
                self.peak.observe(sample.count);
                PollerUpdate::Appended(sample)
            }
            Ok(None) => {
                tracing::debug!("No sample for minute {minute}");
                PollerUpdate::Missing { minute }
            }
            Err(e) => {
                tracing::warn!("Sample fetch for minute {minute} failed: {e}");
                PollerUpdate::FetchFailed {
                    minute: Some(minute),
                }
            }
        }
    }
}

impl<S> Drop for IntervalPoller<S> {
    fn drop(&mut self) {
        if let Some(timer) = self.timer.take() {
            timer.abort();
        }
    }
}
