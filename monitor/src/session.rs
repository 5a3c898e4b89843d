//! The dashboard's single cooperative event loop.
//!
//! [`MonitorSession`] owns the clock tracker, the interval poller and the
//! artifact loader, and is the only place their outputs meet the shared
//! [`SelectionStore`]. Each call to [`MonitorSession::step`] handles exactly
//! one event and then publishes a fresh [`DashboardView`].

use std::fmt;
use std::future::Future;
use std::sync::Arc;

use chrono::NaiveDate;
use monitor_shared::{chart_label, Sample};
use tokio::sync::mpsc::{self, UnboundedReceiver, UnboundedSender};
use tokio::sync::watch;

use crate::artifact::{ArtifactEvent, ArtifactLoader, ArtifactOutcome, DisplayedArtifact};
use crate::clock::{ClockDisplay, ClockEvent, ClockTracker, WallClock};
use crate::error::SelectionError;
use crate::poller::{IntervalPoller, PollerEvent, PollerPhase, PollerUpdate, SamplingInterval};
use crate::selection::{SelectionDelta, SelectionState, SelectionStore};
use crate::source::DataSource;

/// Everything the presentation layer renders.
#[derive(Debug, Clone, PartialEq)]
pub struct DashboardView {
    pub clock: Option<ClockDisplay>,
    pub camera: Option<String>,
    pub cameras: Vec<String>,
    pub date: NaiveDate,
    pub interval: SamplingInterval,
    pub auto_follow: bool,
    pub series: Vec<Sample>,
    pub peak: u32,
    pub selected_minute: Option<u16>,
    pub artifact: Option<DisplayedArtifact>,
    pub phase: PollerPhase,
}

impl DashboardView {
    pub fn empty(date: NaiveDate) -> Self {
        Self {
            clock: None,
            camera: None,
            cameras: Vec::new(),
            date,
            interval: SamplingInterval::default(),
            auto_follow: true,
            series: Vec::new(),
            peak: 0,
            selected_minute: None,
            artifact: None,
            phase: PollerPhase::Idle,
        }
    }
}

impl fmt::Display for DashboardView {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if let Some(clock) = &self.clock {
            write!(f, "[{} {}] ", clock.date, clock.time)?;
        }
        write!(
            f,
            "camera={} date={} every {}: {} samples, peak {}",
            self.camera.as_deref().unwrap_or("-"),
            self.date,
            self.interval,
            self.series.len(),
            self.peak
        )?;
        if let Some(minute) = self.selected_minute {
            write!(f, ", selected {}", chart_label(minute))?;
        }
        if let Some(artifact) = &self.artifact {
            write!(f, ", showing {}", chart_label(artifact.minute()))?;
            for (label, count) in artifact.histogram.iter() {
                write!(f, " {label}={count}")?;
            }
            write!(f, " total={}", artifact.total_vehicles())?;
        }
        Ok(())
    }
}

/// What one [`MonitorSession::step`] handled.
#[derive(Debug, Clone, PartialEq)]
pub enum SessionStep {
    Clock(ClockEvent),
    Poller(PollerUpdate),
    Artifact(ArtifactOutcome),
    Selection(SelectionDelta),
    /// Every event source is gone.
    Closed,
}

enum Incoming {
    Clock(ClockEvent),
    Poller(PollerEvent),
    Artifact(ArtifactEvent),
    Selection,
    Closed,
}

pub struct MonitorSession<S, W> {
    clock: Arc<W>,
    store: SelectionStore,
    tracker: ClockTracker,
    poller: IntervalPoller<S>,
    loader: ArtifactLoader<S>,
    clock_tx: UnboundedSender<ClockEvent>,
    clock_rx: UnboundedReceiver<ClockEvent>,
    poller_rx: UnboundedReceiver<PollerEvent>,
    artifact_rx: UnboundedReceiver<ArtifactEvent>,
    selection_rx: watch::Receiver<SelectionState>,
    seen: SelectionState,
    display: Option<ClockDisplay>,
    view_tx: watch::Sender<DashboardView>,
}

impl<S: DataSource, W: WallClock> MonitorSession<S, W> {
    pub fn new(source: Arc<S>, clock: Arc<W>, store: SelectionStore) -> Self {
        let (clock_tx, clock_rx) = mpsc::unbounded_channel();
        let (poller_tx, poller_rx) = mpsc::unbounded_channel();
        let (artifact_tx, artifact_rx) = mpsc::unbounded_channel();
        let selection_rx = store.subscribe();
        let seen = selection_rx.borrow().clone();
        let (view_tx, _) = watch::channel(DashboardView::empty(seen.date));

        Self {
            clock,
            tracker: ClockTracker::new(),
            poller: IntervalPoller::new(source.clone(), poller_tx),
            loader: ArtifactLoader::new(source, artifact_tx),
            store,
            clock_tx,
            clock_rx,
            poller_rx,
            artifact_rx,
            selection_rx,
            seen,
            display: None,
            view_tx,
        }
    }

    /// Subscribe to view updates.
    pub fn view(&self) -> watch::Receiver<DashboardView> {
        self.view_tx.subscribe()
    }

    pub fn store(&self) -> &SelectionStore {
        &self.store
    }

    pub fn poller(&self) -> &IntervalPoller<S> {
        &self.poller
    }

    pub fn loader(&self) -> &ArtifactLoader<S> {
        &self.loader
    }

    /// Start the clock and act on the current selection.
    pub fn start(&mut self) {
        tracing::info!("Starting monitor session");
        self.tracker.start(self.clock.clone(), self.clock_tx.clone());

        self.seen = self.selection_rx.borrow_and_update().clone();
        if self.seen.camera.is_some() {
            self.reconfigure_poller();
        }
        if self.seen.minute.is_some() {
            self.load_selected();
        }
        self.publish();
    }

    /// Wait for and handle exactly one event.
    pub async fn step(&mut self) -> SessionStep {
        let incoming = tokio::select! {
            biased;
            Some(event) = self.clock_rx.recv() => Incoming::Clock(event),
            Some(event) = self.poller_rx.recv() => Incoming::Poller(event),
            Some(event) = self.artifact_rx.recv() => Incoming::Artifact(event),
            Ok(()) = self.selection_rx.changed() => Incoming::Selection,
            else => Incoming::Closed,
        };

        let step = match incoming {
            Incoming::Clock(event) => self.on_clock(event),
            Incoming::Poller(event) => SessionStep::Poller(self.on_poller(event)),
            Incoming::Artifact(event) => SessionStep::Artifact(self.loader.handle(event)),
            Incoming::Selection => SessionStep::Selection(self.sync_selection()),
            Incoming::Closed => SessionStep::Closed,
        };
        self.publish();
        step
    }

    /// Step until `shutdown` resolves, then tear everything down.
    pub async fn run_until<F: Future<Output = ()>>(&mut self, shutdown: F) {
        tokio::pin!(shutdown);
        loop {
            tokio::select! {
                _ = &mut shutdown => break,
                step = self.step() => {
                    if step == SessionStep::Closed {
                        break;
                    }
                }
            }
        }
        self.shutdown();
    }

    /// Stop the clock and the poller. Idempotent.
    pub fn shutdown(&mut self) {
        self.tracker.stop();
        if self.poller.phase() != PollerPhase::Stopped {
            tracing::info!("Monitor session stopped");
            self.poller.stop();
        }
        self.publish();
    }

    fn on_clock(&mut self, event: ClockEvent) -> SessionStep {
        match &event {
            ClockEvent::Tick { display, .. } => {
                self.display = Some(display.clone());
            }
            ClockEvent::DayRollover { day } => self.on_rollover(*day),
        }
        SessionStep::Clock(event)
    }

    /// Hard reset of day-scoped state, then start over on `day`.
    fn on_rollover(&mut self, day: NaiveDate) {
        tracing::info!("Day rolled over, resetting state for {day}");
        self.poller.stop();
        self.loader.clear();

        let moved = self.store.set_date(day);
        if !moved {
            self.store.clear_minute();
        }
        let delta = self.sync_selection();
        if !delta.context_changed() {
            self.reconfigure_poller();
        }
    }

    fn on_poller(&mut self, event: PollerEvent) -> PollerUpdate {
        // Catch up with the store before acting on the event.
        if self.selection_rx.has_changed().unwrap_or(false) {
            self.sync_selection();
        }
        let update = self.poller.handle(event);
        match &update {
            PollerUpdate::SeriesReady {
                latest: Some(latest),
            } => {
                let selected = self.store.select_minute_if_unset(latest.minute);
                self.after_select(latest.minute, selected);
            }
            PollerUpdate::Appended(sample) if self.seen.auto_follow => {
                let selected = self.store.select_minute(Some(sample.minute));
                self.after_select(sample.minute, selected);
            }
            _ => {}
        }
        update
    }

    fn after_select(&mut self, minute: u16, selected: Result<bool, SelectionError>) {
        match selected {
            Ok(true) => {
                self.sync_selection();
            }
            Ok(false) => {}
            Err(e) => tracing::debug!("Not selecting minute {minute}: {e}"),
        }
    }

    /// Catch up with the store and react to what changed.
    fn sync_selection(&mut self) -> SelectionDelta {
        let current = self.selection_rx.borrow_and_update().clone();
        let delta = SelectionDelta::between(&self.seen, &current);
        self.seen = current;

        if delta.day_changed() {
            self.loader.clear();
        }
        if delta.context_changed() {
            self.reconfigure_poller();
        }
        if delta.minute {
            self.load_selected();
        }
        delta
    }

    fn reconfigure_poller(&mut self) {
        match self.seen.poll_context() {
            Some(context) => {
                let now = self.clock.now();
                self.poller.reconfigure(context, now);
            }
            None => self.poller.stop(),
        }
    }

    fn load_selected(&mut self) {
        self.loader
            .on_selection_changed(self.seen.camera.as_deref(), self.seen.date, self.seen.minute);
    }

    fn build_view(&self) -> DashboardView {
        DashboardView {
            clock: self.display.clone(),
            camera: self.seen.camera.clone(),
            cameras: self.seen.cameras.clone(),
            date: self.seen.date,
            interval: self.seen.interval,
            auto_follow: self.seen.auto_follow,
            series: self.poller.series().samples().to_vec(),
            peak: self.poller.peak(),
            selected_minute: self.seen.minute,
            artifact: self.loader.displayed().cloned(),
            phase: self.poller.phase(),
        }
    }

    fn publish(&self) {
        let view = self.build_view();
        self.view_tx.send_if_modified(|current| {
            if *current == view {
                return false;
            }
            *current = view;
            true
        });
    }
}
