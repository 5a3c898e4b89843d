//! Background refresh of the camera registry.
//!
//! Asks the backend which cameras have data today and publishes the list
//! into the [`SelectionStore`], which also picks a camera when none is
//! selected or the selected one disappeared.

use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;

use tokio::task::JoinHandle;
use tokio::time::MissedTickBehavior;

use crate::clock::WallClock;
use crate::selection::SelectionStore;
use crate::source::CameraRegistry;

/// Default time between registry queries.
pub const DEFAULT_REFRESH: Duration = Duration::from_secs(300);

/// Periodically queries the camera registry.
///
/// Spawns a background tokio task on creation that refreshes immediately and
/// then every `period`. The task is cancelled on drop. If any refresh failed
/// during the lifetime of this struct, a warning is logged when dropped.
pub struct CameraRefresher {
    handle: JoinHandle<()>,
    error_count: Arc<AtomicUsize>,
}

impl CameraRefresher {
    pub fn spawn<R, C>(registry: Arc<R>, clock: Arc<C>, store: SelectionStore, period: Duration) -> Self
    where
        R: CameraRegistry,
        C: WallClock,
    {
        let error_count = Arc::new(AtomicUsize::new(0));
        let error_count_clone = error_count.clone();

        let handle = tokio::spawn(async move {
            let mut ticker = tokio::time::interval(period);
            ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);
            loop {
                ticker.tick().await;

                let today = clock.today();
                match registry.cameras(today).await {
                    Ok(cameras) => {
                        tracing::debug!("{} camera(s) have data on {today}", cameras.len());
                        store.set_cameras(cameras);
                    }
                    Err(e) => {
                        let count = error_count_clone.fetch_add(1, Ordering::Relaxed) + 1;
                        tracing::warn!("Camera list refresh failed ({count} total): {e}");
                    }
                }
            }
        });

        Self {
            handle,
            error_count,
        }
    }

    /// Failed refreshes so far.
    pub fn error_count(&self) -> usize {
        self.error_count.load(Ordering::Relaxed)
    }
}

impl Drop for CameraRefresher {
    fn drop(&mut self) {
        self.handle.abort();

        let errors = self.error_count.load(Ordering::Relaxed);
        if errors > 0 {
            tracing::warn!("CameraRefresher: {errors} refresh(es) failed during lifetime");
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::selection::SelectionState;
    use crate::test_util::{FakeClock, ScriptedSource, SourceCall};
    use chrono::NaiveDate;

    fn start() -> chrono::NaiveDateTime {
        NaiveDate::from_ymd_opt(2026, 10, 18)
            .unwrap()
            .and_hms_opt(8, 0, 0)
            .unwrap()
    }

    #[tokio::test(start_paused = true)]
    async fn test_refresh_selects_first_camera() {
        let source = Arc::new(ScriptedSource::new());
        source.set_cameras(&["cam-a", "cam-b"]);
        let clock = Arc::new(FakeClock::starting_at(start()));
        let store = SelectionStore::new(SelectionState::new(start().date()));
        let mut rx = store.subscribe();

        let _refresher = CameraRefresher::spawn(source.clone(), clock, store.clone(), DEFAULT_REFRESH);
        rx.changed().await.unwrap();

        let state = store.snapshot();
        assert_eq!(state.camera.as_deref(), Some("cam-a"));
        assert_eq!(state.cameras, vec!["cam-a".to_string(), "cam-b".to_string()]);
        assert_eq!(
            source.calls(),
            vec![SourceCall::Cameras {
                date: start().date()
            }]
        );
    }

    #[tokio::test(start_paused = true)]
    async fn test_refresh_repeats_and_counts_failures() {
        let source = Arc::new(ScriptedSource::new());
        source.fail_cameras(true);
        let clock = Arc::new(FakeClock::starting_at(start()));
        let store = SelectionStore::new(SelectionState::new(start().date()));

        let refresher = CameraRefresher::spawn(source.clone(), clock, store.clone(), Duration::from_secs(60));
        tokio::time::sleep(Duration::from_secs(150)).await;
        assert_eq!(refresher.error_count(), 3);
        assert_eq!(store.snapshot().camera, None);

        source.fail_cameras(false);
        source.set_cameras(&["cam-z"]);
        tokio::time::sleep(Duration::from_secs(60)).await;
        assert_eq!(store.snapshot().camera.as_deref(), Some("cam-z"));
        assert_eq!(refresher.error_count(), 3);
    }
}
