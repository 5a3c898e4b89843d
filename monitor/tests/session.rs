use std::sync::Arc;
use std::time::Duration;

use chrono::{NaiveDate, NaiveDateTime};
use monitor::clock::ClockEvent;
use monitor::test_util::{FakeClock, ScriptedSource, SourceCall};
use monitor::{
    ArtifactOutcome, DashboardView, DataSource, MonitorSession, PollerPhase, PollerUpdate,
    SamplingInterval, SelectionState, SelectionStore, SessionStep, WallClock,
};
use monitor_shared::{DetectionLabel, MonitoringClient, Sample};

fn day() -> NaiveDate {
    NaiveDate::from_ymd_opt(2026, 10, 18).unwrap()
}

fn at(h: u32, m: u32, s: u32) -> NaiveDateTime {
    day().and_hms_opt(h, m, s).unwrap()
}

fn selection(camera: &str) -> SelectionState {
    let mut state = SelectionState::new(day());
    state.camera = Some(camera.to_string());
    state
}

fn session<S: DataSource>(
    source: Arc<S>,
    start: NaiveDateTime,
    state: SelectionState,
) -> MonitorSession<S, FakeClock> {
    let clock = Arc::new(FakeClock::starting_at(start));
    let mut session = MonitorSession::new(source, clock, SelectionStore::new(state));
    session.start();
    session
}

/// Step until `done` holds for the step just handled and the view it produced.
async fn step_until<S: DataSource, W: WallClock>(
    session: &mut MonitorSession<S, W>,
    mut done: impl FnMut(&SessionStep, &DashboardView) -> bool,
) -> DashboardView {
    for _ in 0..500 {
        let step = session.step().await;
        let view = session.view().borrow().clone();
        if done(&step, &view) {
            return view;
        }
    }
    panic!("session never reached the expected state");
}

fn minutes(view: &DashboardView) -> Vec<u16> {
    view.series.iter().map(|s| s.minute).collect()
}

/// Camera with one sample per minute from 09:50 to 10:02.
fn ten_oclock_source() -> Arc<ScriptedSource> {
    let source = Arc::new(ScriptedSource::new());
    source.set_series(
        "cam-a",
        (590..=602).map(|m| Sample::new(m, u32::from(m % 7) + 1)).collect(),
    );
    source.set_artifact("cam-a", 600, &["Car", "Bus", "Car"]);
    source
}

#[tokio::test(start_paused = true)]
async fn test_startup_selects_latest_sample() {
    let source = ten_oclock_source();
    let mut session = session(source, at(10, 2, 0), selection("cam-a"));

    let view = step_until(&mut session, |_, v| v.artifact.is_some()).await;

    assert_eq!(minutes(&view), vec![590, 595, 600]);
    assert_eq!(view.peak, 7);
    assert_eq!(view.selected_minute, Some(600));
    assert_eq!(view.phase, PollerPhase::Aligning { first_minute: 605 });

    let artifact = view.artifact.unwrap();
    assert_eq!(artifact.minute(), 600);
    assert_eq!(artifact.histogram.get(DetectionLabel::Car), 2);
    assert_eq!(artifact.histogram.get(DetectionLabel::Bus), 1);
    assert_eq!(artifact.total_vehicles(), 3);
}

#[tokio::test(start_paused = true)]
async fn test_auto_follow_moves_selection_to_polled_minute() {
    let source = ten_oclock_source();
    source.set_sample("cam-a", Sample::new(605, 40));
    source.set_artifact("cam-a", 605, &["Motorcycle"]);
    let started = tokio::time::Instant::now();
    let mut session = session(source, at(10, 2, 0), selection("cam-a"));

    let view = step_until(&mut session, |_, v| {
        v.artifact.as_ref().is_some_and(|a| a.minute() == 605)
    })
    .await;

    assert!(started.elapsed() >= Duration::from_secs(210));
    assert_eq!(view.selected_minute, Some(605));
    assert_eq!(minutes(&view), vec![590, 595, 600, 605]);
    assert_eq!(view.peak, 40);
    assert_eq!(view.phase, PollerPhase::Polling { next_minute: 610 });
}

#[tokio::test(start_paused = true)]
async fn test_manual_selection_survives_polls_without_auto_follow() {
    let source = ten_oclock_source();
    source.set_sample("cam-a", Sample::new(605, 2));
    let mut state = selection("cam-a");
    state.auto_follow = false;
    let mut session = session(source.clone(), at(10, 2, 0), state);

    let view = step_until(&mut session, |step, _| {
        matches!(step, SessionStep::Poller(PollerUpdate::Appended(_)))
    })
    .await;

    assert_eq!(minutes(&view), vec![590, 595, 600, 605]);
    assert_eq!(view.selected_minute, Some(600));
    assert!(!source
        .calls()
        .contains(&SourceCall::Artifact {
            camera: "cam-a".to_string(),
            minute: 605
        }));
}

#[tokio::test(start_paused = true)]
async fn test_camera_change_resets_day_state() {
    let source = ten_oclock_source();
    source.set_series("cam-b", vec![Sample::new(0, 1), Sample::new(300, 4), Sample::new(302, 9)]);
    source.set_artifact("cam-b", 300, &["Vehicle"]);
    let mut session = session(source, at(10, 2, 0), selection("cam-a"));
    step_until(&mut session, |_, v| v.artifact.is_some()).await;

    session.store().set_camera(Some("cam-b".to_string()));
    let view = step_until(&mut session, |step, _| matches!(step, SessionStep::Selection(_))).await;

    assert_eq!(view.camera.as_deref(), Some("cam-b"));
    assert!(view.artifact.is_none());
    assert_eq!(view.selected_minute, None);
    assert!(view.series.is_empty());
    assert_eq!(view.peak, 0);

    let view = step_until(&mut session, |_, v| v.artifact.is_some()).await;
    assert_eq!(minutes(&view), vec![0, 300]);
    assert_eq!(view.peak, 9);
    assert_eq!(view.selected_minute, Some(300));
    assert_eq!(view.artifact.unwrap().histogram.get(DetectionLabel::Vehicle), 1);
}

#[tokio::test(start_paused = true)]
async fn test_click_while_series_queued_is_kept() {
    let source = ten_oclock_source();
    source.set_artifact("cam-a", 590, &["Motorcycle"]);
    let mut session = session(source, at(10, 2, 0), selection("cam-a"));

    // Let the day load finish and queue its result before the click lands.
    for _ in 0..5 {
        tokio::task::yield_now().await;
    }
    session.store().select_minute(Some(590)).unwrap();

    let view = step_until(&mut session, |_, v| v.artifact.is_some()).await;

    assert_eq!(session.store().snapshot().minute, Some(590));
    assert_eq!(view.selected_minute, Some(590));
    assert_eq!(minutes(&view), vec![590, 595, 600]);
    let artifact = view.artifact.unwrap();
    assert_eq!(artifact.minute(), 590);
    assert_eq!(artifact.histogram.get(DetectionLabel::Motorcycle), 1);
}

#[tokio::test(start_paused = true)]
async fn test_camera_round_trip_reloads_day() {
    let source = ten_oclock_source();
    let mut session = session(source.clone(), at(10, 2, 0), selection("cam-a"));
    step_until(&mut session, |_, v| v.artifact.is_some()).await;

    // Both writes land before the session looks at the store.
    session.store().set_camera(Some("cam-b".to_string()));
    session.store().set_camera(Some("cam-a".to_string()));
    let view = step_until(&mut session, |step, _| matches!(step, SessionStep::Selection(_))).await;

    assert_eq!(view.camera.as_deref(), Some("cam-a"));
    assert!(view.artifact.is_none());
    assert_eq!(view.selected_minute, None);
    assert!(view.series.is_empty());

    let view = step_until(&mut session, |_, v| v.artifact.is_some()).await;
    assert_eq!(minutes(&view), vec![590, 595, 600]);
    assert_eq!(view.selected_minute, Some(600));
    assert_eq!(view.artifact.unwrap().minute(), 600);
    let day_loads = source
        .calls()
        .iter()
        .filter(|c| matches!(c, SourceCall::Series { camera, .. } if camera == "cam-a"))
        .count();
    assert_eq!(day_loads, 2);
}

#[tokio::test(start_paused = true)]
async fn test_interval_change_keeps_artifact_until_reselected() {
    let source = Arc::new(ScriptedSource::new());
    source.set_series("cam-a", (590..=597).map(|m| Sample::new(m, 1)).collect());
    source.set_artifact("cam-a", 590, &["Car"]);
    source.set_artifact("cam-a", 595, &["Bus"]);
    let mut session = session(source, at(10, 2, 0), selection("cam-a"));
    step_until(&mut session, |_, v| v.artifact.is_some()).await;

    session
        .store()
        .set_interval(SamplingInterval::new(10).unwrap());
    let view = step_until(&mut session, |step, _| matches!(step, SessionStep::Selection(_))).await;

    assert_eq!(view.selected_minute, None);
    assert_eq!(view.artifact.as_ref().map(|a| a.minute()), Some(595));

    let view = step_until(&mut session, |_, v| {
        v.artifact.as_ref().is_some_and(|a| a.minute() == 590)
    })
    .await;
    assert_eq!(minutes(&view), vec![590]);
    assert_eq!(view.selected_minute, Some(590));
}

#[tokio::test(start_paused = true)]
async fn test_rollover_resets_and_reloads_new_day() {
    let source = Arc::new(ScriptedSource::new());
    source.set_series("cam-a", vec![Sample::new(1430, 7)]);
    source.set_artifact("cam-a", 1430, &["Car"]);
    let mut session = session(source.clone(), at(23, 57, 0), selection("cam-a"));
    step_until(&mut session, |_, v| v.artifact.is_some()).await;

    // The new day starts without data.
    source.set_series("cam-a", vec![]);
    let next_day = day().succ_opt().unwrap();

    let view = step_until(&mut session, |step, _| {
        matches!(step, SessionStep::Clock(ClockEvent::DayRollover { .. }))
    })
    .await;

    assert_eq!(view.date, next_day);
    assert!(view.series.is_empty());
    assert_eq!(view.peak, 0);
    assert!(view.artifact.is_none());
    assert_eq!(view.selected_minute, None);
    assert_eq!(view.phase, PollerPhase::Aligning { first_minute: 0 });

    step_until(&mut session, |step, _| {
        matches!(step, SessionStep::Poller(PollerUpdate::SeriesReady { .. }))
    })
    .await;
    assert!(source.calls().contains(&SourceCall::Series {
        camera: "cam-a".to_string(),
        date: next_day
    }));
}

#[tokio::test(start_paused = true)]
async fn test_late_artifact_never_replaces_newer_selection() {
    let source = Arc::new(ScriptedSource::new());
    source.set_artifact("cam-a", 10, &["Car"]);
    source.set_artifact("cam-a", 20, &["Bus"]);
    source.delay_artifact(10, Duration::from_secs(5));
    let mut session = session(source, at(9, 0, 0), selection("cam-a"));

    session.store().select_minute(Some(10)).unwrap();
    step_until(&mut session, |step, _| matches!(step, SessionStep::Selection(_))).await;
    session.store().select_minute(Some(20)).unwrap();
    step_until(&mut session, |step, _| matches!(step, SessionStep::Selection(_))).await;

    let view = step_until(&mut session, |step, _| {
        matches!(step, SessionStep::Artifact(ArtifactOutcome::Stale))
    })
    .await;

    let artifact = view.artifact.unwrap();
    assert_eq!(artifact.minute(), 20);
    assert_eq!(artifact.histogram.get(DetectionLabel::Bus), 1);
}

#[tokio::test(start_paused = true)]
async fn test_run_until_stops_polling() {
    let source = ten_oclock_source();
    let mut session = session(source.clone(), at(10, 2, 0), selection("cam-a"));

    session
        .run_until(tokio::time::sleep(Duration::from_secs(600)))
        .await;

    assert_eq!(source.sample_calls(), vec![605, 610]);
    assert_eq!(session.poller().phase(), PollerPhase::Stopped);
    assert_eq!(session.view().borrow().phase, PollerPhase::Stopped);

    tokio::time::sleep(Duration::from_secs(3600)).await;
    assert_eq!(source.sample_calls(), vec![605, 610]);
}

#[tokio::test]
async fn test_historical_day_over_http() {
    use serde_json::json;
    use wiremock::matchers::{method, path, query_param};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path("/image/general"))
        .and(query_param("date", "2026-10-17"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!([
            {"time": 600, "number": 3},
            {"time": 603, "number": 20},
            {"time": 605, "number": 8},
        ])))
        .mount(&server)
        .await;
    Mock::given(method("GET"))
        .and(path("/image/specific"))
        .and(query_param("time", "10-05-00"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({
            "camera": "cam-a",
            "image": "aGVsbG8=",
            "detections": [
                {"confidence": 0.8, "label": "Car", "x1": 0.0, "y1": 0.0, "x2": 1.0, "y2": 1.0},
                {"confidence": 0.6, "label": "Tractor", "x1": 0.0, "y1": 0.0, "x2": 1.0, "y2": 1.0}
            ]
        })))
        .mount(&server)
        .await;

    let client = Arc::new(MonitoringClient::new(&server.uri()).unwrap());
    let mut state = selection("cam-a");
    state.date = day().pred_opt().unwrap();
    let mut session = session(client, at(12, 0, 0), state);

    let view = tokio_test::assert_ok!(
        tokio::time::timeout(
            Duration::from_secs(10),
            step_until(&mut session, |_, v| v.artifact.is_some()),
        )
        .await
    );

    assert_eq!(view.phase, PollerPhase::Idle);
    assert_eq!(minutes(&view), vec![600, 605]);
    assert_eq!(view.peak, 20);
    assert_eq!(view.selected_minute, Some(605));

    let artifact = view.artifact.unwrap();
    assert_eq!(artifact.artifact.image, b"hello".to_vec());
    assert_eq!(artifact.histogram.total(), 1);
    assert_eq!(artifact.total_vehicles(), 2);
    session.shutdown();
}
