use chrono::NaiveDate;
use monitor_shared::{DetectionLabel, MonitorError, MonitoringClient, Sample};
use serde_json::json;
use wiremock::matchers::{method, path, query_param};
use wiremock::{Mock, MockServer, ResponseTemplate};

fn day() -> NaiveDate {
    NaiveDate::from_ymd_opt(2026, 10, 18).unwrap()
}

#[tokio::test]
async fn test_get_series_sends_camera_and_date() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path("/api/image/general"))
        .and(query_param("camera", "cam-north"))
        .and(query_param("date", "2026-10-18"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!([
            {"time": 600, "number": 4},
            {"time": 601, "number": 7},
        ])))
        .expect(1)
        .mount(&server)
        .await;

    let client = MonitoringClient::new(&format!("{}/api", server.uri())).unwrap();
    let series = client.get_series("cam-north", day()).await.unwrap();

    assert_eq!(series, vec![Sample::new(600, 4), Sample::new(601, 7)]);
}

#[tokio::test]
async fn test_get_sample_formats_time_of_day() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path("/image/specific/less"))
        .and(query_param("time", "14-10-00"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({"time": 850, "number": 9})))
        .mount(&server)
        .await;

    let client = MonitoringClient::new(&server.uri()).unwrap();
    let sample = client.get_sample("cam-north", day(), 850).await.unwrap();

    assert_eq!(sample, Some(Sample::new(850, 9)));
}

#[tokio::test]
async fn test_get_sample_missing_minute_is_none() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path("/image/specific/less"))
        .respond_with(ResponseTemplate::new(404).set_body_string("Image does not exist"))
        .mount(&server)
        .await;

    let client = MonitoringClient::new(&server.uri()).unwrap();
    let sample = client.get_sample("cam-north", day(), 850).await.unwrap();

    assert_eq!(sample, None);
}

#[tokio::test]
async fn test_get_full_image_requests_annotated_frame() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path("/image/specific"))
        .and(query_param("annotated", "true"))
        .and(query_param("time", "10-00-00"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({
            "camera": "cam-north",
            "datetime": "2026-10-18T10:00:00",
            "image": "aGVsbG8=",
            "detections": [
                {"confidence": 0.9, "label": "Car", "x1": 0.0, "y1": 0.0, "x2": 10.0, "y2": 10.0},
                {"confidence": 0.7, "label": "Bus", "x1": 5.0, "y1": 5.0, "x2": 50.0, "y2": 40.0}
            ]
        })))
        .mount(&server)
        .await;

    let client = MonitoringClient::new(&server.uri()).unwrap();
    let artifact = client.get_full_image("cam-north", day(), 600).await.unwrap();

    assert_eq!(artifact.image, b"hello".to_vec());
    assert_eq!(artifact.minute, 600);
    assert_eq!(artifact.date, day());
    assert_eq!(artifact.detections[1].kind(), Some(DetectionLabel::Bus));
}

#[tokio::test]
async fn test_get_cameras() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path("/image/cameras"))
        .and(query_param("date", "2026-10-18"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!(["cam-north", "cam-south"])))
        .mount(&server)
        .await;

    let client = MonitoringClient::new(&server.uri()).unwrap();
    let cameras = client.get_cameras(day()).await.unwrap();

    assert_eq!(cameras, vec!["cam-north".to_string(), "cam-south".to_string()]);
}

#[tokio::test]
async fn test_server_error_is_reported() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path("/image/general"))
        .respond_with(ResponseTemplate::new(500).set_body_string("database unavailable"))
        .mount(&server)
        .await;

    let client = MonitoringClient::new(&server.uri()).unwrap();
    let err = client.get_series("cam-north", day()).await.unwrap_err();

    match err {
        MonitorError::ServerError { status, message } => {
            assert_eq!(status, 500);
            assert_eq!(message, "database unavailable");
        }
        other => panic!("unexpected error: {other}"),
    }
}

#[tokio::test]
async fn test_malformed_body_is_parse_error() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path("/image/cameras"))
        .respond_with(ResponseTemplate::new(200).set_body_string("<html>"))
        .mount(&server)
        .await;

    let client = MonitoringClient::new(&server.uri()).unwrap();
    let err = client.get_cameras(day()).await.unwrap_err();

    assert!(matches!(err, MonitorError::Parse(_)));
}
