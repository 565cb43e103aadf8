use axum::http::StatusCode;

use crate::common::{empty_zip_bytes, tiny_geotiff_bytes, TestApp};

#[tokio::test]
async fn enqueue_geotiff_creates_queued_job() {
    let app = TestApp::new().await;

    let response = app
        .enqueue_multipart("sample.tif", &tiny_geotiff_bytes(), None, None)
        .await;
    response.assert_success();

    let body: serde_json::Value = response.json();
    assert_eq!(body["status"], "queued");
    assert!(body["job_id"].as_str().is_some());
    assert!(body["layer_id"].as_str().is_some());

    let job_id = body["job_id"].as_str().unwrap();
    let status = app.get(&format!("/jobs/{job_id}")).await;
    status.assert_success();
    let status_body: serde_json::Value = status.json();
    assert_eq!(status_body["status"], "queued");
    assert_eq!(status_body["progress"], 0);
}

#[tokio::test]
async fn enqueue_honors_explicit_layer_id() {
    let app = TestApp::new().await;

    let response = app
        .enqueue_multipart("sample.tif", &tiny_geotiff_bytes(), Some("custom-layer"), None)
        .await;
    response.assert_success();

    let body: serde_json::Value = response.json();
    assert_eq!(body["layer_id"], "custom-layer");
}

#[tokio::test]
async fn enqueue_zip_is_accepted() {
    let app = TestApp::new().await;

    let response = app
        .enqueue_multipart("bundle.zip", &empty_zip_bytes(), None, None)
        .await;
    response.assert_success();

    let body: serde_json::Value = response.json();
    assert_eq!(body["status"], "queued");
}

#[tokio::test]
async fn enqueue_rejects_unsupported_extension() {
    let app = TestApp::new().await;

    let response = app
        .enqueue_multipart("notes.txt", b"hello", None, None)
        .await;
    response.assert_status(StatusCode::BAD_REQUEST);
}

#[tokio::test]
async fn enqueue_high_priority_routes_to_high_priority_queue() {
    let app = TestApp::new().await;

    let response = app
        .enqueue_multipart("sample.tif", &tiny_geotiff_bytes(), None, Some("high"))
        .await;
    response.assert_success();

    let queue_status = app.get("/queue/status").await;
    queue_status.assert_success();
    let body: serde_json::Value = queue_status.json();
    let worker_stats = body["queue_stats"]["worker_stats"]
        .as_array()
        .expect("worker_stats array");
    let high_priority = worker_stats
        .iter()
        .find(|q| q["queue"] == "high_priority")
        .expect("high_priority queue entry present");
    assert!(high_priority["pending"].as_i64().unwrap() >= 1);
}
