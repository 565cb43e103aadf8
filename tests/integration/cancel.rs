use axum::http::StatusCode;

use crate::common::{tiny_geotiff_bytes, TestApp};

#[tokio::test]
async fn cancel_queued_job_marks_it_cancelled() {
    let app = TestApp::new().await;

    let enqueued = app
        .enqueue_multipart("sample.tif", &tiny_geotiff_bytes(), None, None)
        .await;
    enqueued.assert_success();
    let job_id = enqueued.json::<serde_json::Value>()["job_id"]
        .as_str()
        .unwrap()
        .to_string();

    let cancel = app.post(&format!("/jobs/{job_id}/cancel")).await;
    cancel.assert_success();

    let status = app.get(&format!("/jobs/{job_id}")).await;
    let body: serde_json::Value = status.json();
    assert_eq!(body["status"], "cancelled");
}

#[tokio::test]
async fn cancel_unknown_job_is_not_found() {
    let app = TestApp::new().await;

    let response = app.post("/jobs/does-not-exist/cancel").await;
    response.assert_status(StatusCode::NOT_FOUND);
}

#[tokio::test]
async fn cancel_already_cancelled_job_is_rejected() {
    let app = TestApp::new().await;

    let enqueued = app
        .enqueue_multipart("sample.tif", &tiny_geotiff_bytes(), None, None)
        .await;
    let job_id = enqueued.json::<serde_json::Value>()["job_id"]
        .as_str()
        .unwrap()
        .to_string();

    app.post(&format!("/jobs/{job_id}/cancel")).await.assert_success();

    let second = app.post(&format!("/jobs/{job_id}/cancel")).await;
    second.assert_status(StatusCode::BAD_REQUEST);
}
