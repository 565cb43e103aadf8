use crate::common::{tiny_geotiff_bytes, TestApp};

#[tokio::test]
async fn queue_status_reports_pending_depth_after_enqueue() {
    let app = TestApp::new().await;

    app.enqueue_multipart("sample.tif", &tiny_geotiff_bytes(), None, None)
        .await
        .assert_success();

    let response = app.get("/queue/status").await;
    response.assert_success();

    let body: serde_json::Value = response.json();
    let worker_stats = body["queue_stats"]["worker_stats"]
        .as_array()
        .expect("worker_stats array");
    let processing = worker_stats
        .iter()
        .find(|q| q["queue"] == "processing")
        .expect("processing queue entry present");
    assert!(processing["pending"].as_i64().unwrap() >= 1);
    assert!(body["timestamp"].as_str().is_some());
}

#[tokio::test]
async fn queue_status_is_empty_with_no_tasks_published() {
    let app = TestApp::new().await;

    let response = app.get("/queue/status").await;
    response.assert_success();

    let body: serde_json::Value = response.json();
    // Depths are grouped from actual rows in `task_queue`; an idle
    // queue with nothing ever published to it simply doesn't appear.
    assert_eq!(
        body["queue_stats"]["worker_stats"].as_array().unwrap().len(),
        0
    );
    assert_eq!(body["queue_stats"]["active_tasks"], 0);
}
