use crate::common::TestApp;

#[tokio::test]
async fn health_reports_ok() {
    let app = TestApp::new().await;

    let response = app.get("/health").await;
    response.assert_success();

    let body: serde_json::Value = response.json();
    assert_eq!(body["status"], "ok");
    assert_eq!(body["service"], "geoingest");
}

#[tokio::test]
async fn openapi_spec_is_served() {
    let app = TestApp::new().await;

    let response = app.get("/api").await;
    response.assert_success();

    let body: serde_json::Value = response.json();
    assert_eq!(body["info"]["title"], "GeoIngest API");
    assert!(body["paths"]["/enqueue"].is_object());
}
