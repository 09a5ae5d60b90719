mod common;

use axum::body::{to_bytes, Body};
use axum::http::{header, Method, Request, StatusCode};
use registry_operator_metrics::exposition::{decode, find_family, MetricKind};
use registry_operator_metrics::metrics::{
    Metrics, MetricsRecorder, IMAGE_PRUNER_INSTALL_STATUS, STORAGE_RECONFIGURED_TOTAL,
    STORAGE_TYPE,
};
use registry_operator_metrics::routes::EXPOSITION_CONTENT_TYPE;
use tower::ServiceExt;

fn build_request(path: &str, method: Method) -> Request<Body> {
    Request::builder()
        .method(method)
        .uri(path)
        .body(Body::empty())
        .expect("failed to build request")
}

async fn body_text(response: axum::response::Response) -> String {
    let bytes = to_bytes(response.into_body(), usize::MAX)
        .await
        .expect("body should be readable");
    String::from_utf8(bytes.to_vec()).expect("body should be UTF-8")
}

#[tokio::test]
async fn metrics_route_serves_exposition_format() {
    let app = common::build_app(Metrics::new().unwrap());

    let response = app
        .oneshot(build_request("/metrics", Method::GET))
        .await
        .expect("request should succeed");

    assert_eq!(response.status(), StatusCode::OK);
    assert_eq!(
        response.headers().get(header::CONTENT_TYPE).unwrap(),
        EXPOSITION_CONTENT_TYPE
    );

    let body = body_text(response).await;
    assert!(body.contains(&format!("# HELP {} ", STORAGE_RECONFIGURED_TOTAL)));
    assert!(body.contains(&format!("# TYPE {} counter", STORAGE_RECONFIGURED_TOTAL)));
    assert!(body.contains(&format!("# TYPE {} gauge", IMAGE_PRUNER_INSTALL_STATUS)));

    let families = decode(&body).expect("body should decode");
    let counter = find_family(&families, STORAGE_RECONFIGURED_TOTAL).unwrap();
    assert_eq!(counter.kind, MetricKind::Counter);
    assert_eq!(counter.sample(&[]).unwrap().value, 0.0);
}

#[tokio::test]
async fn metrics_route_reflects_recorded_values() {
    let metrics = Metrics::new().unwrap();
    let app = common::build_app(metrics.clone());

    for _ in 0..3 {
        metrics.storage_reconfigured();
    }
    metrics.image_pruner_install_status(true, true);
    metrics.report_storage_type("gcs");

    let response = app
        .oneshot(build_request("/metrics", Method::GET))
        .await
        .expect("request should succeed");
    let families = decode(&body_text(response).await).expect("body should decode");

    let counter = find_family(&families, STORAGE_RECONFIGURED_TOTAL).unwrap();
    assert_eq!(counter.sample(&[]).unwrap().value, 3.0);

    let pruner = find_family(&families, IMAGE_PRUNER_INSTALL_STATUS).unwrap();
    assert_eq!(pruner.kind, MetricKind::Gauge);
    assert_eq!(pruner.sample(&[]).unwrap().value, 2.0);

    let storage = find_family(&families, STORAGE_TYPE).unwrap();
    assert_eq!(storage.samples.len(), 1);
    assert_eq!(storage.sample(&[("storage", "gcs")]).unwrap().value, 1.0);
}

#[tokio::test]
async fn labelled_family_is_absent_until_reported() {
    let app = common::build_app(Metrics::new().unwrap());

    let response = app
        .oneshot(build_request("/metrics", Method::GET))
        .await
        .expect("request should succeed");
    let families = decode(&body_text(response).await).expect("body should decode");

    assert!(find_family(&families, STORAGE_TYPE).is_none());
}

#[tokio::test]
async fn unknown_path_is_not_found() {
    let app = common::build_app(Metrics::new().unwrap());

    let response = app
        .oneshot(build_request("/healthz", Method::GET))
        .await
        .expect("request should complete");

    assert_eq!(response.status(), StatusCode::NOT_FOUND);
}

#[tokio::test]
async fn non_get_method_is_rejected() {
    let app = common::build_app(Metrics::new().unwrap());

    let response = app
        .oneshot(build_request("/metrics", Method::POST))
        .await
        .expect("request should complete");

    assert_eq!(response.status(), StatusCode::METHOD_NOT_ALLOWED);
}
