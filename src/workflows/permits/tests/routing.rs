use std::sync::Arc;

use axum::http::StatusCode;
use serde_json::json;
use tower::ServiceExt;

use super::common::*;
use crate::workflows::permits::documents::StubDocumentGenerator;
use crate::workflows::permits::router::permit_router;
use crate::workflows::permits::service::PermitBuildService;

fn build_body(payload: &serde_json::Value) -> axum::body::Body {
    axum::body::Body::from(serde_json::to_vec(payload).expect("serializable payload"))
}

#[tokio::test]
async fn build_route_drafts_an_application() {
    let (service, _store) = demo_service();
    let router = permit_router(service, true);

    let response = router
        .oneshot(
            axum::http::Request::post("/api/v1/permits/build")
                .header(axum::http::header::CONTENT_TYPE, "application/json")
                .body(build_body(&json!({
                    "tenant_id": TENANT,
                    "job_id": DEMO_JOB,
                    "estimate_id": DEMO_ESTIMATE,
                })))
                .expect("request builds"),
        )
        .await
        .expect("route executes");

    assert_eq!(response.status(), StatusCode::OK);
    let payload = read_json_body(response).await;
    assert_eq!(
        payload
            .pointer("/permit_case/status")
            .and_then(serde_json::Value::as_str),
        Some("DRAFT_BUILT")
    );
    assert!(payload.get("application_field_values").is_some());
}

#[tokio::test]
async fn build_route_rejects_blank_identifiers() {
    let (service, _store) = demo_service();
    let router = permit_router(service, true);

    let response = router
        .oneshot(
            axum::http::Request::post("/api/v1/permits/build")
                .header(axum::http::header::CONTENT_TYPE, "application/json")
                .body(build_body(&json!({
                    "tenant_id": TENANT,
                    "job_id": "",
                })))
                .expect("request builds"),
        )
        .await
        .expect("route executes");

    assert_eq!(response.status(), StatusCode::BAD_REQUEST);
    let payload = read_json_body(response).await;
    assert_eq!(
        payload.get("code").and_then(serde_json::Value::as_str),
        Some("invalid_request")
    );
}

#[tokio::test]
async fn build_route_maps_unknown_jobs_to_not_found() {
    let (service, _store) = demo_service();
    let router = permit_router(service, true);

    let response = router
        .oneshot(
            axum::http::Request::post("/api/v1/permits/build")
                .header(axum::http::header::CONTENT_TYPE, "application/json")
                .body(build_body(&json!({
                    "tenant_id": TENANT,
                    "job_id": "job-nope",
                })))
                .expect("request builds"),
        )
        .await
        .expect("route executes");

    assert_eq!(response.status(), StatusCode::NOT_FOUND);
    let payload = read_json_body(response).await;
    assert_eq!(
        payload.get("code").and_then(serde_json::Value::as_str),
        Some("not_found")
    );
    assert_eq!(
        payload
            .pointer("/details/entity")
            .and_then(serde_json::Value::as_str),
        Some("job")
    );
}

fn unavailable_service() -> Arc<PermitBuildService<UnavailableStore, StubDocumentGenerator>> {
    Arc::new(PermitBuildService::new(
        Arc::new(UnavailableStore),
        Arc::new(StubDocumentGenerator::new()),
        PARCEL_TTL_DAYS,
    ))
}

#[tokio::test]
async fn production_failures_hide_internal_detail() {
    let router = permit_router(unavailable_service(), false);

    let response = router
        .oneshot(
            axum::http::Request::post("/api/v1/permits/build")
                .header(axum::http::header::CONTENT_TYPE, "application/json")
                .body(build_body(&json!({
                    "tenant_id": TENANT,
                    "job_id": DEMO_JOB,
                })))
                .expect("request builds"),
        )
        .await
        .expect("route executes");

    assert_eq!(response.status(), StatusCode::INTERNAL_SERVER_ERROR);
    let payload = read_json_body(response).await;
    assert_eq!(
        payload.get("code").and_then(serde_json::Value::as_str),
        Some("build_failed")
    );
    assert_eq!(
        payload.get("message").and_then(serde_json::Value::as_str),
        Some("unexpected failure")
    );
}

#[tokio::test]
async fn development_failures_carry_the_store_detail() {
    let router = permit_router(unavailable_service(), true);

    let response = router
        .oneshot(
            axum::http::Request::post("/api/v1/permits/build")
                .header(axum::http::header::CONTENT_TYPE, "application/json")
                .body(build_body(&json!({
                    "tenant_id": TENANT,
                    "job_id": DEMO_JOB,
                })))
                .expect("request builds"),
        )
        .await
        .expect("route executes");

    assert_eq!(response.status(), StatusCode::INTERNAL_SERVER_ERROR);
    let payload = read_json_body(response).await;
    let message = payload
        .get("message")
        .and_then(serde_json::Value::as_str)
        .unwrap_or_default();
    assert!(
        message.contains("connection pool exhausted"),
        "detail missing from {message:?}"
    );
}

#[tokio::test]
async fn case_route_returns_the_persisted_case() {
    let (service, _store) = demo_service();
    let outcome = service.build(demo_request()).expect("build succeeds");
    let router = permit_router(service, true);

    let uri = format!(
        "/api/v1/permits/cases/{}?tenant_id={}",
        outcome.permit_case.id, TENANT
    );
    let response = router
        .oneshot(
            axum::http::Request::get(&uri)
                .body(axum::body::Body::empty())
                .expect("request builds"),
        )
        .await
        .expect("route executes");

    assert_eq!(response.status(), StatusCode::OK);
    let payload = read_json_body(response).await;
    assert_eq!(
        payload.get("status").and_then(serde_json::Value::as_str),
        Some("DRAFT_BUILT")
    );
    assert_eq!(
        payload
            .pointer("/jurisdiction/county_name")
            .and_then(serde_json::Value::as_str),
        Some("Orange")
    );
}

#[tokio::test]
async fn case_route_maps_unknown_cases_to_not_found() {
    let (service, _store) = demo_service();
    let router = permit_router(service, true);

    let response = router
        .oneshot(
            axum::http::Request::get("/api/v1/permits/cases/case-999999?tenant_id=t-demo")
                .body(axum::body::Body::empty())
                .expect("request builds"),
        )
        .await
        .expect("route executes");

    assert_eq!(response.status(), StatusCode::NOT_FOUND);
}
