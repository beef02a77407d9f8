use std::sync::Arc;

use axum::http::StatusCode;
use permit_desk::store::memory::demo_store;
use permit_desk::workflows::permits::{
    permit_router, BuildOptions, BuildRequest, PermitBuildService, Severity, StubDocumentGenerator,
};
use serde_json::json;
use tower::ServiceExt;

fn demo_service() -> Arc<PermitBuildService<permit_desk::store::memory::InMemoryPermitStore, StubDocumentGenerator>>
{
    Arc::new(PermitBuildService::new(
        Arc::new(demo_store()),
        Arc::new(StubDocumentGenerator::new()),
        30,
    ))
}

fn demo_request() -> BuildRequest {
    BuildRequest {
        tenant_id: "t-demo".to_string(),
        job_id: "job-1001".to_string(),
        estimate_id: Some("est-5005".to_string()),
        options: None,
    }
}

#[test]
fn demo_tenant_builds_a_submittable_draft() {
    let service = demo_service();

    let outcome = service.build(demo_request()).expect("build succeeds");

    assert_eq!(outcome.permit_case.status, "DRAFT_BUILT");
    assert!(!outcome
        .missing_items
        .iter()
        .any(|finding| finding.severity == Severity::Error));

    // The address is composed from parts because the job record carries no
    // precomposed full address.
    assert_eq!(
        outcome.application_field_values.get("job_address"),
        Some(&json!("215 Lakeshore Dr, Winter Garden, FL 34787"))
    );
    assert_eq!(
        outcome.calculation_results.get("roof_area_squares"),
        Some(&json!(24.125))
    );

    // The aerial survey wins over the more recent manual one.
    assert_eq!(outcome.context_preview.roof_area_sqft, Some(2412.5));

    assert!(outcome
        .next_actions
        .iter()
        .any(|action| action.action == "open_authority_portal"));
}

#[test]
fn rebuilds_are_idempotent_per_job() {
    let service = demo_service();

    let first = service.build(demo_request()).expect("first build");
    let second = service.build(demo_request()).expect("second build");

    assert_eq!(first.permit_case.id, second.permit_case.id);
}

#[test]
fn documents_are_produced_on_request() {
    let service = demo_service();

    let outcome = service
        .build(BuildRequest {
            options: Some(BuildOptions {
                generate_application_pdf: true,
                generate_packet_zip: true,
                include_checklist_pdf: true,
                auto_link_approvals: true,
                ..BuildOptions::default()
            }),
            ..demo_request()
        })
        .expect("build succeeds");

    assert_eq!(outcome.documents.len(), 3);
}

#[tokio::test]
async fn http_surface_round_trips_a_build() {
    let service = demo_service();
    let router = permit_router(service, true);

    let response = router
        .clone()
        .oneshot(
            axum::http::Request::post("/api/v1/permits/build")
                .header(axum::http::header::CONTENT_TYPE, "application/json")
                .body(axum::body::Body::from(
                    serde_json::to_vec(&demo_request()).expect("serializable request"),
                ))
                .expect("request builds"),
        )
        .await
        .expect("route executes");
    assert_eq!(response.status(), StatusCode::OK);

    let body = axum::body::to_bytes(response.into_body(), 1 << 16)
        .await
        .expect("read body");
    let payload: serde_json::Value = serde_json::from_slice(&body).expect("json payload");
    let case_id = payload
        .pointer("/permit_case/id")
        .and_then(serde_json::Value::as_str)
        .expect("case id present")
        .to_string();

    let response = router
        .oneshot(
            axum::http::Request::get(format!(
                "/api/v1/permits/cases/{case_id}?tenant_id=t-demo"
            ))
            .body(axum::body::Body::empty())
            .expect("request builds"),
        )
        .await
        .expect("route executes");
    assert_eq!(response.status(), StatusCode::OK);
}
