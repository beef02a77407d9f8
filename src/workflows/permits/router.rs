use std::sync::Arc;

use axum::{
    extract::{Path, Query, State},
    http::StatusCode,
    response::{IntoResponse, Response},
    routing::{get, post},
    Router,
};
use serde::Deserialize;
use serde_json::json;
use tracing::error;

use super::documents::DocumentGenerator;
use super::domain::BuildRequest;
use super::service::{PermitBuildError, PermitBuildService};
use crate::store::PermitStore;

/// Handler state: the build service plus whether failure envelopes may carry
/// the underlying error detail. Production keeps 500 bodies generic.
pub(crate) struct RouterState<S, D> {
    service: Arc<PermitBuildService<S, D>>,
    expose_diagnostics: bool,
}

impl<S, D> Clone for RouterState<S, D> {
    fn clone(&self) -> Self {
        Self {
            service: Arc::clone(&self.service),
            expose_diagnostics: self.expose_diagnostics,
        }
    }
}

/// Router builder exposing HTTP endpoints for application assembly and case
/// lookup. `expose_diagnostics` is false in production, where internal
/// failure messages stay out of response bodies.
pub fn permit_router<S, D>(
    service: Arc<PermitBuildService<S, D>>,
    expose_diagnostics: bool,
) -> Router
where
    S: PermitStore + 'static,
    D: DocumentGenerator + 'static,
{
    Router::new()
        .route("/api/v1/permits/build", post(build_handler::<S, D>))
        .route(
            "/api/v1/permits/cases/:case_id",
            get(case_handler::<S, D>),
        )
        .with_state(RouterState {
            service,
            expose_diagnostics,
        })
}

pub(crate) async fn build_handler<S, D>(
    State(state): State<RouterState<S, D>>,
    axum::Json(request): axum::Json<BuildRequest>,
) -> Response
where
    S: PermitStore + 'static,
    D: DocumentGenerator + 'static,
{
    match state.service.build(request) {
        Ok(outcome) => (StatusCode::OK, axum::Json(outcome)).into_response(),
        Err(PermitBuildError::InvalidRequest(message)) => {
            let payload = json!({
                "code": "invalid_request",
                "message": message,
            });
            (StatusCode::BAD_REQUEST, axum::Json(payload)).into_response()
        }
        Err(PermitBuildError::NotFound { entity }) => {
            let payload = json!({
                "code": "not_found",
                "message": format!("{entity} not found"),
                "details": { "entity": entity },
            });
            (StatusCode::NOT_FOUND, axum::Json(payload)).into_response()
        }
        Err(other) => {
            error!(error = %other, "permit build failed");
            let payload = json!({
                "code": "build_failed",
                "message": failure_message(&other, state.expose_diagnostics),
            });
            (StatusCode::INTERNAL_SERVER_ERROR, axum::Json(payload)).into_response()
        }
    }
}

#[derive(Debug, Deserialize)]
pub(crate) struct CaseQuery {
    tenant_id: String,
}

pub(crate) async fn case_handler<S, D>(
    State(state): State<RouterState<S, D>>,
    Path(case_id): Path<String>,
    Query(query): Query<CaseQuery>,
) -> Response
where
    S: PermitStore + 'static,
    D: DocumentGenerator + 'static,
{
    match state.service.get_case(&query.tenant_id, &case_id) {
        Ok(view) => (StatusCode::OK, axum::Json(view)).into_response(),
        Err(PermitBuildError::NotFound { entity }) => {
            let payload = json!({
                "code": "not_found",
                "message": format!("{entity} not found"),
                "details": { "entity": entity },
            });
            (StatusCode::NOT_FOUND, axum::Json(payload)).into_response()
        }
        Err(other) => {
            error!(error = %other, %case_id, "permit case lookup failed");
            let payload = json!({
                "code": "internal",
                "message": failure_message(&other, state.expose_diagnostics),
            });
            (StatusCode::INTERNAL_SERVER_ERROR, axum::Json(payload)).into_response()
        }
    }
}

fn failure_message(error: &PermitBuildError, expose_diagnostics: bool) -> String {
    if expose_diagnostics {
        error.to_string()
    } else {
        "unexpected failure".to_string()
    }
}
