//! Build orchestration: sequences aggregation, template resolution,
//! validation, and missing-item diagnosis, computes the case status, persists
//! the result idempotently, and composes the response.

use std::collections::BTreeMap;
use std::sync::Arc;

use chrono::{DateTime, Utc};
use serde::Serialize;
use serde_json::{json, Value};
use tracing::{info, warn};

use super::context::{AggregateError, ContextAggregator};
use super::documents::{DocumentArtifact, DocumentGenerator, DocumentKind, DocumentRequest};
use super::domain::{
    has_blocking, BuildOptions, BuildRequest, CanonicalContext, Finding, PermitCaseStatus,
};
use super::missing;
use super::template::{self, CalcFailure, PermitTemplate, TemplateError};
use super::validation;
use crate::store::{CaseSummaryUpdate, NewPermitCase, PermitCaseRecord, PermitStore, StoreError};

/// Roofing is the only permit type the build pipeline currently creates;
/// other types arrive through explicit case CRUD.
const DEFAULT_PERMIT_TYPE: &str = "ROOF";

const BUILD_EVENT: &str = "permit.build";
const DOCUMENT_FAILED_EVENT: &str = "permit.document_failed";

/// Error raised by the build service.
#[derive(Debug, thiserror::Error)]
pub enum PermitBuildError {
    #[error("invalid build request: {0}")]
    InvalidRequest(String),
    #[error("{entity} not found")]
    NotFound { entity: &'static str },
    #[error(transparent)]
    Template(#[from] TemplateError),
    #[error(transparent)]
    Store(#[from] StoreError),
}

impl From<AggregateError> for PermitBuildError {
    fn from(value: AggregateError) -> Self {
        match value {
            AggregateError::NotFound { entity } => Self::NotFound { entity },
            AggregateError::Store(err) => Self::Store(err),
        }
    }
}

/// Case projection returned with every build.
#[derive(Debug, Clone, Serialize)]
pub struct PermitCaseView {
    pub id: String,
    pub status: String,
    pub job_id: String,
    pub estimate_id: Option<String>,
    pub authority_id: Option<String>,
    pub template_id: Option<String>,
    pub jurisdiction: JurisdictionView,
}

#[derive(Debug, Clone, Serialize)]
pub struct JurisdictionView {
    pub permit_type: String,
    pub county_name: Option<String>,
    pub city_name: Option<String>,
}

/// Human-facing follow-up suggested to back-office staff.
#[derive(Debug, Clone, Serialize)]
pub struct NextAction {
    pub action: String,
    pub label: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub url: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub items: Option<Vec<String>>,
}

/// Small context projection for UI summary cards.
#[derive(Debug, Clone, Serialize)]
pub struct ContextPreview {
    pub job_address: Option<String>,
    pub owner_name: Option<String>,
    pub county_name: Option<String>,
    pub authority_name: Option<String>,
    pub roof_area_sqft: Option<f64>,
    pub estimate_total: Option<f64>,
    pub primary_product: Option<String>,
}

impl ContextPreview {
    fn from_context(context: &CanonicalContext) -> Self {
        Self {
            job_address: context.job.full_address.clone(),
            owner_name: context
                .parcel
                .owner_name
                .clone()
                .or_else(|| context.owner_contact.full_name.clone()),
            county_name: context.parcel.county_name.clone(),
            authority_name: context.authority.name.clone(),
            roof_area_sqft: context.measurements.total_area_sqft,
            estimate_total: context.estimate.total,
            primary_product: context.products.primary.name.clone(),
        }
    }
}

/// Composed result of one build request.
#[derive(Debug, Clone, Serialize)]
pub struct PermitBuildOutcome {
    pub permit_case: PermitCaseView,
    pub missing_items: Vec<Finding>,
    pub validation_errors: Vec<Finding>,
    pub application_field_values: BTreeMap<String, Value>,
    pub calculation_results: BTreeMap<String, Value>,
    pub calculation_errors: Vec<CalcFailure>,
    pub documents: Vec<DocumentArtifact>,
    pub next_actions: Vec<NextAction>,
    pub context_preview: ContextPreview,
}

/// Persisted case projection for the read endpoint.
#[derive(Debug, Clone, Serialize)]
pub struct PersistedCaseView {
    pub id: String,
    pub status: String,
    pub job_id: String,
    pub estimate_id: Option<String>,
    pub authority_id: Option<String>,
    pub template_id: Option<String>,
    pub jurisdiction: JurisdictionView,
    pub field_values: Value,
    pub calculation_results: Value,
    pub validation_errors: Vec<Finding>,
    pub missing_keys: Vec<String>,
    pub updated_at: DateTime<Utc>,
}

impl PersistedCaseView {
    fn from_record(record: PermitCaseRecord) -> Self {
        Self {
            id: record.id,
            status: record.status.label().to_string(),
            job_id: record.job_id,
            estimate_id: record.estimate_id,
            authority_id: record.authority_id,
            template_id: record.template_id,
            jurisdiction: JurisdictionView {
                permit_type: record.permit_type,
                county_name: record.county_name,
                city_name: record.city_name,
            },
            field_values: record.field_values,
            calculation_results: record.calculation_results,
            validation_errors: record.validation_errors,
            missing_keys: record.missing_keys,
            updated_at: record.updated_at,
        }
    }
}

/// Service composing the aggregator, template pipeline, and collaborators.
pub struct PermitBuildService<S, D> {
    store: Arc<S>,
    documents: Arc<D>,
    aggregator: ContextAggregator<S>,
}

impl<S, D> PermitBuildService<S, D>
where
    S: PermitStore + 'static,
    D: DocumentGenerator + 'static,
{
    pub fn new(store: Arc<S>, documents: Arc<D>, default_parcel_ttl_days: i64) -> Self {
        let aggregator = ContextAggregator::new(store.clone(), default_parcel_ttl_days);
        Self {
            store,
            documents,
            aggregator,
        }
    }

    /// Run the full build pipeline for one request.
    pub fn build(&self, request: BuildRequest) -> Result<PermitBuildOutcome, PermitBuildError> {
        let BuildRequest {
            tenant_id,
            job_id,
            estimate_id,
            options,
        } = request;
        let options = options.unwrap_or_default();

        if tenant_id.trim().is_empty() {
            return Err(PermitBuildError::InvalidRequest(
                "tenant_id must not be empty".to_string(),
            ));
        }
        if job_id.trim().is_empty() {
            return Err(PermitBuildError::InvalidRequest(
                "job_id must not be empty".to_string(),
            ));
        }
        let estimate_id = estimate_id.filter(|id| !id.trim().is_empty());

        let case = self.obtain_case(&tenant_id, &job_id, estimate_id.as_deref(), &options)?;

        let aggregated = self.aggregator.build(
            &tenant_id,
            &case.id,
            &job_id,
            estimate_id.as_deref(),
            &options,
        )?;
        let context = aggregated.context;

        let authority_id = context.permit_case.authority_id.clone();
        let template = self.select_template(&tenant_id, authority_id.as_deref(), &case.permit_type)?;

        let mut template_findings = Vec::new();
        let (resolved, validation_errors) = match &template {
            Some(template) => {
                let snapshot = context.snapshot();
                let resolved = template::resolve(template, &snapshot);
                let errors = validation::validate(template, &snapshot, &resolved);
                (resolved, errors)
            }
            None => {
                template_findings.push(Finding::warning(
                    "missing.template",
                    "no active application template is configured for this jurisdiction",
                ));
                (Default::default(), Vec::new())
            }
        };

        // The template's contributions (its own gap warning plus triggered
        // rules) merge after the aggregator's findings, which win on key
        // collisions.
        let template_contributions: Vec<Finding> = template_findings
            .into_iter()
            .chain(validation_errors.iter().cloned())
            .collect();
        let missing_items = missing::merge(aggregated.missing, template_contributions);

        let status = if has_blocking(&validation_errors) || has_blocking(&missing_items) {
            PermitCaseStatus::WaitingOnDocs
        } else {
            PermitCaseStatus::DraftBuilt
        };

        let template_id = template.as_ref().map(|template| template.id.clone());
        let missing_keys: Vec<String> = missing_items
            .iter()
            .map(|finding| finding.key.clone())
            .collect();

        if !options.dry_run {
            self.persist_summary(
                &case,
                &context,
                status,
                authority_id.clone(),
                template_id.clone(),
                &resolved.field_values,
                &resolved.calc_results,
                &validation_errors,
                &missing_keys,
            )?;
        }

        let documents = if options.dry_run {
            Vec::new()
        } else {
            self.generate_documents(&case.id, &options, &context, &resolved.field_values)
        };

        let next_actions = next_actions(&context, &missing_items, &validation_errors, status);

        info!(
            case_id = %case.id,
            status = status.label(),
            missing = missing_items.len(),
            validation_errors = validation_errors.len(),
            dry_run = options.dry_run,
            "permit application build finished"
        );

        Ok(PermitBuildOutcome {
            permit_case: PermitCaseView {
                id: case.id,
                status: status.label().to_string(),
                job_id,
                estimate_id,
                authority_id,
                template_id,
                jurisdiction: JurisdictionView {
                    permit_type: case.permit_type,
                    county_name: context.permit_case.county_name.clone(),
                    city_name: context.permit_case.city_name.clone(),
                },
            },
            missing_items,
            validation_errors,
            application_field_values: resolved.field_values,
            calculation_results: resolved.calc_results,
            calculation_errors: resolved.calc_errors,
            documents,
            next_actions,
            context_preview: ContextPreview::from_context(&context),
        })
    }

    /// Fetch the persisted case projection for read endpoints.
    pub fn get_case(
        &self,
        tenant_id: &str,
        case_id: &str,
    ) -> Result<PersistedCaseView, PermitBuildError> {
        let record = self
            .store
            .fetch_case(tenant_id, case_id)?
            .ok_or(PermitBuildError::NotFound {
                entity: "permit case",
            })?;
        Ok(PersistedCaseView::from_record(record))
    }

    fn obtain_case(
        &self,
        tenant_id: &str,
        job_id: &str,
        estimate_id: Option<&str>,
        options: &BuildOptions,
    ) -> Result<PermitCaseRecord, PermitBuildError> {
        let seed = NewPermitCase {
            tenant_id: tenant_id.to_string(),
            job_id: job_id.to_string(),
            estimate_id: estimate_id.map(str::to_string),
            permit_type: DEFAULT_PERMIT_TYPE.to_string(),
        };

        if options.force_rebuild {
            return Ok(self.store.create_case(seed)?);
        }

        let obtained = self.store.obtain_or_create_case(seed)?;
        if !obtained.created {
            info!(case_id = %obtained.record.id, "reusing existing permit case");
        }
        Ok(obtained.record)
    }

    fn select_template(
        &self,
        tenant_id: &str,
        authority_id: Option<&str>,
        permit_type: &str,
    ) -> Result<Option<PermitTemplate>, PermitBuildError> {
        let rows = self
            .store
            .active_templates(tenant_id, authority_id, permit_type)?;
        match template::select_active(&rows) {
            Some(record) => Ok(Some(PermitTemplate::parse(record)?)),
            None => Ok(None),
        }
    }

    #[allow(clippy::too_many_arguments)]
    fn persist_summary(
        &self,
        case: &PermitCaseRecord,
        context: &CanonicalContext,
        status: PermitCaseStatus,
        authority_id: Option<String>,
        template_id: Option<String>,
        field_values: &BTreeMap<String, Value>,
        calc_results: &BTreeMap<String, Value>,
        validation_errors: &[Finding],
        missing_keys: &[String],
    ) -> Result<(), PermitBuildError> {
        self.store.update_case_summary(
            &case.id,
            CaseSummaryUpdate {
                status,
                authority_id,
                template_id,
                county_name: context.permit_case.county_name.clone(),
                city_name: context.permit_case.city_name.clone(),
                field_values: json!(field_values),
                calculation_results: json!(calc_results),
                validation_errors: validation_errors.to_vec(),
                missing_keys: missing_keys.to_vec(),
            },
        )?;

        // Audit events are best effort; a failed append never fails the build.
        let details = json!({
            "status": status.label(),
            "missing_keys": missing_keys,
            "validation_errors": validation_errors.len(),
            "sources_used": context.meta.sources_used,
        });
        if let Err(err) = self.store.append_event(
            &case.id,
            BUILD_EVENT,
            &format!("application rebuilt; status {}", status.label()),
            details,
        ) {
            warn!(case_id = %case.id, error = %err, "failed to append build audit event");
        }

        Ok(())
    }

    fn generate_documents(
        &self,
        case_id: &str,
        options: &BuildOptions,
        context: &CanonicalContext,
        field_values: &BTreeMap<String, Value>,
    ) -> Vec<DocumentArtifact> {
        let mut documents = Vec::new();

        if options.generate_application_pdf {
            let payload = json!(field_values);
            self.try_generate(
                case_id,
                DocumentKind::Application,
                "Permit application".to_string(),
                &payload,
                &mut documents,
            );
        }

        if options.include_checklist_pdf {
            let payload = json!({"warnings": context.meta.warnings});
            self.try_generate(
                case_id,
                DocumentKind::Checklist,
                "Submission checklist".to_string(),
                &payload,
                &mut documents,
            );
        }

        if options.generate_packet_zip {
            let mut manifest: Vec<Value> = documents
                .iter()
                .map(|artifact| {
                    json!({
                        "kind": artifact.kind.label(),
                        "title": artifact.title,
                        "storage_key": artifact.storage_key,
                    })
                })
                .collect();
            if options.auto_link_approvals {
                for approval in &context.products.approvals {
                    manifest.push(json!({
                        "kind": "product_approval",
                        "title": approval.title,
                        "url": approval.url,
                    }));
                }
            }
            let payload = json!({"entries": manifest});
            self.try_generate(
                case_id,
                DocumentKind::PacketZip,
                "Submission packet".to_string(),
                &payload,
                &mut documents,
            );
        }

        documents
    }

    /// A failed generation is logged and recorded as an audit event but never
    /// fails the build; the artifact is simply omitted.
    fn try_generate(
        &self,
        case_id: &str,
        kind: DocumentKind,
        title: String,
        payload: &Value,
        documents: &mut Vec<DocumentArtifact>,
    ) {
        match self.documents.generate(DocumentRequest {
            case_id,
            kind,
            title: title.clone(),
            payload,
        }) {
            Ok(artifact) => documents.push(artifact),
            Err(err) => {
                warn!(case_id = %case_id, kind = kind.label(), error = %err, "document generation failed");
                let details = json!({"kind": kind.label(), "error": err.to_string()});
                if let Err(event_err) = self.store.append_event(
                    case_id,
                    DOCUMENT_FAILED_EVENT,
                    &format!("failed to generate {} document", kind.label()),
                    details,
                ) {
                    warn!(case_id = %case_id, error = %event_err, "failed to record document failure event");
                }
            }
        }
    }
}

fn next_actions(
    context: &CanonicalContext,
    missing_items: &[Finding],
    validation_errors: &[Finding],
    status: PermitCaseStatus,
) -> Vec<NextAction> {
    let mut actions = Vec::new();

    if let Some(url) = &context.authority.portal_url {
        let authority = context
            .authority
            .name
            .clone()
            .unwrap_or_else(|| "the authority portal".to_string());
        actions.push(NextAction {
            action: "open_authority_portal".to_string(),
            label: format!("File with {authority}"),
            url: Some(url.clone()),
            items: None,
        });
    }

    let mut blocking: Vec<String> = Vec::new();
    for finding in missing_items.iter().chain(validation_errors) {
        if finding.severity == super::domain::Severity::Error && !blocking.contains(&finding.key) {
            blocking.push(finding.key.clone());
        }
    }

    if !blocking.is_empty() {
        actions.push(NextAction {
            action: "resolve_blocking_items".to_string(),
            label: format!("Resolve {} blocking item(s) before submission", blocking.len()),
            url: None,
            items: Some(blocking),
        });
    } else if status == PermitCaseStatus::DraftBuilt {
        actions.push(NextAction {
            action: "review_draft".to_string(),
            label: "Review the drafted application".to_string(),
            url: None,
            items: None,
        });
    }

    actions
}
