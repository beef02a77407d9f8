//! Persistent record shapes and the data-store abstraction.
//!
//! The relational store itself is an external collaborator; the pipeline only
//! needs fetch-by-id/filter operations plus the idempotent case upsert, so
//! everything is expressed through [`PermitStore`] and exercised in-process
//! through [`memory::InMemoryPermitStore`].

pub mod memory;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::workflows::permits::domain::{
    ApprovalDocument, Finding, PermitCaseStatus, ProductComponent,
};

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct JobRecord {
    pub id: String,
    pub tenant_id: String,
    pub name: Option<String>,
    pub full_address: Option<String>,
    pub street_address: Option<String>,
    pub city: Option<String>,
    pub state: Option<String>,
    pub zip: Option<String>,
    pub county_name: Option<String>,
    pub latitude: Option<f64>,
    pub longitude: Option<f64>,
    pub stories: Option<u32>,
    pub contact_id: Option<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ContactRecord {
    pub id: String,
    pub tenant_id: String,
    pub first_name: Option<String>,
    pub last_name: Option<String>,
    pub phone: Option<String>,
    pub email: Option<String>,
    pub address_street: Option<String>,
    pub address_city: Option<String>,
    pub address_state: Option<String>,
    pub address_zip: Option<String>,
    pub mailing_street: Option<String>,
    pub mailing_city: Option<String>,
    pub mailing_state: Option<String>,
    pub mailing_zip: Option<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AuthorityRecord {
    pub id: String,
    pub tenant_id: String,
    pub name: String,
    pub county_name: Option<String>,
    pub city_name: Option<String>,
    pub jurisdiction_level: Option<String>,
    pub portal_url: Option<String>,
    pub phone: Option<String>,
    pub email: Option<String>,
}

/// Where a roof survey came from. Aerial vendors are trusted over manual
/// field measurements regardless of recency.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum MeasurementSource {
    Roofr,
    Eagleview,
    Manual,
    #[serde(untagged)]
    Other(String),
}

impl MeasurementSource {
    pub fn label(&self) -> &str {
        match self {
            MeasurementSource::Roofr => "ROOFR",
            MeasurementSource::Eagleview => "EAGLEVIEW",
            MeasurementSource::Manual => "MANUAL",
            MeasurementSource::Other(name) => name,
        }
    }

    /// Lower ranks are preferred; unranked sources compete on recency only.
    pub fn trust_rank(&self) -> Option<u8> {
        match self {
            MeasurementSource::Roofr => Some(0),
            MeasurementSource::Eagleview => Some(1),
            MeasurementSource::Manual => Some(2),
            MeasurementSource::Other(_) => None,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MeasurementRecord {
    pub id: String,
    pub tenant_id: String,
    pub job_id: String,
    pub source: MeasurementSource,
    pub total_area_sqft: Option<f64>,
    pub predominant_pitch: Option<String>,
    pub facet_count: Option<u32>,
    pub report_url: Option<String>,
    pub measured_at: DateTime<Utc>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ParcelRecord {
    pub county_name: String,
    pub parcel_id: Option<String>,
    pub legal_description: Option<String>,
    pub owner_name: Option<String>,
    pub land_use: Option<String>,
    pub year_built: Option<i32>,
    pub street_address: Option<String>,
    pub fetched_at: DateTime<Utc>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct EstimateRecord {
    pub id: String,
    pub tenant_id: String,
    pub job_id: String,
    pub name: Option<String>,
    pub status: Option<String>,
    pub total: Option<f64>,
    pub approved_at: Option<DateTime<Utc>>,
}

/// Product mapping for an estimate: the primary roofing product plus its
/// components and the government approval documents that cover it.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ProductSelectionRecord {
    pub estimate_id: String,
    pub primary_id: Option<String>,
    pub primary_name: Option<String>,
    pub manufacturer: Option<String>,
    pub components: Vec<ProductComponent>,
    pub approvals: Vec<ApprovalDocument>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CompanyRecord {
    pub tenant_id: String,
    pub name: Option<String>,
    pub license_number: Option<String>,
    pub phone: Option<String>,
    pub email: Option<String>,
    pub address: Option<String>,
}

/// Versioned per-(tenant, authority, permit-type) template row. The document
/// itself stays schema-less until the template boundary parses it.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TemplateRecord {
    pub id: String,
    pub tenant_id: String,
    pub authority_id: Option<String>,
    pub permit_type: String,
    pub version: i64,
    pub active: bool,
    pub document: Value,
}

/// Persistent permit case. `status` is the only lifecycle field the build
/// pipeline mutates; the snapshot columns hold the last computed build for
/// audit and history.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PermitCaseRecord {
    pub id: String,
    pub tenant_id: String,
    pub job_id: String,
    pub estimate_id: Option<String>,
    pub status: PermitCaseStatus,
    pub permit_type: String,
    pub county_name: Option<String>,
    pub city_name: Option<String>,
    pub authority_id: Option<String>,
    pub template_id: Option<String>,
    pub field_values: Value,
    pub calculation_results: Value,
    pub validation_errors: Vec<Finding>,
    pub missing_keys: Vec<String>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

/// Append-only audit record. Created by the orchestrator, never mutated.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PermitCaseEventRecord {
    pub id: String,
    pub case_id: String,
    pub event_type: String,
    pub message: String,
    pub details: Value,
    pub created_at: DateTime<Utc>,
}

/// Seed values for a freshly inserted case.
#[derive(Debug, Clone)]
pub struct NewPermitCase {
    pub tenant_id: String,
    pub job_id: String,
    pub estimate_id: Option<String>,
    pub permit_type: String,
}

/// Result of the idempotent case lookup-or-insert.
#[derive(Debug, Clone)]
pub struct ObtainedCase {
    pub record: PermitCaseRecord,
    pub created: bool,
}

/// Fields written back after a successful build.
#[derive(Debug, Clone)]
pub struct CaseSummaryUpdate {
    pub status: PermitCaseStatus,
    pub authority_id: Option<String>,
    pub template_id: Option<String>,
    pub county_name: Option<String>,
    pub city_name: Option<String>,
    pub field_values: Value,
    pub calculation_results: Value,
    pub validation_errors: Vec<Finding>,
    pub missing_keys: Vec<String>,
}

/// Storage abstraction so the build pipeline can be exercised in isolation.
///
/// `obtain_or_create_case` is a single store-side operation: implementations
/// must make the "reuse newest non-void case or insert" decision atomically
/// (a uniqueness-constrained conditional insert in SQL, one mutex acquisition
/// in memory) so concurrent builds for the same (tenant, job, estimate) never
/// both insert.
pub trait PermitStore: Send + Sync {
    fn fetch_job(&self, tenant_id: &str, job_id: &str) -> Result<Option<JobRecord>, StoreError>;

    fn fetch_contact(
        &self,
        tenant_id: &str,
        contact_id: &str,
    ) -> Result<Option<ContactRecord>, StoreError>;

    fn fetch_authority(
        &self,
        tenant_id: &str,
        authority_id: &str,
    ) -> Result<Option<AuthorityRecord>, StoreError>;

    /// Jurisdiction auto-detection: city match first, then county.
    fn find_authority_for(
        &self,
        tenant_id: &str,
        county_name: Option<&str>,
        city_name: Option<&str>,
    ) -> Result<Option<AuthorityRecord>, StoreError>;

    fn measurements_for_job(
        &self,
        tenant_id: &str,
        job_id: &str,
    ) -> Result<Vec<MeasurementRecord>, StoreError>;

    fn fetch_parcel(
        &self,
        tenant_id: &str,
        county_name: &str,
        street_address: Option<&str>,
    ) -> Result<Option<ParcelRecord>, StoreError>;

    fn fetch_estimate(
        &self,
        tenant_id: &str,
        estimate_id: &str,
    ) -> Result<Option<EstimateRecord>, StoreError>;

    fn products_for_estimate(
        &self,
        tenant_id: &str,
        estimate_id: &str,
    ) -> Result<Option<ProductSelectionRecord>, StoreError>;

    fn fetch_company(&self, tenant_id: &str) -> Result<Option<CompanyRecord>, StoreError>;

    fn active_templates(
        &self,
        tenant_id: &str,
        authority_id: Option<&str>,
        permit_type: &str,
    ) -> Result<Vec<TemplateRecord>, StoreError>;

    fn fetch_case(
        &self,
        tenant_id: &str,
        case_id: &str,
    ) -> Result<Option<PermitCaseRecord>, StoreError>;

    /// Reuse the newest non-void case for (tenant, job, estimate) or insert a
    /// fresh `NOT_STARTED` one, atomically.
    fn obtain_or_create_case(&self, seed: NewPermitCase) -> Result<ObtainedCase, StoreError>;

    /// Unconditionally insert a fresh `NOT_STARTED` case (`force_rebuild`).
    fn create_case(&self, seed: NewPermitCase) -> Result<PermitCaseRecord, StoreError>;

    fn update_case_summary(
        &self,
        case_id: &str,
        update: CaseSummaryUpdate,
    ) -> Result<PermitCaseRecord, StoreError>;

    fn append_event(
        &self,
        case_id: &str,
        event_type: &str,
        message: &str,
        details: Value,
    ) -> Result<(), StoreError>;
}

/// Error enumeration for store failures.
#[derive(Debug, thiserror::Error)]
pub enum StoreError {
    #[error("record not found")]
    NotFound,
    #[error("store unavailable: {0}")]
    Unavailable(String),
}
