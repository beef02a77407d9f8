use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value;

/// Weight of a finding: `Error` blocks readiness, `Warning` is a non-blocking
/// concern, `Info` is purely informational.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Severity {
    Error,
    Warning,
    Info,
}

impl Severity {
    pub const fn label(self) -> &'static str {
        match self {
            Severity::Error => "error",
            Severity::Warning => "warning",
            Severity::Info => "info",
        }
    }
}

/// A completeness gap or rule violation surfaced to back-office staff.
///
/// Missing items and validation errors share this shape; identity is the
/// stable dotted `key` (e.g. `missing.owner_name`, `required.owner_name`).
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Finding {
    pub key: String,
    pub severity: Severity,
    pub message: String,
}

impl Finding {
    pub fn new(key: impl Into<String>, severity: Severity, message: impl Into<String>) -> Self {
        Self {
            key: key.into(),
            severity,
            message: message.into(),
        }
    }

    pub fn error(key: impl Into<String>, message: impl Into<String>) -> Self {
        Self::new(key, Severity::Error, message)
    }

    pub fn warning(key: impl Into<String>, message: impl Into<String>) -> Self {
        Self::new(key, Severity::Warning, message)
    }
}

/// True when any finding in the slice carries error severity.
pub fn has_blocking(findings: &[Finding]) -> bool {
    findings
        .iter()
        .any(|finding| finding.severity == Severity::Error)
}

/// Lifecycle status of a permit case. Only `DraftBuilt` and `WaitingOnDocs`
/// are written by the build pipeline; the later states are set by submission
/// tooling elsewhere. The status is not monotonic: every rebuild recomputes
/// it from current findings.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum PermitCaseStatus {
    NotStarted,
    DraftBuilt,
    WaitingOnDocs,
    ReadyToSubmit,
    Submitted,
    Void,
}

impl PermitCaseStatus {
    pub const fn label(self) -> &'static str {
        match self {
            PermitCaseStatus::NotStarted => "NOT_STARTED",
            PermitCaseStatus::DraftBuilt => "DRAFT_BUILT",
            PermitCaseStatus::WaitingOnDocs => "WAITING_ON_DOCS",
            PermitCaseStatus::ReadyToSubmit => "READY_TO_SUBMIT",
            PermitCaseStatus::Submitted => "SUBMITTED",
            PermitCaseStatus::Void => "VOID",
        }
    }

    /// Voided cases are invisible to the idempotent reuse lookup.
    pub const fn is_void(self) -> bool {
        matches!(self, PermitCaseStatus::Void)
    }
}

fn default_true() -> bool {
    true
}

/// Caller knobs for a single build request. Serde defaults match
/// [`BuildOptions::default`] so an omitted `options` object behaves the same
/// as an empty one.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BuildOptions {
    #[serde(default)]
    pub force_rebuild: bool,
    #[serde(default = "default_true")]
    pub auto_detect_jurisdiction: bool,
    #[serde(default = "default_true")]
    pub auto_fetch_parcel: bool,
    #[serde(default)]
    pub parcel_cache_ttl_days: Option<i64>,
    #[serde(default)]
    pub auto_link_approvals: bool,
    #[serde(default)]
    pub auto_extract_approval_fields: bool,
    #[serde(default)]
    pub generate_application_pdf: bool,
    #[serde(default)]
    pub generate_packet_zip: bool,
    #[serde(default)]
    pub include_checklist_pdf: bool,
    #[serde(default)]
    pub dry_run: bool,
}

impl Default for BuildOptions {
    fn default() -> Self {
        Self {
            force_rebuild: false,
            auto_detect_jurisdiction: true,
            auto_fetch_parcel: true,
            parcel_cache_ttl_days: None,
            auto_link_approvals: false,
            auto_extract_approval_fields: false,
            generate_application_pdf: false,
            generate_packet_zip: false,
            include_checklist_pdf: false,
            dry_run: false,
        }
    }
}

/// Inbound build request as accepted by the HTTP surface and CLI.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BuildRequest {
    pub tenant_id: String,
    pub job_id: String,
    #[serde(default)]
    pub estimate_id: Option<String>,
    #[serde(default)]
    pub options: Option<BuildOptions>,
}

/// Immutable snapshot of everything needed to fill a permit application.
///
/// Built once per build request and discarded after the response. Absent
/// sources are represented by their empty shapes, never by missing keys, so
/// template `source.ref` paths resolve predictably to `null`.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CanonicalContext {
    pub meta: ContextMeta,
    pub permit_case: CaseSection,
    pub authority: AuthoritySection,
    pub job: JobSection,
    pub owner_contact: OwnerSection,
    pub parcel: ParcelSection,
    pub measurements: MeasurementSection,
    pub estimate: EstimateSection,
    pub products: ProductsSection,
    pub company: CompanySection,
}

impl CanonicalContext {
    /// JSON projection used by the evaluator, resolver, and validator for
    /// dotted path lookups. Serialization of the context cannot fail; the
    /// fallback keeps the contract total.
    pub fn snapshot(&self) -> Value {
        serde_json::to_value(self).unwrap_or(Value::Null)
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ContextMeta {
    pub tenant_id: String,
    pub permit_case_id: String,
    pub job_id: String,
    pub estimate_id: Option<String>,
    pub built_at: DateTime<Utc>,
    pub sources_used: Vec<String>,
    pub warnings: Vec<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CaseSection {
    pub id: String,
    pub status: String,
    pub permit_type: Option<String>,
    pub county_name: Option<String>,
    pub city_name: Option<String>,
    pub authority_id: Option<String>,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct AuthoritySection {
    pub id: Option<String>,
    pub name: Option<String>,
    pub jurisdiction_level: Option<String>,
    pub portal_url: Option<String>,
    pub phone: Option<String>,
    pub email: Option<String>,
}

impl AuthoritySection {
    pub fn empty() -> Self {
        Self::default()
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct JobSection {
    pub id: String,
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

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct MailingAddress {
    pub street: Option<String>,
    pub city: Option<String>,
    pub state: Option<String>,
    pub zip: Option<String>,
    pub full: Option<String>,
}

impl MailingAddress {
    pub fn empty() -> Self {
        Self::default()
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct OwnerSection {
    pub contact_id: Option<String>,
    pub first_name: Option<String>,
    pub last_name: Option<String>,
    pub full_name: Option<String>,
    pub phone: Option<String>,
    pub email: Option<String>,
    pub mailing_address: MailingAddress,
}

impl OwnerSection {
    pub fn empty() -> Self {
        Self {
            contact_id: None,
            first_name: None,
            last_name: None,
            full_name: None,
            phone: None,
            email: None,
            mailing_address: MailingAddress::empty(),
        }
    }
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct ParcelSection {
    pub parcel_id: Option<String>,
    pub county_name: Option<String>,
    pub legal_description: Option<String>,
    pub owner_name: Option<String>,
    pub land_use: Option<String>,
    pub year_built: Option<i32>,
}

impl ParcelSection {
    pub fn empty() -> Self {
        Self::default()
    }

    /// Empty shape that still carries the county the case knows about, so
    /// templates referencing `parcel.county_name` resolve even when no cached
    /// government record exists.
    pub fn empty_for_county(county_name: Option<String>) -> Self {
        Self {
            county_name,
            ..Self::default()
        }
    }
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct MeasurementSection {
    pub id: Option<String>,
    pub source: Option<String>,
    pub total_area_sqft: Option<f64>,
    pub predominant_pitch: Option<String>,
    pub facet_count: Option<u32>,
    pub report_url: Option<String>,
    pub measured_at: Option<DateTime<Utc>>,
}

impl MeasurementSection {
    pub fn empty() -> Self {
        Self::default()
    }
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct EstimateSection {
    pub id: Option<String>,
    pub name: Option<String>,
    pub status: Option<String>,
    pub total: Option<f64>,
    pub approved_at: Option<DateTime<Utc>>,
}

impl EstimateSection {
    pub fn empty() -> Self {
        Self::default()
    }
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct PrimaryProduct {
    pub id: Option<String>,
    pub name: Option<String>,
    pub manufacturer: Option<String>,
    pub approval_number: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ProductComponent {
    pub name: String,
    pub product_kind: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ApprovalDocument {
    pub number: Option<String>,
    pub title: Option<String>,
    pub url: Option<String>,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct ProductsSection {
    pub primary: PrimaryProduct,
    pub components: Vec<ProductComponent>,
    pub approvals: Vec<ApprovalDocument>,
}

impl ProductsSection {
    pub fn empty() -> Self {
        Self::default()
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CompanySection {
    pub tenant_id: String,
    pub name: Option<String>,
    pub license_number: Option<String>,
    pub phone: Option<String>,
    pub email: Option<String>,
    pub address: Option<String>,
}
