use std::sync::Arc;

use axum::response::Response;
use chrono::{TimeZone, Utc};
use serde_json::Value;

use crate::store::memory::{demo_store, InMemoryPermitStore};
use crate::store::{
    AuthorityRecord, CaseSummaryUpdate, CompanyRecord, ContactRecord, EstimateRecord, JobRecord,
    MeasurementRecord, MeasurementSource, NewPermitCase, ObtainedCase, ParcelRecord,
    PermitCaseRecord, PermitStore, ProductSelectionRecord, StoreError, TemplateRecord,
};
use crate::workflows::permits::documents::{
    DocumentArtifact, DocumentError, DocumentGenerator, DocumentRequest, StubDocumentGenerator,
};
use crate::workflows::permits::domain::{BuildOptions, BuildRequest};
use crate::workflows::permits::service::PermitBuildService;

pub(super) const TENANT: &str = "t-demo";
pub(super) const DEMO_JOB: &str = "job-1001";
pub(super) const DEMO_ESTIMATE: &str = "est-5005";
pub(super) const PARCEL_TTL_DAYS: i64 = 30;

pub(super) fn demo_service() -> (
    Arc<PermitBuildService<InMemoryPermitStore, StubDocumentGenerator>>,
    Arc<InMemoryPermitStore>,
) {
    let store = Arc::new(demo_store());
    let service = Arc::new(PermitBuildService::new(
        store.clone(),
        Arc::new(StubDocumentGenerator::new()),
        PARCEL_TTL_DAYS,
    ));
    (service, store)
}

pub(super) fn demo_request() -> BuildRequest {
    BuildRequest {
        tenant_id: TENANT.to_string(),
        job_id: DEMO_JOB.to_string(),
        estimate_id: Some(DEMO_ESTIMATE.to_string()),
        options: None,
    }
}

pub(super) fn request_with_options(options: BuildOptions) -> BuildRequest {
    BuildRequest {
        options: Some(options),
        ..demo_request()
    }
}

/// A job with measurements, an estimate, and products, but no parcel record
/// and a contact without a usable name. Until the parcel is seeded the owner
/// name cannot be determined.
pub(super) fn gap_store() -> InMemoryPermitStore {
    let store = InMemoryPermitStore::new();

    store.seed_company(CompanyRecord {
        tenant_id: TENANT.to_string(),
        name: Some("Sunshine State Roofing LLC".to_string()),
        license_number: Some("CCC1331402".to_string()),
        phone: None,
        email: None,
        address: None,
    });

    store.seed_job(JobRecord {
        id: "job-2002".to_string(),
        tenant_id: TENANT.to_string(),
        name: Some("Ocoee re-roof".to_string()),
        full_address: None,
        street_address: Some("88 Starke Lake Cir".to_string()),
        city: Some("Ocoee".to_string()),
        state: Some("FL".to_string()),
        zip: Some("34761".to_string()),
        county_name: Some("Orange".to_string()),
        latitude: Some(28.569_1),
        longitude: Some(-81.544_0),
        stories: Some(1),
        contact_id: Some("contact-9".to_string()),
    });

    store.seed_contact(ContactRecord {
        id: "contact-9".to_string(),
        tenant_id: TENANT.to_string(),
        first_name: None,
        last_name: None,
        phone: Some("407-555-0162".to_string()),
        email: None,
        address_street: None,
        address_city: None,
        address_state: None,
        address_zip: None,
        mailing_street: None,
        mailing_city: None,
        mailing_state: None,
        mailing_zip: None,
    });

    store.seed_measurement(MeasurementRecord {
        id: "meas-9".to_string(),
        tenant_id: TENANT.to_string(),
        job_id: "job-2002".to_string(),
        source: MeasurementSource::Roofr,
        total_area_sqft: Some(1980.0),
        predominant_pitch: Some("4/12".to_string()),
        facet_count: Some(7),
        report_url: Some("https://reports.roofr.example/job-2002.pdf".to_string()),
        measured_at: Utc
            .with_ymd_and_hms(2026, 8, 18, 12, 0, 0)
            .single()
            .unwrap_or_default(),
    });

    store.seed_estimate(EstimateRecord {
        id: "est-7007".to_string(),
        tenant_id: TENANT.to_string(),
        job_id: "job-2002".to_string(),
        name: Some("3-tab replacement".to_string()),
        status: Some("approved".to_string()),
        total: Some(12_900.0),
        approved_at: None,
    });

    store.seed_products(
        TENANT,
        ProductSelectionRecord {
            estimate_id: "est-7007".to_string(),
            primary_id: Some("prod-3tab".to_string()),
            primary_name: Some("Royal Sovereign".to_string()),
            manufacturer: Some("GAF".to_string()),
            components: Vec::new(),
            approvals: Vec::new(),
        },
    );

    store
}

pub(super) fn gap_request() -> BuildRequest {
    BuildRequest {
        tenant_id: TENANT.to_string(),
        job_id: "job-2002".to_string(),
        estimate_id: Some("est-7007".to_string()),
        options: None,
    }
}

pub(super) fn ocoee_parcel() -> ParcelRecord {
    ParcelRecord {
        county_name: "Orange".to_string(),
        parcel_id: Some("17-22-28-6100-01-050".to_string()),
        legal_description: Some("STARKE LAKE SHORES LOT 5".to_string()),
        owner_name: Some("NGUYEN LINH T".to_string()),
        land_use: Some("0100 - Single Family".to_string()),
        year_built: Some(2001),
        street_address: Some("88 Starke Lake Cir".to_string()),
        fetched_at: Utc::now(),
    }
}

/// Store double whose every operation fails, for exercising the 500 path.
pub(super) struct UnavailableStore;

impl UnavailableStore {
    fn outage() -> StoreError {
        StoreError::Unavailable("connection pool exhausted".to_string())
    }
}

impl PermitStore for UnavailableStore {
    fn fetch_job(&self, _tenant_id: &str, _job_id: &str) -> Result<Option<JobRecord>, StoreError> {
        Err(Self::outage())
    }

    fn fetch_contact(
        &self,
        _tenant_id: &str,
        _contact_id: &str,
    ) -> Result<Option<ContactRecord>, StoreError> {
        Err(Self::outage())
    }

    fn fetch_authority(
        &self,
        _tenant_id: &str,
        _authority_id: &str,
    ) -> Result<Option<AuthorityRecord>, StoreError> {
        Err(Self::outage())
    }

    fn find_authority_for(
        &self,
        _tenant_id: &str,
        _county_name: Option<&str>,
        _city_name: Option<&str>,
    ) -> Result<Option<AuthorityRecord>, StoreError> {
        Err(Self::outage())
    }

    fn measurements_for_job(
        &self,
        _tenant_id: &str,
        _job_id: &str,
    ) -> Result<Vec<MeasurementRecord>, StoreError> {
        Err(Self::outage())
    }

    fn fetch_parcel(
        &self,
        _tenant_id: &str,
        _county_name: &str,
        _street_address: Option<&str>,
    ) -> Result<Option<ParcelRecord>, StoreError> {
        Err(Self::outage())
    }

    fn fetch_estimate(
        &self,
        _tenant_id: &str,
        _estimate_id: &str,
    ) -> Result<Option<EstimateRecord>, StoreError> {
        Err(Self::outage())
    }

    fn products_for_estimate(
        &self,
        _tenant_id: &str,
        _estimate_id: &str,
    ) -> Result<Option<ProductSelectionRecord>, StoreError> {
        Err(Self::outage())
    }

    fn fetch_company(&self, _tenant_id: &str) -> Result<Option<CompanyRecord>, StoreError> {
        Err(Self::outage())
    }

    fn active_templates(
        &self,
        _tenant_id: &str,
        _authority_id: Option<&str>,
        _permit_type: &str,
    ) -> Result<Vec<TemplateRecord>, StoreError> {
        Err(Self::outage())
    }

    fn fetch_case(
        &self,
        _tenant_id: &str,
        _case_id: &str,
    ) -> Result<Option<PermitCaseRecord>, StoreError> {
        Err(Self::outage())
    }

    fn obtain_or_create_case(&self, _seed: NewPermitCase) -> Result<ObtainedCase, StoreError> {
        Err(Self::outage())
    }

    fn create_case(&self, _seed: NewPermitCase) -> Result<PermitCaseRecord, StoreError> {
        Err(Self::outage())
    }

    fn update_case_summary(
        &self,
        _case_id: &str,
        _update: CaseSummaryUpdate,
    ) -> Result<PermitCaseRecord, StoreError> {
        Err(Self::outage())
    }

    fn append_event(
        &self,
        _case_id: &str,
        _event_type: &str,
        _message: &str,
        _details: Value,
    ) -> Result<(), StoreError> {
        Err(Self::outage())
    }
}

pub(super) struct FailingDocumentGenerator;

impl DocumentGenerator for FailingDocumentGenerator {
    fn generate(&self, _request: DocumentRequest<'_>) -> Result<DocumentArtifact, DocumentError> {
        Err(DocumentError::Render("renderer offline".to_string()))
    }
}

pub(super) async fn read_json_body(response: Response) -> Value {
    let body = axum::body::to_bytes(response.into_body(), 1 << 16)
        .await
        .expect("read body");
    serde_json::from_slice(&body).expect("json payload")
}
