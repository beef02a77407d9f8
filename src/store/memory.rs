//! Mutex-guarded in-memory store used by tests and the demo CLI.

use std::collections::HashMap;
use std::sync::Mutex;

use chrono::{TimeZone, Utc};
use serde_json::{json, Value};

use super::{
    AuthorityRecord, CaseSummaryUpdate, CompanyRecord, ContactRecord, EstimateRecord, JobRecord,
    MeasurementRecord, MeasurementSource, NewPermitCase, ObtainedCase, ParcelRecord,
    PermitCaseEventRecord, PermitCaseRecord, PermitStore, ProductSelectionRecord, StoreError,
    TemplateRecord,
};
use crate::workflows::permits::domain::{ApprovalDocument, PermitCaseStatus, ProductComponent};

#[derive(Default)]
struct State {
    jobs: HashMap<(String, String), JobRecord>,
    contacts: HashMap<(String, String), ContactRecord>,
    authorities: Vec<AuthorityRecord>,
    measurements: Vec<MeasurementRecord>,
    parcels: Vec<ParcelRecord>,
    estimates: HashMap<(String, String), EstimateRecord>,
    products: HashMap<(String, String), ProductSelectionRecord>,
    companies: HashMap<String, CompanyRecord>,
    templates: Vec<TemplateRecord>,
    cases: Vec<PermitCaseRecord>,
    events: Vec<PermitCaseEventRecord>,
    case_seq: u64,
    event_seq: u64,
}

/// In-memory [`PermitStore`]. A single mutex guards all collections, so the
/// reuse-or-insert case operation is naturally atomic.
#[derive(Default)]
pub struct InMemoryPermitStore {
    state: Mutex<State>,
}

impl InMemoryPermitStore {
    pub fn new() -> Self {
        Self::default()
    }

    fn lock(&self) -> Result<std::sync::MutexGuard<'_, State>, StoreError> {
        self.state
            .lock()
            .map_err(|_| StoreError::Unavailable("store mutex poisoned".to_string()))
    }

    pub fn seed_job(&self, job: JobRecord) {
        if let Ok(mut state) = self.state.lock() {
            state
                .jobs
                .insert((job.tenant_id.clone(), job.id.clone()), job);
        }
    }

    pub fn seed_contact(&self, contact: ContactRecord) {
        if let Ok(mut state) = self.state.lock() {
            state
                .contacts
                .insert((contact.tenant_id.clone(), contact.id.clone()), contact);
        }
    }

    pub fn seed_authority(&self, authority: AuthorityRecord) {
        if let Ok(mut state) = self.state.lock() {
            state.authorities.push(authority);
        }
    }

    pub fn seed_measurement(&self, measurement: MeasurementRecord) {
        if let Ok(mut state) = self.state.lock() {
            state.measurements.push(measurement);
        }
    }

    /// The parcel cache mirrors county records and is not tenant-scoped.
    pub fn seed_parcel(&self, parcel: ParcelRecord) {
        if let Ok(mut state) = self.state.lock() {
            state.parcels.push(parcel);
        }
    }

    pub fn seed_estimate(&self, estimate: EstimateRecord) {
        if let Ok(mut state) = self.state.lock() {
            state
                .estimates
                .insert((estimate.tenant_id.clone(), estimate.id.clone()), estimate);
        }
    }

    pub fn seed_products(&self, tenant_id: &str, products: ProductSelectionRecord) {
        if let Ok(mut state) = self.state.lock() {
            state
                .products
                .insert((tenant_id.to_string(), products.estimate_id.clone()), products);
        }
    }

    pub fn seed_company(&self, company: CompanyRecord) {
        if let Ok(mut state) = self.state.lock() {
            state.companies.insert(company.tenant_id.clone(), company);
        }
    }

    pub fn seed_template(&self, template: TemplateRecord) {
        if let Ok(mut state) = self.state.lock() {
            state.templates.push(template);
        }
    }

    /// Test/demo helper: all cases recorded for a (tenant, job) pair.
    pub fn cases_for_job(&self, tenant_id: &str, job_id: &str) -> Vec<PermitCaseRecord> {
        match self.state.lock() {
            Ok(state) => state
                .cases
                .iter()
                .filter(|case| case.tenant_id == tenant_id && case.job_id == job_id)
                .cloned()
                .collect(),
            Err(_) => Vec::new(),
        }
    }

    /// Test/demo helper: audit trail for one case, in append order.
    pub fn events_for_case(&self, case_id: &str) -> Vec<PermitCaseEventRecord> {
        match self.state.lock() {
            Ok(state) => state
                .events
                .iter()
                .filter(|event| event.case_id == case_id)
                .cloned()
                .collect(),
            Err(_) => Vec::new(),
        }
    }

    /// Directly set a case status, standing in for the submission tooling
    /// that owns the later lifecycle states.
    pub fn set_case_status(&self, case_id: &str, status: PermitCaseStatus) {
        if let Ok(mut state) = self.state.lock() {
            if let Some(case) = state.cases.iter_mut().find(|case| case.id == case_id) {
                case.status = status;
            }
        }
    }

    fn insert_case(state: &mut State, seed: NewPermitCase) -> PermitCaseRecord {
        state.case_seq += 1;
        let now = Utc::now();
        let record = PermitCaseRecord {
            id: format!("case-{:06}", state.case_seq),
            tenant_id: seed.tenant_id,
            job_id: seed.job_id,
            estimate_id: seed.estimate_id,
            status: PermitCaseStatus::NotStarted,
            permit_type: seed.permit_type,
            county_name: None,
            city_name: None,
            authority_id: None,
            template_id: None,
            field_values: json!({}),
            calculation_results: json!({}),
            validation_errors: Vec::new(),
            missing_keys: Vec::new(),
            created_at: now,
            updated_at: now,
        };
        state.cases.push(record.clone());
        record
    }
}

impl PermitStore for InMemoryPermitStore {
    fn fetch_job(&self, tenant_id: &str, job_id: &str) -> Result<Option<JobRecord>, StoreError> {
        let state = self.lock()?;
        Ok(state
            .jobs
            .get(&(tenant_id.to_string(), job_id.to_string()))
            .cloned())
    }

    fn fetch_contact(
        &self,
        tenant_id: &str,
        contact_id: &str,
    ) -> Result<Option<ContactRecord>, StoreError> {
        let state = self.lock()?;
        Ok(state
            .contacts
            .get(&(tenant_id.to_string(), contact_id.to_string()))
            .cloned())
    }

    fn fetch_authority(
        &self,
        tenant_id: &str,
        authority_id: &str,
    ) -> Result<Option<AuthorityRecord>, StoreError> {
        let state = self.lock()?;
        Ok(state
            .authorities
            .iter()
            .find(|authority| authority.tenant_id == tenant_id && authority.id == authority_id)
            .cloned())
    }

    fn find_authority_for(
        &self,
        tenant_id: &str,
        county_name: Option<&str>,
        city_name: Option<&str>,
    ) -> Result<Option<AuthorityRecord>, StoreError> {
        let state = self.lock()?;

        if let Some(city) = city_name {
            let by_city = state.authorities.iter().find(|authority| {
                authority.tenant_id == tenant_id
                    && authority
                        .city_name
                        .as_deref()
                        .is_some_and(|name| name.eq_ignore_ascii_case(city))
            });
            if let Some(found) = by_city {
                return Ok(Some(found.clone()));
            }
        }

        if let Some(county) = county_name {
            let by_county = state.authorities.iter().find(|authority| {
                authority.tenant_id == tenant_id
                    && authority.city_name.is_none()
                    && authority
                        .county_name
                        .as_deref()
                        .is_some_and(|name| name.eq_ignore_ascii_case(county))
            });
            if let Some(found) = by_county {
                return Ok(Some(found.clone()));
            }
        }

        Ok(None)
    }

    fn measurements_for_job(
        &self,
        tenant_id: &str,
        job_id: &str,
    ) -> Result<Vec<MeasurementRecord>, StoreError> {
        let state = self.lock()?;
        Ok(state
            .measurements
            .iter()
            .filter(|row| row.tenant_id == tenant_id && row.job_id == job_id)
            .cloned()
            .collect())
    }

    fn fetch_parcel(
        &self,
        _tenant_id: &str,
        county_name: &str,
        street_address: Option<&str>,
    ) -> Result<Option<ParcelRecord>, StoreError> {
        let state = self.lock()?;
        Ok(state
            .parcels
            .iter()
            .find(|parcel| {
                if !parcel.county_name.eq_ignore_ascii_case(county_name) {
                    return false;
                }
                match (street_address, parcel.street_address.as_deref()) {
                    (Some(wanted), Some(found)) => wanted.eq_ignore_ascii_case(found),
                    (None, _) => true,
                    (Some(_), None) => false,
                }
            })
            .cloned())
    }

    fn fetch_estimate(
        &self,
        tenant_id: &str,
        estimate_id: &str,
    ) -> Result<Option<EstimateRecord>, StoreError> {
        let state = self.lock()?;
        Ok(state
            .estimates
            .get(&(tenant_id.to_string(), estimate_id.to_string()))
            .cloned())
    }

    fn products_for_estimate(
        &self,
        tenant_id: &str,
        estimate_id: &str,
    ) -> Result<Option<ProductSelectionRecord>, StoreError> {
        let state = self.lock()?;
        Ok(state
            .products
            .get(&(tenant_id.to_string(), estimate_id.to_string()))
            .cloned())
    }

    fn fetch_company(&self, tenant_id: &str) -> Result<Option<CompanyRecord>, StoreError> {
        let state = self.lock()?;
        Ok(state.companies.get(tenant_id).cloned())
    }

    fn active_templates(
        &self,
        tenant_id: &str,
        authority_id: Option<&str>,
        permit_type: &str,
    ) -> Result<Vec<TemplateRecord>, StoreError> {
        let state = self.lock()?;
        Ok(state
            .templates
            .iter()
            .filter(|template| {
                template.tenant_id == tenant_id
                    && template.active
                    && template.permit_type == permit_type
                    && template.authority_id.as_deref() == authority_id
            })
            .cloned()
            .collect())
    }

    fn fetch_case(
        &self,
        tenant_id: &str,
        case_id: &str,
    ) -> Result<Option<PermitCaseRecord>, StoreError> {
        let state = self.lock()?;
        Ok(state
            .cases
            .iter()
            .find(|case| case.tenant_id == tenant_id && case.id == case_id)
            .cloned())
    }

    fn obtain_or_create_case(&self, seed: NewPermitCase) -> Result<ObtainedCase, StoreError> {
        let mut state = self.lock()?;

        // Insertion order doubles as recency; newest matching row wins.
        let existing = state
            .cases
            .iter()
            .rev()
            .find(|case| {
                case.tenant_id == seed.tenant_id
                    && case.job_id == seed.job_id
                    && case.estimate_id == seed.estimate_id
                    && !case.status.is_void()
            })
            .cloned();

        if let Some(record) = existing {
            return Ok(ObtainedCase {
                record,
                created: false,
            });
        }

        let record = Self::insert_case(&mut state, seed);
        Ok(ObtainedCase {
            record,
            created: true,
        })
    }

    fn create_case(&self, seed: NewPermitCase) -> Result<PermitCaseRecord, StoreError> {
        let mut state = self.lock()?;
        Ok(Self::insert_case(&mut state, seed))
    }

    fn update_case_summary(
        &self,
        case_id: &str,
        update: CaseSummaryUpdate,
    ) -> Result<PermitCaseRecord, StoreError> {
        let mut state = self.lock()?;
        let case = state
            .cases
            .iter_mut()
            .find(|case| case.id == case_id)
            .ok_or(StoreError::NotFound)?;

        case.status = update.status;
        case.authority_id = update.authority_id;
        case.template_id = update.template_id;
        case.county_name = update.county_name;
        case.city_name = update.city_name;
        case.field_values = update.field_values;
        case.calculation_results = update.calculation_results;
        case.validation_errors = update.validation_errors;
        case.missing_keys = update.missing_keys;
        case.updated_at = Utc::now();

        Ok(case.clone())
    }

    fn append_event(
        &self,
        case_id: &str,
        event_type: &str,
        message: &str,
        details: Value,
    ) -> Result<(), StoreError> {
        let mut state = self.lock()?;
        state.event_seq += 1;
        let record = PermitCaseEventRecord {
            id: format!("evt-{:06}", state.event_seq),
            case_id: case_id.to_string(),
            event_type: event_type.to_string(),
            message: message.to_string(),
            details,
            created_at: Utc::now(),
        };
        state.events.push(record);
        Ok(())
    }
}

/// Seed a store with a small Orange County roofing scenario for the demo CLI
/// and the dev server.
pub fn demo_store() -> InMemoryPermitStore {
    let store = InMemoryPermitStore::new();
    let tenant = "t-demo";

    store.seed_company(CompanyRecord {
        tenant_id: tenant.to_string(),
        name: Some("Sunshine State Roofing LLC".to_string()),
        license_number: Some("CCC1331402".to_string()),
        phone: Some("407-555-0114".to_string()),
        email: Some("permits@sunshineroofing.example".to_string()),
        address: Some("4150 Vineland Rd, Orlando, FL 32811".to_string()),
    });

    store.seed_job(JobRecord {
        id: "job-1001".to_string(),
        tenant_id: tenant.to_string(),
        name: Some("Holland re-roof".to_string()),
        full_address: None,
        street_address: Some("215 Lakeshore Dr".to_string()),
        city: Some("Winter Garden".to_string()),
        state: Some("FL".to_string()),
        zip: Some("34787".to_string()),
        county_name: Some("Orange".to_string()),
        latitude: Some(28.565_4),
        longitude: Some(-81.586_2),
        stories: Some(1),
        contact_id: Some("contact-77".to_string()),
    });

    store.seed_contact(ContactRecord {
        id: "contact-77".to_string(),
        tenant_id: tenant.to_string(),
        first_name: Some("Robert".to_string()),
        last_name: Some("Holland".to_string()),
        phone: Some("321-555-0187".to_string()),
        email: Some("r.holland@example.net".to_string()),
        address_street: Some("215 Lakeshore Dr".to_string()),
        address_city: Some("Winter Garden".to_string()),
        address_state: Some("FL".to_string()),
        address_zip: Some("34787".to_string()),
        mailing_street: None,
        mailing_city: None,
        mailing_state: None,
        mailing_zip: None,
    });

    store.seed_authority(AuthorityRecord {
        id: "auth-orange".to_string(),
        tenant_id: tenant.to_string(),
        name: "Orange County Building Division".to_string(),
        county_name: Some("Orange".to_string()),
        city_name: None,
        jurisdiction_level: Some("county".to_string()),
        portal_url: Some("https://fasttrack.ocfl.net".to_string()),
        phone: Some("407-836-5550".to_string()),
        email: None,
    });

    store.seed_measurement(MeasurementRecord {
        id: "meas-1".to_string(),
        tenant_id: tenant.to_string(),
        job_id: "job-1001".to_string(),
        source: MeasurementSource::Manual,
        total_area_sqft: Some(2300.0),
        predominant_pitch: Some("5/12".to_string()),
        facet_count: Some(9),
        report_url: None,
        measured_at: Utc.with_ymd_and_hms(2026, 8, 20, 15, 0, 0).single().unwrap_or_default(),
    });

    store.seed_measurement(MeasurementRecord {
        id: "meas-2".to_string(),
        tenant_id: tenant.to_string(),
        job_id: "job-1001".to_string(),
        source: MeasurementSource::Roofr,
        total_area_sqft: Some(2412.5),
        predominant_pitch: Some("5/12".to_string()),
        facet_count: Some(11),
        report_url: Some("https://reports.roofr.example/job-1001.pdf".to_string()),
        measured_at: Utc.with_ymd_and_hms(2026, 8, 12, 9, 30, 0).single().unwrap_or_default(),
    });

    store.seed_parcel(ParcelRecord {
        county_name: "Orange".to_string(),
        parcel_id: Some("23-22-27-5849-00-120".to_string()),
        legal_description: Some("LAKESHORE ESTATES LOT 12 BLK A".to_string()),
        owner_name: Some("HOLLAND ROBERT J".to_string()),
        land_use: Some("0100 - Single Family".to_string()),
        year_built: Some(1994),
        street_address: Some("215 Lakeshore Dr".to_string()),
        fetched_at: Utc::now(),
    });

    store.seed_estimate(EstimateRecord {
        id: "est-5005".to_string(),
        tenant_id: tenant.to_string(),
        job_id: "job-1001".to_string(),
        name: Some("Architectural shingle re-roof".to_string()),
        status: Some("approved".to_string()),
        total: Some(18_450.0),
        approved_at: Utc.with_ymd_and_hms(2026, 8, 22, 18, 0, 0).single(),
    });

    store.seed_products(
        tenant,
        ProductSelectionRecord {
            estimate_id: "est-5005".to_string(),
            primary_id: Some("prod-hdz".to_string()),
            primary_name: Some("Timberline HDZ".to_string()),
            manufacturer: Some("GAF".to_string()),
            components: vec![
                ProductComponent {
                    name: "Pro-Start Starter Strip".to_string(),
                    product_kind: Some("starter".to_string()),
                },
                ProductComponent {
                    name: "Seal-A-Ridge".to_string(),
                    product_kind: Some("ridge_cap".to_string()),
                },
            ],
            approvals: vec![ApprovalDocument {
                number: Some("FL10124-R29".to_string()),
                title: Some("GAF Timberline HDZ Florida Product Approval".to_string()),
                url: Some("https://floridabuilding.org/pr/FL10124".to_string()),
            }],
        },
    );

    store.seed_template(TemplateRecord {
        id: "tpl-orange-roof-3".to_string(),
        tenant_id: tenant.to_string(),
        authority_id: Some("auth-orange".to_string()),
        permit_type: "ROOF".to_string(),
        version: 3,
        active: true,
        document: json!({
            "fields": [
                {"key": "owner_name", "label": "Property owner",
                 "source": {"ref": "parcel.owner_name"}, "required": true},
                {"key": "job_address", "label": "Job site address",
                 "source": {"ref": "job.full_address"}, "required": true},
                {"key": "parcel_id", "label": "Parcel ID / folio",
                 "source": {"ref": "parcel.parcel_id"}, "required": true},
                {"key": "legal_description", "label": "Legal description",
                 "source": {"ref": "parcel.legal_description"}},
                {"key": "roof_area_squares", "label": "Roof area (squares)",
                 "calc": {"expr": "measurements.total_area_sqft / 100"}},
                {"key": "contract_total", "label": "Contract value",
                 "source": {"ref": "estimate.total"}, "required": true},
                {"key": "contractor_license", "label": "Contractor license",
                 "source": {"ref": "company.license_number"}, "required": true},
                {"key": "product_approval", "label": "Product approval number",
                 "source": {"ref": "products.primary.approval_number"}},
            ],
            "validations": [
                {"key": "rule.geocode", "message": "Job should be geocoded before submission",
                 "severity": "warning",
                 "when": {"op": "is_empty", "value": {"ref": "job.latitude"}}},
                {"key": "rule.measurement_report",
                 "message": "Attach the aerial measurement report",
                 "severity": "warning",
                 "when": {"op": "is_empty", "value": {"ref": "measurements.report_url"}}},
            ],
        }),
    });

    store
}
