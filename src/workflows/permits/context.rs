//! Canonical context assembly.
//!
//! Gathers every record needed to fill a permit application into one
//! immutable snapshot. Optional sources that are absent still populate their
//! full empty shape so template paths resolve to `null` instead of failing.

use std::cmp::Reverse;
use std::sync::Arc;

use chrono::{Duration, Utc};

use super::domain::{
    AuthoritySection, BuildOptions, CanonicalContext, CaseSection, CompanySection, ContextMeta,
    EstimateSection, Finding, JobSection, MailingAddress, MeasurementSection, OwnerSection,
    ParcelSection, PrimaryProduct, ProductsSection,
};
use super::missing;
use crate::store::{
    AuthorityRecord, ContactRecord, JobRecord, MeasurementRecord, PermitStore, StoreError,
};

/// Aggregation failure: either a required entity is missing or the store
/// itself failed.
#[derive(Debug, thiserror::Error)]
pub enum AggregateError {
    #[error("{entity} not found")]
    NotFound { entity: &'static str },
    #[error(transparent)]
    Store(#[from] StoreError),
}

/// Context plus the domain-completeness findings detected over it.
#[derive(Debug, Clone)]
pub struct AggregatedContext {
    pub context: CanonicalContext,
    pub missing: Vec<Finding>,
}

/// Builds the canonical snapshot for one permit case.
pub struct ContextAggregator<S> {
    store: Arc<S>,
    default_parcel_ttl_days: i64,
}

impl<S: PermitStore> ContextAggregator<S> {
    pub fn new(store: Arc<S>, default_parcel_ttl_days: i64) -> Self {
        Self {
            store,
            default_parcel_ttl_days,
        }
    }

    pub fn build(
        &self,
        tenant_id: &str,
        permit_case_id: &str,
        job_id: &str,
        estimate_id: Option<&str>,
        options: &BuildOptions,
    ) -> Result<AggregatedContext, AggregateError> {
        let mut sources_used = Vec::new();
        let mut warnings = Vec::new();

        let job = self
            .store
            .fetch_job(tenant_id, job_id)?
            .ok_or(AggregateError::NotFound { entity: "job" })?;
        sources_used.push("job".to_string());

        // A fresh copy of the case row: the jurisdiction it carries governs
        // the parcel lookup below.
        let case = self
            .store
            .fetch_case(tenant_id, permit_case_id)?
            .ok_or(AggregateError::NotFound {
                entity: "permit case",
            })?;

        let county_name = case.county_name.clone().or_else(|| job.county_name.clone());
        let city_name = case.city_name.clone().or_else(|| job.city.clone());

        let authority = self.resolve_authority(
            tenant_id,
            case.authority_id.as_deref(),
            county_name.as_deref(),
            city_name.as_deref(),
            options,
        )?;
        let authority_section = match &authority {
            Some(record) => {
                sources_used.push("authority".to_string());
                authority_section(record)
            }
            None => AuthoritySection::empty(),
        };
        sources_used.push("permit_case".to_string());

        let owner_contact = match job.contact_id.as_deref() {
            Some(contact_id) => {
                let contact = self.store.fetch_contact(tenant_id, contact_id)?;
                if contact.is_none() {
                    warnings.push(format!(
                        "contact '{contact_id}' referenced by the job was not found"
                    ));
                }
                contact
            }
            None => None,
        };
        let owner_section = match &owner_contact {
            Some(contact) => {
                sources_used.push("owner_contact".to_string());
                owner_section(contact)
            }
            None => OwnerSection::empty(),
        };

        let measurements = self.store.measurements_for_job(tenant_id, job_id)?;
        let measurement_section = match pick_best_measurement(&measurements) {
            Some(row) => {
                sources_used.push("measurements".to_string());
                measurement_section(row)
            }
            None => MeasurementSection::empty(),
        };

        let parcel_section = self.resolve_parcel(
            tenant_id,
            county_name.clone(),
            job.street_address.as_deref(),
            options,
            &mut sources_used,
            &mut warnings,
        )?;

        let estimate_section = match estimate_id {
            Some(estimate_id) => {
                let estimate = self
                    .store
                    .fetch_estimate(tenant_id, estimate_id)?
                    .ok_or(AggregateError::NotFound { entity: "estimate" })?;
                sources_used.push("estimate".to_string());
                EstimateSection {
                    id: Some(estimate.id),
                    name: estimate.name,
                    status: estimate.status,
                    total: estimate.total,
                    approved_at: estimate.approved_at,
                }
            }
            None => EstimateSection::empty(),
        };

        let products_section = match estimate_section.id.as_deref() {
            Some(estimate_id) => {
                match self.store.products_for_estimate(tenant_id, estimate_id)? {
                    Some(selection) => {
                        sources_used.push("products".to_string());
                        let approval_number = if options.auto_extract_approval_fields {
                            selection
                                .approvals
                                .iter()
                                .find_map(|approval| approval.number.clone())
                        } else {
                            None
                        };
                        ProductsSection {
                            primary: PrimaryProduct {
                                id: selection.primary_id,
                                name: selection.primary_name,
                                manufacturer: selection.manufacturer,
                                approval_number,
                            },
                            components: selection.components,
                            approvals: selection.approvals,
                        }
                    }
                    None => ProductsSection::empty(),
                }
            }
            None => ProductsSection::empty(),
        };

        let company = self
            .store
            .fetch_company(tenant_id)?
            .ok_or(AggregateError::NotFound {
                entity: "company profile",
            })?;
        sources_used.push("company".to_string());

        let context = CanonicalContext {
            meta: ContextMeta {
                tenant_id: tenant_id.to_string(),
                permit_case_id: permit_case_id.to_string(),
                job_id: job_id.to_string(),
                estimate_id: estimate_id.map(str::to_string),
                built_at: Utc::now(),
                sources_used,
                warnings,
            },
            permit_case: CaseSection {
                id: case.id.clone(),
                status: case.status.label().to_string(),
                permit_type: Some(case.permit_type.clone()),
                county_name,
                city_name,
                authority_id: authority.as_ref().map(|record| record.id.clone()),
            },
            authority: authority_section,
            job: job_section(&job),
            owner_contact: owner_section,
            parcel: parcel_section,
            measurements: measurement_section,
            estimate: estimate_section,
            products: products_section,
            company: CompanySection {
                tenant_id: company.tenant_id,
                name: company.name,
                license_number: company.license_number,
                phone: company.phone,
                email: company.email,
                address: company.address,
            },
        };

        let missing = missing::detect(&context);

        Ok(AggregatedContext { context, missing })
    }

    fn resolve_authority(
        &self,
        tenant_id: &str,
        authority_id: Option<&str>,
        county_name: Option<&str>,
        city_name: Option<&str>,
        options: &BuildOptions,
    ) -> Result<Option<AuthorityRecord>, AggregateError> {
        if let Some(authority_id) = authority_id {
            return Ok(self.store.fetch_authority(tenant_id, authority_id)?);
        }

        if options.auto_detect_jurisdiction {
            return Ok(self
                .store
                .find_authority_for(tenant_id, county_name, city_name)?);
        }

        Ok(None)
    }

    fn resolve_parcel(
        &self,
        tenant_id: &str,
        county_name: Option<String>,
        street_address: Option<&str>,
        options: &BuildOptions,
        sources_used: &mut Vec<String>,
        warnings: &mut Vec<String>,
    ) -> Result<ParcelSection, AggregateError> {
        let Some(county) = county_name.clone() else {
            return Ok(ParcelSection::empty());
        };

        if !options.auto_fetch_parcel {
            return Ok(ParcelSection::empty_for_county(Some(county)));
        }

        let Some(parcel) = self.store.fetch_parcel(tenant_id, &county, street_address)? else {
            return Ok(ParcelSection::empty_for_county(Some(county)));
        };

        let ttl_days = options
            .parcel_cache_ttl_days
            .filter(|days| *days > 0)
            .unwrap_or(self.default_parcel_ttl_days);
        if parcel.fetched_at < Utc::now() - Duration::days(ttl_days) {
            warnings.push(format!(
                "parcel cache entry for county '{county}' is older than {ttl_days} days and was ignored"
            ));
            return Ok(ParcelSection::empty_for_county(Some(county)));
        }

        sources_used.push("parcel".to_string());
        Ok(ParcelSection {
            parcel_id: parcel.parcel_id,
            county_name: Some(parcel.county_name),
            legal_description: parcel.legal_description,
            owner_name: parcel.owner_name,
            land_use: parcel.land_use,
            year_built: parcel.year_built,
        })
    }
}

/// Best available roof survey: trusted sources beat recency, recency only
/// breaks ties within a source or ranks unranked sources.
fn pick_best_measurement(rows: &[MeasurementRecord]) -> Option<&MeasurementRecord> {
    rows.iter()
        .filter(|row| row.source.trust_rank().is_some())
        .min_by_key(|row| (row.source.trust_rank(), Reverse(row.measured_at)))
        .or_else(|| rows.iter().max_by_key(|row| row.measured_at))
}

/// Join street/city/"state zip" parts, skipping blanks.
fn compose_address(
    street: Option<&str>,
    city: Option<&str>,
    state: Option<&str>,
    zip: Option<&str>,
) -> Option<String> {
    let clean = |value: Option<&str>| {
        value
            .map(str::trim)
            .filter(|text| !text.is_empty())
            .map(str::to_string)
    };

    let mut parts = Vec::new();
    if let Some(street) = clean(street) {
        parts.push(street);
    }
    if let Some(city) = clean(city) {
        parts.push(city);
    }
    match (clean(state), clean(zip)) {
        (Some(state), Some(zip)) => parts.push(format!("{state} {zip}")),
        (Some(state), None) => parts.push(state),
        (None, Some(zip)) => parts.push(zip),
        (None, None) => {}
    }

    if parts.is_empty() {
        None
    } else {
        Some(parts.join(", "))
    }
}

fn job_section(job: &JobRecord) -> JobSection {
    let full_address = job.full_address.clone().or_else(|| {
        compose_address(
            job.street_address.as_deref(),
            job.city.as_deref(),
            job.state.as_deref(),
            job.zip.as_deref(),
        )
    });

    JobSection {
        id: job.id.clone(),
        name: job.name.clone(),
        full_address,
        street_address: job.street_address.clone(),
        city: job.city.clone(),
        state: job.state.clone(),
        zip: job.zip.clone(),
        county_name: job.county_name.clone(),
        latitude: job.latitude,
        longitude: job.longitude,
        stories: job.stories,
        contact_id: job.contact_id.clone(),
    }
}

fn owner_section(contact: &ContactRecord) -> OwnerSection {
    let full_name = match (contact.first_name.as_deref(), contact.last_name.as_deref()) {
        (Some(first), Some(last)) => Some(format!("{first} {last}")),
        (Some(first), None) => Some(first.to_string()),
        (None, Some(last)) => Some(last.to_string()),
        (None, None) => None,
    };

    // Mailing address falls back to the street address part by part before
    // composing the joined string.
    let street = contact
        .mailing_street
        .clone()
        .or_else(|| contact.address_street.clone());
    let city = contact
        .mailing_city
        .clone()
        .or_else(|| contact.address_city.clone());
    let state = contact
        .mailing_state
        .clone()
        .or_else(|| contact.address_state.clone());
    let zip = contact
        .mailing_zip
        .clone()
        .or_else(|| contact.address_zip.clone());
    let full = compose_address(
        street.as_deref(),
        city.as_deref(),
        state.as_deref(),
        zip.as_deref(),
    );

    OwnerSection {
        contact_id: Some(contact.id.clone()),
        first_name: contact.first_name.clone(),
        last_name: contact.last_name.clone(),
        full_name,
        phone: contact.phone.clone(),
        email: contact.email.clone(),
        mailing_address: MailingAddress {
            street,
            city,
            state,
            zip,
            full,
        },
    }
}

fn measurement_section(row: &MeasurementRecord) -> MeasurementSection {
    MeasurementSection {
        id: Some(row.id.clone()),
        source: Some(row.source.label().to_string()),
        total_area_sqft: row.total_area_sqft,
        predominant_pitch: row.predominant_pitch.clone(),
        facet_count: row.facet_count,
        report_url: row.report_url.clone(),
        measured_at: Some(row.measured_at),
    }
}

fn authority_section(record: &AuthorityRecord) -> AuthoritySection {
    AuthoritySection {
        id: Some(record.id.clone()),
        name: Some(record.name.clone()),
        jurisdiction_level: record.jurisdiction_level.clone(),
        portal_url: record.portal_url.clone(),
        phone: record.phone.clone(),
        email: record.email.clone(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::store::{MeasurementRecord, MeasurementSource};
    use chrono::TimeZone;

    fn row(id: &str, source: MeasurementSource, day: u32) -> MeasurementRecord {
        MeasurementRecord {
            id: id.to_string(),
            tenant_id: "t-1".to_string(),
            job_id: "job-1".to_string(),
            source,
            total_area_sqft: Some(2000.0),
            predominant_pitch: None,
            facet_count: None,
            report_url: None,
            measured_at: Utc
                .with_ymd_and_hms(2026, 8, day, 12, 0, 0)
                .single()
                .unwrap_or_default(),
        }
    }

    #[test]
    fn roofr_beats_newer_manual_and_eagleview_rows() {
        let rows = vec![
            row("manual", MeasurementSource::Manual, 28),
            row("eagleview", MeasurementSource::Eagleview, 27),
            row("roofr", MeasurementSource::Roofr, 1),
        ];
        let best = pick_best_measurement(&rows).expect("a row is selected");
        assert_eq!(best.id, "roofr");
    }

    #[test]
    fn unranked_sources_fall_back_to_recency() {
        let rows = vec![
            row("old", MeasurementSource::Other("DRONE".to_string()), 2),
            row("new", MeasurementSource::Other("DRONE".to_string()), 9),
        ];
        let best = pick_best_measurement(&rows).expect("a row is selected");
        assert_eq!(best.id, "new");
    }

    #[test]
    fn same_source_prefers_the_most_recent_row() {
        let rows = vec![
            row("first", MeasurementSource::Roofr, 3),
            row("second", MeasurementSource::Roofr, 14),
        ];
        let best = pick_best_measurement(&rows).expect("a row is selected");
        assert_eq!(best.id, "second");
    }

    #[test]
    fn compose_address_skips_blank_parts() {
        assert_eq!(
            compose_address(Some("215 Lakeshore Dr"), Some("Winter Garden"), Some("FL"), Some("34787")),
            Some("215 Lakeshore Dr, Winter Garden, FL 34787".to_string())
        );
        assert_eq!(
            compose_address(Some("215 Lakeshore Dr"), None, None, Some("34787")),
            Some("215 Lakeshore Dr, 34787".to_string())
        );
        assert_eq!(compose_address(None, Some("  "), None, None), None);
    }
}
