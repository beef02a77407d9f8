//! Template-independent completeness checks over the canonical context.

use std::collections::HashSet;

use super::domain::{CanonicalContext, Finding};

fn is_blank(value: &Option<String>) -> bool {
    match value {
        Some(text) => text.trim().is_empty(),
        None => true,
    }
}

/// Run the fixed domain checklist. Each entry has a stable dotted key so
/// downstream merges and persisted snapshots stay comparable across rebuilds.
pub fn detect(context: &CanonicalContext) -> Vec<Finding> {
    let mut findings = Vec::new();

    if is_blank(&context.job.full_address) {
        findings.push(Finding::error(
            "missing.job_address",
            "the job has no usable street address",
        ));
    }

    if context.job.latitude.is_none() || context.job.longitude.is_none() {
        findings.push(Finding::warning(
            "missing.job_geocode",
            "the job address has not been geocoded",
        ));
    }

    // Owner name falls back from the parcel record to the contact before it
    // counts as missing.
    if is_blank(&context.parcel.owner_name) && is_blank(&context.owner_contact.full_name) {
        findings.push(Finding::error(
            "missing.owner_name",
            "no property owner name is known from the parcel record or the job contact",
        ));
    }

    if is_blank(&context.parcel.legal_description) {
        findings.push(Finding::warning(
            "missing.legal_description",
            "no legal description on file for the parcel",
        ));
    }

    if is_blank(&context.parcel.parcel_id) {
        findings.push(Finding::warning(
            "missing.parcel_id",
            "no parcel identifier/folio on file",
        ));
    }

    if context.measurements.total_area_sqft.is_none() {
        findings.push(Finding::error(
            "missing.roof_area",
            "no total roof area measurement is available",
        ));
    }

    if is_blank(&context.measurements.report_url) {
        findings.push(Finding::warning(
            "missing.measurement_report",
            "no roof measurement report is attached",
        ));
    }

    if is_blank(&context.estimate.id) {
        findings.push(Finding::warning(
            "missing.estimate",
            "no estimate is selected for this permit case",
        ));
    }

    if is_blank(&context.products.primary.id) {
        findings.push(Finding::error(
            "missing.primary_product",
            "no primary roofing product is mapped to the estimate",
        ));
    }

    findings
}

/// Concatenate two finding lists, deduplicating by key. The first occurrence
/// wins: items from `a` take precedence over `b` on key collisions, and the
/// relative order of survivors is preserved.
pub fn merge(a: Vec<Finding>, b: Vec<Finding>) -> Vec<Finding> {
    let mut seen = HashSet::new();
    let mut merged = Vec::with_capacity(a.len() + b.len());

    for finding in a.into_iter().chain(b) {
        if seen.insert(finding.key.clone()) {
            merged.push(finding);
        }
    }

    merged
}
