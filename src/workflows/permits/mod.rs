//! Roofing permit application assembly.
//!
//! One build request walks the whole pipeline: aggregate a canonical context
//! snapshot from tenant records, evaluate the jurisdiction's application
//! template against it, validate the result, diagnose missing items, advance
//! the case status, persist, and hand back documents plus next actions.

pub mod context;
pub mod documents;
pub mod domain;
pub(crate) mod expression;
pub(crate) mod missing;
pub mod router;
pub mod service;
pub(crate) mod template;
pub(crate) mod validation;

#[cfg(test)]
mod tests;

pub use context::{AggregateError, AggregatedContext, ContextAggregator};
pub use documents::{
    DocumentArtifact, DocumentError, DocumentGenerator, DocumentKind, DocumentRequest,
    StubDocumentGenerator,
};
pub use domain::{
    BuildOptions, BuildRequest, CanonicalContext, Finding, PermitCaseStatus, Severity,
};
pub use expression::{EvalIssue, EvalIssueKind, EvalOutcome};
pub use router::permit_router;
pub use template::{CalcFailure, PermitTemplate, ResolvedFields, TemplateError};
pub use service::{
    ContextPreview, NextAction, PermitBuildError, PermitBuildOutcome, PermitBuildService,
    PermitCaseView, PersistedCaseView,
};
