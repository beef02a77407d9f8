//! Outbound document generation seam.
//!
//! Rendering PDF/zip bytes and issuing signed URLs are external concerns; the
//! pipeline only needs "field values in, stored artifact descriptor out".

use std::sync::atomic::{AtomicU64, Ordering};

use serde::Serialize;
use serde_json::Value;

/// Kinds of artifacts a build can produce.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum DocumentKind {
    Application,
    PacketZip,
    Checklist,
}

impl DocumentKind {
    pub const fn label(self) -> &'static str {
        match self {
            DocumentKind::Application => "application",
            DocumentKind::PacketZip => "packet_zip",
            DocumentKind::Checklist => "checklist",
        }
    }

    pub const fn content_type(self) -> &'static str {
        match self {
            DocumentKind::Application | DocumentKind::Checklist => "application/pdf",
            DocumentKind::PacketZip => "application/zip",
        }
    }

    const fn extension(self) -> &'static str {
        match self {
            DocumentKind::Application | DocumentKind::Checklist => "pdf",
            DocumentKind::PacketZip => "zip",
        }
    }
}

/// Descriptor of a generated, uploaded document.
#[derive(Debug, Clone, Serialize)]
pub struct DocumentArtifact {
    pub id: String,
    pub kind: DocumentKind,
    pub title: String,
    pub storage_key: String,
    pub signed_url: String,
    pub content_type: String,
}

/// One generation request. The payload is whatever the renderer needs:
/// field values for an application, a manifest for a packet, findings for a
/// checklist.
#[derive(Debug, Clone)]
pub struct DocumentRequest<'a> {
    pub case_id: &'a str,
    pub kind: DocumentKind,
    pub title: String,
    pub payload: &'a Value,
}

/// Trait describing the render-and-upload collaborator.
pub trait DocumentGenerator: Send + Sync {
    fn generate(&self, request: DocumentRequest<'_>) -> Result<DocumentArtifact, DocumentError>;
}

/// Document generation error.
#[derive(Debug, thiserror::Error)]
pub enum DocumentError {
    #[error("document rendering failed: {0}")]
    Render(String),
    #[error("document upload failed: {0}")]
    Upload(String),
}

/// Deterministic generator for the demo CLI, the dev server, and tests. No
/// bytes are rendered; storage keys and signed URLs are synthesized.
#[derive(Default)]
pub struct StubDocumentGenerator {
    sequence: AtomicU64,
}

impl StubDocumentGenerator {
    pub fn new() -> Self {
        Self::default()
    }
}

impl DocumentGenerator for StubDocumentGenerator {
    fn generate(&self, request: DocumentRequest<'_>) -> Result<DocumentArtifact, DocumentError> {
        let id = self.sequence.fetch_add(1, Ordering::Relaxed) + 1;
        let storage_key = format!(
            "permits/{}/{}.{}",
            request.case_id,
            request.kind.label(),
            request.kind.extension()
        );

        Ok(DocumentArtifact {
            id: format!("doc-{id:06}"),
            kind: request.kind,
            title: request.title,
            storage_key: storage_key.clone(),
            signed_url: format!("https://files.permit-desk.local/{storage_key}?sig=stub"),
            content_type: request.kind.content_type().to_string(),
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn stub_generator_synthesizes_storage_locations() {
        let generator = StubDocumentGenerator::new();
        let payload = json!({"owner_name": "HOLLAND ROBERT J"});
        let artifact = generator
            .generate(DocumentRequest {
                case_id: "case-000001",
                kind: DocumentKind::Application,
                title: "Permit application".to_string(),
                payload: &payload,
            })
            .expect("stub generation succeeds");

        assert_eq!(artifact.storage_key, "permits/case-000001/application.pdf");
        assert_eq!(artifact.content_type, "application/pdf");
        assert!(artifact.signed_url.contains(&artifact.storage_key));
    }
}
