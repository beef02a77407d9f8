//! Jurisdiction template model and field resolution.
//!
//! Templates are authored by non-developers and stored as schema-less JSON
//! documents. They are parsed into a strict tagged model at this boundary:
//! unknown condition operators and malformed `source`/`calc` shapes are
//! rejected as [`TemplateError::Malformed`] instead of being trusted deeper in
//! the pipeline. A malformed document is a distinct failure from an empty
//! field value.

use std::collections::BTreeMap;

use serde::Serialize;
use serde_json::Value;

use super::domain::Severity;
use super::expression::{self, EvalIssue};
use crate::store::TemplateRecord;

#[derive(Debug, thiserror::Error)]
pub enum TemplateError {
    #[error("template document is malformed: {0}")]
    Malformed(String),
}

/// Parsed, trusted template ready for resolution and validation.
#[derive(Debug, Clone)]
pub struct PermitTemplate {
    pub id: String,
    pub version: i64,
    pub fields: Vec<TemplateField>,
    pub validations: Vec<ValidationRule>,
}

#[derive(Debug, Clone)]
pub struct TemplateField {
    pub key: String,
    pub label: Option<String>,
    pub source_ref: Option<String>,
    pub calc_expr: Option<String>,
    pub required: bool,
}

impl TemplateField {
    /// Human-facing name used in required-field messages.
    pub fn display_label(&self) -> &str {
        self.label.as_deref().unwrap_or(&self.key)
    }
}

#[derive(Debug, Clone)]
pub struct ValidationRule {
    pub key: String,
    pub message: String,
    pub severity: Severity,
    pub when: RuleCondition,
}

/// Declarative rule conditions. `is_empty` is the only operator the business
/// has defined; anything else fails the boundary parse.
#[derive(Debug, Clone)]
pub enum RuleCondition {
    IsEmpty { path: String },
}

/// Pick the active template row with the highest version, if any.
pub fn select_active(rows: &[TemplateRecord]) -> Option<&TemplateRecord> {
    rows.iter()
        .filter(|row| row.active)
        .max_by_key(|row| row.version)
}

impl PermitTemplate {
    pub fn parse(record: &TemplateRecord) -> Result<Self, TemplateError> {
        let document = record
            .document
            .as_object()
            .ok_or_else(|| TemplateError::Malformed("document root must be an object".into()))?;

        let mut fields = Vec::new();
        if let Some(raw_fields) = document.get("fields") {
            let entries = raw_fields
                .as_array()
                .ok_or_else(|| TemplateError::Malformed("'fields' must be an array".into()))?;
            for entry in entries {
                fields.push(parse_field(entry)?);
            }
        }

        let mut validations = Vec::new();
        if let Some(raw_rules) = document.get("validations") {
            let entries = raw_rules
                .as_array()
                .ok_or_else(|| TemplateError::Malformed("'validations' must be an array".into()))?;
            for entry in entries {
                if let Some(rule) = parse_rule(entry)? {
                    validations.push(rule);
                }
            }
        }

        Ok(Self {
            id: record.id.clone(),
            version: record.version,
            fields,
            validations,
        })
    }
}

fn parse_field(entry: &Value) -> Result<TemplateField, TemplateError> {
    let object = entry
        .as_object()
        .ok_or_else(|| TemplateError::Malformed("field entry must be an object".into()))?;

    let key = object
        .get("key")
        .and_then(Value::as_str)
        .map(str::trim)
        .filter(|key| !key.is_empty())
        .ok_or_else(|| TemplateError::Malformed("field entry is missing a 'key'".into()))?
        .to_string();

    let label = object
        .get("label")
        .map(|value| {
            value.as_str().map(str::to_string).ok_or_else(|| {
                TemplateError::Malformed(format!("field '{key}' has a non-string label"))
            })
        })
        .transpose()?;

    let source_ref = match object.get("source") {
        None | Some(Value::Null) => None,
        Some(source) => Some(
            source
                .as_object()
                .and_then(|source| source.get("ref"))
                .and_then(Value::as_str)
                .map(str::to_string)
                .ok_or_else(|| {
                    TemplateError::Malformed(format!(
                        "field '{key}' has a source without a string 'ref'"
                    ))
                })?,
        ),
    };

    let calc_expr = match object.get("calc") {
        None | Some(Value::Null) => None,
        Some(calc) => Some(
            calc.as_object()
                .and_then(|calc| calc.get("expr"))
                .and_then(Value::as_str)
                .map(str::to_string)
                .ok_or_else(|| {
                    TemplateError::Malformed(format!(
                        "field '{key}' has an unrecognized calc form; expected {{\"expr\": \"...\"}}"
                    ))
                })?,
        ),
    };

    let required = match object.get("required") {
        None | Some(Value::Null) => false,
        Some(Value::Bool(flag)) => *flag,
        Some(_) => {
            return Err(TemplateError::Malformed(format!(
                "field '{key}' has a non-boolean 'required' flag"
            )))
        }
    };

    Ok(TemplateField {
        key,
        label,
        source_ref,
        calc_expr,
        required,
    })
}

/// Returns `Ok(None)` for rules missing a key or message. The validator skips
/// those rather than failing the whole pass.
fn parse_rule(entry: &Value) -> Result<Option<ValidationRule>, TemplateError> {
    let object = entry
        .as_object()
        .ok_or_else(|| TemplateError::Malformed("validation entry must be an object".into()))?;

    let key = object
        .get("key")
        .and_then(Value::as_str)
        .map(str::trim)
        .filter(|key| !key.is_empty());
    let message = object
        .get("message")
        .and_then(Value::as_str)
        .map(str::trim)
        .filter(|message| !message.is_empty());

    let (key, message) = match (key, message) {
        (Some(key), Some(message)) => (key.to_string(), message.to_string()),
        _ => return Ok(None),
    };

    let severity = match object.get("severity") {
        None | Some(Value::Null) => Severity::Error,
        Some(Value::String(raw)) => match raw.as_str() {
            "error" => Severity::Error,
            "warning" => Severity::Warning,
            "info" => Severity::Info,
            other => {
                return Err(TemplateError::Malformed(format!(
                    "rule '{key}' has unknown severity '{other}'"
                )))
            }
        },
        Some(_) => {
            return Err(TemplateError::Malformed(format!(
                "rule '{key}' has a non-string severity"
            )))
        }
    };

    let when = object
        .get("when")
        .and_then(Value::as_object)
        .ok_or_else(|| TemplateError::Malformed(format!("rule '{key}' is missing 'when'")))?;

    let op = when
        .get("op")
        .and_then(Value::as_str)
        .ok_or_else(|| TemplateError::Malformed(format!("rule '{key}' has no 'when.op'")))?;

    let when = match op {
        "is_empty" => {
            let path = when
                .get("value")
                .and_then(Value::as_object)
                .and_then(|value| value.get("ref"))
                .and_then(Value::as_str)
                .ok_or_else(|| {
                    TemplateError::Malformed(format!(
                        "rule '{key}' is_empty condition needs a 'value.ref' path"
                    ))
                })?;
            RuleCondition::IsEmpty {
                path: path.to_string(),
            }
        }
        other => {
            return Err(TemplateError::Malformed(format!(
                "rule '{key}' uses unknown operator '{other}'"
            )))
        }
    };

    Ok(Some(ValidationRule {
        key,
        message,
        severity,
        when,
    }))
}

/// A calc field whose expression failed, with the evaluator's issues.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct CalcFailure {
    pub field: String,
    pub issues: Vec<EvalIssue>,
}

/// Output of applying a template's field definitions to a context snapshot.
#[derive(Debug, Clone, Default)]
pub struct ResolvedFields {
    pub field_values: BTreeMap<String, Value>,
    pub calc_results: BTreeMap<String, Value>,
    pub calc_errors: Vec<CalcFailure>,
}

/// Two passes over the template fields, in this order: source references
/// first, then calc expressions, which always overwrite the source value for
/// the same key. A failed calc forces the value to `null` and records the
/// issues; resolution never aborts early.
pub fn resolve(template: &PermitTemplate, snapshot: &Value) -> ResolvedFields {
    let mut resolved = ResolvedFields::default();

    for field in &template.fields {
        if let Some(source_ref) = &field.source_ref {
            resolved.field_values.insert(
                field.key.clone(),
                expression::lookup_path(snapshot, source_ref),
            );
        }
    }

    for field in &template.fields {
        let Some(calc_expr) = &field.calc_expr else {
            continue;
        };

        let outcome = expression::evaluate(calc_expr, snapshot);
        if outcome.errors.is_empty() {
            resolved
                .calc_results
                .insert(field.key.clone(), outcome.value.clone());
            resolved.field_values.insert(field.key.clone(), outcome.value);
        } else {
            resolved
                .calc_results
                .insert(field.key.clone(), Value::Null);
            resolved.field_values.insert(field.key.clone(), Value::Null);
            resolved.calc_errors.push(CalcFailure {
                field: field.key.clone(),
                issues: outcome.errors,
            });
        }
    }

    resolved
}
