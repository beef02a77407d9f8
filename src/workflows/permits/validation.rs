//! Template-driven validation of resolved field values.

use serde_json::Value;

use super::domain::{Finding, Severity};
use super::expression;
use super::template::{PermitTemplate, ResolvedFields, RuleCondition};

/// Emptiness rule shared by declarative rules and required-field checks:
/// `null` and strings that trim to nothing are empty; every other value,
/// including `0` and `false`, is present.
pub fn is_empty_value(value: &Value) -> bool {
    match value {
        Value::Null => true,
        Value::String(text) => text.trim().is_empty(),
        _ => false,
    }
}

/// Apply the template's declarative rules, then the per-field `required`
/// checks, concatenated in that order.
pub fn validate(
    template: &PermitTemplate,
    snapshot: &Value,
    resolved: &ResolvedFields,
) -> Vec<Finding> {
    let mut errors = Vec::new();

    for rule in &template.validations {
        let triggered = match &rule.when {
            RuleCondition::IsEmpty { path } => {
                is_empty_value(&expression::lookup_path(snapshot, path))
            }
        };

        if triggered {
            errors.push(Finding::new(
                rule.key.clone(),
                rule.severity,
                rule.message.clone(),
            ));
        }
    }

    for field in &template.fields {
        if !field.required {
            continue;
        }

        let value = resolved.field_values.get(&field.key);
        let empty = value.map(is_empty_value).unwrap_or(true);
        if empty {
            errors.push(Finding::new(
                format!("required.{}", field.key),
                Severity::Error,
                format!("{} is required", field.display_label()),
            ));
        }
    }

    errors
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::store::TemplateRecord;
    use crate::workflows::permits::template::{self, PermitTemplate};
    use serde_json::json;

    fn parse(document: Value) -> PermitTemplate {
        PermitTemplate::parse(&TemplateRecord {
            id: "tpl-1".to_string(),
            tenant_id: "t-1".to_string(),
            authority_id: None,
            permit_type: "ROOF".to_string(),
            version: 1,
            active: true,
            document,
        })
        .expect("template parses")
    }

    #[test]
    fn is_empty_rule_fires_on_null_and_blank_strings() {
        let template = parse(json!({
            "validations": [
                {"key": "rule.owner", "message": "Owner name is required by the county",
                 "when": {"op": "is_empty", "value": {"ref": "parcel.owner_name"}}},
            ],
        }));

        let snapshot = json!({"parcel": {"owner_name": "  "}});
        let resolved = template::resolve(&template, &snapshot);
        let errors = validate(&template, &snapshot, &resolved);
        assert_eq!(errors.len(), 1);
        assert_eq!(errors[0].key, "rule.owner");
        assert_eq!(errors[0].severity, Severity::Error);
    }

    #[test]
    fn is_empty_rule_stays_quiet_for_present_values() {
        let template = parse(json!({
            "validations": [
                {"key": "rule.owner", "message": "Owner required", "severity": "warning",
                 "when": {"op": "is_empty", "value": {"ref": "parcel.owner_name"}}},
            ],
        }));

        let snapshot = json!({"parcel": {"owner_name": "HOLLAND ROBERT J"}});
        let resolved = template::resolve(&template, &snapshot);
        assert!(validate(&template, &snapshot, &resolved).is_empty());
    }

    #[test]
    fn required_field_resolving_to_empty_string_yields_one_error() {
        let template = parse(json!({
            "fields": [
                {"key": "owner_name", "label": "Owner name",
                 "source": {"ref": "parcel.owner_name"}, "required": true},
            ],
        }));

        let snapshot = json!({"parcel": {"owner_name": ""}});
        let resolved = template::resolve(&template, &snapshot);
        let errors = validate(&template, &snapshot, &resolved);
        assert_eq!(errors.len(), 1);
        assert_eq!(errors[0].key, "required.owner_name");
        assert_eq!(errors[0].severity, Severity::Error);
        assert!(errors[0].message.contains("Owner name"));
    }

    #[test]
    fn required_field_without_any_definition_is_still_enforced() {
        let template = parse(json!({
            "fields": [{"key": "manual_note", "required": true}],
        }));

        let snapshot = json!({});
        let resolved = template::resolve(&template, &snapshot);
        let errors = validate(&template, &snapshot, &resolved);
        assert_eq!(errors.len(), 1);
        assert_eq!(errors[0].key, "required.manual_note");
        assert!(errors[0].message.contains("manual_note"));
    }

    #[test]
    fn zero_and_false_count_as_present() {
        let template = parse(json!({
            "fields": [
                {"key": "stories", "source": {"ref": "job.stories"}, "required": true},
            ],
        }));

        let snapshot = json!({"job": {"stories": 0}});
        let resolved = template::resolve(&template, &snapshot);
        assert!(validate(&template, &snapshot, &resolved).is_empty());
    }
}
