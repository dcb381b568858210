//! Parameter validation against a tool's declared schema.
//!
//! `validate` walks the declared parameters in order and stops at the first
//! problem. Keys the schema does not declare are ignored. The resulting
//! `NormalizedArgs` holds only declared, non-empty values and is turned into
//! a typed `ToolCall` through its accessors.

use chrono::{DateTime, Utc};
use serde::de::DeserializeOwned;
use serde_json::{Map, Value};

use crate::catalog::{CURSOR_MODES, ItemKind, ObjectShape, ParamKind, ParameterSpec, ToolSpec};
use crate::error::ValidationError;
use crate::pagination::{Cursor, CursorMode};
use crate::tools::{DateRange, ToolCall};

/// Arguments that passed schema validation.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct NormalizedArgs {
    values: Map<String, Value>,
}

/// Validates raw arguments and converts them into the tool's typed call.
pub fn validate_call(spec: &ToolSpec, raw: &Map<String, Value>) -> Result<ToolCall, ValidationError> {
    let normalized = validate(spec, raw)?;
    ToolCall::from_args(spec.tool, &normalized)
}

pub fn validate(spec: &ToolSpec, raw: &Map<String, Value>) -> Result<NormalizedArgs, ValidationError> {
    let mut values = Map::new();
    for param in spec.parameters {
        let value = match raw.get(param.name) {
            None | Some(Value::Null) => None,
            Some(value) => Some(value),
        };
        let Some(value) = value else {
            if param.required {
                return Err(ValidationError::missing(param.name));
            }
            continue;
        };
        // Blank optional values are dropped before their type is looked at.
        if !param.required && is_blank(value) {
            continue;
        }
        check_kind(param, value)?;
        if is_blank(value) {
            return Err(ValidationError::missing(param.name));
        }
        values.insert(param.name.to_string(), value.clone());
    }
    Ok(NormalizedArgs { values })
}

fn check_kind(param: &ParameterSpec, value: &Value) -> Result<(), ValidationError> {
    let name = param.name;
    match param.kind {
        ParamKind::String => match value {
            Value::String(_) => Ok(()),
            other => Err(ValidationError::invalid(name, "a string", json_type_name(other))),
        },
        ParamKind::Integer => match value {
            Value::Number(n) if n.as_u64().is_some() => Ok(()),
            other => Err(ValidationError::invalid(
                name,
                "a non-negative integer",
                describe(other),
            )),
        },
        ParamKind::Object(shape) => match value {
            Value::Object(object) => match shape {
                ObjectShape::Cursor => cursor_from(name, object).map(drop),
                ObjectShape::DateRange => date_range_from(name, object).map(drop),
            },
            other => Err(ValidationError::invalid(name, "an object", json_type_name(other))),
        },
        ParamKind::Enum(allowed) => check_enum(name, allowed, value),
        ParamKind::Array(item) => {
            let Value::Array(items) = value else {
                return Err(ValidationError::invalid(
                    name,
                    "an array",
                    json_type_name(value),
                ));
            };
            for (index, element) in items.iter().enumerate() {
                let element_name = format!("{name}[{index}]");
                match item {
                    ItemKind::String => {
                        if !element.is_string() {
                            return Err(ValidationError::invalid(
                                element_name,
                                "a string",
                                json_type_name(element),
                            ));
                        }
                    }
                    ItemKind::Enum(allowed) => check_enum(&element_name, allowed, element)?,
                }
            }
            Ok(())
        }
    }
}

fn check_enum(name: &str, allowed: &[&str], value: &Value) -> Result<(), ValidationError> {
    match value {
        Value::String(raw) if allowed.contains(&raw.as_str()) => Ok(()),
        other => Err(ValidationError::invalid(
            name,
            format!("one of [{}]", allowed.join(", ")),
            describe(other),
        )),
    }
}

fn is_blank(value: &Value) -> bool {
    match value {
        Value::String(s) => s.trim().is_empty(),
        Value::Array(items) => items.is_empty(),
        Value::Object(map) => map.is_empty(),
        _ => false,
    }
}

fn json_type_name(value: &Value) -> String {
    match value {
        Value::Null => "null",
        Value::Bool(_) => "boolean",
        Value::Number(_) => "number",
        Value::String(_) => "string",
        Value::Array(_) => "array",
        Value::Object(_) => "object",
    }
    .to_string()
}

/// Scalars are echoed back so the caller sees the offending value.
fn describe(value: &Value) -> String {
    match value {
        Value::String(_) | Value::Number(_) | Value::Bool(_) => value.to_string(),
        other => json_type_name(other),
    }
}

fn parse_timestamp(raw: &str, field: &str) -> Result<DateTime<Utc>, ValidationError> {
    DateTime::parse_from_rfc3339(raw.trim())
        .map(|ts| ts.with_timezone(&Utc))
        .map_err(|_| {
            ValidationError::invalid(field, "an RFC 3339 timestamp", format!("\"{raw}\""))
        })
}

/// An empty cursor object means the first page.
fn cursor_from(name: &str, object: &Map<String, Value>) -> Result<Option<Cursor>, ValidationError> {
    if object.is_empty() {
        return Ok(None);
    }

    let token_field = format!("{name}.next_cursor");
    let next_cursor = match object.get("next_cursor") {
        Some(Value::String(token)) if !token.trim().is_empty() => token.clone(),
        Some(Value::String(_)) | None | Some(Value::Null) => {
            return Err(ValidationError::missing(token_field));
        }
        Some(other) => {
            return Err(ValidationError::invalid(
                token_field,
                "a string",
                json_type_name(other),
            ));
        }
    };

    let mode_field = format!("{name}.mode");
    let mode = match object.get("mode") {
        None | Some(Value::Null) => return Err(ValidationError::missing(mode_field)),
        Some(value) => {
            check_enum(&mode_field, CURSOR_MODES, value)?;
            enum_value::<CursorMode>(&mode_field, value)?
        }
    };

    Ok(Some(Cursor { next_cursor, mode }))
}

fn date_range_from(name: &str, object: &Map<String, Value>) -> Result<DateRange, ValidationError> {
    let mut range = DateRange::default();
    for (key, slot) in [("after", &mut range.after), ("before", &mut range.before)] {
        let field = format!("{name}.{key}");
        match object.get(key) {
            None | Some(Value::Null) => {}
            Some(Value::String(raw)) => *slot = Some(parse_timestamp(raw, &field)?),
            Some(other) => {
                return Err(ValidationError::invalid(
                    field,
                    "an RFC 3339 timestamp",
                    json_type_name(other),
                ));
            }
        }
    }
    Ok(range)
}

impl NormalizedArgs {
    pub fn required_string(&self, name: &str) -> Result<String, ValidationError> {
        self.optional_string(name)?
            .ok_or_else(|| ValidationError::missing(name))
    }

    pub fn optional_string(&self, name: &str) -> Result<Option<String>, ValidationError> {
        match self.values.get(name) {
            None => Ok(None),
            Some(Value::String(v)) => Ok(Some(v.clone())),
            Some(other) => Err(ValidationError::invalid(name, "a string", json_type_name(other))),
        }
    }

    pub fn strings(&self, name: &str) -> Result<Vec<String>, ValidationError> {
        Ok(self.optional_strings(name)?.unwrap_or_default())
    }

    pub fn optional_strings(&self, name: &str) -> Result<Option<Vec<String>>, ValidationError> {
        let Some(value) = self.values.get(name) else {
            return Ok(None);
        };
        let items = value
            .as_array()
            .ok_or_else(|| ValidationError::invalid(name, "an array", json_type_name(value)))?;
        let mut out = Vec::with_capacity(items.len());
        for (index, item) in items.iter().enumerate() {
            let text = item.as_str().ok_or_else(|| {
                ValidationError::invalid(format!("{name}[{index}]"), "a string", json_type_name(item))
            })?;
            out.push(text.to_string());
        }
        Ok(Some(out))
    }

    pub fn required_enum<T: DeserializeOwned>(&self, name: &str) -> Result<T, ValidationError> {
        self.optional_enum(name)?
            .ok_or_else(|| ValidationError::missing(name))
    }

    pub fn optional_enum<T: DeserializeOwned>(&self, name: &str) -> Result<Option<T>, ValidationError> {
        self.values
            .get(name)
            .map(|value| enum_value(name, value))
            .transpose()
    }

    pub fn enums<T: DeserializeOwned>(&self, name: &str) -> Result<Vec<T>, ValidationError> {
        let Some(value) = self.values.get(name) else {
            return Ok(Vec::new());
        };
        let items = value
            .as_array()
            .ok_or_else(|| ValidationError::invalid(name, "an array", json_type_name(value)))?;
        items
            .iter()
            .enumerate()
            .map(|(index, item)| enum_value(&format!("{name}[{index}]"), item))
            .collect()
    }

    pub fn optional_u64(&self, name: &str) -> Result<Option<u64>, ValidationError> {
        match self.values.get(name) {
            None => Ok(None),
            Some(value) => value.as_u64().map(Some).ok_or_else(|| {
                ValidationError::invalid(name, "a non-negative integer", describe(value))
            }),
        }
    }

    pub fn timestamp(&self, name: &str) -> Result<Option<DateTime<Utc>>, ValidationError> {
        self.optional_string(name)?
            .map(|raw| parse_timestamp(&raw, name))
            .transpose()
    }

    pub fn cursor(&self, name: &str) -> Result<Option<Cursor>, ValidationError> {
        match self.values.get(name) {
            None => Ok(None),
            Some(Value::Object(object)) => cursor_from(name, object),
            Some(other) => Err(ValidationError::invalid(name, "an object", json_type_name(other))),
        }
    }

    pub fn date_range(&self, name: &str) -> Result<Option<DateRange>, ValidationError> {
        match self.values.get(name) {
            None => Ok(None),
            Some(Value::Object(object)) => date_range_from(name, object).map(Some),
            Some(other) => Err(ValidationError::invalid(name, "an object", json_type_name(other))),
        }
    }
}

fn enum_value<T: DeserializeOwned>(name: &str, value: &Value) -> Result<T, ValidationError> {
    serde_json::from_value(value.clone())
        .map_err(|_| ValidationError::invalid(name, "a known enum value", describe(value)))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::catalog::{catalog, lookup};
    use crate::tools::{ListWorksArgs, WorkState, WorkType};
    use serde_json::json;

    fn args(value: Value) -> Map<String, Value> {
        value.as_object().cloned().unwrap()
    }

    fn run(tool: &str, raw: Value) -> Result<ToolCall, ValidationError> {
        validate_call(lookup(tool).unwrap(), &args(raw))
    }

    /// Minimal valid arguments for each tool.
    fn sample_args(tool: &str) -> Value {
        match tool {
            "search" => json!({"query": "login", "namespace": "issue"}),
            "get_work" | "get_part" => json!({"id": "ISS-1"}),
            "create_work" => {
                json!({"type": "issue", "title": "Login timeout", "applies_to_part": "PROD-456"})
            }
            "update_work" => json!({"id": "ISS-1", "type": "issue"}),
            "create_part" => json!({
                "type": "enhancement",
                "name": "Faster login",
                "owned_by": ["DEVU-1"],
                "parent_part": ["PROD-1"]
            }),
            "update_part" => json!({"id": "ENH-1", "type": "enhancement"}),
            "list_parts" => json!({"type": "enhancement"}),
            "valid_stage_transition" => json!({"type": "issue", "id": "ISS-1"}),
            "add_timeline_entry" => json!({"id": "ISS-1", "timeline_entry": "Looking into it"}),
            "get_sprints" => json!({"ancestor_part_id": "PROD-1"}),
            _ => json!({}),
        }
    }

    #[test]
    fn sample_arguments_validate_for_every_tool() {
        for spec in catalog() {
            let raw = args(sample_args(spec.name()));
            let call = validate_call(spec, &raw)
                .unwrap_or_else(|err| panic!("{} rejected sample args: {err}", spec.name()));
            assert_eq!(call.tool(), spec.tool);
        }
    }

    #[test]
    fn omitting_any_required_parameter_fails_with_its_name() {
        for spec in catalog() {
            for param in spec.parameters.iter().filter(|p| p.required) {
                let mut raw = args(sample_args(spec.name()));
                raw.remove(param.name);
                let err = validate_call(spec, &raw).unwrap_err();
                assert_eq!(
                    err,
                    ValidationError::missing(param.name),
                    "{}.{}",
                    spec.name(),
                    param.name
                );
            }
        }
    }

    #[test]
    fn null_and_blank_required_values_count_as_missing() {
        let err = run("get_work", json!({"id": null})).unwrap_err();
        assert_eq!(err, ValidationError::missing("id"));

        let err = run("get_work", json!({"id": "   "})).unwrap_err();
        assert_eq!(err, ValidationError::missing("id"));

        let err = run(
            "create_part",
            json!({"type": "enhancement", "name": "x", "owned_by": [], "parent_part": ["P"]}),
        )
        .unwrap_err();
        assert_eq!(err, ValidationError::missing("owned_by"));
    }

    #[test]
    fn enum_outside_domain_is_invalid_type() {
        let err = run("search", json!({"query": "login", "namespace": "bogus"})).unwrap_err();
        match err {
            ValidationError::InvalidParameterType { name, expected, actual } => {
                assert_eq!(name, "namespace");
                assert!(expected.contains("dev_user"));
                assert_eq!(actual, "\"bogus\"");
            }
            other => panic!("unexpected error: {other:?}"),
        }
    }

    #[test]
    fn array_elements_are_checked_against_item_enum() {
        let err = run("list_works", json!({"type": ["issue", "epic"]})).unwrap_err();
        assert_eq!(
            err.parameter(),
            "type[1]",
            "the offending element is named"
        );

        let err = run("list_works", json!({"owned_by": ["DEVU-1", 7]})).unwrap_err();
        assert!(matches!(err, ValidationError::InvalidParameterType { .. }));
    }

    #[test]
    fn scalar_kinds_require_exact_primitive_type() {
        let err = run("get_work", json!({"id": 42})).unwrap_err();
        assert_eq!(err, ValidationError::invalid("id", "a string", "number"));

        let err = run("list_works", json!({"limit": "10"})).unwrap_err();
        assert_eq!(err.parameter(), "limit");

        let err = run("list_works", json!({"limit": -1})).unwrap_err();
        assert_eq!(err.parameter(), "limit");

        let err = run("list_works", json!({"owned_by": "DEVU-1"})).unwrap_err();
        assert_eq!(err, ValidationError::invalid("owned_by", "an array", "string"));
    }

    #[test]
    fn validation_stops_at_first_declared_failure() {
        // `type` is declared before `title`, so it is reported even though
        // both are wrong.
        let err = run("create_work", json!({"type": "epic", "title": 5})).unwrap_err();
        assert_eq!(err.parameter(), "type");
    }

    #[test]
    fn unknown_keys_are_ignored() {
        let call = run("get_work", json!({"id": "ISS-1", "verbose": true})).unwrap();
        assert_eq!(
            call,
            ToolCall::GetWork(crate::tools::EntityIdArgs { id: "ISS-1".to_string() })
        );
    }

    #[test]
    fn list_works_arguments_become_typed_filters() {
        let call = run(
            "list_works",
            json!({
                "type": ["issue"],
                "state": ["open"],
                "owned_by": [],
                "created_date": {"after": "2025-01-01T00:00:00Z"},
                "cursor": {"next_cursor": "T1", "mode": "after"},
                "limit": 25
            }),
        )
        .unwrap();
        let ToolCall::ListWorks(ListWorksArgs {
            types,
            state,
            owned_by,
            created_date,
            cursor,
            limit,
            ..
        }) = call
        else {
            panic!("expected list_works call");
        };
        assert_eq!(types, vec![WorkType::Issue]);
        assert_eq!(state, vec![WorkState::Open]);
        assert!(owned_by.is_empty());
        assert!(created_date.unwrap().after.is_some());
        assert_eq!(cursor.unwrap().next_cursor, "T1");
        assert_eq!(limit, Some(25));
    }

    #[test]
    fn cursor_shape_is_checked_field_by_field() {
        let err = run("list_works", json!({"cursor": {"mode": "after"}})).unwrap_err();
        assert_eq!(err, ValidationError::missing("cursor.next_cursor"));

        let err = run(
            "list_works",
            json!({"cursor": {"next_cursor": "T1", "mode": "sideways"}}),
        )
        .unwrap_err();
        assert_eq!(err.parameter(), "cursor.mode");

        let call = run("list_works", json!({"cursor": {}})).unwrap();
        assert!(call.cursor().is_none(), "empty cursor means first page");
    }

    #[test]
    fn nested_shape_errors_are_reported_in_declaration_order() {
        // `cursor` is declared before `type`, so its missing token wins.
        let err = run(
            "list_works",
            json!({"cursor": {"mode": "after"}, "type": ["epic"]}),
        )
        .unwrap_err();
        assert_eq!(err, ValidationError::missing("cursor.next_cursor"));

        let err = run(
            "list_works",
            json!({"created_date": {"after": "yesterday"}, "limit": "ten"}),
        )
        .unwrap_err();
        assert_eq!(err.parameter(), "created_date.after");
    }

    #[test]
    fn blank_optional_enum_is_treated_as_absent() {
        let call = run("get_sprints", json!({"ancestor_part_id": "PROD-1", "state": ""})).unwrap();
        let ToolCall::GetSprints(args) = call else {
            panic!("expected get_sprints call");
        };
        assert_eq!(args.state, None);

        let err = run("get_sprints", json!({"ancestor_part_id": "PROD-1", "state": "someday"}))
            .unwrap_err();
        assert_eq!(err.parameter(), "state");
    }

    #[test]
    fn malformed_timestamps_are_rejected_locally() {
        let err = run(
            "update_part",
            json!({"id": "ENH-1", "type": "enhancement", "target_close_date": "next week"}),
        )
        .unwrap_err();
        assert_eq!(err.parameter(), "target_close_date");

        let err = run(
            "list_meetings",
            json!({"scheduled_date": {"before": "2025-13-40"}}),
        )
        .unwrap_err();
        assert_eq!(err.parameter(), "scheduled_date.before");
    }

    #[test]
    fn stage_change_is_exposed_for_guarded_updates() {
        let call = run(
            "update_work",
            json!({"id": "ISS-1", "type": "ticket", "stage": "in_progress"}),
        )
        .unwrap();
        let change = call.requested_stage().unwrap();
        assert_eq!(change.entity_id, "ISS-1");
        assert_eq!(change.requested_stage, "in_progress");

        let call = run("update_work", json!({"id": "ISS-1", "type": "ticket", "stage": ""}))
            .unwrap();
        assert!(call.requested_stage().is_none());
    }
}
