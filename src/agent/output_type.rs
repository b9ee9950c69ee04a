//! Structured output types

use anyhow::{bail, Context, Result};
use serde_json::{json, Map, Value};

/// Shape an agent's final output must have
pub trait OutputType: Send + Sync {
    fn name(&self) -> &str;

    /// Plain text agents finish on any message without tool calls
    fn is_plain_text(&self) -> bool {
        false
    }

    fn json_schema(&self) -> Value;

    /// Parse and check the model's final message
    fn validate_json(&self, text: &str) -> Result<Value>;
}

fn parse_object(text: &str) -> Result<Map<String, Value>> {
    let value: Value = serde_json::from_str(text.trim()).context("final output is not valid JSON")?;
    match value {
        Value::Object(map) => Ok(map),
        other => bail!("expected a JSON object, got {}", json_type(&other)),
    }
}

fn json_type(value: &Value) -> &'static str {
    match value {
        Value::Null => "null",
        Value::Bool(_) => "boolean",
        Value::Number(n) if n.is_i64() || n.is_u64() => "integer",
        Value::Number(_) => "number",
        Value::String(_) => "string",
        Value::Array(_) => "array",
        Value::Object(_) => "object",
    }
}

fn type_matches(expected: &str, value: &Value) -> bool {
    match expected {
        "number" => value.is_number(),
        other => json_type(value) == other,
    }
}

/// Any JSON object
#[derive(Debug, Clone, Copy, Default)]
pub struct JsonObjectOutputType;

impl OutputType for JsonObjectOutputType {
    fn name(&self) -> &str {
        "json_object"
    }

    fn json_schema(&self) -> Value {
        json!({"type": "object"})
    }

    fn validate_json(&self, text: &str) -> Result<Value> {
        parse_object(text).map(Value::Object)
    }
}

/// Object described by a JSON schema
///
/// Only the top level is checked: required keys must be present and, when
/// strict, declared properties must have the declared type.
#[derive(Debug, Clone)]
pub struct SchemaOutputType {
    name: String,
    schema: Value,
    strict: bool,
}

impl SchemaOutputType {
    pub fn new(name: impl Into<String>, schema: Value) -> Self {
        Self {
            name: name.into(),
            schema,
            strict: true,
        }
    }

    pub fn with_strict(mut self, strict: bool) -> Self {
        self.strict = strict;
        self
    }
}

impl OutputType for SchemaOutputType {
    fn name(&self) -> &str {
        &self.name
    }

    fn json_schema(&self) -> Value {
        self.schema.clone()
    }

    fn validate_json(&self, text: &str) -> Result<Value> {
        let object = parse_object(text)?;

        if let Some(required) = self.schema.get("required").and_then(Value::as_array) {
            for key in required.iter().filter_map(Value::as_str) {
                if !object.contains_key(key) {
                    bail!("{}: missing required field {:?}", self.name, key);
                }
            }
        }

        if self.strict {
            if let Some(properties) = self.schema.get("properties").and_then(Value::as_object) {
                for (key, spec) in properties {
                    let (Some(value), Some(expected)) =
                        (object.get(key), spec.get("type").and_then(Value::as_str))
                    else {
                        continue;
                    };
                    if !type_matches(expected, value) {
                        bail!(
                            "{}: field {:?} should be {}, got {}",
                            self.name,
                            key,
                            expected,
                            json_type(value)
                        );
                    }
                }
            }
        }

        Ok(Value::Object(object))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn ticket_type() -> SchemaOutputType {
        SchemaOutputType::new(
            "ticket",
            json!({
                "type": "object",
                "properties": {
                    "title": {"type": "string"},
                    "priority": {"type": "integer"},
                    "score": {"type": "number"}
                },
                "required": ["title"]
            }),
        )
    }

    #[test]
    fn test_json_object() {
        let output = JsonObjectOutputType;
        assert_eq!(output.validate_json(r#"{"a": 1}"#).unwrap(), json!({"a": 1}));
        assert!(output.validate_json("[1, 2]").is_err());
        assert!(output.validate_json("not json").is_err());
    }

    #[test]
    fn test_schema_required_fields() {
        let err = ticket_type().validate_json(r#"{"priority": 1}"#).unwrap_err();
        assert!(err.to_string().contains("missing required field \"title\""));
    }

    #[test]
    fn test_schema_property_types() {
        let ticket = ticket_type();
        assert!(ticket
            .validate_json(r#"{"title": "Printer", "priority": 2, "score": 3}"#)
            .is_ok());

        let err = ticket.validate_json(r#"{"title": "Printer", "priority": "high"}"#).unwrap_err();
        assert!(err.to_string().contains("should be integer, got string"));

        let lax = ticket_type().with_strict(false);
        assert!(lax.validate_json(r#"{"title": "Printer", "priority": "high"}"#).is_ok());
    }
}
