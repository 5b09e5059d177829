//! Dry-run argument checks against a declared parameter schema.
//!
//! Shape only: presence, known names, primitive types and enum membership.
//! Nothing here looks at what the values mean.

use helmsman_core::tool::{Arguments, ParameterSchema};
use serde::{Deserialize, Serialize};

/// Outcome of a pre-flight check.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ValidationReport {
    pub valid: bool,
    pub errors: Vec<String>,
}

impl ValidationReport {
    pub fn from_errors(errors: Vec<String>) -> Self {
        Self {
            valid: errors.is_empty(),
            errors,
        }
    }
}

fn json_type_name(value: &serde_json::Value) -> &'static str {
    match value {
        serde_json::Value::Null => "null",
        serde_json::Value::Bool(_) => "boolean",
        serde_json::Value::Number(n) if n.is_f64() => "number",
        serde_json::Value::Number(_) => "integer",
        serde_json::Value::String(_) => "string",
        serde_json::Value::Array(_) => "array",
        serde_json::Value::Object(_) => "object",
    }
}

/// Check `arguments` against `schema`, collecting every problem found.
pub fn validate_arguments(schema: &ParameterSchema, arguments: &Arguments) -> ValidationReport {
    let mut errors: Vec<String> = schema
        .missing_required(arguments)
        .into_iter()
        .map(|name| format!("Missing required parameter: {name}"))
        .collect();

    // Sorted for a stable error order
    let mut names: Vec<&String> = arguments.keys().collect();
    names.sort();

    for name in names {
        let value = &arguments[name.as_str()];
        let Some(spec) = schema.properties.get(name.as_str()) else {
            errors.push(format!("Unknown parameter: {name}"));
            continue;
        };
        if value.is_null() {
            continue;
        }
        if !spec.kind.matches(value) {
            errors.push(format!(
                "Parameter '{name}' expected {}, got {}",
                spec.kind.as_str(),
                json_type_name(value)
            ));
            continue;
        }
        if let Some(allowed) = &spec.enum_values {
            if !allowed.contains(value) {
                let rendered: Vec<String> = allowed.iter().map(|v| v.to_string()).collect();
                errors.push(format!(
                    "Parameter '{name}' must be one of [{}], got {value}",
                    rendered.join(", ")
                ));
            }
        }
    }

    ValidationReport::from_errors(errors)
}
