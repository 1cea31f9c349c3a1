//! # Configuration Schema
//!
//! Providers may describe the shape of their configuration with a
//! [`ConfigSchema`]. Before registration the kernel runs the resolved config
//! through a [`ConfigValidator`]; on success the provider's config is replaced
//! by the validator's output (defaults filled in, strings coerced).

use std::collections::BTreeMap;
use std::fmt;

use indexmap::IndexMap;
use jsonschema::error::ValidationErrorKind;
use jsonschema::ValidationError;
use serde_json::{json, Map, Number, Value};

/// Expected JSON type of a field.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FieldKind {
    /// Any value.
    Any,
    /// A string.
    String,
    /// A boolean. Accepts `"true"`/`"false"` strings.
    Boolean,
    /// An integer. Accepts numeric strings.
    Integer,
    /// Any number. Accepts numeric strings.
    Number,
    /// An array.
    Array,
    /// An object.
    Object,
}

impl FieldKind {
    /// JSON Schema `type` keyword, `None` for [`FieldKind::Any`].
    #[must_use]
    pub fn json_type(self) -> Option<&'static str> {
        match self {
            Self::Any => None,
            Self::String => Some("string"),
            Self::Boolean => Some("boolean"),
            Self::Integer => Some("integer"),
            Self::Number => Some("number"),
            Self::Array => Some("array"),
            Self::Object => Some("object"),
        }
    }
}

impl fmt::Display for FieldKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Self::Any => "value",
            Self::String => "string",
            Self::Boolean => "boolean",
            Self::Integer => "integer",
            Self::Number => "number",
            Self::Array => "array",
            Self::Object => "object",
        };
        f.write_str(name)
    }
}

/// Rule for one configuration field.
#[derive(Debug, Clone, PartialEq)]
pub struct FieldRule {
    /// Expected type.
    pub kind: FieldKind,
    /// Whether the field must be present (after defaults are applied).
    pub required: bool,
    /// Value used when the field is absent.
    pub default: Option<Value>,
}

impl FieldRule {
    /// An optional field of the given kind.
    #[must_use]
    pub fn new(kind: FieldKind) -> Self {
        Self {
            kind,
            required: false,
            default: None,
        }
    }

    /// Make the field mandatory.
    #[must_use]
    pub fn required(mut self) -> Self {
        self.required = true;
        self
    }

    /// Give the field a default.
    #[must_use]
    pub fn default_value(mut self, value: Value) -> Self {
        self.default = Some(value);
        self
    }
}

/// Ordered set of field rules.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct ConfigSchema {
    fields: IndexMap<String, FieldRule>,
}

impl ConfigSchema {
    /// An empty schema.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Add a field.
    #[must_use]
    pub fn field(mut self, name: impl Into<String>, rule: FieldRule) -> Self {
        self.fields.insert(name.into(), rule);
        self
    }

    /// Whether the schema has no fields. Empty schemas are not validated.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.fields.is_empty()
    }

    /// Fields in declaration order.
    pub fn fields(&self) -> impl Iterator<Item = (&str, &FieldRule)> {
        self.fields.iter().map(|(name, rule)| (name.as_str(), rule))
    }

    /// The schema as a JSON Schema document describing an object.
    #[must_use]
    pub fn to_json_schema(&self) -> Value {
        let mut properties = Map::new();
        let mut required = Vec::new();

        for (name, rule) in &self.fields {
            let mut property = Map::new();
            if let Some(kind) = rule.kind.json_type() {
                property.insert("type".into(), Value::String(kind.into()));
            }
            if let Some(default) = &rule.default {
                property.insert("default".into(), default.clone());
            }
            properties.insert(name.clone(), Value::Object(property));
            if rule.required {
                required.push(Value::String(name.clone()));
            }
        }

        json!({
            "type": "object",
            "properties": properties,
            "required": required,
        })
    }
}

/// Outcome of validating a configuration.
#[derive(Debug, Clone, PartialEq)]
pub struct Validation {
    /// Messages per offending field. Empty when the config is valid.
    pub errors: BTreeMap<String, Vec<String>>,
    /// The validated, coerced configuration.
    pub value: Value,
}

impl Validation {
    /// Whether validation produced no errors.
    #[must_use]
    pub fn is_valid(&self) -> bool {
        self.errors.is_empty()
    }

    /// All messages joined into one line.
    #[must_use]
    pub fn describe(&self) -> String {
        self.errors
            .values()
            .flatten()
            .cloned()
            .collect::<Vec<_>>()
            .join(", ")
    }
}

/// Checks configuration against a schema.
pub trait ConfigValidator: Send + Sync {
    /// Validate `data` against `schema`.
    fn validate(&self, data: &Value, schema: &ConfigSchema) -> Validation;
}

/// Default validator. A defaults and coercion pass over the fields the schema
/// names, then the result is checked against [`ConfigSchema::to_json_schema`]
/// with `jsonschema`. Keys not named by the schema are kept as-is.
#[derive(Debug, Clone, Copy, Default)]
pub struct SchemaValidator;

impl ConfigValidator for SchemaValidator {
    fn validate(&self, data: &Value, schema: &ConfigSchema) -> Validation {
        let mut errors: BTreeMap<String, Vec<String>> = BTreeMap::new();

        let mut output = match data {
            Value::Object(values) => values.clone(),
            Value::Null => Map::new(),
            _ => {
                errors.insert(
                    "value".to_string(),
                    vec!["\"value\" must be an object".to_string()],
                );
                return Validation {
                    errors,
                    value: data.clone(),
                };
            }
        };

        for (name, rule) in schema.fields() {
            let present = output.get(name).filter(|value| !value.is_null()).cloned();
            match present.or_else(|| rule.default.clone()) {
                // Values that cannot be coerced are left for the schema check to report
                Some(value) => {
                    let value = coerce(value.clone(), rule.kind).unwrap_or(value);
                    output.insert(name.to_string(), value);
                }
                None => {
                    output.remove(name);
                }
            }
        }

        let value = Value::Object(output);
        let document = schema.to_json_schema();
        match jsonschema::validator_for(&document) {
            Ok(validator) => {
                for error in validator.iter_errors(&value) {
                    let (field, message) = describe_error(schema, &error);
                    errors.entry(field).or_default().push(message);
                }
            }
            Err(e) => {
                errors
                    .entry("schema".to_string())
                    .or_default()
                    .push(format!("invalid schema: {e}"));
            }
        }

        Validation { errors, value }
    }
}

/// Field name and message for one schema violation.
fn describe_error(schema: &ConfigSchema, error: &ValidationError<'_>) -> (String, String) {
    let path = error.instance_path.to_string();
    let field = path.trim_start_matches('/').replace('/', ".");

    match &error.kind {
        ValidationErrorKind::Required { property } => {
            let name = property.as_str().map_or_else(|| property.to_string(), str::to_string);
            let message = format!("\"{name}\" is required");
            (name, message)
        }
        ValidationErrorKind::Type { .. } => match schema.fields.get(&field) {
            Some(rule) => {
                let message = format!("\"{field}\" must be of type {}", rule.kind);
                (field, message)
            }
            None => (field, error.to_string()),
        },
        _ => {
            let field = if field.is_empty() { "value".to_string() } else { field };
            (field, error.to_string())
        }
    }
}

fn coerce(value: Value, kind: FieldKind) -> Option<Value> {
    match (kind, value) {
        (FieldKind::Any, value) => Some(value),
        (FieldKind::String, value @ Value::String(_)) => Some(value),
        (FieldKind::Boolean, value @ Value::Bool(_)) => Some(value),
        (FieldKind::Boolean, Value::String(s)) => match s.trim() {
            "true" => Some(Value::Bool(true)),
            "false" => Some(Value::Bool(false)),
            _ => None,
        },
        (FieldKind::Integer, Value::Number(n)) if n.is_i64() || n.is_u64() => {
            Some(Value::Number(n))
        }
        (FieldKind::Integer, Value::String(s)) => {
            s.trim().parse::<i64>().ok().map(|n| Value::Number(n.into()))
        }
        (FieldKind::Number, value @ Value::Number(_)) => Some(value),
        (FieldKind::Number, Value::String(s)) => s
            .trim()
            .parse::<f64>()
            .ok()
            .and_then(Number::from_f64)
            .map(Value::Number),
        (FieldKind::Array, value @ Value::Array(_)) => Some(value),
        (FieldKind::Object, value @ Value::Object(_)) => Some(value),
        _ => None,
    }
}
