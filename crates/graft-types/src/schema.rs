//! Output-model descriptions.
//!
//! An [`OutputModel`] describes the shape of one artifact item: a
//! structural schema the validator checks items against, a JSON
//! rendering interpolated into the agent's system prompt, and a
//! canonical serialisation that [`compute_schema_hash`] digests to
//! detect schema drift between runs.
//!
//! [`ItemSchema`] is the general-purpose implementation: a flat list of
//! typed fields, enough for record-shaped outputs. Structured domain
//! outputs (seed data) provide their own implementation in the `seed`
//! module.

use serde::{Deserialize, Serialize};
use serde_json::{json, Map, Value};
use sha2::{Digest, Sha256};

/// Structural kind of an output field.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ValueKind {
    /// UTF-8 string.
    String,
    /// Integral number.
    Integer,
    /// Any finite number.
    Number,
    /// Boolean.
    Boolean,
    /// ISO-8601 datetime string.
    Datetime,
    /// String restricted to a declared value set.
    Enum,
    /// JSON array.
    Array,
    /// JSON object.
    Object,
}

impl ValueKind {
    /// Human-readable name used in error messages and schema JSON.
    pub fn type_name(&self) -> &'static str {
        match self {
            ValueKind::String => "string",
            ValueKind::Integer => "integer",
            ValueKind::Number => "number",
            ValueKind::Boolean => "boolean",
            ValueKind::Datetime => "datetime",
            ValueKind::Enum => "enum",
            ValueKind::Array => "array",
            ValueKind::Object => "object",
        }
    }

    fn matches(&self, value: &Value) -> bool {
        match self {
            ValueKind::String | ValueKind::Datetime | ValueKind::Enum => value.is_string(),
            ValueKind::Integer => value.is_i64() || value.is_u64(),
            // Booleans are not numbers even though some languages treat
            // them as a numeric subtype.
            ValueKind::Number => value.is_number(),
            ValueKind::Boolean => value.is_boolean(),
            ValueKind::Array => value.is_array(),
            ValueKind::Object => value.is_object(),
        }
    }
}

/// One field of an [`ItemSchema`].
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct FieldSpec {
    /// Field key in the output object.
    pub key: String,

    /// Structural kind.
    pub kind: ValueKind,

    /// Whether the field must be present and non-null.
    #[serde(default)]
    pub required: bool,

    /// Allowed values for enum fields.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub values: Option<Vec<String>>,
}

impl FieldSpec {
    /// A required field of the given kind.
    pub fn required(key: impl Into<String>, kind: ValueKind) -> Self {
        Self { key: key.into(), kind, required: true, values: None }
    }

    /// An optional field of the given kind.
    pub fn optional(key: impl Into<String>, kind: ValueKind) -> Self {
        Self { key: key.into(), kind, required: false, values: None }
    }
}

/// A schema description for one artifact item.
///
/// Implementations are immutable for the duration of a run; the
/// orchestrator hashes [`canonical`](OutputModel::canonical) to obtain
/// the manifest's `schema_hash`.
pub trait OutputModel: Send + Sync {
    /// Model name, used in prompts and manifests.
    fn name(&self) -> &str;

    /// JSON rendering of the schema, interpolated into system prompts.
    fn schema_json(&self) -> Value;

    /// Validate a single parsed item.
    ///
    /// Returns one `"<dotted path>: <message>"` string per violation;
    /// an empty vector means the item is valid.
    fn validate_item(&self, item: &Value) -> Vec<String>;

    /// Canonical serialisation of the schema (recursively key-sorted
    /// JSON), the input to [`compute_schema_hash`].
    fn canonical(&self) -> String {
        canonical_json(&self.schema_json())
    }
}

/// General-purpose record schema: a named, flat list of typed fields.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ItemSchema {
    /// Model name.
    pub name: String,

    /// Field specifications.
    pub fields: Vec<FieldSpec>,
}

impl ItemSchema {
    /// Create a schema from a name and field list.
    pub fn new(name: impl Into<String>, fields: Vec<FieldSpec>) -> Self {
        Self { name: name.into(), fields }
    }
}

impl OutputModel for ItemSchema {
    fn name(&self) -> &str {
        &self.name
    }

    fn schema_json(&self) -> Value {
        let mut properties = Map::new();
        let mut required = Vec::new();
        for field in &self.fields {
            let mut prop = Map::new();
            prop.insert("type".into(), json!(field.kind.type_name()));
            if let Some(values) = &field.values {
                prop.insert("enum".into(), json!(values));
            }
            properties.insert(field.key.clone(), Value::Object(prop));
            if field.required {
                required.push(field.key.clone());
            }
        }
        json!({
            "title": self.name,
            "type": "object",
            "properties": properties,
            "required": required,
        })
    }

    fn validate_item(&self, item: &Value) -> Vec<String> {
        let mut errors = Vec::new();

        let obj = match item.as_object() {
            Some(obj) => obj,
            None => {
                errors.push(format!("expected an object, got {}", json_type_name(item)));
                return errors;
            }
        };

        for field in &self.fields {
            match obj.get(&field.key) {
                None | Some(Value::Null) => {
                    if field.required {
                        errors.push(format!("{}: field required", field.key));
                    }
                }
                Some(value) => {
                    if !field.kind.matches(value) {
                        errors.push(format!(
                            "{}: expected {}, got {}",
                            field.key,
                            field.kind.type_name(),
                            json_type_name(value)
                        ));
                    } else if field.kind == ValueKind::Enum {
                        if let (Some(values), Some(s)) = (&field.values, value.as_str()) {
                            if !values.iter().any(|v| v == s) {
                                errors.push(format!(
                                    "{}: '{}' is not one of {:?}",
                                    field.key, s, values
                                ));
                            }
                        }
                    }
                }
            }
        }

        errors
    }
}

/// Name of a JSON value's type, for error messages.
pub fn json_type_name(value: &Value) -> &'static str {
    match value {
        Value::Null => "null",
        Value::Bool(_) => "boolean",
        Value::Number(_) => "number",
        Value::String(_) => "string",
        Value::Array(_) => "array",
        Value::Object(_) => "object",
    }
}

/// Serialize a JSON value with recursively sorted object keys.
///
/// Stable across map implementations, so two structurally equal schemas
/// always produce the same string (and therefore the same hash).
pub fn canonical_json(value: &Value) -> String {
    fn canonicalize(value: &Value) -> Value {
        match value {
            Value::Object(map) => {
                let mut entries: Vec<(&String, &Value)> = map.iter().collect();
                entries.sort_by(|a, b| a.0.cmp(b.0));
                let mut sorted = Map::new();
                for (k, v) in entries {
                    sorted.insert(k.clone(), canonicalize(v));
                }
                Value::Object(sorted)
            }
            Value::Array(items) => Value::Array(items.iter().map(canonicalize).collect()),
            other => other.clone(),
        }
    }
    serde_json::to_string(&canonicalize(value)).unwrap_or_default()
}

/// Stable hash of a model's schema description (hex-encoded SHA-256).
pub fn compute_schema_hash(model: &dyn OutputModel) -> String {
    let mut hasher = Sha256::new();
    hasher.update(model.canonical().as_bytes());
    let digest = hasher.finalize();
    let mut out = String::with_capacity(64);
    for byte in digest {
        use std::fmt::Write;
        let _ = write!(out, "{byte:02x}");
    }
    out
}
