//! Structural validation of artifact files against an output model.
//!
//! `json` artifacts hold a single object; `jsonl` artifacts hold one
//! object per non-blank line and are validated line by line, collecting
//! at most [`MAX_ERRORS`] errors. Samples returned to the agent are
//! truncated so a validation response never exceeds the tool-result
//! budget.

use std::path::Path;

use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

use graft_types::{OutputFormat, OutputModel};

/// Maximum number of errors collected for a jsonl artifact before the
/// scan stops.
pub const MAX_ERRORS: usize = 10;

/// Number of parsed items included in the sample.
pub const SAMPLE_SIZE: usize = 3;

/// Maximum serialized size of one sample object.
pub const MAX_SAMPLE_JSON_SIZE: usize = 50_000;

/// Maximum string length inside a truncated sample.
const MAX_SAMPLE_STRING: usize = 500;

/// Maximum array length inside a truncated sample.
const MAX_SAMPLE_ARRAY: usize = 3;

/// Result of validating an artifact against an output model.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ValidationResult {
    /// Whether validation passed.
    pub valid: bool,

    /// Number of items that validated.
    pub item_count: usize,

    /// Validation errors, line-prefixed for jsonl artifacts.
    pub errors: Vec<String>,

    /// Sample of successfully parsed items (first few, truncated).
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub sample: Option<Vec<Value>>,
}

impl ValidationResult {
    fn failure(errors: Vec<String>) -> Self {
        Self { valid: false, item_count: 0, errors, sample: None }
    }
}

/// Truncate a sample object so it fits the size budget.
///
/// Arrays longer than three elements are cut down with
/// `_<field>_count` / `_<field>_truncated` sibling markers; long
/// strings are clipped; nested objects recurse with half the budget.
pub fn truncate_sample(data: &Map<String, Value>, max_size: usize) -> Map<String, Value> {
    if let Ok(serialized) = serde_json::to_string(data) {
        if serialized.len() <= max_size {
            return data.clone();
        }
    }

    let mut result = Map::new();
    for (key, value) in data {
        match value {
            Value::Array(items) if items.len() > MAX_SAMPLE_ARRAY => {
                result.insert(key.clone(), Value::Array(items[..MAX_SAMPLE_ARRAY].to_vec()));
                result.insert(format!("_{key}_count"), Value::from(items.len()));
                result.insert(format!("_{key}_truncated"), Value::Bool(true));
            }
            Value::Object(inner) => {
                result.insert(key.clone(), Value::Object(truncate_sample(inner, max_size / 2)));
            }
            Value::String(s) if s.len() > MAX_SAMPLE_STRING => {
                let clipped: String = s.chars().take(MAX_SAMPLE_STRING).collect();
                result.insert(key.clone(), Value::String(format!("{clipped}... (truncated)")));
            }
            other => {
                result.insert(key.clone(), other.clone());
            }
        }
    }
    result
}

fn sample_value(value: &Value, budget: usize) -> Value {
    match value {
        Value::Object(map) => Value::Object(truncate_sample(map, budget)),
        other => other.clone(),
    }
}

/// Validate a `json` artifact: a single object checked against the model.
pub fn validate_json_file(file_path: &Path, model: &dyn OutputModel) -> ValidationResult {
    if !file_path.exists() {
        return ValidationResult::failure(vec![format!("File not found: {}", file_path.display())]);
    }

    let content = match std::fs::read_to_string(file_path) {
        Ok(content) => content,
        Err(e) => return ValidationResult::failure(vec![format!("Failed to read file: {e}")]),
    };

    let data: Value = match serde_json::from_str(&content) {
        Ok(data) => data,
        Err(e) => return ValidationResult::failure(vec![format!("Invalid JSON: {e}")]),
    };

    let errors = model.validate_item(&data);
    if errors.is_empty() {
        ValidationResult {
            valid: true,
            item_count: 1,
            errors: Vec::new(),
            sample: Some(vec![sample_value(&data, MAX_SAMPLE_JSON_SIZE)]),
        }
    } else {
        ValidationResult::failure(errors)
    }
}

/// Validate a `jsonl` artifact line by line.
///
/// Blank lines are skipped. Errors carry a `Line N:` prefix; after
/// [`MAX_ERRORS`] have accumulated a stop marker is appended and the
/// scan ends. `valid` iff zero errors.
pub fn validate_jsonl_file(
    file_path: &Path,
    model: &dyn OutputModel,
    max_errors: usize,
) -> ValidationResult {
    if !file_path.exists() {
        return ValidationResult::failure(vec![format!("File not found: {}", file_path.display())]);
    }

    let content = match std::fs::read_to_string(file_path) {
        Ok(content) => content,
        Err(e) => return ValidationResult::failure(vec![format!("Failed to read file: {e}")]),
    };

    let mut errors: Vec<String> = Vec::new();
    let mut sample: Vec<Value> = Vec::new();
    let mut item_count = 0usize;

    for (idx, line) in content.lines().enumerate() {
        let line_num = idx + 1;
        let line = line.trim();
        if line.is_empty() {
            continue;
        }

        let data: Value = match serde_json::from_str(line) {
            Ok(data) => data,
            Err(e) => {
                errors.push(format!("Line {line_num}: Invalid JSON - {e}"));
                if errors.len() >= max_errors {
                    errors.push(format!("... (stopped after {max_errors} errors)"));
                    break;
                }
                continue;
            }
        };

        let item_errors = model.validate_item(&data);
        if item_errors.is_empty() {
            item_count += 1;
            if sample.len() < SAMPLE_SIZE {
                // The whole sample shares the size budget.
                sample.push(sample_value(&data, MAX_SAMPLE_JSON_SIZE / SAMPLE_SIZE));
            }
        } else {
            for err in item_errors {
                errors.push(format!("Line {line_num}: {err}"));
            }
            if errors.len() >= max_errors {
                errors.push(format!("... (stopped after {max_errors} errors)"));
                break;
            }
        }
    }

    ValidationResult {
        valid: errors.is_empty(),
        item_count,
        errors,
        sample: if sample.is_empty() { None } else { Some(sample) },
    }
}

/// Validate an artifact file against an output model in the given
/// format.
pub fn validate_artifact(
    file_path: &Path,
    model: &dyn OutputModel,
    format: OutputFormat,
) -> ValidationResult {
    match format {
        OutputFormat::Json => validate_json_file(file_path, model),
        OutputFormat::Jsonl => validate_jsonl_file(file_path, model, MAX_ERRORS),
    }
}

/// Parse all items from an artifact file without validating them.
///
/// `json` yields the single object; `jsonl` yields one value per
/// non-blank line.
pub fn parse_items(file_path: &Path, format: OutputFormat) -> std::io::Result<Vec<Value>> {
    let content = std::fs::read_to_string(file_path)?;
    match format {
        OutputFormat::Json => {
            let value = serde_json::from_str(&content)?;
            Ok(vec![value])
        }
        OutputFormat::Jsonl => {
            let mut items = Vec::new();
            for line in content.lines() {
                let line = line.trim();
                if line.is_empty() {
                    continue;
                }
                items.push(serde_json::from_str(line)?);
            }
            Ok(items)
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use graft_types::{FieldSpec, ItemSchema, ValueKind};
    use serde_json::json;

    fn person() -> ItemSchema {
        ItemSchema::new(
            "Person",
            vec![
                FieldSpec::required("name", ValueKind::String),
                FieldSpec::required("age", ValueKind::Integer),
            ],
        )
    }

    fn write(content: &str) -> (tempfile::TempDir, std::path::PathBuf) {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("artifact");
        std::fs::write(&path, content).unwrap();
        (dir, path)
    }

    #[test]
    fn json_valid_object() {
        let (_d, path) = write(r#"{"name": "Alice", "age": 30}"#);
        let result = validate_json_file(&path, &person());
        assert!(result.valid);
        assert_eq!(result.item_count, 1);
        assert_eq!(result.sample.as_ref().unwrap().len(), 1);
    }

    #[test]
    fn json_invalid_reports_paths() {
        let (_d, path) = write(r#"{"name": "Alice", "age": "x"}"#);
        let result = validate_json_file(&path, &person());
        assert!(!result.valid);
        assert_eq!(result.item_count, 0);
        assert_eq!(result.errors, vec!["age: expected integer, got string"]);
        assert!(result.sample.is_none());
    }

    #[test]
    fn json_malformed_is_single_error() {
        let (_d, path) = write("{not json");
        let result = validate_json_file(&path, &person());
        assert!(!result.valid);
        assert_eq!(result.errors.len(), 1);
        assert!(result.errors[0].starts_with("Invalid JSON:"));
    }

    #[test]
    fn missing_file_reported() {
        let result = validate_artifact(
            Path::new("/definitely/missing/output.jsonl"),
            &person(),
            OutputFormat::Jsonl,
        );
        assert!(!result.valid);
        assert!(result.errors[0].starts_with("File not found:"));
    }

    #[test]
    fn jsonl_counts_non_blank_lines_only() {
        let (_d, path) = write("{\"name\": \"A\", \"age\": 1}\n\n   \n{\"name\": \"B\", \"age\": 2}\n");
        let result = validate_jsonl_file(&path, &person(), MAX_ERRORS);
        assert!(result.valid);
        assert_eq!(result.item_count, 2);
    }

    #[test]
    fn jsonl_empty_file_is_valid_with_zero_items() {
        let (_d, path) = write("");
        let result = validate_jsonl_file(&path, &person(), MAX_ERRORS);
        assert!(result.valid);
        assert_eq!(result.item_count, 0);
        assert!(result.sample.is_none());
    }

    #[test]
    fn jsonl_line_numbers_in_errors() {
        let (_d, path) = write("{\"name\": \"A\", \"age\": 1}\nnot json\n{\"name\": \"C\"}\n");
        let result = validate_jsonl_file(&path, &person(), MAX_ERRORS);
        assert!(!result.valid);
        assert_eq!(result.item_count, 1);
        assert!(result.errors[0].starts_with("Line 2: Invalid JSON"));
        assert_eq!(result.errors[1], "Line 3: age: field required");
    }

    #[test]
    fn jsonl_stops_after_max_errors() {
        let lines: Vec<String> = (0..20).map(|_| "bad".to_string()).collect();
        let (_d, path) = write(&lines.join("\n"));
        let result = validate_jsonl_file(&path, &person(), MAX_ERRORS);
        assert!(!result.valid);
        assert_eq!(result.errors.len(), MAX_ERRORS + 1);
        assert_eq!(
            result.errors.last().unwrap(),
            &format!("... (stopped after {MAX_ERRORS} errors)")
        );
    }

    #[test]
    fn jsonl_sample_bounded_to_three() {
        let lines: Vec<String> = (0..10)
            .map(|i| format!("{{\"name\": \"P{i}\", \"age\": {i}}}"))
            .collect();
        let (_d, path) = write(&lines.join("\n"));
        let result = validate_jsonl_file(&path, &person(), MAX_ERRORS);
        assert!(result.valid);
        assert_eq!(result.item_count, 10);
        assert_eq!(result.sample.unwrap().len(), SAMPLE_SIZE);
    }

    #[test]
    fn revalidation_is_idempotent() {
        let (_d, path) = write("{\"name\": \"A\", \"age\": 1}\n{\"name\": \"B\"}\n");
        let first = validate_jsonl_file(&path, &person(), MAX_ERRORS);
        let second = validate_jsonl_file(&path, &person(), MAX_ERRORS);
        assert_eq!(first, second);
    }

    #[test]
    fn sample_truncates_large_arrays_with_markers() {
        let mut obj = Map::new();
        obj.insert("nodes".into(), json!((0..1000).map(|i| json!({"i": i, "pad": "x".repeat(100)})).collect::<Vec<_>>()));
        let truncated = truncate_sample(&obj, 1000);
        assert_eq!(truncated["nodes"].as_array().unwrap().len(), 3);
        assert_eq!(truncated["_nodes_count"], 1000);
        assert_eq!(truncated["_nodes_truncated"], true);
    }

    #[test]
    fn sample_truncates_long_strings() {
        let mut obj = Map::new();
        obj.insert("blob".into(), json!("y".repeat(5000)));
        obj.insert("pad".into(), json!("z".repeat(60_000)));
        let truncated = truncate_sample(&obj, 1000);
        let blob = truncated["blob"].as_str().unwrap();
        assert!(blob.ends_with("... (truncated)"));
        assert!(blob.len() < 600);
    }

    #[test]
    fn sample_small_objects_pass_through() {
        let mut obj = Map::new();
        obj.insert("a".into(), json!([1, 2, 3, 4, 5]));
        let out = truncate_sample(&obj, MAX_SAMPLE_JSON_SIZE);
        // Under budget: untouched even though the array exceeds three
        // elements.
        assert_eq!(out["a"].as_array().unwrap().len(), 5);
        assert!(out.get("_a_truncated").is_none());
    }

    #[test]
    fn parse_items_reads_both_formats() {
        let (_d, path) = write("{\"name\": \"A\", \"age\": 1}\n\n{\"name\": \"B\", \"age\": 2}\n");
        let items = parse_items(&path, OutputFormat::Jsonl).unwrap();
        assert_eq!(items.len(), 2);

        let (_d2, path2) = write(r#"{"nodes": [], "edges": []}"#);
        let items = parse_items(&path2, OutputFormat::Json).unwrap();
        assert_eq!(items.len(), 1);
    }
}
