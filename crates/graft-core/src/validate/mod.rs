//! Validation engine.
//!
//! Two layers: structural validation of an artifact file against an
//! output model ([`structural`]), and pluggable domain validation that
//! enforces semantic rules of the business output ([`seed`]). Domain
//! issues flow back to the agent as correction signals during the run
//! and are enforced again at the final gate before persistence.

pub mod distance;
pub mod seed;
pub mod structural;

use serde::{Deserialize, Serialize};
use serde_json::Value;

pub use seed::SeedDataValidator;
pub use structural::{validate_artifact, ValidationResult};

/// Severity of a domain issue. Errors block; warnings are surfaced but
/// do not block.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum IssueSeverity {
    /// Blocking issue.
    Error,
    /// Non-blocking issue.
    Warning,
}

/// A domain-specific validation issue.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CustomIssue {
    /// Dotted path of the offending element, e.g. `nodes[3].temp_id`.
    pub path: String,

    /// Human-readable message.
    pub message: String,

    /// Stable machine-readable code, e.g. `duplicate_temp_id`.
    pub code: String,

    /// Structured context for the issue; arrays inside are bounded.
    #[serde(default)]
    pub context: Value,

    /// Whether this issue blocks.
    pub severity: IssueSeverity,
}

impl CustomIssue {
    /// A blocking issue.
    pub fn error(
        path: impl Into<String>,
        message: impl Into<String>,
        code: impl Into<String>,
        context: Value,
    ) -> Self {
        Self {
            path: path.into(),
            message: message.into(),
            code: code.into(),
            context,
            severity: IssueSeverity::Error,
        }
    }

    /// A non-blocking issue.
    pub fn warning(
        path: impl Into<String>,
        message: impl Into<String>,
        code: impl Into<String>,
        context: Value,
    ) -> Self {
        Self {
            path: path.into(),
            message: message.into(),
            code: code.into(),
            context,
            severity: IssueSeverity::Warning,
        }
    }

    /// `path: message` rendering used in user-visible summaries.
    pub fn summary(&self) -> String {
        format!("{}: {}", self.path, self.message)
    }
}

/// A pluggable post-structural check over one parsed artifact item.
pub trait DomainValidator: Send + Sync {
    /// Validate one item, returning structured issues.
    fn validate(&self, item: &Value) -> Vec<CustomIssue>;
}

/// Combined structural + domain validation outcome.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ValidationReport {
    /// Structural outcome.
    pub structural: ValidationResult,

    /// Blocking domain issues.
    #[serde(default)]
    pub custom_errors: Vec<CustomIssue>,

    /// Non-blocking domain issues.
    #[serde(default)]
    pub warnings: Vec<CustomIssue>,
}

impl ValidationReport {
    /// Whether the artifact passes both layers.
    pub fn is_valid(&self) -> bool {
        self.structural.valid && self.custom_errors.is_empty()
    }

    /// Serialise into the JSON-safe shape returned to the agent.
    ///
    /// Sample truncation keeps the payload within the structural
    /// engine's size budget.
    pub fn to_tool_json(&self) -> Value {
        let mut errors = self.structural.errors.clone();
        errors.extend(self.custom_errors.iter().map(CustomIssue::summary));
        serde_json::json!({
            "valid": self.is_valid(),
            "item_count": self.structural.item_count,
            "errors": errors,
            "sample": self.structural.sample,
            "warnings": self.warnings.iter().map(CustomIssue::summary).collect::<Vec<_>>(),
        })
    }
}

/// Validate an artifact structurally and, when the structural layer
/// passes, run the domain validator over each parsed item.
pub fn validate_artifact_with_custom(
    file_path: &std::path::Path,
    model: &dyn graft_types::OutputModel,
    format: graft_types::OutputFormat,
    domain: Option<&dyn DomainValidator>,
) -> ValidationReport {
    let structural = structural::validate_artifact(file_path, model, format);

    let mut custom_errors = Vec::new();
    let mut warnings = Vec::new();

    if structural.valid {
        if let Some(domain) = domain {
            for item in structural::parse_items(file_path, format).unwrap_or_default() {
                for issue in domain.validate(&item) {
                    match issue.severity {
                        IssueSeverity::Error => custom_errors.push(issue),
                        IssueSeverity::Warning => warnings.push(issue),
                    }
                }
            }
        }
    }

    ValidationReport { structural, custom_errors, warnings }
}

#[cfg(test)]
mod tests {
    use super::*;
    use graft_types::{FieldSpec, ItemSchema, OutputFormat, ValueKind};
    use serde_json::json;

    struct RejectTitled;

    impl DomainValidator for RejectTitled {
        fn validate(&self, item: &Value) -> Vec<CustomIssue> {
            let mut issues = Vec::new();
            if item.get("name").and_then(Value::as_str) == Some("bad") {
                issues.push(CustomIssue::error(
                    "name",
                    "name 'bad' is reserved",
                    "reserved_name",
                    json!({"name": "bad"}),
                ));
            }
            issues.push(CustomIssue::warning("name", "check spelling", "spelling", json!({})));
            issues
        }
    }

    fn write_artifact(content: &str) -> (tempfile::TempDir, std::path::PathBuf) {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("output.jsonl");
        std::fs::write(&path, content).unwrap();
        (dir, path)
    }

    fn model() -> ItemSchema {
        ItemSchema::new("Person", vec![FieldSpec::required("name", ValueKind::String)])
    }

    #[test]
    fn issue_summary_renders_path_and_message() {
        let issue = CustomIssue::error("nodes[1].temp_id", "duplicate", "duplicate_temp_id", json!({}));
        assert_eq!(issue.summary(), "nodes[1].temp_id: duplicate");
    }

    #[test]
    fn domain_errors_block_and_warnings_pass() {
        let (_dir, path) = write_artifact("{\"name\": \"bad\"}\n");
        let report = validate_artifact_with_custom(
            &path,
            &model(),
            OutputFormat::Jsonl,
            Some(&RejectTitled),
        );
        assert!(!report.is_valid());
        assert_eq!(report.custom_errors.len(), 1);
        assert_eq!(report.warnings.len(), 1);
        assert!(report.structural.valid);
    }

    #[test]
    fn domain_skipped_when_structural_fails() {
        let (_dir, path) = write_artifact("{\"nope\": 1}\n");
        let report = validate_artifact_with_custom(
            &path,
            &model(),
            OutputFormat::Jsonl,
            Some(&RejectTitled),
        );
        assert!(!report.is_valid());
        assert!(report.custom_errors.is_empty());
        assert!(report.warnings.is_empty());
    }

    #[test]
    fn tool_json_merges_error_layers() {
        let (_dir, path) = write_artifact("{\"name\": \"bad\"}\n");
        let report = validate_artifact_with_custom(
            &path,
            &model(),
            OutputFormat::Jsonl,
            Some(&RejectTitled),
        );
        let v = report.to_tool_json();
        assert_eq!(v["valid"], false);
        assert_eq!(v["item_count"], 1);
        let errors = v["errors"].as_array().unwrap();
        assert!(errors.iter().any(|e| e.as_str().unwrap().contains("reserved")));
        assert_eq!(v["warnings"].as_array().unwrap().len(), 1);
    }

    #[test]
    fn report_without_domain_is_structural_only() {
        let (_dir, path) = write_artifact("{\"name\": \"ok\"}\n");
        let report =
            validate_artifact_with_custom(&path, &model(), OutputFormat::Jsonl, None);
        assert!(report.is_valid());
        assert!(report.custom_errors.is_empty());
    }
}
