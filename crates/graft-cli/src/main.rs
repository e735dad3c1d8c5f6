//! Command-line utilities for graft.
//!
//! The binary covers the parts of the platform that run without an
//! agent: validating artifacts against a schema, rendering workflow
//! definitions in the compact DSL, and computing schema hashes.

use std::path::PathBuf;
use std::sync::Arc;

use anyhow::{bail, Context, Result};
use clap::{Parser, Subcommand};

use graft_core::schema_dsl::workflow_to_dsl;
use graft_core::validate::{validate_artifact_with_custom, SeedDataValidator};
use graft_types::{
    compute_schema_hash, FieldSpec, ItemSchema, OutputFormat, OutputModel, SeedDataModel,
    ValueKind, WorkflowDefinition,
};

#[derive(Parser)]
#[command(name = "graft", about = "Workflow-graph data tooling", version)]
struct Cli {
    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand)]
enum Command {
    /// Validate an artifact file against an output model.
    Validate {
        /// Artifact file to validate.
        artifact: PathBuf,

        /// Inline model spec, e.g. "name:str,age:int,email:str?".
        /// Mutually exclusive with --seed.
        #[arg(long)]
        model: Option<String>,

        /// Validate as a seed-data batch instead of a record model.
        #[arg(long)]
        seed: bool,

        /// Workflow definition JSON for domain validation (seed mode).
        #[arg(long)]
        workflow: Option<PathBuf>,

        /// Artifact format.
        #[arg(long, default_value = "jsonl")]
        format: String,
    },

    /// Render a workflow definition in the compact DSL.
    Dsl {
        /// Workflow definition JSON file.
        workflow: PathBuf,
    },

    /// Compute the schema hash of an output model.
    Hash {
        /// Inline model spec, e.g. "name:str,age:int".
        #[arg(long)]
        model: Option<String>,

        /// Hash the seed-data model instead.
        #[arg(long)]
        seed: bool,
    },
}

/// Parse an inline model specification into an [`ItemSchema`].
///
/// Format: `field:type,field:type,...` with types `str`, `int`,
/// `float`, `bool`, and `datetime`. Append `?` for optional fields:
/// `email:str?`.
fn parse_model_spec(spec: &str) -> Result<ItemSchema> {
    let mut fields = Vec::new();

    for field_spec in spec.split(',') {
        let field_spec = field_spec.trim();
        if field_spec.is_empty() {
            continue;
        }

        let (name, type_str) = field_spec
            .split_once(':')
            .with_context(|| format!("invalid field spec '{field_spec}': expected 'name:type'"))?;
        let name = name.trim();
        let mut type_str = type_str.trim();

        let optional = type_str.ends_with('?');
        if optional {
            type_str = &type_str[..type_str.len() - 1];
        }

        let kind = match type_str {
            "str" | "string" => ValueKind::String,
            "int" | "integer" => ValueKind::Integer,
            "float" | "number" => ValueKind::Number,
            "bool" | "boolean" => ValueKind::Boolean,
            "datetime" => ValueKind::Datetime,
            other => bail!("unknown type '{other}' for field '{name}'; supported: str, int, float, bool, datetime"),
        };

        fields.push(FieldSpec {
            key: name.to_string(),
            kind,
            required: !optional,
            values: None,
        });
    }

    if fields.is_empty() {
        bail!("model spec is empty");
    }
    Ok(ItemSchema::new("Record", fields))
}

fn parse_format(format: &str) -> Result<OutputFormat> {
    match format {
        "json" => Ok(OutputFormat::Json),
        "jsonl" => Ok(OutputFormat::Jsonl),
        other => bail!("unknown format: {other}. Expected 'json' or 'jsonl'."),
    }
}

fn load_workflow(path: &PathBuf) -> Result<WorkflowDefinition> {
    let content = std::fs::read_to_string(path)
        .with_context(|| format!("failed to read {}", path.display()))?;
    serde_json::from_str(&content)
        .with_context(|| format!("invalid workflow definition in {}", path.display()))
}

fn select_model(model: &Option<String>, seed: bool) -> Result<Arc<dyn OutputModel>> {
    match (model, seed) {
        (Some(_), true) => bail!("--model and --seed are mutually exclusive"),
        (Some(spec), false) => Ok(Arc::new(parse_model_spec(spec)?)),
        (None, true) => Ok(Arc::new(SeedDataModel)),
        (None, false) => bail!("either --model or --seed is required"),
    }
}

fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("warn")),
        )
        .init();

    let cli = Cli::parse();

    match cli.command {
        Command::Validate { artifact, model, seed, workflow, format } => {
            let format = parse_format(&format)?;
            let model = select_model(&model, seed)?;

            let validator = workflow
                .as_ref()
                .map(load_workflow)
                .transpose()?
                .map(SeedDataValidator::new);

            let report = validate_artifact_with_custom(
                &artifact,
                model.as_ref(),
                format,
                validator.as_ref().map(|v| v as &dyn graft_core::DomainValidator),
            );

            println!("{}", serde_json::to_string_pretty(&report.to_tool_json())?);
            if !report.is_valid() {
                std::process::exit(1);
            }
        }

        Command::Dsl { workflow } => {
            let definition = load_workflow(&workflow)?;
            println!("{}", workflow_to_dsl(&definition));
        }

        Command::Hash { model, seed } => {
            let model = select_model(&model, seed)?;
            println!("{}", compute_schema_hash(model.as_ref()));
        }
    }

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_required_and_optional_fields() {
        let schema = parse_model_spec("name:str,age:int,email:str?").unwrap();
        assert_eq!(schema.fields.len(), 3);
        assert!(schema.fields[0].required);
        assert_eq!(schema.fields[1].kind, ValueKind::Integer);
        assert!(!schema.fields[2].required);
    }

    #[test]
    fn parses_all_supported_types() {
        let schema =
            parse_model_spec("a:str,b:int,c:float,d:bool,e:datetime").unwrap();
        let kinds: Vec<ValueKind> = schema.fields.iter().map(|f| f.kind).collect();
        assert_eq!(
            kinds,
            vec![
                ValueKind::String,
                ValueKind::Integer,
                ValueKind::Number,
                ValueKind::Boolean,
                ValueKind::Datetime,
            ]
        );
    }

    #[test]
    fn rejects_unknown_type() {
        let err = parse_model_spec("name:object").unwrap_err();
        assert!(err.to_string().contains("unknown type 'object'"));
    }

    #[test]
    fn rejects_missing_colon() {
        let err = parse_model_spec("justaname").unwrap_err();
        assert!(err.to_string().contains("expected 'name:type'"));
    }

    #[test]
    fn rejects_empty_spec() {
        assert!(parse_model_spec("  ,  ").is_err());
    }

    #[test]
    fn format_parsing() {
        assert_eq!(parse_format("json").unwrap(), OutputFormat::Json);
        assert_eq!(parse_format("jsonl").unwrap(), OutputFormat::Jsonl);
        assert!(parse_format("yaml").is_err());
    }

    #[test]
    fn model_and_seed_are_exclusive() {
        assert!(select_model(&Some("a:str".into()), true).is_err());
        assert!(select_model(&None, false).is_err());
        assert!(select_model(&None, true).is_ok());
    }

    #[test]
    fn validates_artifact_on_disk() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("output.jsonl");
        std::fs::write(&path, "{\"name\": \"Alice\", \"age\": 30}\n").unwrap();

        let model = parse_model_spec("name:str,age:int").unwrap();
        let report = validate_artifact_with_custom(
            &path,
            &model,
            OutputFormat::Jsonl,
            None,
        );
        assert!(report.is_valid());
        assert_eq!(report.structural.item_count, 1);
    }
}
