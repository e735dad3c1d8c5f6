//! End-to-end transformer runs with the real tool set and a scripted
//! agent. Tools execute for real against the sandbox: files are
//! written, scripts run, artifacts validated.

use std::path::PathBuf;
use std::sync::{Arc, Mutex};

use serde_json::json;

use graft_core::agent::testing::{ScriptedBlock, ScriptedConnector};
use graft_core::transform::DataTransformer;
use graft_core::validate::SeedDataValidator;
use graft_tools::TransformerToolSet;
use graft_types::{
    EdgeTypeDef, EventCallback, FieldDef, FieldKind, FieldSpec, GraftError, ItemSchema,
    NodeTypeDef, OutputFormat, OutputModel, SeedDataModel, TransformConfig, TransformEvent,
    TransformMode, ValueKind, WorkflowDefinition,
};

fn person_model() -> Arc<dyn OutputModel> {
    Arc::new(ItemSchema::new(
        "Person",
        vec![
            FieldSpec::required("name", ValueKind::String),
            FieldSpec::required("age", ValueKind::Integer),
        ],
    ))
}

fn collector() -> (EventCallback, Arc<Mutex<Vec<TransformEvent>>>) {
    let seen: Arc<Mutex<Vec<TransformEvent>>> = Arc::new(Mutex::new(Vec::new()));
    let sink = seen.clone();
    let cb: EventCallback = Arc::new(move |ev: &TransformEvent| {
        sink.lock().unwrap().push(ev.clone());
    });
    (cb, seen)
}

fn csv_input() -> (tempfile::TempDir, PathBuf) {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("data.csv");
    std::fs::write(&path, "name,age\nAlice,30\nBob,25\n").unwrap();
    (dir, path)
}

#[tokio::test]
async fn direct_mode_csv_to_records() {
    let (_input_dir, input) = csv_input();

    // The scripted agent explores the inputs, writes the artifact, and
    // validates it, exactly as a real run would.
    let connector = ScriptedConnector::single_run(vec![
        ScriptedBlock::tool_use("list_files", json!({"directory": "."})),
        ScriptedBlock::tool_use("read_file", json!({"file_path": "./data.csv"})),
        ScriptedBlock::text("Converting two rows to Person records."),
        ScriptedBlock::tool_use(
            "write_file",
            json!({
                "file_path": "./output.jsonl",
                "content": "{\"name\": \"Alice\", \"age\": 30}\n{\"name\": \"Bob\", \"age\": 25}\n"
            }),
        ),
        ScriptedBlock::tool_use("validate_artifact", json!({"file_path": "./output.jsonl"})),
        ScriptedBlock::TurnComplete,
    ]);

    let keep = tempfile::tempdir().unwrap();
    let work_dir = keep.path().join("run");
    let config = TransformConfig {
        work_dir: Some(work_dir.clone()),
        ..TransformConfig::default()
    };

    let transformer = DataTransformer::new(connector, Arc::new(TransformerToolSet::new()));
    let (cb, seen) = collector();

    let run = transformer
        .transform(
            &[input],
            "Convert rows to Person records",
            person_model(),
            &config,
            Some(cb),
            None,
        )
        .await
        .unwrap();

    // Validation event observed with two items.
    let events = seen.lock().unwrap();
    let validation = events
        .iter()
        .find_map(|e| match e {
            TransformEvent::Validation { valid, item_count, .. } => Some((*valid, *item_count)),
            _ => None,
        })
        .unwrap();
    assert_eq!(validation, (true, 2));

    // Complete event carries the same count.
    match events.last().unwrap() {
        TransformEvent::Complete { item_count, .. } => assert_eq!(*item_count, 2),
        other => panic!("expected complete, got {other:?}"),
    }

    // The artifact exists and every line parses as a Person.
    assert_eq!(run.manifest.item_count, 2);
    let content = std::fs::read_to_string(work_dir.join("output.jsonl")).unwrap();
    let model = person_model();
    for line in content.lines().filter(|l| !l.trim().is_empty()) {
        let value: serde_json::Value = serde_json::from_str(line).unwrap();
        assert!(model.validate_item(&value).is_empty());
    }
}

#[tokio::test]
async fn code_mode_failure_then_retry() {
    let (_input_dir, input) = csv_input();

    // Shell stands in for the interpreter so the test does not need
    // python3. The first script crashes; the agent reads stderr and
    // rewrites it.
    let bad_script = "echo 'boom: unexpected column' >&2\nexit 1\n";
    let good_script =
        "printf '{\"name\": \"Alice\", \"age\": 30}\\n{\"name\": \"Bob\", \"age\": 25}\\n' > output.jsonl\n";

    let connector = ScriptedConnector::single_run(vec![
        ScriptedBlock::tool_use(
            "write_file",
            json!({"file_path": "./transform.py", "content": bad_script}),
        ),
        ScriptedBlock::tool_use("run_transformer", json!({})),
        ScriptedBlock::text("The script failed; fixing the parser."),
        ScriptedBlock::tool_use(
            "write_file",
            json!({"file_path": "./transform.py", "content": good_script}),
        ),
        ScriptedBlock::tool_use("run_transformer", json!({})),
        ScriptedBlock::tool_use("validate_artifact", json!({"file_path": "./output.jsonl"})),
        ScriptedBlock::TurnComplete,
    ]);

    let config = TransformConfig { mode: TransformMode::Code, ..TransformConfig::default() };
    let transformer = DataTransformer::new(
        connector,
        Arc::new(TransformerToolSet::with_interpreter(PathBuf::from("/bin/sh"))),
    );
    let (cb, seen) = collector();

    let run = transformer
        .transform(
            &[input],
            "Convert rows to Person records",
            person_model(),
            &config,
            Some(cb),
            None,
        )
        .await
        .unwrap();

    // Final validation passed.
    assert_eq!(run.manifest.item_count, 2);

    // Tool-call history contains two run_transformer entries, and the
    // first execution surfaced a non-zero exit code to the agent.
    let runner_calls: Vec<_> = run
        .debug
        .tool_calls
        .iter()
        .filter(|c| c.tool == "run_transformer")
        .collect();
    assert_eq!(runner_calls.len(), 2);

    let events = seen.lock().unwrap();
    let first_result = events
        .iter()
        .find_map(|e| match e {
            TransformEvent::ToolResult { tool, result } if tool == "run_transformer" => {
                Some(result.clone())
            }
            _ => None,
        })
        .unwrap();
    assert!(first_result.contains("\"success\":false"));
    assert!(first_result.contains("boom"));
}

#[tokio::test]
async fn sandbox_escape_is_rejected_but_run_continues() {
    let connector = ScriptedConnector::single_run(vec![
        ScriptedBlock::tool_use("read_file", json!({"file_path": "../../etc/passwd"})),
        ScriptedBlock::tool_use(
            "write_file",
            json!({"file_path": "./output.jsonl", "content": "{\"name\": \"A\", \"age\": 1}\n"}),
        ),
        ScriptedBlock::tool_use("validate_artifact", json!({"file_path": "./output.jsonl"})),
        ScriptedBlock::TurnComplete,
    ]);

    let transformer = DataTransformer::new(connector, Arc::new(TransformerToolSet::new()));
    let (cb, seen) = collector();

    let run = transformer
        .transform(
            &[],
            "Convert",
            person_model(),
            &TransformConfig::default(),
            Some(cb),
            None,
        )
        .await
        .unwrap();

    // The escape came back as a tool error payload; the run still
    // succeeded.
    assert_eq!(run.manifest.item_count, 1);
    let events = seen.lock().unwrap();
    let read_result = events
        .iter()
        .find_map(|e| match e {
            TransformEvent::ToolResult { tool, result } if tool == "read_file" => {
                Some(result.clone())
            }
            _ => None,
        })
        .unwrap();
    assert!(read_result.contains("error"));
}

fn seed_definition() -> WorkflowDefinition {
    WorkflowDefinition {
        name: "CRM".into(),
        description: String::new(),
        node_types: vec![NodeTypeDef {
            type_name: "Account".into(),
            display_name: "Account".into(),
            title_field: "name".into(),
            fields: vec![FieldDef {
                key: "name".into(),
                label: "Name".into(),
                kind: FieldKind::String,
                required: true,
                unique: false,
                values: None,
            }],
            states: None,
        }],
        edge_types: vec![EdgeTypeDef {
            type_name: "OWNS".into(),
            display_name: "Owns".into(),
            from_type: "Account".into(),
            to_type: "Account".into(),
        }],
    }
}

#[tokio::test]
async fn typo_in_edge_reference_gets_suggestion() {
    // Seed batch whose edge references a misspelled temp id.
    let artifact = json!({
        "nodes": [
            {"temp_id": "account_1", "node_type": "Account", "title": "Acme",
             "properties": {"name": "Acme"}},
            {"temp_id": "account_2", "node_type": "Account", "title": "Globex",
             "properties": {"name": "Globex"}}
        ],
        "edges": [
            {"edge_type": "OWNS", "from_temp_id": "acount_1", "to_temp_id": "account_2"}
        ]
    })
    .to_string();

    let connector = ScriptedConnector::single_run(vec![
        ScriptedBlock::tool_use(
            "write_file",
            json!({"file_path": "./output.json", "content": artifact}),
        ),
        ScriptedBlock::tool_use("validate_artifact", json!({"file_path": "./output.json"})),
        ScriptedBlock::TurnComplete,
    ]);

    let config = TransformConfig {
        output_format: OutputFormat::Json,
        ..TransformConfig::default()
    };
    let transformer = DataTransformer::new(connector, Arc::new(TransformerToolSet::new()));
    let (cb, seen) = collector();

    let err = transformer
        .transform(
            &[],
            "Seed the workflow",
            Arc::new(SeedDataModel),
            &config,
            Some(cb),
            Some(Arc::new(SeedDataValidator::new(seed_definition()))),
        )
        .await
        .unwrap_err();

    match err {
        GraftError::Domain { errors } => {
            assert!(errors.iter().any(|e| e.contains("Did you mean 'account_1'?")));
        }
        other => panic!("expected Domain error, got {other}"),
    }

    // The agent saw the suggestion in the validation event too.
    let events = seen.lock().unwrap();
    let validation_errors = events
        .iter()
        .find_map(|e| match e {
            TransformEvent::Validation { errors, .. } => Some(errors.clone()),
            _ => None,
        })
        .unwrap();
    assert!(validation_errors.iter().any(|e| e.contains("account_1")));
}

#[tokio::test]
async fn duplicate_temp_id_blocks_persistence() {
    let artifact = json!({
        "nodes": [
            {"temp_id": "n_1", "node_type": "Account", "title": "A",
             "properties": {"name": "A"}},
            {"temp_id": "n_1", "node_type": "Account", "title": "B",
             "properties": {"name": "B"}}
        ],
        "edges": []
    })
    .to_string();

    let connector = ScriptedConnector::single_run(vec![
        ScriptedBlock::tool_use(
            "write_file",
            json!({"file_path": "./output.json", "content": artifact}),
        ),
        ScriptedBlock::tool_use("validate_artifact", json!({"file_path": "./output.json"})),
        ScriptedBlock::TurnComplete,
    ]);

    let config = TransformConfig {
        output_format: OutputFormat::Json,
        ..TransformConfig::default()
    };
    let transformer = DataTransformer::new(connector, Arc::new(TransformerToolSet::new()));

    let err = transformer
        .transform(
            &[],
            "Seed the workflow",
            Arc::new(SeedDataModel),
            &config,
            None,
            Some(Arc::new(SeedDataValidator::new(seed_definition()))),
        )
        .await
        .unwrap_err();

    match err {
        GraftError::Domain { errors } => {
            assert!(errors.iter().any(|e| e.contains("Duplicate temp_id 'n_1'")));
            assert!(errors.iter().any(|e| e.starts_with("nodes[1].temp_id")));
        }
        other => panic!("expected Domain error, got {other}"),
    }
}
