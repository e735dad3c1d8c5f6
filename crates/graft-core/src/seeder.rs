//! Workflow seeding: drive the transformer to produce seed data and
//! insert it into a graph store.
//!
//! Three entry points mirror the caller workflows: [`WorkflowSeeder::seed`]
//! runs transform-then-insert in one go, [`WorkflowSeeder::preview`]
//! stops before insertion and returns the generated script plus counts,
//! and [`WorkflowSeeder::confirm`] inserts a previewed batch (re-running
//! the script when no cached batch is supplied). Domain validation is
//! enforced as a final gate before any insertion.

use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use serde_json::{Map, Value};
use tokio::sync::mpsc;
use tracing::{info, warn};

use graft_types::{
    EventCallback, GraftError, Result, SeedData, SeedDataModel, TransformConfig, TransformEvent,
    TransformMode, WorkflowDefinition,
};

use crate::schema_dsl::workflow_to_dsl;
use crate::transform::orchestrator::DataTransformer;
use crate::validate::seed::SeedDataValidator;
use crate::validate::{CustomIssue, IssueSeverity};

/// Iteration budget for seeding runs; extraction needs more turns than
/// a plain transform.
const SEED_MAX_ITERATIONS: usize = 80;

/// Timeout for a full confirm-phase script re-execution.
const CONFIRM_EXEC_TIMEOUT: Duration = Duration::from_secs(600);

/// Keepalive cadence while the transformer is quiet.
const KEEPALIVE_INTERVAL: Duration = Duration::from_secs(1);

/// Bound on error summaries in user-visible messages.
const ERROR_SUMMARY_LIMIT: usize = 5;

const SEED_INSTRUCTION: &str = "Transform data into seed data for a workflow graph.

## IMPORTANT: User Instructions (READ FIRST)

{instruction}

## Your Task

1. First, check your available skills under .claude/skills/
2. Explore the input sources to understand their structure and content
3. Extract entities that match the node types defined in the workflow schema
4. Create nodes for each entity with appropriate properties
5. Create edges to connect related nodes
6. Output a complete batch with nodes and edges

**Remember to follow the User Instructions above when deciding what data to include.**

## Workflow Schema

{schema_dsl}

## Output Format

Create an object with:
- nodes: list of node objects
- edges: list of edge objects

For each node:
- temp_id: Unique identifier for referencing in edges (e.g., \"author_1\", \"message_23\")
- node_type: Must match a type from the workflow schema
- title: Display title for the node
- status: Optional status value (if the node type has states)
- properties: Field values matching the node type's field definitions

For each edge:
- edge_type: Must match a type from the workflow schema
- from_temp_id: References a node's temp_id
- to_temp_id: References a node's temp_id
- properties: Optional edge properties

## Important Guidelines

- Use consistent temp_id prefixes by node type (e.g., \"author_\", \"message_\", \"link_\")
- Ensure all edge references use valid temp_ids from the nodes list
- Match field keys exactly as defined in the schema
- Include all required fields for each node type
- Create meaningful relationships based on the data structure
";

/// A node to create in the graph store.
#[derive(Debug, Clone)]
pub struct NodeCreate {
    /// Node type name.
    pub node_type: String,
    /// Display title.
    pub title: String,
    /// Optional status.
    pub status: Option<String>,
    /// Property values.
    pub properties: Map<String, Value>,
}

/// An edge to create in the graph store.
#[derive(Debug, Clone)]
pub struct EdgeCreate {
    /// Edge type name.
    pub edge_type: String,
    /// Store-assigned id of the source node.
    pub from_node_id: String,
    /// Store-assigned id of the target node.
    pub to_node_id: String,
    /// Optional edge properties.
    pub properties: Option<Map<String, Value>>,
}

/// Persistent graph storage, implemented outside the core.
#[async_trait]
pub trait GraphStore: Send + Sync {
    /// Create a node, returning its store-assigned id.
    async fn create_node(&self, workflow_id: &str, node: NodeCreate) -> Result<String>;

    /// Create an edge, returning its store-assigned id.
    async fn create_edge(&self, workflow_id: &str, edge: EdgeCreate) -> Result<String>;
}

/// Insert counts from a completed seeding.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SeedSummary {
    /// Nodes created.
    pub nodes_created: usize,
    /// Edges created.
    pub edges_created: usize,
}

/// Preview of a transform run, returned before any insertion.
#[derive(Debug, Clone)]
pub struct SeedPreview {
    /// The generated transformer script, when one was produced.
    pub script_content: String,

    /// The instruction the transform ran with.
    pub instruction: String,

    /// The full generated batch, cached so confirm can skip
    /// re-execution.
    pub seed_data: SeedData,

    /// Up to ten sample nodes (type, title, status).
    pub sample_nodes: Vec<Value>,
}

/// Seeds workflows from uploaded files via the agentic transformer.
pub struct WorkflowSeeder {
    transformer: DataTransformer,
    store: Arc<dyn GraphStore>,
}

impl WorkflowSeeder {
    /// Create a seeder over a transformer and a graph store.
    pub fn new(transformer: DataTransformer, store: Arc<dyn GraphStore>) -> Self {
        Self { transformer, store }
    }

    fn build_instruction(definition: &WorkflowDefinition, instruction: Option<&str>) -> String {
        let user_instruction =
            instruction.unwrap_or("Extract all relevant data from the input files.");
        SEED_INSTRUCTION
            .replace("{instruction}", user_instruction)
            .replace("{schema_dsl}", &workflow_to_dsl(definition))
    }

    fn seed_config(work_dir: Option<PathBuf>) -> TransformConfig {
        TransformConfig {
            mode: TransformMode::Code,
            output_format: graft_types::OutputFormat::Json,
            max_iterations: SEED_MAX_ITERATIONS,
            work_dir,
            ..TransformConfig::default()
        }
    }

    /// Run the transformer with keepalive-paced event forwarding.
    async fn transform_with_keepalive(
        &self,
        input_paths: &[PathBuf],
        instruction: &str,
        config: &TransformConfig,
        definition: &WorkflowDefinition,
        emit: &impl Fn(TransformEvent),
    ) -> Result<graft_types::TransformRun> {
        let (tx, mut rx) = mpsc::unbounded_channel::<TransformEvent>();
        let forward: EventCallback = Arc::new(move |ev: &TransformEvent| {
            let _ = tx.send(ev.clone());
        });

        let domain = Arc::new(SeedDataValidator::new(definition.clone()));

        let fut = self.transformer.transform(
            input_paths,
            instruction,
            Arc::new(SeedDataModel),
            config,
            Some(forward),
            Some(domain),
        );
        tokio::pin!(fut);

        let result = loop {
            tokio::select! {
                result = &mut fut => break result,
                ev = rx.recv() => {
                    if let Some(ev) = ev {
                        emit(ev);
                    }
                }
                _ = tokio::time::sleep(KEEPALIVE_INTERVAL) => {
                    emit(TransformEvent::Keepalive);
                }
            }
        };

        // Drain events emitted after the last poll.
        while let Ok(ev) = rx.try_recv() {
            emit(ev);
        }

        result
    }

    fn extract_seed_data(run: &graft_types::TransformRun) -> Result<SeedData> {
        let item = run
            .items
            .as_ref()
            .and_then(|items| items.first())
            .ok_or_else(|| GraftError::AgentProtocol {
                reason: "transformation did not produce seed data".into(),
            })?;
        serde_json::from_value(item.clone()).map_err(|e| GraftError::AgentProtocol {
            reason: format!("seed data has unexpected shape: {e}"),
        })
    }

    /// Transform inputs and insert the resulting batch.
    pub async fn seed(
        &self,
        workflow_id: &str,
        definition: &WorkflowDefinition,
        input_paths: &[PathBuf],
        instruction: Option<&str>,
        on_event: Option<EventCallback>,
    ) -> Result<SeedSummary> {
        let emit = |event: TransformEvent| {
            if let Some(cb) = &on_event {
                cb(&event);
            }
        };

        emit(TransformEvent::Phase {
            phase: "transforming".into(),
            message: "Analyzing files...".into(),
        });

        let full_instruction = Self::build_instruction(definition, instruction);
        let config = Self::seed_config(None);

        let run = self
            .transform_with_keepalive(input_paths, &full_instruction, &config, definition, &emit)
            .await?;
        let seed_data = Self::extract_seed_data(&run)?;

        self.final_gate_and_insert(workflow_id, definition, &seed_data, &emit).await
    }

    /// Transform inputs and stop before insertion.
    ///
    /// Returns the generated script and a sample so the caller can
    /// confirm (or discard) before anything is persisted.
    pub async fn preview(
        &self,
        workflow_id: &str,
        definition: &WorkflowDefinition,
        input_paths: &[PathBuf],
        instruction: Option<&str>,
        on_event: Option<EventCallback>,
    ) -> Result<SeedPreview> {
        let emit = |event: TransformEvent| {
            if let Some(cb) = &on_event {
                cb(&event);
            }
        };

        if input_paths.is_empty() && instruction.is_none() {
            return Err(GraftError::Config {
                reason: "no input files and no instruction to fetch from external sources".into(),
            });
        }

        emit(TransformEvent::Phase {
            phase: "transforming".into(),
            message: if input_paths.is_empty() {
                "Fetching from external sources...".into()
            } else {
                "Analyzing files...".into()
            },
        });

        // Pin a work directory so the generated script survives the run
        // long enough to be read back.
        let prefix: String = workflow_id.chars().take(8).collect();
        let work = tempfile::Builder::new()
            .prefix(&format!("preview_{prefix}_"))
            .tempdir()
            .map_err(|e| GraftError::Sandbox {
                reason: format!("failed to create preview work directory: {e}"),
            })?;

        let user_instruction = instruction
            .unwrap_or("Extract all relevant data from the input files.")
            .to_string();
        let full_instruction = Self::build_instruction(definition, instruction);
        let config = Self::seed_config(Some(work.path().to_path_buf()));

        let run = self
            .transform_with_keepalive(input_paths, &full_instruction, &config, definition, &emit)
            .await?;
        let seed_data = Self::extract_seed_data(&run)?;

        let script_content = std::fs::read_to_string(work.path().join("transform.py"))
            .unwrap_or_default();

        let sample_nodes = seed_data
            .nodes
            .iter()
            .take(10)
            .map(|n| {
                serde_json::json!({
                    "node_type": n.node_type,
                    "title": n.title,
                    "status": n.status,
                })
            })
            .collect();

        Ok(SeedPreview { script_content, instruction: user_instruction, seed_data, sample_nodes })
    }

    /// Insert a previously previewed batch.
    ///
    /// When `seed_data` is absent the script is re-executed against the
    /// inputs (subject to the confirm-phase timeout) and its output
    /// revalidated before insertion.
    pub async fn confirm(
        &self,
        workflow_id: &str,
        definition: &WorkflowDefinition,
        seed_data: Option<SeedData>,
        script_content: &str,
        input_paths: &[PathBuf],
        on_event: Option<EventCallback>,
    ) -> Result<SeedSummary> {
        let emit = |event: TransformEvent| {
            if let Some(cb) = &on_event {
                cb(&event);
            }
        };

        let seed_data = match seed_data {
            Some(seed_data) => {
                emit(TransformEvent::Phase {
                    phase: "validating".into(),
                    message: "Using cached transformation output...".into(),
                });
                seed_data
            }
            None => {
                self.re_execute_script(definition, script_content, input_paths, &emit).await?
            }
        };

        self.final_gate_and_insert(workflow_id, definition, &seed_data, &emit).await
    }

    async fn re_execute_script(
        &self,
        definition: &WorkflowDefinition,
        script_content: &str,
        input_paths: &[PathBuf],
        emit: &impl Fn(TransformEvent),
    ) -> Result<SeedData> {
        if script_content.trim().is_empty() {
            return Err(GraftError::Config { reason: "no script content provided".into() });
        }
        if input_paths.is_empty() {
            return Err(GraftError::Config {
                reason: "no cached data and no input files, cannot proceed".into(),
            });
        }

        emit(TransformEvent::Phase {
            phase: "executing".into(),
            message: "Re-executing transform script...".into(),
        });

        let work = tempfile::tempdir().map_err(|e| GraftError::Sandbox {
            reason: format!("failed to create confirm work directory: {e}"),
        })?;

        for input in input_paths {
            let name = input.file_name().ok_or_else(|| GraftError::Sandbox {
                reason: format!("input path has no base name: {}", input.display()),
            })?;
            tokio::fs::copy(input, work.path().join(name)).await.map_err(|e| {
                GraftError::Sandbox {
                    reason: format!("failed to copy input {}: {e}", input.display()),
                }
            })?;
        }

        let script_path = work.path().join("transform.py");
        tokio::fs::write(&script_path, script_content).await?;

        let interpreter = which::which("python3").map_err(|e| GraftError::Config {
            reason: format!("python3 not found: {e}"),
        })?;

        let output = tokio::time::timeout(
            CONFIRM_EXEC_TIMEOUT,
            tokio::process::Command::new(interpreter)
                .arg(&script_path)
                .current_dir(work.path())
                .output(),
        )
        .await
        .map_err(|_| GraftError::Timeout { operation: "confirm script execution".into() })?
        .map_err(|e| GraftError::Sandbox { reason: format!("script execution failed: {e}") })?;

        if !output.status.success() {
            let stderr = String::from_utf8_lossy(&output.stderr);
            let tail: String = stderr.chars().take(2000).collect();
            return Err(GraftError::AgentProtocol {
                reason: format!(
                    "script failed with exit code {}: {tail}",
                    output.status.code().unwrap_or(-1)
                ),
            });
        }

        emit(TransformEvent::Phase {
            phase: "validating".into(),
            message: "Validating transformation output...".into(),
        });

        let output_path = work.path().join("output.json");
        if !output_path.exists() {
            return Err(GraftError::AgentProtocol {
                reason: "script did not produce output.json".into(),
            });
        }

        let validator = SeedDataValidator::new(definition.clone());
        let report = crate::validate::validate_artifact_with_custom(
            &output_path,
            &SeedDataModel,
            graft_types::OutputFormat::Json,
            Some(&validator),
        );
        if !report.structural.valid {
            return Err(GraftError::ValidationFailed {
                errors: report.structural.errors.into_iter().take(ERROR_SUMMARY_LIMIT).collect(),
            });
        }
        if !report.custom_errors.is_empty() {
            return Err(GraftError::Domain {
                errors: summarise(&report.custom_errors),
            });
        }

        let content = tokio::fs::read_to_string(&output_path).await?;
        serde_json::from_str(&content).map_err(|e| GraftError::AgentProtocol {
            reason: format!("failed to parse output: {e}"),
        })
    }

    /// Final validation gate, then insertion with progress events.
    async fn final_gate_and_insert(
        &self,
        workflow_id: &str,
        definition: &WorkflowDefinition,
        seed_data: &SeedData,
        emit: &impl Fn(TransformEvent),
    ) -> Result<SeedSummary> {
        let validator = SeedDataValidator::new(definition.clone());
        let issues = validator.validate_seed(seed_data);

        let errors: Vec<&CustomIssue> =
            issues.iter().filter(|i| i.severity == IssueSeverity::Error).collect();
        let warnings: Vec<&CustomIssue> =
            issues.iter().filter(|i| i.severity == IssueSeverity::Warning).collect();

        if !errors.is_empty() {
            let summaries: Vec<String> = errors
                .iter()
                .take(ERROR_SUMMARY_LIMIT)
                .map(|i| i.summary())
                .collect();
            emit(TransformEvent::Error {
                message: format!("Validation failed: {}", summaries.join("; ")),
            });
            return Err(GraftError::Domain { errors: summaries });
        }

        if !warnings.is_empty() {
            emit(TransformEvent::ValidationWarning {
                warnings: warnings
                    .iter()
                    .take(ERROR_SUMMARY_LIMIT)
                    .map(|i| i.summary())
                    .collect(),
            });
        }

        emit(TransformEvent::Phase {
            phase: "inserting".into(),
            message: format!(
                "Inserting {} nodes and {} edges...",
                seed_data.nodes.len(),
                seed_data.edges.len()
            ),
        });

        let summary = self.insert_seed_data(workflow_id, seed_data, emit).await;

        emit(TransformEvent::Phase {
            phase: "complete".into(),
            message: format!(
                "Created {} nodes and {} edges",
                summary.nodes_created, summary.edges_created
            ),
        });
        info!(
            workflow_id,
            nodes = summary.nodes_created,
            edges = summary.edges_created,
            "seeding complete"
        );
        Ok(summary)
    }

    /// Insert nodes then edges, remapping temp-ids to store ids.
    /// Individual failures are logged and skipped so one bad row does
    /// not abort the batch.
    async fn insert_seed_data(
        &self,
        workflow_id: &str,
        seed_data: &SeedData,
        emit: &impl Fn(TransformEvent),
    ) -> SeedSummary {
        let total = seed_data.nodes.len() + seed_data.edges.len();
        let mut temp_to_real: std::collections::HashMap<&str, String> =
            std::collections::HashMap::new();
        let mut nodes_created = 0;
        let mut edges_created = 0;

        for (i, node) in seed_data.nodes.iter().enumerate() {
            let create = NodeCreate {
                node_type: node.node_type.clone(),
                title: node.title.clone(),
                status: node.status.clone(),
                properties: node.properties.clone(),
            };
            match self.store.create_node(workflow_id, create).await {
                Ok(id) => {
                    temp_to_real.insert(&node.temp_id, id);
                    nodes_created += 1;
                }
                Err(e) => warn!(temp_id = %node.temp_id, error = %e, "failed to create node"),
            }

            if (i + 1) % 10 == 0 {
                emit(TransformEvent::Progress {
                    current: i + 1,
                    total,
                    message: format!("Inserted {}/{} nodes", i + 1, seed_data.nodes.len()),
                });
            }
        }

        let edges_start = seed_data.nodes.len();
        for (i, edge) in seed_data.edges.iter().enumerate() {
            let Some(from_id) = temp_to_real.get(edge.from_temp_id.as_str()) else {
                warn!(from_temp_id = %edge.from_temp_id, "edge references unknown from_temp_id");
                continue;
            };
            let Some(to_id) = temp_to_real.get(edge.to_temp_id.as_str()) else {
                warn!(to_temp_id = %edge.to_temp_id, "edge references unknown to_temp_id");
                continue;
            };

            let create = EdgeCreate {
                edge_type: edge.edge_type.clone(),
                from_node_id: from_id.clone(),
                to_node_id: to_id.clone(),
                properties: edge.properties.clone(),
            };
            match self.store.create_edge(workflow_id, create).await {
                Ok(_) => edges_created += 1,
                Err(e) => warn!(
                    edge_type = %edge.edge_type,
                    from = %edge.from_temp_id,
                    to = %edge.to_temp_id,
                    error = %e,
                    "failed to create edge"
                ),
            }

            if (i + 1) % 20 == 0 {
                emit(TransformEvent::Progress {
                    current: edges_start + i + 1,
                    total,
                    message: format!("Inserted {}/{} edges", i + 1, seed_data.edges.len()),
                });
            }
        }

        SeedSummary { nodes_created, edges_created }
    }
}

fn summarise(issues: &[CustomIssue]) -> Vec<String> {
    issues.iter().take(ERROR_SUMMARY_LIMIT).map(CustomIssue::summary).collect()
}
