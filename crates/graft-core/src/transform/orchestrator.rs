//! The transformer orchestrator.
//!
//! Runs one end-to-end transformation: materialise the sandbox, drive
//! the agent through a bounded tool loop, validate the produced
//! artifact, and build a manifest on success. Every step is surfaced
//! as an ordered event stream through the caller's callback, which is
//! invoked synchronously from this task and never concurrently for a
//! single run.

use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Instant;

use serde_json::Value;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

use graft_types::{
    compute_schema_hash, EventCallback, GraftError, LearnedSkill, OutputModel, Result, RunDebug,
    ToolCallRecord, TransformConfig, TransformEvent, TransformManifest, TransformMode,
    TransformRun,
};

use crate::agent::client::{AgentConnector, AgentOptions, PermissionMode};
use crate::agent::driver::{drive, DriverSignal};
use crate::sandbox::{provision, ToolContext};
use crate::tools::registry::ToolSetBuilder;
use crate::transform::kernel::RlmKernel;
use crate::transform::learning::{compose_memo, SkillStore};
use crate::transform::prompts::build_system_prompt;
use crate::validate::{structural, validate_artifact_with_custom, CustomIssue, DomainValidator};

/// Items parsed into memory only when the artifact holds at most this
/// many.
const PARSE_ITEMS_LIMIT: usize = 100;

/// Display truncation for tool results in events.
const EVENT_RESULT_CHARS: usize = 500;

/// Bound on error lists carried in fatal results.
const ERROR_LIST_LIMIT: usize = 5;

struct SkillBinding {
    store: Arc<SkillStore>,
    slug: String,
}

/// Orchestrates an agent to transform data into validated artifacts.
pub struct DataTransformer {
    connector: Arc<dyn AgentConnector>,
    tools: Arc<dyn ToolSetBuilder>,
    skills: Option<SkillBinding>,
    cancel: Option<CancellationToken>,
}

impl DataTransformer {
    /// Create a transformer from an agent connector and a tool-set
    /// builder.
    pub fn new(connector: Arc<dyn AgentConnector>, tools: Arc<dyn ToolSetBuilder>) -> Self {
        Self { connector, tools, skills: None, cancel: None }
    }

    /// Bind a skill store and slug for learning and injection.
    pub fn with_skills(mut self, store: Arc<SkillStore>, slug: impl Into<String>) -> Self {
        self.skills = Some(SkillBinding { store, slug: slug.into() });
        self
    }

    /// Attach a [`CancellationToken`]; cancelling it aborts the agent
    /// loop between blocks and releases the sandbox.
    pub fn with_cancel(mut self, token: CancellationToken) -> Self {
        self.cancel = Some(token);
        self
    }

    /// Transform input files into a validated artifact.
    ///
    /// Fatal outcomes additionally surface as an `error` event before
    /// the call returns.
    pub async fn transform(
        &self,
        input_paths: &[PathBuf],
        instruction: &str,
        output_model: Arc<dyn OutputModel>,
        config: &TransformConfig,
        on_event: Option<EventCallback>,
        domain: Option<Arc<dyn DomainValidator>>,
    ) -> Result<TransformRun> {
        if config.max_iterations == 0 {
            return Err(GraftError::Config { reason: "max_iterations must be at least 1".into() });
        }

        let run_id: String = uuid::Uuid::new_v4().simple().to_string()[..8].to_string();
        let start = Instant::now();

        let emit = |event: TransformEvent| {
            if let Some(cb) = &on_event {
                cb(&event);
            }
        };

        let guard = provision(config.work_dir.as_deref(), "transform_", input_paths).await?;

        let result = self
            .run_agent(
                guard.path(),
                instruction,
                output_model,
                config,
                &run_id,
                &emit,
                domain,
            )
            .await;

        match result {
            Ok(mut run) => {
                run.debug.elapsed_seconds =
                    (start.elapsed().as_secs_f64() * 100.0).round() / 100.0;
                info!(run_id, items = run.manifest.item_count, "transform complete");
                Ok(run)
            }
            Err(err) => {
                if err.is_fatal() {
                    emit(TransformEvent::Error { message: err.to_string() });
                }
                Err(err)
            }
        }
    }

    #[allow(clippy::too_many_arguments)]
    async fn run_agent(
        &self,
        work_dir: &Path,
        instruction: &str,
        output_model: Arc<dyn OutputModel>,
        config: &TransformConfig,
        run_id: &str,
        emit: &impl Fn(TransformEvent),
        domain: Option<Arc<dyn DomainValidator>>,
    ) -> Result<TransformRun> {
        let output_file = format!("./{}", config.output_format.artifact_name());
        let schema_json = serde_json::to_string_pretty(&output_model.schema_json())?;
        let schema_hash = compute_schema_hash(output_model.as_ref());
        let system_prompt =
            build_system_prompt(config.mode == TransformMode::Code, &output_file, &schema_json);

        if let Some(binding) = &self.skills {
            binding
                .store
                .inject(&binding.slug, work_dir, config.mode, &schema_hash)
                .await?;
        }

        let kernel = if config.enable_rlm {
            Some(Arc::new(RlmKernel::new(work_dir.to_path_buf())?))
        } else {
            None
        };

        let mut ctx = ToolContext::for_run(
            work_dir.to_path_buf(),
            output_model.clone(),
            config.output_format,
            config.mode,
        );
        if let Some(domain) = &domain {
            ctx = ctx.with_domain(domain.clone());
        }
        if let Some(kernel) = &kernel {
            ctx = ctx.with_kernel(kernel.clone());
        }

        let registry = self.tools.build(&ctx);
        let allowed = registry.list();

        let options = AgentOptions {
            system_prompt,
            cwd: work_dir.to_path_buf(),
            max_turns: config.max_iterations,
            allowed_tools: allowed.clone(),
            tool_descriptors: registry.descriptors(),
            permission_mode: PermissionMode::AcceptEdits,
        };

        let mut client = self.connector.open(options).await?;

        emit(TransformEvent::IterationStart { iteration: 1, max: config.max_iterations });

        let mut debug = RunDebug::default();
        debug.info.insert("mode".into(), mode_name(config.mode).into());
        debug.info.insert("output_format".into(), config.output_format.to_string());

        let mut validation_result: Option<Value> = None;
        let mut last_text: Option<String> = None;

        let drive_result = {
            let query_result = client.query(instruction).await;
            match query_result {
                Ok(()) => {
                    drive(
                        client.as_mut(),
                        &registry,
                        &allowed,
                        config.max_iterations,
                        self.cancel.as_ref(),
                        |signal| match signal {
                            DriverSignal::Text(text) => {
                                emit(TransformEvent::Text { text: text.to_string() });
                                last_text = Some(text.to_string());
                            }
                            DriverSignal::PreTool { call_number, name, input } => {
                                emit(TransformEvent::ToolCall {
                                    tool: name.to_string(),
                                    input: input.clone(),
                                });
                                debug.tool_calls.push(ToolCallRecord {
                                    call_number,
                                    tool: name.to_string(),
                                    input: input.clone(),
                                });
                            }
                            DriverSignal::PostTool { name, result } => {
                                emit(TransformEvent::ToolResult {
                                    tool: name.to_string(),
                                    result: clip_result(result),
                                });
                                if name == "validate_artifact" && result.get("valid").is_some() {
                                    validation_result = Some(result.clone());
                                    emit(TransformEvent::Validation {
                                        valid: result["valid"].as_bool().unwrap_or(false),
                                        item_count: result["item_count"]
                                            .as_u64()
                                            .unwrap_or(0)
                                            as usize,
                                        errors: string_list(&result["errors"]),
                                    });
                                }
                            }
                            DriverSignal::TurnComplete { .. } => {}
                        },
                    )
                    .await
                }
                Err(e) => Err(e),
            }
        };

        if let Err(e) = client.close().await {
            warn!(error = %e, "failed to close agent client");
        }
        if let Some(kernel) = &kernel {
            kernel.shutdown().await;
        }

        let outcome = drive_result?;
        debug.iterations = outcome.tool_calls;

        let artifact_path = work_dir.join(config.output_format.artifact_name());

        // The agent may have finished without a (passing) validation;
        // the final gate settles it.
        let final_state = match validation_result {
            Some(v) if v["valid"].as_bool() == Some(true) => v,
            observed => {
                if !artifact_path.exists() {
                    match observed {
                        Some(v) => {
                            return Err(GraftError::ValidationFailed {
                                errors: bounded(string_list(&v["errors"])),
                            });
                        }
                        None => {
                            return Err(GraftError::AgentProtocol {
                                reason: format!("no output produced at {output_file}"),
                            });
                        }
                    }
                }

                let report = validate_artifact_with_custom(
                    &artifact_path,
                    output_model.as_ref(),
                    config.output_format,
                    domain.as_deref(),
                );
                if !report.warnings.is_empty() {
                    emit(TransformEvent::ValidationWarning {
                        warnings: report.warnings.iter().map(CustomIssue::summary).collect(),
                    });
                }
                if !report.structural.valid {
                    return Err(GraftError::ValidationFailed {
                        errors: bounded(report.structural.errors),
                    });
                }
                if !report.custom_errors.is_empty() {
                    return Err(GraftError::Domain {
                        errors: bounded(
                            report.custom_errors.iter().map(CustomIssue::summary).collect(),
                        ),
                    });
                }
                report.to_tool_json()
            }
        };

        let item_count = final_state["item_count"].as_u64().unwrap_or(0) as usize;

        let items = if item_count <= PARSE_ITEMS_LIMIT && artifact_path.exists() {
            match structural::parse_items(&artifact_path, config.output_format) {
                Ok(items) => Some(items),
                Err(e) => {
                    warn!(error = %e, "failed to parse output items");
                    None
                }
            }
        } else {
            None
        };

        let learned = if config.learn {
            Some(
                self.learn_skill(
                    work_dir,
                    instruction,
                    output_model.as_ref(),
                    config,
                    &schema_hash,
                    item_count,
                    last_text.as_deref(),
                )
                .await,
            )
        } else {
            None
        };

        let sample = final_state["sample"].as_array().cloned();

        let manifest = TransformManifest {
            artifact_path: artifact_path.clone(),
            artifact_format: config.output_format,
            item_count,
            schema_hash,
            validation_passed: true,
            sample,
            run_id: run_id.to_string(),
        };

        emit(TransformEvent::Complete {
            item_count,
            artifact_path: artifact_path.display().to_string(),
            iterations: outcome.tool_calls,
        });

        Ok(TransformRun { manifest, items, learned, debug })
    }

    #[allow(clippy::too_many_arguments)]
    async fn learn_skill(
        &self,
        work_dir: &Path,
        instruction: &str,
        output_model: &dyn OutputModel,
        config: &TransformConfig,
        schema_hash: &str,
        item_count: usize,
        last_text: Option<&str>,
    ) -> LearnedSkill {
        let script = if config.mode == TransformMode::Code {
            tokio::fs::read_to_string(work_dir.join("transform.py")).await.ok()
        } else {
            None
        };

        let slug = self
            .skills
            .as_ref()
            .map(|b| b.slug.clone())
            .unwrap_or_else(|| SkillStore::slugify(output_model.name()));

        let skill = LearnedSkill {
            slug,
            memo: compose_memo(
                output_model.name(),
                instruction,
                config.mode,
                item_count,
                last_text,
            ),
            script,
            schema_hash: schema_hash.to_string(),
        };

        if let Some(binding) = &self.skills {
            if let Err(e) = binding.store.save(&skill).await {
                warn!(error = %e, slug = %skill.slug, "failed to persist learned skill");
            } else {
                debug!(slug = %skill.slug, "learned skill persisted");
            }
        }

        skill
    }
}

fn mode_name(mode: TransformMode) -> &'static str {
    match mode {
        TransformMode::Direct => "direct",
        TransformMode::Code => "code",
    }
}

fn clip_result(result: &Value) -> String {
    let rendered = serde_json::to_string(result).unwrap_or_default();
    if rendered.len() > EVENT_RESULT_CHARS {
        rendered.chars().take(EVENT_RESULT_CHARS).collect()
    } else {
        rendered
    }
}

fn string_list(value: &Value) -> Vec<String> {
    value
        .as_array()
        .map(|arr| {
            arr.iter()
                .filter_map(Value::as_str)
                .map(String::from)
                .collect()
        })
        .unwrap_or_default()
}

fn bounded(mut errors: Vec<String>) -> Vec<String> {
    errors.truncate(ERROR_LIST_LIMIT);
    errors
}
