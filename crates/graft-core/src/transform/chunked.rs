//! Chunked transformer for unbounded output generation.
//!
//! Produces outputs larger than one context window by driving the
//! orchestrator repeatedly with continuation prompts. Each chunk is
//! validated as a standalone artifact and merged into a single result.
//! Output format is forced to jsonl and learning is disabled.

use std::path::PathBuf;
use std::sync::Arc;

use serde_json::Value;
use tracing::warn;

use graft_types::{
    compute_schema_hash, ChunkConfig, EventCallback, OutputFormat, OutputModel, Result,
    RunDebug, TransformConfig, TransformEvent, TransformManifest, TransformRun,
};

use crate::transform::orchestrator::DataTransformer;
use crate::transform::prompts::{continuation_instruction, first_chunk_instruction};
use crate::validate::{structural, DomainValidator};

/// Generates large outputs in validated chunks.
pub struct ChunkedTransformer {
    transformer: DataTransformer,
}

impl ChunkedTransformer {
    /// Wrap an orchestrator for chunked generation.
    pub fn new(transformer: DataTransformer) -> Self {
        Self { transformer }
    }

    /// Transform inputs into a merged multi-chunk run.
    ///
    /// Stops when `max_chunks` is reached, a chunk comes back empty, a
    /// chunk falls below the underflow threshold, or a chunk other
    /// than the first fails. A first-chunk failure propagates.
    pub async fn transform_chunked(
        &self,
        input_paths: &[PathBuf],
        instruction: &str,
        output_model: Arc<dyn OutputModel>,
        chunk_config: &ChunkConfig,
        transform_config: &TransformConfig,
        on_event: Option<EventCallback>,
        domain: Option<Arc<dyn DomainValidator>>,
    ) -> Result<TransformRun> {
        let mut config = transform_config.clone();
        if config.output_format != OutputFormat::Jsonl {
            warn!("chunked generation requires jsonl output, overriding");
            config.output_format = OutputFormat::Jsonl;
        }
        // A chunk is one bounded artifact; skills would memoise a
        // partial view.
        config.learn = false;

        let emit = |event: TransformEvent| {
            if let Some(cb) = &on_event {
                cb(&event);
            }
        };

        emit(TransformEvent::ChunkedStart {
            chunk_size: chunk_config.chunk_size,
            max_chunks: chunk_config.max_chunks,
            overlap_context: chunk_config.overlap_context,
        });

        let mut all_items: Vec<Value> = Vec::new();
        let mut chunk_num = 0usize;
        let mut last_schema_hash: Option<String> = None;

        while chunk_num < chunk_config.max_chunks {
            emit(TransformEvent::ChunkStart {
                chunk_num: chunk_num + 1,
                items_so_far: all_items.len(),
            });

            let chunk_instruction = if chunk_num == 0 {
                first_chunk_instruction(instruction, chunk_config.chunk_size)
            } else {
                let overlap_start = all_items.len().saturating_sub(chunk_config.overlap_context);
                continuation_instruction(
                    instruction,
                    chunk_config.chunk_size,
                    all_items.len(),
                    &all_items[overlap_start..],
                )
            };

            let chunk_result = self
                .transformer
                .transform(
                    input_paths,
                    &chunk_instruction,
                    output_model.clone(),
                    &config,
                    on_event.clone(),
                    domain.clone(),
                )
                .await;

            let chunk_run = match chunk_result {
                Ok(run) => run,
                Err(e) => {
                    emit(TransformEvent::ChunkError {
                        chunk_num: chunk_num + 1,
                        error: e.to_string(),
                    });
                    if chunk_num == 0 {
                        return Err(e);
                    }
                    warn!(chunk = chunk_num + 1, error = %e, "chunk failed, stopping with partial output");
                    break;
                }
            };

            last_schema_hash = Some(chunk_run.manifest.schema_hash.clone());
            let chunk_items = extract_items(&chunk_run);

            if chunk_items.is_empty() {
                emit(TransformEvent::ChunkEmpty {
                    chunk_num: chunk_num + 1,
                    message: "Received empty chunk, stopping generation".into(),
                });
                break;
            }

            emit(TransformEvent::ChunkComplete {
                chunk_num: chunk_num + 1,
                items_in_chunk: chunk_items.len(),
                total_so_far: all_items.len() + chunk_items.len(),
            });

            let received = chunk_items.len();
            all_items.extend(chunk_items);
            chunk_num += 1;

            if chunk_config.stop_on_underflow {
                let threshold =
                    chunk_config.chunk_size as f64 * chunk_config.underflow_threshold;
                if (received as f64) < threshold {
                    emit(TransformEvent::ChunkUnderflow {
                        expected: chunk_config.chunk_size,
                        got: received,
                        threshold,
                        message: "Received fewer items than expected, stopping generation".into(),
                    });
                    break;
                }
            }
        }

        emit(TransformEvent::ChunkedComplete {
            total_chunks: chunk_num,
            total_items: all_items.len(),
        });

        let schema_hash =
            last_schema_hash.unwrap_or_else(|| compute_schema_hash(output_model.as_ref()));

        let mut debug = RunDebug::default();
        debug.info.insert("mode".into(), "chunked".into());
        debug.info.insert("chunks_generated".into(), chunk_num.to_string());
        debug.info.insert("chunk_size".into(), chunk_config.chunk_size.to_string());

        let manifest = TransformManifest {
            artifact_path: PathBuf::from("(chunked)"),
            artifact_format: OutputFormat::Jsonl,
            item_count: all_items.len(),
            schema_hash,
            validation_passed: true,
            sample: all_items.first().map(|item| vec![item.clone()]),
            run_id: format!("chunked-{chunk_num}"),
        };

        Ok(TransformRun {
            manifest,
            items: Some(all_items),
            learned: None,
            debug,
        })
    }
}

/// Items of one chunk: parsed items when small enough to have been
/// materialised, otherwise re-read from the chunk artifact (possible
/// when the caller pinned a work directory).
fn extract_items(run: &TransformRun) -> Vec<Value> {
    if let Some(items) = &run.items {
        return items.clone();
    }
    match structural::parse_items(&run.manifest.artifact_path, run.manifest.artifact_format) {
        Ok(items) => items,
        Err(e) => {
            warn!(error = %e, "chunk items unavailable");
            Vec::new()
        }
    }
}
