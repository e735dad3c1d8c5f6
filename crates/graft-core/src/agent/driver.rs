//! The consume-execute-respond cycle.
//!
//! [`drive`] pulls blocks from an agent client, executes tool-use
//! blocks through the [`ToolRegistry`] (enforcing the allowed-tool
//! whitelist), feeds results back, and reports every step to an
//! observer callback. Both the transformer orchestrator and chat
//! sessions run their loops through this function, which keeps event
//! ordering identical across the two: a tool's result signal never
//! precedes its call signal, and signals are delivered from the
//! driving task only.

use serde_json::Value;
use tokio_util::sync::CancellationToken;

use graft_types::{GraftError, Result};

use crate::agent::client::{AgentBlock, AgentClient};
use crate::tools::registry::ToolRegistry;

/// Counters produced by one drive.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct DriverOutcome {
    /// Tool-use blocks consumed.
    pub tool_calls: usize,
    /// Completed agent turns.
    pub turns: usize,
}

/// One step of the drive, reported to the observer.
#[derive(Debug)]
pub enum DriverSignal<'a> {
    /// Agent text output.
    Text(&'a str),

    /// A tool is about to run. `call_number` is 1-based.
    PreTool {
        /// Position of this call within the run.
        call_number: usize,
        /// Tool name.
        name: &'a str,
        /// Tool input.
        input: &'a Value,
    },

    /// A tool finished; `result` is the payload fed back to the agent
    /// (tool failures arrive here as error payloads, never as `Err`).
    PostTool {
        /// Tool name.
        name: &'a str,
        /// Result payload.
        result: &'a Value,
    },

    /// The agent finished a turn. `turn` is 1-based.
    TurnComplete {
        /// Completed turn count.
        turn: usize,
    },
}

/// Drive one query to completion.
///
/// Ends when the agent stops emitting blocks or `max_turns` turns have
/// completed. A cancellation fires [`GraftError::Cancelled`] between
/// blocks; the caller owns sandbox cleanup.
pub async fn drive(
    client: &mut dyn AgentClient,
    registry: &ToolRegistry,
    allowed: &[String],
    max_turns: usize,
    cancel: Option<&CancellationToken>,
    mut observer: impl FnMut(DriverSignal<'_>),
) -> Result<DriverOutcome> {
    let mut outcome = DriverOutcome::default();

    loop {
        let block = match cancel {
            Some(token) => {
                tokio::select! {
                    biased;
                    _ = token.cancelled() => {
                        return Err(GraftError::Cancelled { operation: "agent query".into() });
                    }
                    block = client.next_block() => block?,
                }
            }
            None => client.next_block().await?,
        };

        let Some(block) = block else { break };

        match block {
            AgentBlock::Text(text) => observer(DriverSignal::Text(&text)),

            AgentBlock::ToolUse { id, name, input } => {
                outcome.tool_calls += 1;
                observer(DriverSignal::PreTool {
                    call_number: outcome.tool_calls,
                    name: &name,
                    input: &input,
                });

                let result = match registry.execute(&name, input, Some(allowed)).await {
                    Ok(result) => result,
                    Err(err) => err.into_result(),
                };

                observer(DriverSignal::PostTool { name: &name, result: &result });
                client.tool_result(&id, result).await?;
            }

            AgentBlock::TurnComplete => {
                outcome.turns += 1;
                observer(DriverSignal::TurnComplete { turn: outcome.turns });
                if outcome.turns >= max_turns {
                    break;
                }
            }
        }
    }

    Ok(outcome)
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Arc;

    use async_trait::async_trait;
    use serde_json::json;

    use crate::agent::testing::{ScriptedAgent, ScriptedBlock};
    use crate::tools::registry::{Tool, ToolError};

    struct UpperTool;

    #[async_trait]
    impl Tool for UpperTool {
        fn name(&self) -> &str {
            "upper"
        }
        fn description(&self) -> &str {
            "Uppercase the input"
        }
        fn parameters(&self) -> Value {
            json!({"type": "object", "properties": {"text": {"type": "string"}}})
        }
        async fn execute(&self, args: Value) -> std::result::Result<Value, ToolError> {
            let text = args
                .get("text")
                .and_then(Value::as_str)
                .ok_or_else(|| ToolError::InvalidArgs("missing 'text'".into()))?;
            Ok(json!({"output": text.to_uppercase()}))
        }
    }

    fn registry() -> ToolRegistry {
        let mut registry = ToolRegistry::new();
        registry.register(Arc::new(UpperTool));
        registry
    }

    fn allowed() -> Vec<String> {
        vec!["upper".into()]
    }

    #[tokio::test]
    async fn drives_text_tool_and_turns_in_order() {
        let mut agent = ScriptedAgent::single_query(vec![
            ScriptedBlock::text("thinking"),
            ScriptedBlock::tool_use("upper", json!({"text": "hi"})),
            ScriptedBlock::text("done"),
            ScriptedBlock::TurnComplete,
        ]);
        agent.query("go").await.unwrap();

        let registry = registry();
        let mut trace: Vec<String> = Vec::new();
        let outcome = drive(&mut agent, &registry, &allowed(), 10, None, |signal| {
            trace.push(match signal {
                DriverSignal::Text(t) => format!("text:{t}"),
                DriverSignal::PreTool { name, .. } => format!("pre:{name}"),
                DriverSignal::PostTool { name, result } => {
                    format!("post:{name}:{}", result["output"].as_str().unwrap_or(""))
                }
                DriverSignal::TurnComplete { turn } => format!("turn:{turn}"),
            });
        })
        .await
        .unwrap();

        assert_eq!(outcome.tool_calls, 1);
        assert_eq!(outcome.turns, 1);
        assert_eq!(
            trace,
            vec!["text:thinking", "pre:upper", "post:upper:HI", "text:done", "turn:1"]
        );
        // The result was fed back to the agent.
        assert_eq!(agent.tool_results.len(), 1);
        assert_eq!(agent.tool_results[0].1["output"], "HI");
    }

    #[tokio::test]
    async fn tool_errors_become_result_payloads() {
        let mut agent = ScriptedAgent::single_query(vec![
            ScriptedBlock::tool_use("upper", json!({})),
            ScriptedBlock::TurnComplete,
        ]);
        agent.query("go").await.unwrap();

        let registry = registry();
        let outcome = drive(&mut agent, &registry, &allowed(), 10, None, |_| {})
            .await
            .unwrap();

        assert_eq!(outcome.tool_calls, 1);
        assert_eq!(agent.tool_results[0].1["success"], false);
        assert!(agent.tool_results[0].1["error"]
            .as_str()
            .unwrap()
            .contains("invalid arguments"));
    }

    #[tokio::test]
    async fn disallowed_tool_rejected_but_not_fatal() {
        let mut agent = ScriptedAgent::single_query(vec![
            ScriptedBlock::tool_use("upper", json!({"text": "hi"})),
            ScriptedBlock::TurnComplete,
        ]);
        agent.query("go").await.unwrap();

        let registry = registry();
        let outcome = drive(&mut agent, &registry, &[], 10, None, |_| {})
            .await
            .unwrap();

        assert_eq!(outcome.turns, 1);
        assert!(agent.tool_results[0].1["error"]
            .as_str()
            .unwrap()
            .contains("tool not allowed"));
    }

    #[tokio::test]
    async fn stops_at_max_turns() {
        let mut agent = ScriptedAgent::single_query(vec![
            ScriptedBlock::TurnComplete,
            ScriptedBlock::TurnComplete,
            ScriptedBlock::text("never seen"),
        ]);
        agent.query("go").await.unwrap();

        let registry = registry();
        let mut texts = 0;
        let outcome = drive(&mut agent, &registry, &allowed(), 2, None, |signal| {
            if matches!(signal, DriverSignal::Text(_)) {
                texts += 1;
            }
        })
        .await
        .unwrap();

        assert_eq!(outcome.turns, 2);
        assert_eq!(texts, 0);
    }

    #[tokio::test]
    async fn cancellation_interrupts_between_blocks() {
        let mut agent = ScriptedAgent::single_query(vec![ScriptedBlock::text("x")]);
        agent.query("go").await.unwrap();

        let registry = registry();
        let token = CancellationToken::new();
        token.cancel();

        let err = drive(&mut agent, &registry, &allowed(), 10, Some(&token), |_| {})
            .await
            .unwrap_err();
        assert!(matches!(err, GraftError::Cancelled { .. }));
    }
}
