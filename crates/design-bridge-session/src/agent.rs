//! Tool-calling agent loop over a chat model.

use std::sync::Arc;

use design_bridge_core::{InvocationResult, ToolArgs};
use design_bridge_llm::{ChatMessage, ChatModel, ToolCall, ToolDefinition};
use futures::future::join_all;
use serde::Serialize;
use serde_json::Value;
use tracing::{debug, info, instrument};
use uuid::Uuid;

use crate::{
    error::{AgentError, InvokeError},
    invoker::ToolInvoker,
};

/// Agent settings.
#[derive(Debug, Clone)]
pub struct AgentConfig {
    /// Model round trips allowed per turn.
    pub max_iterations: usize,
    /// Prepended to every turn when set.
    pub system_prompt: Option<String>,
}

impl Default for AgentConfig {
    fn default() -> Self {
        Self {
            max_iterations: 25,
            system_prompt: None,
        }
    }
}

/// One tool call made during a turn.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct TranscriptEntry {
    pub call_id: String,
    pub tool: String,
    pub arguments: String,
    pub result: InvocationResult,
}

/// Final answer of a turn and the tool calls that led to it.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct AgentReply {
    pub text: String,
    pub transcript: Vec<TranscriptEntry>,
}

/// Runs conversation turns, executing requested tools through the invoker.
pub struct ToolAgent {
    model: Arc<dyn ChatModel>,
    invoker: ToolInvoker,
    tools: Vec<ToolDefinition>,
    config: AgentConfig,
}

impl ToolAgent {
    /// Bind `model` to every tool in the invoker's registry.
    #[must_use]
    pub fn new(model: Arc<dyn ChatModel>, invoker: ToolInvoker, config: AgentConfig) -> Self {
        let tools = invoker
            .registry()
            .descriptors()
            .map(|d| ToolDefinition::from(d.spec()))
            .collect();
        Self {
            model,
            invoker,
            tools,
            config,
        }
    }

    /// Run one turn over `conversation`, ending with the model's first reply
    /// that requests no tools.
    ///
    /// Tool calls requested together run concurrently; a failed call is fed
    /// back to the model as an error message and never aborts its siblings.
    ///
    /// # Errors
    /// Returns error if the model fails or the iteration cap is reached.
    #[instrument(skip_all, fields(turn_id = %Uuid::new_v4(), model = %self.model.model_name()))]
    pub async fn run(&self, conversation: Vec<ChatMessage>) -> Result<AgentReply, AgentError> {
        let mut messages = Vec::with_capacity(conversation.len() + 1);
        if let Some(prompt) = &self.config.system_prompt {
            messages.push(ChatMessage::system(prompt.clone()));
        }
        messages.extend(conversation);

        let mut transcript = Vec::new();
        let (mut input_tokens, mut output_tokens) = (0_u64, 0_u64);

        for step in 1..=self.config.max_iterations {
            let completion = self.model.complete(&messages, &self.tools).await?;
            if let Some(usage) = completion.usage {
                input_tokens += u64::from(usage.prompt_tokens);
                output_tokens += u64::from(usage.completion_tokens);
            }
            let message = completion.message;

            if message.tool_calls.is_empty() {
                let text = message.text();
                info!(
                    steps = step,
                    tool_calls = transcript.len(),
                    input_tokens,
                    output_tokens,
                    finish_reason = ?completion.finish_reason,
                    "Agent turn complete"
                );
                return Ok(AgentReply { text, transcript });
            }

            let calls = message.tool_calls.clone();
            debug!(
                step,
                count = calls.len(),
                finish_reason = ?completion.finish_reason,
                "Model requested tool calls"
            );
            messages.push(message);

            let results = join_all(calls.iter().map(|call| self.execute(call))).await;
            for (call, result) in calls.into_iter().zip(results) {
                messages.push(ChatMessage::tool(call.id.clone(), result.to_model_text()));
                info!(
                    tool = %call.function.name,
                    arguments = %call.function.arguments,
                    success = result.is_success(),
                    "Tool call"
                );
                transcript.push(TranscriptEntry {
                    call_id: call.id,
                    tool: call.function.name,
                    arguments: call.function.arguments,
                    result,
                });
            }
        }

        Err(AgentError::IterationLimit(self.config.max_iterations))
    }

    async fn execute(&self, call: &ToolCall) -> InvocationResult {
        match parse_arguments(&call.function.name, &call.function.arguments) {
            Ok(args) => self.invoker.invoke(&call.function.name, args).await,
            Err(e) => InvocationResult::error(e.to_string()),
        }
    }
}

/// Decode model-produced arguments. Blank input means no arguments.
fn parse_arguments(tool: &str, raw: &str) -> Result<ToolArgs, InvokeError> {
    if raw.trim().is_empty() {
        return Ok(ToolArgs::new());
    }
    match serde_json::from_str::<Value>(raw) {
        Ok(Value::Object(map)) => Ok(map),
        Ok(Value::Null) => Ok(ToolArgs::new()),
        Ok(other) => Err(InvokeError::InvalidArguments {
            tool: tool.to_string(),
            reason: format!("expected an object, got {other}"),
        }),
        Err(e) => Err(InvokeError::InvalidArguments {
            tool: tool.to_string(),
            reason: e.to_string(),
        }),
    }
}
