//! Reasoning Loop
//!
//! One turn alternates model calls and tool dispatch until the model answers
//! in plain text or the iteration ceiling is reached:
//!
//! ```text
//! START ─► AWAIT_MODEL ─┬─► HAS_TEXT ─────────► DONE
//!              ▲        └─► HAS_TOOL_CALLS ─► DISPATCH_TOOLS ─┐
//!              └──────────────────────────────────────────────┘
//! ```
//!
//! Each model call sees the system prompt and the current turn only; the full
//! history in the session keeps growing for persistence.

use std::sync::Arc;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};

use crate::cancel::CancellationToken;
use crate::error::{AgentError, Result};
use crate::message::{Message, ToolCallRequest};
use crate::progress::{preview_output, ProgressEvent, ProgressSink};
use crate::provider::{ExchangeOutcome, LlmProvider, UsageStats};
use crate::session::{is_error_output, summarize_outcome, Session};
use crate::single_shot::{ReplyPostProcessor, SingleShotAgent};
use crate::todo::TodoList;
use crate::tool::{ToolArguments, ToolRegistry, ToolSchema};

/// Agent configuration
#[derive(Clone, Debug, Serialize, Deserialize)]
#[serde(default)]
pub struct AgentConfig {
    /// System prompt placed at the head of the history
    pub system_prompt: String,

    /// Maximum model calls per turn
    pub max_iterations: usize,

    /// Offer and handle `add_todo` / `mark_todo_done` / `list_todos`
    pub builtin_todo_tools: bool,

    /// Lines of tool output included in progress previews
    pub tool_output_preview_lines: usize,

    /// Use the single-shot agent (for models without tool calling)
    pub single_shot: bool,
}

impl Default for AgentConfig {
    fn default() -> Self {
        Self {
            system_prompt: DEFAULT_SYSTEM_PROMPT.into(),
            max_iterations: 10,
            builtin_todo_tools: true,
            tool_output_preview_lines: 3,
            single_shot: false,
        }
    }
}

const DEFAULT_SYSTEM_PROMPT: &str = "You are a coding assistant working in the user's project.

Use the available tools to inspect and change files instead of guessing.
Call tools one step at a time and read their results before continuing.
When the task is complete, reply with a short summary of what changed.";

/// Why a turn stopped
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum TurnStop {
    /// The model answered without requesting tools
    Completed,
    /// `max_iterations` model calls were made
    IterationLimit,
    /// The cancellation token fired
    Cancelled,
    /// A network or HTTP failure ended the turn
    Failed(String),
}

/// Result of one turn
#[derive(Clone, Debug)]
pub struct TurnOutcome {
    /// Usage summed over every model call (zero if never reported)
    pub usage: UsageStats,

    /// Final assistant text, if the turn produced one
    pub content: Option<String>,

    pub stop: TurnStop,

    /// Model calls made
    pub iterations: usize,
}

/// Anything that can run a user turn against a session
#[async_trait]
pub trait TurnExecutor: Send + Sync {
    /// Whether this executor offers tools to the model
    fn supports_tool_calls(&self) -> bool;

    async fn execute(
        &self,
        session: &mut Session,
        prompt: &str,
        progress: &mut dyn ProgressSink,
        cancel: &CancellationToken,
    ) -> TurnOutcome;
}

/// The tool-calling agent
pub struct Agent {
    provider: Arc<dyn LlmProvider>,
    tools: Arc<ToolRegistry>,
    config: AgentConfig,
}

impl Agent {
    /// Create a new agent
    pub fn new(
        provider: Arc<dyn LlmProvider>,
        tools: Arc<ToolRegistry>,
        config: AgentConfig,
    ) -> Self {
        Self {
            provider,
            tools,
            config,
        }
    }

    /// Create with default configuration
    pub fn with_defaults(provider: Arc<dyn LlmProvider>, tools: Arc<ToolRegistry>) -> Self {
        Self::new(provider, tools, AgentConfig::default())
    }

    /// Schemas offered to the model on every call
    fn tool_schemas(&self) -> Vec<ToolSchema> {
        let mut schemas = self.tools.schemas();
        if self.config.builtin_todo_tools {
            schemas.extend(TodoList::tool_schemas());
        }
        schemas
    }

    /// Run one user turn.
    ///
    /// Never fails: network errors, cancellation and the iteration ceiling
    /// all end the turn with whatever was already committed to `session`.
    pub async fn execute(
        &self,
        session: &mut Session,
        prompt: &str,
        progress: &mut dyn ProgressSink,
        cancel: &CancellationToken,
    ) -> TurnOutcome {
        session
            .conversation
            .ensure_system_prompt(&self.config.system_prompt);

        let mut turn = session.conversation.turn_scoped();
        let user = Message::user(prompt);
        session.conversation.push(user.clone());
        turn.push(user);

        let tools = self.tool_schemas();
        let mut usage = UsageStats::default();
        let mut tools_used: Vec<(String, bool)> = Vec::new();
        let mut final_content = None;
        let mut stop = None;
        let mut iterations = 0;

        while iterations < self.config.max_iterations {
            iterations += 1;
            tracing::debug!(iteration = iterations, messages = turn.len(), "Requesting model");

            let response = self
                .provider
                .chat(turn.messages(), &tools, progress, cancel)
                .await;

            if let Some(reported) = response.usage {
                usage += reported;
            }

            match &response.outcome {
                ExchangeOutcome::Completed => {}
                ExchangeOutcome::Cancelled => {
                    tracing::info!(iteration = iterations, "Turn cancelled");
                    stop = Some(TurnStop::Cancelled);
                    break;
                }
                ExchangeOutcome::Failed(err) => {
                    tracing::error!(error = %err, "Model exchange failed");
                    progress.emit(ProgressEvent::Error(&err.user_message()));
                    stop = Some(TurnStop::Failed(err.to_string()));
                    break;
                }
            }

            let Some(assistant) = response.to_message() else {
                tracing::warn!("Model returned an empty response");
                stop = Some(TurnStop::Completed);
                break;
            };

            if !assistant.has_tool_calls() {
                final_content = assistant.content().map(String::from);
                session.conversation.push(assistant);
                stop = Some(TurnStop::Completed);
                break;
            }

            session.conversation.push(assistant.clone());
            turn.push(assistant.clone());

            // Sequential, in model order: every call gets its result before
            // the next model request.
            for call in assistant.tool_calls() {
                let output = self.dispatch(session, call, progress).await;
                tools_used.push((call.name.clone(), is_error_output(&output)));

                let result = Message::tool_result(&call.id, &call.name, output);
                session.conversation.push(result.clone());
                turn.push(result);
            }
        }

        let stop = stop.unwrap_or_else(|| {
            let message = AgentError::MaxIterations(self.config.max_iterations).user_message();
            tracing::warn!(max_iterations = self.config.max_iterations, "Iteration ceiling reached");
            progress.emit(ProgressEvent::Warning(&message));
            TurnStop::IterationLimit
        });

        session.record_episode(prompt, summarize_outcome(&tools_used, final_content.as_deref()));

        TurnOutcome {
            usage,
            content: final_content,
            stop,
            iterations,
        }
    }

    /// Run one tool call and produce the text for its result message.
    ///
    /// Every failure becomes `Error: ...` text so the call still gets
    /// exactly one result.
    async fn dispatch(
        &self,
        session: &mut Session,
        call: &ToolCallRequest,
        progress: &mut dyn ProgressSink,
    ) -> String {
        progress.emit(ProgressEvent::ToolCall { name: &call.name });
        tracing::debug!(tool = %call.name, id = %call.id, "Executing tool");

        let (arguments, output) = match call.parsed_arguments() {
            Err(err) => (
                ToolArguments::new(),
                format!("Error: Invalid arguments for tool '{}': {}", call.name, err),
            ),
            Ok(arguments) => {
                let output = self.run_tool(session, &call.name, &arguments).await;
                (arguments, output)
            }
        };

        let is_error = is_error_output(&output);
        if is_error {
            tracing::warn!(tool = %call.name, "Tool reported failure");
        }

        session.record_tool_use(&call.name, &arguments, &output);

        let preview = preview_output(&output, self.config.tool_output_preview_lines);
        progress.emit(ProgressEvent::ToolOutput {
            name: &call.name,
            preview: &preview,
            is_error,
        });

        output
    }

    async fn run_tool(&self, session: &mut Session, name: &str, arguments: &ToolArguments) -> String {
        if self.config.builtin_todo_tools {
            if let Some(reply) = session.todo.handle(name, arguments) {
                return reply;
            }
        }

        match self.tools.execute(name, arguments).await {
            Ok(output) => output,
            Err(AgentError::ToolNotFound(name)) => format!("Error: Tool '{}' not found.", name),
            Err(err) => format!("Error: {}", err),
        }
    }

    /// Get the tool registry
    pub fn tools(&self) -> &ToolRegistry {
        &self.tools
    }

    /// Get configuration
    pub fn config(&self) -> &AgentConfig {
        &self.config
    }
}

#[async_trait]
impl TurnExecutor for Agent {
    fn supports_tool_calls(&self) -> bool {
        true
    }

    async fn execute(
        &self,
        session: &mut Session,
        prompt: &str,
        progress: &mut dyn ProgressSink,
        cancel: &CancellationToken,
    ) -> TurnOutcome {
        Agent::execute(self, session, prompt, progress, cancel).await
    }
}

/// Builder for Agent configuration
pub struct AgentBuilder {
    provider: Option<Arc<dyn LlmProvider>>,
    tools: ToolRegistry,
    config: AgentConfig,
    post_processor: Option<Arc<dyn ReplyPostProcessor>>,
}

impl Default for AgentBuilder {
    fn default() -> Self {
        Self::new()
    }
}

impl AgentBuilder {
    pub fn new() -> Self {
        Self {
            provider: None,
            tools: ToolRegistry::new(),
            config: AgentConfig::default(),
            post_processor: None,
        }
    }

    pub fn provider(mut self, provider: Arc<dyn LlmProvider>) -> Self {
        self.provider = Some(provider);
        self
    }

    pub fn tool<T: crate::tool::Tool + 'static>(mut self, tool: T) -> Self {
        self.tools.register(tool);
        self
    }

    pub fn tools(mut self, tools: ToolRegistry) -> Self {
        self.tools = tools;
        self
    }

    pub fn config(mut self, config: AgentConfig) -> Self {
        self.config = config;
        self
    }

    pub fn system_prompt(mut self, prompt: impl Into<String>) -> Self {
        self.config.system_prompt = prompt.into();
        self
    }

    pub fn max_iterations(mut self, max: usize) -> Self {
        self.config.max_iterations = max;
        self
    }

    pub fn single_shot(mut self, enabled: bool) -> Self {
        self.config.single_shot = enabled;
        self
    }

    /// Reply parser for the single-shot agent
    pub fn post_processor(mut self, processor: Arc<dyn ReplyPostProcessor>) -> Self {
        self.post_processor = Some(processor);
        self
    }

    /// Build the tool-calling agent
    pub fn build(self) -> Result<Agent> {
        let provider = self
            .provider
            .ok_or_else(|| AgentError::Config("Provider is required".into()))?;

        Ok(Agent::new(provider, Arc::new(self.tools), self.config))
    }

    /// Build whichever executor fits the configuration and the provider.
    ///
    /// Providers that cannot call tools always get the single-shot agent.
    pub fn build_executor(self) -> Result<Box<dyn TurnExecutor>> {
        let provider = self
            .provider
            .clone()
            .ok_or_else(|| AgentError::Config("Provider is required".into()))?;

        if self.config.single_shot || !provider.info().supports_tools {
            return Ok(Box::new(SingleShotAgent::new(
                provider,
                self.config,
                self.post_processor,
            )));
        }
        Ok(Box::new(self.build()?))
    }
}
