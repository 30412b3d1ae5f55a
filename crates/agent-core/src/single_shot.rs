//! Single-shot agent for models without tool calling.
//!
//! One model call per turn with the full history and no tools. The reply is
//! optionally handed to a [`ReplyPostProcessor`], which is where text-encoded
//! commands get parsed and run.

use std::sync::Arc;

use async_trait::async_trait;

use crate::cancel::CancellationToken;
use crate::message::Message;
use crate::progress::{ProgressEvent, ProgressSink};
use crate::provider::{ExchangeOutcome, LlmProvider};
use crate::reasoning::{AgentConfig, TurnExecutor, TurnOutcome, TurnStop};
use crate::session::{summarize_outcome, ActionResult, LastAction, Session};

/// Interprets a plain-text reply after it has been recorded
pub trait ReplyPostProcessor: Send + Sync {
    /// Returns the text describing what was done, empty if nothing
    fn process(&self, reply: &str) -> String;
}

pub struct SingleShotAgent {
    provider: Arc<dyn LlmProvider>,
    config: AgentConfig,
    post_processor: Option<Arc<dyn ReplyPostProcessor>>,
}

impl SingleShotAgent {
    pub fn new(
        provider: Arc<dyn LlmProvider>,
        config: AgentConfig,
        post_processor: Option<Arc<dyn ReplyPostProcessor>>,
    ) -> Self {
        Self {
            provider,
            config,
            post_processor,
        }
    }
}

#[async_trait]
impl TurnExecutor for SingleShotAgent {
    fn supports_tool_calls(&self) -> bool {
        false
    }

    async fn execute(
        &self,
        session: &mut Session,
        prompt: &str,
        progress: &mut dyn ProgressSink,
        cancel: &CancellationToken,
    ) -> TurnOutcome {
        session
            .conversation
            .ensure_system_prompt(&self.config.system_prompt);

        let user = Message::user(prompt);
        session.conversation.push(user);

        let response = self
            .provider
            .chat(session.conversation.messages(), &[], progress, cancel)
            .await;
        let usage = response.usage.unwrap_or_default();

        let stop = match &response.outcome {
            ExchangeOutcome::Completed => TurnStop::Completed,
            ExchangeOutcome::Cancelled => TurnStop::Cancelled,
            ExchangeOutcome::Failed(err) => {
                tracing::error!(error = %err, "Model exchange failed");
                progress.emit(ProgressEvent::Error(&err.user_message()));
                TurnStop::Failed(err.to_string())
            }
        };

        if response.has_tool_calls() {
            tracing::warn!(
                count = response.tool_calls.len(),
                "Ignoring tool calls from a single-shot exchange"
            );
        }

        let content = if stop == TurnStop::Completed {
            response.content.clone().filter(|c| !c.is_empty())
        } else {
            None
        };

        let outcome = match &content {
            Some(reply) => {
                session.conversation.push(Message::assistant(reply.clone()));
                let processed = self
                    .post_processor
                    .as_ref()
                    .map(|p| p.process(reply))
                    .unwrap_or_default();
                session.last_action = Some(LastAction {
                    action: "text_command_generation".into(),
                    result: if processed.trim().is_empty() {
                        ActionResult::NoOp
                    } else {
                        ActionResult::Success
                    },
                    file: None,
                });
                if processed.trim().is_empty() {
                    summarize_outcome(&[], Some(reply))
                } else {
                    processed
                }
            }
            None => summarize_outcome(&[], None),
        };

        session.record_episode(prompt, outcome);

        TurnOutcome {
            usage,
            content,
            stop,
            iterations: 1,
        }
    }
}
