//! LLM Provider Strategy Pattern
//!
//! Defines the one interface the agent talks to. Concrete providers live in
//! `agent-runtime`, where each binds a vendor protocol adapter to the stream
//! transport. The agent never learns which vendor answered.
//!
//! ## Usage
//!
//! ```rust,ignore
//! use agent_core::provider::LlmProvider;
//!
//! let provider = agent_runtime::build_provider(config)?;
//! let response = provider.chat(&messages, &tools, &mut progress, &cancel).await;
//! ```

use std::iter::Sum;
use std::ops::{Add, AddAssign};

use async_trait::async_trait;
use serde::{Deserialize, Serialize};

use crate::cancel::CancellationToken;
use crate::error::AgentError;
use crate::message::{Message, ToolCallRequest};
use crate::progress::ProgressSink;
use crate::tool::ToolSchema;

/// Token usage statistics
///
/// `total_tokens` is always `prompt_tokens + completion_tokens`. Every sum
/// saturates at `u32::MAX`.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct UsageStats {
    pub prompt_tokens: u32,
    pub completion_tokens: u32,
    pub total_tokens: u32,
}

impl UsageStats {
    pub fn new(prompt_tokens: u32, completion_tokens: u32) -> Self {
        Self {
            prompt_tokens,
            completion_tokens,
            total_tokens: prompt_tokens.saturating_add(completion_tokens),
        }
    }

    pub fn is_zero(&self) -> bool {
        self.total_tokens == 0
    }
}

impl Add for UsageStats {
    type Output = UsageStats;

    fn add(mut self, rhs: UsageStats) -> UsageStats {
        self += rhs;
        self
    }
}

impl AddAssign for UsageStats {
    fn add_assign(&mut self, rhs: UsageStats) {
        self.prompt_tokens = self.prompt_tokens.saturating_add(rhs.prompt_tokens);
        self.completion_tokens = self.completion_tokens.saturating_add(rhs.completion_tokens);
        self.total_tokens = self.prompt_tokens.saturating_add(self.completion_tokens);
    }
}

impl Sum for UsageStats {
    fn sum<I: Iterator<Item = UsageStats>>(iter: I) -> Self {
        iter.fold(UsageStats::default(), |acc, u| acc + u)
    }
}

/// How one exchange ended
#[derive(Debug)]
pub enum ExchangeOutcome {
    /// The stream ran to its end
    Completed,
    /// The cancellation token fired mid-exchange
    Cancelled,
    /// Network or HTTP failure; nothing usable was produced
    Failed(AgentError),
}

/// The canonical result of one model round-trip
#[derive(Debug)]
pub struct ModelResponse {
    /// Streamed text, if any arrived
    pub content: Option<String>,

    /// Completed tool calls, in model order
    pub tool_calls: Vec<ToolCallRequest>,

    /// Token usage (if the provider reported any)
    pub usage: Option<UsageStats>,

    pub outcome: ExchangeOutcome,
}

impl ModelResponse {
    pub fn completed(
        content: Option<String>,
        tool_calls: Vec<ToolCallRequest>,
        usage: Option<UsageStats>,
    ) -> Self {
        Self {
            content,
            tool_calls,
            usage,
            outcome: ExchangeOutcome::Completed,
        }
    }

    /// The "no result" response returned after a cancel
    pub fn cancelled() -> Self {
        Self {
            content: None,
            tool_calls: Vec::new(),
            usage: None,
            outcome: ExchangeOutcome::Cancelled,
        }
    }

    /// The empty response returned after a network/HTTP failure
    pub fn failed(error: AgentError) -> Self {
        Self {
            content: None,
            tool_calls: Vec::new(),
            usage: None,
            outcome: ExchangeOutcome::Failed(error),
        }
    }

    pub fn has_tool_calls(&self) -> bool {
        !self.tool_calls.is_empty()
    }

    /// The assistant message to record, if the response carried anything.
    ///
    /// Tool calls take precedence: text that arrived alongside them was
    /// already shown to the user and is not replayed.
    pub fn to_message(&self) -> Option<Message> {
        if self.has_tool_calls() {
            return Message::assistant_tool_calls(self.tool_calls.clone());
        }
        self.content.clone().map(Message::assistant)
    }
}

/// Provider metadata
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct ProviderInfo {
    /// Provider name (e.g., "openai", "google")
    pub name: String,

    /// Model requests are sent to
    pub model: String,

    /// Whether tool/function calling is supported
    pub supports_tools: bool,
}

/// Strategy trait for LLM providers
///
/// One call is one streaming exchange. Failures never surface as `Err`:
/// they come back as a [`ModelResponse`] whose outcome says what happened,
/// so the caller always has a well-formed value to reason about.
#[async_trait]
pub trait LlmProvider: Send + Sync {
    /// Get provider information and capabilities
    fn info(&self) -> ProviderInfo;

    /// Run one streaming exchange.
    ///
    /// Text fragments are pushed to `progress` as they arrive.
    async fn chat(
        &self,
        messages: &[Message],
        tools: &[ToolSchema],
        progress: &mut dyn ProgressSink,
        cancel: &CancellationToken,
    ) -> ModelResponse;

    /// Estimate token count for text (provider-specific tokenization)
    fn estimate_tokens(&self, text: &str) -> u32 {
        // Default: rough estimate of ~4 chars per token
        (text.len() / 4) as u32
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_usage_new_computes_total() {
        let usage = UsageStats::new(15, 30);
        assert_eq!(usage.total_tokens, 45);
        assert_eq!(UsageStats::default().total_tokens, 0);
    }

    #[test]
    fn test_usage_add_is_associative_and_commutative() {
        let a = UsageStats::new(1, 2);
        let b = UsageStats::new(10, 20);
        let c = UsageStats::new(100, 200);

        assert_eq!((a + b) + c, a + (b + c));
        assert_eq!(a + b, b + a);

        let total: UsageStats = [a, b, c].into_iter().sum();
        assert_eq!(total.prompt_tokens, 111);
        assert_eq!(total.completion_tokens, 222);
        assert_eq!(total.total_tokens, total.prompt_tokens + total.completion_tokens);
    }

    #[test]
    fn test_add_repairs_inconsistent_total() {
        let mut usage = UsageStats {
            prompt_tokens: 1,
            completion_tokens: 1,
            total_tokens: 99,
        };
        usage += UsageStats::new(2, 3);
        assert_eq!(usage.total_tokens, 7);
    }

    #[test]
    fn test_usage_saturates_instead_of_overflowing() {
        let usage = UsageStats::new(4_000_000_000, 1_000_000_000);
        assert_eq!(usage.prompt_tokens, 4_000_000_000);
        assert_eq!(usage.total_tokens, u32::MAX);

        let mut running = UsageStats::new(3_000_000_000, 0);
        running += UsageStats::new(2_000_000_000, 7);
        assert_eq!(running.prompt_tokens, u32::MAX);
        assert_eq!(running.completion_tokens, 7);
        assert_eq!(running.total_tokens, u32::MAX);
    }

    #[test]
    fn test_tool_calls_win_over_text() {
        let response = ModelResponse::completed(
            Some("let me look".into()),
            vec![ToolCallRequest::new("c1", "ls", "{}")],
            None,
        );
        let msg = response.to_message().unwrap();
        assert!(msg.content().is_none());
        assert_eq!(msg.tool_calls().len(), 1);
    }

    #[test]
    fn test_empty_responses_have_no_message() {
        assert!(ModelResponse::cancelled().to_message().is_none());
        assert!(ModelResponse::failed(AgentError::Network("down".into()))
            .to_message()
            .is_none());
        assert!(ModelResponse::completed(None, Vec::new(), None).to_message().is_none());
    }
}
