//! Streaming Protocol Adapters
//!
//! A [`ProtocolAdapter`] knows one vendor's wire format: how to turn the
//! canonical history into a request body, and how to turn the streamed reply
//! back into canonical [`StreamDelta`]s. Every adapter funnels its deltas
//! through the same [`StreamAccumulator`], so text concatenation, tool-call
//! assembly and id synthesis behave identically for all vendors.
//!
//! ```text
//!  bytes ──► parse_chunk (vendor framing) ──► StreamDelta ──► StreamAccumulator
//!                                                                  │
//!                                          finalize ◄──────────────┘
//!                                              │
//!                                              ▼
//!                                        ModelResponse
//! ```

use std::collections::{BTreeMap, HashSet};

use serde_json::Value;
use uuid::Uuid;

use crate::message::{Message, ToolCallRequest};
use crate::provider::{ModelResponse, UsageStats};
use crate::tool::ToolSchema;

/// One incremental unit of a streamed reply
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum StreamDelta {
    /// A text fragment
    Text(String),
    /// A fragment of the tool call at `index`
    ToolCall(ToolCallDelta),
    /// Usage as reported so far
    Usage(UsageStats),
}

/// A piece of one tool call. Fields that are `Some` are appended to the call
/// being assembled at `index`.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct ToolCallDelta {
    pub index: usize,
    pub id: Option<String>,
    pub name: Option<String>,
    pub arguments: Option<String>,
}

#[derive(Debug, Default)]
struct PartialToolCall {
    id: String,
    name: String,
    arguments: String,
}

/// Transient assembly buffer for one exchange
#[derive(Debug, Default)]
pub struct StreamAccumulator {
    content: Option<String>,
    tool_calls: BTreeMap<usize, PartialToolCall>,
    usage: Option<UsageStats>,
}

impl StreamAccumulator {
    pub fn new() -> Self {
        Self::default()
    }

    /// Fold one delta in
    pub fn apply(&mut self, delta: &StreamDelta) {
        match delta {
            StreamDelta::Text(text) => {
                if !text.is_empty() {
                    self.content.get_or_insert_with(String::new).push_str(text);
                }
            }
            StreamDelta::ToolCall(fragment) => {
                let call = self.tool_calls.entry(fragment.index).or_default();
                if let Some(id) = fragment.id.as_deref().filter(|id| !id.is_empty()) {
                    call.id = id.to_string();
                }
                if let Some(name) = &fragment.name {
                    call.name.push_str(name);
                }
                if let Some(arguments) = &fragment.arguments {
                    call.arguments.push_str(arguments);
                }
            }
            // Vendors report running totals, so the latest value wins.
            StreamDelta::Usage(usage) => self.usage = Some(*usage),
        }
    }

    /// Text received so far
    pub fn content(&self) -> Option<&str> {
        self.content.as_deref()
    }

    pub fn tool_call_count(&self) -> usize {
        self.tool_calls.len()
    }

    /// Close the exchange. Calls are returned in index order; a call with a
    /// missing or repeated id gets a synthesized one.
    pub fn finish(self) -> ModelResponse {
        let mut seen = HashSet::new();
        let tool_calls = self
            .tool_calls
            .into_values()
            .map(|call| {
                let id = if call.id.is_empty() || seen.contains(&call.id) {
                    synthesize_call_id()
                } else {
                    call.id
                };
                seen.insert(id.clone());
                ToolCallRequest::new(id, call.name, call.arguments)
            })
            .collect();

        ModelResponse::completed(self.content, tool_calls, self.usage)
    }
}

/// A fresh correlation id for a tool call the wire format left anonymous
pub fn synthesize_call_id() -> String {
    format!("call_{}", Uuid::new_v4().simple())
}

/// Per-exchange decoding state: the adapter's framing state plus the shared
/// accumulator.
#[derive(Debug, Default)]
pub struct StreamState<F> {
    pub framing: F,
    accumulator: StreamAccumulator,
}

impl<F: Default> StreamState<F> {
    pub fn new() -> Self {
        Self {
            framing: F::default(),
            accumulator: StreamAccumulator::default(),
        }
    }

    pub fn accumulator(&self) -> &StreamAccumulator {
        &self.accumulator
    }
}

/// Vendor wire protocol strategy
pub trait ProtocolAdapter: Send + Sync {
    /// Framing state carried between chunks (partial lines, scanner depth...)
    type Framing: Default + Send;

    /// Short vendor family name, for logs
    fn name(&self) -> &'static str;

    /// Streaming endpoint for `model`
    fn request_url(&self, base_url: &str, model: &str) -> String;

    /// Build the request body from canonical history
    fn encode_request(&self, model: &str, messages: &[Message], tools: &[ToolSchema]) -> Value;

    /// Parse the complete records available after appending `chunk`.
    ///
    /// Incomplete trailing data must stay in `framing` for the next call.
    /// Unparseable records are skipped.
    fn parse_chunk(&self, chunk: &[u8], framing: &mut Self::Framing) -> Vec<StreamDelta>;

    /// Parse whatever is left once the stream has ended
    fn parse_remainder(&self, framing: &mut Self::Framing) -> Vec<StreamDelta>;

    /// Decode one arriving block and fold it into the accumulator
    fn decode_chunk(&self, chunk: &[u8], state: &mut StreamState<Self::Framing>) -> Vec<StreamDelta> {
        let deltas = self.parse_chunk(chunk, &mut state.framing);
        for delta in &deltas {
            state.accumulator.apply(delta);
        }
        deltas
    }

    /// Decode the unterminated tail, if any. Safe to call more than once.
    fn flush(&self, state: &mut StreamState<Self::Framing>) -> Vec<StreamDelta> {
        let deltas = self.parse_remainder(&mut state.framing);
        for delta in &deltas {
            state.accumulator.apply(delta);
        }
        deltas
    }

    /// Turn the finished exchange into the canonical response
    fn finalize(&self, mut state: StreamState<Self::Framing>) -> ModelResponse {
        self.flush(&mut state);
        state.accumulator.finish()
    }

    /// Decode a whole response body at once
    fn decode_complete(&self, body: &[u8]) -> ModelResponse {
        let mut state = StreamState::new();
        self.decode_chunk(body, &mut state);
        self.finalize(state)
    }
}
