//! # agent-core
//!
//! Vendor-neutral core of the coding assistant: the canonical message model,
//! the tool contract, the stream decoding strategy and the reasoning loop.
//!
//! ## Architecture
//!
//! ```text
//! ┌──────────────────────────────────────────────────────────────┐
//! │                      TurnExecutor                            │
//! │  ┌─────────────┐  ┌─────────────┐  ┌──────────────────────┐  │
//! │  │  Reasoning  │  │    Tool     │  │   LlmProvider        │  │
//! │  │    Loop     │──│  Registry   │──│   (Strategy)         │  │
//! │  └─────────────┘  └─────────────┘  └──────────┬───────────┘  │
//! └───────────────────────────────────────────────┼──────────────┘
//!                                                 │
//!                                    ProtocolAdapter (per vendor)
//! ```
//!
//! Nothing here performs I/O. Transports and adapters live in
//! `agent-runtime`; tools live wherever the caller defines them.

pub mod cancel;
pub mod error;
pub mod message;
pub mod progress;
pub mod provider;
pub mod reasoning;
pub mod session;
pub mod single_shot;
pub mod stream;
pub mod todo;
pub mod tool;

pub use cancel::CancellationToken;
pub use error::{AgentError, Result};
pub use message::{Conversation, Message, Role, ToolCallRequest};
pub use progress::{NullProgress, ProgressEvent, ProgressSink};
pub use provider::{ExchangeOutcome, LlmProvider, ModelResponse, ProviderInfo, UsageStats};
pub use reasoning::{Agent, AgentBuilder, AgentConfig, TurnExecutor, TurnOutcome, TurnStop};
pub use session::Session;
pub use single_shot::{ReplyPostProcessor, SingleShotAgent};
pub use stream::{ProtocolAdapter, StreamDelta, StreamState, ToolCallDelta};
pub use tool::{Tool, ToolArguments, ToolRegistry, ToolSchema};
