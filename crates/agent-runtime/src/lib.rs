//! # agent-runtime
//!
//! HTTP side of the coding assistant: vendor protocol adapters and the
//! streaming transport they run over.
//!
//! ## Providers
//!
//! - **openai** / **openai_compatible**: Chat Completions over SSE
//! - **google**: Gemini `streamGenerateContent` (JSON array or SSE)
//!
//! ## Usage
//!
//! ```rust,ignore
//! use agent_runtime::{build_provider, ProviderConfig};
//!
//! let provider = build_provider(&ProviderConfig::from_env()?)?;
//! let agent = AgentBuilder::new()
//!     .provider(provider)
//!     .build()?;
//! ```

pub mod config;
pub mod framing;
pub mod gemini;
pub mod openai;
pub mod provider;
pub mod transport;

#[cfg(test)]
mod test_support;

pub use config::{ProviderConfig, ProviderKind};
pub use gemini::GeminiAdapter;
pub use openai::OpenAiAdapter;
pub use provider::{build_provider, StreamingProvider};
pub use transport::StreamTransport;

// Re-export core types for convenience
pub use agent_core::{
    Agent, AgentBuilder, AgentError, CancellationToken, LlmProvider, Message, ProgressEvent,
    Result, Role, Session, Tool, ToolRegistry, TurnExecutor,
};
