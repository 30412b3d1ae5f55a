//! Streaming LLM Provider
//!
//! Binds one [`ProtocolAdapter`] to the [`StreamTransport`]. The adapter is
//! picked once, in [`build_provider`]; nothing past that point looks at the
//! vendor again.

use std::sync::Arc;

use agent_core::{
    cancel::CancellationToken,
    error::{AgentError, Result},
    message::Message,
    progress::ProgressSink,
    provider::{LlmProvider, ModelResponse, ProviderInfo},
    stream::ProtocolAdapter,
    tool::ToolSchema,
};
use async_trait::async_trait;
use reqwest::header::{HeaderMap, HeaderName, HeaderValue, CONTENT_TYPE};

use crate::config::{ProviderConfig, ProviderKind};
use crate::gemini::GeminiAdapter;
use crate::openai::OpenAiAdapter;
use crate::transport::StreamTransport;

/// `LlmProvider` speaking one vendor protocol over HTTP
pub struct StreamingProvider<A: ProtocolAdapter> {
    adapter: A,
    transport: StreamTransport,
    url: String,
    model: String,
    headers: HeaderMap,
}

impl<A: ProtocolAdapter> StreamingProvider<A> {
    /// Create from configuration
    pub fn new(adapter: A, config: &ProviderConfig) -> Result<Self> {
        config.validate()?;

        let http = reqwest::Client::builder()
            .connect_timeout(config.connect_timeout())
            .build()
            .map_err(|e| AgentError::Config(format!("Failed to build HTTP client: {}", e)))?;

        Ok(Self {
            url: adapter.request_url(config.base_url(), config.model()),
            model: config.model().to_string(),
            headers: request_headers(config)?,
            transport: StreamTransport::new(http, config.poll_interval()),
            adapter,
        })
    }

    pub fn url(&self) -> &str {
        &self.url
    }

    pub fn adapter(&self) -> &A {
        &self.adapter
    }
}

/// Configured headers, plus `Content-Type: application/json` unless set
fn request_headers(config: &ProviderConfig) -> Result<HeaderMap> {
    let mut headers = HeaderMap::new();
    for (name, value) in &config.headers {
        let name = HeaderName::from_bytes(name.as_bytes())
            .map_err(|e| AgentError::Config(format!("Invalid header name '{}': {}", name, e)))?;
        let value = HeaderValue::from_str(value)
            .map_err(|e| AgentError::Config(format!("Invalid value for header '{}': {}", name, e)))?;
        headers.insert(name, value);
    }
    if !headers.contains_key(CONTENT_TYPE) {
        headers.insert(CONTENT_TYPE, HeaderValue::from_static("application/json"));
    }
    Ok(headers)
}

#[async_trait]
impl<A: ProtocolAdapter + 'static> LlmProvider for StreamingProvider<A> {
    fn info(&self) -> ProviderInfo {
        ProviderInfo {
            name: self.adapter.name().into(),
            model: self.model.clone(),
            supports_tools: true,
        }
    }

    async fn chat(
        &self,
        messages: &[Message],
        tools: &[ToolSchema],
        progress: &mut dyn ProgressSink,
        cancel: &CancellationToken,
    ) -> ModelResponse {
        let body = self.adapter.encode_request(&self.model, messages, tools);
        tracing::debug!(
            provider = self.adapter.name(),
            model = %self.model,
            messages = messages.len(),
            tools = tools.len(),
            "Starting exchange"
        );

        let request = self
            .transport
            .client()
            .post(&self.url)
            .headers(self.headers.clone())
            .json(&body);

        self.transport
            .exchange(&self.adapter, request, progress, cancel)
            .await
    }
}

/// Pick the adapter for `config.kind` and wrap it in a provider
pub fn build_provider(config: &ProviderConfig) -> Result<Arc<dyn LlmProvider>> {
    let provider: Arc<dyn LlmProvider> = match config.kind {
        ProviderKind::OpenAi | ProviderKind::OpenAiCompatible => Arc::new(StreamingProvider::new(
            OpenAiAdapter::new(config.stream_usage),
            config,
        )?),
        ProviderKind::Google => Arc::new(StreamingProvider::new(GeminiAdapter::new(), config)?),
    };

    let info = provider.info();
    tracing::info!(provider = %info.name, model = %info.model, "Provider ready");
    Ok(provider)
}
