//! Provider configuration

use std::collections::BTreeMap;
use std::str::FromStr;
use std::time::Duration;

use agent_core::error::{AgentError, Result};
use serde::{Deserialize, Serialize};

/// Wire protocol family
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
pub enum ProviderKind {
    #[default]
    #[serde(rename = "openai")]
    OpenAi,
    /// Any server speaking the OpenAI chat completions protocol
    #[serde(rename = "openai_compatible")]
    OpenAiCompatible,
    #[serde(rename = "google")]
    Google,
}

impl ProviderKind {
    pub fn default_base_url(self) -> &'static str {
        match self {
            ProviderKind::OpenAi => "https://api.openai.com/v1",
            ProviderKind::OpenAiCompatible => "http://localhost:8080/v1",
            ProviderKind::Google => "https://generativelanguage.googleapis.com",
        }
    }

    pub fn default_model(self) -> &'static str {
        match self {
            ProviderKind::OpenAi | ProviderKind::OpenAiCompatible => "gpt-4o-mini",
            ProviderKind::Google => "gemini-2.0-flash",
        }
    }
}

impl FromStr for ProviderKind {
    type Err = AgentError;

    fn from_str(s: &str) -> Result<Self> {
        match s.trim().to_ascii_lowercase().as_str() {
            "openai" => Ok(ProviderKind::OpenAi),
            "openai_compatible" | "openai-compatible" => Ok(ProviderKind::OpenAiCompatible),
            "google" | "gemini" => Ok(ProviderKind::Google),
            other => Err(AgentError::Config(format!("Unknown provider kind: {}", other))),
        }
    }
}

/// Provider configuration
#[derive(Clone, Debug, Serialize, Deserialize)]
#[serde(default)]
pub struct ProviderConfig {
    pub kind: ProviderKind,

    /// API root; the adapter appends its endpoint path.
    /// `None` means the family's public endpoint.
    pub base_url: Option<String>,

    /// `None` means the family's default model
    pub model: Option<String>,

    /// Sent verbatim with every request (API keys go here)
    pub headers: BTreeMap<String, String>,

    /// Cancellation poll cadence
    pub poll_interval_ms: u64,

    pub connect_timeout_secs: u64,

    /// Ask OpenAI-family servers for a final usage record
    pub stream_usage: bool,
}

impl Default for ProviderConfig {
    fn default() -> Self {
        Self::for_kind(ProviderKind::default())
    }
}

impl ProviderConfig {
    /// Defaults for one provider family
    pub fn for_kind(kind: ProviderKind) -> Self {
        Self {
            kind,
            base_url: None,
            model: None,
            headers: BTreeMap::new(),
            poll_interval_ms: 100,
            connect_timeout_secs: 30,
            stream_usage: false,
        }
    }

    /// Read `AGENT_PROVIDER`, `AGENT_BASE_URL` and `AGENT_MODEL`
    pub fn from_env() -> Result<Self> {
        let kind = match std::env::var("AGENT_PROVIDER") {
            Ok(value) => value.parse()?,
            Err(_) => ProviderKind::default(),
        };
        let mut config = Self::for_kind(kind);

        if let Ok(base_url) = std::env::var("AGENT_BASE_URL") {
            config.base_url = Some(base_url);
        }
        if let Ok(model) = std::env::var("AGENT_MODEL") {
            config.model = Some(model);
        }

        Ok(config)
    }

    pub fn with_header(mut self, name: impl Into<String>, value: impl Into<String>) -> Self {
        self.headers.insert(name.into(), value.into());
        self
    }

    pub fn base_url(&self) -> &str {
        self.base_url
            .as_deref()
            .unwrap_or_else(|| self.kind.default_base_url())
    }

    pub fn model(&self) -> &str {
        self.model
            .as_deref()
            .unwrap_or_else(|| self.kind.default_model())
    }

    pub fn validate(&self) -> Result<()> {
        if self.base_url().trim().is_empty() {
            return Err(AgentError::Config("Base URL must not be empty".into()));
        }
        if self.model().trim().is_empty() {
            return Err(AgentError::Config("Model must not be empty".into()));
        }
        Ok(())
    }

    pub fn poll_interval(&self) -> Duration {
        Duration::from_millis(self.poll_interval_ms.max(1))
    }

    pub fn connect_timeout(&self) -> Duration {
        Duration::from_secs(self.connect_timeout_secs)
    }
}
