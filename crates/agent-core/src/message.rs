//! Conversation Messages
//!
//! Provider-agnostic message format shared by the loop and every adapter.
//! Constructors are the only way to build a message, which keeps two shape
//! rules true everywhere:
//!
//! - an assistant message carries text *or* tool calls, never both
//! - a tool message always names the call it answers and the tool that ran

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Role of a message sender
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Role {
    /// System prompt/instructions
    System,
    /// User input
    User,
    /// Assistant (LLM) response
    Assistant,
    /// Tool result (answers one tool call)
    Tool,
}

impl std::fmt::Display for Role {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Role::System => write!(f, "system"),
            Role::User => write!(f, "user"),
            Role::Assistant => write!(f, "assistant"),
            Role::Tool => write!(f, "tool"),
        }
    }
}

/// A tool invocation requested by the model
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct ToolCallRequest {
    /// Correlation id, unique within one assistant message
    pub id: String,

    /// Tool name
    pub name: String,

    /// Raw JSON argument text
    pub arguments: String,
}

impl ToolCallRequest {
    pub fn new(id: impl Into<String>, name: impl Into<String>, arguments: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            name: name.into(),
            arguments: arguments.into(),
        }
    }

    /// Parse the argument text into a JSON object.
    ///
    /// Empty or whitespace-only text means "no arguments".
    pub fn parsed_arguments(&self) -> crate::Result<serde_json::Map<String, serde_json::Value>> {
        if self.arguments.trim().is_empty() {
            return Ok(serde_json::Map::new());
        }
        match serde_json::from_str::<serde_json::Value>(&self.arguments)? {
            serde_json::Value::Object(map) => Ok(map),
            serde_json::Value::Null => Ok(serde_json::Map::new()),
            other => Err(crate::AgentError::Parse(format!(
                "expected a JSON object, got {}",
                other
            ))),
        }
    }
}

/// A single message in a conversation
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct Message {
    role: Role,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    content: Option<String>,

    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    tool_calls: Vec<ToolCallRequest>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    tool_call_id: Option<String>,

    /// Tool name, for tool messages
    #[serde(default, skip_serializing_if = "Option::is_none")]
    name: Option<String>,

    #[serde(default = "Utc::now")]
    timestamp: DateTime<Utc>,
}

impl Message {
    fn new(role: Role, content: Option<String>) -> Self {
        Self {
            role,
            content,
            tool_calls: Vec::new(),
            tool_call_id: None,
            name: None,
            timestamp: Utc::now(),
        }
    }

    /// Create a system message
    pub fn system(content: impl Into<String>) -> Self {
        Self::new(Role::System, Some(content.into()))
    }

    /// Create a user message
    pub fn user(content: impl Into<String>) -> Self {
        Self::new(Role::User, Some(content.into()))
    }

    /// Create a text-only assistant message
    pub fn assistant(content: impl Into<String>) -> Self {
        Self::new(Role::Assistant, Some(content.into()))
    }

    /// Create an assistant message that requests tools.
    ///
    /// Returns `None` for an empty call list, since such a message would carry
    /// neither text nor calls.
    pub fn assistant_tool_calls(calls: Vec<ToolCallRequest>) -> Option<Self> {
        if calls.is_empty() {
            return None;
        }
        let mut msg = Self::new(Role::Assistant, None);
        msg.tool_calls = calls;
        Some(msg)
    }

    /// Create the result message answering one tool call
    pub fn tool_result(
        tool_call_id: impl Into<String>,
        name: impl Into<String>,
        content: impl Into<String>,
    ) -> Self {
        let mut msg = Self::new(Role::Tool, Some(content.into()));
        msg.tool_call_id = Some(tool_call_id.into());
        msg.name = Some(name.into());
        msg
    }

    pub fn role(&self) -> Role {
        self.role
    }

    pub fn content(&self) -> Option<&str> {
        self.content.as_deref()
    }

    pub fn tool_calls(&self) -> &[ToolCallRequest] {
        &self.tool_calls
    }

    pub fn has_tool_calls(&self) -> bool {
        !self.tool_calls.is_empty()
    }

    pub fn tool_call_id(&self) -> Option<&str> {
        self.tool_call_id.as_deref()
    }

    pub fn name(&self) -> Option<&str> {
        self.name.as_deref()
    }

    pub fn timestamp(&self) -> DateTime<Utc> {
        self.timestamp
    }

    /// Estimate token count (rough approximation)
    pub fn estimate_tokens(&self) -> u32 {
        let text = self.content.as_deref().map_or(0, str::len);
        let calls: usize = self
            .tool_calls
            .iter()
            .map(|c| c.name.len() + c.arguments.len())
            .sum();
        // ~4 characters per token, +4 for role overhead
        ((text + calls) / 4) as u32 + 4
    }
}

/// Ordered, append-only conversation history.
///
/// Element 0 is the system message once [`Conversation::ensure_system_prompt`]
/// has run.
#[derive(Clone, Debug, Default, Serialize, Deserialize)]
pub struct Conversation {
    messages: Vec<Message>,
}

impl Conversation {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_system_prompt(prompt: impl Into<String>) -> Self {
        let mut conv = Self::new();
        conv.push(Message::system(prompt));
        conv
    }

    /// Put `prompt` at index 0 unless a system message is already there.
    pub fn ensure_system_prompt(&mut self, prompt: &str) {
        if self.messages.first().map(Message::role) != Some(Role::System) {
            self.messages.insert(0, Message::system(prompt));
        }
    }

    /// The system message, if present
    pub fn system_message(&self) -> Option<&Message> {
        self.messages.first().filter(|m| m.role == Role::System)
    }

    /// A fresh conversation holding only this one's system message.
    ///
    /// The loop grows this view during a turn and sends it instead of the
    /// full history, so request size stays bounded.
    pub fn turn_scoped(&self) -> Conversation {
        Conversation {
            messages: self.system_message().cloned().into_iter().collect(),
        }
    }

    /// Add a message
    pub fn push(&mut self, message: Message) {
        self.messages.push(message);
    }

    /// Get all messages
    pub fn messages(&self) -> &[Message] {
        &self.messages
    }

    /// Get the last message
    pub fn last(&self) -> Option<&Message> {
        self.messages.last()
    }

    /// Clear all messages except the system prompt (external session reset)
    pub fn clear_history(&mut self) {
        self.messages.retain(|m| m.role == Role::System);
    }

    /// Estimate total tokens in conversation
    pub fn estimate_tokens(&self) -> u32 {
        self.messages.iter().map(Message::estimate_tokens).sum()
    }

    /// Number of messages
    pub fn len(&self) -> usize {
        self.messages.len()
    }

    /// Check if empty
    pub fn is_empty(&self) -> bool {
        self.messages.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_message_creation() {
        let msg = Message::user("Hello");
        assert_eq!(msg.role(), Role::User);
        assert_eq!(msg.content(), Some("Hello"));
        assert!(!msg.has_tool_calls());
    }

    #[test]
    fn test_assistant_tool_call_message_has_no_content() {
        let msg = Message::assistant_tool_calls(vec![ToolCallRequest::new("c1", "ls", "{}")])
            .unwrap();
        assert_eq!(msg.role(), Role::Assistant);
        assert!(msg.content().is_none());
        assert_eq!(msg.tool_calls().len(), 1);

        assert!(Message::assistant_tool_calls(Vec::new()).is_none());
    }

    #[test]
    fn test_tool_result_carries_id_and_name() {
        let msg = Message::tool_result("c1", "read_file", "data");
        assert_eq!(msg.role(), Role::Tool);
        assert_eq!(msg.tool_call_id(), Some("c1"));
        assert_eq!(msg.name(), Some("read_file"));
    }

    #[test]
    fn test_parsed_arguments() {
        let call = ToolCallRequest::new("c1", "x", r#"{"path": "a.rs"}"#);
        assert_eq!(call.parsed_arguments().unwrap()["path"], "a.rs");

        assert!(ToolCallRequest::new("c", "x", "  ").parsed_arguments().unwrap().is_empty());
        assert!(ToolCallRequest::new("c", "x", "[1]").parsed_arguments().is_err());
        assert!(ToolCallRequest::new("c", "x", "{oops").parsed_arguments().is_err());
    }

    #[test]
    fn test_conversation() {
        let mut conv = Conversation::with_system_prompt("You are helpful.");
        conv.push(Message::user("Hi"));
        conv.push(Message::assistant("Hello!"));

        assert_eq!(conv.len(), 3);
        assert!(conv.last().unwrap().role() == Role::Assistant);
    }

    #[test]
    fn test_ensure_system_prompt_only_once() {
        let mut conv = Conversation::new();
        conv.push(Message::user("early"));
        conv.ensure_system_prompt("sys");
        conv.ensure_system_prompt("other");

        assert_eq!(conv.len(), 2);
        assert_eq!(conv.messages()[0].content(), Some("sys"));
    }

    #[test]
    fn test_turn_scoped_keeps_only_system() {
        let mut conv = Conversation::with_system_prompt("sys");
        conv.push(Message::user("one"));
        conv.push(Message::assistant("two"));

        let turn = conv.turn_scoped();
        assert_eq!(turn.len(), 1);
        assert_eq!(turn.messages()[0].role(), Role::System);
    }

    #[test]
    fn test_clear_history_keeps_system() {
        let mut conv = Conversation::with_system_prompt("sys");
        conv.push(Message::user("one"));
        conv.clear_history();
        assert_eq!(conv.len(), 1);
    }

    #[test]
    fn test_serde_round_trip_preserves_shape() {
        let msg = Message::tool_result("c9", "ls", "out");
        let json = serde_json::to_value(&msg).unwrap();
        assert_eq!(json["role"], "tool");
        assert_eq!(json["tool_call_id"], "c9");
        assert!(json.get("tool_calls").is_none());
    }
}
