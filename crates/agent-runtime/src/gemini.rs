//! Google Gemini `streamGenerateContent` protocol
//!
//! The endpoint streams either a JSON array of response envelopes (the
//! default) or SSE `data:` records (`alt=sse`). The mode is picked from the
//! first non-blank byte of the body.

use agent_core::{
    message::{Message, Role},
    provider::UsageStats,
    stream::{ProtocolAdapter, StreamDelta, ToolCallDelta},
    tool::ToolSchema,
};
use serde_json::{json, Map, Value};

use crate::framing::{sse_data, JsonArrayScanner, LineBuffer};
use crate::openai::token_count;

#[derive(Debug)]
enum Mode {
    Array(JsonArrayScanner),
    Sse(LineBuffer),
}

/// Framing state for one Gemini exchange
#[derive(Debug, Default)]
pub struct GeminiFraming {
    mode: Option<Mode>,
    /// Function calls arrive whole; each takes the next index
    next_call_index: usize,
}

/// Gemini adapter
#[derive(Clone, Debug, Default)]
pub struct GeminiAdapter;

impl GeminiAdapter {
    pub fn new() -> Self {
        Self
    }

    fn text_parts(text: &str) -> Value {
        json!([{ "text": text }])
    }

    /// Parsed argument object; anything else becomes `{}`
    fn call_args(arguments: &str) -> Value {
        match serde_json::from_str::<Value>(arguments) {
            Ok(Value::Object(map)) => Value::Object(map),
            _ => Value::Object(Map::new()),
        }
    }

    fn encode_contents(messages: &[Message]) -> (Vec<Value>, Option<Value>) {
        let mut contents = Vec::new();
        let mut system_instruction = None;

        for message in messages {
            match message.role() {
                Role::System => {
                    system_instruction = Some(json!({
                        "parts": Self::text_parts(message.content().unwrap_or_default()),
                    }));
                }
                Role::Tool => contents.push(json!({
                    "role": "user",
                    "parts": [{
                        "functionResponse": {
                            "name": message.name(),
                            "response": { "content": message.content().unwrap_or_default() },
                        }
                    }],
                })),
                Role::Assistant if message.has_tool_calls() => {
                    let parts: Vec<Value> = message
                        .tool_calls()
                        .iter()
                        .map(|call| {
                            json!({
                                "functionCall": {
                                    "name": call.name,
                                    "args": Self::call_args(&call.arguments),
                                }
                            })
                        })
                        .collect();
                    contents.push(json!({ "role": "model", "parts": parts }));
                }
                Role::Assistant => {
                    if let Some(text) = message.content() {
                        contents.push(json!({ "role": "model", "parts": Self::text_parts(text) }));
                    }
                }
                Role::User => {
                    if let Some(text) = message.content() {
                        contents.push(json!({ "role": "user", "parts": Self::text_parts(text) }));
                    }
                }
            }
        }

        (contents, system_instruction)
    }

    /// Deltas carried by one response envelope
    fn envelope_deltas(envelope: &Value, next_call_index: &mut usize) -> Vec<StreamDelta> {
        let mut deltas = Vec::new();

        if let Some(parts) = envelope["candidates"][0]["content"]["parts"].as_array() {
            for part in parts {
                if let Some(text) = part["text"].as_str().filter(|t| !t.is_empty()) {
                    deltas.push(StreamDelta::Text(text.to_string()));
                }
                if let Some(call) = part.get("functionCall").filter(|c| c.is_object()) {
                    let arguments = match call.get("args") {
                        Some(args) if !args.is_null() => args.to_string(),
                        _ => "{}".to_string(),
                    };
                    deltas.push(StreamDelta::ToolCall(ToolCallDelta {
                        index: *next_call_index,
                        id: call["id"].as_str().map(String::from),
                        name: call["name"].as_str().map(String::from),
                        arguments: Some(arguments),
                    }));
                    *next_call_index += 1;
                }
            }
        }

        if let Some(usage) = envelope.get("usageMetadata").filter(|u| u.is_object()) {
            deltas.push(StreamDelta::Usage(UsageStats::new(
                token_count(&usage["promptTokenCount"]),
                token_count(&usage["candidatesTokenCount"]),
            )));
        }

        deltas
    }

    fn parse_envelope(raw: &[u8], next_call_index: &mut usize) -> Vec<StreamDelta> {
        match serde_json::from_slice::<Value>(raw) {
            Ok(envelope) => Self::envelope_deltas(&envelope, next_call_index),
            Err(err) => {
                tracing::trace!(error = %err, "Skipping unparseable stream record");
                Vec::new()
            }
        }
    }

    fn parse_sse_line(line: &str, next_call_index: &mut usize) -> Vec<StreamDelta> {
        match sse_data(line) {
            Some(data) if !data.is_empty() && data != "[DONE]" => {
                Self::parse_envelope(data.as_bytes(), next_call_index)
            }
            _ => Vec::new(),
        }
    }
}

impl ProtocolAdapter for GeminiAdapter {
    type Framing = GeminiFraming;

    fn name(&self) -> &'static str {
        "google"
    }

    fn request_url(&self, base_url: &str, model: &str) -> String {
        format!(
            "{}/v1beta/models/{}:streamGenerateContent",
            base_url.trim_end_matches('/'),
            model
        )
    }

    fn encode_request(&self, _model: &str, messages: &[Message], tools: &[ToolSchema]) -> Value {
        let (contents, system_instruction) = Self::encode_contents(messages);
        let mut body = json!({ "contents": contents });

        if let Some(instruction) = system_instruction {
            body["system_instruction"] = instruction;
        }
        if !tools.is_empty() {
            let declarations: Vec<Value> = tools
                .iter()
                .map(|tool| {
                    json!({
                        "name": tool.name,
                        "description": tool.description,
                        "parameters": tool.parameters,
                    })
                })
                .collect();
            body["tools"] = json!([{ "functionDeclarations": declarations }]);
        }

        body
    }

    fn parse_chunk(&self, chunk: &[u8], framing: &mut GeminiFraming) -> Vec<StreamDelta> {
        let mut chunk = chunk;
        if framing.mode.is_none() {
            let Some(start) = chunk.iter().position(|b| !b.is_ascii_whitespace()) else {
                return Vec::new();
            };
            let mode = if matches!(chunk[start], b'[' | b'{') {
                Mode::Array(JsonArrayScanner::new())
            } else {
                Mode::Sse(LineBuffer::new())
            };
            tracing::trace!(array = matches!(mode, Mode::Array(_)), "Detected stream framing");
            framing.mode = Some(mode);
            chunk = &chunk[start..];
        }

        let next_call_index = &mut framing.next_call_index;
        match &mut framing.mode {
            Some(Mode::Array(scanner)) => scanner
                .push(chunk)
                .iter()
                .flat_map(|raw| Self::parse_envelope(raw, next_call_index))
                .collect(),
            Some(Mode::Sse(lines)) => lines
                .push(chunk)
                .iter()
                .flat_map(|line| Self::parse_sse_line(line, next_call_index))
                .collect(),
            None => Vec::new(),
        }
    }

    fn parse_remainder(&self, framing: &mut GeminiFraming) -> Vec<StreamDelta> {
        match &mut framing.mode {
            Some(Mode::Sse(lines)) => match lines.take_remainder() {
                Some(line) => Self::parse_sse_line(&line, &mut framing.next_call_index),
                None => Vec::new(),
            },
            Some(Mode::Array(scanner)) => {
                if scanner.has_partial() {
                    tracing::trace!("Stream ended inside a response envelope");
                }
                Vec::new()
            }
            None => Vec::new(),
        }
    }
}
