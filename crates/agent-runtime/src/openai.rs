//! OpenAI Chat Completions protocol
//!
//! Also spoken by most self-hosted and third-party gateways, which is why
//! `openai_compatible` providers share this adapter.

use agent_core::{
    message::{Message, Role},
    provider::UsageStats,
    stream::{ProtocolAdapter, StreamDelta, ToolCallDelta},
    tool::ToolSchema,
};
use serde_json::{json, Value};

use crate::framing::{sse_data, LineBuffer};

/// Framing state: partial SSE line plus the `[DONE]` marker
#[derive(Debug, Default)]
pub struct OpenAiFraming {
    lines: LineBuffer,
    done: bool,
}

/// OpenAI-style SSE adapter
#[derive(Clone, Debug, Default)]
pub struct OpenAiAdapter {
    /// Ask for a final usage record (`stream_options.include_usage`)
    stream_usage: bool,
}

impl OpenAiAdapter {
    pub fn new(stream_usage: bool) -> Self {
        Self { stream_usage }
    }

    fn encode_message(message: &Message) -> Value {
        match message.role() {
            Role::Assistant if message.has_tool_calls() => {
                let calls: Vec<Value> = message
                    .tool_calls()
                    .iter()
                    .map(|call| {
                        json!({
                            "id": call.id,
                            "type": "function",
                            "function": {
                                "name": call.name,
                                "arguments": call.arguments,
                            }
                        })
                    })
                    .collect();
                json!({
                    "role": "assistant",
                    "content": Value::Null,
                    "tool_calls": calls,
                })
            }
            Role::Tool => json!({
                "role": "tool",
                "tool_call_id": message.tool_call_id(),
                "name": message.name(),
                "content": message.content().unwrap_or_default(),
            }),
            role => json!({
                "role": role.to_string(),
                "content": message.content().unwrap_or_default(),
            }),
        }
    }

    fn encode_tool(tool: &ToolSchema) -> Value {
        json!({
            "type": "function",
            "function": {
                "name": tool.name,
                "description": tool.description,
                "parameters": tool.parameters,
            }
        })
    }

    /// Deltas carried by one `data:` record
    fn record_deltas(record: &Value) -> Vec<StreamDelta> {
        let mut deltas = Vec::new();
        let delta = &record["choices"][0]["delta"];

        if let Some(text) = delta["content"].as_str().filter(|t| !t.is_empty()) {
            deltas.push(StreamDelta::Text(text.to_string()));
        }

        if let Some(calls) = delta["tool_calls"].as_array() {
            for (position, call) in calls.iter().enumerate() {
                let index = call["index"]
                    .as_u64()
                    .and_then(|i| usize::try_from(i).ok())
                    .unwrap_or(position);
                deltas.push(StreamDelta::ToolCall(ToolCallDelta {
                    index,
                    id: call["id"].as_str().map(String::from),
                    name: call["function"]["name"].as_str().map(String::from),
                    arguments: call["function"]["arguments"].as_str().map(String::from),
                }));
            }
        }

        if let Some(usage) = record.get("usage").filter(|u| u.is_object()) {
            deltas.push(StreamDelta::Usage(UsageStats::new(
                token_count(&usage["prompt_tokens"]),
                token_count(&usage["completion_tokens"]),
            )));
        }

        deltas
    }

    fn line_deltas(line: &str, framing: &mut OpenAiFraming) -> Vec<StreamDelta> {
        if framing.done {
            return Vec::new();
        }
        let Some(data) = sse_data(line) else {
            return Vec::new();
        };
        if data.is_empty() {
            return Vec::new();
        }
        if data == "[DONE]" {
            framing.done = true;
            return Vec::new();
        }

        match serde_json::from_str::<Value>(data) {
            Ok(record) => Self::record_deltas(&record),
            Err(err) => {
                tracing::trace!(error = %err, "Skipping unparseable stream record");
                Vec::new()
            }
        }
    }
}

pub(crate) fn token_count(value: &Value) -> u32 {
    value
        .as_u64()
        .and_then(|n| u32::try_from(n).ok())
        .unwrap_or(0)
}

impl ProtocolAdapter for OpenAiAdapter {
    type Framing = OpenAiFraming;

    fn name(&self) -> &'static str {
        "openai"
    }

    fn request_url(&self, base_url: &str, _model: &str) -> String {
        if base_url.contains("chat/completions") {
            base_url.to_string()
        } else {
            format!("{}/chat/completions", base_url.trim_end_matches('/'))
        }
    }

    fn encode_request(&self, model: &str, messages: &[Message], tools: &[ToolSchema]) -> Value {
        let mut body = json!({
            "model": model,
            "messages": messages.iter().map(Self::encode_message).collect::<Vec<_>>(),
            "stream": true,
        });

        if !tools.is_empty() {
            body["tools"] = tools.iter().map(Self::encode_tool).collect();
            body["tool_choice"] = json!("auto");
        }
        if self.stream_usage {
            body["stream_options"] = json!({ "include_usage": true });
        }

        body
    }

    fn parse_chunk(&self, chunk: &[u8], framing: &mut OpenAiFraming) -> Vec<StreamDelta> {
        let lines = framing.lines.push(chunk);
        lines
            .iter()
            .flat_map(|line| Self::line_deltas(line, framing))
            .collect()
    }

    fn parse_remainder(&self, framing: &mut OpenAiFraming) -> Vec<StreamDelta> {
        match framing.lines.take_remainder() {
            Some(line) => Self::line_deltas(&line, framing),
            None => Vec::new(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use agent_core::message::ToolCallRequest;
    use agent_core::stream::StreamState;

    fn text_record(text: &str) -> String {
        format!("data: {}\n\n", json!({"choices": [{"delta": {"content": text}}]}))
    }

    fn decode_in_pieces(body: &[u8], split: usize) -> agent_core::ModelResponse {
        let adapter = OpenAiAdapter::default();
        let mut state = StreamState::new();
        adapter.decode_chunk(&body[..split], &mut state);
        adapter.decode_chunk(&body[split..], &mut state);
        adapter.finalize(state)
    }

    #[test]
    fn test_text_stream() {
        let adapter = OpenAiAdapter::default();
        let mut state = StreamState::new();

        let first = adapter.decode_chunk(text_record("Hel").as_bytes(), &mut state);
        assert_eq!(first, vec![StreamDelta::Text("Hel".into())]);
        let second = adapter.decode_chunk(
            format!("{}data: [DONE]\n\n", text_record("lo")).as_bytes(),
            &mut state,
        );
        assert_eq!(second, vec![StreamDelta::Text("lo".into())]);

        let response = adapter.finalize(state);
        assert_eq!(response.content.as_deref(), Some("Hello"));
        assert!(response.tool_calls.is_empty());
        assert!(response.usage.is_none());
    }

    #[test]
    fn test_hello_scenario() {
        let body = "data: {\"choices\":[{\"delta\":{\"content\":\"Hel\"}}]}\n\ndata: {\"choices\":[{\"delta\":{\"content\":\"lo\"}}]}\n\ndata: [DONE]\n";
        let response = OpenAiAdapter::default().decode_complete(body.as_bytes());
        assert_eq!(response.content.as_deref(), Some("Hello"));
        assert!(response.tool_calls.is_empty());
    }

    /// Text in two records, one tool call split across two, then usage
    fn mixed_body() -> String {
        let mut body = String::new();
        body.push_str(": keep-alive\n");
        body.push_str(&text_record("Grüße, "));
        body.push_str(&text_record("wörld ✓"));
        body.push_str(
            "data: {\"choices\":[{\"delta\":{\"tool_calls\":[{\"index\":0,\"id\":\"call_9\",\"function\":{\"name\":\"read_file\",\"arguments\":\"{\\\"pa\"}}]}}]}\n\n",
        );
        body.push_str(
            "data: {\"choices\":[{\"delta\":{\"tool_calls\":[{\"index\":0,\"function\":{\"arguments\":\"th\\\": \\\"a.rs\\\"}\"}}]}}]}\n\n",
        );
        body.push_str("data: {\"choices\":[],\"usage\":{\"prompt_tokens\":12,\"completion_tokens\":7}}\n\n");
        body.push_str("data: [DONE]\n\n");
        body
    }

    fn decode_in_chunks<'a>(chunks: impl IntoIterator<Item = &'a [u8]>) -> agent_core::ModelResponse {
        let adapter = OpenAiAdapter::default();
        let mut state = StreamState::new();
        for chunk in chunks {
            adapter.decode_chunk(chunk, &mut state);
        }
        adapter.finalize(state)
    }

    #[test]
    fn test_chunk_boundaries_do_not_matter() {
        let body = mixed_body();
        let body = body.as_bytes();

        let whole = OpenAiAdapter::default().decode_complete(body);
        assert_eq!(whole.tool_calls[0].arguments, r#"{"path": "a.rs"}"#);
        assert_eq!(whole.usage, Some(UsageStats::new(12, 7)));

        for split in 0..=body.len() {
            let response = decode_in_pieces(body, split);
            assert_eq!(response.content, whole.content, "split at {}", split);
            assert_eq!(response.tool_calls, whole.tool_calls, "split at {}", split);
            assert_eq!(response.usage, whole.usage, "split at {}", split);
        }
    }

    #[test]
    fn test_byte_at_a_time_and_three_way_splits() {
        let body = mixed_body();
        let body = body.as_bytes();
        let whole = OpenAiAdapter::default().decode_complete(body);

        let trickled = decode_in_chunks(body.chunks(1));
        assert_eq!(trickled.content, whole.content);
        assert_eq!(trickled.tool_calls, whole.tool_calls);
        assert_eq!(trickled.usage, whole.usage);

        for first in (0..=body.len()).step_by(5) {
            for second in (first..=body.len()).step_by(3) {
                let response = decode_in_chunks([&body[..first], &body[first..second], &body[second..]]);
                assert_eq!(response.content, whole.content, "splits at {} and {}", first, second);
                assert_eq!(response.tool_calls, whole.tool_calls, "splits at {} and {}", first, second);
                assert_eq!(response.usage, whole.usage, "splits at {} and {}", first, second);
            }
        }
    }

    #[test]
    fn test_oversized_usage_saturates() {
        let body = concat!(
            "data: {\"choices\":[],\"usage\":{\"prompt_tokens\":4000000000,\"completion_tokens\":1000000000}}\n\n",
            "data: [DONE]\n\n",
        );
        let usage = OpenAiAdapter::default()
            .decode_complete(body.as_bytes())
            .usage
            .unwrap();
        assert_eq!(usage.prompt_tokens, 4_000_000_000);
        assert_eq!(usage.total_tokens, u32::MAX);
    }

    #[test]
    fn test_tool_name_fragments() {
        let body = concat!(
            "data: {\"choices\":[{\"delta\":{\"tool_calls\":[{\"index\":0,\"id\":\"c1\",\"function\":{\"name\":\"get_\",\"arguments\":\"\"}}]}}]}\n\n",
            "data: {\"choices\":[{\"delta\":{\"tool_calls\":[{\"index\":0,\"function\":{\"name\":\"time\",\"arguments\":\"{}\"}}]}}]}\n\n",
            "data: [DONE]\n\n",
        );

        let response = OpenAiAdapter::default().decode_complete(body.as_bytes());
        assert_eq!(
            response.tool_calls,
            vec![ToolCallRequest::new("c1", "get_time", "{}")]
        );
        let message = response.to_message().unwrap();
        assert!(message.content().is_none());
    }

    #[test]
    fn test_garbage_records_are_skipped() {
        let body = format!(
            "data: {{not json\n\nevent: ping\n\n{}data: [DONE]\n\n{}",
            text_record("ok"),
            text_record("after done"),
        );
        let response = OpenAiAdapter::default().decode_complete(body.as_bytes());
        assert_eq!(response.content.as_deref(), Some("ok"));
    }

    #[test]
    fn test_unterminated_last_record_is_flushed() {
        let body = "data: {\"choices\":[{\"delta\":{\"content\":\"tail\"}}]}";
        let response = OpenAiAdapter::default().decode_complete(body.as_bytes());
        assert_eq!(response.content.as_deref(), Some("tail"));
    }

    #[test]
    fn test_encode_request() {
        let call = ToolCallRequest::new("call_1", "read_file", r#"{"path":"a.rs"}"#);
        let messages = vec![
            Message::system("sys"),
            Message::user("read a.rs"),
            Message::assistant_tool_calls(vec![call]).unwrap(),
            Message::tool_result("call_1", "read_file", "fn a() {}"),
        ];
        let tools = vec![ToolSchema::new("read_file", "Read", json!({"type": "object"}))];

        let body = OpenAiAdapter::new(true).encode_request("gpt-4o", &messages, &tools);

        assert_eq!(body["model"], "gpt-4o");
        assert_eq!(body["stream"], true);
        assert_eq!(body["tool_choice"], "auto");
        assert_eq!(body["stream_options"]["include_usage"], true);
        assert_eq!(body["tools"][0]["function"]["name"], "read_file");

        let encoded = body["messages"].as_array().unwrap();
        assert_eq!(encoded[0], json!({"role": "system", "content": "sys"}));
        assert!(encoded[2]["content"].is_null());
        assert_eq!(encoded[2]["tool_calls"][0]["type"], "function");
        assert_eq!(encoded[2]["tool_calls"][0]["function"]["arguments"], r#"{"path":"a.rs"}"#);
        assert_eq!(
            encoded[3],
            json!({"role": "tool", "tool_call_id": "call_1", "name": "read_file", "content": "fn a() {}"})
        );
    }

    #[test]
    fn test_encode_without_tools() {
        let body = OpenAiAdapter::default().encode_request("m", &[Message::user("hi")], &[]);
        assert!(body.get("tools").is_none());
        assert!(body.get("tool_choice").is_none());
        assert!(body.get("stream_options").is_none());
    }

    #[test]
    fn test_request_url() {
        let adapter = OpenAiAdapter::default();
        assert_eq!(
            adapter.request_url("https://api.openai.com/v1/", "m"),
            "https://api.openai.com/v1/chat/completions"
        );
        assert_eq!(
            adapter.request_url("http://localhost:8080/v1/chat/completions", "m"),
            "http://localhost:8080/v1/chat/completions"
        );
    }
}
