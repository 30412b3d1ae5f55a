//! Session Management
//!
//! The session owns the full conversation plus the small amount of working
//! state the loop keeps between turns. Persisting it is the caller's job;
//! everything here is `Serialize`/`Deserialize` for that purpose.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::message::{Conversation, Role};
use crate::tool::ToolArguments;
use crate::todo::TodoList;

/// Unique session identifier
#[derive(Clone, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct SessionId(String);

impl SessionId {
    pub fn new() -> Self {
        Self(Uuid::new_v4().to_string())
    }

    pub fn from_string(s: impl Into<String>) -> Self {
        Self(s.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl Default for SessionId {
    fn default() -> Self {
        Self::new()
    }
}

impl std::fmt::Display for SessionId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum ActionResult {
    Success,
    Failure,
    /// The turn produced nothing to act on
    NoOp,
}

/// What the agent did last, for context in later turns
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct LastAction {
    /// `tool`, `tool:path` or `tool:command`
    pub action: String,
    pub result: ActionResult,
    pub file: Option<String>,
}

impl LastAction {
    /// Describe one tool dispatch. Output starting with `Error:` is a failure.
    pub fn from_tool(name: &str, arguments: &ToolArguments, output: &str) -> Self {
        let path = arguments
            .get("path")
            .and_then(|v| v.as_str())
            .filter(|p| !p.is_empty());
        let command = arguments
            .get("command")
            .and_then(|v| v.as_str())
            .filter(|c| !c.is_empty());

        let action = match (path, command) {
            (Some(path), _) => format!("{}:{}", name, path),
            (None, Some(command)) => format!("{}:{}", name, command),
            (None, None) => name.to_string(),
        };
        let result = if is_error_output(output) {
            ActionResult::Failure
        } else {
            ActionResult::Success
        };

        Self {
            action,
            result,
            file: path.map(String::from),
        }
    }
}

/// `Error:` at the start of tool output marks failure
pub fn is_error_output(output: &str) -> bool {
    output.trim_start().starts_with("Error:")
}

/// Tool whose output describes a file it read
pub const READ_FILE_TOOL: &str = "read_file";
/// Tool whose `content` argument is written to `path`
pub const WRITE_FILE_TOOL: &str = "write_file";
/// Tool whose output is a shell command result
pub const SHELL_TOOL: &str = "execute_shell_command";

/// Most recent shell commands kept in [`Session::terminal`]
pub const TERMINAL_HISTORY_LIMIT: usize = 20;

const FILE_PREVIEW_CHARS: usize = 200;

/// A file the agent touched, with a short preview of its content
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct FileRecord {
    pub path: String,
    pub preview: String,
    /// Line count of written content; reads leave it unset
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub lines: Option<usize>,
}

/// Files read and modified during the session, one entry per path
#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct FileContext {
    pub read: Vec<FileRecord>,
    pub modified: Vec<FileRecord>,
}

impl FileContext {
    /// Replace any earlier entry for the same path
    fn upsert(records: &mut Vec<FileRecord>, record: FileRecord) {
        records.retain(|existing| existing.path != record.path);
        records.push(record);
    }

    pub fn record_read(&mut self, path: &str, output: &str) {
        Self::upsert(
            &mut self.read,
            FileRecord {
                path: path.to_string(),
                preview: preview_chars(output, FILE_PREVIEW_CHARS),
                lines: None,
            },
        );
    }

    pub fn record_write(&mut self, path: &str, content: &str) {
        Self::upsert(
            &mut self.modified,
            FileRecord {
                path: path.to_string(),
                preview: preview_chars(content, FILE_PREVIEW_CHARS),
                lines: Some(content.split('\n').count()),
            },
        );
    }

    pub fn is_empty(&self) -> bool {
        self.read.is_empty() && self.modified.is_empty()
    }
}

/// One shell command the agent ran
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct TerminalEntry {
    pub command: String,
    pub stdout: String,
    pub stderr: String,
    /// Unset when the tool did not report one
    pub exit_code: Option<i32>,
}

impl TerminalEntry {
    /// Read a shell tool result.
    ///
    /// Structured output (`{"command", "stdout", "stderr", "exit_code"}`) is
    /// taken field by field; anything else is kept whole, as stderr when it
    /// is an `Error:` text and as stdout otherwise.
    pub fn from_tool(arguments: &ToolArguments, output: &str) -> Self {
        let requested = arguments
            .get("command")
            .and_then(|v| v.as_str())
            .unwrap_or_default()
            .to_string();

        if let Ok(serde_json::Value::Object(result)) = serde_json::from_str(output) {
            let field = |name: &str| {
                result
                    .get(name)
                    .and_then(|v| v.as_str())
                    .unwrap_or_default()
                    .to_string()
            };
            let command = Some(field("command")).filter(|c| !c.is_empty()).unwrap_or(requested);
            return Self {
                command,
                stdout: field("stdout"),
                stderr: field("stderr"),
                exit_code: result
                    .get("exit_code")
                    .and_then(serde_json::Value::as_i64)
                    .and_then(|code| i32::try_from(code).ok()),
            };
        }

        let (stdout, stderr) = if is_error_output(output) {
            (String::new(), output.to_string())
        } else {
            (output.to_string(), String::new())
        };
        Self {
            command: requested,
            stdout,
            stderr,
            exit_code: None,
        }
    }
}

fn preview_chars(text: &str, limit: usize) -> String {
    let mut preview: String = text.chars().take(limit).collect();
    if text.chars().count() > limit {
        preview.push_str("...");
    }
    preview
}

/// One finished turn, summarized
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct Episode {
    pub request: String,
    pub outcome: String,
    pub timestamp: DateTime<Utc>,
}

const OUTCOME_PREVIEW_CHARS: usize = 200;

/// Build the outcome line for an episode.
///
/// Tool activity wins; a turn without tools is described by its reply.
pub fn summarize_outcome(tools_used: &[(String, bool)], final_reply: Option<&str>) -> String {
    if !tools_used.is_empty() {
        let mut names: Vec<&str> = Vec::new();
        for (name, _) in tools_used {
            if !names.contains(&name.as_str()) {
                names.push(name);
            }
        }
        let failures = tools_used.iter().filter(|(_, failed)| *failed).count();
        let mut outcome = format!(
            "ran {} tool call(s): {}",
            tools_used.len(),
            names.join(", ")
        );
        if failures > 0 {
            outcome.push_str(&format!("; {} failed", failures));
        }
        return outcome;
    }

    match final_reply.map(str::trim).filter(|r| !r.is_empty()) {
        Some(reply) => {
            let first_line = reply.lines().next().unwrap_or_default();
            let mut preview: String = first_line.chars().take(OUTCOME_PREVIEW_CHARS).collect();
            if first_line.chars().count() > OUTCOME_PREVIEW_CHARS || reply.lines().nth(1).is_some() {
                preview.push_str("...");
            }
            preview
        }
        None => "No action taken.".into(),
    }
}

/// A complete agent session
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct Session {
    /// Unique identifier
    pub id: SessionId,

    /// Full conversation history
    pub conversation: Conversation,

    /// Session to-do list
    #[serde(default)]
    pub todo: TodoList,

    /// One entry per finished turn
    #[serde(default)]
    pub episodes: Vec<Episode>,

    #[serde(default)]
    pub last_action: Option<LastAction>,

    /// Files read and written by tools
    #[serde(default)]
    pub files: FileContext,

    /// Recent shell commands, oldest first
    #[serde(default)]
    pub terminal: Vec<TerminalEntry>,

    /// Creation timestamp
    pub created_at: DateTime<Utc>,

    /// Last activity timestamp
    pub updated_at: DateTime<Utc>,
}

impl Session {
    /// Create a new session
    pub fn new() -> Self {
        let now = Utc::now();
        Self {
            id: SessionId::new(),
            conversation: Conversation::new(),
            todo: TodoList::new(),
            episodes: Vec::new(),
            last_action: None,
            files: FileContext::default(),
            terminal: Vec::new(),
            created_at: now,
            updated_at: now,
        }
    }

    /// Create with specific ID
    pub fn with_id(id: SessionId) -> Self {
        let mut session = Self::new();
        session.id = id;
        session
    }

    /// Create with system prompt
    pub fn with_system_prompt(system_prompt: impl Into<String>) -> Self {
        let mut session = Self::new();
        session.conversation = Conversation::with_system_prompt(system_prompt);
        session
    }

    /// Update the activity timestamp
    pub fn touch(&mut self) {
        self.updated_at = Utc::now();
    }

    /// Fold one tool dispatch into the working state: last action, file
    /// context and terminal history. Failed file operations are not recorded
    /// as files.
    pub fn record_tool_use(&mut self, name: &str, arguments: &ToolArguments, output: &str) {
        self.last_action = Some(LastAction::from_tool(name, arguments, output));

        if name == SHELL_TOOL {
            self.terminal.push(TerminalEntry::from_tool(arguments, output));
            if self.terminal.len() > TERMINAL_HISTORY_LIMIT {
                let excess = self.terminal.len() - TERMINAL_HISTORY_LIMIT;
                self.terminal.drain(..excess);
            }
            return;
        }

        let Some(path) = arguments
            .get("path")
            .and_then(|v| v.as_str())
            .filter(|p| !p.is_empty())
        else {
            return;
        };
        if is_error_output(output) {
            return;
        }
        match name {
            READ_FILE_TOOL => self.files.record_read(path, output),
            WRITE_FILE_TOOL => {
                let content = arguments
                    .get("content")
                    .and_then(|v| v.as_str())
                    .unwrap_or_default();
                self.files.record_write(path, content);
            }
            _ => {}
        }
    }

    pub fn record_episode(&mut self, request: &str, outcome: String) {
        self.episodes.push(Episode {
            request: request.to_string(),
            outcome,
            timestamp: Utc::now(),
        });
        self.touch();
    }

    /// External reset: drop history and working state, keep the system prompt
    pub fn reset(&mut self) {
        self.conversation.clear_history();
        self.todo = TodoList::new();
        self.episodes.clear();
        self.last_action = None;
        self.files = FileContext::default();
        self.terminal.clear();
        self.touch();
    }

    /// Title derived from the first user message
    pub fn title(&self) -> String {
        self.conversation
            .messages()
            .iter()
            .find(|m| m.role() == Role::User)
            .and_then(|m| m.content())
            .map(|content| {
                let preview: String = content.chars().take(50).collect();
                if content.chars().count() > 50 {
                    format!("{}...", preview)
                } else {
                    preview
                }
            })
            .unwrap_or_else(|| {
                let short: String = self.id.0.chars().take(8).collect();
                format!("Session {}", short)
            })
    }

    /// Message count
    pub fn message_count(&self) -> usize {
        self.conversation.len()
    }
}

impl Default for Session {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::message::Message;
    use serde_json::json;

    #[test]
    fn test_session_creation() {
        let session = Session::new();
        assert_eq!(session.message_count(), 0);
        assert!(session.title().starts_with("Session "));
    }

    #[test]
    fn test_title_from_first_user_message() {
        let mut session = Session::with_system_prompt("sys");
        session.conversation.push(Message::user("fix the build"));
        assert_eq!(session.title(), "fix the build");
    }

    #[test]
    fn test_last_action_from_tool() {
        let mut args = ToolArguments::new();
        args.insert("path".into(), json!("src/lib.rs"));
        let action = LastAction::from_tool("read_file", &args, "fn main() {}");
        assert_eq!(action.action, "read_file:src/lib.rs");
        assert_eq!(action.result, ActionResult::Success);
        assert_eq!(action.file.as_deref(), Some("src/lib.rs"));

        let mut args = ToolArguments::new();
        args.insert("command".into(), json!("cargo fmt"));
        let action = LastAction::from_tool("execute_shell_command", &args, "Error: exit 1");
        assert_eq!(action.action, "execute_shell_command:cargo fmt");
        assert_eq!(action.result, ActionResult::Failure);
        assert!(action.file.is_none());
    }

    #[test]
    fn test_title_with_non_ascii_id() {
        let session = Session::with_id(SessionId::from_string("séance-ülü-42"));
        assert_eq!(session.title(), "Session séance-ü");
    }

    fn args(pairs: &[(&str, &str)]) -> ToolArguments {
        pairs
            .iter()
            .map(|(k, v)| ((*k).to_string(), json!(v)))
            .collect()
    }

    #[test]
    fn test_file_context_dedupes_by_path() {
        let mut session = Session::new();
        let long = "x".repeat(250);

        session.record_tool_use("read_file", &args(&[("path", "a.rs")]), "old");
        session.record_tool_use("read_file", &args(&[("path", "b.rs")]), "b");
        session.record_tool_use("read_file", &args(&[("path", "a.rs")]), &long);
        session.record_tool_use("read_file", &args(&[("path", "gone.rs")]), "Error: no such file");
        session.record_tool_use(
            "write_file",
            &args(&[("path", "a.rs"), ("content", "fn a() {}\nfn b() {}")]),
            "File written.",
        );

        let read: Vec<&str> = session.files.read.iter().map(|f| f.path.as_str()).collect();
        assert_eq!(read, vec!["b.rs", "a.rs"]);
        let a = &session.files.read[1];
        assert_eq!(a.preview.chars().count(), 203);
        assert!(a.preview.ends_with("..."));

        assert_eq!(session.files.modified.len(), 1);
        assert_eq!(session.files.modified[0].lines, Some(2));
        assert_eq!(session.files.modified[0].preview, "fn a() {}\nfn b() {}");
        assert_eq!(session.last_action.as_ref().unwrap().action, "write_file:a.rs");
    }

    #[test]
    fn test_terminal_history_keeps_last_twenty() {
        let mut session = Session::new();
        for i in 0..25 {
            let command = format!("echo {}", i);
            let output = json!({"command": command, "stdout": i.to_string(), "stderr": "", "exit_code": 0});
            session.record_tool_use("execute_shell_command", &args(&[("command", command.as_str())]), &output.to_string());
        }

        assert_eq!(session.terminal.len(), TERMINAL_HISTORY_LIMIT);
        assert_eq!(session.terminal[0].command, "echo 5");
        assert_eq!(session.terminal[19].stdout, "24");
        assert_eq!(session.terminal[19].exit_code, Some(0));
        assert!(session.files.is_empty());
    }

    #[test]
    fn test_terminal_entry_from_plain_output() {
        let entry = TerminalEntry::from_tool(&args(&[("command", "make")]), "Error: exit status 2");
        assert_eq!(entry.command, "make");
        assert!(entry.stdout.is_empty());
        assert_eq!(entry.stderr, "Error: exit status 2");
        assert_eq!(entry.exit_code, None);
    }

    #[test]
    fn test_summarize_outcome() {
        assert_eq!(summarize_outcome(&[], None), "No action taken.");
        assert_eq!(summarize_outcome(&[], Some("Done.")), "Done.");
        assert_eq!(summarize_outcome(&[], Some("Done.\nMore")), "Done....");

        let tools = vec![
            ("read_file".to_string(), false),
            ("read_file".to_string(), false),
            ("write_file".to_string(), true),
        ];
        assert_eq!(
            summarize_outcome(&tools, Some("ignored")),
            "ran 3 tool call(s): read_file, write_file; 1 failed"
        );
    }

    #[test]
    fn test_reset_keeps_system_prompt() {
        let mut session = Session::with_system_prompt("sys");
        session.conversation.push(Message::user("hi"));
        session.todo.add("x");
        session.record_episode("hi", "said hi".into());
        session.record_tool_use("read_file", &args(&[("path", "a.rs")]), "a");
        session.record_tool_use("execute_shell_command", &args(&[("command", "ls")]), "a.rs");

        session.reset();
        assert!(session.files.is_empty());
        assert!(session.terminal.is_empty());
        assert_eq!(session.message_count(), 1);
        assert!(session.todo.items().is_empty());
        assert!(session.episodes.is_empty());
    }
}
