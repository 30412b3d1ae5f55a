//! Session to-do list and the built-in tools that edit it.
//!
//! These three tools are answered by the loop itself instead of the tool
//! registry, because they mutate session state the registry cannot see.

use serde::{Deserialize, Serialize};
use serde_json::json;

use crate::tool::{ToolArguments, ToolSchema};

pub const ADD_TODO: &str = "add_todo";
pub const MARK_TODO_DONE: &str = "mark_todo_done";
pub const LIST_TODOS: &str = "list_todos";

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct TodoItem {
    pub text: String,
    pub done: bool,
}

#[derive(Clone, Debug, Default, Serialize, Deserialize)]
pub struct TodoList {
    items: Vec<TodoItem>,
}

impl TodoList {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn items(&self) -> &[TodoItem] {
        &self.items
    }

    pub fn is_builtin_tool(name: &str) -> bool {
        matches!(name, ADD_TODO | MARK_TODO_DONE | LIST_TODOS)
    }

    /// Schemas offered to the model next to the registry's tools
    pub fn tool_schemas() -> Vec<ToolSchema> {
        let text_param = json!({
            "type": "object",
            "properties": {
                "text": { "type": "string", "description": "The task text." }
            },
            "required": ["text"]
        });
        vec![
            ToolSchema::new(
                ADD_TODO,
                "Adds a new task to the to-do list for the current session.",
                text_param.clone(),
            ),
            ToolSchema::new(
                MARK_TODO_DONE,
                "Marks a task on the session to-do list as done.",
                text_param,
            ),
            ToolSchema::new(
                LIST_TODOS,
                "Lists all tasks on the session to-do list with their status.",
                json!({ "type": "object", "properties": {} }),
            ),
        ]
    }

    /// Answer one built-in tool call. `None` if `name` is not a to-do tool.
    pub fn handle(&mut self, name: &str, arguments: &ToolArguments) -> Option<String> {
        let text = arguments.get("text").and_then(|v| v.as_str()).map(str::trim);
        let reply = match name {
            ADD_TODO => match text.filter(|t| !t.is_empty()) {
                Some(text) => self.add(text),
                None => "Error: Task text is required to add a to-do.".into(),
            },
            MARK_TODO_DONE => match text.filter(|t| !t.is_empty()) {
                Some(text) => self.mark_done(text),
                None => "Error: Task text is required to mark a to-do as done.".into(),
            },
            LIST_TODOS => self.render(),
            _ => return None,
        };
        Some(reply)
    }

    pub fn add(&mut self, text: &str) -> String {
        if self.items.iter().any(|item| item.text == text) {
            return format!("Task '{}' already exists in the to-do list.", text);
        }
        self.items.push(TodoItem {
            text: text.to_string(),
            done: false,
        });
        format!("Task '{}' added to the to-do list.", text)
    }

    pub fn mark_done(&mut self, text: &str) -> String {
        match self.items.iter_mut().find(|item| item.text == text) {
            Some(item) => {
                item.done = true;
                format!("Task '{}' marked as done.", text)
            }
            None => format!("Error: Task '{}' not found in the to-do list.", text),
        }
    }

    pub fn render(&self) -> String {
        if self.items.is_empty() {
            return "The to-do list is empty.".into();
        }
        let mut out = String::from("Current To-Do List:\n");
        for item in &self.items {
            let mark = if item.done { "[x]" } else { "[ ]" };
            out.push_str(&format!("- {} {}\n", mark, item.text));
        }
        out
    }
}
