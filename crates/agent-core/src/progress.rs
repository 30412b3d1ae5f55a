//! Progress reporting.
//!
//! The core never writes to a terminal. Everything a renderer might show is
//! pushed through a [`ProgressSink`], in the order it happens.

use std::time::Duration;

/// Something the caller may want to render
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum ProgressEvent<'a> {
    /// A streamed text fragment, in arrival order
    Text(&'a str),

    /// The in-flight exchange was cancelled. Sent once per cancelled exchange.
    Interrupted,

    /// Still waiting for the first content byte
    Waiting { elapsed: Duration },

    /// A tool is about to run
    ToolCall { name: &'a str },

    /// A tool finished; `preview` is truncated for display
    ToolOutput {
        name: &'a str,
        preview: &'a str,
        is_error: bool,
    },

    /// Non-fatal condition (e.g. the iteration ceiling)
    Warning(&'a str),

    /// A failure the user should see
    Error(&'a str),
}

/// Receiver for [`ProgressEvent`]s.
///
/// Implemented for any `FnMut(ProgressEvent<'_>) + Send` closure.
pub trait ProgressSink: Send {
    fn emit(&mut self, event: ProgressEvent<'_>);
}

impl<F> ProgressSink for F
where
    F: FnMut(ProgressEvent<'_>) + Send,
{
    fn emit(&mut self, event: ProgressEvent<'_>) {
        self(event)
    }
}

/// Sink that drops everything
pub struct NullProgress;

impl ProgressSink for NullProgress {
    fn emit(&mut self, _event: ProgressEvent<'_>) {}
}

/// Keep the first `max_lines` lines of `output`, appending `...` when
/// anything was cut.
pub fn preview_output(output: &str, max_lines: usize) -> String {
    let lines: Vec<&str> = output.lines().collect();
    if lines.len() <= max_lines {
        return output.to_string();
    }
    let mut preview = lines[..max_lines].join("\n");
    preview.push_str("...");
    preview
}
