//! Cooperative cancellation.
//!
//! The token is `tokio_util`'s: whoever watches for Ctrl+C calls
//! [`CancellationToken::cancel`], and the stream transport both polls
//! `is_cancelled` on its tick and awaits `cancelled()`. A cancelled token
//! stays cancelled, so callers hand each turn a fresh one.

pub use tokio_util::sync::CancellationToken;
