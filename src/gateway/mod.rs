//! Command dispatch to a task-runner session.
//!
//! The orchestrator only depends on [`DispatchGateway`]. [`HttpGateway`] is
//! the real implementation; tests substitute a recording double.

mod http;

pub use http::{HttpGateway, SessionRequest, TextPart};

use async_trait::async_trait;

/// Sends command text to a session.
///
/// Implementations report failure by returning `false`, never by
/// panicking. Idempotency is not assumed: a command is sent at most once
/// per job.
#[async_trait]
pub trait DispatchGateway: Send + Sync {
    async fn send(&self, session_id: &str, command: &str) -> bool;
}
