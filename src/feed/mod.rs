//! Event feed subscription.
//!
//! [`EventFeed`] is the transport seam: [`HttpEventFeed`] reads the
//! task-runner's SSE stream, tests use channel-backed doubles.
//! [`EventListener`] owns one live subscription and turns feed events into
//! [`JobSignals`](crate::jobs::JobSignals) calls.

mod events;
mod listener;
mod sse;

pub use events::{
    ErrorData, ErrorPayload, ErrorProperties, FeedEvent, Part, PartProperties, SessionProperties,
    Signal, UNKNOWN_ERROR,
};
pub use listener::EventListener;
pub use sse::{HttpEventFeed, SseDecoder};

use async_trait::async_trait;
use futures::stream::BoxStream;

use crate::errors::FeedError;

/// Decoded events; ends after the first error.
pub type EventStream = BoxStream<'static, Result<FeedEvent, FeedError>>;

/// Source of task-runner events.
///
/// Dropping the returned stream cancels the subscription.
#[async_trait]
pub trait EventFeed: Send + Sync {
    async fn subscribe(&self) -> Result<EventStream, FeedError>;
}
