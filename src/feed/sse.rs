//! Server-Sent Events transport for the task-runner's `/event` endpoint.

use async_trait::async_trait;
use futures_util::StreamExt;
use std::collections::VecDeque;
use std::time::Duration;

use super::{EventFeed, EventStream, FeedEvent};
use crate::errors::FeedError;

/// Incremental SSE framer. Feed it raw body chunks, get back the joined
/// `data` payload of every completed event.
#[derive(Debug, Default)]
pub struct SseDecoder {
    line: Vec<u8>,
    data: Vec<String>,
}

impl SseDecoder {
    pub fn push(&mut self, chunk: &[u8]) -> Vec<String> {
        let mut events = Vec::new();
        for &byte in chunk {
            if byte == b'\n' {
                let raw = std::mem::take(&mut self.line);
                let line = String::from_utf8_lossy(&raw);
                if let Some(payload) = self.take_line(line.trim_end_matches('\r')) {
                    events.push(payload);
                }
            } else {
                self.line.push(byte);
            }
        }
        events
    }

    fn take_line(&mut self, line: &str) -> Option<String> {
        if line.is_empty() {
            if self.data.is_empty() {
                return None;
            }
            let payload = self.data.join("\n");
            self.data.clear();
            return Some(payload);
        }
        if line.starts_with(':') {
            return None;
        }
        if let Some(value) = line.strip_prefix("data:") {
            self.data
                .push(value.strip_prefix(' ').unwrap_or(value).to_string());
        }
        // event:, id: and retry: carry nothing we use.
        None
    }
}

/// Event feed over `GET {base}/event`.
#[derive(Debug, Clone)]
pub struct HttpEventFeed {
    client: reqwest::Client,
    base_url: String,
}

impl HttpEventFeed {
    pub fn new(base_url: impl Into<String>, connect_timeout: Duration) -> Self {
        // No overall timeout: the response body is open-ended.
        let client = reqwest::Client::builder()
            .connect_timeout(connect_timeout)
            .build()
            .unwrap_or_else(|_| reqwest::Client::new());
        Self::with_client(client, base_url)
    }

    pub fn with_client(client: reqwest::Client, base_url: impl Into<String>) -> Self {
        Self {
            client,
            base_url: base_url.into().trim_end_matches('/').to_string(),
        }
    }

    pub fn url(&self) -> String {
        format!("{}/event", self.base_url)
    }
}

struct StreamState<S> {
    body: S,
    decoder: SseDecoder,
    ready: VecDeque<String>,
    done: bool,
}

#[async_trait]
impl EventFeed for HttpEventFeed {
    async fn subscribe(&self) -> Result<EventStream, FeedError> {
        let url = self.url();
        let response = self
            .client
            .get(&url)
            .header(reqwest::header::ACCEPT, "text/event-stream")
            .send()
            .await
            .map_err(|source| FeedError::Connect {
                url: url.clone(),
                source,
            })?;

        if !response.status().is_success() {
            return Err(FeedError::Status {
                url,
                status: response.status().as_u16(),
            });
        }
        tracing::debug!(url = %url, "Subscribed to event stream");

        let state = StreamState {
            body: Box::pin(response.bytes_stream()),
            decoder: SseDecoder::default(),
            ready: VecDeque::new(),
            done: false,
        };

        let stream = futures::stream::unfold(state, |mut state| async move {
            if state.done {
                return None;
            }
            loop {
                if let Some(payload) = state.ready.pop_front() {
                    match FeedEvent::parse(&payload) {
                        Ok(FeedEvent::Other) => continue,
                        Ok(event) => return Some((Ok(event), state)),
                        Err(e) => {
                            tracing::debug!(error = %e, payload = %payload, "Skipping undecodable event");
                            continue;
                        }
                    }
                }
                match state.body.next().await {
                    Some(Ok(chunk)) => {
                        let events = state.decoder.push(&chunk);
                        state.ready.extend(events);
                    }
                    Some(Err(e)) => {
                        state.done = true;
                        return Some((Err(FeedError::Read(e)), state));
                    }
                    None => {
                        state.done = true;
                        return Some((Err(FeedError::Closed), state));
                    }
                }
            }
        });

        Ok(stream.boxed())
    }
}
