use async_trait::async_trait;
use serde::Serialize;
use std::time::Duration;

use super::DispatchGateway;
use crate::errors::GatewayError;

/// Longest error body kept in a rejection message.
const MAX_ERROR_BODY: usize = 200;

/// Request body for a session endpoint.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(untagged)]
pub enum SessionRequest {
    /// Free-form prompt text
    Prompt { parts: Vec<TextPart> },
    /// A `/name args` slash command
    Command { command: String, arguments: String },
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct TextPart {
    #[serde(rename = "type")]
    pub kind: &'static str,
    pub text: String,
}

impl SessionRequest {
    /// Build the request for a line of command text.
    pub fn from_command(command: &str) -> Self {
        let trimmed = command.trim();
        if let Some(rest) = trimmed.strip_prefix('/')
            && !rest.is_empty()
            && !rest.starts_with(char::is_whitespace)
        {
            let (name, args) = rest.split_once(char::is_whitespace).unwrap_or((rest, ""));
            return SessionRequest::Command {
                command: name.to_string(),
                arguments: args.trim().to_string(),
            };
        }
        SessionRequest::Prompt {
            parts: vec![TextPart {
                kind: "text",
                text: command.to_string(),
            }],
        }
    }

    /// Path below the server base URL.
    pub fn path(&self, session_id: &str) -> String {
        match self {
            SessionRequest::Prompt { .. } => format!("/session/{}/prompt_async", session_id),
            SessionRequest::Command { .. } => format!("/session/{}/command", session_id),
        }
    }
}

/// Dispatch gateway backed by the task-runner's HTTP API.
#[derive(Debug, Clone)]
pub struct HttpGateway {
    client: reqwest::Client,
    base_url: String,
}

impl HttpGateway {
    pub fn new(base_url: impl Into<String>, timeout: Duration) -> Self {
        let client = reqwest::Client::builder()
            .timeout(timeout)
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

    pub fn base_url(&self) -> &str {
        &self.base_url
    }

    /// Send a command, returning the typed failure.
    pub async fn try_send(&self, session_id: &str, command: &str) -> Result<(), GatewayError> {
        let request = SessionRequest::from_command(command);
        let url = format!("{}{}", self.base_url, request.path(session_id));

        let response = self
            .client
            .post(&url)
            .json(&request)
            .send()
            .await
            .map_err(|source| GatewayError::Request {
                session_id: session_id.to_string(),
                source,
            })?;

        let status = response.status();
        if status.is_success() {
            return Ok(());
        }

        let body = response.text().await.unwrap_or_default();
        Err(GatewayError::Rejected {
            session_id: session_id.to_string(),
            status: status.as_u16(),
            body: truncate_body(&body),
        })
    }
}

#[async_trait]
impl DispatchGateway for HttpGateway {
    async fn send(&self, session_id: &str, command: &str) -> bool {
        match self.try_send(session_id, command).await {
            Ok(()) => true,
            Err(e) => {
                tracing::warn!(session = session_id, error = %e, "Dispatch failed");
                false
            }
        }
    }
}

fn truncate_body(body: &str) -> String {
    let body = body.trim();
    if body.chars().count() <= MAX_ERROR_BODY {
        body.to_string()
    } else {
        let cut: String = body.chars().take(MAX_ERROR_BODY).collect();
        format!("{}...", cut)
    }
}
