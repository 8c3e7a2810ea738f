use serde::Deserialize;
use serde_json::Value;

/// Fallback when an error payload carries nothing usable.
pub const UNKNOWN_ERROR: &str = "unknown session error";

/// How many property names a synthesized error description lists.
const MAX_DESCRIBED_FIELDS: usize = 3;

/// Events from the task-runner's `/event` stream
#[derive(Debug, Clone, PartialEq, Deserialize)]
#[serde(tag = "type")]
pub enum FeedEvent {
    #[serde(rename = "session.idle")]
    SessionIdle { properties: SessionProperties },

    #[serde(rename = "message.part.updated")]
    PartUpdated { properties: PartProperties },

    #[serde(rename = "session.error")]
    SessionError { properties: ErrorProperties },

    /// Any other event type. Never mapped to a signal.
    #[serde(other)]
    Other,
}

#[derive(Debug, Clone, PartialEq, Deserialize)]
pub struct SessionProperties {
    #[serde(rename = "sessionID")]
    pub session_id: String,
}

#[derive(Debug, Clone, PartialEq, Deserialize)]
pub struct PartProperties {
    pub part: Part,
    #[serde(default)]
    pub delta: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Deserialize)]
pub struct Part {
    #[serde(rename = "sessionID", default)]
    pub session_id: String,
}

#[derive(Debug, Clone, PartialEq, Deserialize)]
pub struct ErrorProperties {
    #[serde(rename = "sessionID", default)]
    pub session_id: Option<String>,
    #[serde(default)]
    pub error: Option<ErrorPayload>,
}

/// A session error body, decoded from most to least specific shape.
#[derive(Debug, Clone, PartialEq, Deserialize)]
#[serde(untagged)]
pub enum ErrorPayload {
    /// `{ "name": "...", "data": { "message": "..." } }`
    Structured {
        #[serde(default)]
        name: Option<String>,
        data: ErrorData,
    },
    /// `{ "name": "...", "message": "..." }`
    Plain {
        #[serde(default)]
        name: Option<String>,
        message: String,
    },
    Opaque(Value),
}

#[derive(Debug, Clone, PartialEq, Deserialize)]
pub struct ErrorData {
    pub message: String,
}

impl ErrorPayload {
    /// Human-readable message for the job's `error` field.
    pub fn message(&self) -> String {
        match self {
            ErrorPayload::Structured { data, .. } => data.message.clone(),
            ErrorPayload::Plain { message, .. } => message.clone(),
            ErrorPayload::Opaque(value) => describe_opaque(value),
        }
    }
}

fn describe_opaque(value: &Value) -> String {
    let Some(obj) = value.as_object() else {
        return UNKNOWN_ERROR.to_string();
    };

    let name = obj
        .get("name")
        .and_then(|v| v.as_str())
        .unwrap_or("UnknownError");

    let fields: Vec<&str> = obj
        .keys()
        .map(String::as_str)
        .filter(|k| *k != "name")
        .take(MAX_DESCRIBED_FIELDS)
        .collect();

    if fields.is_empty() {
        name.to_string()
    } else {
        format!("{} (fields: {})", name, fields.join(", "))
    }
}

/// A feed event reduced to what the orchestrator acts on.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Signal {
    Idle { session_id: String },
    Output { session_id: String, delta: String },
    Error { session_id: String, message: String },
}

impl Signal {
    pub fn session_id(&self) -> &str {
        match self {
            Signal::Idle { session_id }
            | Signal::Output { session_id, .. }
            | Signal::Error { session_id, .. } => session_id,
        }
    }
}

impl std::fmt::Display for Signal {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Signal::Idle { session_id } => write!(f, "[{}] idle", session_id),
            Signal::Output { session_id, delta } => {
                write!(f, "[{}] output: {}", session_id, delta.escape_debug())
            }
            Signal::Error {
                session_id,
                message,
            } => write!(f, "[{}] error: {}", session_id, message),
        }
    }
}

impl FeedEvent {
    /// Parse one SSE `data` payload.
    pub fn parse(payload: &str) -> Result<Self, serde_json::Error> {
        serde_json::from_str(payload)
    }

    /// Map to a signal. Part updates without a text delta yield nothing.
    pub fn signal(&self) -> Option<Signal> {
        match self {
            FeedEvent::SessionIdle { properties } => Some(Signal::Idle {
                session_id: properties.session_id.clone(),
            }),
            FeedEvent::PartUpdated { properties } => {
                let delta = properties.delta.as_deref().filter(|d| !d.is_empty())?;
                Some(Signal::Output {
                    session_id: properties.part.session_id.clone(),
                    delta: delta.to_string(),
                })
            }
            FeedEvent::SessionError { properties } => Some(Signal::Error {
                session_id: properties.session_id.clone().unwrap_or_default(),
                message: properties
                    .error
                    .as_ref()
                    .map(ErrorPayload::message)
                    .unwrap_or_else(|| UNKNOWN_ERROR.to_string()),
            }),
            FeedEvent::Other => None,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn signal(json: &str) -> Option<Signal> {
        FeedEvent::parse(json).unwrap().signal()
    }

    #[test]
    fn test_parse_session_idle() {
        let s = signal(r#"{"type":"session.idle","properties":{"sessionID":"ses_1"}}"#);
        assert_eq!(
            s,
            Some(Signal::Idle {
                session_id: "ses_1".to_string()
            })
        );
    }

    #[test]
    fn test_parse_part_with_delta() {
        let s = signal(
            r#"{"type":"message.part.updated","properties":{"part":{"id":"p1","sessionID":"ses_1","type":"text","text":"Hello wor"},"delta":"wor"}}"#,
        );
        assert_eq!(
            s,
            Some(Signal::Output {
                session_id: "ses_1".to_string(),
                delta: "wor".to_string()
            })
        );
    }

    #[test]
    fn test_part_without_delta_is_ignored() {
        assert_eq!(
            signal(
                r#"{"type":"message.part.updated","properties":{"part":{"sessionID":"ses_1","type":"tool"}}}"#
            ),
            None
        );
        assert_eq!(
            signal(
                r#"{"type":"message.part.updated","properties":{"part":{"sessionID":"ses_1"},"delta":""}}"#
            ),
            None
        );
    }

    #[test]
    fn test_unknown_event_type() {
        let event =
            FeedEvent::parse(r#"{"type":"session.updated","properties":{"info":{}}}"#).unwrap();
        assert_eq!(event, FeedEvent::Other);
        assert_eq!(event.signal(), None);
    }

    #[test]
    fn test_error_structured_message() {
        let s = signal(
            r#"{"type":"session.error","properties":{"sessionID":"ses_1","error":{"name":"ProviderAuthError","data":{"providerID":"x","message":"Invalid API key"}}}}"#,
        );
        assert_eq!(
            s,
            Some(Signal::Error {
                session_id: "ses_1".to_string(),
                message: "Invalid API key".to_string()
            })
        );
    }

    #[test]
    fn test_error_plain_message() {
        let s = signal(
            r#"{"type":"session.error","properties":{"sessionID":"ses_1","error":{"name":"Boom","message":"disk full"}}}"#,
        );
        assert_eq!(s.map(|s| s.to_string()).unwrap(), "[ses_1] error: disk full");
    }

    #[test]
    fn test_error_synthesized_from_fields() {
        let s = signal(
            r#"{"type":"session.error","properties":{"sessionID":"ses_1","error":{"name":"MessageAbortedError","data":{"reason":"user"},"code":7,"retry":false,"zeta":1}}}"#,
        );
        assert_eq!(
            s,
            Some(Signal::Error {
                session_id: "ses_1".to_string(),
                message: "MessageAbortedError (fields: code, data, retry)".to_string()
            })
        );
    }

    #[test]
    fn test_error_without_name_or_fields() {
        let payload: ErrorPayload = serde_json::from_str("{}").unwrap();
        assert_eq!(payload.message(), "UnknownError");

        let payload: ErrorPayload = serde_json::from_str(r#""just a string""#).unwrap();
        assert_eq!(payload.message(), UNKNOWN_ERROR);
    }

    #[test]
    fn test_error_missing_payload_and_session() {
        let s = signal(r#"{"type":"session.error","properties":{}}"#);
        assert_eq!(
            s,
            Some(Signal::Error {
                session_id: String::new(),
                message: UNKNOWN_ERROR.to_string()
            })
        );
    }

    #[test]
    fn test_output_display_escapes_newlines() {
        let s = Signal::Output {
            session_id: "s".to_string(),
            delta: "a\nb".to_string(),
        };
        assert_eq!(s.to_string(), "[s] output: a\\nb");
        assert_eq!(s.session_id(), "s");
    }

    #[test]
    fn test_malformed_payload_is_error() {
        assert!(FeedEvent::parse("not json").is_err());
        assert!(FeedEvent::parse(r#"{"type":"session.idle"}"#).is_err());
    }
}
