//! Typed error hierarchy for planboard.
//!
//! Three top-level enums cover the three external seams:
//! - `GatewayError`: command dispatch to the task-runner server
//! - `FeedError`: the event stream subscription
//! - `ConfigError`: loading and resolving `planboard.toml`
//!
//! None of these ever reach job state directly: the orchestrator folds
//! gateway failures into a `failed` job and feed failures into the
//! board's `last_error`.

use thiserror::Error;

/// Errors from sending a command to a session.
#[derive(Debug, Error)]
pub enum GatewayError {
    #[error("No session bound for command '{command}'")]
    NoSession { command: String },

    #[error("Dispatch request to session {session_id} failed: {source}")]
    Request {
        session_id: String,
        #[source]
        source: reqwest::Error,
    },

    #[error("Session {session_id} rejected command with status {status}: {body}")]
    Rejected {
        session_id: String,
        status: u16,
        body: String,
    },
}

/// Errors from the event feed subscription.
#[derive(Debug, Error)]
pub enum FeedError {
    #[error("Failed to connect to event stream at {url}: {source}")]
    Connect {
        url: String,
        #[source]
        source: reqwest::Error,
    },

    #[error("Event stream at {url} returned status {status}")]
    Status { url: String, status: u16 },

    #[error("Event stream read failed: {0}")]
    Read(#[source] reqwest::Error),

    #[error("Event stream closed by server")]
    Closed,
}

/// Errors from loading configuration.
#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("Failed to read config file at {path}: {source}")]
    Read {
        path: std::path::PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("Failed to parse planboard.toml: {0}")]
    Parse(#[from] toml::de::Error),

    #[error("Invalid server URL '{0}': must start with http:// or https://")]
    InvalidServerUrl(String),
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn gateway_error_no_session_carries_command() {
        let err = GatewayError::NoSession {
            command: "build-report".to_string(),
        };
        match &err {
            GatewayError::NoSession { command } => assert_eq!(command, "build-report"),
            _ => panic!("Expected NoSession variant"),
        }
        assert!(err.to_string().contains("build-report"));
    }

    #[test]
    fn gateway_error_rejected_carries_status() {
        let err = GatewayError::Rejected {
            session_id: "s1".to_string(),
            status: 404,
            body: "session not found".to_string(),
        };
        let msg = err.to_string();
        assert!(msg.contains("s1"));
        assert!(msg.contains("404"));
        assert!(msg.contains("session not found"));
    }

    #[test]
    fn feed_error_status_carries_url() {
        let err = FeedError::Status {
            url: "http://localhost/event".to_string(),
            status: 500,
        };
        let msg = err.to_string();
        assert!(msg.contains("http://localhost/event"));
        assert!(msg.contains("500"));
    }

    #[test]
    fn config_error_read_carries_path() {
        use std::path::PathBuf;
        let path = PathBuf::from("/project/.planboard/planboard.toml");
        let io_err = std::io::Error::new(std::io::ErrorKind::PermissionDenied, "access denied");
        let err = ConfigError::Read {
            path: path.clone(),
            source: io_err,
        };
        match &err {
            ConfigError::Read { path: p, source: s } => {
                assert_eq!(p, &path);
                assert_eq!(s.kind(), std::io::ErrorKind::PermissionDenied);
            }
            _ => panic!("Expected Read variant"),
        }
    }

    #[test]
    fn config_error_converts_from_toml_error() {
        let toml_err = toml::from_str::<toml::Value>("not = [valid").unwrap_err();
        let err: ConfigError = toml_err.into();
        assert!(matches!(err, ConfigError::Parse(_)));
    }

    #[test]
    fn all_error_types_implement_std_error_trait() {
        fn assert_std_error<E: std::error::Error>(_: &E) {}
        assert_std_error(&GatewayError::NoSession {
            command: "x".into(),
        });
        assert_std_error(&FeedError::Closed);
        assert_std_error(&ConfigError::InvalidServerUrl("ftp://x".into()));
    }
}
