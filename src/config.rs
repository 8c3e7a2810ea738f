//! Configuration for planboard.
//!
//! Settings live in `.planboard/planboard.toml` and are layered
//! file → environment → CLI.
//!
//! # Configuration File Format
//!
//! ```toml
//! [server]
//! base_url = "http://127.0.0.1:4096"
//! request_timeout_secs = 30
//!
//! [session]
//! default = "ses_123"
//!
//! [jobs]
//! keep_complete = 5
//! keep_failed = 5
//!
//! [logging]
//! level = "info"
//! format = "text"
//! ```

use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use std::time::Duration;

use crate::errors::ConfigError;
use crate::jobs::{DEFAULT_KEEP_COMPLETE, DEFAULT_KEEP_FAILED, RetentionPolicy};

pub const PLANBOARD_DIR: &str = ".planboard";
pub const CONFIG_FILE: &str = "planboard.toml";
pub const DEFAULT_BASE_URL: &str = "http://127.0.0.1:4096";

pub const ENV_SERVER_URL: &str = "PLANBOARD_SERVER_URL";
pub const ENV_SESSION: &str = "PLANBOARD_SESSION";

/// Task-runner server connection.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ServerSection {
    /// Base URL of the task-runner HTTP API
    #[serde(default = "default_base_url")]
    pub base_url: String,
    /// Timeout for dispatch requests, in seconds
    #[serde(default = "default_request_timeout_secs")]
    pub request_timeout_secs: u64,
}

fn default_base_url() -> String {
    DEFAULT_BASE_URL.to_string()
}

fn default_request_timeout_secs() -> u64 {
    30
}

impl Default for ServerSection {
    fn default() -> Self {
        Self {
            base_url: default_base_url(),
            request_timeout_secs: default_request_timeout_secs(),
        }
    }
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct SessionSection {
    /// Session used when a command is queued without one
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub default: Option<String>,
}

/// History caps for finished jobs.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct JobsSection {
    #[serde(default = "default_keep_complete")]
    pub keep_complete: usize,
    #[serde(default = "default_keep_failed")]
    pub keep_failed: usize,
}

fn default_keep_complete() -> usize {
    DEFAULT_KEEP_COMPLETE
}

fn default_keep_failed() -> usize {
    DEFAULT_KEEP_FAILED
}

impl Default for JobsSection {
    fn default() -> Self {
        Self {
            keep_complete: default_keep_complete(),
            keep_failed: default_keep_failed(),
        }
    }
}

impl JobsSection {
    pub fn retention(&self) -> RetentionPolicy {
        RetentionPolicy::new(self.keep_complete, self.keep_failed)
    }
}

/// Log file output format.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum LogFormat {
    #[default]
    Text,
    Json,
}

impl std::str::FromStr for LogFormat {
    type Err = anyhow::Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "text" => Ok(LogFormat::Text),
            "json" => Ok(LogFormat::Json),
            _ => anyhow::bail!("Invalid log format '{}'. Valid values: text, json", s),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LoggingSection {
    /// Default filter when neither PLANBOARD_LOG nor RUST_LOG is set
    #[serde(default = "default_log_level")]
    pub level: String,
    #[serde(default = "default_log_format")]
    pub format: String,
}

fn default_log_level() -> String {
    "info".to_string()
}

fn default_log_format() -> String {
    "text".to_string()
}

impl Default for LoggingSection {
    fn default() -> Self {
        Self {
            level: default_log_level(),
            format: default_log_format(),
        }
    }
}

impl LoggingSection {
    /// Parsed format, falling back to text.
    pub fn format(&self) -> LogFormat {
        self.format.parse().unwrap_or_default()
    }
}

/// The complete planboard.toml configuration structure.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct PlanboardToml {
    #[serde(default)]
    pub server: ServerSection,
    #[serde(default)]
    pub session: SessionSection,
    #[serde(default)]
    pub jobs: JobsSection,
    #[serde(default)]
    pub logging: LoggingSection,
}

impl PlanboardToml {
    /// Load configuration from a TOML file.
    pub fn load(path: &Path) -> Result<Self, ConfigError> {
        let content = std::fs::read_to_string(path).map_err(|source| ConfigError::Read {
            path: path.to_path_buf(),
            source,
        })?;
        Self::parse(&content)
    }

    /// Parse configuration from a TOML string.
    pub fn parse(content: &str) -> Result<Self, ConfigError> {
        Ok(toml::from_str(content)?)
    }

    /// Load `planboard.toml` from the given directory, or defaults if absent.
    pub fn load_or_default(planboard_dir: &Path) -> Result<Self, ConfigError> {
        let path = planboard_dir.join(CONFIG_FILE);
        if path.exists() {
            Self::load(&path)
        } else {
            Ok(Self::default())
        }
    }

    /// Save configuration to a TOML file.
    pub fn save(&self, path: &Path) -> Result<()> {
        let content =
            toml::to_string_pretty(self).context("Failed to serialize planboard.toml")?;
        std::fs::write(path, content)
            .with_context(|| format!("Failed to write config file: {}", path.display()))?;
        Ok(())
    }

    /// Validate the configuration and return any warnings.
    pub fn validate(&self) -> Vec<String> {
        let mut warnings = Vec::new();

        if let Err(e) = check_server_url(&self.server.base_url) {
            warnings.push(e.to_string());
        }
        if self.server.request_timeout_secs == 0 {
            warnings.push("server.request_timeout_secs is 0: every dispatch will time out".into());
        }
        if self.jobs.keep_complete == 0 {
            warnings.push("jobs.keep_complete is 0: completed jobs are dropped immediately".into());
        }
        if self.jobs.keep_failed == 0 {
            warnings.push(
                "jobs.keep_failed is 0: failed and cancelled jobs are dropped immediately".into(),
            );
        }
        if self.logging.format.parse::<LogFormat>().is_err() {
            warnings.push(format!(
                "Unknown logging.format '{}': using text",
                self.logging.format
            ));
        }
        if self.session.default.as_deref().is_some_and(str::is_empty) {
            warnings.push("session.default is empty".into());
        }

        warnings
    }
}

fn check_server_url(url: &str) -> Result<(), ConfigError> {
    let url = url.trim();
    if url.starts_with("http://") || url.starts_with("https://") {
        Ok(())
    } else {
        Err(ConfigError::InvalidServerUrl(url.to_string()))
    }
}

/// Path to the `.planboard` directory of a project.
pub fn get_planboard_dir(project_dir: &Path) -> PathBuf {
    project_dir.join(PLANBOARD_DIR)
}

/// Configuration resolved from planboard.toml, environment and CLI flags.
#[derive(Debug, Clone)]
pub struct PlanboardConfig {
    pub project_dir: PathBuf,
    pub planboard_dir: PathBuf,
    pub toml: PlanboardToml,
    /// CLI override: verbose mode
    pub verbose: bool,
    /// CLI override: server base URL
    pub cli_server_url: Option<String>,
}

impl PlanboardConfig {
    pub fn new(project_dir: PathBuf) -> Result<Self> {
        let project_dir = project_dir
            .canonicalize()
            .context("Failed to resolve project directory")?;
        let planboard_dir = get_planboard_dir(&project_dir);
        let toml = PlanboardToml::load_or_default(&planboard_dir)
            .context("Failed to load planboard configuration")?;

        Ok(Self {
            project_dir,
            planboard_dir,
            toml,
            verbose: false,
            cli_server_url: None,
        })
    }

    pub fn with_cli_args(
        project_dir: PathBuf,
        verbose: bool,
        server_url: Option<String>,
    ) -> Result<Self> {
        let mut config = Self::new(project_dir)?;
        config.verbose = verbose;
        config.cli_server_url = server_url;
        Ok(config)
    }

    /// Server base URL (CLI → env → file).
    pub fn server_url(&self) -> String {
        self.cli_server_url
            .clone()
            .or_else(|| std::env::var(ENV_SERVER_URL).ok().filter(|v| !v.is_empty()))
            .unwrap_or_else(|| self.toml.server.base_url.clone())
    }

    /// Server base URL, rejected unless it is http(s).
    pub fn checked_server_url(&self) -> Result<String, ConfigError> {
        let url = self.server_url();
        check_server_url(&url)?;
        Ok(url)
    }

    /// Session for commands queued without one (CLI → env → file).
    pub fn default_session(&self, cli_session: Option<&str>) -> Option<String> {
        cli_session
            .map(str::to_string)
            .or_else(|| std::env::var(ENV_SESSION).ok())
            .or_else(|| self.toml.session.default.clone())
            .filter(|s| !s.is_empty())
    }

    pub fn request_timeout(&self) -> Duration {
        Duration::from_secs(self.toml.server.request_timeout_secs)
    }

    pub fn retention(&self) -> RetentionPolicy {
        self.toml.jobs.retention()
    }

    pub fn config_file(&self) -> PathBuf {
        self.planboard_dir.join(CONFIG_FILE)
    }

    pub fn log_dir(&self) -> PathBuf {
        self.planboard_dir.join("logs")
    }

    /// Validate configuration and return warnings.
    pub fn validate(&self) -> Vec<String> {
        let mut warnings = self.toml.validate();
        if self.server_url() != self.toml.server.base_url
            && let Err(e) = check_server_url(&self.server_url())
        {
            warnings.push(e.to_string());
        }
        warnings
    }
}
