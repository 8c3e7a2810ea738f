//! Job records and their lifecycle states.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// Unique identifier of a queued job.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct JobId(Uuid);

impl JobId {
    /// Generate a fresh random identifier.
    pub fn new() -> Self {
        Self(Uuid::new_v4())
    }

    /// First eight hex characters, for compact display.
    pub fn short(&self) -> String {
        self.0.simple().to_string()[..8].to_string()
    }
}

impl Default for JobId {
    fn default() -> Self {
        Self::new()
    }
}

impl std::fmt::Display for JobId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl std::str::FromStr for JobId {
    type Err = uuid::Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Uuid::parse_str(s).map(Self)
    }
}

/// Lifecycle status of a job.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, Default)]
#[serde(rename_all = "lowercase")]
pub enum JobStatus {
    /// Waiting for the session to become idle
    #[default]
    Pending,
    /// Dispatched to the session, output is being collected
    Running,
    /// Session reported idle while this job was running
    Complete,
    /// Dispatch failed or the session reported an error
    Failed,
    /// Cancelled before it finished
    Cancelled,
}

impl JobStatus {
    /// Check if the status is final.
    pub fn is_terminal(&self) -> bool {
        matches!(self, Self::Complete | Self::Failed | Self::Cancelled)
    }

    /// Check if the job still counts as active work.
    pub fn is_active(&self) -> bool {
        matches!(self, Self::Pending | Self::Running)
    }
}

impl std::fmt::Display for JobStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            JobStatus::Pending => write!(f, "pending"),
            JobStatus::Running => write!(f, "running"),
            JobStatus::Complete => write!(f, "complete"),
            JobStatus::Failed => write!(f, "failed"),
            JobStatus::Cancelled => write!(f, "cancelled"),
        }
    }
}

/// A command queued for background execution in a session.
///
/// Fields are read-only outside this crate. State changes go through the
/// transition methods below, which the job queue calls in response to
/// signals, so a terminal job can never be mutated again.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Job {
    pub id: JobId,
    pub command: String,
    pub status: JobStatus,
    pub queued_at: DateTime<Utc>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub started_at: Option<DateTime<Utc>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub completed_at: Option<DateTime<Utc>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub output: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub session_id: Option<String>,
}

impl Job {
    pub fn new(id: JobId, command: impl Into<String>, session_id: Option<String>) -> Self {
        Self {
            id,
            command: command.into(),
            status: JobStatus::Pending,
            queued_at: Utc::now(),
            started_at: None,
            completed_at: None,
            output: None,
            error: None,
            session_id,
        }
    }

    /// Whether a signal tagged with `session_id` concerns this job.
    ///
    /// An empty session on either side matches anything.
    pub fn belongs_to(&self, session_id: &str) -> bool {
        match self.session_id.as_deref() {
            Some(own) if !own.is_empty() && !session_id.is_empty() => own == session_id,
            _ => true,
        }
    }

    pub(crate) fn start(&mut self, at: DateTime<Utc>) {
        debug_assert_eq!(self.status, JobStatus::Pending);
        self.status = JobStatus::Running;
        self.started_at = Some(at);
    }

    pub(crate) fn complete(&mut self, output: String, at: DateTime<Utc>) {
        self.finish(JobStatus::Complete, at);
        self.output = Some(output);
    }

    pub(crate) fn fail(&mut self, error: String, output: Option<String>, at: DateTime<Utc>) {
        self.finish(JobStatus::Failed, at);
        self.error = Some(error);
        self.output = output.filter(|o| !o.is_empty());
    }

    pub(crate) fn cancel(&mut self, output: Option<String>, at: DateTime<Utc>) {
        self.finish(JobStatus::Cancelled, at);
        self.output = output.filter(|o| !o.is_empty());
    }

    fn finish(&mut self, status: JobStatus, at: DateTime<Utc>) {
        debug_assert!(!self.status.is_terminal());
        self.status = status;
        self.completed_at = Some(at);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_job_new_is_pending() {
        let job = Job::new(JobId::new(), "build-report", Some("s1".to_string()));
        assert_eq!(job.status, JobStatus::Pending);
        assert!(job.started_at.is_none());
        assert!(job.completed_at.is_none());
        assert_eq!(job.session_id.as_deref(), Some("s1"));
    }

    #[test]
    fn test_status_terminal_and_active() {
        assert!(JobStatus::Pending.is_active());
        assert!(JobStatus::Running.is_active());
        for status in [JobStatus::Complete, JobStatus::Failed, JobStatus::Cancelled] {
            assert!(status.is_terminal());
            assert!(!status.is_active());
        }
    }

    #[test]
    fn test_status_serializes_lowercase() {
        assert_eq!(
            serde_json::to_string(&JobStatus::Cancelled).unwrap(),
            r#""cancelled""#
        );
        assert_eq!(JobStatus::Running.to_string(), "running");
    }

    #[test]
    fn test_complete_sets_timestamps_and_output() {
        let mut job = Job::new(JobId::new(), "deploy", None);
        let start = Utc::now();
        job.start(start);
        job.complete("done".to_string(), Utc::now());

        assert_eq!(job.status, JobStatus::Complete);
        assert!(job.started_at.unwrap() <= job.completed_at.unwrap());
        assert_eq!(job.output.as_deref(), Some("done"));
        assert!(job.error.is_none());
    }

    #[test]
    fn test_fail_drops_empty_output() {
        let mut job = Job::new(JobId::new(), "deploy", None);
        job.start(Utc::now());
        job.fail("boom".to_string(), Some(String::new()), Utc::now());
        assert_eq!(job.status, JobStatus::Failed);
        assert_eq!(job.error.as_deref(), Some("boom"));
        assert!(job.output.is_none());
    }

    #[test]
    fn test_belongs_to() {
        let bound = Job::new(JobId::new(), "x", Some("s1".to_string()));
        assert!(bound.belongs_to("s1"));
        assert!(!bound.belongs_to("s2"));
        assert!(bound.belongs_to(""));

        let unbound = Job::new(JobId::new(), "x", None);
        assert!(unbound.belongs_to("s2"));
    }

    #[test]
    fn test_job_id_roundtrip_and_short() {
        let id = JobId::new();
        let parsed: JobId = id.to_string().parse().unwrap();
        assert_eq!(parsed, id);
        assert_eq!(id.short().len(), 8);
    }
}
