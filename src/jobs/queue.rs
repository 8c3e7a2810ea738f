//! Sequential job queue: the single owner of job records and the output
//! buffer.
//!
//! `JobQueue` is a synchronous state machine. Every method applies one
//! transition and returns the side effect (if any) the caller must carry
//! out. The orchestrator actor feeds it one message at a time, which is what
//! makes the single-flight and no-double-finalization guarantees hold.

use chrono::Utc;
use serde::Serialize;

use super::model::{Job, JobId, JobStatus};
use super::retention::RetentionPolicy;

/// A command that must be sent to a session.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Dispatch {
    pub job_id: JobId,
    pub session_id: Option<String>,
    pub command: String,
}

/// Read-only view of the queue, published to the UI layer.
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct JobBoard {
    /// All retained jobs in insertion order
    pub jobs: Vec<Job>,
    /// Whether a job is currently running
    pub processing: bool,
    /// Command text of the running job
    pub active_command: Option<String>,
    /// Most recent error that could not be attached to a job
    pub last_error: Option<String>,
    /// Session used for jobs enqueued without an explicit one
    pub default_session: Option<String>,
}

impl JobBoard {
    pub fn get(&self, id: JobId) -> Option<&Job> {
        self.jobs.iter().find(|j| j.id == id)
    }

    pub fn count(&self, status: JobStatus) -> usize {
        self.jobs.iter().filter(|j| j.status == status).count()
    }

    /// True when no job is pending or running.
    pub fn is_settled(&self) -> bool {
        !self.jobs.iter().any(|j| j.status.is_active())
    }
}

#[derive(Debug, Default)]
pub struct JobQueue {
    jobs: Vec<Job>,
    output: String,
    last_error: Option<String>,
    default_session: Option<String>,
    retention: RetentionPolicy,
}

impl JobQueue {
    pub fn new(retention: RetentionPolicy, default_session: Option<String>) -> Self {
        Self {
            retention,
            default_session: non_empty(default_session),
            ..Default::default()
        }
    }

    pub fn jobs(&self) -> &[Job] {
        &self.jobs
    }

    /// Text accumulated for the running job so far.
    pub fn buffered_output(&self) -> &str {
        &self.output
    }

    pub fn is_processing(&self) -> bool {
        self.running_index().is_some()
    }

    pub fn board(&self) -> JobBoard {
        let running = self.running_index().map(|idx| &self.jobs[idx]);
        JobBoard {
            jobs: self.jobs.clone(),
            processing: running.is_some(),
            active_command: running.map(|j| j.command.clone()),
            last_error: self.last_error.clone(),
            default_session: self.default_session.clone(),
        }
    }

    pub fn set_default_session(&mut self, session_id: Option<String>) {
        self.default_session = non_empty(session_id);
    }

    /// Append a pending job.
    ///
    /// Returns true when the caller should run a check for work: a session
    /// is resolvable and nothing is running yet.
    pub fn enqueue(&mut self, id: JobId, command: String, session_id: Option<String>) -> bool {
        let session_id = non_empty(session_id).or_else(|| self.default_session.clone());
        let should_check = session_id.is_some() && !self.is_processing();

        tracing::info!(job = %id, session = ?session_id, command = %command, "Job queued");
        self.jobs.push(Job::new(id, command, session_id));
        self.prune();
        should_check
    }

    /// Cancel a pending or running job. Unknown and finished jobs are ignored.
    ///
    /// Returns true if a job changed state.
    pub fn cancel(&mut self, id: JobId) -> bool {
        let Some(job) = self.jobs.iter_mut().find(|j| j.id == id) else {
            return false;
        };

        let changed = match job.status {
            JobStatus::Pending => {
                job.cancel(None, Utc::now());
                true
            }
            JobStatus::Running => {
                // The session keeps executing; we only stop tracking it.
                let partial = std::mem::take(&mut self.output);
                job.cancel(Some(partial), Utc::now());
                true
            }
            _ => false,
        };

        if changed {
            tracing::info!(job = %id, "Job cancelled");
            self.prune();
        }
        changed
    }

    pub fn clear(&mut self) {
        self.jobs.clear();
        self.output.clear();
        tracing::info!("Job list cleared");
    }

    /// Session reported idle: finish the running job, then start the next.
    pub fn on_idle(&mut self, session_id: &str) -> Option<Dispatch> {
        if let Some(idx) = self.running_index() {
            if !self.jobs[idx].belongs_to(session_id) {
                tracing::debug!(session = session_id, "Idle from unrelated session ignored");
                return None;
            }
            let output = std::mem::take(&mut self.output);
            let job = &mut self.jobs[idx];
            job.complete(output, Utc::now());
            tracing::info!(job = %job.id, "Job complete");
            self.prune();
        }
        self.start_next()
    }

    /// Internal check for work after an enqueue. Never finalizes anything.
    pub fn check_for_work(&mut self) -> Option<Dispatch> {
        if self.is_processing() {
            return None;
        }
        self.start_next()
    }

    pub fn on_output(&mut self, session_id: &str, delta: &str) {
        match self.running_index() {
            Some(idx) if self.jobs[idx].belongs_to(session_id) => self.output.push_str(delta),
            _ => tracing::trace!(session = session_id, "Output delta without a running job dropped"),
        }
    }

    /// Session reported an error. An error without a session id belongs to
    /// whichever job is running.
    pub fn on_error(&mut self, session_id: &str, message: &str) {
        let target = self
            .running_index()
            .filter(|&idx| self.jobs[idx].belongs_to(session_id));

        match target {
            Some(idx) => {
                let output = std::mem::take(&mut self.output);
                let job = &mut self.jobs[idx];
                job.fail(message.to_string(), Some(output), Utc::now());
                tracing::warn!(job = %job.id, error = message, "Job failed");
                self.prune();
            }
            None => {
                tracing::warn!(session = session_id, error = message, "Error with no running job");
                self.last_error = Some(message.to_string());
            }
        }
    }

    /// The event subscription itself failed. Recorded for diagnostics only;
    /// no job changes state.
    pub fn on_feed_error(&mut self, message: &str) {
        tracing::warn!(error = message, "Event feed error");
        self.last_error = Some(message.to_string());
    }

    /// Result of a dispatch attempt for `job_id`.
    ///
    /// Ignored unless that job is still the running one, so a job already
    /// finished by idle, error or cancel is never finalized twice.
    ///
    /// Returns true if the job was failed. The session never received the
    /// command, so the caller should check for work again.
    pub fn on_dispatch_result(&mut self, job_id: JobId, result: Result<(), String>) -> bool {
        let Err(message) = result else {
            tracing::debug!(job = %job_id, "Command dispatched");
            return false;
        };

        let Some(idx) = self.running_index().filter(|&idx| self.jobs[idx].id == job_id) else {
            tracing::debug!(job = %job_id, "Dispatch failure for a job no longer running");
            return false;
        };

        let output = std::mem::take(&mut self.output);
        let job = &mut self.jobs[idx];
        job.fail(message, Some(output), Utc::now());
        tracing::warn!(job = %job_id, "Job failed to dispatch");
        self.prune();
        true
    }

    fn start_next(&mut self) -> Option<Dispatch> {
        let job = self
            .jobs
            .iter_mut()
            .find(|j| j.status == JobStatus::Pending)?;

        job.start(Utc::now());
        tracing::info!(job = %job.id, session = ?job.session_id, "Job started");
        Some(Dispatch {
            job_id: job.id,
            session_id: job.session_id.clone(),
            command: job.command.clone(),
        })
    }

    fn running_index(&self) -> Option<usize> {
        self.jobs.iter().position(|j| j.status == JobStatus::Running)
    }

    fn prune(&mut self) {
        self.retention.prune(&mut self.jobs);
    }
}

fn non_empty(value: Option<String>) -> Option<String> {
    value.filter(|v| !v.trim().is_empty())
}
