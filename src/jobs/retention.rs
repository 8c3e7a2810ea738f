//! Retention tiers for the job list.
//!
//! Active jobs are never pruned. Finished jobs are capped in two tiers:
//! successful completions, and failures plus cancellations combined. The
//! most recent entries (by list position) survive.

use serde::{Deserialize, Serialize};

use super::model::{Job, JobStatus};

/// Default number of `complete` jobs kept.
pub const DEFAULT_KEEP_COMPLETE: usize = 5;

/// Default number of `failed`/`cancelled` jobs kept.
pub const DEFAULT_KEEP_FAILED: usize = 5;

/// Caps for the finished-job tiers.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct RetentionPolicy {
    pub keep_complete: usize,
    pub keep_failed: usize,
}

impl Default for RetentionPolicy {
    fn default() -> Self {
        Self {
            keep_complete: DEFAULT_KEEP_COMPLETE,
            keep_failed: DEFAULT_KEEP_FAILED,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Tier {
    Active,
    Complete,
    FailedOrCancelled,
}

fn tier_of(status: JobStatus) -> Tier {
    match status {
        JobStatus::Pending | JobStatus::Running => Tier::Active,
        JobStatus::Complete => Tier::Complete,
        JobStatus::Failed | JobStatus::Cancelled => Tier::FailedOrCancelled,
    }
}

impl RetentionPolicy {
    pub fn new(keep_complete: usize, keep_failed: usize) -> Self {
        Self {
            keep_complete,
            keep_failed,
        }
    }

    /// Drop finished jobs beyond the tier caps, preserving order.
    pub fn prune(&self, jobs: &mut Vec<Job>) {
        let mut complete_seen = 0;
        let mut failed_seen = 0;
        let mut keep = vec![false; jobs.len()];

        // Walk newest first so the counters admit the most recent entries.
        for (idx, job) in jobs.iter().enumerate().rev() {
            keep[idx] = match tier_of(job.status) {
                Tier::Active => true,
                Tier::Complete => {
                    complete_seen += 1;
                    complete_seen <= self.keep_complete
                }
                Tier::FailedOrCancelled => {
                    failed_seen += 1;
                    failed_seen <= self.keep_failed
                }
            };
        }

        let mut flags = keep.into_iter();
        jobs.retain(|_| flags.next().unwrap_or(true));
    }
}
