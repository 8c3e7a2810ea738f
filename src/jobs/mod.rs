//! Background job orchestration.
//!
//! - [`model`]: job records and statuses
//! - [`retention`]: tiered pruning of finished jobs
//! - [`queue`]: the synchronous state machine driving the job lifecycle
//! - [`orchestrator`]: the actor that owns a queue and dispatches commands

pub mod model;
pub mod orchestrator;
pub mod queue;
pub mod retention;

pub use model::{Job, JobId, JobStatus};
pub use orchestrator::{JobOrchestrator, JobSignals, OrchestratorConfig, OrchestratorHandle};
pub use queue::{Dispatch, JobBoard, JobQueue};
pub use retention::{DEFAULT_KEEP_COMPLETE, DEFAULT_KEEP_FAILED, RetentionPolicy};
