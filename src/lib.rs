//! Background job orchestration for a terminal planning dashboard.
//!
//! Commands are queued as jobs and dispatched one at a time to a
//! task-runner session. Job lifecycles are driven by the session's event
//! feed: idle finishes the running job, output deltas are buffered into it,
//! and errors fail it.

pub mod config;
pub mod errors;
pub mod feed;
pub mod gateway;
pub mod jobs;
pub mod logging;
pub mod ui;
