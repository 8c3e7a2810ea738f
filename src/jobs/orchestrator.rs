//! Job orchestrator: the actor that owns the job queue.
//!
//! Every request, feed signal and dispatch result is a [`Message`] on one
//! unbounded channel. A single task drains that channel and applies each
//! message to the [`JobQueue`] in order. After each drained batch it
//! publishes a fresh [`JobBoard`] on a watch channel, unless the batch only
//! appended output. Callers hold an [`OrchestratorHandle`]; its methods
//! never block or suspend.
//!
//! ## Usage
//!
//! ```no_run
//! use planboard::gateway::HttpGateway;
//! use planboard::jobs::{JobOrchestrator, OrchestratorConfig};
//! use std::sync::Arc;
//! use std::time::Duration;
//!
//! # async fn example() {
//! let gateway = Arc::new(HttpGateway::new("http://127.0.0.1:4096", Duration::from_secs(30)));
//! let (handle, _task) = JobOrchestrator::spawn(gateway, OrchestratorConfig::default());
//!
//! handle.set_default_session(Some("ses_1".to_string()));
//! let id = handle.enqueue("/plan-phase 03", None);
//! let board = handle.wait_until(|b| b.get(id).is_some_and(|j| j.status.is_terminal())).await;
//! # let _ = board;
//! # }
//! ```

use std::collections::VecDeque;
use std::sync::Arc;

use tokio::sync::{mpsc, watch};
use tokio::task::JoinHandle;

use super::model::JobId;
use super::queue::{Dispatch, JobBoard, JobQueue};
use super::retention::RetentionPolicy;
use crate::errors::GatewayError;
use crate::gateway::DispatchGateway;

/// Receives the signals produced by the event listener.
///
/// Implemented by [`OrchestratorHandle`]. Calls must not block: they are
/// made from the listener's receive loop.
pub trait JobSignals: Send + Sync + 'static {
    fn on_idle(&self, session_id: &str);
    fn on_output(&self, session_id: &str, delta: &str);
    /// A session reported an error. `session_id` is empty when the event
    /// did not name one.
    fn on_error(&self, session_id: &str, message: &str);
    /// The subscription itself failed. Never attached to a job.
    fn on_feed_error(&self, message: &str);
}

/// Orchestrator settings.
#[derive(Debug, Clone, Default)]
pub struct OrchestratorConfig {
    pub retention: RetentionPolicy,
    pub default_session: Option<String>,
}

#[derive(Debug)]
enum Message {
    Enqueue {
        id: JobId,
        command: String,
        session_id: Option<String>,
    },
    Cancel(JobId),
    Clear,
    SetDefaultSession(Option<String>),
    Idle {
        session_id: String,
    },
    Output {
        session_id: String,
        delta: String,
    },
    Error {
        session_id: String,
        message: String,
    },
    FeedError(String),
    CheckForWork,
    DispatchFinished {
        job_id: JobId,
        result: Result<(), String>,
    },
}

/// Cheap, cloneable handle to a running orchestrator.
#[derive(Debug, Clone)]
pub struct OrchestratorHandle {
    tx: mpsc::UnboundedSender<Message>,
    board: watch::Receiver<JobBoard>,
}

impl OrchestratorHandle {
    /// Queue a command. Uses the default session when `session_id` is `None`.
    pub fn enqueue(&self, command: impl Into<String>, session_id: Option<String>) -> JobId {
        let id = JobId::new();
        self.post(Message::Enqueue {
            id,
            command: command.into(),
            session_id,
        });
        id
    }

    /// Cancel a pending or running job. Does not stop the session itself.
    pub fn cancel(&self, id: JobId) {
        self.post(Message::Cancel(id));
    }

    /// Drop every job and reset the output buffer.
    pub fn clear(&self) {
        self.post(Message::Clear);
    }

    pub fn set_default_session(&self, session_id: Option<String>) {
        self.post(Message::SetDefaultSession(session_id));
    }

    /// Latest published snapshot.
    pub fn board(&self) -> JobBoard {
        self.board.borrow().clone()
    }

    /// Watch receiver that changes whenever job state changes.
    pub fn subscribe(&self) -> watch::Receiver<JobBoard> {
        self.board.clone()
    }

    /// Wait for the first snapshot satisfying `predicate`.
    ///
    /// Returns the last known snapshot if the orchestrator stops first.
    pub async fn wait_until<F>(&self, mut predicate: F) -> JobBoard
    where
        F: FnMut(&JobBoard) -> bool,
    {
        let mut rx = self.board.clone();
        let reached = rx
            .wait_for(|board| predicate(board))
            .await
            .map(|board| board.clone());
        reached.unwrap_or_else(|_| rx.borrow().clone())
    }

    fn post(&self, message: Message) {
        if self.tx.send(message).is_err() {
            tracing::warn!("Orchestrator is not running; request dropped");
        }
    }
}

impl JobSignals for OrchestratorHandle {
    fn on_idle(&self, session_id: &str) {
        self.post(Message::Idle {
            session_id: session_id.to_string(),
        });
    }

    fn on_output(&self, session_id: &str, delta: &str) {
        self.post(Message::Output {
            session_id: session_id.to_string(),
            delta: delta.to_string(),
        });
    }

    fn on_error(&self, session_id: &str, message: &str) {
        self.post(Message::Error {
            session_id: session_id.to_string(),
            message: message.to_string(),
        });
    }

    fn on_feed_error(&self, message: &str) {
        self.post(Message::FeedError(message.to_string()));
    }
}

/// The actor owning the job queue.
pub struct JobOrchestrator {
    queue: JobQueue,
    gateway: Arc<dyn DispatchGateway>,
    rx: mpsc::UnboundedReceiver<Message>,
    /// Weak so the loop ends once every handle is dropped.
    self_tx: mpsc::WeakUnboundedSender<Message>,
    board_tx: watch::Sender<JobBoard>,
    internal: VecDeque<Message>,
}

impl JobOrchestrator {
    /// Start the orchestrator task and return a handle to it.
    pub fn spawn(
        gateway: Arc<dyn DispatchGateway>,
        config: OrchestratorConfig,
    ) -> (OrchestratorHandle, JoinHandle<()>) {
        let queue = JobQueue::new(config.retention, config.default_session);
        let (tx, rx) = mpsc::unbounded_channel();
        let (board_tx, board_rx) = watch::channel(queue.board());

        let orchestrator = Self {
            queue,
            gateway,
            rx,
            self_tx: tx.downgrade(),
            board_tx,
            internal: VecDeque::new(),
        };
        let task = tokio::spawn(orchestrator.run());

        (
            OrchestratorHandle {
                tx,
                board: board_rx,
            },
            task,
        )
    }

    async fn run(mut self) {
        tracing::debug!("Orchestrator started");
        while let Some(message) = self.rx.recv().await {
            self.internal.push_back(message);
            let mut changed = false;
            loop {
                while let Some(next) = self.internal.pop_front() {
                    changed |= self.apply(next);
                }
                match self.rx.try_recv() {
                    Ok(next) => self.internal.push_back(next),
                    Err(_) => break,
                }
            }
            if changed {
                self.board_tx.send_replace(self.queue.board());
            }
        }
        tracing::debug!("Orchestrator stopped");
    }

    /// Apply one message. Returns false when the board cannot have changed.
    fn apply(&mut self, message: Message) -> bool {
        match message {
            Message::Enqueue {
                id,
                command,
                session_id,
            } => {
                if self.queue.enqueue(id, command, session_id) {
                    self.internal.push_back(Message::CheckForWork);
                }
                true
            }
            Message::Cancel(id) => self.queue.cancel(id),
            Message::Clear => {
                self.queue.clear();
                true
            }
            Message::SetDefaultSession(session_id) => {
                self.queue.set_default_session(session_id);
                true
            }
            Message::Idle { session_id } => {
                if let Some(dispatch) = self.queue.on_idle(&session_id) {
                    self.dispatch(dispatch);
                }
                true
            }
            Message::CheckForWork => match self.queue.check_for_work() {
                Some(dispatch) => {
                    self.dispatch(dispatch);
                    true
                }
                None => false,
            },
            // Output only grows the buffer, which the board does not show.
            Message::Output { session_id, delta } => {
                self.queue.on_output(&session_id, &delta);
                false
            }
            Message::Error {
                session_id,
                message,
            } => {
                self.queue.on_error(&session_id, &message);
                true
            }
            Message::FeedError(message) => {
                self.queue.on_feed_error(&message);
                true
            }
            Message::DispatchFinished { job_id, result } => {
                let failed = self.queue.on_dispatch_result(job_id, result);
                if failed {
                    self.internal.push_back(Message::CheckForWork);
                }
                failed
            }
        }
    }

    /// Send the command in the background; the result comes back as a message.
    fn dispatch(&mut self, dispatch: Dispatch) {
        let Dispatch {
            job_id,
            session_id,
            command,
        } = dispatch;

        let Some(session_id) = session_id else {
            let err = GatewayError::NoSession { command };
            if self.queue.on_dispatch_result(job_id, Err(err.to_string())) {
                self.internal.push_back(Message::CheckForWork);
            }
            return;
        };

        let Some(tx) = self.self_tx.upgrade() else {
            return;
        };
        let gateway = self.gateway.clone();
        tokio::spawn(async move {
            let result = if gateway.send(&session_id, &command).await {
                Ok(())
            } else {
                Err(format!("Failed to dispatch command to session {}", session_id))
            };
            let _ = tx.send(Message::DispatchFinished { job_id, result });
        });
    }
}
