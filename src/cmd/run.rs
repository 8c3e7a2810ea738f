//! Queue commands and follow them to completion: `planboard run`.

use anyhow::{Context, Result};
use console::style;
use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;

use planboard::config::PlanboardConfig;
use planboard::feed::{EventListener, HttpEventFeed};
use planboard::gateway::{DispatchGateway, HttpGateway};
use planboard::jobs::{
    JobBoard, JobId, JobOrchestrator, JobStatus, OrchestratorConfig, OrchestratorHandle,
    RetentionPolicy,
};
use planboard::ui::BoardUI;
use planboard::ui::icons::{CHECK, CROSS};

#[derive(Debug, Clone, Default)]
pub struct RunOptions {
    pub session: Option<String>,
    pub no_wait: bool,
    pub show_output: bool,
}

pub async fn cmd_run(config: &PlanboardConfig, commands: &[String], options: RunOptions) -> Result<()> {
    let base_url = config.checked_server_url()?;
    let session = config.default_session(options.session.as_deref()).context(
        "No session given. Pass --session, set PLANBOARD_SESSION, or set [session] default in planboard.toml",
    )?;

    let gateway = Arc::new(HttpGateway::new(&base_url, config.request_timeout()));

    if options.no_wait {
        return send_all(gateway.as_ref(), &session, commands).await;
    }

    tracing::info!(session = %session, jobs = commands.len(), "Starting run");

    // Every job of this run stays on the board until it finishes, so a
    // missing id always means "not applied yet".
    let configured = config.retention();
    let retention = RetentionPolicy {
        keep_complete: configured.keep_complete.max(commands.len()),
        keep_failed: configured.keep_failed.max(commands.len()),
    };
    let (handle, task) = JobOrchestrator::spawn(
        gateway,
        OrchestratorConfig {
            retention,
            default_session: Some(session.clone()),
        },
    );

    let feed = Arc::new(HttpEventFeed::new(&base_url, config.request_timeout()));
    let mut listener = EventListener::new(feed, Arc::new(handle.clone()));
    listener.start([session.clone()]);
    // Idle events sent before the subscription is live would be lost.
    if !listener.ready().await {
        let reason = feed_failure(&handle).await;
        anyhow::bail!("Could not subscribe to events at {}: {}", base_url, reason);
    }

    let ids: Vec<JobId> = commands
        .iter()
        .map(|command| handle.enqueue(command.clone(), None))
        .collect();

    let mut ui = BoardUI::new(options.show_output);
    let mut outcomes: HashMap<JobId, JobStatus> = HashMap::new();
    let mut board_rx = handle.subscribe();
    let ctrl_c = tokio::signal::ctrl_c();
    tokio::pin!(ctrl_c);
    let mut interrupted = false;
    let mut feed_lost = None;

    loop {
        let board = board_rx.borrow_and_update().clone();
        ui.update(&board);
        record_outcomes(&board, &ids, &mut outcomes);
        if outcomes.len() == ids.len() {
            break;
        }

        tokio::select! {
            changed = board_rx.changed() => {
                if changed.is_err() {
                    break;
                }
            }
            _ = listener.closed() => {
                let reason = feed_failure(&handle).await;
                tracing::warn!(error = %reason, "Event feed lost; cancelling outstanding jobs");
                for id in &ids {
                    handle.cancel(*id);
                }
                feed_lost = Some(reason);
                break;
            }
            _ = &mut ctrl_c, if !interrupted => {
                interrupted = true;
                tracing::info!("Interrupted; cancelling outstanding jobs");
                for id in &ids {
                    handle.cancel(*id);
                }
            }
        }
    }

    listener.stop();
    let board = if feed_lost.is_some() {
        settle(&handle).await
    } else {
        handle.board()
    };
    record_outcomes(&board, &ids, &mut outcomes);
    ui.update(&board);
    ui.finish(&board);
    drop(listener);
    drop(handle);
    let _ = task.await;

    let failed = outcomes
        .values()
        .filter(|s| **s == JobStatus::Failed)
        .count();
    if let Some(reason) = feed_lost {
        anyhow::bail!("Lost the event feed: {}", reason);
    }
    if failed > 0 {
        anyhow::bail!("{} of {} job(s) failed", failed, ids.len());
    }
    if interrupted {
        anyhow::bail!("Run interrupted");
    }
    Ok(())
}

/// Remember the final status of each of our jobs that has finished.
fn record_outcomes(board: &JobBoard, ids: &[JobId], outcomes: &mut HashMap<JobId, JobStatus>) {
    for id in ids {
        if let Some(job) = board.get(*id)
            && job.status.is_terminal()
        {
            outcomes.insert(*id, job.status);
        }
    }
}

/// Reason the event subscription failed, as recorded on the board.
async fn feed_failure(handle: &OrchestratorHandle) -> String {
    let waited = tokio::time::timeout(
        Duration::from_secs(1),
        handle.wait_until(|b| b.last_error.is_some()),
    )
    .await;
    waited
        .ok()
        .and_then(|board| board.last_error)
        .unwrap_or_else(|| "event stream ended".to_string())
}

/// Board once the cancellations have been applied.
async fn settle(handle: &OrchestratorHandle) -> JobBoard {
    tokio::time::timeout(Duration::from_secs(1), handle.wait_until(JobBoard::is_settled))
        .await
        .unwrap_or_else(|_| handle.board())
}

/// Send every command once, in order, without tracking.
async fn send_all(gateway: &dyn DispatchGateway, session: &str, commands: &[String]) -> Result<()> {
    let mut failed = 0;
    for command in commands {
        if gateway.send(session, command).await {
            println!("{}{} {}", CHECK, style("sent").green(), command);
        } else {
            failed += 1;
            println!("{}{} {}", CROSS, style("not sent").red(), command);
        }
    }
    if failed > 0 {
        anyhow::bail!("Failed to dispatch {} command(s) to session {}", failed, session);
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use planboard::jobs::JobQueue;

    #[test]
    fn test_record_outcomes_ignores_jobs_not_yet_on_board() {
        let mut queue = JobQueue::default();
        let a = JobId::new();
        let b = JobId::new();
        let c = JobId::new();
        queue.enqueue(a, "a".to_string(), Some("s1".to_string()));
        queue.enqueue(b, "b".to_string(), Some("s1".to_string()));
        queue.check_for_work();
        queue.on_error("s1", "boom");

        let mut outcomes = HashMap::new();
        record_outcomes(&queue.board(), &[a, b, c], &mut outcomes);

        assert_eq!(outcomes.get(&a), Some(&JobStatus::Failed));
        assert_eq!(outcomes.get(&b), None);
        assert_eq!(outcomes.get(&c), None);

        queue.enqueue(c, "c".to_string(), Some("s1".to_string()));
        queue.on_idle("s1");
        queue.on_idle("s1");
        queue.on_idle("s1");
        record_outcomes(&queue.board(), &[a, b, c], &mut outcomes);
        assert_eq!(outcomes.get(&b), Some(&JobStatus::Complete));
        assert_eq!(outcomes.get(&c), Some(&JobStatus::Complete));
    }
}
