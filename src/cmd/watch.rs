//! Live event view: `planboard watch`.

use anyhow::{Context, Result};
use console::style;
use futures_util::StreamExt;
use std::collections::BTreeSet;

use planboard::config::PlanboardConfig;
use planboard::feed::{EventFeed, HttpEventFeed, Signal};
use planboard::ui::icons::SIGNAL;

pub async fn cmd_watch(config: &PlanboardConfig, sessions: &[String]) -> Result<()> {
    let base_url = config.checked_server_url()?;
    let sessions: BTreeSet<String> = if sessions.is_empty() {
        config
            .default_session(None)
            .into_iter()
            .collect()
    } else {
        sessions.iter().filter(|s| !s.is_empty()).cloned().collect()
    };
    if sessions.is_empty() {
        anyhow::bail!(
            "No session given. Pass --session, set PLANBOARD_SESSION, or set [session] default in planboard.toml"
        );
    }

    let feed = HttpEventFeed::new(&base_url, config.request_timeout());
    let mut stream = feed
        .subscribe()
        .await
        .with_context(|| format!("Failed to subscribe to {}", feed.url()))?;

    println!(
        "{}Watching {} (Ctrl-C to stop)",
        SIGNAL,
        style(sessions.iter().cloned().collect::<Vec<_>>().join(", ")).cyan()
    );

    let ctrl_c = tokio::signal::ctrl_c();
    tokio::pin!(ctrl_c);

    loop {
        tokio::select! {
            _ = &mut ctrl_c => break,
            item = stream.next() => {
                let Some(item) = item else { break };
                let event = item.context("Event stream failed")?;
                if let Some(signal) = event.signal()
                    && sessions.contains(signal.session_id())
                {
                    println!("{}", render(&signal));
                }
            }
        }
    }

    Ok(())
}

fn render(signal: &Signal) -> String {
    match signal {
        Signal::Idle { .. } => style(signal).green().to_string(),
        Signal::Output { .. } => signal.to_string(),
        Signal::Error { .. } => style(signal).red().to_string(),
    }
}
