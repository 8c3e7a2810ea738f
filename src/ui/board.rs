use console::{Emoji, style};
use indicatif::{ProgressBar, ProgressStyle};
use std::collections::HashSet;
use std::time::Duration;

use crate::jobs::{Job, JobBoard, JobId, JobStatus};
use crate::ui::icons::{CANCELLED, CHECK, CROSS, PENDING, RUNNING, SPARKLE, WARN};

/// Longest command text shown on one status line.
const MAX_COMMAND_WIDTH: usize = 60;

pub fn status_icon(status: JobStatus) -> &'static Emoji<'static, 'static> {
    match status {
        JobStatus::Pending => &PENDING,
        JobStatus::Running => &RUNNING,
        JobStatus::Complete => &CHECK,
        JobStatus::Failed => &CROSS,
        JobStatus::Cancelled => &CANCELLED,
    }
}

/// Formats as `Xs` or `Xm Ys` when >= 60 seconds.
pub fn format_duration(elapsed: chrono::Duration) -> String {
    let secs = elapsed.num_seconds().max(0);
    if secs >= 60 {
        format!("{}m {}s", secs / 60, secs % 60)
    } else {
        format!("{}s", secs)
    }
}

fn truncate_command(command: &str) -> String {
    let first_line = command.lines().next().unwrap_or_default();
    if first_line.chars().count() > MAX_COMMAND_WIDTH {
        let cut: String = first_line.chars().take(MAX_COMMAND_WIDTH - 3).collect();
        format!("{}...", cut)
    } else {
        first_line.to_string()
    }
}

/// One status line for a job.
pub fn format_job_line(job: &Job) -> String {
    let status = match job.status {
        JobStatus::Pending => style(job.status).dim(),
        JobStatus::Running => style(job.status).cyan(),
        JobStatus::Complete => style(job.status).green(),
        JobStatus::Failed => style(job.status).red(),
        JobStatus::Cancelled => style(job.status).yellow(),
    };

    let mut line = format!(
        "{}{} {} {}",
        status_icon(job.status),
        style(job.id.short()).dim(),
        truncate_command(&job.command),
        status
    );

    if let (Some(started), Some(finished)) = (job.started_at, job.completed_at) {
        line.push_str(&format!(
            " {}",
            style(format!("({})", format_duration(finished - started))).dim()
        ));
    }
    if let Some(ref error) = job.error {
        line.push_str(&format!(": {}", style(error).red()));
    }
    line
}

/// Counts of finished jobs, e.g. `2 complete, 1 failed, 0 cancelled`.
pub fn format_summary(board: &JobBoard) -> String {
    format!(
        "{} complete, {} failed, {} cancelled",
        board.count(JobStatus::Complete),
        board.count(JobStatus::Failed),
        board.count(JobStatus::Cancelled)
    )
}

/// Live terminal view of a job board.
///
/// A spinner shows the active command; each job prints one line when it
/// reaches a terminal state.
pub struct BoardUI {
    spinner: ProgressBar,
    reported: HashSet<JobId>,
    show_output: bool,
}

impl BoardUI {
    /// `show_output` prints each completed job's output below its line.
    pub fn new(show_output: bool) -> Self {
        let spinner = ProgressBar::new_spinner();
        let spinner_style = ProgressStyle::default_spinner()
            .template("{spinner} {msg}")
            .unwrap_or_else(|_| ProgressStyle::default_spinner());
        spinner.set_style(spinner_style);
        spinner.enable_steady_tick(Duration::from_millis(100));

        Self {
            spinner,
            reported: HashSet::new(),
            show_output,
        }
    }

    fn print_line(&self, msg: impl AsRef<str>) {
        // Hidden bars drop println; write straight to stderr then.
        if self.spinner.is_hidden() {
            eprintln!("{}", msg.as_ref());
        } else {
            self.spinner.println(msg.as_ref());
        }
    }

    /// Print newly finished jobs and refresh the spinner.
    pub fn update(&mut self, board: &JobBoard) {
        for job in &board.jobs {
            if !job.status.is_terminal() || !self.reported.insert(job.id) {
                continue;
            }
            self.print_line(format_job_line(job));
            if self.show_output
                && let Some(ref output) = job.output
                && !output.trim().is_empty()
            {
                for line in output.trim_end().lines() {
                    self.print_line(format!("    {}", style(line).dim()));
                }
            }
        }

        let pending = board.count(JobStatus::Pending);
        let message = match board.active_command {
            Some(ref command) if pending > 0 => format!(
                "{} {}",
                style(truncate_command(command)).cyan(),
                style(format!("(+{} queued)", pending)).dim()
            ),
            Some(ref command) => style(truncate_command(command)).cyan().to_string(),
            None if pending > 0 => format!("Waiting for session ({} queued)", pending),
            None => "Idle".to_string(),
        };
        match board.last_error {
            Some(ref error) => self
                .spinner
                .set_message(format!("{} {}{}", message, WARN, style(error).red())),
            None => self.spinner.set_message(message),
        }
    }

    /// Stop the spinner and print the summary line.
    pub fn finish(&self, board: &JobBoard) {
        self.spinner.finish_and_clear();
        self.print_line(format!("{}{}", SPARKLE, format_summary(board)));
    }
}
