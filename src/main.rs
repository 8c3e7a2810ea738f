use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use std::path::PathBuf;

use planboard::config::PlanboardConfig;

mod cmd;

#[derive(Parser)]
#[command(name = "planboard")]
#[command(
    version,
    about = "Queue commands into a task-runner session and track them as background jobs"
)]
pub struct Cli {
    #[arg(short, long, global = true)]
    pub verbose: bool,

    #[arg(long, global = true)]
    pub project_dir: Option<PathBuf>,

    /// Task-runner base URL. Overrides planboard.toml and PLANBOARD_SERVER_URL.
    #[arg(long, global = true)]
    pub server_url: Option<String>,

    #[command(subcommand)]
    pub command: Commands,
}

#[derive(Subcommand)]
pub enum Commands {
    /// Queue commands and track them until every job finishes
    Run {
        /// Session to run in (defaults to PLANBOARD_SESSION or [session] default)
        #[arg(short, long)]
        session: Option<String>,

        /// Send the commands and exit without tracking them
        #[arg(long)]
        no_wait: bool,

        /// Print each completed job's output
        #[arg(long)]
        show_output: bool,

        /// Commands to queue, in order. Slash commands are sent as `/name args`.
        #[arg(required = true)]
        commands: Vec<String>,
    },
    /// Print task-runner events for one or more sessions until Ctrl-C
    Watch {
        /// Session to watch; repeat for several
        #[arg(short, long = "session")]
        sessions: Vec<String>,
    },
    /// View, initialize or validate configuration
    Config {
        #[command(subcommand)]
        command: Option<ConfigCommands>,
    },
}

#[derive(Subcommand, Clone)]
pub enum ConfigCommands {
    /// Show current configuration
    Show,
    /// Validate configuration and show any warnings
    Validate,
    /// Initialize a default planboard.toml file
    Init,
}

#[tokio::main]
async fn main() -> Result<()> {
    dotenvy::dotenv().ok();

    let cli = Cli::parse();
    let project_dir = match cli.project_dir.clone() {
        Some(dir) => dir,
        None => std::env::current_dir().context("Failed to get current directory")?,
    };

    match &cli.command {
        Commands::Config { command } => {
            cmd::cmd_config(&project_dir, cli.server_url.clone(), command.clone())?
        }
        Commands::Run {
            session,
            no_wait,
            show_output,
            commands,
        } => {
            let config = load_config(&cli, project_dir)?;
            let _guard = init_logging(&config)?;
            let options = cmd::RunOptions {
                session: session.clone(),
                no_wait: *no_wait,
                show_output: *show_output,
            };
            cmd::cmd_run(&config, commands, options).await?;
        }
        Commands::Watch { sessions } => {
            let config = load_config(&cli, project_dir)?;
            let _guard = init_logging(&config)?;
            cmd::cmd_watch(&config, sessions).await?;
        }
    }

    Ok(())
}

fn load_config(cli: &Cli, project_dir: PathBuf) -> Result<PlanboardConfig> {
    PlanboardConfig::with_cli_args(project_dir, cli.verbose, cli.server_url.clone())
}

fn init_logging(config: &PlanboardConfig) -> Result<tracing_appender::non_blocking::WorkerGuard> {
    planboard::logging::init(
        &config.log_dir(),
        &config.toml.logging.level,
        config.toml.logging.format(),
        config.verbose,
    )
}
