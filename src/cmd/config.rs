//! Configuration view and validation commands: `planboard config`.

use anyhow::Result;
use std::path::Path;

use planboard::config::{CONFIG_FILE, PlanboardConfig, PlanboardToml, get_planboard_dir};

use super::super::ConfigCommands;

fn print_toml(toml: &PlanboardToml) {
    println!("[server]");
    println!("  base_url = \"{}\"", toml.server.base_url);
    println!("  request_timeout_secs = {}", toml.server.request_timeout_secs);
    println!();
    if let Some(ref session) = toml.session.default {
        println!("[session]");
        println!("  default = \"{}\"", session);
        println!();
    }
    println!("[jobs]");
    println!("  keep_complete = {}", toml.jobs.keep_complete);
    println!("  keep_failed = {}", toml.jobs.keep_failed);
    println!();
    println!("[logging]");
    println!("  level = \"{}\"", toml.logging.level);
    println!("  format = \"{}\"", toml.logging.format);
    println!();
}

pub fn cmd_config(
    project_dir: &Path,
    server_url: Option<String>,
    command: Option<ConfigCommands>,
) -> Result<()> {
    let planboard_dir = get_planboard_dir(project_dir);
    let config_path = planboard_dir.join(CONFIG_FILE);

    match command {
        None | Some(ConfigCommands::Show) => {
            println!();
            println!("Planboard Configuration");
            println!("=======================");
            println!();

            if config_path.exists() {
                println!("Config file: {}", config_path.display());
                println!();
                print_toml(&PlanboardToml::load(&config_path)?);
            } else {
                println!("No planboard.toml found at {}", config_path.display());
                println!();
                println!("Using default configuration:");
                print_toml(&PlanboardToml::default());
                println!("Run 'planboard config init' to create a planboard.toml file.");
                println!();
            }

            println!("Effective values (with env/CLI overrides):");
            let config = PlanboardConfig::with_cli_args(project_dir.to_path_buf(), false, server_url)?;
            println!("  server_url = \"{}\"", config.server_url());
            match config.default_session(None) {
                Some(session) => println!("  session = \"{}\"", session),
                None => println!("  session = (none)"),
            }
            println!();
        }
        Some(ConfigCommands::Validate) => {
            println!();
            println!("Validating configuration...");
            println!();

            let config = PlanboardConfig::with_cli_args(project_dir.to_path_buf(), false, server_url)?;
            if !config_path.exists() {
                println!("No planboard.toml found. Using defaults.");
            }

            let warnings = config.validate();
            if warnings.is_empty() {
                println!("Configuration is valid.");
            } else {
                println!("Configuration warnings:");
                for warning in warnings {
                    println!("  - {}", warning);
                }
            }
            println!();
        }
        Some(ConfigCommands::Init) => {
            if config_path.exists() {
                println!("planboard.toml already exists at {}", config_path.display());
                println!("Delete it first if you want to recreate it.");
                return Ok(());
            }

            if !planboard_dir.exists() {
                std::fs::create_dir_all(&planboard_dir)?;
            }

            PlanboardToml::default().save(&config_path)?;

            println!("Created planboard.toml at {}", config_path.display());
            println!();
            println!("You can now customize:");
            println!("  - [server] base_url, request_timeout_secs");
            println!("  - [session] default");
            println!("  - [jobs] keep_complete, keep_failed");
            println!("  - [logging] level, format");
            println!();
        }
    }

    Ok(())
}
