//! qsoftmax command-line driver

use anyhow::{Context, Result};
use clap::Parser;
use console::style;
use qsoftmax_cli::commands::info;
use qsoftmax_cli::exit::{EXIT_SUCCESS, exit_code_for};
use qsoftmax_cli::logging::setup_logging;
use qsoftmax_cli::{Cli, Commands, ConfigAction};
use qsoftmax_common::{CONFIG_PATH_ENV, PipelineConfig};
use std::path::PathBuf;
use tracing::{debug, error};

fn main() {
    let cli = Cli::parse();

    let code = match run(cli) {
        Ok(()) => EXIT_SUCCESS,
        Err(e) => {
            error!("Command failed: {e:#}");
            eprintln!("{} {e}", style("error:").red().bold());
            for cause in e.chain().skip(1) {
                eprintln!("  Caused by: {cause}");
            }
            exit_code_for(&e)
        }
    };
    std::process::exit(code);
}

fn run(cli: Cli) -> Result<()> {
    let mut config = load_configuration(&cli)?;
    setup_logging(&config.logging)?;
    debug!(?config, "configuration loaded");

    match &cli.command {
        Some(Commands::Run(cmd)) => cmd.layered_over(&cli.run).execute(&config),
        None => cli.run.execute(&config),
        Some(Commands::Info { format }) => info::execute(*format),
        Some(Commands::Config { action }) => {
            cli.run.apply(&mut config);
            handle_config_command(*action, &cli, &config)
        }
    }
}

/// Defaults, then the TOML file, then `QSOFTMAX_*`, then global log flags.
/// Pipeline flags are applied by the command itself.
fn load_configuration(cli: &Cli) -> Result<PipelineConfig> {
    let mut config =
        PipelineConfig::load(cli.config.as_deref()).context("Failed to load configuration")?;
    if let Some(level) = &cli.log_level {
        config.logging.level = level.clone();
    }
    if let Some(format) = &cli.log_format {
        config.logging.format = format.clone();
    }
    config.validate().context("Invalid configuration")?;
    Ok(config)
}

fn config_path(cli: &Cli) -> Option<PathBuf> {
    cli.config.clone().or_else(|| std::env::var_os(CONFIG_PATH_ENV).map(PathBuf::from))
}

fn handle_config_command(action: ConfigAction, cli: &Cli, config: &PipelineConfig) -> Result<()> {
    match action {
        ConfigAction::Show => {
            let text = config.to_toml().context("Failed to serialize configuration")?;
            print!("{text}");
        }
        ConfigAction::Path => match config_path(cli) {
            Some(path) => println!("{}", path.display()),
            None => println!("{}", style("(none: using defaults and environment)").dim()),
        },
    }
    Ok(())
}
