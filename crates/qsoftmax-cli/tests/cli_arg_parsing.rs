//! Argument parsing through the exported clap tree (no process spawning).

use clap::Parser;
use qsoftmax_cli::output::OutputFormat;
use qsoftmax_cli::{Cli, Commands, ConfigAction, build_cli};
use qsoftmax_common::{DType, Device};

#[test]
fn command_name_is_qsoftmax() {
    assert_eq!(build_cli().get_name(), "qsoftmax");
    build_cli().debug_assert();
}

#[test]
fn bare_invocation_runs_with_top_level_flags() {
    let cli = Cli::parse_from(["qsoftmax", "--dtype", "s8", "--batch", "2"]);
    assert!(cli.command.is_none());
    assert_eq!(cli.run.dtype, Some(DType::S8));
    assert_eq!(cli.run.batch, Some(2));
}

#[test]
fn run_subcommand_parses_its_own_flags() {
    let cli = Cli::parse_from(["qsoftmax", "run", "--device", "cuda:1", "--format", "json"]);
    let Some(Commands::Run(run)) = cli.command else { panic!("expected run") };
    assert_eq!(run.device, Some(Device::Cuda(1)));
    assert_eq!(run.format, Some(OutputFormat::Json));
}

#[test]
fn global_flags_follow_subcommands() {
    let cli = Cli::parse_from(["qsoftmax", "config", "show", "--config", "q.toml", "--log-level", "debug"]);
    assert!(matches!(cli.command, Some(Commands::Config { action: ConfigAction::Show })));
    assert_eq!(cli.config.as_deref(), Some(std::path::Path::new("q.toml")));
    assert_eq!(cli.log_level.as_deref(), Some("debug"));
}

#[test]
fn info_accepts_json() {
    let cli = Cli::parse_from(["qsoftmax", "info", "--format", "json"]);
    assert!(matches!(cli.command, Some(Commands::Info { format: OutputFormat::Json })));
}
