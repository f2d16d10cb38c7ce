use anyhow::{Context, Result};
use clap::Parser;
use std::path::PathBuf;

use dockerlink::delegate::resolve::{CLI_BINARY, Lookup};
use dockerlink::delegate::{DelegateError, Delegation};
use dockerlink::{log_debug, utils};

/// dockerlink - run docker commands through the classic CLI and turn
/// container, image and volume identifiers in its output into terminal links.
///
/// Usage:
///   dockerlink [DOCKERLINK FLAGS] <docker arguments...>
///
/// Everything that is not one of the flags below is handed to the delegated
/// executable untouched, including `--help` and `--version`.
///
/// Flags / env:
///   --dockerlink-verbose     Increase shim log verbosity (repeatable)
///   --dockerlink-quiet       Errors only
///   --dockerlink-no-links    Plain passthrough of stdout (or DOCKERLINK_NO_LINKS)
///   --dockerlink-cli PATH    Delegated executable (or DOCKER_COM_DOCKER_CLI)
///
/// Resolution of the delegated executable when no override is given:
///   com.docker.cli next to this binary, then the first match on PATH.
///
/// Examples:
///   dockerlink ps --all
///   dockerlink run --rm -it alpine sh
///   DOCKERLINK_NO_LINKS=1 dockerlink images
#[derive(Parser, Debug)]
#[command(
    name = "dockerlink",
    about = "dockerlink - hyperlink docker identifiers in delegated CLI output",
    disable_help_flag = true,
    disable_version_flag = true,
    disable_help_subcommand = true
)]
pub struct Cli {
    /// Increase verbosity (repeatable)
    #[arg(long = "dockerlink-verbose", action = clap::ArgAction::Count)]
    verbose: u8,

    /// Silence all non-error shim output
    #[arg(long = "dockerlink-quiet")]
    quiet: bool,

    /// Do not rewrite identifiers, pass stdout through as is
    #[arg(
        long = "dockerlink-no-links",
        env = "DOCKERLINK_NO_LINKS",
        value_parser = clap::builder::FalseyValueParser::new()
    )]
    no_links: bool,

    /// Delegated executable, bypassing lookup
    #[arg(long = "dockerlink-cli", env = "DOCKER_COM_DOCKER_CLI", value_name = "PATH")]
    cli: Option<PathBuf>,

    /// Arguments passed to the delegated executable
    #[arg(
        value_name = "ARGS",
        trailing_var_arg = true,
        allow_hyphen_values = true
    )]
    args: Vec<String>,
}

fn main() -> Result<()> {
    let cli = Cli::parse();

    // Initialize logging
    let level = utils::derive_level(cli.verbose, cli.quiet);
    utils::init_logging(level);

    // Resolution failure is fatal and exits here.
    let executable = Lookup::from_env(cli.cli.clone()).resolve_or_exit(CLI_BINARY);

    let rt = tokio::runtime::Runtime::new().context("Failed to create Tokio runtime")?;
    let outcome = rt.block_on(
        Delegation::new(&executable)
            .enrich(!cli.no_links)
            .run(&cli.args),
    );

    match outcome {
        Ok(()) => Ok(()),
        Err(e @ DelegateError::Exited(_)) => {
            log_debug!("{e}");
            std::process::exit(e.exit_code());
        }
        Err(e) => {
            eprintln!(
                "{}",
                utils::output::color(utils::output::Color::Red, e.to_string())
            );
            std::process::exit(e.exit_code());
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn parse(args: &[&str]) -> Cli {
        Cli::try_parse_from(std::iter::once("dockerlink").chain(args.iter().copied())).unwrap()
    }

    #[test]
    fn docker_flags_pass_through() {
        let cli = parse(&["ps", "-a", "--format", "{{.ID}}"]);
        assert_eq!(cli.args, vec!["ps", "-a", "--format", "{{.ID}}"]);
        assert_eq!(cli.verbose, 0);
    }

    #[test]
    fn help_and_version_reach_the_delegate() {
        assert_eq!(parse(&["--help"]).args, vec!["--help"]);
        assert_eq!(parse(&["--version"]).args, vec!["--version"]);
        assert_eq!(parse(&["-v"]).args, vec!["-v"]);
    }

    #[test]
    fn shim_flags_before_arguments() {
        let cli = parse(&[
            "--dockerlink-verbose",
            "--dockerlink-verbose",
            "--dockerlink-no-links",
            "--dockerlink-cli",
            "/opt/docker/com.docker.cli",
            "run",
            "--rm",
            "alpine",
        ]);
        assert_eq!(cli.verbose, 2);
        assert!(cli.no_links);
        assert_eq!(cli.cli, Some(PathBuf::from("/opt/docker/com.docker.cli")));
        assert_eq!(cli.args, vec!["run", "--rm", "alpine"]);
    }

    #[test]
    fn no_arguments_is_fine() {
        let cli = parse(&[]);
        assert!(cli.args.is_empty());
    }
}
