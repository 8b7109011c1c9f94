//! stepctl - deploy Step Functions state machines and their triggers.
//!
//! This is the entry point for the `stepctl` binary.

mod commands;

use std::io::IsTerminal;
use std::path::PathBuf;
use std::time::Duration;

use clap::{Parser, Subcommand};
use stepctl_deploy::{CancellationToken, Qualifier};
use tracing_subscriber::EnvFilter;

/// stepctl - deploy Step Functions state machines and their triggers.
#[derive(Parser, Debug)]
#[command(name = "stepctl")]
#[command(author, version, about, long_about = None)]
struct Args {
    /// Path to the configuration file.
    #[arg(
        short,
        long,
        global = true,
        env = "STEPCTL_CONFIG",
        default_value = "stepctl.yaml"
    )]
    config: PathBuf,

    /// Control plane endpoint, overriding `endpoint_url` in the configuration.
    #[arg(long, global = true, env = "STEPCTL_ENDPOINT_URL")]
    endpoint_url: Option<String>,

    /// Per-request timeout in seconds.
    #[arg(long, global = true, default_value_t = 30)]
    timeout: u64,

    /// Disable colored output.
    #[arg(long, global = true, env = "NO_COLOR")]
    no_color: bool,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Publish a new version, route `current` to it and reconcile triggers.
    Deploy {
        /// Show what would change without writing anything.
        #[arg(long)]
        dry_run: bool,

        /// Leave event rules and schedules untouched.
        #[arg(long)]
        skip_trigger: bool,

        /// Description recorded on the published version.
        #[arg(long)]
        version_description: Option<String>,
    },

    /// Route `current` back to the previous version.
    Rollback {
        /// Show the target version without writing anything.
        #[arg(long)]
        dry_run: bool,

        /// Keep the version rolled back from instead of deleting it.
        #[arg(long)]
        keep_version: bool,
    },

    /// Compare the configuration with what is deployed.
    Diff {
        /// Print a unified diff with context lines.
        #[arg(long)]
        unified: bool,

        /// Version number or alias to compare against.
        #[arg(long)]
        qualifier: Option<Qualifier>,
    },

    /// List published versions, or purge old ones.
    Versions {
        /// Delete versions beyond the keep count.
        #[arg(long)]
        delete: bool,

        /// Number of versions to keep, overriding `keep_versions`.
        #[arg(long)]
        keep_versions: Option<usize>,
    },

    /// Show the state machine, its `current` alias and its triggers.
    Status,

    /// Delete owned triggers and the state machine.
    Delete {
        /// Show what would be deleted without writing anything.
        #[arg(long)]
        dry_run: bool,

        /// Skip the confirmation prompt.
        #[arg(long)]
        force: bool,
    },

    /// Start an execution through the `current` alias.
    Execute {
        /// JSON input for the execution.
        #[arg(long, default_value = "{}")]
        input: String,

        /// Execution name. A random one is generated when omitted.
        #[arg(long)]
        name: Option<String>,

        /// Wait for the execution to finish.
        #[arg(long)]
        wait: bool,
    },
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // Parse arguments
    let args = Args::parse();

    // Initialize logging
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| "info".into()))
        .with_writer(std::io::stderr)
        .init();

    let color = !args.no_color && std::io::stdout().is_terminal();
    colored::control::set_override(color);

    // Ctrl-C cancels whatever is in flight
    let cancel = CancellationToken::new();
    let interrupt = cancel.clone();
    tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            tracing::warn!("Interrupted");
            interrupt.cancel();
        }
    });

    let app = commands::build_app(
        &args.config,
        args.endpoint_url.as_deref(),
        Duration::from_secs(args.timeout),
        color,
    )?;
    commands::run(&app, args.command, &cancel).await
}

#[cfg(test)]
mod tests {
    use super::*;
    use clap::CommandFactory;

    #[test]
    fn args_are_consistent() {
        Args::command().debug_assert();
    }

    #[test]
    fn parses_global_flags_after_subcommand() {
        let args = Args::try_parse_from([
            "stepctl",
            "deploy",
            "--dry-run",
            "--config",
            "conf/prod.yaml",
            "--endpoint-url",
            "http://localhost:8083",
        ])
        .unwrap();

        assert_eq!(args.config, PathBuf::from("conf/prod.yaml"));
        assert_eq!(args.endpoint_url.as_deref(), Some("http://localhost:8083"));
        assert!(matches!(
            args.command,
            Command::Deploy {
                dry_run: true,
                skip_trigger: false,
                ..
            }
        ));
    }

    #[test]
    fn parses_qualifier() {
        let args = Args::try_parse_from(["stepctl", "diff", "--qualifier", "7"]).unwrap();
        assert!(matches!(
            args.command,
            Command::Diff {
                qualifier: Some(Qualifier::Version(7)),
                unified: false,
            }
        ));

        assert!(Args::try_parse_from(["stepctl", "diff", "--qualifier", "a:b"]).is_err());
    }

    #[test]
    fn execute_defaults_to_empty_object() {
        let args = Args::try_parse_from(["stepctl", "execute", "--wait"]).unwrap();
        assert!(matches!(
            args.command,
            Command::Execute { ref input, name: None, wait: true } if input == "{}"
        ));
    }
}
