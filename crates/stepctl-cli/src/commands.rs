//! Subcommand dispatch.

use std::io::{self, BufRead, Write};
use std::path::Path;
use std::sync::Arc;
use std::time::Duration;

use stepctl_deploy::{
    App, AppOptions, CancellationToken, DeployConfig, DeployOptions, ExecutionRequest,
};
use stepctl_remote::http::{build_http_client, HttpRuleApi, HttpScheduleApi, HttpStateMachineApi};
use thiserror::Error;
use tracing::{debug, info};

use crate::Command;

/// Workflows wired to the HTTP adapters.
pub type HttpApp = App<HttpStateMachineApi, HttpRuleApi, HttpScheduleApi>;

/// Errors raised by the binary itself.
#[derive(Debug, Error)]
pub enum CliError {
    /// Neither the flag nor the configuration names an endpoint.
    #[error("no endpoint configured: set endpoint_url or pass --endpoint-url")]
    NoEndpoint,

    /// The delete confirmation did not match.
    #[error("delete aborted")]
    Aborted,

    /// Ctrl-C arrived before the command finished.
    #[error("interrupted")]
    Interrupted,
}

/// Load the configuration and build the workflows over HTTP.
pub(crate) fn build_app(
    config_path: &Path,
    endpoint_url: Option<&str>,
    timeout: Duration,
    color: bool,
) -> anyhow::Result<HttpApp> {
    let config = DeployConfig::load(config_path)?;
    let endpoint = endpoint_url
        .map(str::to_string)
        .or_else(|| config.endpoint_url.clone())
        .ok_or(CliError::NoEndpoint)?;
    debug!(endpoint = %endpoint, config = %config_path.display(), "Using endpoint");

    let client = build_http_client(timeout)?;
    Ok(App::new(
        config,
        Arc::new(HttpStateMachineApi::new(client.clone(), &endpoint)),
        Arc::new(HttpRuleApi::new(client.clone(), &endpoint)),
        Arc::new(HttpScheduleApi::new(client, &endpoint)),
        AppOptions {
            color,
            ..AppOptions::default()
        },
    ))
}

/// Run one subcommand and print its report to stdout.
///
/// Commands other than `execute` stop at the next await point when `cancel`
/// fires. `execute` handles cancellation itself so it can stop the execution.
pub(crate) async fn run(
    app: &HttpApp,
    command: Command,
    cancel: &CancellationToken,
) -> anyhow::Result<()> {
    if matches!(command, Command::Execute { .. }) {
        return dispatch(app, command, cancel).await;
    }

    tokio::select! {
        result = dispatch(app, command, cancel) => result,
        () = cancel.cancelled() => Err(CliError::Interrupted.into()),
    }
}

async fn dispatch(
    app: &HttpApp,
    command: Command,
    cancel: &CancellationToken,
) -> anyhow::Result<()> {
    match command {
        Command::Deploy {
            dry_run,
            skip_trigger,
            version_description,
        } => {
            let options = DeployOptions {
                dry_run,
                skip_trigger,
                version_description,
            };
            print!("{}", app.deploy(&options).await?);
        }
        Command::Rollback {
            dry_run,
            keep_version,
        } => print!("{}", app.rollback(dry_run, keep_version).await?),
        Command::Diff { unified, qualifier } => {
            print!("{}", app.diff(unified, qualifier.as_ref()).await?);
        }
        Command::Versions {
            delete,
            keep_versions,
        } => print!("{}", app.versions(delete, keep_versions).await?),
        Command::Status => print!("{}", app.status().await?),
        Command::Delete { dry_run, force } => {
            let name = app.config().state_machine.name.clone();
            if !dry_run && !force {
                let confirmed = confirm(io::stdin().lock(), io::stderr(), &name)?;
                if !confirmed {
                    return Err(CliError::Aborted.into());
                }
            }
            print!("{}", app.delete(dry_run).await?);
            info!(state_machine = %name, dry_run, "Delete finished");
        }
        Command::Execute { input, name, wait } => {
            let request = ExecutionRequest { input, name, wait };
            print!("{}", app.execute(&request, cancel).await?);
        }
    }
    Ok(())
}

/// Ask for the state machine name to be typed back before a delete.
fn confirm(mut input: impl BufRead, mut prompt: impl Write, name: &str) -> io::Result<bool> {
    write!(prompt, "Type the state machine name ({name}) to confirm deletion: ")?;
    prompt.flush()?;
    let mut line = String::new();
    input.read_line(&mut line)?;
    Ok(line.trim() == name)
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Cursor;

    #[test]
    fn confirm_requires_exact_name() {
        let mut prompt = Vec::new();
        assert!(confirm(Cursor::new("orders\n"), &mut prompt, "orders").unwrap());
        assert!(String::from_utf8(prompt).unwrap().contains("(orders)"));

        assert!(!confirm(Cursor::new("order\n"), Vec::new(), "orders").unwrap());
        assert!(!confirm(Cursor::new(""), Vec::new(), "orders").unwrap());
    }

    #[test]
    fn missing_endpoint_is_reported() {
        let dir = tempfile::tempdir().unwrap();
        std::fs::write(dir.path().join("definition.json"), r#"{"StartAt":"A","States":{}}"#)
            .unwrap();
        let path = dir.path().join("stepctl.yaml");
        std::fs::write(
            &path,
            "state_machine:\n  name: orders\n  definition: definition.json\n  role_arn: arn:aws:iam::123456789012:role/sfn\n",
        )
        .unwrap();

        let Err(err) = build_app(&path, None, Duration::from_secs(1), false) else {
            panic!("expected an endpoint error");
        };
        assert!(matches!(err.downcast_ref::<CliError>(), Some(CliError::NoEndpoint)));

        let endpoint = Some("http://localhost:8083");
        assert!(build_app(&path, endpoint, Duration::from_secs(1), false).is_ok());
    }
}
