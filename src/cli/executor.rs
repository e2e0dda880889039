//! Command executor for dispatching CLI commands

use super::handlers::{MigrateCommandHandler, ServeCommandHandler};
use super::parser::{Cli, Commands};
use crate::config::Settings;
use crate::error::{AppError, AppResult};

/// Privileged ports need root on most systems.
const PRIVILEGED_PORT_LIMIT: u16 = 1024;

/// Dispatches the parsed command; no subcommand means `serve`.
///
/// # Errors
/// Returns argument validation errors and whatever the handler returns.
pub async fn execute_command(cli: &Cli, settings: Settings) -> AppResult<()> {
    cli.validate().map_err(|reason| AppError::Validation {
        field: "cli_arguments".to_string(),
        reason,
    })?;

    match &cli.command {
        Some(Commands::Serve { dry_run, .. }) => {
            warn_privileged_port(&settings);
            ServeCommandHandler::new(settings).execute(*dry_run).await
        }
        None => ServeCommandHandler::new(settings).execute(false).await,
        Some(Commands::Migrate { dry_run, rollback }) => {
            if let Some(steps) = rollback {
                if *steps > 50 {
                    tracing::warn!(steps, "Rolling back a large number of migrations");
                }
            }
            MigrateCommandHandler::new(settings)
                .execute(*dry_run, *rollback)
                .await
        }
    }
}

fn warn_privileged_port(settings: &Settings) {
    if settings.server.port < PRIVILEGED_PORT_LIMIT {
        tracing::warn!(
            port = settings.server.port,
            "Binding to a port below 1024 typically requires root privileges"
        );
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use clap::Parser;

    #[tokio::test]
    async fn test_execute_serve_dry_run() {
        let cli = Cli::try_parse_from(["keel-rs", "serve", "--dry-run"]).unwrap();
        assert!(execute_command(&cli, Settings::default()).await.is_ok());
    }

    #[tokio::test]
    async fn test_execute_migrate_on_memory_backend_fails() {
        let cli = Cli::try_parse_from(["keel-rs", "migrate"]).unwrap();
        let result = execute_command(&cli, Settings::default()).await;
        assert!(matches!(result, Err(AppError::Validation { .. })));
    }

    #[tokio::test]
    async fn test_conflicting_args_are_rejected() {
        let cli = Cli {
            command: Some(Commands::Migrate {
                dry_run: true,
                rollback: Some(5),
            }),
            config: None,
            env: None,
            verbose: false,
            quiet: false,
        };

        match execute_command(&cli, Settings::default()).await {
            Err(AppError::Validation { field, .. }) => assert_eq!(field, "cli_arguments"),
            other => panic!("Expected validation error, got {:?}", other),
        }
    }
}
