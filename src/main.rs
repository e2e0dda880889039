use clap::Parser;
use keel_rs::cli::{Cli, execute_command, init_logger_from_settings, load_and_merge_config};

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();

    let settings = load_and_merge_config(&cli)?;
    let _log_handle = init_logger_from_settings(&settings)?;

    tracing::debug!(version = keel_rs::pkg_version(), "Starting keel-rs");
    execute_command(&cli, settings).await?;
    Ok(())
}
