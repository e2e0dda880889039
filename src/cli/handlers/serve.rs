//! Serve command handler
//!
//! Validates configuration for `--dry-run`, otherwise runs the HTTP server.

use crate::config::{Settings, StoreBackend};
use crate::error::AppResult;
use crate::server::Server;

/// Handler for the serve command
pub struct ServeCommandHandler {
    config: Settings,
}

impl ServeCommandHandler {
    pub fn new(config: Settings) -> Self {
        Self { config }
    }

    /// Runs the server until shutdown, or only validates with `dry_run`.
    pub async fn execute(self, dry_run: bool) -> AppResult<()> {
        if dry_run {
            return self.validate_only();
        }
        Server::new(self.config).run().await
    }

    /// Validate configuration without starting the server
    pub fn validate_only(&self) -> AppResult<()> {
        self.config.validate()?;

        println!("✓ Configuration is valid");
        println!("✓ Server would bind to: {}", self.config.server.address());
        match self.config.database.backend {
            StoreBackend::Memory => println!("✓ Store backend: memory (data is not persisted)"),
            StoreBackend::Postgres => println!(
                "✓ Store backend: postgres (auto_migrate = {})",
                self.config.database.auto_migrate
            ),
        }
        println!("✓ Logger configuration is valid");
        println!("Dry run completed successfully - configuration is ready for deployment");
        Ok(())
    }

    pub fn config(&self) -> &Settings {
        &self.config
    }
}
