//! Configuration merger for CLI arguments and config files
//!
//! CLI arguments override file and environment values.

use super::parser::{Cli, Commands};
use crate::config::error::ConfigError;
use crate::config::{ConfigLoader, Settings};

/// Applies CLI overrides on top of file-based settings.
pub struct ConfigurationMerger {
    base_config: Settings,
}

impl ConfigurationMerger {
    pub fn new(base_config: Settings) -> Self {
        Self { base_config }
    }

    /// Loads the base settings the way the CLI asks for.
    ///
    /// `--config` switches to single-file mode and `--env` replaces
    /// `KEEL_APP_ENV`; otherwise the loader reads its usual environment.
    pub fn from_cli(cli: &Cli) -> Result<Self, ConfigError> {
        let mut loader = ConfigLoader::new()?;
        if let Some(path) = &cli.config {
            loader = loader.with_config_file(path);
        }
        if let Some(env) = cli.env {
            loader = loader.with_environment(env.into());
        }
        Ok(Self::new(loader.load()?))
    }

    /// Returns the base settings with CLI overrides applied and revalidated.
    ///
    /// A command's `--log-level` wins over the global `--verbose`/`--quiet`.
    pub fn merge_cli_args(&self, cli: &Cli) -> Result<Settings, ConfigError> {
        let mut config = self.base_config.clone();

        if cli.verbose {
            config.logger.level = "debug".to_string();
        } else if cli.quiet {
            config.logger.level = "error".to_string();
        }

        if let Some(Commands::Serve {
            host,
            port,
            log_level,
            ..
        }) = &cli.command
        {
            if let Some(host) = host {
                config.server.host = host.clone();
            }
            if let Some(port) = port {
                config.server.port = *port;
            }
            if let Some(level) = log_level {
                config.logger.level = level.as_str().to_string();
            }
        }

        config.validate()?;
        Ok(config)
    }

    pub fn config(&self) -> &Settings {
        &self.base_config
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use clap::Parser;

    fn merge(args: &[&str]) -> Settings {
        let cli = Cli::try_parse_from(args).unwrap();
        ConfigurationMerger::new(Settings::default())
            .merge_cli_args(&cli)
            .unwrap()
    }

    #[test]
    fn test_global_log_flags() {
        assert_eq!(merge(&["keel-rs", "--verbose"]).logger.level, "debug");
        assert_eq!(merge(&["keel-rs", "--quiet"]).logger.level, "error");
        assert_eq!(merge(&["keel-rs"]).logger.level, Settings::default().logger.level);
    }

    #[test]
    fn test_serve_overrides() {
        let config = merge(&["keel-rs", "serve", "--host", "0.0.0.0", "--port", "8080"]);
        assert_eq!(config.server.host, "0.0.0.0");
        assert_eq!(config.server.port, 8080);
    }

    #[test]
    fn test_command_log_level_overrides_global() {
        let config = merge(&["keel-rs", "--verbose", "serve", "--log-level", "warn"]);
        assert_eq!(config.logger.level, "warn");
    }

    #[test]
    fn test_migrate_leaves_server_untouched() {
        let config = merge(&["keel-rs", "migrate"]);
        assert_eq!(config.server, Settings::default().server);
    }

    #[test]
    fn test_merged_config_is_revalidated() {
        let mut base = Settings::default();
        base.database.backend = crate::config::StoreBackend::Postgres;
        let cli = Cli::try_parse_from(["keel-rs", "serve"]).unwrap();

        let result = ConfigurationMerger::new(base).merge_cli_args(&cli);
        assert!(matches!(result, Err(ConfigError::ValidationError { .. })));
    }
}
