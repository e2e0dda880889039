//! Configuration validation logic
//!
//! Range and format checks run after loading and after CLI overrides.

use crate::config::error::ConfigError;
use crate::config::settings::{DatabaseConfig, LoggerSettings, ServerConfig, Settings, StoreBackend};

const POSTGRES_SCHEMES: &[&str] = &["postgres://", "postgresql://"];

impl ServerConfig {
    /// Port must be non-zero and both timeouts positive.
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.host.trim().is_empty() {
            return Err(ConfigError::validation("server.host", "Host cannot be empty."));
        }

        if self.port == 0 {
            return Err(ConfigError::validation(
                "server.port",
                "Port must be between 1 and 65535. Please specify a valid port number.",
            ));
        }

        if self.request_timeout == 0 {
            return Err(ConfigError::validation(
                "server.request_timeout",
                "Request timeout must be greater than 0 seconds.",
            ));
        }

        if self.keep_alive_timeout == 0 {
            return Err(ConfigError::validation(
                "server.keep_alive_timeout",
                "Keep-alive timeout must be greater than 0 seconds.",
            ));
        }

        Ok(())
    }
}

impl DatabaseConfig {
    /// Pool limits always apply; the URL is only required by the postgres
    /// backend.
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.backend == StoreBackend::Postgres {
            if self.url.is_empty() {
                return Err(ConfigError::validation(
                    "database.url",
                    "Database URL is required by the postgres backend.",
                ));
            }
            if !POSTGRES_SCHEMES.iter().any(|scheme| self.url.starts_with(scheme)) {
                return Err(ConfigError::validation(
                    "database.url",
                    "Invalid database URL format. Expected postgres://[user:password@]host[:port]/database",
                ));
            }
        }

        if self.max_connections == 0 {
            return Err(ConfigError::validation(
                "database.max_connections",
                "Max connections must be greater than 0.",
            ));
        }

        if self.min_connections > self.max_connections {
            return Err(ConfigError::ValidationError {
                field: "database.min_connections".to_string(),
                message: format!(
                    "Min connections ({}) cannot exceed max connections ({}).",
                    self.min_connections, self.max_connections
                ),
            });
        }

        if self.connection_timeout == 0 {
            return Err(ConfigError::validation(
                "database.connection_timeout",
                "Connection timeout must be greater than 0 seconds.",
            ));
        }

        Ok(())
    }
}

impl LoggerSettings {
    /// Runs the same conversion the logger uses at startup.
    pub fn validate(&self) -> Result<(), ConfigError> {
        self.clone().into_logger_config().map(|_| ())
    }
}

impl Settings {
    pub fn validate(&self) -> Result<(), ConfigError> {
        self.server.validate()?;
        self.database.validate()?;
        self.logger.validate()?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn field_of(result: Result<(), ConfigError>) -> String {
        match result {
            Err(ConfigError::ValidationError { field, .. }) => field,
            other => panic!("Expected ValidationError, got {:?}", other),
        }
    }

    #[test]
    fn test_defaults_are_valid() {
        assert!(Settings::default().validate().is_ok());
    }

    #[test]
    fn test_server_rules() {
        let mut server = ServerConfig::default();
        server.port = 0;
        assert_eq!(field_of(server.validate()), "server.port");

        let mut server = ServerConfig::default();
        server.request_timeout = 0;
        assert_eq!(field_of(server.validate()), "server.request_timeout");

        let mut server = ServerConfig::default();
        server.port = 65535;
        assert!(server.validate().is_ok());
    }

    #[test]
    fn test_url_required_only_for_postgres() {
        let mut database = DatabaseConfig::default();
        assert!(database.validate().is_ok());

        database.backend = StoreBackend::Postgres;
        assert_eq!(field_of(database.validate()), "database.url");

        database.url = "mysql://localhost/keel".to_string();
        assert_eq!(field_of(database.validate()), "database.url");

        database.url = "postgresql://user:pw@localhost:5432/keel".to_string();
        assert!(database.validate().is_ok());
    }

    #[test]
    fn test_pool_limits() {
        let mut database = DatabaseConfig {
            max_connections: 2,
            min_connections: 3,
            ..Default::default()
        };
        assert_eq!(field_of(database.validate()), "database.min_connections");

        database.max_connections = 0;
        database.min_connections = 0;
        assert_eq!(field_of(database.validate()), "database.max_connections");
    }

    #[test]
    fn test_logger_rules() {
        let mut settings = Settings::default();
        settings.logger.level = "keel_rs=loud".to_string();
        assert_eq!(field_of(settings.validate()), "logger");

        settings.logger.level = "keel_rs=trace,info".to_string();
        assert!(settings.validate().is_ok());
    }
}
