//! Logger Module
//!
//! `tracing-subscriber` setup with:
//! - Console output with color control
//! - File output in full, compact or JSON format
//! - A runtime-adjustable level filter

pub mod config;
pub mod error;

pub use config::*;
pub use error::LoggerError;

use std::fs::{self, OpenOptions};
use std::io::IsTerminal;
use std::sync::Arc;

use tracing_subscriber::{
    EnvFilter, Layer, Registry,
    fmt,
    layer::{Layered, SubscriberExt},
    reload,
    util::SubscriberInitExt,
};

type Base = Layered<reload::Layer<EnvFilter, Registry>, Registry>;
type BoxedLayer = Box<dyn Layer<Base> + Send + Sync + 'static>;

/// Handle to change the active filter after initialization.
#[derive(Clone)]
pub struct LogLevelHandle {
    inner: reload::Handle<EnvFilter, Registry>,
}

impl LogLevelHandle {
    /// Replaces the filter, e.g. `set_level("debug")`.
    pub fn set_level(&self, directive: &str) -> Result<(), LoggerError> {
        let filter = parse_filter(directive)?;
        self.inner
            .reload(filter)
            .map_err(|e| LoggerError::config(e.to_string()))
    }
}

/// Initialize the global logger with the given configuration
pub fn init_logger(config: LoggerConfig) -> Result<LogLevelHandle, LoggerError> {
    let (subscriber, handle) = build_subscriber(&config)?;
    subscriber.try_init().map_err(|e| LoggerError::Init {
        message: e.to_string(),
    })?;
    Ok(handle)
}

fn build_subscriber(
    config: &LoggerConfig,
) -> Result<(impl tracing::Subscriber + Send + Sync + 'static, LogLevelHandle), LoggerError> {
    config.validate()?;

    let (filter, inner) = reload::Layer::new(config.env_filter()?);

    // File layer goes first so console ANSI settings don't leak into span
    // fields written to the file (tokio-rs/tracing#1817).
    let mut layers: Vec<BoxedLayer> = Vec::with_capacity(2);
    if config.file.enabled {
        layers.push(file_layer(&config.file)?);
    }
    if config.console.enabled {
        layers.push(console_layer(&config.console));
    }

    let subscriber = tracing_subscriber::registry().with(filter).with(layers);
    Ok((subscriber, LogLevelHandle { inner }))
}

fn console_layer(config: &ConsoleConfig) -> BoxedLayer {
    let use_ansi = config.colored && std::io::stdout().is_terminal();
    fmt::layer()
        .with_ansi(use_ansi)
        .with_target(true)
        .with_level(true)
        .boxed()
}

fn file_layer(config: &FileConfig) -> Result<BoxedLayer, LoggerError> {
    if let Some(parent) = config.path.parent() {
        if !parent.as_os_str().is_empty() {
            fs::create_dir_all(parent)?;
        }
    }
    let file = OpenOptions::new()
        .create(true)
        .write(true)
        .append(config.append)
        .truncate(!config.append)
        .open(&config.path)?;

    let layer = fmt::layer()
        .with_ansi(false)
        .with_target(true)
        .with_writer(Arc::new(file));

    Ok(match config.format {
        LogFormat::Full => layer.boxed(),
        LogFormat::Compact => layer.compact().boxed(),
        LogFormat::Json => layer.json().boxed(),
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    fn file_only(dir: &TempDir, format: LogFormat) -> LoggerConfig {
        LoggerConfig {
            console: ConsoleConfig::new(false, false),
            file: FileConfig {
                enabled: true,
                path: dir.path().join("nested/app.log"),
                append: false,
                format,
            },
            level: "info".to_string(),
        }
    }

    #[test]
    fn test_file_output_and_level_reload() {
        let dir = TempDir::new().unwrap();
        let config = file_only(&dir, LogFormat::Json);
        let (subscriber, handle) = build_subscriber(&config).unwrap();

        tracing::subscriber::with_default(subscriber, || {
            tracing::info!(user_id = 7, "first event");
            tracing::debug!("hidden at info");

            handle.set_level("warn").unwrap();
            tracing::info!("hidden at warn");
            tracing::warn!("second event");
        });

        let contents = fs::read_to_string(&config.file.path).unwrap();
        let lines: Vec<serde_json::Value> = contents
            .lines()
            .map(|line| serde_json::from_str(line).unwrap())
            .collect();
        assert_eq!(lines.len(), 2);
        assert_eq!(lines[0]["fields"]["message"], "first event");
        assert_eq!(lines[0]["fields"]["user_id"], 7);
        assert_eq!(lines[1]["level"], "WARN");
    }

    #[test]
    fn test_truncate_versus_append() {
        let dir = TempDir::new().unwrap();
        let mut config = file_only(&dir, LogFormat::Compact);
        fs::create_dir_all(config.file.path.parent().unwrap()).unwrap();
        fs::write(&config.file.path, "old line\n").unwrap();

        let (subscriber, _) = build_subscriber(&config).unwrap();
        tracing::subscriber::with_default(subscriber, || tracing::info!("fresh"));
        let contents = fs::read_to_string(&config.file.path).unwrap();
        assert!(!contents.contains("old line"));
        assert!(contents.contains("fresh"));

        config.file.append = true;
        let (subscriber, _) = build_subscriber(&config).unwrap();
        tracing::subscriber::with_default(subscriber, || tracing::info!("again"));
        let contents = fs::read_to_string(&config.file.path).unwrap();
        assert!(contents.contains("fresh"));
        assert!(contents.contains("again"));
    }

    #[test]
    fn test_rejects_bad_reload_directive() {
        let dir = TempDir::new().unwrap();
        let (_, handle) = build_subscriber(&file_only(&dir, LogFormat::Full)).unwrap();
        assert!(matches!(
            handle.set_level("=nonsense="),
            Err(LoggerError::Filter { .. })
        ));
    }
}
