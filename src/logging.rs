use std::path::{Path, PathBuf};
use tracing::info;
use tracing_appender::non_blocking::WorkerGuard;
use tracing_error::ErrorLayer;
use tracing_subscriber::{EnvFilter, Layer, fmt, layer::SubscriberExt, util::SubscriberInitExt};

use crate::domain::PTVError;

#[derive(Debug, Clone)]
pub struct LoggingConfig {
    pub log_file: Option<PathBuf>,
    pub level: String,
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            log_file: None,
            level: "info".to_string(),
        }
    }
}

/// The terminal belongs to the ui, so log lines only go to `log_file`.
/// RUST_LOG takes precedence over the configured level. Without a log file
/// no filter is built, so the level is not checked.
pub fn init(config: &LoggingConfig) -> Result<Option<WorkerGuard>, PTVError> {
    let Some(path) = &config.log_file else {
        tracing_subscriber::registry()
            .with(ErrorLayer::default())
            .try_init()
            .map_err(|e| PTVError::Config(e.to_string()))?;
        return Ok(None);
    };

    let env_filter = EnvFilter::try_from_default_env()
        .or_else(|_| EnvFilter::try_new(&config.level))
        .map_err(|e| PTVError::Config(format!("invalid log level: {e}")))?;

    let (dir, file_name) = split_log_path(path)?;
    std::fs::create_dir_all(&dir)?;
    let file_appender = tracing_appender::rolling::never(&dir, file_name);
    let (non_blocking, guard) = tracing_appender::non_blocking(file_appender);

    let file_layer = fmt::layer()
        .with_ansi(false)
        .with_target(true)
        .with_writer(non_blocking)
        .with_filter(env_filter);

    tracing_subscriber::registry()
        .with(file_layer)
        .with(ErrorLayer::default())
        .try_init()
        .map_err(|e| PTVError::Config(e.to_string()))?;

    info!("Logging to {}", path.display());
    Ok(Some(guard))
}

fn split_log_path(path: &Path) -> Result<(PathBuf, String), PTVError> {
    let file_name = path
        .file_name()
        .and_then(|s| s.to_str())
        .ok_or_else(|| PTVError::Config(format!("invalid log file {}", path.display())))?
        .to_string();
    let dir = match path.parent() {
        Some(p) if !p.as_os_str().is_empty() => p.to_path_buf(),
        _ => PathBuf::from("."),
    };
    Ok((dir, file_name))
}
