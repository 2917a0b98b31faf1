//! Process-wide log output for the binary and embedding applications.

use thiserror::Error;
use tracing_subscriber::EnvFilter;

#[derive(Error, Debug)]
pub enum LoggingError {
    #[error("invalid log filter '{0}'")]
    InvalidFilter(String),

    #[error("a global subscriber is already installed: {0}")]
    AlreadyInstalled(String),
}

fn build_filter(level: &str) -> Result<EnvFilter, LoggingError> {
    match EnvFilter::try_from_default_env() {
        Ok(filter) => Ok(filter),
        Err(_) => EnvFilter::try_new(level).map_err(|_| LoggingError::InvalidFilter(level.to_string())),
    }
}

/// Installs the global `tracing` subscriber and routes `log` records into it.
///
/// `RUST_LOG` wins over `level` when set. Output goes to stderr so stdout
/// stays free for Markdown.
pub fn init(level: &str, json: bool) -> Result<(), LoggingError> {
    let filter = build_filter(level)?;

    let installed = if json {
        let subscriber = tracing_subscriber::fmt()
            .json()
            .with_env_filter(filter)
            .with_writer(std::io::stderr)
            .finish();
        tracing::subscriber::set_global_default(subscriber)
    } else {
        let subscriber = tracing_subscriber::fmt()
            .with_env_filter(filter)
            .with_writer(std::io::stderr)
            .finish();
        tracing::subscriber::set_global_default(subscriber)
    };
    installed.map_err(|e| LoggingError::AlreadyInstalled(e.to_string()))?;

    tracing_log::LogTracer::init().map_err(|e| LoggingError::AlreadyInstalled(e.to_string()))
}

#[cfg(test)]
mod tests {
    use super::*;
    use serial_test::serial;
    use tracing_subscriber::filter::LevelFilter;

    #[test]
    #[serial]
    fn test_level_used_without_env() {
        std::env::remove_var("RUST_LOG");
        let filter = build_filter("debug").unwrap();
        assert_eq!(filter.max_level_hint(), Some(LevelFilter::DEBUG));
    }

    #[test]
    #[serial]
    fn test_env_overrides_level() {
        std::env::set_var("RUST_LOG", "docconv=trace");
        let filter = build_filter("info").unwrap();
        std::env::remove_var("RUST_LOG");
        assert_eq!(filter.max_level_hint(), Some(LevelFilter::TRACE));
    }

    #[test]
    #[serial]
    fn test_invalid_level_rejected() {
        std::env::remove_var("RUST_LOG");
        assert!(matches!(
            build_filter("docconv=loud"),
            Err(LoggingError::InvalidFilter(_))
        ));
    }

    #[test]
    #[serial]
    fn test_second_init_fails() {
        std::env::remove_var("RUST_LOG");
        // another test binary thread may have installed one first
        let _ = init("warn", false);
        assert!(matches!(
            init("warn", true),
            Err(LoggingError::AlreadyInstalled(_))
        ));
    }
}
