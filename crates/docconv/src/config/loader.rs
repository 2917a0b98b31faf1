use std::path::Path;

use crate::config::schema::Config;
use crate::error::ConfigError;

const ENV_STORAGE_DIRECTORY: &str = "DOCCONV_STORAGE_DIRECTORY";
const ENV_DATABASE_PATH: &str = "DOCCONV_DATABASE_PATH";
const ENV_TIMEOUT_SECS: &str = "DOCCONV_TIMEOUT_SECS";

pub fn load_config<P: AsRef<Path>>(path: P) -> Result<Config, ConfigError> {
    let path = path.as_ref();
    let content = std::fs::read_to_string(path).map_err(|e| ConfigError::ReadFile {
        path: path.to_path_buf(),
        source: e,
    })?;

    load_config_from_str(&content)
}

pub fn load_config_from_str(content: &str) -> Result<Config, ConfigError> {
    let json_value: serde_json::Value = serde_json::from_str(content)?;

    let mut config: Config = serde_json::from_value(json_value)?;

    apply_env_overrides(&mut config)?;
    validate_config(&config)?;

    Ok(config)
}

/// Environment variables take precedence over file values.
fn apply_env_overrides(config: &mut Config) -> Result<(), ConfigError> {
    if let Ok(dir) = std::env::var(ENV_STORAGE_DIRECTORY) {
        config.storage_directory = dir;
    }
    if let Ok(path) = std::env::var(ENV_DATABASE_PATH) {
        config.database_path = Some(path);
    }
    if let Ok(raw) = std::env::var(ENV_TIMEOUT_SECS) {
        config.conversion.timeout_secs =
            raw.trim().parse().map_err(|_| ConfigError::Validation {
                message: format!("{} must be a positive integer, got '{}'", ENV_TIMEOUT_SECS, raw),
            })?;
    }
    Ok(())
}

pub(crate) fn validate_config(config: &Config) -> Result<(), ConfigError> {
    if config.version != "1.0" {
        return Err(ConfigError::Validation {
            message: format!("Unsupported config version: {}", config.version),
        });
    }

    if config.storage_directory.trim().is_empty() {
        return Err(invalid("storage_directory must not be empty"));
    }
    if config.conversion.timeout_secs == 0 {
        return Err(invalid("conversion.timeout_secs must be greater than 0"));
    }
    if config.conversion.worker_count == 0 {
        return Err(invalid("conversion.worker_count must be greater than 0"));
    }
    if config.conversion.queue_capacity == 0 {
        return Err(invalid("conversion.queue_capacity must be greater than 0"));
    }
    if config.pdf.pdftotext_timeout_secs == 0 {
        return Err(invalid("pdf.pdftotext_timeout_secs must be greater than 0"));
    }
    if config.admission.max_upload_size == 0 {
        return Err(invalid("admission.max_upload_size must be greater than 0"));
    }
    if config.admission.allowed_mime_types.is_empty() {
        return Err(invalid("admission.allowed_mime_types must not be empty"));
    }
    for mime in &config.admission.allowed_mime_types {
        if !is_well_formed_mime(mime) {
            return Err(ConfigError::Validation {
                message: format!("Invalid MIME type in allow-list: '{}'", mime),
            });
        }
    }
    if config.tables.max_columns == 0 || config.tables.max_rows == 0 {
        return Err(invalid("tables limits must be greater than 0"));
    }

    Ok(())
}

fn invalid(message: &str) -> ConfigError {
    ConfigError::Validation {
        message: message.to_string(),
    }
}

fn is_well_formed_mime(mime: &str) -> bool {
    match mime.split_once('/') {
        Some((kind, sub)) => {
            let valid = |s: &str| {
                !s.is_empty()
                    && s.chars()
                        .all(|c| c.is_ascii_alphanumeric() || "+-.".contains(c))
            };
            valid(kind) && valid(sub)
        }
        None => false,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serial_test::serial;
    use std::io::Write;
    use tempfile::NamedTempFile;

    fn clear_env() {
        std::env::remove_var(ENV_STORAGE_DIRECTORY);
        std::env::remove_var(ENV_DATABASE_PATH);
        std::env::remove_var(ENV_TIMEOUT_SECS);
    }

    #[test]
    #[serial]
    fn test_load_valid_config() {
        clear_env();
        let config_json = r#"{
            "version": "1.0",
            "storage_directory": "/tmp/docconv",
            "conversion": { "timeout_secs": 5, "worker_count": 2 },
            "admission": { "max_upload_size": 2048, "allowed_mime_types": ["text/plain"] }
        }"#;

        let config = load_config_from_str(config_json).unwrap();
        assert_eq!(config.storage_directory, "/tmp/docconv");
        assert_eq!(config.conversion.timeout_secs, 5);
        assert_eq!(config.conversion.worker_count, 2);
        assert_eq!(config.conversion.queue_capacity, 64);
        assert_eq!(config.admission.max_upload_size, 2048);
    }

    #[test]
    #[serial]
    fn test_load_config_from_file() {
        clear_env();
        let mut file = NamedTempFile::new().unwrap();
        write!(
            file,
            r#"{{ "version": "1.0", "storage_directory": "/data/docs" }}"#
        )
        .unwrap();

        let config = load_config(file.path()).unwrap();
        assert_eq!(config.storage_directory, "/data/docs");
    }

    #[test]
    fn test_missing_file_is_read_error() {
        let result = load_config("/definitely/not/here/config.json");
        assert!(matches!(result, Err(ConfigError::ReadFile { .. })));
    }

    #[test]
    #[serial]
    fn test_invalid_version() {
        clear_env();
        let result =
            load_config_from_str(r#"{ "version": "2.0", "storage_directory": "/tmp/x" }"#);
        assert!(matches!(result, Err(ConfigError::Validation { .. })));
    }

    #[test]
    #[serial]
    fn test_zero_timeout_rejected() {
        clear_env();
        let result = load_config_from_str(
            r#"{ "version": "1.0", "storage_directory": "/tmp/x", "conversion": { "timeout_secs": 0 } }"#,
        );
        match result {
            Err(ConfigError::Validation { message }) => assert!(message.contains("timeout_secs")),
            other => panic!("Expected validation error, got {:?}", other),
        }
    }

    #[test]
    #[serial]
    fn test_malformed_mime_rejected() {
        clear_env();
        let result = load_config_from_str(
            r#"{ "version": "1.0", "storage_directory": "/tmp/x",
                 "admission": { "allowed_mime_types": ["pdf"] } }"#,
        );
        assert!(matches!(result, Err(ConfigError::Validation { .. })));
    }

    #[test]
    #[serial]
    fn test_invalid_json() {
        clear_env();
        let result = load_config_from_str("{ not json");
        assert!(matches!(result, Err(ConfigError::ParseJson(_))));
    }

    #[test]
    #[serial]
    fn test_env_overrides() {
        clear_env();
        std::env::set_var(ENV_STORAGE_DIRECTORY, "/env/storage");
        std::env::set_var(ENV_TIMEOUT_SECS, "7");

        let config =
            load_config_from_str(r#"{ "version": "1.0", "storage_directory": "/file/storage" }"#)
                .unwrap();
        assert_eq!(config.storage_directory, "/env/storage");
        assert_eq!(config.conversion.timeout_secs, 7);

        std::env::set_var(ENV_TIMEOUT_SECS, "soon");
        let result =
            load_config_from_str(r#"{ "version": "1.0", "storage_directory": "/file/storage" }"#);
        assert!(matches!(result, Err(ConfigError::Validation { .. })));

        clear_env();
    }

    #[test]
    fn test_is_well_formed_mime() {
        assert!(is_well_formed_mime("application/vnd.ms-excel"));
        assert!(is_well_formed_mime("image/svg+xml"));
        assert!(!is_well_formed_mime("text"));
        assert!(!is_well_formed_mime("text/"));
        assert!(!is_well_formed_mime("text/plain; charset=utf-8"));
    }
}
