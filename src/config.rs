// src/config.rs

//! Configuration loading utilities.
//!
//! Builds the single immutable [`Config`] value that every entry point
//! receives.

use std::path::Path;

use crate::error::{AppError, Result};
use crate::models::Config;
use crate::utils::log;

/// Load `config.toml`, apply environment overrides and validate.
///
/// A missing file falls back to defaults. An existing file that cannot be
/// read or parsed, or invalid values, stop the process at startup.
pub fn load_runtime_config(path: impl AsRef<Path>) -> Result<Config> {
    let path = path.as_ref();
    let mut config = if path.exists() {
        Config::load(path).map_err(|e| {
            AppError::config(format!("failed to load {}: {}", path.display(), e))
        })?
    } else {
        log::sub_item(&format!(
            "No config at {}, using defaults",
            path.display()
        ));
        Config::default()
    };

    config.apply_env();
    config.validate()?;
    Ok(config)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn missing_file_yields_valid_defaults() {
        let dir = tempfile::tempdir().unwrap();
        let config = load_runtime_config(dir.path().join("config.toml")).unwrap();
        assert_eq!(config.crawler.per_domain_concurrency, 5);
    }

    #[test]
    fn invalid_values_are_rejected() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("config.toml");
        std::fs::write(&path, "[crawler]\nmax_concurrent = 0\n").unwrap();
        assert!(load_runtime_config(&path).is_err());
    }

    #[test]
    fn malformed_file_is_an_error() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("config.toml");
        std::fs::write(&path, "[media]\nbucket = \"mine\"\nworkers = \"four\"\n").unwrap();

        let err = load_runtime_config(&path).unwrap_err();
        assert!(err.to_string().contains("config.toml"));
    }

    #[test]
    fn existing_file_values_are_used() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("config.toml");
        std::fs::write(&path, "[media]\nbucket = \"mine\"\n").unwrap();

        let config = load_runtime_config(&path).unwrap();
        assert_eq!(config.media.bucket, "mine");
    }
}
