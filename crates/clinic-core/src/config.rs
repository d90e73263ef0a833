//! Runtime configuration.
//!
//! Loaded from a TOML file, then overridden by `CLINIC_*` environment
//! variables, then validated:
//!
//! ```toml
//! data_dir = "clinic"
//! autosave = true
//! log_filter = "info"
//! ```

use std::fs;
use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Configuration errors.
#[derive(Error, Debug)]
pub enum ConfigError {
    #[error("Configuration file not found: {}", .0.display())]
    NotFound(PathBuf),

    #[error("Failed to read configuration file {}: {source}", .path.display())]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("Failed to parse TOML: {0}")]
    Parse(#[from] toml::de::Error),

    #[error("Invalid configuration: {0}")]
    Invalid(String),
}

pub type ConfigResult<T> = Result<T, ConfigError>;

/// Where the clinic keeps its files and whether it keeps them at all.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct ClinicConfig {
    /// Root directory for credentials, patients and note records
    pub data_dir: PathBuf,
    /// Durable mode: load from and flush every mutation to `data_dir`
    pub autosave: bool,
    /// Default tracing filter when `RUST_LOG` is unset
    pub log_filter: String,
}

impl Default for ClinicConfig {
    fn default() -> Self {
        Self {
            data_dir: PathBuf::from("clinic"),
            autosave: true,
            log_filter: "info".to_string(),
        }
    }
}

impl ClinicConfig {
    /// Configuration for a session that never touches disk.
    pub fn in_memory() -> Self {
        Self {
            autosave: false,
            ..Self::default()
        }
    }

    /// Durable configuration rooted at `data_dir`.
    pub fn durable(data_dir: impl Into<PathBuf>) -> Self {
        Self {
            data_dir: data_dir.into(),
            ..Self::default()
        }
    }

    /// Load from a TOML file, apply `CLINIC_*` overrides, and validate.
    pub fn load(path: impl AsRef<Path>) -> ConfigResult<Self> {
        let path = path.as_ref();
        if !path.exists() {
            return Err(ConfigError::NotFound(path.to_path_buf()));
        }
        let contents = fs::read_to_string(path).map_err(|source| ConfigError::Io {
            path: path.to_path_buf(),
            source,
        })?;

        let mut config: ClinicConfig = toml::from_str(&contents)?;
        config.apply_overrides(|key| std::env::var(key).ok())?;
        config.validate()?;
        Ok(config)
    }

    /// Apply overrides looked up by environment variable name.
    pub fn apply_overrides<F>(&mut self, lookup: F) -> ConfigResult<()>
    where
        F: Fn(&str) -> Option<String>,
    {
        if let Some(dir) = lookup("CLINIC_DATA_DIR") {
            self.data_dir = PathBuf::from(dir);
        }
        if let Some(raw) = lookup("CLINIC_AUTOSAVE") {
            self.autosave = parse_bool(&raw).ok_or_else(|| {
                ConfigError::Invalid(format!("CLINIC_AUTOSAVE must be true or false, got '{}'", raw))
            })?;
        }
        if let Some(filter) = lookup("CLINIC_LOG") {
            self.log_filter = filter;
        }
        Ok(())
    }

    pub fn validate(&self) -> ConfigResult<()> {
        if self.autosave && self.data_dir.as_os_str().is_empty() {
            return Err(ConfigError::Invalid(
                "data_dir must be set when autosave is enabled".to_string(),
            ));
        }
        if self.log_filter.trim().is_empty() {
            return Err(ConfigError::Invalid("log_filter cannot be empty".to_string()));
        }
        Ok(())
    }

    /// `username,digest` credential file.
    pub fn users_file(&self) -> PathBuf {
        self.data_dir.join("users.txt")
    }

    /// JSON patient store.
    pub fn patients_file(&self) -> PathBuf {
        self.data_dir.join("patients.json")
    }

    /// Directory of per-patient note blobs.
    pub fn records_dir(&self) -> PathBuf {
        self.data_dir.join("records")
    }
}

fn parse_bool(raw: &str) -> Option<bool> {
    match raw.trim().to_ascii_lowercase().as_str() {
        "true" | "1" | "yes" => Some(true),
        "false" | "0" | "no" => Some(false),
        _ => None,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    #[test]
    fn test_defaults() {
        let config = ClinicConfig::default();
        assert!(config.autosave);
        assert_eq!(config.patients_file(), PathBuf::from("clinic/patients.json"));
        assert_eq!(config.records_dir(), PathBuf::from("clinic/records"));
        assert_eq!(config.users_file(), PathBuf::from("clinic/users.txt"));
        assert!(!ClinicConfig::in_memory().autosave);
    }

    #[test]
    fn test_partial_toml_uses_defaults() {
        let config: ClinicConfig = toml::from_str("autosave = false").unwrap();
        assert!(!config.autosave);
        assert_eq!(config.data_dir, PathBuf::from("clinic"));
        assert_eq!(config.log_filter, "info");
    }

    #[test]
    fn test_overrides() {
        let env: HashMap<&str, &str> = [
            ("CLINIC_DATA_DIR", "/var/lib/clinic"),
            ("CLINIC_AUTOSAVE", "no"),
            ("CLINIC_LOG", "clinic_core=debug"),
        ]
        .into_iter()
        .collect();

        let mut config = ClinicConfig::default();
        config
            .apply_overrides(|key| env.get(key).map(|v| v.to_string()))
            .unwrap();
        assert_eq!(config.data_dir, PathBuf::from("/var/lib/clinic"));
        assert!(!config.autosave);
        assert_eq!(config.log_filter, "clinic_core=debug");
    }

    #[test]
    fn test_bad_autosave_override() {
        let mut config = ClinicConfig::default();
        let err = config
            .apply_overrides(|key| (key == "CLINIC_AUTOSAVE").then(|| "sometimes".to_string()))
            .unwrap_err();
        assert!(matches!(err, ConfigError::Invalid(_)));
    }

    #[test]
    fn test_validate() {
        let mut config = ClinicConfig::durable("");
        assert!(config.validate().is_err());
        config.autosave = false;
        assert!(config.validate().is_ok());
        config.log_filter = " ".to_string();
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_load_file() {
        let dir = tempfile::TempDir::new().unwrap();
        let path = dir.path().join("clinic.toml");
        fs::write(&path, "data_dir = \"records-root\"\nlog_filter = \"warn\"\n").unwrap();

        let config = ClinicConfig::load(&path).unwrap();
        assert_eq!(config.log_filter, "warn");

        assert!(matches!(
            ClinicConfig::load(dir.path().join("missing.toml")),
            Err(ConfigError::NotFound(_))
        ));
    }
}
