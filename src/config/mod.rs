//! Configuration, error types and platform constants
//!
//! `SupportConfig` is loaded from an optional JSON file, then overridden from the
//! environment (`POSIX_SUPPORT_BACKEND`, `POSIX_SUPPORT_LOGGING`,
//! `POSIX_SUPPORT_NATIVE_ACCESS`) and validated before a backend is built.

pub mod constants;
pub mod types;

use std::path::Path;

pub use types::{BackendKind, ConfigError, SupportConfig};

pub const ENV_BACKEND: &str = "POSIX_SUPPORT_BACKEND";
pub const ENV_LOGGING: &str = "POSIX_SUPPORT_LOGGING";
pub const ENV_NATIVE_ACCESS: &str = "POSIX_SUPPORT_NATIVE_ACCESS";

impl SupportConfig {
    /// Load from a JSON file. Missing keys fall back to defaults.
    pub fn load(path: &Path) -> Result<Self, ConfigError> {
        let content = std::fs::read_to_string(path)?;
        let config: SupportConfig = serde_json::from_str(&content)?;
        log::info!("Loaded posix support config from {}", path.display());
        Ok(config)
    }

    /// Defaults, an optional file, then environment overrides, then validation.
    pub fn resolve(path: Option<&Path>) -> Result<Self, ConfigError> {
        let mut config = match path {
            Some(p) => Self::load(p)?,
            None => Self::default(),
        };
        config.apply_env_overrides_from(|key| std::env::var(key).ok())?;
        config.validate()?;
        Ok(config)
    }

    pub fn apply_env_overrides(&mut self) -> Result<(), ConfigError> {
        self.apply_env_overrides_from(|key| std::env::var(key).ok())
    }

    /// Apply overrides from an arbitrary lookup, so tests need not mutate the process env.
    pub fn apply_env_overrides_from<F>(&mut self, lookup: F) -> Result<(), ConfigError>
    where
        F: Fn(&str) -> Option<String>,
    {
        if let Some(value) = lookup(ENV_BACKEND) {
            self.backend = BackendKind::parse(&value).ok_or(ConfigError::InvalidValue {
                key: ENV_BACKEND,
                value: value.clone(),
            })?;
        }
        if let Some(value) = lookup(ENV_LOGGING) {
            self.logging = parse_bool(ENV_LOGGING, &value)?;
        }
        if let Some(value) = lookup(ENV_NATIVE_ACCESS) {
            self.native_access = parse_bool(ENV_NATIVE_ACCESS, &value)?;
        }
        Ok(())
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        if !self.native_access && self.backend != BackendKind::Emulated {
            return Err(ConfigError::Inconsistent(format!(
                "backend '{}' requires native access, which is disabled",
                self.backend
            )));
        }
        if self.finalizer_poll_interval_ms == 0 {
            return Err(ConfigError::Inconsistent(
                "finalizer_poll_interval_ms must be positive".to_string(),
            ));
        }
        if self.emulated_umask > 0o777 {
            return Err(ConfigError::InvalidValue {
                key: "emulated_umask",
                value: format!("{:o}", self.emulated_umask),
            });
        }
        Ok(())
    }
}

fn parse_bool(key: &'static str, value: &str) -> Result<bool, ConfigError> {
    match value.trim().to_ascii_lowercase().as_str() {
        "1" | "true" | "yes" | "on" => Ok(true),
        "0" | "false" | "no" | "off" => Ok(false),
        _ => Err(ConfigError::InvalidValue {
            key,
            value: value.to_string(),
        }),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;
    use std::io::Write;

    fn lookup(pairs: &[(&str, &str)]) -> impl Fn(&str) -> Option<String> {
        let map: HashMap<String, String> = pairs
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect();
        move |key| map.get(key).cloned()
    }

    #[test]
    fn test_default_config_is_valid() {
        let config = SupportConfig::default();
        assert_eq!(config.backend, BackendKind::Native);
        assert_eq!(config.emulated_umask, 0o022);
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_env_overrides() {
        let mut config = SupportConfig::default();
        config
            .apply_env_overrides_from(lookup(&[
                (ENV_BACKEND, "emulated"),
                (ENV_LOGGING, "1"),
                (ENV_NATIVE_ACCESS, "false"),
            ]))
            .unwrap();
        assert_eq!(config.backend, BackendKind::Emulated);
        assert!(config.logging);
        assert!(!config.native_access);
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_invalid_env_value_rejected() {
        let mut config = SupportConfig::default();
        let err = config
            .apply_env_overrides_from(lookup(&[(ENV_LOGGING, "maybe")]))
            .unwrap_err();
        assert!(matches!(err, ConfigError::InvalidValue { key, .. } if key == ENV_LOGGING));
    }

    #[test]
    fn test_native_backend_without_native_access_is_inconsistent() {
        let config = SupportConfig {
            native_access: false,
            ..SupportConfig::default()
        };
        assert!(matches!(
            config.validate(),
            Err(ConfigError::Inconsistent(_))
        ));
    }

    #[test]
    fn test_load_partial_json() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        write!(file, r#"{{"backend": "image_buildtime", "logging": true}}"#).unwrap();
        let config = SupportConfig::load(file.path()).unwrap();
        assert_eq!(config.backend, BackendKind::ImageBuildtime);
        assert!(config.logging);
        assert_eq!(config.finalizer_poll_interval_ms, 100);
    }
}
