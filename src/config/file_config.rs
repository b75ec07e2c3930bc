//! Configuration file location and persistence.
//!
//! # Configuration File Format
//!
//! ```toml
//! [user]
//! name = "Ada Lovelace"
//! email = "ada@example.org"
//! orcid = "0000-0002-1825-0097"
//!
//! [database]
//! path = "~/.local/share/elephant/citations.db"
//!
//! [platforms.semantic_scholar]
//! enabled = true
//! api_key = "your-api-key"
//! author_id = "1741101"
//!
//! [platforms.google_scholar]
//! enabled = false
//! author_id = "profile-id"
//!
//! [fetch]
//! interval_hours = 24
//! request_timeout_secs = 30
//! page_size = 100
//!
//! [retry]
//! max_attempts = 3
//! initial_delay_ms = 500
//!
//! [alerts]
//! enabled = true
//! min_citation_threshold = 1
//!
//! [recommendations]
//! low_visibility_threshold = 5
//! ```

use std::path::{Path, PathBuf};

use super::{load_file_config, Config, ConfigError};

/// Environment variable naming an alternative configuration file
pub const CONFIG_ENV_VAR: &str = "ELEPHANT_CONFIG";

/// `<config_dir>/elephant/config.toml`
pub fn default_config_path() -> PathBuf {
    dirs::config_dir()
        .unwrap_or_else(|| PathBuf::from("."))
        .join("elephant")
        .join("config.toml")
}

/// Resolve the configuration file: explicit path, then `ELEPHANT_CONFIG`,
/// then the default location.
pub fn find_config_file(explicit: Option<&Path>) -> PathBuf {
    if let Some(path) = explicit {
        return path.to_path_buf();
    }
    match std::env::var(CONFIG_ENV_VAR) {
        Ok(path) if !path.trim().is_empty() => PathBuf::from(path),
        _ => default_config_path(),
    }
}

/// Save configuration to a TOML file, creating parent directories
pub fn save_config(config: &Config, path: &Path) -> Result<(), ConfigError> {
    if let Some(parent) = path.parent() {
        if !parent.as_os_str().is_empty() {
            std::fs::create_dir_all(parent)?;
        }
    }
    let content = toml::to_string_pretty(config)?;
    std::fs::write(path, content)?;
    tracing::debug!("Wrote configuration to {}", path.display());
    Ok(())
}

/// Apply `edit` to the settings stored in the file and write them back.
///
/// Starts from [`load_file_config`], not the environment-layered
/// configuration, so environment-only values are not persisted.
pub fn update_config(
    path: &Path,
    edit: impl FnOnce(&mut Config),
) -> Result<Config, ConfigError> {
    let mut config = load_file_config(path)?;
    edit(&mut config);
    save_config(&config, path)?;
    Ok(config)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::{load_config, PlatformConfig};
    use tempfile::tempdir;

    #[test]
    fn test_config_save_load() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("nested").join("config.toml");

        let mut config = Config::default();
        config.user.name = "Grace Hopper".to_string();
        config.alerts.min_citation_threshold = 4;
        config.database.path = Some(dir.path().join("citations.db"));

        save_config(&config, &path).unwrap();

        let loaded = load_config(&path).unwrap();
        assert_eq!(loaded.user.name, "Grace Hopper");
        assert_eq!(loaded.alerts.min_citation_threshold, 4);
        assert_eq!(loaded.platforms, config.platforms);
    }

    #[test]
    fn test_update_config_keeps_env_keys_out_of_file() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("config.toml");

        let mut config = Config::default();
        config
            .platforms
            .insert("keyvault_test".to_string(), PlatformConfig::enabled());
        save_config(&config, &path).unwrap();

        std::env::set_var("KEYVAULT_TEST_API_KEY", "s3cret-from-env");
        let layered = load_config(&path).unwrap();
        assert_eq!(
            layered.platforms["keyvault_test"].api_key.as_deref(),
            Some("s3cret-from-env")
        );

        let updated = update_config(&path, |c| c.alerts.min_citation_threshold = 7).unwrap();
        std::env::remove_var("KEYVAULT_TEST_API_KEY");

        assert_eq!(updated.alerts.min_citation_threshold, 7);
        assert_eq!(updated.platforms["keyvault_test"].api_key, None);

        let written = std::fs::read_to_string(&path).unwrap();
        assert!(!written.contains("s3cret-from-env"));
        assert!(written.contains("min_citation_threshold = 7"));
    }

    #[test]
    fn test_find_config_file_prefers_explicit() {
        let explicit = PathBuf::from("/tmp/custom.toml");
        assert_eq!(find_config_file(Some(&explicit)), explicit);
    }

    #[test]
    fn test_config_file_invalid_toml() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("invalid.toml");

        std::fs::write(&path, "invalid = toml = content").unwrap();

        assert!(load_config(&path).is_err());
    }
}
