//! Configuration management using Figment
//!
//! Configuration is loaded from multiple sources with the following precedence (highest to lowest):
//! 1. Environment variables (prefix: DIALOG_)
//! 2. Current working directory: ./config.toml
//! 3. XDG config directory: ~/.config/dialog-repository/{service_name}/config.toml
//! 4. System directory: /etc/dialog-repository/{service_name}/config.toml
//! 5. Default values

use figment::{
    providers::{Env, Format, Serialized, Toml},
    Figment,
};
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};

use crate::error::Result;
use crate::store::IndexBuild;

const APP_PREFIX: &str = "dialog-repository";
const ENV_PREFIX: &str = "DIALOG_";

/// Main configuration structure
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct Config {
    /// Service configuration
    pub service: ServiceConfig,

    /// Document store connection
    #[serde(default)]
    pub store: StoreConfig,

    /// Repository behaviour
    #[serde(default)]
    pub repository: RepositoryConfig,
}

/// Service-level configuration
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct ServiceConfig {
    /// Service name
    pub name: String,

    /// Log level or filter directive (trace, debug, info, warn, error)
    #[serde(default = "default_log_level")]
    pub log_level: String,
}

/// Document store configuration
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct StoreConfig {
    /// Store URL; `mem://` selects the in-process store
    #[serde(default = "default_store_url")]
    pub url: String,

    /// How index build completion is reported
    #[serde(default)]
    pub index_build: IndexBuild,
}

impl Default for StoreConfig {
    fn default() -> Self {
        Self {
            url: default_store_url(),
            index_build: IndexBuild::default(),
        }
    }
}

/// Repository configuration
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct RepositoryConfig {
    /// Let aggregation stages spill to disk
    #[serde(default = "default_true")]
    pub allow_disk_use: bool,

    /// Actor recorded on soft deletes when the caller names none
    #[serde(default = "default_system_actor")]
    pub system_actor: String,

    /// Page size used when a caller does not ask for one
    #[serde(default = "default_page_size")]
    pub default_page_size: u64,
}

impl Default for RepositoryConfig {
    fn default() -> Self {
        Self {
            allow_disk_use: default_true(),
            system_actor: default_system_actor(),
            default_page_size: default_page_size(),
        }
    }
}

fn default_log_level() -> String {
    "info".to_string()
}

fn default_store_url() -> String {
    "mem://".to_string()
}

fn default_true() -> bool {
    true
}

fn default_system_actor() -> String {
    "SYSTEM".to_string()
}

fn default_page_size() -> u64 {
    20
}

impl Config {
    /// Load configuration from all sources
    ///
    /// Searches for config files in this order (first found is used):
    /// 1. Current working directory: ./config.toml
    /// 2. XDG config directory: ~/.config/dialog-repository/{service_name}/config.toml
    /// 3. System directory: /etc/dialog-repository/{service_name}/config.toml
    ///
    /// Environment variables (DIALOG_ prefix) override all file-based configs.
    pub fn load() -> Result<Self> {
        // Try to infer service name from binary name or use default
        let service_name = std::env::current_exe()
            .ok()
            .and_then(|p| p.file_stem().map(|s| s.to_string_lossy().into_owned()))
            .unwrap_or_else(|| APP_PREFIX.to_string());

        Self::load_for_service(&service_name)
    }

    /// Load configuration for a specific service name
    pub fn load_for_service(service_name: &str) -> Result<Self> {
        let config_paths = Self::find_config_paths(service_name);

        tracing::debug!("Searching for config files in order:");
        for path in &config_paths {
            tracing::debug!("  - {}", path.display());
        }

        let mut defaults = Config::default();
        defaults.service.name = service_name.to_string();
        let mut figment = Figment::new().merge(Serialized::defaults(defaults));

        // Lowest priority first so later files override earlier ones
        for path in config_paths.iter().rev() {
            if path.exists() {
                tracing::info!("Loading configuration from: {}", path.display());
                figment = figment.merge(Toml::file(path));
            }
        }

        figment = figment.merge(Env::prefixed(ENV_PREFIX).split("__"));

        let config = figment.extract()?;
        Ok(config)
    }

    /// Load configuration from a specific file
    ///
    /// This bypasses XDG directories and loads directly from the given path.
    pub fn load_from(path: impl AsRef<Path>) -> Result<Self> {
        let config = Figment::new()
            .merge(Serialized::defaults(Config::default()))
            .merge(Toml::file(path.as_ref()))
            .merge(Env::prefixed(ENV_PREFIX).split("__"))
            .extract()?;

        Ok(config)
    }

    /// Find all possible config file paths for a service, highest priority first
    fn find_config_paths(service_name: &str) -> Vec<PathBuf> {
        let mut paths = vec![PathBuf::from("config.toml")];

        let xdg_dirs = xdg::BaseDirectories::with_prefix(APP_PREFIX);
        let config_file_path = Path::new(service_name).join("config.toml");
        if let Some(path) = xdg_dirs.find_config_file(&config_file_path) {
            paths.push(path);
        }

        paths.push(
            PathBuf::from("/etc")
                .join(APP_PREFIX)
                .join(service_name)
                .join("config.toml"),
        );

        paths
    }
}

impl Default for Config {
    fn default() -> Self {
        Self {
            service: ServiceConfig {
                name: APP_PREFIX.to_string(),
                log_level: default_log_level(),
            },
            store: StoreConfig::default(),
            repository: RepositoryConfig::default(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    #[test]
    fn test_default_config() {
        let config = Config::default();
        assert_eq!(config.service.log_level, "info");
        assert_eq!(config.store.url, "mem://");
        assert_eq!(config.store.index_build, IndexBuild::Background);
        assert!(config.repository.allow_disk_use);
        assert_eq!(config.repository.system_actor, "SYSTEM");
        assert_eq!(config.repository.default_page_size, 20);
    }

    #[test]
    fn test_load_from_file_overrides_defaults() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        writeln!(
            file,
            r#"
[service]
name = "dialog-bot"
log_level = "debug"

[store]
index_build = "manual"

[repository]
system_actor = "janitor"
"#
        )
        .unwrap();

        let config = Config::load_from(file.path()).unwrap();
        assert_eq!(config.service.name, "dialog-bot");
        assert_eq!(config.service.log_level, "debug");
        assert_eq!(config.store.url, "mem://");
        assert_eq!(config.store.index_build, IndexBuild::Manual);
        assert_eq!(config.repository.system_actor, "janitor");
        assert!(config.repository.allow_disk_use);
    }

    #[test]
    fn test_load_from_missing_file_uses_defaults() {
        let dir = tempfile::tempdir().unwrap();
        let config = Config::load_from(dir.path().join("absent.toml")).unwrap();
        assert_eq!(config.service.name, "dialog-repository");
    }

    #[test]
    fn test_invalid_value_is_config_error() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        writeln!(file, "[store]\nindex_build = \"eventually\"").unwrap();
        let err = Config::load_from(file.path()).unwrap_err();
        assert!(matches!(err, crate::error::Error::Config(_)));
    }
}
