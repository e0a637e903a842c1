//! Layered runtime configuration.
//!
//! Settings resolve in three layers, later ones winning:
//! 1. environment-aware built-in defaults,
//! 2. an optional `drydock.toml` (or an explicit `--config` path),
//! 3. `DRYDOCK_*` environment variables (`__` separates nesting, e.g.
//!    `DRYDOCK_GITHUB__TOKEN`).

pub mod error;

use crate::error::{ErrorKind, Result};
use exn::ResultExt;
use figment::Figment;
use figment::providers::{Env, Format, Serialized, Toml};
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use std::time::Duration;

/// Which deployment profile the daemon runs under. Only affects defaults;
/// every value remains individually overridable.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Environment {
    Development,
    Production,
}

impl Environment {
    /// Read `DRYDOCK_ENV`; anything other than `production` is development.
    pub fn detect() -> Self {
        match std::env::var("DRYDOCK_ENV").as_deref() {
            Ok("production") => Self::Production,
            _ => Self::Development,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct RegistrySettings {
    /// CouchDB-style registry root (metadata, `_changes`, search).
    pub url: String,
    /// The keyword marking a package as an addon.
    pub keyword: String,
    /// Idle delay between change-feed polls, in seconds.
    pub poll_interval_secs: u64,
    /// Maximum changes fetched per poll.
    pub batch_limit: u32,
}

impl Default for RegistrySettings {
    fn default() -> Self {
        Self {
            url: "https://skimdb.npmjs.com/registry".to_string(),
            keyword: "drydock-addon".to_string(),
            poll_interval_secs: 30,
            batch_limit: 100,
        }
    }
}

impl RegistrySettings {
    pub fn poll_interval(&self) -> Duration {
        Duration::from_secs(self.poll_interval_secs)
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct GithubSettings {
    pub api_url: String,
    pub raw_url: String,
    /// Personal access token. Optional, but the unauthenticated quota is
    /// unusable for anything beyond a smoke test.
    pub token: Option<String>,
}

impl Default for GithubSettings {
    fn default() -> Self {
        Self {
            api_url: "https://api.github.com".to_string(),
            raw_url: "https://raw.githubusercontent.com".to_string(),
            token: None,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct StoreSettings {
    /// Location of the SQLite database file.
    pub db_path: PathBuf,
}

impl Default for StoreSettings {
    fn default() -> Self {
        Self {
            db_path: data_dir().join("drydock.db"),
        }
    }
}

/// Which file-store backend documentation bundles go to.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum FilesBackend {
    Local,
    S3,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct FilesSettings {
    pub backend: FilesBackend,
    /// Bucket the documentation bundles live in.
    pub bucket: String,
    /// Root directory for the local backend.
    pub root: PathBuf,
    /// S3 credentials and addressing, required when `backend = "s3"`.
    pub s3_region: String,
    pub s3_endpoint: Option<String>,
    pub s3_key_id: String,
    pub s3_key_secret: String,
}

impl Default for FilesSettings {
    fn default() -> Self {
        Self {
            backend: FilesBackend::Local,
            bucket: "drydock-docs".to_string(),
            root: data_dir().join("files"),
            s3_region: "us-east-1".to_string(),
            s3_endpoint: None,
            s3_key_id: String::new(),
            s3_key_secret: String::new(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct SchedulerSettings {
    /// Floor for the adaptive branch-poll interval, in seconds. Larger in
    /// production, where tight looping buys nothing.
    pub min_interval_secs: u64,
    /// Retry delay while the database has no eligible addon yet, in seconds.
    pub startup_delay_secs: u64,
}

impl Default for SchedulerSettings {
    fn default() -> Self {
        Self {
            min_interval_secs: 1,
            startup_delay_secs: 1,
        }
    }
}

impl SchedulerSettings {
    pub fn min_interval(&self) -> Duration {
        Duration::from_secs(self.min_interval_secs)
    }

    pub fn startup_delay(&self) -> Duration {
        Duration::from_secs(self.startup_delay_secs)
    }
}

/// Complete daemon configuration.
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct AppConfig {
    pub registry: RegistrySettings,
    pub github: GithubSettings,
    pub store: StoreSettings,
    pub files: FilesSettings,
    pub scheduler: SchedulerSettings,
}

impl AppConfig {
    /// Built-in defaults for a deployment environment.
    pub fn defaults_for(environment: Environment) -> Self {
        let mut config = Self::default();
        if environment == Environment::Production {
            config.scheduler.min_interval_secs = 15;
        }
        config
    }

    /// Load the layered configuration.
    ///
    /// `path` overrides the default `drydock.toml` lookup; a missing file at
    /// the default location is fine, all values have defaults.
    pub fn load(environment: Environment, path: Option<&Path>) -> Result<Self> {
        let defaults = Self::defaults_for(environment);
        let file = path.unwrap_or(Path::new("drydock.toml"));
        tracing::debug!(file = %file.display(), "loading layered configuration");
        Figment::from(Serialized::defaults(defaults))
            .merge(Toml::file(file))
            .merge(Env::prefixed("DRYDOCK_").split("__"))
            .extract()
            .or_raise(|| ErrorKind::Invalid)
    }
}

/// Platform data directory for drydock, with a working-directory fallback
/// for environments without a resolvable home.
fn data_dir() -> PathBuf {
    directories::ProjectDirs::from("", "", "drydock")
        .map(|dirs| dirs.data_dir().to_path_buf())
        .unwrap_or_else(|| PathBuf::from(".data"))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_environment_defaults() {
        let dev = AppConfig::defaults_for(Environment::Development);
        assert_eq!(dev.scheduler.min_interval_secs, 1);
        let prod = AppConfig::defaults_for(Environment::Production);
        assert_eq!(prod.scheduler.min_interval_secs, 15);
        // Only the scheduler floor differs between environments.
        assert_eq!(dev.registry, prod.registry);
    }

    #[test]
    fn test_load_with_no_file_uses_defaults() {
        figment::Jail::expect_with(|_jail| {
            let config = AppConfig::load(Environment::Development, None).unwrap();
            assert_eq!(config, AppConfig::defaults_for(Environment::Development));
            Ok(())
        });
    }

    #[test]
    fn test_file_overrides_defaults() {
        figment::Jail::expect_with(|jail| {
            jail.create_file(
                "drydock.toml",
                r#"
                [registry]
                keyword = "my-framework-addon"

                [scheduler]
                min_interval_secs = 5
                "#,
            )?;
            let config = AppConfig::load(Environment::Development, None).unwrap();
            assert_eq!(config.registry.keyword, "my-framework-addon");
            assert_eq!(config.scheduler.min_interval(), Duration::from_secs(5));
            // Untouched values keep their defaults.
            assert_eq!(config.registry.batch_limit, 100);
            Ok(())
        });
    }

    #[test]
    fn test_env_overrides_file() {
        figment::Jail::expect_with(|jail| {
            jail.create_file("drydock.toml", "[github]\ntoken = \"from-file\"\n")?;
            jail.set_env("DRYDOCK_GITHUB__TOKEN", "from-env");
            jail.set_env("DRYDOCK_REGISTRY__POLL_INTERVAL_SECS", "7");
            let config = AppConfig::load(Environment::Development, None).unwrap();
            assert_eq!(config.github.token.as_deref(), Some("from-env"));
            assert_eq!(config.registry.poll_interval(), Duration::from_secs(7));
            Ok(())
        });
    }
}
