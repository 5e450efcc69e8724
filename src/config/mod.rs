use crate::persist::Provider;
use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use std::path::PathBuf;

#[derive(Debug, Clone, Deserialize, Serialize, Default)]
pub struct AppConfig {
    #[serde(default)]
    pub ledger: LedgerConfig,
    #[serde(default)]
    pub storage: StorageConfig,
    #[serde(default)]
    pub paths: PathsConfig,
}

#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct LedgerConfig {
    #[serde(rename = "type", default = "default_ledger_type")]
    pub ledger_type: String,
    /// SQLite database file.
    #[serde(default = "default_ledger_path")]
    pub path: String,
    pub host: Option<String>,
    pub port: Option<u16>,
    pub database: Option<String>,
    pub user: Option<String>,
    pub password: Option<String>,
}

fn default_ledger_type() -> String {
    "sqlite".to_string()
}

fn default_ledger_path() -> String {
    "sheetdrop.db".to_string()
}

impl Default for LedgerConfig {
    fn default() -> Self {
        Self {
            ledger_type: default_ledger_type(),
            path: default_ledger_path(),
            host: None,
            port: None,
            database: None,
            user: None,
            password: None,
        }
    }
}

impl LedgerConfig {
    /// Ledger backed by a SQLite file.
    pub fn sqlite(path: impl Into<String>) -> Self {
        Self {
            path: path.into(),
            ..Default::default()
        }
    }

    /// Postgres connection string built from the configured parts.
    pub fn postgres_url(&self) -> Result<String> {
        let host = self.host.as_deref().context("Postgres ledger requires 'host'")?;
        let database = self
            .database
            .as_deref()
            .context("Postgres ledger requires 'database'")?;
        let user = self.user.as_deref().context("Postgres ledger requires 'user'")?;
        let password = self
            .password
            .as_deref()
            .context("Postgres ledger requires 'password'")?;
        Ok(format!(
            "postgres://{}:{}@{}:{}/{}",
            user,
            password,
            host,
            self.port.unwrap_or(5432),
            database
        ))
    }
}

#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct StorageConfig {
    /// Provider used by save descriptors that do not name one.
    #[serde(default = "default_provider")]
    pub default_provider: Provider,
    /// Root directory for the `local` provider.
    #[serde(default = "default_local_root")]
    pub local_root: PathBuf,
    pub s3: Option<S3Config>,
    pub gcs: Option<GcsConfig>,
}

fn default_provider() -> Provider {
    Provider::Local
}

fn default_local_root() -> PathBuf {
    PathBuf::from("data")
}

impl Default for StorageConfig {
    fn default() -> Self {
        Self {
            default_provider: default_provider(),
            local_root: default_local_root(),
            s3: None,
            gcs: None,
        }
    }
}

/// Explicit S3 settings; anything unset falls back to the `AWS_*` environment.
#[derive(Debug, Clone, Deserialize, Serialize, Default)]
pub struct S3Config {
    pub region: Option<String>,
    /// Custom endpoint for MinIO and other S3-compatible stores.
    pub endpoint: Option<String>,
    pub access_key: Option<String>,
    pub secret_key: Option<String>,
    #[serde(default)]
    pub allow_http: bool,
}

#[derive(Debug, Clone, Deserialize, Serialize, Default)]
pub struct GcsConfig {
    pub service_account_path: Option<String>,
}

#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct PathsConfig {
    /// Directory of `*.json` job definitions.
    #[serde(default = "default_jobs_dir")]
    pub jobs_dir: PathBuf,
    /// Directory for temporary uploads.
    #[serde(default = "default_temp_dir")]
    pub temp_dir: PathBuf,
}

fn default_jobs_dir() -> PathBuf {
    PathBuf::from("jobs")
}

fn default_temp_dir() -> PathBuf {
    PathBuf::from("temp")
}

impl Default for PathsConfig {
    fn default() -> Self {
        Self {
            jobs_dir: default_jobs_dir(),
            temp_dir: default_temp_dir(),
        }
    }
}

impl AppConfig {
    /// Load configuration from an optional file and environment variables
    pub fn load(config_path: Option<&str>) -> Result<Self> {
        let mut builder = config::Config::builder();

        if let Some(path) = config_path {
            builder = builder.add_source(config::File::with_name(path));
        }

        // Nested keys use a double underscore, e.g. SHEETDROP_LEDGER__TYPE=postgres
        builder = builder.add_source(
            config::Environment::with_prefix("SHEETDROP")
                .prefix_separator("_")
                .separator("__")
                .try_parsing(true),
        );

        let config = builder.build().context("Failed to build configuration")?;

        config
            .try_deserialize()
            .context("Failed to deserialize configuration")
    }

    /// Validate configuration
    pub fn validate(&self) -> Result<()> {
        match self.ledger.ledger_type.as_str() {
            "postgres" => {
                self.ledger.postgres_url()?;
            }
            "sqlite" => {
                if self.ledger.path.trim().is_empty() {
                    anyhow::bail!("SQLite ledger requires 'path'");
                }
            }
            _ => anyhow::bail!("Invalid ledger type: {}", self.ledger.ledger_type),
        }

        if self.storage.default_provider == Provider::Hdfs {
            anyhow::bail!("hdfs cannot be the default storage provider");
        }

        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    #[test]
    fn test_defaults() {
        let config = AppConfig::default();
        assert_eq!(config.ledger.ledger_type, "sqlite");
        assert_eq!(config.storage.default_provider, Provider::Local);
        assert_eq!(config.paths.jobs_dir, PathBuf::from("jobs"));
        config.validate().unwrap();
    }

    #[test]
    fn test_load_from_file() {
        let mut file = tempfile::Builder::new().suffix(".toml").tempfile().unwrap();
        writeln!(
            file,
            r#"
[ledger]
type = "postgres"
host = "db"
database = "sheetdrop"
user = "app"
password = "secret"

[storage]
default_provider = "s3"

[storage.s3]
region = "eu-west-1"
"#
        )
        .unwrap();

        let path = file.path().to_str().unwrap().to_string();
        let config = AppConfig::load(Some(&path)).unwrap();
        assert_eq!(config.storage.default_provider, Provider::S3);
        assert_eq!(
            config.storage.s3.as_ref().unwrap().region.as_deref(),
            Some("eu-west-1")
        );
        assert_eq!(
            config.ledger.postgres_url().unwrap(),
            "postgres://app:secret@db:5432/sheetdrop"
        );
        config.validate().unwrap();
    }

    #[test]
    fn test_validate_rejects_incomplete_postgres() {
        let config = AppConfig {
            ledger: LedgerConfig {
                ledger_type: "postgres".to_string(),
                host: Some("db".to_string()),
                ..Default::default()
            },
            ..Default::default()
        };
        assert!(config.validate().is_err());

        let config = AppConfig {
            ledger: LedgerConfig {
                ledger_type: "mysql".to_string(),
                ..Default::default()
            },
            ..Default::default()
        };
        assert!(config.validate().is_err());
    }
}
