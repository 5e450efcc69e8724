//! Object store construction per provider.

use super::{PersistError, Provider};
use crate::config::{GcsConfig, S3Config, StorageConfig};
use object_store::aws::{AmazonS3Builder, AmazonS3ConfigKey};
use object_store::gcp::{GoogleCloudStorageBuilder, GoogleConfigKey};
use object_store::local::LocalFileSystem;
use object_store::path::Path as ObjectPath;
use object_store::ObjectStore;
use std::collections::HashMap;
use std::path::PathBuf;
use std::str::FromStr;
use std::sync::Arc;
use url::Url;

/// A store plus the object path a writer should target.
#[derive(Debug, Clone)]
pub struct StoreTarget {
    pub store: Arc<dyn ObjectStore>,
    pub path: ObjectPath,
    /// Human-readable location, reported back in acknowledgements.
    pub location: String,
}

/// Builds object stores for save destinations.
#[derive(Debug, Clone)]
pub struct StoreFactory {
    local_root: PathBuf,
    s3: Option<S3Config>,
    gcs: Option<GcsConfig>,
}

impl StoreFactory {
    pub fn new(config: &StorageConfig) -> Self {
        Self {
            local_root: config.local_root.clone(),
            s3: config.s3.clone(),
            gcs: config.gcs.clone(),
        }
    }

    /// Factory whose local provider is rooted at `root`, with remote
    /// providers configured from the environment only.
    pub fn local(root: impl Into<PathBuf>) -> Self {
        Self {
            local_root: root.into(),
            s3: None,
            gcs: None,
        }
    }

    pub fn resolve(
        &self,
        provider: Provider,
        path: &str,
        options: &HashMap<String, String>,
    ) -> Result<StoreTarget, PersistError> {
        match provider {
            Provider::Local => self.build_local(path),
            Provider::S3 => self.build_s3(path, options),
            Provider::Gcs => self.build_gcs(path, options),
            Provider::Hdfs => Err(PersistError::Configuration(
                "hdfs has no object store".to_string(),
            )),
        }
    }

    fn build_local(&self, path: &str) -> Result<StoreTarget, PersistError> {
        std::fs::create_dir_all(&self.local_root).map_err(|e| {
            PersistError::Configuration(format!(
                "Failed to create local root '{}': {}",
                self.local_root.display(),
                e
            ))
        })?;
        let root = self.local_root.canonicalize().map_err(|e| {
            PersistError::Configuration(format!(
                "Failed to resolve local root '{}': {}",
                self.local_root.display(),
                e
            ))
        })?;

        let relative = path.trim_start_matches('/');
        let object_path =
            ObjectPath::parse(relative).map_err(|e| PersistError::invalid_path(path, e))?;
        if object_path.as_ref().is_empty() {
            return Err(PersistError::invalid_path(path, "path is empty"));
        }

        let store = LocalFileSystem::new_with_prefix(&root)
            .map_err(|e| PersistError::Configuration(format!("LocalFileSystem: {}", e)))?;

        Ok(StoreTarget {
            store: Arc::new(store),
            location: root.join(object_path.as_ref()).display().to_string(),
            path: object_path,
        })
    }

    fn build_s3(
        &self,
        path: &str,
        options: &HashMap<String, String>,
    ) -> Result<StoreTarget, PersistError> {
        let (bucket, key) = parse_remote_url(path, &["s3", "s3a"])?;

        let mut builder = AmazonS3Builder::from_env().with_bucket_name(&bucket);
        if let Some(cfg) = &self.s3 {
            if let Some(region) = &cfg.region {
                builder = builder.with_region(region);
            }
            if let Some(endpoint) = &cfg.endpoint {
                // Path-style requests for S3-compatible endpoints like MinIO
                builder = builder
                    .with_endpoint(endpoint)
                    .with_virtual_hosted_style_request(false);
            }
            if let Some(access_key) = &cfg.access_key {
                builder = builder.with_access_key_id(access_key);
            }
            if let Some(secret_key) = &cfg.secret_key {
                builder = builder.with_secret_access_key(secret_key);
            }
            builder = builder.with_allow_http(cfg.allow_http);
        }
        for (name, value) in options {
            let key = AmazonS3ConfigKey::from_str(name).map_err(|e| {
                PersistError::InvalidParams(format!("storage option '{}': {}", name, e))
            })?;
            builder = builder.with_config(key, value);
        }

        let store = builder
            .build()
            .map_err(|e| PersistError::Configuration(format!("S3: {}", e)))?;

        Ok(StoreTarget {
            store: Arc::new(store),
            location: format!("s3://{}/{}", bucket, key),
            path: key,
        })
    }

    fn build_gcs(
        &self,
        path: &str,
        options: &HashMap<String, String>,
    ) -> Result<StoreTarget, PersistError> {
        let (bucket, key) = parse_remote_url(path, &["gs", "gcs"])?;

        let mut builder = GoogleCloudStorageBuilder::from_env().with_bucket_name(&bucket);
        if let Some(cfg) = &self.gcs {
            if let Some(service_account) = &cfg.service_account_path {
                builder = builder.with_service_account_path(service_account);
            }
        }
        for (name, value) in options {
            let key = GoogleConfigKey::from_str(name).map_err(|e| {
                PersistError::InvalidParams(format!("storage option '{}': {}", name, e))
            })?;
            builder = builder.with_config(key, value);
        }

        let store = builder
            .build()
            .map_err(|e| PersistError::Configuration(format!("GCS: {}", e)))?;

        Ok(StoreTarget {
            store: Arc::new(store),
            location: format!("gs://{}/{}", bucket, key),
            path: key,
        })
    }
}

/// Split `scheme://bucket/key` into bucket and object path.
fn parse_remote_url(path: &str, schemes: &[&str]) -> Result<(String, ObjectPath), PersistError> {
    let url = Url::parse(path).map_err(|e| PersistError::invalid_path(path, e))?;
    if !schemes.contains(&url.scheme()) {
        return Err(PersistError::invalid_path(
            path,
            format!("expected a {}:// URL", schemes[0]),
        ));
    }
    let bucket = url
        .host_str()
        .filter(|b| !b.is_empty())
        .ok_or_else(|| PersistError::invalid_path(path, "missing bucket"))?
        .to_string();
    let key = ObjectPath::parse(url.path().trim_start_matches('/'))
        .map_err(|e| PersistError::invalid_path(path, e))?;
    if key.as_ref().is_empty() {
        return Err(PersistError::invalid_path(path, "missing object key"));
    }
    Ok((bucket, key))
}
