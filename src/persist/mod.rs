//! Persistence dispatch.
//!
//! A validated [`Dataset`] is written to one of the `(provider, format)`
//! combinations below. The combination is resolved to a writer before any
//! store is built, so unsupported pairs never touch storage.
//!
//! | provider | parquet | deltalake | orc |
//! |----------|---------|-----------|-----|
//! | s3       | yes     | yes       | no  |
//! | gcs      | yes     | yes       | no  |
//! | local    | yes     | yes       | no  |
//! | hdfs     | no      | no        | no  |

mod delta;
mod error;
mod parquet;
mod store;

pub use delta::DeltaTableWriter;
pub use error::PersistError;
pub use parquet::ParquetTableWriter;
pub use store::{StoreFactory, StoreTarget};

use crate::datasets::Dataset;
use async_trait::async_trait;
use datafusion::arrow::record_batch::RecordBatch;
use datafusion::parquet::basic::{Compression, GzipLevel, ZstdLevel};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::fmt;

/// Storage provider.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Provider {
    S3,
    Gcs,
    Hdfs,
    Local,
}

impl Provider {
    pub fn as_str(&self) -> &'static str {
        match self {
            Provider::S3 => "s3",
            Provider::Gcs => "gcs",
            Provider::Hdfs => "hdfs",
            Provider::Local => "local",
        }
    }
}

impl fmt::Display for Provider {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Table format.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum TableFormat {
    #[default]
    Parquet,
    Orc,
    #[serde(alias = "delta")]
    Deltalake,
}

impl TableFormat {
    pub fn as_str(&self) -> &'static str {
        match self {
            TableFormat::Parquet => "parquet",
            TableFormat::Orc => "orc",
            TableFormat::Deltalake => "deltalake",
        }
    }
}

impl fmt::Display for TableFormat {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Where and how a dataset is saved, with the provider already resolved.
#[derive(Debug, Clone, PartialEq)]
pub struct SaveDescriptor {
    pub provider: Provider,
    pub format: TableFormat,
    /// Object URL (`s3://bucket/key`, `gs://bucket/key`) or a path under the
    /// local root.
    pub path: String,
    pub params: serde_json::Map<String, serde_json::Value>,
}

impl SaveDescriptor {
    pub fn new(provider: Provider, format: TableFormat, path: impl Into<String>) -> Self {
        Self {
            provider,
            format,
            path: path.into(),
            params: serde_json::Map::new(),
        }
    }

    pub fn with_param(mut self, key: &str, value: impl Into<serde_json::Value>) -> Self {
        self.params.insert(key.to_string(), value.into());
        self
    }
}

/// Parquet compression codec.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum CompressionCodec {
    #[default]
    Snappy,
    Zstd,
    Lz4,
    Gzip,
    None,
}

impl CompressionCodec {
    pub fn to_parquet(self) -> Compression {
        match self {
            CompressionCodec::Snappy => Compression::SNAPPY,
            CompressionCodec::Zstd => Compression::ZSTD(ZstdLevel::default()),
            CompressionCodec::Lz4 => Compression::LZ4_RAW,
            CompressionCodec::Gzip => Compression::GZIP(GzipLevel::default()),
            CompressionCodec::None => Compression::UNCOMPRESSED,
        }
    }

    /// Codec segment used in data file names, if any.
    pub fn file_tag(self) -> Option<&'static str> {
        match self {
            CompressionCodec::Snappy => Some("snappy"),
            CompressionCodec::Zstd => Some("zstd"),
            CompressionCodec::Lz4 => Some("lz4"),
            CompressionCodec::Gzip => Some("gz"),
            CompressionCodec::None => None,
        }
    }
}

/// What to do when the destination already holds data.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum WriteMode {
    #[default]
    Append,
    Overwrite,
    Error,
}

/// Options parsed from a save descriptor's params.
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct WriteOptions {
    #[serde(default)]
    pub compression: CompressionCodec,
    #[serde(default)]
    pub max_row_group_size: Option<usize>,
    #[serde(default)]
    pub mode: WriteMode,
    /// Forwarded to the object store builder, e.g. `aws_region`.
    #[serde(default)]
    pub storage_options: HashMap<String, String>,
}

impl WriteOptions {
    pub fn from_params(
        params: &serde_json::Map<String, serde_json::Value>,
    ) -> Result<Self, PersistError> {
        let options: WriteOptions =
            serde_json::from_value(serde_json::Value::Object(params.clone()))
                .map_err(|e| PersistError::InvalidParams(e.to_string()))?;
        if options.max_row_group_size == Some(0) {
            return Err(PersistError::InvalidParams(
                "max_row_group_size must be greater than zero".to_string(),
            ));
        }
        Ok(options)
    }
}

/// Acknowledgement of a completed write.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PersistAck {
    /// Fully qualified location of the written file or table.
    pub location: String,
    pub rows: usize,
    pub bytes_written: usize,
}

/// Writes one record batch in a table format.
#[async_trait]
pub trait TableWriter: fmt::Debug + Send + Sync {
    fn format(&self) -> TableFormat;

    async fn write(
        &self,
        target: &StoreTarget,
        batch: RecordBatch,
        options: &WriteOptions,
    ) -> Result<PersistAck, PersistError>;
}

static PARQUET_WRITER: ParquetTableWriter = ParquetTableWriter;
static DELTA_WRITER: DeltaTableWriter = DeltaTableWriter;

/// Resolve the writer for a combination, rejecting unsupported pairs.
pub fn writer_for(
    provider: Provider,
    format: TableFormat,
) -> Result<&'static dyn TableWriter, PersistError> {
    match (provider, format) {
        (Provider::Hdfs, _) | (_, TableFormat::Orc) => {
            Err(PersistError::UnsupportedCombination { provider, format })
        }
        (_, TableFormat::Parquet) => Ok(&PARQUET_WRITER),
        (_, TableFormat::Deltalake) => Ok(&DELTA_WRITER),
    }
}

/// Writes validated datasets to their configured destinations.
#[derive(Debug, Clone)]
pub struct PersistenceDispatcher {
    stores: StoreFactory,
}

impl PersistenceDispatcher {
    pub fn new(stores: StoreFactory) -> Self {
        Self { stores }
    }

    #[tracing::instrument(
        name = "persist_dataset",
        skip(self, dataset, save),
        fields(
            sheetdrop.provider = %save.provider,
            sheetdrop.format = %save.format,
            sheetdrop.path = %save.path,
            sheetdrop.rows = dataset.num_rows(),
        )
    )]
    pub async fn persist(
        &self,
        dataset: &Dataset,
        save: &SaveDescriptor,
    ) -> Result<PersistAck, PersistError> {
        let writer = writer_for(save.provider, save.format)?;
        let options = WriteOptions::from_params(&save.params)?;
        let target = self
            .stores
            .resolve(save.provider, &save.path, &options.storage_options)?;
        let batch = dataset
            .to_record_batch()
            .map_err(|e| PersistError::Encode(e.to_string()))?;

        let ack = writer.write(&target, batch, &options).await?;
        tracing::info!(
            location = %ack.location,
            bytes = ack.bytes_written,
            "Persisted dataset"
        );
        Ok(ack)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_writer_matrix() {
        for provider in [Provider::S3, Provider::Gcs, Provider::Local] {
            assert_eq!(
                writer_for(provider, TableFormat::Parquet).unwrap().format(),
                TableFormat::Parquet
            );
            assert_eq!(
                writer_for(provider, TableFormat::Deltalake)
                    .unwrap()
                    .format(),
                TableFormat::Deltalake
            );
            assert!(writer_for(provider, TableFormat::Orc)
                .unwrap_err()
                .is_unsupported());
        }
        for format in [TableFormat::Parquet, TableFormat::Orc, TableFormat::Deltalake] {
            assert!(writer_for(Provider::Hdfs, format)
                .unwrap_err()
                .is_unsupported());
        }
    }

    #[test]
    fn test_write_options() {
        let params = serde_json::json!({
            "compression": "zstd",
            "mode": "overwrite",
            "storage_options": {"aws_region": "eu-west-1"}
        });
        let options = WriteOptions::from_params(params.as_object().unwrap()).unwrap();
        assert_eq!(options.compression, CompressionCodec::Zstd);
        assert_eq!(options.mode, WriteMode::Overwrite);
        assert_eq!(options.storage_options["aws_region"], "eu-west-1");

        let defaults = WriteOptions::from_params(&serde_json::Map::new()).unwrap();
        assert_eq!(defaults.compression, CompressionCodec::Snappy);
        assert_eq!(defaults.mode, WriteMode::Append);
    }

    #[test]
    fn test_write_options_reject_unknown_keys() {
        let params = serde_json::json!({"partition_by": ["a"]});
        let err = WriteOptions::from_params(params.as_object().unwrap()).unwrap_err();
        assert!(matches!(err, PersistError::InvalidParams(_)));
    }

    #[test]
    fn test_format_aliases() {
        let format: TableFormat = serde_json::from_str(r#""delta""#).unwrap();
        assert_eq!(format, TableFormat::Deltalake);
        let provider: Provider = serde_json::from_str(r#""gcs""#).unwrap();
        assert_eq!(provider, Provider::Gcs);
    }
}
