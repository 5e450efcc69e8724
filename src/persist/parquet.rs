//! Single-file Parquet writer with configurable compression

use super::{PersistAck, PersistError, StoreTarget, TableFormat, TableWriter, WriteMode, WriteOptions};
use async_trait::async_trait;
use datafusion::arrow::record_batch::RecordBatch;
use datafusion::parquet::arrow::ArrowWriter;
use datafusion::parquet::file::properties::{WriterProperties, WriterVersion};
use object_store::path::Path as ObjectPath;
use object_store::{PutMode, PutOptions, PutPayload};

const DEFAULT_MAX_ROW_GROUP_SIZE: usize = 100_000;

/// Build writer properties from save options.
fn writer_properties(options: &WriteOptions) -> WriterProperties {
    WriterProperties::builder()
        .set_writer_version(WriterVersion::PARQUET_2_0)
        .set_compression(options.compression.to_parquet())
        .set_max_row_group_size(
            options
                .max_row_group_size
                .unwrap_or(DEFAULT_MAX_ROW_GROUP_SIZE),
        )
        .build()
}

/// Encode a batch as an in-memory Parquet file.
///
/// Runs on the blocking pool since encoding and compression are CPU-bound.
pub(crate) async fn encode(
    batch: RecordBatch,
    options: &WriteOptions,
) -> Result<Vec<u8>, PersistError> {
    let props = writer_properties(options);
    tokio::task::spawn_blocking(move || {
        let mut buffer = Vec::new();
        let mut writer = ArrowWriter::try_new(&mut buffer, batch.schema(), Some(props))?;
        writer.write(&batch)?;
        writer.close()?;
        Ok::<_, PersistError>(buffer)
    })
    .await?
}

/// Upload bytes, failing instead of replacing when `create_only` is set.
pub(crate) async fn put(
    target: &StoreTarget,
    path: &ObjectPath,
    bytes: Vec<u8>,
    create_only: bool,
) -> Result<(), PersistError> {
    let mode = if create_only {
        PutMode::Create
    } else {
        PutMode::Overwrite
    };
    let opts = PutOptions {
        mode,
        ..Default::default()
    };
    target
        .store
        .put_opts(path, PutPayload::from(bytes), opts)
        .await?;
    Ok(())
}

/// Writes the dataset as one Parquet object at the target path.
///
/// An existing object is replaced unless the mode is `error`.
#[derive(Debug, Default, Clone, Copy)]
pub struct ParquetTableWriter;

#[async_trait]
impl TableWriter for ParquetTableWriter {
    fn format(&self) -> TableFormat {
        TableFormat::Parquet
    }

    async fn write(
        &self,
        target: &StoreTarget,
        batch: RecordBatch,
        options: &WriteOptions,
    ) -> Result<PersistAck, PersistError> {
        let rows = batch.num_rows();
        let bytes = encode(batch, options).await?;
        let bytes_written = bytes.len();

        put(target, &target.path, bytes, options.mode == WriteMode::Error)
            .await
            .map_err(|e| match e {
                PersistError::Store(object_store::Error::AlreadyExists { .. }) => {
                    PersistError::Table(format!("'{}' already exists", target.location))
                }
                other => other,
            })?;

        Ok(PersistAck {
            location: target.location.clone(),
            rows,
            bytes_written,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use datafusion::arrow::array::Int64Array;
    use datafusion::arrow::datatypes::{DataType, Field, Schema};
    use datafusion::parquet::arrow::arrow_reader::ParquetRecordBatchReaderBuilder;
    use object_store::memory::InMemory;
    use std::sync::Arc;

    fn batch() -> RecordBatch {
        let schema = Arc::new(Schema::new(vec![Field::new("n", DataType::Int64, true)]));
        RecordBatch::try_new(schema, vec![Arc::new(Int64Array::from(vec![1, 2, 3]))]).unwrap()
    }

    fn target() -> StoreTarget {
        StoreTarget {
            store: Arc::new(InMemory::new()),
            path: ObjectPath::from("out/n.parquet"),
            location: "memory://out/n.parquet".to_string(),
        }
    }

    #[tokio::test]
    async fn test_write_round_trips_rows() {
        let target = target();
        let ack = ParquetTableWriter
            .write(&target, batch(), &WriteOptions::default())
            .await
            .unwrap();
        assert_eq!(ack.rows, 3);

        let bytes = target.store.get(&target.path).await.unwrap().bytes().await.unwrap();
        assert_eq!(bytes.len(), ack.bytes_written);
        let reader = ParquetRecordBatchReaderBuilder::try_new(bytes)
            .unwrap()
            .build()
            .unwrap();
        let total: usize = reader.map(|b| b.unwrap().num_rows()).sum();
        assert_eq!(total, 3);
    }

    #[tokio::test]
    async fn test_error_mode_refuses_existing_object() {
        let target = target();
        ParquetTableWriter
            .write(&target, batch(), &WriteOptions::default())
            .await
            .unwrap();

        let options = WriteOptions {
            mode: WriteMode::Error,
            ..Default::default()
        };
        let err = ParquetTableWriter
            .write(&target, batch(), &options)
            .await
            .unwrap_err();
        assert!(matches!(err, PersistError::Table(_)));
    }
}
