//! Delta Lake table writer.
//!
//! Tables are maintained directly on the object store: data lives in Parquet
//! files next to a `_delta_log/` directory of newline-delimited JSON commits
//! (`protocol`, `metaData`, `add`, `remove`, `commitInfo`). The current table
//! state is the replay of every commit in version order. Each write adds one
//! data file and one commit.

use super::parquet::{encode, put};
use super::{PersistAck, PersistError, StoreTarget, TableFormat, TableWriter, WriteMode, WriteOptions};
use async_trait::async_trait;
use datafusion::arrow::datatypes::{DataType, Schema};
use datafusion::arrow::record_batch::RecordBatch;
use futures::TryStreamExt;
use object_store::path::Path as ObjectPath;
use serde_json::{json, Value as JsonValue};
use std::collections::BTreeSet;

const LOG_DIR: &str = "_delta_log";
const LAST_CHECKPOINT: &str = "_last_checkpoint";

/// Replayed state of an existing table.
#[derive(Debug, Default)]
struct TableState {
    version: Option<i64>,
    table_id: Option<String>,
    schema_string: Option<String>,
    files: BTreeSet<String>,
}

impl TableState {
    fn exists(&self) -> bool {
        self.version.is_some()
    }

    fn next_version(&self) -> i64 {
        self.version.map_or(0, |v| v + 1)
    }

    fn apply(&mut self, action: &JsonValue) {
        if let Some(meta) = action.get("metaData") {
            self.table_id = meta.get("id").and_then(JsonValue::as_str).map(String::from);
            self.schema_string = meta
                .get("schemaString")
                .and_then(JsonValue::as_str)
                .map(String::from);
        }
        if let Some(path) = action.pointer("/add/path").and_then(JsonValue::as_str) {
            self.files.insert(path.to_string());
        }
        if let Some(path) = action.pointer("/remove/path").and_then(JsonValue::as_str) {
            self.files.remove(path);
        }
    }
}

fn log_dir(table: &ObjectPath) -> ObjectPath {
    table.child(LOG_DIR)
}

fn commit_path(table: &ObjectPath, version: i64) -> ObjectPath {
    log_dir(table).child(format!("{:020}.json", version))
}

/// Parse `00000000000000000003.json` into `3`.
fn commit_version(file_name: &str) -> Option<i64> {
    let stem = file_name.strip_suffix(".json")?;
    if stem.len() != 20 || !stem.bytes().all(|b| b.is_ascii_digit()) {
        return None;
    }
    stem.parse().ok()
}

/// Checkpoint files replace the commits they summarise, which may then be
/// cleaned up. Replaying JSON commits alone would miss their state.
fn is_checkpoint(file_name: &str) -> bool {
    file_name == LAST_CHECKPOINT
        || (file_name.ends_with(".parquet") && file_name.contains(".checkpoint"))
}

async fn load_state(target: &StoreTarget) -> Result<TableState, PersistError> {
    let prefix = log_dir(&target.path);
    let objects: Vec<_> = target.store.list(Some(&prefix)).try_collect().await?;

    if let Some(checkpoint) = objects
        .iter()
        .find(|meta| meta.location.filename().is_some_and(is_checkpoint))
    {
        return Err(PersistError::Table(format!(
            "table has checkpoint '{}'; checkpointed tables are not supported",
            checkpoint.location
        )));
    }

    let mut commits: Vec<(i64, ObjectPath)> = objects
        .into_iter()
        .filter_map(|meta| {
            let version = commit_version(meta.location.filename()?)?;
            Some((version, meta.location))
        })
        .collect();
    commits.sort_by_key(|(version, _)| *version);

    let mut state = TableState::default();
    for (version, location) in commits {
        let bytes = target.store.get(&location).await?.bytes().await?;
        let text = std::str::from_utf8(&bytes)
            .map_err(|e| PersistError::Table(format!("commit {} is not UTF-8: {}", version, e)))?;
        for line in text.lines().filter(|l| !l.trim().is_empty()) {
            let action: JsonValue = serde_json::from_str(line).map_err(|e| {
                PersistError::Table(format!("commit {} is not valid JSON: {}", version, e))
            })?;
            state.apply(&action);
        }
        state.version = Some(version);
    }
    Ok(state)
}

fn delta_type(data_type: &DataType) -> Result<&'static str, PersistError> {
    match data_type {
        DataType::Int64 => Ok("long"),
        DataType::Float64 => Ok("double"),
        DataType::Boolean => Ok("boolean"),
        DataType::Utf8 => Ok("string"),
        other => Err(PersistError::Table(format!(
            "no delta type for arrow type {}",
            other
        ))),
    }
}

fn schema_string(schema: &Schema) -> Result<String, PersistError> {
    let fields = schema
        .fields()
        .iter()
        .map(|f| {
            Ok(json!({
                "name": f.name(),
                "type": delta_type(f.data_type())?,
                "nullable": f.is_nullable(),
                "metadata": {},
            }))
        })
        .collect::<Result<Vec<_>, PersistError>>()?;
    Ok(json!({"type": "struct", "fields": fields}).to_string())
}

/// Compare two schema strings by field names and types.
fn same_fields(existing: &str, incoming: &str) -> bool {
    let fields = |s: &str| -> Option<Vec<(String, String)>> {
        let parsed: JsonValue = serde_json::from_str(s).ok()?;
        parsed
            .get("fields")?
            .as_array()?
            .iter()
            .map(|f| {
                Some((
                    f.get("name")?.as_str()?.to_string(),
                    f.get("type")?.as_str()?.to_string(),
                ))
            })
            .collect()
    };
    matches!((fields(existing), fields(incoming)), (Some(a), Some(b)) if a == b)
}

fn mode_name(mode: WriteMode) -> &'static str {
    match mode {
        WriteMode::Append => "Append",
        WriteMode::Overwrite => "Overwrite",
        WriteMode::Error => "ErrorIfExists",
    }
}

/// Appends to, overwrites, or creates a Delta table at the target path.
#[derive(Debug, Default, Clone, Copy)]
pub struct DeltaTableWriter;

#[async_trait]
impl TableWriter for DeltaTableWriter {
    fn format(&self) -> TableFormat {
        TableFormat::Deltalake
    }

    async fn write(
        &self,
        target: &StoreTarget,
        batch: RecordBatch,
        options: &WriteOptions,
    ) -> Result<PersistAck, PersistError> {
        let state = load_state(target).await?;
        let schema = schema_string(&batch.schema())?;

        if state.exists() {
            match options.mode {
                WriteMode::Error => {
                    return Err(PersistError::Table(format!(
                        "table '{}' already exists",
                        target.location
                    )))
                }
                WriteMode::Append => {
                    let existing = state.schema_string.as_deref().unwrap_or_default();
                    if !same_fields(existing, &schema) {
                        return Err(PersistError::Table(format!(
                            "schema of '{}' does not match the dataset: table has {}, dataset has {}",
                            target.location, existing, schema
                        )));
                    }
                }
                WriteMode::Overwrite => {}
            }
        }

        let rows = batch.num_rows();
        let data = encode(batch, options).await?;
        let size = data.len();

        let file_name = match options.compression.file_tag() {
            Some(tag) => format!("part-00000-{}-c000.{}.parquet", uuid::Uuid::new_v4(), tag),
            None => format!("part-00000-{}-c000.parquet", uuid::Uuid::new_v4()),
        };
        put(target, &target.path.child(file_name.as_str()), data, false).await?;

        let now = chrono::Utc::now().timestamp_millis();
        let mut actions: Vec<JsonValue> = Vec::new();

        if !state.exists() {
            actions.push(json!({"protocol": {"minReaderVersion": 1, "minWriterVersion": 2}}));
        }
        if !state.exists() || options.mode == WriteMode::Overwrite {
            let table_id = state
                .table_id
                .clone()
                .unwrap_or_else(|| uuid::Uuid::new_v4().to_string());
            actions.push(json!({"metaData": {
                "id": table_id,
                "format": {"provider": "parquet", "options": {}},
                "schemaString": schema,
                "partitionColumns": [],
                "configuration": {},
                "createdTime": now,
            }}));
        }
        if options.mode == WriteMode::Overwrite {
            for path in &state.files {
                actions.push(json!({"remove": {
                    "path": path,
                    "deletionTimestamp": now,
                    "dataChange": true,
                }}));
            }
        }
        actions.push(json!({"add": {
            "path": file_name,
            "partitionValues": {},
            "size": size,
            "modificationTime": now,
            "dataChange": true,
        }}));
        actions.push(json!({"commitInfo": {
            "timestamp": now,
            "operation": "WRITE",
            "operationParameters": {"mode": mode_name(options.mode)},
        }}));

        let mut commit = actions
            .iter()
            .map(JsonValue::to_string)
            .collect::<Vec<_>>()
            .join("\n");
        commit.push('\n');

        let version = state.next_version();
        let path = commit_path(&target.path, version);
        match put(target, &path, commit.clone().into_bytes(), true).await {
            Ok(()) => {}
            Err(PersistError::Store(object_store::Error::AlreadyExists { .. })) => {
                return Err(PersistError::Table(format!(
                    "version {} of '{}' was committed concurrently",
                    version, target.location
                )))
            }
            // Stores without conditional puts fall back to a plain write.
            Err(PersistError::Store(object_store::Error::NotImplemented)) => {
                put(target, &path, commit.into_bytes(), false).await?;
            }
            Err(e) => return Err(e),
        }

        tracing::debug!(table = %target.location, version, "Committed delta version");

        Ok(PersistAck {
            location: target.location.clone(),
            rows,
            bytes_written: size,
        })
    }
}
