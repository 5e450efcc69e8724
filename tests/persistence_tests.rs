use datafusion::arrow::array::{Array, Int64Array, StringArray};
use datafusion::prelude::{ParquetReadOptions, SessionConfig, SessionContext};
use sheetdrop::datasets::{Column, Dataset, Value};
use sheetdrop::persist::{
    PersistError, PersistenceDispatcher, Provider, SaveDescriptor, StoreFactory, TableFormat,
};
use sheetdrop::schema::ColumnType;
use std::path::Path;
use tempfile::tempdir;

fn people() -> Dataset {
    Dataset::try_new(vec![
        Column::new(
            "age",
            ColumnType::Int,
            vec![Value::Int(1), Value::Int(2), Value::Null],
        ),
        Column::new(
            "name",
            ColumnType::String,
            vec![Value::from("ada"), Value::from("bob"), Value::from("cy")],
        ),
    ])
    .unwrap()
}

async fn read_back(path: &Path) -> (Vec<Option<i64>>, Vec<String>) {
    let config = SessionConfig::new()
        .set_bool("datafusion.execution.parquet.schema_force_view_types", false);
    let ctx = SessionContext::new_with_config(config);
    let batches = ctx
        .read_parquet(path.to_str().unwrap(), ParquetReadOptions::default())
        .await
        .unwrap()
        .collect()
        .await
        .unwrap();

    let mut ages = Vec::new();
    let mut names = Vec::new();
    for batch in batches {
        let age = batch
            .column_by_name("age")
            .unwrap()
            .as_any()
            .downcast_ref::<Int64Array>()
            .unwrap();
        let name = batch
            .column_by_name("name")
            .unwrap()
            .as_any()
            .downcast_ref::<StringArray>()
            .unwrap();
        for i in 0..batch.num_rows() {
            ages.push((!age.is_null(i)).then(|| age.value(i)));
            names.push(name.value(i).to_string());
        }
    }
    (ages, names)
}

fn delta_commits(table: &Path) -> Vec<serde_json::Value> {
    let mut logs: Vec<_> = std::fs::read_dir(table.join("_delta_log"))
        .unwrap()
        .map(|e| e.unwrap().path())
        .collect();
    logs.sort();
    logs.iter()
        .map(|p| {
            let text = std::fs::read_to_string(p).unwrap();
            serde_json::Value::Array(
                text.lines()
                    .map(|line| serde_json::from_str(line).unwrap())
                    .collect(),
            )
        })
        .collect()
}

#[tokio::test]
async fn test_local_parquet_round_trip() {
    let dir = tempdir().unwrap();
    let dispatcher = PersistenceDispatcher::new(StoreFactory::local(dir.path()));

    let save = SaveDescriptor::new(Provider::Local, TableFormat::Parquet, "sample/people.parquet")
        .with_param("compression", "zstd");
    let ack = dispatcher.persist(&people(), &save).await.unwrap();
    assert_eq!(ack.rows, 3);
    assert!(ack.bytes_written > 0);

    let file = dir.path().join("sample/people.parquet");
    assert!(file.is_file());

    let (ages, names) = read_back(&file).await;
    assert_eq!(ages, vec![Some(1), Some(2), None]);
    assert_eq!(names, vec!["ada", "bob", "cy"]);
}

#[tokio::test]
async fn test_parquet_error_mode_refuses_existing_file() {
    let dir = tempdir().unwrap();
    let dispatcher = PersistenceDispatcher::new(StoreFactory::local(dir.path()));
    let save = SaveDescriptor::new(Provider::Local, TableFormat::Parquet, "out.parquet")
        .with_param("mode", "error");

    dispatcher.persist(&people(), &save).await.unwrap();
    let err = dispatcher.persist(&people(), &save).await.unwrap_err();
    assert!(matches!(err, PersistError::Table(_)), "{}", err);
}

#[tokio::test]
async fn test_local_delta_create_and_append() {
    let dir = tempdir().unwrap();
    let dispatcher = PersistenceDispatcher::new(StoreFactory::local(dir.path()));
    let save = SaveDescriptor::new(Provider::Local, TableFormat::Deltalake, "tables/people");

    dispatcher.persist(&people(), &save).await.unwrap();
    dispatcher.persist(&people(), &save).await.unwrap();

    let table = dir.path().join("tables/people");
    let commits = delta_commits(&table);
    assert_eq!(commits.len(), 2);

    let first = commits[0].as_array().unwrap();
    assert!(first.iter().any(|action| action.get("protocol").is_some()));
    assert!(first.iter().any(|action| action.get("metaData").is_some()));
    let second = commits[1].as_array().unwrap();
    assert!(second.iter().all(|action| action.get("metaData").is_none()));
    assert!(second.iter().any(|action| action.get("add").is_some()));

    let data_files = std::fs::read_dir(&table)
        .unwrap()
        .filter(|e| {
            e.as_ref()
                .unwrap()
                .path()
                .extension()
                .is_some_and(|ext| ext == "parquet")
        })
        .count();
    assert_eq!(data_files, 2);
}

#[tokio::test]
async fn test_unsupported_combinations_write_nothing() {
    let dir = tempdir().unwrap();
    let root = dir.path().join("root");
    let dispatcher = PersistenceDispatcher::new(StoreFactory::local(&root));

    for (provider, format) in [
        (Provider::Hdfs, TableFormat::Deltalake),
        (Provider::Hdfs, TableFormat::Parquet),
        (Provider::Local, TableFormat::Orc),
        (Provider::S3, TableFormat::Orc),
    ] {
        let save = SaveDescriptor::new(provider, format, "anything");
        let err = dispatcher.persist(&people(), &save).await.unwrap_err();
        assert!(err.is_unsupported(), "{:?} x {:?}: {}", provider, format, err);
    }

    assert!(!root.exists());
}

#[tokio::test]
async fn test_invalid_params_and_paths() {
    let dir = tempdir().unwrap();
    let dispatcher = PersistenceDispatcher::new(StoreFactory::local(dir.path()));

    let save = SaveDescriptor::new(Provider::Local, TableFormat::Parquet, "a.parquet")
        .with_param("bogus", 1);
    assert!(matches!(
        dispatcher.persist(&people(), &save).await.unwrap_err(),
        PersistError::InvalidParams(_)
    ));

    let save = SaveDescriptor::new(Provider::Local, TableFormat::Parquet, "../escape.parquet");
    assert!(matches!(
        dispatcher.persist(&people(), &save).await.unwrap_err(),
        PersistError::InvalidPath { .. }
    ));

    let save = SaveDescriptor::new(Provider::S3, TableFormat::Parquet, "not-a-url");
    assert!(matches!(
        dispatcher.persist(&people(), &save).await.unwrap_err(),
        PersistError::InvalidPath { .. }
    ));
}
