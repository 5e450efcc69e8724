use datafusion::arrow::array::{Array, Float64Array};
use datafusion::prelude::{ParquetReadOptions, SessionContext};
use sheetdrop::config::LedgerConfig;
use sheetdrop::datasets::{SheetKey, Value};
use sheetdrop::decode::{DecodeError, DecoderRegistry, LoadDescriptor};
use sheetdrop::jobs::{JobDefaults, JobDefinition, JobRegistry};
use sheetdrop::ledger::{self, StatusKind};
use sheetdrop::persist::{PersistenceDispatcher, StoreFactory};
use sheetdrop::pipeline::{Pipeline, UploadStore};
use tempfile::tempdir;

const SAMPLE: &[u8] = include_bytes!("fixtures/sample.xlsx");
const INVALID: &[u8] = include_bytes!("fixtures/invalid.xlsx");
const SAMPLE_JOB: &str = include_str!("../jobs/sample.json");

#[test]
fn test_decode_named_sheet() {
    let load = LoadDescriptor::new("excel").with_param("sheet_name", "People");
    let dataset = DecoderRegistry::new().decode(SAMPLE, &load).unwrap();

    assert_eq!(
        dataset.column_names(),
        vec!["small_values", "one_to_three", "phone_number"]
    );
    assert_eq!(dataset.num_rows(), 3);
    assert_eq!(
        dataset.column("one_to_three").unwrap().values(),
        &[Value::Int(1), Value::Int(3), Value::Int(2)]
    );
    assert_eq!(
        dataset.column("phone_number").unwrap().values(),
        &[Value::from("abc-123"), Value::Null, Value::from("x1")]
    );
}

#[test]
fn test_decode_sheet_by_index_with_row_limit() {
    let load = LoadDescriptor::new("excel")
        .with_param("sheet_name", 1)
        .with_param("nrows", 1);
    let dataset = DecoderRegistry::new().decode(SAMPLE, &load).unwrap();

    assert_eq!(dataset.column_names(), vec!["city", "population"]);
    assert_eq!(dataset.num_rows(), 1);
    assert_eq!(
        dataset.column("city").unwrap().values(),
        &[Value::from("Oslo")]
    );
}

#[test]
fn test_decode_sheets_in_requested_order() {
    let sheets = vec![SheetKey::from("Cities"), SheetKey::from("People")];
    let datasets = DecoderRegistry::new()
        .decode_sheets(SAMPLE, &LoadDescriptor::new("excel"), &sheets)
        .unwrap();

    assert_eq!(datasets.keys().cloned().collect::<Vec<_>>(), sheets);
    assert_eq!(datasets.get(&sheets[0]).unwrap().num_rows(), 2);
    assert_eq!(datasets.get(&sheets[1]).unwrap().num_rows(), 3);
}

#[test]
fn test_missing_sheet_and_bad_bytes() {
    let registry = DecoderRegistry::new();

    let load = LoadDescriptor::new("excel").with_param("sheet_name", "Nope");
    assert!(matches!(
        registry.decode(SAMPLE, &load),
        Err(DecodeError::SheetNotFound(_))
    ));

    let err = registry
        .decode_sheets(
            SAMPLE,
            &LoadDescriptor::new("excel"),
            &[SheetKey::from("People"), SheetKey::Index(7)],
        )
        .unwrap_err();
    assert!(matches!(err, DecodeError::SheetNotFound(SheetKey::Index(7))));

    assert!(registry
        .decode(b"plain text", &LoadDescriptor::new("excel"))
        .is_err());
}

async fn sample_pipeline(dir: &std::path::Path, jobs: &[(&str, &str)]) -> Pipeline {
    let ledger = ledger::connect(&LedgerConfig::sqlite(
        dir.join("ledger.db").to_str().unwrap(),
    ))
    .await
    .unwrap();

    let definitions = jobs
        .iter()
        .map(|(id, json)| (id.to_string(), JobDefinition::from_json(json).unwrap()));
    let (registry, errors) = JobRegistry::build(definitions, &JobDefaults::default());
    assert!(errors.is_empty(), "{:?}", errors);

    Pipeline::new(
        registry,
        DecoderRegistry::new(),
        PersistenceDispatcher::new(StoreFactory::local(dir.join("data"))),
        ledger,
        UploadStore::new(dir.join("temp")),
    )
}

#[tokio::test]
async fn test_sample_job_persists_valid_workbook() {
    let dir = tempdir().unwrap();
    let pipeline = sample_pipeline(dir.path(), &[("sample", SAMPLE_JOB)]).await;

    let status = pipeline
        .submit("sample", SAMPLE)
        .await
        .unwrap()
        .await
        .unwrap();
    assert_eq!(status, StatusKind::Success);

    let file = dir.path().join("data/sample/sample.parquet");
    let ctx = SessionContext::new();
    let batches = ctx
        .read_parquet(file.to_str().unwrap(), ParquetReadOptions::default())
        .await
        .unwrap()
        .collect()
        .await
        .unwrap();

    let mut small_values = Vec::new();
    for batch in &batches {
        let column = batch
            .column_by_name("small_values")
            .unwrap()
            .as_any()
            .downcast_ref::<Float64Array>()
            .unwrap();
        small_values.extend(column.iter().flatten());
    }
    assert_eq!(small_values, vec![1.5, 50.0, 99.25]);
}

#[tokio::test]
async fn test_sample_job_reports_every_violation() {
    let dir = tempdir().unwrap();
    let pipeline = sample_pipeline(dir.path(), &[("sample", SAMPLE_JOB)]).await;

    let status = pipeline
        .submit("sample", INVALID)
        .await
        .unwrap()
        .await
        .unwrap();
    assert_eq!(status, StatusKind::Failed);

    let latest = pipeline.latest_status("sample").await.unwrap().unwrap();
    let details = latest.detail_messages;
    assert_eq!(details.len(), 3, "{:?}", details);
    assert!(details[0].contains("small_values") && details[0].contains("150"));
    assert!(details[1].contains("one_to_three") && details[1].contains("isin"));
    assert!(details[2].contains("phone_number") && details[2].contains("regex_match"));
    assert!(!dir.path().join("data/sample/sample.parquet").exists());
}

#[tokio::test]
async fn test_multi_sheet_workbook_job() {
    let job = r#"{
        "name": "Workbook",
        "load": {"type": "excel"},
        "sheets": [
            {"sheet": "People", "schema": {"one_to_three": {"type": "int"}}, "save": {"path": "people.parquet"}},
            {"sheet": "Cities", "schema": {"city": {"type": "str"}, "population": {"type": "int"}},
             "save": {"format": "deltalake", "path": "cities"}}
        ]
    }"#;
    let dir = tempdir().unwrap();
    let pipeline = sample_pipeline(dir.path(), &[("workbook", job)]).await;

    let status = pipeline
        .submit("workbook", SAMPLE)
        .await
        .unwrap()
        .await
        .unwrap();
    assert_eq!(status, StatusKind::Success);

    assert!(dir.path().join("data/people.parquet").is_file());
    assert!(dir
        .path()
        .join("data/cities/_delta_log/00000000000000000000.json")
        .is_file());

    let history = pipeline.history("workbook").await.unwrap();
    assert_eq!(history.len(), 4);
}
