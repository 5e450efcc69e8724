use super::{dataset_from_rows, header_names, parse_options, DecodeError, Decoder, LoadParams};
use crate::datasets::{Dataset, Value};
use datafusion::arrow::array::{Array, StringArray};
use datafusion::arrow::csv::{reader::Format, ReaderBuilder};
use datafusion::arrow::datatypes::{DataType, Field, Schema};
use serde::Deserialize;
use std::io::Cursor;
use std::sync::Arc;

const FORMAT: &str = "csv";
const BATCH_SIZE: usize = 8192;

fn default_sep() -> String {
    ",".to_string()
}

fn default_header() -> bool {
    true
}

#[derive(Debug, Deserialize)]
#[serde(deny_unknown_fields)]
struct CsvOptions {
    #[serde(default = "default_sep")]
    sep: String,
    #[serde(default = "default_header")]
    header: bool,
    #[serde(default)]
    nrows: Option<usize>,
}

impl CsvOptions {
    fn delimiter(&self) -> Result<u8, DecodeError> {
        match self.sep.as_bytes() {
            [b] => Ok(*b),
            _ => Err(DecodeError::invalid_params(
                FORMAT,
                format!("sep must be a single ASCII character, got '{}'", self.sep),
            )),
        }
    }
}

/// Delimited text decoder built on arrow's csv reader.
///
/// Every field is read as text and then inferred cell by cell, so a column
/// mixing numbers and words keeps both for validation to judge.
#[derive(Debug, Default, Clone, Copy)]
pub struct CsvDecoder;

impl Decoder for CsvDecoder {
    fn name(&self) -> &str {
        FORMAT
    }

    fn decode(&self, bytes: &[u8], params: &LoadParams) -> Result<Dataset, DecodeError> {
        let options: CsvOptions = parse_options(FORMAT, params)?;
        let delimiter = options.delimiter()?;

        let (inferred, _) = Format::default()
            .with_header(options.header)
            .with_delimiter(delimiter)
            .infer_schema(Cursor::new(bytes), Some(1))
            .map_err(|e| DecodeError::malformed(FORMAT, e))?;

        if inferred.fields().is_empty() {
            return Err(DecodeError::malformed(FORMAT, "no columns found"));
        }

        let names = if options.header {
            header_names(
                inferred
                    .fields()
                    .iter()
                    .map(|f| Some(f.name().clone()))
                    .collect(),
            )
        } else {
            (0..inferred.fields().len()).map(|i| i.to_string()).collect()
        };

        // Read everything as text; cell inference happens below.
        let text_schema = Arc::new(Schema::new(
            (0..names.len())
                .map(|i| Field::new(format!("c{}", i), DataType::Utf8, true))
                .collect::<Vec<_>>(),
        ));

        let reader = ReaderBuilder::new(text_schema)
            .with_header(options.header)
            .with_delimiter(delimiter)
            .with_truncated_rows(true)
            .with_batch_size(BATCH_SIZE)
            .build(Cursor::new(bytes))
            .map_err(|e| DecodeError::malformed(FORMAT, e))?;

        let limit = options.nrows.unwrap_or(usize::MAX);
        let mut rows: Vec<Vec<Value>> = Vec::new();

        for batch in reader {
            let batch = batch.map_err(|e| DecodeError::malformed(FORMAT, e))?;
            let columns = batch
                .columns()
                .iter()
                .map(|c| {
                    c.as_any()
                        .downcast_ref::<StringArray>()
                        .ok_or_else(|| DecodeError::malformed(FORMAT, "expected text column"))
                })
                .collect::<Result<Vec<_>, _>>()?;

            for row in 0..batch.num_rows() {
                if rows.len() >= limit {
                    break;
                }
                rows.push(
                    columns
                        .iter()
                        .map(|array| {
                            if array.is_null(row) {
                                Value::Null
                            } else {
                                Value::from_text(array.value(row))
                            }
                        })
                        .collect(),
                );
            }
            if rows.len() >= limit {
                break;
            }
        }

        dataset_from_rows(names, rows)
    }
}
