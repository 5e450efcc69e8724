use super::{dataset_from_rows, header_names, parse_options, DecodeError, Decoder, LoadParams};
use crate::datasets::{Dataset, DatasetMap, SheetKey, Value};
use calamine::{open_workbook_auto_from_rs, Data, DataType, Range, Reader, Sheets};
use serde::Deserialize;
use std::io::Cursor;

const FORMAT: &str = "excel";

fn first_row() -> Option<usize> {
    Some(0)
}

#[derive(Debug, Deserialize)]
#[serde(deny_unknown_fields)]
struct ExcelOptions {
    #[serde(default)]
    sheet_name: Option<SheetKey>,
    /// Header row, 0-based; `null` means the sheet has no header row.
    #[serde(default = "first_row")]
    header: Option<usize>,
    #[serde(default)]
    nrows: Option<usize>,
}

/// Workbook decoder for xlsx, xlsm, xlsb, xls and ods files.
#[derive(Debug, Default, Clone, Copy)]
pub struct ExcelDecoder;

type Workbook = Sheets<Cursor<Vec<u8>>>;

impl ExcelDecoder {
    fn open(bytes: &[u8]) -> Result<Workbook, DecodeError> {
        open_workbook_auto_from_rs(Cursor::new(bytes.to_vec()))
            .map_err(|e| DecodeError::malformed(FORMAT, e))
    }

    fn read_sheet(workbook: &mut Workbook, key: &SheetKey) -> Result<Range<Data>, DecodeError> {
        match key {
            SheetKey::Name(name) => {
                if !workbook.sheet_names().iter().any(|s| s == name) {
                    return Err(DecodeError::SheetNotFound(key.clone()));
                }
                workbook
                    .worksheet_range(name)
                    .map_err(|e| DecodeError::malformed(FORMAT, e))
            }
            SheetKey::Index(index) => workbook
                .worksheet_range_at(*index)
                .ok_or_else(|| DecodeError::SheetNotFound(key.clone()))?
                .map_err(|e| DecodeError::malformed(FORMAT, e)),
        }
    }

    fn to_dataset(range: &Range<Data>, options: &ExcelOptions) -> Result<Dataset, DecodeError> {
        // Ranges start at the first used cell; pad back to sheet coordinates
        // so header and column positions match what the user sees.
        let (start_row, start_col) = range
            .start()
            .map(|(r, c)| (r as usize, c as usize))
            .unwrap_or((0, 0));

        let mut grid: Vec<Vec<Value>> = vec![Vec::new(); start_row];
        grid.extend(range.rows().map(|row| {
            let mut cells = vec![Value::Null; start_col];
            cells.extend(row.iter().map(cell_value));
            cells
        }));

        let width = grid.iter().map(Vec::len).max().unwrap_or(0);

        let (names, data_start) = match options.header {
            Some(header) => {
                let header_row = grid.get(header).cloned().unwrap_or_default();
                let raw = (0..width)
                    .map(|i| match header_row.get(i) {
                        Some(Value::Null) | None => None,
                        Some(value) => Some(value.to_string()),
                    })
                    .collect();
                (header_names(raw), header + 1)
            }
            None => ((0..width).map(|i| i.to_string()).collect(), 0),
        };

        let limit = options.nrows.unwrap_or(usize::MAX);
        let rows: Vec<Vec<Value>> = grid.into_iter().skip(data_start).take(limit).collect();

        dataset_from_rows(names, rows)
    }
}

fn cell_value(cell: &Data) -> Value {
    match cell {
        Data::Empty | Data::Error(_) => Value::Null,
        Data::Int(v) => Value::Int(*v),
        Data::Float(v) => Value::from_f64(*v),
        Data::Bool(v) => Value::Bool(*v),
        Data::String(s) if s.trim().is_empty() => Value::Null,
        Data::String(s) => Value::Text(s.clone()),
        Data::DateTime(_) => cell
            .as_datetime()
            .map(|dt| Value::Text(dt.to_string()))
            .unwrap_or(Value::Null),
        Data::DateTimeIso(s) | Data::DurationIso(s) => Value::Text(s.clone()),
    }
}

impl Decoder for ExcelDecoder {
    fn name(&self) -> &str {
        FORMAT
    }

    fn decode(&self, bytes: &[u8], params: &LoadParams) -> Result<Dataset, DecodeError> {
        let options: ExcelOptions = parse_options(FORMAT, params)?;
        let key = options.sheet_name.clone().unwrap_or(SheetKey::Index(0));

        let mut workbook = Self::open(bytes)?;
        let range = Self::read_sheet(&mut workbook, &key)?;
        Self::to_dataset(&range, &options)
    }

    fn decode_sheets(
        &self,
        bytes: &[u8],
        params: &LoadParams,
        sheets: &[SheetKey],
    ) -> Result<DatasetMap, DecodeError> {
        let options: ExcelOptions = parse_options(FORMAT, params)?;
        if options.sheet_name.is_some() {
            return Err(DecodeError::invalid_params(
                FORMAT,
                "sheet_name is set per sheet for multi-sheet jobs",
            ));
        }

        let mut workbook = Self::open(bytes)?;
        let mut datasets = DatasetMap::new();
        for key in sheets {
            let range = Self::read_sheet(&mut workbook, key)?;
            datasets.insert(key.clone(), Self::to_dataset(&range, &options)?);
        }
        Ok(datasets)
    }
}
