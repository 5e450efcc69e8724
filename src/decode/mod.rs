//! Format decoders.
//!
//! A [`Decoder`] turns the raw bytes of an upload into one [`Dataset`], or
//! into a [`DatasetMap`] with one entry per requested sheet. The built-in
//! `excel` and `csv` decoders are always registered; applications add their
//! own under a name and reference that name as the job's load `type`.

mod csv;
mod error;
mod excel;

pub use csv::CsvDecoder;
pub use error::DecodeError;
pub use excel::ExcelDecoder;

use crate::datasets::{Column, Dataset, DatasetMap, SheetKey, Value};
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use std::collections::{HashMap, HashSet};
use std::fmt;
use std::sync::Arc;

/// Open parameter map passed to a decoder, e.g. `{"sheet_name": "Sheet1"}`.
pub type LoadParams = serde_json::Map<String, serde_json::Value>;

/// Load type used when a job does not name one.
pub const DEFAULT_LOAD_TYPE: &str = "excel";

fn default_load_type() -> String {
    DEFAULT_LOAD_TYPE.to_string()
}

/// How a job's uploads are decoded.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct LoadDescriptor {
    /// `excel`, `csv`, or the name of a registered decoder.
    #[serde(rename = "type", default = "default_load_type")]
    pub load_type: String,
    #[serde(default)]
    pub params: LoadParams,
}

impl Default for LoadDescriptor {
    fn default() -> Self {
        Self {
            load_type: default_load_type(),
            params: LoadParams::new(),
        }
    }
}

impl LoadDescriptor {
    pub fn new(load_type: impl Into<String>) -> Self {
        Self {
            load_type: load_type.into(),
            params: LoadParams::new(),
        }
    }

    pub fn with_param(mut self, key: &str, value: impl Into<serde_json::Value>) -> Self {
        self.params.insert(key.to_string(), value.into());
        self
    }
}

/// Turns raw bytes into datasets.
pub trait Decoder: fmt::Debug + Send + Sync {
    /// Name jobs use to select this decoder.
    fn name(&self) -> &str;

    fn decode(&self, bytes: &[u8], params: &LoadParams) -> Result<Dataset, DecodeError>;

    /// Decode several sheets sharing one parameter set, in the given order.
    fn decode_sheets(
        &self,
        bytes: &[u8],
        params: &LoadParams,
        sheets: &[SheetKey],
    ) -> Result<DatasetMap, DecodeError> {
        let _ = (bytes, params, sheets);
        Err(DecodeError::MultiSheetUnsupported(self.name().to_string()))
    }
}

/// Decoders available to jobs, keyed by name.
#[derive(Debug, Clone)]
pub struct DecoderRegistry {
    decoders: HashMap<String, Arc<dyn Decoder>>,
}

impl Default for DecoderRegistry {
    fn default() -> Self {
        Self::new()
    }
}

impl DecoderRegistry {
    /// Registry holding the built-in `excel` and `csv` decoders.
    pub fn new() -> Self {
        Self {
            decoders: HashMap::new(),
        }
        .with_decoder(Arc::new(ExcelDecoder))
        .with_decoder(Arc::new(CsvDecoder))
    }

    /// Register a decoder under its own name, replacing any previous one.
    pub fn with_decoder(mut self, decoder: Arc<dyn Decoder>) -> Self {
        self.decoders.insert(decoder.name().to_string(), decoder);
        self
    }

    pub fn contains(&self, name: &str) -> bool {
        self.decoders.contains_key(name)
    }

    pub fn names(&self) -> Vec<&str> {
        let mut names: Vec<&str> = self.decoders.keys().map(String::as_str).collect();
        names.sort_unstable();
        names
    }

    pub fn resolve(&self, name: &str) -> Result<Arc<dyn Decoder>, DecodeError> {
        self.decoders
            .get(name)
            .cloned()
            .ok_or_else(|| DecodeError::UnknownLoadType(name.to_string()))
    }

    pub fn decode(&self, bytes: &[u8], load: &LoadDescriptor) -> Result<Dataset, DecodeError> {
        self.resolve(&load.load_type)?.decode(bytes, &load.params)
    }

    pub fn decode_sheets(
        &self,
        bytes: &[u8],
        load: &LoadDescriptor,
        sheets: &[SheetKey],
    ) -> Result<DatasetMap, DecodeError> {
        self.resolve(&load.load_type)?
            .decode_sheets(bytes, &load.params, sheets)
    }
}

/// Parse a decoder's options out of the open parameter map.
pub(crate) fn parse_options<T: DeserializeOwned>(
    format: &str,
    params: &LoadParams,
) -> Result<T, DecodeError> {
    serde_json::from_value(serde_json::Value::Object(params.clone()))
        .map_err(|e| DecodeError::invalid_params(format, e))
}

/// Normalize raw header cells: blanks become `Unnamed: {i}` and repeated
/// names get `.1`, `.2`, ... suffixes.
pub(crate) fn header_names(raw: Vec<Option<String>>) -> Vec<String> {
    let mut used = HashSet::with_capacity(raw.len());
    let mut counts: HashMap<String, usize> = HashMap::new();
    let mut names = Vec::with_capacity(raw.len());

    for (index, cell) in raw.into_iter().enumerate() {
        let base = match cell.map(|s| s.trim().to_string()) {
            Some(name) if !name.is_empty() => name,
            _ => format!("Unnamed: {}", index),
        };

        let mut name = base.clone();
        while used.contains(&name) {
            let count = counts.entry(base.clone()).or_insert(0);
            *count += 1;
            name = format!("{}.{}", base, count);
        }
        used.insert(name.clone());
        names.push(name);
    }
    names
}

/// Build a dataset from named columns and row-major cells.
///
/// Short rows are padded with nulls; each column's type is inferred.
pub(crate) fn dataset_from_rows(
    names: Vec<String>,
    rows: Vec<Vec<Value>>,
) -> Result<Dataset, DecodeError> {
    let width = names.len();
    let mut columns: Vec<Vec<Value>> = vec![Vec::with_capacity(rows.len()); width];
    for row in rows {
        let mut cells = row.into_iter();
        for column in columns.iter_mut() {
            column.push(cells.next().unwrap_or(Value::Null));
        }
    }

    let columns = names
        .into_iter()
        .zip(columns)
        .map(|(name, values)| Column::inferred(name, values))
        .collect();
    Ok(Dataset::try_new(columns)?)
}
