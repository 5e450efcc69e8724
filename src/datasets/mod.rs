//! In-memory tabular datasets.
//!
//! A [`Dataset`] lives for one decode/validate/persist attempt: decoders build
//! it, validation coerces it to the declared schema, and persistence converts
//! it into an Arrow [`RecordBatch`] right before writing.

pub mod error;
mod value;

pub use error::DatasetError;
pub use value::Value;

use crate::schema::ColumnType;
use datafusion::arrow::array::{ArrayRef, BooleanArray, Float64Array, Int64Array, StringArray};
use datafusion::arrow::datatypes::{Field, Schema};
use datafusion::arrow::error::ArrowError;
use datafusion::arrow::record_batch::{RecordBatch, RecordBatchOptions};
use serde::{Deserialize, Serialize};
use std::collections::HashSet;
use std::fmt;
use std::sync::Arc;

/// A named column with a declared type and its cells.
#[derive(Debug, Clone, PartialEq)]
pub struct Column {
    name: String,
    dtype: ColumnType,
    values: Vec<Value>,
}

impl Column {
    pub fn new(name: impl Into<String>, dtype: ColumnType, values: Vec<Value>) -> Self {
        Self {
            name: name.into(),
            dtype,
            values,
        }
    }

    /// Build a column whose type is inferred from its cells.
    pub fn inferred(name: impl Into<String>, values: Vec<Value>) -> Self {
        let dtype = ColumnType::infer(&values);
        Self::new(name, dtype, values)
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn dtype(&self) -> ColumnType {
        self.dtype
    }

    pub fn values(&self) -> &[Value] {
        &self.values
    }

    pub fn len(&self) -> usize {
        self.values.len()
    }

    pub fn is_empty(&self) -> bool {
        self.values.is_empty()
    }

    fn to_array(&self) -> Result<ArrayRef, ArrowError> {
        let mismatch = |v: &Value| {
            ArrowError::CastError(format!(
                "column '{}': cannot store {} as {}",
                self.name, v, self.dtype
            ))
        };

        let array: ArrayRef = match self.dtype {
            ColumnType::Int => {
                let values = self
                    .values
                    .iter()
                    .map(|v| match v {
                        Value::Null => Ok(None),
                        Value::Int(i) => Ok(Some(*i)),
                        other => Err(mismatch(other)),
                    })
                    .collect::<Result<Vec<_>, _>>()?;
                Arc::new(Int64Array::from(values))
            }
            ColumnType::Float => {
                let values = self
                    .values
                    .iter()
                    .map(|v| match v {
                        Value::Null => Ok(None),
                        other => other.as_f64().map(Some).ok_or_else(|| mismatch(other)),
                    })
                    .collect::<Result<Vec<_>, _>>()?;
                Arc::new(Float64Array::from(values))
            }
            ColumnType::Bool => {
                let values = self
                    .values
                    .iter()
                    .map(|v| match v {
                        Value::Null => Ok(None),
                        Value::Bool(b) => Ok(Some(*b)),
                        other => Err(mismatch(other)),
                    })
                    .collect::<Result<Vec<_>, _>>()?;
                Arc::new(BooleanArray::from(values))
            }
            ColumnType::String | ColumnType::Category => {
                let values: Vec<Option<String>> = self
                    .values
                    .iter()
                    .map(|v| match v {
                        Value::Null => None,
                        other => Some(other.to_string()),
                    })
                    .collect();
                Arc::new(StringArray::from(values))
            }
        };
        Ok(array)
    }
}

/// Ordered, uniquely named columns of equal length.
#[derive(Debug, Clone, PartialEq, Default)]
pub struct Dataset {
    columns: Vec<Column>,
}

impl Dataset {
    /// Assemble a dataset, enforcing unique names and equal row counts.
    pub fn try_new(columns: Vec<Column>) -> Result<Self, DatasetError> {
        let mut seen = HashSet::with_capacity(columns.len());
        for column in &columns {
            if !seen.insert(column.name.as_str()) {
                return Err(DatasetError::DuplicateColumn(column.name.clone()));
            }
        }

        if let Some(first) = columns.first() {
            let expected = first.len();
            if let Some(bad) = columns.iter().find(|c| c.len() != expected) {
                return Err(DatasetError::RowCountMismatch {
                    column: bad.name.clone(),
                    expected,
                    actual: bad.len(),
                });
            }
        }

        Ok(Self { columns })
    }

    pub fn columns(&self) -> &[Column] {
        &self.columns
    }

    pub fn column(&self, name: &str) -> Option<&Column> {
        self.columns.iter().find(|c| c.name == name)
    }

    pub fn column_names(&self) -> Vec<&str> {
        self.columns.iter().map(|c| c.name.as_str()).collect()
    }

    pub fn num_columns(&self) -> usize {
        self.columns.len()
    }

    pub fn num_rows(&self) -> usize {
        self.columns.first().map(Column::len).unwrap_or(0)
    }

    pub(crate) fn into_columns(self) -> Vec<Column> {
        self.columns
    }

    /// Rebuild from columns taken out of a dataset whose names and row
    /// counts were preserved.
    pub(crate) fn from_coerced(columns: Vec<Column>) -> Self {
        Self { columns }
    }

    /// Convert to a single Arrow batch using each column's declared type.
    ///
    /// Every field is nullable; nullability is enforced by validation, not by
    /// the storage schema.
    pub fn to_record_batch(&self) -> Result<RecordBatch, ArrowError> {
        let fields: Vec<Field> = self
            .columns
            .iter()
            .map(|c| Field::new(c.name.as_str(), c.dtype.arrow_type(), true))
            .collect();
        let arrays = self
            .columns
            .iter()
            .map(Column::to_array)
            .collect::<Result<Vec<_>, _>>()?;

        RecordBatch::try_new_with_options(
            Arc::new(Schema::new(fields)),
            arrays,
            &RecordBatchOptions::new().with_row_count(Some(self.num_rows())),
        )
    }
}

/// Identifies one sheet of a workbook, by name or by 0-based position.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(untagged)]
pub enum SheetKey {
    Index(usize),
    Name(String),
}

impl fmt::Display for SheetKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            SheetKey::Index(i) => write!(f, "{}", i),
            SheetKey::Name(name) => write!(f, "{}", name),
        }
    }
}

impl From<&str> for SheetKey {
    fn from(name: &str) -> Self {
        SheetKey::Name(name.to_string())
    }
}

impl From<usize> for SheetKey {
    fn from(index: usize) -> Self {
        SheetKey::Index(index)
    }
}

/// Datasets keyed by sheet, in the order the sheets were requested.
#[derive(Debug, Clone, Default)]
pub struct DatasetMap {
    entries: Vec<(SheetKey, Dataset)>,
}

impl DatasetMap {
    pub fn new() -> Self {
        Self::default()
    }

    /// Insert a dataset, replacing an existing entry for the same sheet in place.
    pub fn insert(&mut self, key: SheetKey, dataset: Dataset) {
        match self.entries.iter_mut().find(|(k, _)| *k == key) {
            Some(entry) => entry.1 = dataset,
            None => self.entries.push((key, dataset)),
        }
    }

    pub fn get(&self, key: &SheetKey) -> Option<&Dataset> {
        self.entries
            .iter()
            .find(|(k, _)| k == key)
            .map(|(_, dataset)| dataset)
    }

    pub fn remove(&mut self, key: &SheetKey) -> Option<Dataset> {
        let index = self.entries.iter().position(|(k, _)| k == key)?;
        Some(self.entries.remove(index).1)
    }

    pub fn keys(&self) -> impl Iterator<Item = &SheetKey> {
        self.entries.iter().map(|(k, _)| k)
    }

    pub fn iter(&self) -> impl Iterator<Item = (&SheetKey, &Dataset)> {
        self.entries.iter().map(|(k, d)| (k, d))
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}

impl IntoIterator for DatasetMap {
    type Item = (SheetKey, Dataset);
    type IntoIter = std::vec::IntoIter<(SheetKey, Dataset)>;

    fn into_iter(self) -> Self::IntoIter {
        self.entries.into_iter()
    }
}
