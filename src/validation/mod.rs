//! Lazy schema validation.
//!
//! Every declared column is coerced to its declared type and every row is
//! checked against every constraint before a verdict is returned, so a
//! failing upload reports all of its problems at once.

use crate::datasets::{Column, Dataset, Value};
use crate::schema::{ColumnSchema, Schema};
use std::fmt;

/// Kind reported when a declared column is absent from the dataset.
pub const COLUMN_IN_DATAFRAME: &str = "column_in_dataframe";
/// Kind reported for a null in a non-nullable column.
pub const NOT_NULLABLE: &str = "not_nullable";
/// Kind reported when a value cannot be converted to the declared type.
pub const COERCE_DTYPE: &str = "coerce_dtype";

/// One violation found by validation.
#[derive(Debug, Clone, PartialEq)]
pub struct FailureCause {
    pub column: String,
    /// `None` for column-level failures.
    pub row_index: Option<usize>,
    pub constraint_kind: String,
    /// The check with its arguments, e.g. `isin([1, 2, 3])`.
    pub check: String,
    pub offending_value: Value,
}

impl FailureCause {
    fn column_level(column: &str, kind: &str, check: String) -> Self {
        Self {
            column: column.to_string(),
            row_index: None,
            constraint_kind: kind.to_string(),
            check,
            offending_value: Value::Null,
        }
    }

    fn row_level(column: &str, row: usize, kind: &str, check: String, value: &Value) -> Self {
        Self {
            column: column.to_string(),
            row_index: Some(row),
            constraint_kind: kind.to_string(),
            check,
            offending_value: value.clone(),
        }
    }
}

impl fmt::Display for FailureCause {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self.row_index {
            Some(row) => write!(
                f,
                "column '{}', row {}: {} failed for value {}",
                self.column, row, self.check, self.offending_value
            ),
            None => write!(f, "column '{}': {} failed", self.column, self.check),
        }
    }
}

/// Outcome of validating a dataset.
#[derive(Debug, Clone)]
pub enum ValidationResult {
    /// The dataset with declared columns coerced to their declared types.
    Valid(Dataset),
    /// At least one cause, ordered by column, then row, then constraint.
    Invalid(Vec<FailureCause>),
}

impl ValidationResult {
    pub fn is_valid(&self) -> bool {
        matches!(self, ValidationResult::Valid(_))
    }

    pub fn causes(&self) -> &[FailureCause] {
        match self {
            ValidationResult::Valid(_) => &[],
            ValidationResult::Invalid(causes) => causes,
        }
    }
}

/// Validate `dataset` against `schema`.
///
/// Columns not named by the schema are kept as they are.
pub fn validate(dataset: Dataset, schema: &Schema) -> ValidationResult {
    let mut causes = Vec::new();
    let mut coerced: Vec<Option<Column>> = vec![None; dataset.num_columns()];

    for column_schema in schema.columns() {
        let position = dataset
            .columns()
            .iter()
            .position(|c| c.name() == column_schema.name);

        let Some(position) = position else {
            causes.push(FailureCause::column_level(
                &column_schema.name,
                COLUMN_IN_DATAFRAME,
                format!("{}('{}')", COLUMN_IN_DATAFRAME, column_schema.name),
            ));
            continue;
        };

        let column = &dataset.columns()[position];
        coerced[position] = Some(check_column(column, column_schema, &mut causes));
    }

    if !causes.is_empty() {
        return ValidationResult::Invalid(causes);
    }

    let columns: Vec<Column> = dataset
        .into_columns()
        .into_iter()
        .zip(coerced)
        .map(|(original, replacement)| replacement.unwrap_or(original))
        .collect();

    ValidationResult::Valid(Dataset::from_coerced(columns))
}

fn check_column(
    column: &Column,
    schema: &ColumnSchema,
    causes: &mut Vec<FailureCause>,
) -> Column {
    let coerce_check = format!("{}('{}')", COERCE_DTYPE, schema.dtype.name());
    let mut values = Vec::with_capacity(column.len());

    for (row, raw) in column.values().iter().enumerate() {
        if raw.is_null() {
            if !schema.nullable {
                causes.push(FailureCause::row_level(
                    &schema.name,
                    row,
                    NOT_NULLABLE,
                    NOT_NULLABLE.to_string(),
                    raw,
                ));
            }
            values.push(Value::Null);
            continue;
        }

        let Some(value) = schema.dtype.coerce(raw) else {
            causes.push(FailureCause::row_level(
                &schema.name,
                row,
                COERCE_DTYPE,
                coerce_check.clone(),
                raw,
            ));
            values.push(raw.clone());
            continue;
        };

        for constraint in &schema.constraints {
            if !constraint.check(&value) {
                causes.push(FailureCause::row_level(
                    &schema.name,
                    row,
                    constraint.kind(),
                    constraint.describe(),
                    &value,
                ));
            }
        }
        values.push(value);
    }

    Column::new(schema.name.clone(), schema.dtype, values)
}
