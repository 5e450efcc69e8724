//! Declarative dataset schemas.
//!
//! A job definition declares its schema as an ordered JSON object:
//!
//! ```json
//! {
//!   "age": {"type": "int", "constraints": [{"kind": "isin", "args": [1, 2, 3]}]},
//!   "phone": {"type": "string", "nullable": true}
//! }
//! ```
//!
//! [`SchemaSpec`] keeps the declaration order, and [`Schema::from_spec`]
//! compiles it into the form validation runs against.

mod constraint;

pub use constraint::{Constraint, ConstraintSpec, Scalar};

use crate::datasets::Value;
use datafusion::arrow::datatypes::DataType;
use serde::de::{MapAccess, Visitor};
use serde::{Deserialize, Deserializer, Serialize};
use std::collections::HashSet;
use std::fmt;

/// Declared column type.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ColumnType {
    #[serde(alias = "int64", alias = "integer")]
    Int,
    #[serde(alias = "float64", alias = "double")]
    Float,
    #[serde(alias = "str", alias = "text")]
    String,
    #[serde(alias = "boolean")]
    Bool,
    #[serde(alias = "categorical")]
    Category,
}

impl ColumnType {
    /// Name used in coercion failure messages.
    pub fn name(&self) -> &'static str {
        match self {
            ColumnType::Int => "int64",
            ColumnType::Float => "float64",
            ColumnType::String => "str",
            ColumnType::Bool => "bool",
            ColumnType::Category => "category",
        }
    }

    pub fn arrow_type(&self) -> DataType {
        match self {
            ColumnType::Int => DataType::Int64,
            ColumnType::Float => DataType::Float64,
            ColumnType::Bool => DataType::Boolean,
            ColumnType::String | ColumnType::Category => DataType::Utf8,
        }
    }

    /// Narrowest type that holds every non-null value.
    pub fn infer(values: &[Value]) -> Self {
        let mut inferred: Option<ColumnType> = None;
        for value in values {
            let current = match value {
                Value::Null => continue,
                Value::Int(_) => ColumnType::Int,
                Value::Float(_) => ColumnType::Float,
                Value::Bool(_) => ColumnType::Bool,
                Value::Text(_) => return ColumnType::String,
            };
            inferred = Some(match (inferred, current) {
                (None, t) => t,
                (Some(a), b) if a == b => a,
                (Some(ColumnType::Int), ColumnType::Float)
                | (Some(ColumnType::Float), ColumnType::Int) => ColumnType::Float,
                _ => return ColumnType::String,
            });
        }
        inferred.unwrap_or(ColumnType::String)
    }

    /// Convert a value to this type, or `None` when it cannot be represented.
    ///
    /// Nulls are preserved.
    pub fn coerce(&self, value: &Value) -> Option<Value> {
        if value.is_null() {
            return Some(Value::Null);
        }
        match self {
            ColumnType::Int => match value {
                Value::Int(v) => Some(Value::Int(*v)),
                Value::Float(v) => integral(*v),
                Value::Bool(v) => Some(Value::Int(i64::from(*v))),
                Value::Text(s) => {
                    let s = s.trim();
                    match s.parse::<i64>() {
                        Ok(v) => Some(Value::Int(v)),
                        Err(_) => s.parse::<f64>().ok().and_then(integral),
                    }
                }
                Value::Null => Some(Value::Null),
            },
            ColumnType::Float => match value {
                Value::Int(v) => Some(Value::Float(*v as f64)),
                Value::Float(v) => Some(Value::Float(*v)),
                Value::Bool(v) => Some(Value::Float(if *v { 1.0 } else { 0.0 })),
                Value::Text(s) => s.trim().parse::<f64>().ok().map(Value::Float),
                Value::Null => Some(Value::Null),
            },
            ColumnType::Bool => match value {
                Value::Bool(v) => Some(Value::Bool(*v)),
                Value::Int(0) => Some(Value::Bool(false)),
                Value::Int(1) => Some(Value::Bool(true)),
                Value::Float(v) if *v == 0.0 => Some(Value::Bool(false)),
                Value::Float(v) if *v == 1.0 => Some(Value::Bool(true)),
                Value::Text(s) => match s.trim().to_ascii_lowercase().as_str() {
                    "true" | "t" | "yes" | "y" | "1" => Some(Value::Bool(true)),
                    "false" | "f" | "no" | "n" | "0" => Some(Value::Bool(false)),
                    _ => None,
                },
                _ => None,
            },
            ColumnType::String | ColumnType::Category => match value {
                Value::Text(s) => Some(Value::Text(s.clone())),
                other => Some(Value::Text(other.to_string())),
            },
        }
    }
}

fn integral(v: f64) -> Option<Value> {
    match Value::from_f64(v) {
        Value::Int(i) => Some(Value::Int(i)),
        _ => None,
    }
}

impl fmt::Display for ColumnType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.name())
    }
}

/// Errors raised while compiling a schema.
#[derive(Debug, Clone, PartialEq)]
pub enum SchemaError {
    EmptySchema,
    DuplicateColumn(String),
    InvalidConstraint {
        column: String,
        kind: String,
        message: String,
    },
}

impl fmt::Display for SchemaError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::EmptySchema => write!(f, "schema declares no columns"),
            Self::DuplicateColumn(name) => write!(f, "column '{}' is declared twice", name),
            Self::InvalidConstraint {
                column,
                kind,
                message,
            } => write!(
                f,
                "column '{}': invalid {} constraint: {}",
                column, kind, message
            ),
        }
    }
}

impl std::error::Error for SchemaError {}

/// A column as declared in a job definition.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct ColumnSpec {
    #[serde(rename = "type")]
    pub dtype: ColumnType,
    #[serde(default)]
    pub nullable: bool,
    #[serde(default)]
    pub constraints: Vec<ConstraintSpec>,
}

/// Ordered `column name -> column spec` declaration.
#[derive(Debug, Clone, PartialEq, Default)]
pub struct SchemaSpec {
    pub columns: Vec<(String, ColumnSpec)>,
}

impl<'de> Deserialize<'de> for SchemaSpec {
    fn deserialize<D>(deserializer: D) -> Result<Self, D::Error>
    where
        D: Deserializer<'de>,
    {
        struct SchemaSpecVisitor;

        impl<'de> Visitor<'de> for SchemaSpecVisitor {
            type Value = SchemaSpec;

            fn expecting(&self, f: &mut fmt::Formatter) -> fmt::Result {
                f.write_str("a map of column names to column specs")
            }

            fn visit_map<A>(self, mut map: A) -> Result<SchemaSpec, A::Error>
            where
                A: MapAccess<'de>,
            {
                let mut columns = Vec::with_capacity(map.size_hint().unwrap_or(0));
                while let Some((name, spec)) = map.next_entry::<String, ColumnSpec>()? {
                    columns.push((name, spec));
                }
                Ok(SchemaSpec { columns })
            }
        }

        deserializer.deserialize_map(SchemaSpecVisitor)
    }
}

/// A compiled column.
#[derive(Debug, Clone)]
pub struct ColumnSchema {
    pub name: String,
    pub dtype: ColumnType,
    pub nullable: bool,
    pub constraints: Vec<Constraint>,
}

impl ColumnSchema {
    pub fn new(name: impl Into<String>, dtype: ColumnType) -> Self {
        Self {
            name: name.into(),
            dtype,
            nullable: false,
            constraints: Vec::new(),
        }
    }

    pub fn nullable(mut self, nullable: bool) -> Self {
        self.nullable = nullable;
        self
    }

    pub fn with_constraint(mut self, constraint: Constraint) -> Self {
        self.constraints.push(constraint);
        self
    }
}

/// A compiled schema: columns in declaration order.
#[derive(Debug, Clone)]
pub struct Schema {
    columns: Vec<ColumnSchema>,
}

impl Schema {
    pub fn try_new(columns: Vec<ColumnSchema>) -> Result<Self, SchemaError> {
        if columns.is_empty() {
            return Err(SchemaError::EmptySchema);
        }
        let mut seen = HashSet::new();
        for column in &columns {
            if !seen.insert(column.name.as_str()) {
                return Err(SchemaError::DuplicateColumn(column.name.clone()));
            }
        }
        Ok(Self { columns })
    }

    pub fn from_spec(spec: &SchemaSpec) -> Result<Self, SchemaError> {
        let columns = spec
            .columns
            .iter()
            .map(|(name, column)| {
                let constraints = column
                    .constraints
                    .iter()
                    .map(|c| Constraint::compile(name, c))
                    .collect::<Result<Vec<_>, _>>()?;
                Ok(ColumnSchema {
                    name: name.clone(),
                    dtype: column.dtype,
                    nullable: column.nullable,
                    constraints,
                })
            })
            .collect::<Result<Vec<_>, SchemaError>>()?;
        Self::try_new(columns)
    }

    pub fn columns(&self) -> &[ColumnSchema] {
        &self.columns
    }

    pub fn column(&self, name: &str) -> Option<&ColumnSchema> {
        self.columns.iter().find(|c| c.name == name)
    }

    pub fn len(&self) -> usize {
        self.columns.len()
    }

    pub fn is_empty(&self) -> bool {
        self.columns.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_schema_spec_keeps_declaration_order() {
        let spec: SchemaSpec = serde_json::from_str(
            r#"{
                "small_values": {"type": "float", "constraints": [{"kind": "less_than", "args": 100}]},
                "one_to_three": {"type": "int", "constraints": [{"kind": "isin", "args": [1, 2, 3]}]},
                "phone_number": {"type": "str", "nullable": true}
            }"#,
        )
        .unwrap();

        let schema = Schema::from_spec(&spec).unwrap();
        let names: Vec<&str> = schema.columns().iter().map(|c| c.name.as_str()).collect();
        assert_eq!(names, vec!["small_values", "one_to_three", "phone_number"]);
        assert_eq!(schema.columns()[2].dtype, ColumnType::String);
        assert!(schema.columns()[2].nullable);
        assert!(!schema.columns()[0].nullable);
        assert_eq!(schema.columns()[1].constraints[0].kind(), "isin");
    }

    #[test]
    fn test_column_spec_rejects_unknown_fields() {
        let result: Result<SchemaSpec, _> =
            serde_json::from_str(r#"{"age": {"type": "int", "unique": true}}"#);
        assert!(result.is_err());
    }

    #[test]
    fn test_duplicate_and_empty_schemas_rejected() {
        let spec: SchemaSpec =
            serde_json::from_str(r#"{"a": {"type": "int"}, "a": {"type": "float"}}"#).unwrap();
        assert_eq!(
            Schema::from_spec(&spec).unwrap_err(),
            SchemaError::DuplicateColumn("a".into())
        );
        assert_eq!(
            Schema::from_spec(&SchemaSpec::default()).unwrap_err(),
            SchemaError::EmptySchema
        );
    }

    #[test]
    fn test_infer() {
        assert_eq!(
            ColumnType::infer(&[Value::Int(1), Value::Null]),
            ColumnType::Int
        );
        assert_eq!(
            ColumnType::infer(&[Value::Int(1), Value::Float(1.5)]),
            ColumnType::Float
        );
        assert_eq!(
            ColumnType::infer(&[Value::Bool(true), Value::Int(1)]),
            ColumnType::String
        );
        assert_eq!(ColumnType::infer(&[]), ColumnType::String);
    }

    #[test]
    fn test_coerce_int() {
        let t = ColumnType::Int;
        assert_eq!(t.coerce(&Value::Float(3.0)), Some(Value::Int(3)));
        assert_eq!(t.coerce(&Value::from(" 12 ")), Some(Value::Int(12)));
        assert_eq!(t.coerce(&Value::Float(3.5)), None);
        assert_eq!(t.coerce(&Value::from("abc")), None);
        assert_eq!(t.coerce(&Value::Null), Some(Value::Null));
    }

    #[test]
    fn test_coerce_float_bool_string() {
        assert_eq!(
            ColumnType::Float.coerce(&Value::Int(2)),
            Some(Value::Float(2.0))
        );
        assert_eq!(ColumnType::Float.coerce(&Value::from("x")), None);
        assert_eq!(
            ColumnType::Bool.coerce(&Value::from("Yes")),
            Some(Value::Bool(true))
        );
        assert_eq!(ColumnType::Bool.coerce(&Value::Int(2)), None);
        assert_eq!(
            ColumnType::String.coerce(&Value::Int(555)),
            Some(Value::from("555"))
        );
    }

    #[test]
    fn test_type_aliases() {
        let t: ColumnType = serde_json::from_str(r#""int64""#).unwrap();
        assert_eq!(t, ColumnType::Int);
        let t: ColumnType = serde_json::from_str(r#""boolean""#).unwrap();
        assert_eq!(t, ColumnType::Bool);
        assert_eq!(ColumnType::Float.to_string(), "float64");
    }
}
