//! Column constraints.
//!
//! [`ConstraintSpec`] is the declarative form found in job definitions
//! (`{"kind": "isin", "args": [1, 2, 3]}`); [`Constraint`] is the compiled
//! form used by validation, with regular expressions built once up front.

use super::SchemaError;
use crate::datasets::Value;
use regex::Regex;
use serde::{Deserialize, Serialize};
use std::cmp::Ordering;

/// A literal constraint argument.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum Scalar {
    Bool(bool),
    Int(i64),
    Float(f64),
    Text(String),
}

impl From<Scalar> for Value {
    fn from(scalar: Scalar) -> Self {
        match scalar {
            Scalar::Bool(v) => Value::Bool(v),
            Scalar::Int(v) => Value::Int(v),
            Scalar::Float(v) => Value::Float(v),
            Scalar::Text(v) => Value::Text(v),
        }
    }
}

fn default_inclusive() -> bool {
    true
}

/// Constraint as declared in a job definition.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "kind", content = "args", rename_all = "snake_case")]
pub enum ConstraintSpec {
    LessThan(Scalar),
    LessThanOrEqualTo(Scalar),
    GreaterThan(Scalar),
    GreaterThanOrEqualTo(Scalar),
    InRange {
        min: Scalar,
        max: Scalar,
        #[serde(default = "default_inclusive")]
        include_min: bool,
        #[serde(default = "default_inclusive")]
        include_max: bool,
    },
    Isin(Vec<Scalar>),
    Notin(Vec<Scalar>),
    RegexMatch(String),
    StrContains(String),
    StrLength {
        #[serde(default)]
        min: Option<usize>,
        #[serde(default)]
        max: Option<usize>,
    },
}

/// A compiled, checkable constraint.
#[derive(Debug, Clone)]
pub enum Constraint {
    LessThan(Value),
    LessThanOrEqualTo(Value),
    GreaterThan(Value),
    GreaterThanOrEqualTo(Value),
    InRange {
        min: Value,
        max: Value,
        include_min: bool,
        include_max: bool,
    },
    Isin(Vec<Value>),
    Notin(Vec<Value>),
    /// Matches the whole value.
    RegexMatch { pattern: String, regex: Regex },
    /// Matches anywhere in the value.
    StrContains { pattern: String, regex: Regex },
    StrLength {
        min: Option<usize>,
        max: Option<usize>,
    },
}

impl Constraint {
    pub fn less_than(bound: impl Into<Value>) -> Self {
        Constraint::LessThan(bound.into())
    }

    pub fn less_than_or_equal_to(bound: impl Into<Value>) -> Self {
        Constraint::LessThanOrEqualTo(bound.into())
    }

    pub fn greater_than(bound: impl Into<Value>) -> Self {
        Constraint::GreaterThan(bound.into())
    }

    pub fn greater_than_or_equal_to(bound: impl Into<Value>) -> Self {
        Constraint::GreaterThanOrEqualTo(bound.into())
    }

    pub fn in_range(min: impl Into<Value>, max: impl Into<Value>) -> Self {
        Constraint::InRange {
            min: min.into(),
            max: max.into(),
            include_min: true,
            include_max: true,
        }
    }

    pub fn isin<V: Into<Value>>(allowed: impl IntoIterator<Item = V>) -> Self {
        Constraint::Isin(allowed.into_iter().map(Into::into).collect())
    }

    pub fn notin<V: Into<Value>>(forbidden: impl IntoIterator<Item = V>) -> Self {
        Constraint::Notin(forbidden.into_iter().map(Into::into).collect())
    }

    pub fn regex_match(pattern: &str) -> Result<Self, regex::Error> {
        Ok(Constraint::RegexMatch {
            pattern: pattern.to_string(),
            regex: Regex::new(&format!("^(?:{})$", pattern))?,
        })
    }

    pub fn str_contains(pattern: &str) -> Result<Self, regex::Error> {
        Ok(Constraint::StrContains {
            pattern: pattern.to_string(),
            regex: Regex::new(pattern)?,
        })
    }

    pub fn str_length(min: Option<usize>, max: Option<usize>) -> Self {
        Constraint::StrLength { min, max }
    }

    /// Compile a declared constraint.
    pub fn compile(column: &str, spec: &ConstraintSpec) -> Result<Self, SchemaError> {
        let invalid = |kind: &str, message: String| SchemaError::InvalidConstraint {
            column: column.to_string(),
            kind: kind.to_string(),
            message,
        };

        let constraint = match spec.clone() {
            ConstraintSpec::LessThan(v) => Constraint::LessThan(v.into()),
            ConstraintSpec::LessThanOrEqualTo(v) => Constraint::LessThanOrEqualTo(v.into()),
            ConstraintSpec::GreaterThan(v) => Constraint::GreaterThan(v.into()),
            ConstraintSpec::GreaterThanOrEqualTo(v) => Constraint::GreaterThanOrEqualTo(v.into()),
            ConstraintSpec::InRange {
                min,
                max,
                include_min,
                include_max,
            } => {
                let (min, max): (Value, Value) = (min.into(), max.into());
                if compare(&min, &max) == Some(Ordering::Greater) {
                    return Err(invalid(
                        "in_range",
                        format!("min {} is greater than max {}", min, max),
                    ));
                }
                Constraint::InRange {
                    min,
                    max,
                    include_min,
                    include_max,
                }
            }
            ConstraintSpec::Isin(values) => {
                Constraint::Isin(values.into_iter().map(Into::into).collect())
            }
            ConstraintSpec::Notin(values) => {
                Constraint::Notin(values.into_iter().map(Into::into).collect())
            }
            ConstraintSpec::RegexMatch(pattern) => Constraint::regex_match(&pattern)
                .map_err(|e| invalid("regex_match", e.to_string()))?,
            ConstraintSpec::StrContains(pattern) => Constraint::str_contains(&pattern)
                .map_err(|e| invalid("str_contains", e.to_string()))?,
            ConstraintSpec::StrLength { min, max } => {
                match (min, max) {
                    (None, None) => {
                        return Err(invalid(
                            "str_length",
                            "at least one of min or max is required".to_string(),
                        ))
                    }
                    (Some(lo), Some(hi)) if lo > hi => {
                        return Err(invalid(
                            "str_length",
                            format!("min {} is greater than max {}", lo, hi),
                        ))
                    }
                    _ => {}
                }
                Constraint::StrLength { min, max }
            }
        };
        Ok(constraint)
    }

    /// Snake-case kind name, as used in job definitions.
    pub fn kind(&self) -> &'static str {
        match self {
            Constraint::LessThan(_) => "less_than",
            Constraint::LessThanOrEqualTo(_) => "less_than_or_equal_to",
            Constraint::GreaterThan(_) => "greater_than",
            Constraint::GreaterThanOrEqualTo(_) => "greater_than_or_equal_to",
            Constraint::InRange { .. } => "in_range",
            Constraint::Isin(_) => "isin",
            Constraint::Notin(_) => "notin",
            Constraint::RegexMatch { .. } => "regex_match",
            Constraint::StrContains { .. } => "str_contains",
            Constraint::StrLength { .. } => "str_length",
        }
    }

    /// Human-readable form including arguments, e.g. `isin([1, 2, 3])`.
    pub fn describe(&self) -> String {
        match self {
            Constraint::LessThan(v)
            | Constraint::LessThanOrEqualTo(v)
            | Constraint::GreaterThan(v)
            | Constraint::GreaterThanOrEqualTo(v) => format!("{}({})", self.kind(), literal(v)),
            Constraint::InRange { min, max, .. } => {
                format!("in_range({}, {})", literal(min), literal(max))
            }
            Constraint::Isin(values) | Constraint::Notin(values) => {
                let items: Vec<String> = values.iter().map(literal).collect();
                format!("{}([{}])", self.kind(), items.join(", "))
            }
            Constraint::RegexMatch { pattern, .. } | Constraint::StrContains { pattern, .. } => {
                format!("{}('{}')", self.kind(), pattern)
            }
            Constraint::StrLength { min, max } => {
                let bound = |b: &Option<usize>| b.map_or("None".to_string(), |v| v.to_string());
                format!("str_length({}, {})", bound(min), bound(max))
            }
        }
    }

    /// Whether a non-null value satisfies the constraint.
    ///
    /// Values that cannot be compared with the constraint's arguments fail.
    pub fn check(&self, value: &Value) -> bool {
        match self {
            Constraint::LessThan(bound) => compare(value, bound) == Some(Ordering::Less),
            Constraint::LessThanOrEqualTo(bound) => matches!(
                compare(value, bound),
                Some(Ordering::Less | Ordering::Equal)
            ),
            Constraint::GreaterThan(bound) => compare(value, bound) == Some(Ordering::Greater),
            Constraint::GreaterThanOrEqualTo(bound) => matches!(
                compare(value, bound),
                Some(Ordering::Greater | Ordering::Equal)
            ),
            Constraint::InRange {
                min,
                max,
                include_min,
                include_max,
            } => {
                let above = match compare(value, min) {
                    Some(Ordering::Greater) => true,
                    Some(Ordering::Equal) => *include_min,
                    _ => false,
                };
                let below = match compare(value, max) {
                    Some(Ordering::Less) => true,
                    Some(Ordering::Equal) => *include_max,
                    _ => false,
                };
                above && below
            }
            Constraint::Isin(allowed) => allowed.iter().any(|v| equals(value, v)),
            Constraint::Notin(forbidden) => !forbidden.iter().any(|v| equals(value, v)),
            Constraint::RegexMatch { regex, .. } | Constraint::StrContains { regex, .. } => {
                value.as_str().is_some_and(|s| regex.is_match(s))
            }
            Constraint::StrLength { min, max } => match value.as_str() {
                Some(s) => {
                    let len = s.chars().count();
                    min.is_none_or(|lo| len >= lo) && max.is_none_or(|hi| len <= hi)
                }
                None => false,
            },
        }
    }
}

fn compare(a: &Value, b: &Value) -> Option<Ordering> {
    match (a, b) {
        (Value::Text(x), Value::Text(y)) => Some(x.cmp(y)),
        (Value::Bool(x), Value::Bool(y)) => Some(x.cmp(y)),
        _ => a.as_f64()?.partial_cmp(&b.as_f64()?),
    }
}

/// Membership equality. Text is matched against the string form of a
/// non-text literal, so `isin([1, 2])` holds for category values.
fn equals(value: &Value, literal: &Value) -> bool {
    match (value, literal) {
        (Value::Text(s), Value::Int(_) | Value::Float(_) | Value::Bool(_)) => {
            *s == literal.to_string()
        }
        _ => compare(value, literal) == Some(Ordering::Equal),
    }
}

fn literal(value: &Value) -> String {
    match value {
        Value::Text(s) => format!("'{}'", s),
        other => other.to_string(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_spec_deserializes_kind_and_args() {
        let spec: ConstraintSpec =
            serde_json::from_str(r#"{"kind": "isin", "args": [1, 2, 3]}"#).unwrap();
        assert_eq!(
            spec,
            ConstraintSpec::Isin(vec![Scalar::Int(1), Scalar::Int(2), Scalar::Int(3)])
        );

        let spec: ConstraintSpec =
            serde_json::from_str(r#"{"kind": "in_range", "args": {"min": 0, "max": 1.5}}"#)
                .unwrap();
        assert_eq!(
            spec,
            ConstraintSpec::InRange {
                min: Scalar::Int(0),
                max: Scalar::Float(1.5),
                include_min: true,
                include_max: true,
            }
        );
    }

    #[test]
    fn test_unknown_kind_rejected() {
        let result: Result<ConstraintSpec, _> =
            serde_json::from_str(r#"{"kind": "is_prime", "args": []}"#);
        assert!(result.is_err());
    }

    #[test]
    fn test_comparisons_mix_int_and_float() {
        let lt = Constraint::less_than(100i64);
        assert!(lt.check(&Value::Float(99.5)));
        assert!(!lt.check(&Value::Int(100)));
        assert!(Constraint::less_than_or_equal_to(100i64).check(&Value::Float(100.0)));
        assert!(!lt.check(&Value::from("50")));
    }

    #[test]
    fn test_in_range_bounds() {
        let inclusive = Constraint::in_range(1i64, 3i64);
        assert!(inclusive.check(&Value::Int(1)));
        assert!(inclusive.check(&Value::Int(3)));
        assert!(!inclusive.check(&Value::Int(4)));

        let exclusive = Constraint::InRange {
            min: Value::Int(1),
            max: Value::Int(3),
            include_min: false,
            include_max: false,
        };
        assert!(!exclusive.check(&Value::Int(1)));
        assert!(exclusive.check(&Value::Float(2.0)));
    }

    #[test]
    fn test_isin_and_notin() {
        let isin = Constraint::isin([1i64, 2, 3]);
        assert!(isin.check(&Value::Int(2)));
        assert!(!isin.check(&Value::Int(5)));
        assert_eq!(isin.describe(), "isin([1, 2, 3])");

        let notin = Constraint::notin(["x", "y"]);
        assert!(notin.check(&Value::from("z")));
        assert!(!notin.check(&Value::from("x")));
    }

    #[test]
    fn test_isin_matches_text_against_numeric_literals() {
        let isin = Constraint::isin([1i64, 2]);
        assert!(isin.check(&Value::from("1")));
        assert!(!isin.check(&Value::from("3")));

        let notin = Constraint::notin([1i64, 2]);
        assert!(!notin.check(&Value::from("2")));
        assert!(notin.check(&Value::from("x")));

        assert!(Constraint::isin([true]).check(&Value::from("true")));
    }

    #[test]
    fn test_regex_match_is_full_match() {
        let c = Constraint::regex_match("[a-z0-9-]+").unwrap();
        assert!(c.check(&Value::from("555-abc")));
        assert!(!c.check(&Value::from("555 abc")));
        assert!(!c.check(&Value::Int(5)));

        let contains = Constraint::str_contains("[0-9]").unwrap();
        assert!(contains.check(&Value::from("abc1")));
        assert!(!contains.check(&Value::from("abc")));
    }

    #[test]
    fn test_str_length() {
        let c = Constraint::str_length(Some(2), Some(4));
        assert!(c.check(&Value::from("abc")));
        assert!(!c.check(&Value::from("a")));
        assert!(!c.check(&Value::from("abcde")));
        assert_eq!(c.describe(), "str_length(2, 4)");
    }

    #[test]
    fn test_compile_rejects_bad_arguments() {
        let bad_regex = ConstraintSpec::RegexMatch("(".to_string());
        assert!(matches!(
            Constraint::compile("phone", &bad_regex),
            Err(SchemaError::InvalidConstraint { kind, .. }) if kind == "regex_match"
        ));

        let empty_length = ConstraintSpec::StrLength {
            min: None,
            max: None,
        };
        assert!(Constraint::compile("name", &empty_length).is_err());

        let inverted = ConstraintSpec::InRange {
            min: Scalar::Int(5),
            max: Scalar::Int(1),
            include_min: true,
            include_max: true,
        };
        assert!(Constraint::compile("age", &inverted).is_err());
    }
}
