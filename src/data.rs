use std::fmt;

use anyhow::{Context, Result, anyhow};
use chrono::NaiveDate;
use serde::{Deserialize, Serialize};

use crate::fields::ColumnType;

/// Spreadsheet and dataframe exports leave these behind in empty cells.
const NULL_ARTIFACTS: &[&str] = &["none", "nan", "null", "nat", "<na>"];

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub enum Value {
    String(String),
    Integer(i64),
    Float(f64),
    Date(NaiveDate),
}

impl Value {
    pub fn as_display(&self) -> String {
        match self {
            Value::String(s) => s.clone(),
            Value::Integer(i) => i.to_string(),
            Value::Float(f) => {
                if f.fract() == 0.0 && f.abs() < 1e15 {
                    format!("{f:.0}")
                } else {
                    f.to_string()
                }
            }
            Value::Date(d) => d.format("%Y-%m-%d").to_string(),
        }
    }
}

impl fmt::Display for Value {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.as_display())
    }
}

/// Outcome of coercing one raw cell. Parse failures are data, not errors.
#[derive(Debug, Clone, PartialEq)]
pub enum Coerced<T> {
    Parsed(T),
    /// Empty cell or a null artifact such as `nan`.
    Missing,
    Unparseable(String),
}

impl<T> Coerced<T> {
    pub fn value(self) -> Option<T> {
        match self {
            Coerced::Parsed(value) => Some(value),
            Coerced::Missing | Coerced::Unparseable(_) => None,
        }
    }

    pub fn is_parsed(&self) -> bool {
        matches!(self, Coerced::Parsed(_))
    }
}

pub fn is_null_artifact(raw: &str) -> bool {
    let trimmed = raw.trim();
    trimmed.is_empty()
        || NULL_ARTIFACTS
            .iter()
            .any(|artifact| trimmed.eq_ignore_ascii_case(artifact))
}

fn present(raw: Option<&str>) -> Option<&str> {
    raw.filter(|value| !is_null_artifact(value)).map(str::trim)
}

pub fn coerce_string(raw: Option<&str>) -> Option<String> {
    raw.filter(|value| !is_null_artifact(value))
        .map(str::to_string)
}

/// Accepts plain integers and integral floats such as `105.0`, which is how
/// dataframe tools write an integer column that once held a gap.
pub fn coerce_integer(raw: Option<&str>) -> Coerced<i64> {
    let Some(value) = present(raw) else {
        return Coerced::Missing;
    };
    if let Ok(parsed) = value.parse::<i64>() {
        return Coerced::Parsed(parsed);
    }
    match value.parse::<f64>() {
        Ok(parsed)
            if parsed.is_finite()
                && parsed.fract() == 0.0
                && parsed >= i64::MIN as f64
                && parsed < i64::MAX as f64 =>
        {
            Coerced::Parsed(parsed as i64)
        }
        _ => Coerced::Unparseable(value.to_string()),
    }
}

pub fn coerce_float(raw: Option<&str>) -> Coerced<f64> {
    let Some(value) = present(raw) else {
        return Coerced::Missing;
    };
    match value.replace(',', "").parse::<f64>() {
        Ok(parsed) if parsed.is_finite() => Coerced::Parsed(parsed),
        _ => Coerced::Unparseable(value.to_string()),
    }
}

pub fn parse_iso_date(value: &str) -> Result<NaiveDate> {
    NaiveDate::parse_from_str(value.trim(), "%Y-%m-%d")
        .with_context(|| format!("Failed to parse '{value}' as YYYY-MM-DD date"))
}

/// Strict parsing for cells read back from a stored table, where every value
/// was written by this crate and a failure means the table is damaged.
pub fn parse_typed_value(value: &str, ty: ColumnType) -> Result<Option<Value>> {
    if value.is_empty() {
        return Ok(None);
    }
    let parsed = match ty {
        ColumnType::String => Value::String(value.to_string()),
        ColumnType::Integer => {
            let parsed: i64 = value
                .parse()
                .with_context(|| format!("Failed to parse '{value}' as integer"))?;
            Value::Integer(parsed)
        }
        ColumnType::Float => {
            let parsed: f64 = value
                .parse()
                .with_context(|| format!("Failed to parse '{value}' as float"))?;
            if !parsed.is_finite() {
                return Err(anyhow!("Float value '{value}' is not finite"));
            }
            Value::Float(parsed)
        }
        ColumnType::Date => Value::Date(parse_iso_date(value)?),
    };
    Ok(Some(parsed))
}
