//! Canonical column set of the service report table.
//!
//! The warehouse table has a fixed, ordered list of ten columns. [`Field`]
//! names each one together with its declared [`ColumnType`], and
//! [`CanonicalSchema`] is the ordered field list a pipeline run targets:
//! either the built-in order or the order reported by the live table.

use std::{collections::HashSet, fmt, str::FromStr};

use anyhow::anyhow;
use serde::{Deserialize, Deserializer, Serialize, Serializer, de};
use thiserror::Error;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ColumnType {
    String,
    Integer,
    Float,
    Date,
}

impl ColumnType {
    pub fn as_str(&self) -> &'static str {
        match self {
            ColumnType::String => "string",
            ColumnType::Integer => "integer",
            ColumnType::Float => "float",
            ColumnType::Date => "date",
        }
    }

    pub fn variants() -> &'static [&'static str] {
        &["string", "integer", "float", "date"]
    }
}

impl fmt::Display for ColumnType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for ColumnType {
    type Err = anyhow::Error;

    fn from_str(value: &str) -> Result<Self, Self::Err> {
        let normalized = value.trim().to_ascii_lowercase();
        match normalized.as_str() {
            "string" | "str" | "text" => Ok(ColumnType::String),
            "integer" | "int" | "int64" => Ok(ColumnType::Integer),
            "float" | "double" | "float64" => Ok(ColumnType::Float),
            "date" => Ok(ColumnType::Date),
            _ => Err(anyhow!(
                "Unknown column type '{value}'. Supported types: {}",
                ColumnType::variants().join(", ")
            )),
        }
    }
}

impl Serialize for ColumnType {
    fn serialize<S>(&self, serializer: S) -> Result<S::Ok, S::Error>
    where
        S: Serializer,
    {
        match self {
            ColumnType::String => serializer.serialize_str("String"),
            ColumnType::Integer => serializer.serialize_str("Integer"),
            ColumnType::Float => serializer.serialize_str("Float"),
            ColumnType::Date => serializer.serialize_str("Date"),
        }
    }
}

impl<'de> Deserialize<'de> for ColumnType {
    fn deserialize<D>(deserializer: D) -> Result<Self, D::Error>
    where
        D: Deserializer<'de>,
    {
        let token = String::deserialize(deserializer)?;
        ColumnType::from_str(&token).map_err(|err| de::Error::custom(err.to_string()))
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum Field {
    CreatDate,
    UserServiceId,
    Creator,
    ServiceName,
    Username,
    ServiceStatus,
    ServicePrice,
    Package,
    StartDate,
    EndDate,
}

impl Field {
    pub const ALL: [Field; 10] = [
        Field::CreatDate,
        Field::UserServiceId,
        Field::Creator,
        Field::ServiceName,
        Field::Username,
        Field::ServiceStatus,
        Field::ServicePrice,
        Field::Package,
        Field::StartDate,
        Field::EndDate,
    ];

    pub fn name(self) -> &'static str {
        match self {
            Field::CreatDate => "CreatDate",
            Field::UserServiceId => "UserServiceId",
            Field::Creator => "Creator",
            Field::ServiceName => "ServiceName",
            Field::Username => "Username",
            Field::ServiceStatus => "ServiceStatus",
            Field::ServicePrice => "ServicePrice",
            Field::Package => "Package",
            Field::StartDate => "StartDate",
            Field::EndDate => "EndDate",
        }
    }

    pub fn column_type(self) -> ColumnType {
        match self {
            Field::CreatDate => ColumnType::Date,
            Field::UserServiceId => ColumnType::Integer,
            Field::ServicePrice | Field::Package => ColumnType::Float,
            Field::Creator
            | Field::ServiceName
            | Field::Username
            | Field::ServiceStatus
            | Field::StartDate
            | Field::EndDate => ColumnType::String,
        }
    }

    /// Exact, case-sensitive lookup by column name.
    pub fn from_name(name: &str) -> Option<Field> {
        Field::ALL.into_iter().find(|field| field.name() == name)
    }
}

impl fmt::Display for Field {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

impl FromStr for Field {
    type Err = anyhow::Error;

    fn from_str(value: &str) -> Result<Self, Self::Err> {
        Field::from_name(value.trim()).ok_or_else(|| {
            anyhow!(
                "Unknown column '{value}'. Expected one of: {}",
                Field::ALL.iter().map(|f| f.name()).collect::<Vec<_>>().join(", ")
            )
        })
    }
}

impl Serialize for Field {
    fn serialize<S>(&self, serializer: S) -> Result<S::Ok, S::Error>
    where
        S: Serializer,
    {
        serializer.serialize_str(self.name())
    }
}

impl<'de> Deserialize<'de> for Field {
    fn deserialize<D>(deserializer: D) -> Result<Self, D::Error>
    where
        D: Deserializer<'de>,
    {
        let token = String::deserialize(deserializer)?;
        Field::from_str(&token).map_err(|err| de::Error::custom(err.to_string()))
    }
}

/// One column of a warehouse table as reported by the store.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TableColumn {
    pub name: String,
    pub datatype: ColumnType,
}

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum SchemaError {
    #[error("column '{0}' is not part of the service report schema")]
    UnknownColumn(String),
    #[error("column '{0}' appears more than once")]
    DuplicateColumn(String),
    #[error("column '{column}' is declared as {found} but must be {expected}")]
    TypeMismatch {
        column: String,
        expected: ColumnType,
        found: ColumnType,
    },
    #[error("required column(s) missing: {}", .0.join(", "))]
    MissingColumns(Vec<String>),
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CanonicalSchema {
    fields: Vec<Field>,
}

impl Default for CanonicalSchema {
    fn default() -> Self {
        Self::standard()
    }
}

impl CanonicalSchema {
    pub fn standard() -> Self {
        Self {
            fields: Field::ALL.to_vec(),
        }
    }

    /// Builds the schema from a live table definition, keeping the table's
    /// column order. Every canonical field must appear exactly once with its
    /// declared type, and nothing else may appear.
    pub fn from_table_columns(columns: &[TableColumn]) -> Result<Self, SchemaError> {
        let mut seen = HashSet::new();
        let mut fields = Vec::with_capacity(columns.len());
        for column in columns {
            let field = Field::from_name(&column.name)
                .ok_or_else(|| SchemaError::UnknownColumn(column.name.clone()))?;
            if !seen.insert(field) {
                return Err(SchemaError::DuplicateColumn(column.name.clone()));
            }
            if column.datatype != field.column_type() {
                return Err(SchemaError::TypeMismatch {
                    column: column.name.clone(),
                    expected: field.column_type(),
                    found: column.datatype,
                });
            }
            fields.push(field);
        }
        let missing = Field::ALL
            .iter()
            .filter(|field| !seen.contains(field))
            .map(|field| field.name().to_string())
            .collect::<Vec<_>>();
        if !missing.is_empty() {
            return Err(SchemaError::MissingColumns(missing));
        }
        Ok(Self { fields })
    }

    pub fn fields(&self) -> &[Field] {
        &self.fields
    }

    pub fn position(&self, field: Field) -> Option<usize> {
        self.fields.iter().position(|candidate| *candidate == field)
    }

    pub fn column_names(&self) -> Vec<String> {
        self.fields.iter().map(|f| f.name().to_string()).collect()
    }

    pub fn table_columns(&self) -> Vec<TableColumn> {
        self.fields
            .iter()
            .map(|field| TableColumn {
                name: field.name().to_string(),
                datatype: field.column_type(),
            })
            .collect()
    }
}
