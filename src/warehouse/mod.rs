//! The tabular store that ingested rows land in.
//!
//! The pipeline talks to the store only through [`Warehouse`], passed in by
//! the caller. Two stores ship with the crate: [`CsvWarehouse`], one CSV file
//! plus one YAML schema file per table under a directory, and
//! [`MemoryWarehouse`] for embedding and tests.

mod csv_store;
mod memory;

use std::path::PathBuf;

use serde::Serialize;
use thiserror::Error;
use uuid::Uuid;

pub use csv_store::CsvWarehouse;
pub use memory::MemoryWarehouse;

use crate::{
    fields::{CanonicalSchema, SchemaError, TableColumn},
    record::ServiceRecord,
};

#[derive(Debug, Error)]
pub enum WarehouseError {
    #[error("table '{0}' does not exist")]
    TableNotFound(String),
    #[error("table '{0}' already exists")]
    TableExists(String),
    #[error("invalid table name '{0}' (use letters, digits and underscores)")]
    InvalidTableName(String),
    #[error("refusing to append an empty row set to '{0}'")]
    EmptyAppend(String),
    #[error("table '{table}' stores columns [{}] but the rows are laid out as [{}]", .stored.join(", "), .offered.join(", "))]
    LayoutMismatch {
        table: String,
        stored: Vec<String>,
        offered: Vec<String>,
    },
    #[error("table '{table}' has an invalid schema")]
    Schema {
        table: String,
        #[source]
        source: SchemaError,
    },
    #[error("table '{table}' row {row} is malformed: {detail}")]
    Corrupt {
        table: String,
        row: usize,
        detail: String,
    },
    #[error("I/O failure on {path:?}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
    #[error("CSV failure on {path:?}")]
    Csv {
        path: PathBuf,
        #[source]
        source: csv::Error,
    },
    #[error("schema file {path:?} could not be read or written")]
    SchemaFile {
        path: PathBuf,
        #[source]
        source: serde_yaml::Error,
    },
}

/// Confirmation of a completed append job.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct AppendReceipt {
    pub job_id: Uuid,
    pub table: String,
    pub rows: usize,
}

impl AppendReceipt {
    pub fn new(table: &str, rows: usize) -> Self {
        Self {
            job_id: Uuid::new_v4(),
            table: table.to_string(),
            rows,
        }
    }
}

/// Append-only store of service records keyed by table name.
///
/// `append_rows` is all-or-nothing: when it returns an error, none of the
/// rows are visible to later reads.
pub trait Warehouse {
    /// Current maximum `UserServiceId`, or `None` for an empty table.
    fn max_id(&self, table: &str) -> Result<Option<i64>, WarehouseError>;

    fn schema(&self, table: &str) -> Result<Vec<TableColumn>, WarehouseError>;

    /// Appends `rows`, laid out as `layout`. Empty row sets are rejected.
    fn append_rows(
        &mut self,
        table: &str,
        layout: &CanonicalSchema,
        rows: &[ServiceRecord],
    ) -> Result<AppendReceipt, WarehouseError>;

    fn scan(&self, table: &str) -> Result<Vec<ServiceRecord>, WarehouseError>;

    fn create_table(&mut self, table: &str, layout: &CanonicalSchema)
    -> Result<(), WarehouseError>;
}

pub fn validate_table_name(table: &str) -> Result<(), WarehouseError> {
    let valid = !table.is_empty()
        && table
            .chars()
            .all(|c| c.is_ascii_alphanumeric() || c == '_');
    if valid {
        Ok(())
    } else {
        Err(WarehouseError::InvalidTableName(table.to_string()))
    }
}

/// Resolves a stored table's column list into a layout, checking that an
/// incoming batch uses the same column order.
pub(crate) fn check_layout(
    table: &str,
    stored: &CanonicalSchema,
    offered: &CanonicalSchema,
) -> Result<(), WarehouseError> {
    if stored == offered {
        Ok(())
    } else {
        Err(WarehouseError::LayoutMismatch {
            table: table.to_string(),
            stored: stored.column_names(),
            offered: offered.column_names(),
        })
    }
}

pub(crate) fn stored_layout(
    table: &str,
    columns: &[TableColumn],
) -> Result<CanonicalSchema, WarehouseError> {
    CanonicalSchema::from_table_columns(columns).map_err(|source| WarehouseError::Schema {
        table: table.to_string(),
        source,
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn table_names_are_restricted_to_identifier_characters() {
        assert!(validate_table_name("hspdata_02").is_ok());
        assert!(validate_table_name("").is_err());
        assert!(validate_table_name("../etc").is_err());
        assert!(validate_table_name("hsp data").is_err());
    }

    #[test]
    fn layout_mismatch_names_both_orders() {
        let stored = CanonicalSchema::standard();
        let mut columns = stored.table_columns();
        columns.swap(0, 1);
        let offered = CanonicalSchema::from_table_columns(&columns).unwrap();
        let err = check_layout("hspdata", &stored, &offered).unwrap_err();
        let message = err.to_string();
        assert!(message.contains("CreatDate, UserServiceId"));
        assert!(message.contains("UserServiceId, CreatDate"));
    }
}
