use std::{
    fs::{self, File, OpenOptions},
    io::BufReader,
    path::{Path, PathBuf},
};

use chrono::{DateTime, Utc};
use log::debug;
use serde::{Deserialize, Serialize};

use super::{
    AppendReceipt, Warehouse, WarehouseError, check_layout, stored_layout, validate_table_name,
};
use crate::{
    data::{Coerced, coerce_integer},
    fields::{CanonicalSchema, Field, SchemaError, TableColumn},
    record::ServiceRecord,
};

/// Persisted next to each table body as `<table>.schema.yml`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TableDefinition {
    pub table: String,
    pub columns: Vec<TableColumn>,
    pub created_at: DateTime<Utc>,
}

/// Directory of tables, one `<table>.csv` body and one `<table>.schema.yml`
/// definition per table.
#[derive(Debug, Clone)]
pub struct CsvWarehouse {
    root: PathBuf,
}

impl CsvWarehouse {
    pub fn open(root: impl Into<PathBuf>) -> Self {
        Self { root: root.into() }
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    pub fn data_path(&self, table: &str) -> PathBuf {
        self.root.join(format!("{table}.csv"))
    }

    pub fn schema_path(&self, table: &str) -> PathBuf {
        self.root.join(format!("{table}.schema.yml"))
    }

    pub fn definition(&self, table: &str) -> Result<TableDefinition, WarehouseError> {
        validate_table_name(table)?;
        let path = self.schema_path(table);
        if !path.exists() {
            return Err(WarehouseError::TableNotFound(table.to_string()));
        }
        let file = File::open(&path).map_err(|source| WarehouseError::Io {
            path: path.clone(),
            source,
        })?;
        serde_yaml::from_reader(BufReader::new(file))
            .map_err(|source| WarehouseError::SchemaFile { path, source })
    }

    fn layout(&self, table: &str) -> Result<CanonicalSchema, WarehouseError> {
        let definition = self.definition(table)?;
        stored_layout(table, &definition.columns)
    }

    /// Reads the table body, checking its header against the stored layout.
    fn read_body(
        &self,
        table: &str,
        layout: &CanonicalSchema,
    ) -> Result<Vec<csv::StringRecord>, WarehouseError> {
        let path = self.data_path(table);
        let csv_error = |source| WarehouseError::Csv {
            path: path.clone(),
            source,
        };
        let mut reader = csv::ReaderBuilder::new()
            .has_headers(true)
            .from_path(&path)
            .map_err(csv_error)?;
        let headers = reader.headers().map_err(csv_error)?.clone();
        let expected = layout.column_names();
        if headers.iter().ne(expected.iter().map(String::as_str)) {
            return Err(WarehouseError::LayoutMismatch {
                table: table.to_string(),
                stored: expected,
                offered: headers.iter().map(str::to_string).collect(),
            });
        }
        reader
            .records()
            .collect::<Result<Vec<_>, _>>()
            .map_err(csv_error)
    }

    fn write_header(&self, table: &str, layout: &CanonicalSchema) -> Result<(), WarehouseError> {
        let path = self.data_path(table);
        let csv_error = |source| WarehouseError::Csv {
            path: path.clone(),
            source,
        };
        let mut writer = csv::Writer::from_path(&path).map_err(csv_error)?;
        writer.write_record(layout.column_names()).map_err(csv_error)?;
        writer.flush().map_err(|source| WarehouseError::Io {
            path: path.clone(),
            source,
        })
    }

    fn write_definition(
        &self,
        table: &str,
        layout: &CanonicalSchema,
    ) -> Result<(), WarehouseError> {
        let path = self.schema_path(table);
        let definition = TableDefinition {
            table: table.to_string(),
            columns: layout.table_columns(),
            created_at: Utc::now(),
        };
        let file = File::create(&path).map_err(|source| WarehouseError::Io {
            path: path.clone(),
            source,
        })?;
        serde_yaml::to_writer(file, &definition).map_err(|source| {
            let _ = fs::remove_file(&path);
            WarehouseError::SchemaFile {
                path: path.clone(),
                source,
            }
        })
    }

    fn append_to_copy(
        &self,
        table: &str,
        layout: &CanonicalSchema,
        rows: &[ServiceRecord],
        staging: &Path,
    ) -> Result<(), WarehouseError> {
        let io_error = |source| WarehouseError::Io {
            path: staging.to_path_buf(),
            source,
        };
        fs::copy(self.data_path(table), staging).map_err(io_error)?;
        let file = OpenOptions::new()
            .append(true)
            .open(staging)
            .map_err(io_error)?;
        let mut writer = csv::WriterBuilder::new()
            .has_headers(false)
            .from_writer(file);
        for record in rows {
            writer
                .write_record(record.to_row(layout))
                .map_err(|source| WarehouseError::Csv {
                    path: staging.to_path_buf(),
                    source,
                })?;
        }
        writer.flush().map_err(io_error)
    }
}

impl Warehouse for CsvWarehouse {
    fn max_id(&self, table: &str) -> Result<Option<i64>, WarehouseError> {
        let layout = self.layout(table)?;
        let idx = layout
            .position(Field::UserServiceId)
            .ok_or_else(|| WarehouseError::Schema {
                table: table.to_string(),
                source: SchemaError::MissingColumns(vec![
                    Field::UserServiceId.name().to_string(),
                ]),
            })?;
        let mut max = None;
        for (row, record) in self.read_body(table, &layout)?.iter().enumerate() {
            match coerce_integer(record.get(idx)) {
                Coerced::Parsed(id) => max = max.max(Some(id)),
                other => {
                    return Err(WarehouseError::Corrupt {
                        table: table.to_string(),
                        row: row + 1,
                        detail: format!("UserServiceId is not an integer ({other:?})"),
                    });
                }
            }
        }
        Ok(max)
    }

    fn schema(&self, table: &str) -> Result<Vec<TableColumn>, WarehouseError> {
        Ok(self.definition(table)?.columns)
    }

    fn append_rows(
        &mut self,
        table: &str,
        layout: &CanonicalSchema,
        rows: &[ServiceRecord],
    ) -> Result<AppendReceipt, WarehouseError> {
        if rows.is_empty() {
            return Err(WarehouseError::EmptyAppend(table.to_string()));
        }
        let stored = self.layout(table)?;
        check_layout(table, &stored, layout)?;

        let receipt = AppendReceipt::new(table, rows.len());
        let staging = self
            .root
            .join(format!(".{table}.csv.{}.tmp", receipt.job_id.simple()));
        if let Err(err) = self.append_to_copy(table, layout, rows, &staging) {
            let _ = fs::remove_file(&staging);
            return Err(err);
        }
        let target = self.data_path(table);
        if let Err(source) = fs::rename(&staging, &target) {
            let _ = fs::remove_file(&staging);
            return Err(WarehouseError::Io {
                path: target,
                source,
            });
        }
        debug!(
            "Job {} appended {} row(s) to {:?}",
            receipt.job_id, receipt.rows, target
        );
        Ok(receipt)
    }

    fn scan(&self, table: &str) -> Result<Vec<ServiceRecord>, WarehouseError> {
        let layout = self.layout(table)?;
        self.read_body(table, &layout)?
            .iter()
            .enumerate()
            .map(|(row, record)| {
                let cells = record.iter().map(str::to_string).collect::<Vec<_>>();
                ServiceRecord::from_row(&layout, &cells).map_err(|err| WarehouseError::Corrupt {
                    table: table.to_string(),
                    row: row + 1,
                    detail: format!("{err:#}"),
                })
            })
            .collect()
    }

    fn create_table(
        &mut self,
        table: &str,
        layout: &CanonicalSchema,
    ) -> Result<(), WarehouseError> {
        validate_table_name(table)?;
        let schema_path = self.schema_path(table);
        if schema_path.exists() || self.data_path(table).exists() {
            return Err(WarehouseError::TableExists(table.to_string()));
        }
        fs::create_dir_all(&self.root).map_err(|source| WarehouseError::Io {
            path: self.root.clone(),
            source,
        })?;

        self.write_header(table, layout)?;
        if let Err(err) = self.write_definition(table, layout) {
            let _ = fs::remove_file(self.data_path(table));
            return Err(err);
        }
        debug!("Created table '{table}' under {:?}", self.root);
        Ok(())
    }
}
