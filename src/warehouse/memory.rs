use std::collections::BTreeMap;

use super::{
    AppendReceipt, Warehouse, WarehouseError, check_layout, stored_layout, validate_table_name,
};
use crate::{
    fields::{CanonicalSchema, TableColumn},
    record::ServiceRecord,
};

#[derive(Debug, Clone, Default)]
struct MemoryTable {
    columns: Vec<TableColumn>,
    rows: Vec<ServiceRecord>,
}

/// In-process warehouse. Counts append calls so callers can verify when a
/// run did or did not write.
#[derive(Debug, Clone, Default)]
pub struct MemoryWarehouse {
    tables: BTreeMap<String, MemoryTable>,
    append_calls: usize,
}

impl MemoryWarehouse {
    pub fn new() -> Self {
        Self::default()
    }

    /// A warehouse holding one table with the standard layout and `rows`.
    pub fn with_table(table: &str, rows: Vec<ServiceRecord>) -> Self {
        Self::with_layout(table, &CanonicalSchema::standard(), rows)
    }

    pub fn with_layout(table: &str, layout: &CanonicalSchema, rows: Vec<ServiceRecord>) -> Self {
        let mut warehouse = Self::default();
        warehouse.tables.insert(
            table.to_string(),
            MemoryTable {
                columns: layout.table_columns(),
                rows,
            },
        );
        warehouse
    }

    pub fn append_calls(&self) -> usize {
        self.append_calls
    }

    pub fn rows(&self, table: &str) -> &[ServiceRecord] {
        self.tables
            .get(table)
            .map(|t| t.rows.as_slice())
            .unwrap_or(&[])
    }

    fn table(&self, table: &str) -> Result<&MemoryTable, WarehouseError> {
        self.tables
            .get(table)
            .ok_or_else(|| WarehouseError::TableNotFound(table.to_string()))
    }
}

impl Warehouse for MemoryWarehouse {
    fn max_id(&self, table: &str) -> Result<Option<i64>, WarehouseError> {
        Ok(self
            .table(table)?
            .rows
            .iter()
            .map(|r| r.user_service_id)
            .max())
    }

    fn schema(&self, table: &str) -> Result<Vec<TableColumn>, WarehouseError> {
        Ok(self.table(table)?.columns.clone())
    }

    fn append_rows(
        &mut self,
        table: &str,
        layout: &CanonicalSchema,
        rows: &[ServiceRecord],
    ) -> Result<AppendReceipt, WarehouseError> {
        self.append_calls += 1;
        if rows.is_empty() {
            return Err(WarehouseError::EmptyAppend(table.to_string()));
        }
        let stored = stored_layout(table, &self.table(table)?.columns)?;
        check_layout(table, &stored, layout)?;
        let entry = self
            .tables
            .get_mut(table)
            .ok_or_else(|| WarehouseError::TableNotFound(table.to_string()))?;
        entry.rows.extend_from_slice(rows);
        Ok(AppendReceipt::new(table, rows.len()))
    }

    fn scan(&self, table: &str) -> Result<Vec<ServiceRecord>, WarehouseError> {
        Ok(self.table(table)?.rows.clone())
    }

    fn create_table(
        &mut self,
        table: &str,
        layout: &CanonicalSchema,
    ) -> Result<(), WarehouseError> {
        validate_table_name(table)?;
        if self.tables.contains_key(table) {
            return Err(WarehouseError::TableExists(table.to_string()));
        }
        self.tables.insert(
            table.to_string(),
            MemoryTable {
                columns: layout.table_columns(),
                rows: Vec::new(),
            },
        );
        Ok(())
    }
}
