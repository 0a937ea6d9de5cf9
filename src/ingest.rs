//! One ingestion run: watermark → reconcile → normalize/filter → append.
//!
//! Every run ends in exactly one of three ways: rows appended, nothing new to
//! append, or an [`IngestError`]. The warehouse is read fresh at the start of
//! each run and written at most once at the end; an empty batch never reaches
//! [`Warehouse::append_rows`].

use std::fmt;

use log::{info, warn};
use serde::Serialize;
use thiserror::Error;
use uuid::Uuid;

use crate::{
    fields::{CanonicalSchema, SchemaError},
    normalize::{FilterOutcome, RejectionTally, normalize_and_filter},
    profile::IngestProfile,
    reconcile::{RawTable, ReconcileReport, reconcile},
    warehouse::{Warehouse, WarehouseError},
};

#[derive(Debug, Error)]
pub enum IngestError {
    #[error("could not read the watermark of table '{table}'")]
    WatermarkUnavailable {
        table: String,
        #[source]
        source: WarehouseError,
    },
    #[error("could not read the live schema of table '{table}'")]
    SchemaUnavailable {
        table: String,
        #[source]
        source: WarehouseError,
    },
    #[error("table '{table}' cannot hold service report rows")]
    SchemaMismatch {
        table: String,
        #[source]
        source: SchemaError,
    },
    #[error("appending {rows} row(s) to table '{table}' failed")]
    AppendFailed {
        table: String,
        rows: usize,
        #[source]
        source: WarehouseError,
    },
}

/// What to do when the watermark cannot be read.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum WatermarkPolicy {
    /// Fail the run.
    #[default]
    Required,
    /// Continue as if the table were empty, attaching a warning to the outcome.
    FallbackToZero,
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct IngestOptions {
    /// Take the column order from the live table instead of the built-in one.
    pub dynamic_schema: bool,
    pub watermark_policy: WatermarkPolicy,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum RunWarning {
    WatermarkAssumedZero { cause: String },
}

impl fmt::Display for RunWarning {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            RunWarning::WatermarkAssumedZero { cause } => {
                write!(f, "watermark unavailable ({cause}); assumed 0")
            }
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "status", rename_all = "snake_case")]
pub enum RunOutcome {
    Appended {
        table: String,
        rows: usize,
        rejected: RejectionTally,
        watermark: i64,
        new_watermark: i64,
        job_id: Uuid,
        warnings: Vec<RunWarning>,
    },
    NoNewRows {
        table: String,
        rejected: RejectionTally,
        watermark: i64,
        warnings: Vec<RunWarning>,
    },
}

impl RunOutcome {
    pub fn rows_appended(&self) -> usize {
        match self {
            RunOutcome::Appended { rows, .. } => *rows,
            RunOutcome::NoNewRows { .. } => 0,
        }
    }

    pub fn rejected(&self) -> &RejectionTally {
        match self {
            RunOutcome::Appended { rejected, .. } | RunOutcome::NoNewRows { rejected, .. } => {
                rejected
            }
        }
    }

    pub fn warnings(&self) -> &[RunWarning] {
        match self {
            RunOutcome::Appended { warnings, .. } | RunOutcome::NoNewRows { warnings, .. } => {
                warnings
            }
        }
    }
}

/// A filtered batch waiting to be committed. Lets callers preview or export
/// the rows before (or instead of) appending them.
#[derive(Debug, Clone, PartialEq)]
pub struct PreparedBatch {
    pub table: String,
    pub schema: CanonicalSchema,
    pub watermark: i64,
    pub report: ReconcileReport,
    pub outcome: FilterOutcome,
    pub warnings: Vec<RunWarning>,
}

fn error_chain(err: &dyn std::error::Error) -> String {
    let mut message = err.to_string();
    let mut current = err.source();
    while let Some(cause) = current {
        message.push_str(": ");
        message.push_str(&cause.to_string());
        current = cause.source();
    }
    message
}

/// Reconciles and filters `raw` without a warehouse round trip.
pub fn process(
    raw: &RawTable,
    schema: &CanonicalSchema,
    watermark: i64,
    profile: &IngestProfile,
) -> FilterOutcome {
    let frame = reconcile(raw, schema, profile);
    normalize_and_filter(&frame, watermark, profile)
}

pub fn prepare<W>(
    warehouse: &W,
    table: &str,
    raw: &RawTable,
    profile: &IngestProfile,
    options: &IngestOptions,
) -> Result<PreparedBatch, IngestError>
where
    W: Warehouse + ?Sized,
{
    let mut warnings = Vec::new();
    let watermark = match warehouse.max_id(table) {
        Ok(max) => max.unwrap_or(0),
        Err(source) => match options.watermark_policy {
            WatermarkPolicy::Required => {
                return Err(IngestError::WatermarkUnavailable {
                    table: table.to_string(),
                    source,
                });
            }
            WatermarkPolicy::FallbackToZero => {
                let warning = RunWarning::WatermarkAssumedZero {
                    cause: error_chain(&source),
                };
                warn!("Table '{table}': {warning}");
                warnings.push(warning);
                0
            }
        },
    };

    let schema = if options.dynamic_schema {
        let columns = warehouse
            .schema(table)
            .map_err(|source| IngestError::SchemaUnavailable {
                table: table.to_string(),
                source,
            })?;
        CanonicalSchema::from_table_columns(&columns).map_err(|source| {
            IngestError::SchemaMismatch {
                table: table.to_string(),
                source,
            }
        })?
    } else {
        CanonicalSchema::standard()
    };

    let frame = reconcile(raw, &schema, profile);
    let outcome = normalize_and_filter(&frame, watermark, profile);
    info!(
        "Table '{table}' watermark {watermark}: {} of {} row(s) new, {} rejected",
        outcome.ready.len(),
        raw.len(),
        outcome.rejected_count()
    );

    Ok(PreparedBatch {
        table: table.to_string(),
        schema,
        watermark,
        report: frame.report().clone(),
        outcome,
        warnings,
    })
}

pub fn commit<W>(warehouse: &mut W, batch: PreparedBatch) -> Result<RunOutcome, IngestError>
where
    W: Warehouse + ?Sized,
{
    let PreparedBatch {
        table,
        schema,
        watermark,
        outcome,
        warnings,
        ..
    } = batch;

    if outcome.is_empty() {
        info!("Table '{table}' is up to date to {watermark}; nothing to append");
        return Ok(RunOutcome::NoNewRows {
            table,
            rejected: outcome.rejected,
            watermark,
            warnings,
        });
    }

    let receipt = match warehouse.append_rows(&table, &schema, &outcome.ready) {
        Ok(receipt) => receipt,
        Err(source) => {
            return Err(IngestError::AppendFailed {
                rows: outcome.ready.len(),
                table,
                source,
            });
        }
    };
    let new_watermark = outcome.max_id().map_or(watermark, |max| max.max(watermark));
    info!(
        "Appended {} row(s) to '{table}' (job {}); watermark {watermark} -> {new_watermark}",
        receipt.rows, receipt.job_id
    );
    Ok(RunOutcome::Appended {
        table,
        rows: receipt.rows,
        rejected: outcome.rejected,
        watermark,
        new_watermark,
        job_id: receipt.job_id,
        warnings,
    })
}

pub fn run<W>(
    warehouse: &mut W,
    table: &str,
    raw: &RawTable,
    profile: &IngestProfile,
    options: &IngestOptions,
) -> Result<RunOutcome, IngestError>
where
    W: Warehouse + ?Sized,
{
    let batch = prepare(&*warehouse, table, raw, profile, options)?;
    commit(warehouse, batch)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{record::ServiceRecord, warehouse::MemoryWarehouse};

    fn raw(rows: &[[&str; 3]]) -> RawTable {
        RawTable::from_text_rows(["CDT", "UserServiceId", "Creator"], rows.iter().copied())
    }

    #[test]
    fn appends_only_rows_above_watermark() {
        let mut warehouse = MemoryWarehouse::with_table("hspdata", vec![ServiceRecord::new(100)]);
        let input = raw(&[["", "99", "a"], ["", "101", "b"], ["", "102", "c"]]);
        let outcome = run(
            &mut warehouse,
            "hspdata",
            &input,
            &IngestProfile::default(),
            &IngestOptions::default(),
        )
        .expect("run");
        match outcome {
            RunOutcome::Appended {
                rows,
                watermark,
                new_watermark,
                rejected,
                ..
            } => {
                assert_eq!(rows, 2);
                assert_eq!(watermark, 100);
                assert_eq!(new_watermark, 102);
                assert_eq!(rejected.stale, 1);
            }
            other => panic!("unexpected outcome {other:?}"),
        }
        assert_eq!(warehouse.rows("hspdata").len(), 3);
    }

    #[test]
    fn missing_table_fails_unless_fallback_requested() {
        let mut warehouse = MemoryWarehouse::new();
        let input = raw(&[["", "1", "a"]]);
        let err = run(
            &mut warehouse,
            "absent",
            &input,
            &IngestProfile::default(),
            &IngestOptions::default(),
        )
        .unwrap_err();
        assert!(matches!(err, IngestError::WatermarkUnavailable { .. }));

        let options = IngestOptions {
            watermark_policy: WatermarkPolicy::FallbackToZero,
            ..IngestOptions::default()
        };
        let batch = prepare(&warehouse, "absent", &input, &IngestProfile::default(), &options)
            .expect("prepare with fallback");
        assert_eq!(batch.watermark, 0);
        assert_eq!(batch.warnings.len(), 1);
        assert!(batch.warnings[0].to_string().contains("assumed 0"));
    }

    #[test]
    fn outcome_serializes_with_status_tag() {
        let outcome = RunOutcome::NoNewRows {
            table: "hspdata".to_string(),
            rejected: RejectionTally::default(),
            watermark: 7,
            warnings: Vec::new(),
        };
        let json = serde_json::to_value(&outcome).unwrap();
        assert_eq!(json["status"], "no_new_rows");
        assert_eq!(json["watermark"], 7);
    }
}
