use anyhow::{Context, Result};
use encoding_rs::UTF_8;
use itertools::Itertools;
use log::{info, warn};
use serde::Serialize;

use crate::{
    cli::IngestArgs,
    ingest::{self, IngestOptions, PreparedBatch, RunOutcome, WatermarkPolicy},
    io_utils,
    normalize::{DateTally, RejectionTally},
    printable_delimiter,
    profile::IngestProfile,
    reconcile::RawTable,
    table,
    warehouse::CsvWarehouse,
};

/// Audit record of one `ingest` invocation, printed with `--json`.
#[derive(Debug, Serialize)]
struct RunReport {
    source: String,
    sha256: String,
    input_rows: usize,
    ready_rows: usize,
    watermark: i64,
    rejected: RejectionTally,
    dates: DateTally,
    dropped_index_column: Option<String>,
    discarded_columns: Vec<String>,
    dry_run: bool,
    outcome: Option<RunOutcome>,
}

pub fn execute(args: &IngestArgs) -> Result<()> {
    let delimiter = io_utils::resolve_input_delimiter(&args.input, args.delimiter);
    let encoding = io_utils::resolve_encoding(args.input_encoding.as_deref())?;
    let profile = match &args.profile {
        Some(path) => {
            IngestProfile::load(path).with_context(|| format!("Loading profile {path:?}"))?
        }
        None => IngestProfile::default(),
    };

    let bytes = io_utils::read_input(&args.input)?;
    let sha256 = io_utils::sha256_hex(&bytes);
    info!(
        "Reading {:?} ({} bytes, sha256 {sha256}) with delimiter '{}' and encoding {}",
        args.input,
        bytes.len(),
        printable_delimiter(delimiter),
        encoding.name()
    );
    let raw = RawTable::from_csv_bytes(&bytes, delimiter, encoding)
        .with_context(|| format!("Parsing CSV input {:?}", args.input))?;

    let options = IngestOptions {
        dynamic_schema: args.dynamic_schema,
        watermark_policy: if args.assume_empty_on_error {
            WatermarkPolicy::FallbackToZero
        } else {
            WatermarkPolicy::Required
        },
    };
    let mut warehouse = CsvWarehouse::open(&args.target.warehouse);
    let batch = ingest::prepare(&warehouse, &args.target.table, &raw, &profile, &options)?;
    log_reconciliation(&batch);

    if let Some(limit) = args.preview {
        preview(&batch, limit);
    }

    let mut report = RunReport {
        source: args.input.display().to_string(),
        sha256,
        input_rows: raw.len(),
        ready_rows: batch.outcome.ready.len(),
        watermark: batch.watermark,
        rejected: batch.outcome.rejected,
        dates: batch.outcome.dates,
        dropped_index_column: batch.report.dropped_index_column.clone(),
        discarded_columns: batch.report.discarded.clone(),
        dry_run: args.dry_run,
        outcome: None,
    };

    for warning in &batch.warnings {
        eprintln!("warning: {warning}");
    }
    if args.dry_run {
        if args.output.is_some() || !args.json {
            write_ready_rows(args, &batch)?;
        }
        info!(
            "Dry run: {} row(s) would be appended to '{}'",
            batch.outcome.ready.len(),
            batch.table
        );
    } else {
        let outcome = ingest::commit(&mut warehouse, batch)?;
        if !args.json {
            println!("{}", describe(&outcome));
        }
        report.outcome = Some(outcome);
    }

    if args.json {
        let json = serde_json::to_string_pretty(&report).context("Serializing run report")?;
        println!("{json}");
    }
    Ok(())
}

fn log_reconciliation(batch: &PreparedBatch) {
    let report = &batch.report;
    if let Some(column) = &report.dropped_index_column {
        info!("Dropped leading index column '{column}'");
    }
    if !report.synthesized.is_empty() {
        warn!(
            "Input lacks column(s) {}; filled with nulls",
            report.synthesized.iter().map(|f| f.name()).join(", ")
        );
    }
    if !report.discarded.is_empty() {
        info!("Ignored column(s): {}", report.discarded.join(", "));
    }
    let dates = &batch.outcome.dates;
    if dates.nulled > 0 {
        warn!("{} CreatDate value(s) could not be read and were nulled", dates.nulled);
    }
}

fn preview(batch: &PreparedBatch, limit: usize) {
    let headers = batch.schema.column_names();
    let rows = batch
        .outcome
        .ready
        .iter()
        .take(limit)
        .map(|record| record.to_row(&batch.schema))
        .collect::<Vec<_>>();
    table::print_table(&headers, &rows);
}

fn write_ready_rows(args: &IngestArgs, batch: &PreparedBatch) -> Result<()> {
    let delimiter = io_utils::resolve_output_delimiter(args.output.as_deref(), None, b',');
    let mut writer = io_utils::open_csv_writer(args.output.as_deref(), delimiter, UTF_8)?;
    writer
        .write_record(batch.schema.column_names())
        .context("Writing header row")?;
    for record in &batch.outcome.ready {
        writer
            .write_record(record.to_row(&batch.schema))
            .with_context(|| format!("Writing row {}", record.user_service_id))?;
    }
    writer.flush().context("Flushing ready rows")?;
    Ok(())
}

fn describe_rejections(rejected: &RejectionTally) -> String {
    format!(
        "{} rejected ({} invalid id, {} already loaded, {} repeated)",
        rejected.total(),
        rejected.invalid_id,
        rejected.stale,
        rejected.duplicate
    )
}

fn describe(outcome: &RunOutcome) -> String {
    match outcome {
        RunOutcome::Appended {
            table,
            rows,
            rejected,
            new_watermark,
            job_id,
            ..
        } => format!(
            "Appended {rows} row(s) to '{table}' (job {job_id}); now up to date to {new_watermark}; {}",
            describe_rejections(rejected)
        ),
        RunOutcome::NoNewRows {
            table,
            rejected,
            watermark,
            ..
        } => format!(
            "No new rows for '{table}'; up to date to {watermark}; {}",
            describe_rejections(rejected)
        ),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn describe_mentions_watermark_and_rejections() {
        let outcome = RunOutcome::NoNewRows {
            table: "hspdata".to_string(),
            rejected: RejectionTally {
                invalid_id: 1,
                stale: 2,
                duplicate: 0,
            },
            watermark: 105,
            warnings: Vec::new(),
        };
        let text = describe(&outcome);
        assert!(text.contains("up to date to 105"));
        assert!(text.contains("3 rejected (1 invalid id, 2 already loaded, 0 repeated)"));
    }
}
