use anyhow::{Context, Result};
use log::info;

use crate::{
    cli::ReportArgs,
    io_utils,
    report::{self, DateCondition, IdCondition, ReportQuery, ReportSummary},
    table,
    warehouse::CsvWarehouse,
};

pub fn execute(args: &ReportArgs) -> Result<()> {
    let query = build_query(args)?;
    let warehouse = CsvWarehouse::open(&args.warehouse);
    let result = report::run_query(&warehouse, &args.tables, &query)?;
    for source in &result.sources {
        match &source.table {
            Some(table) => info!("{}: {} row(s) from '{table}'", source.creator, source.rows),
            None => info!("{}: no rows in any table", source.creator),
        }
    }

    let (headers, rows) = if args.summary {
        let summary = report::summarize(result.rows);
        (ReportSummary::headers(), summary.to_rows())
    } else {
        report::detail_rows(&result.rows)
    };

    match &args.output {
        Some(path) => {
            let delimiter = io_utils::resolve_output_delimiter(Some(path), args.delimiter, b',');
            let encoding = io_utils::resolve_encoding(args.output_encoding.as_deref())?;
            let mut writer = io_utils::open_csv_writer(Some(path), delimiter, encoding)?;
            writer.write_record(&headers).context("Writing header row")?;
            for row in &rows {
                writer.write_record(row).context("Writing report row")?;
            }
            writer.flush().context("Flushing report output")?;
            info!("Wrote {} report row(s) to {path:?}", rows.len());
        }
        None => table::print_table(&headers, &rows),
    }
    Ok(())
}

fn build_query(args: &ReportArgs) -> Result<ReportQuery> {
    let id = args
        .id
        .as_deref()
        .map(str::parse::<IdCondition>)
        .transpose()
        .context("Parsing --id")?;
    let date = match (&args.date, &args.date_between) {
        (Some(day), _) => Some(DateCondition::on(day).context("Parsing --date")?),
        (None, Some(range)) => {
            Some(DateCondition::between(range).context("Parsing --date-between")?)
        }
        (None, None) => None,
    };
    let creators = args
        .creators
        .iter()
        .map(|c| c.trim().to_string())
        .filter(|c| !c.is_empty())
        .collect();
    Ok(ReportQuery { creators, id, date })
}
