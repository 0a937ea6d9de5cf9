pub mod calendar;
pub mod cli;
pub mod data;
pub mod fields;
pub mod ingest;
mod ingest_cmd;
pub mod io_utils;
pub mod normalize;
pub mod profile;
pub mod reconcile;
pub mod record;
pub mod report;
mod report_cmd;
pub mod table;
pub mod warehouse;

use std::{env, sync::OnceLock};

use anyhow::{Context, Result};
use clap::Parser;
use log::{LevelFilter, info};

use crate::{
    cli::{Cli, Commands},
    fields::CanonicalSchema,
    profile::IngestProfile,
    warehouse::{CsvWarehouse, Warehouse},
};

static LOGGER: OnceLock<()> = OnceLock::new();

fn init_logging() {
    LOGGER.get_or_init(|| {
        let mut builder = env_logger::Builder::from_env(env_logger::Env::default());
        if env::var("RUST_LOG").is_err() {
            builder.filter_module("service_report_loader", LevelFilter::Info);
        }
        let _ = builder.format_timestamp_millis().try_init();
    });
}

pub fn run() -> Result<()> {
    init_logging();
    let cli = Cli::parse();
    match cli.command {
        Commands::Init(args) => handle_init(&args),
        Commands::Ingest(args) => ingest_cmd::execute(&args),
        Commands::Status(args) => handle_status(&args),
        Commands::Schema(args) => handle_schema(&args),
        Commands::Creators(args) => handle_creators(&args),
        Commands::Report(args) => report_cmd::execute(&args),
        Commands::Profile(args) => handle_profile(&args),
    }
}

fn handle_init(args: &cli::TableArgs) -> Result<()> {
    let mut warehouse = CsvWarehouse::open(&args.warehouse);
    warehouse
        .create_table(&args.table, &CanonicalSchema::standard())
        .with_context(|| format!("Creating table '{}'", args.table))?;
    info!(
        "Created table '{}' at {:?}",
        args.table,
        warehouse.data_path(&args.table)
    );
    Ok(())
}

fn handle_status(args: &cli::TableArgs) -> Result<()> {
    let warehouse = CsvWarehouse::open(&args.warehouse);
    let max = warehouse
        .max_id(&args.table)
        .with_context(|| format!("Reading watermark of '{}'", args.table))?;
    match max {
        Some(id) => println!("Table '{}' is up to date to {id}", args.table),
        None => println!("Table '{}' is empty", args.table),
    }
    Ok(())
}

fn handle_schema(args: &cli::TableArgs) -> Result<()> {
    let warehouse = CsvWarehouse::open(&args.warehouse);
    let columns = warehouse
        .schema(&args.table)
        .with_context(|| format!("Reading schema of '{}'", args.table))?;
    let headers = vec!["#".to_string(), "column".to_string(), "type".to_string()];
    let rows = columns
        .iter()
        .enumerate()
        .map(|(idx, column)| {
            vec![
                (idx + 1).to_string(),
                column.name.clone(),
                column.datatype.to_string(),
            ]
        })
        .collect::<Vec<_>>();
    table::print_table(&headers, &rows);
    Ok(())
}

fn handle_creators(args: &cli::TableArgs) -> Result<()> {
    let warehouse = CsvWarehouse::open(&args.warehouse);
    for creator in report::distinct_creators(&warehouse, &args.table)? {
        println!("{creator}");
    }
    Ok(())
}

fn handle_profile(args: &cli::ProfileArgs) -> Result<()> {
    let profile = match &args.check {
        Some(path) => {
            IngestProfile::load(path).with_context(|| format!("Checking profile {path:?}"))?
        }
        None => IngestProfile::default(),
    };
    print!("{}", profile.to_yaml_string()?);
    Ok(())
}

pub(crate) fn printable_delimiter(delimiter: u8) -> String {
    match delimiter {
        b',' => ",".to_string(),
        b'\t' => "\\t".to_string(),
        b'\n' => "\\n".to_string(),
        other => (other as char).to_string(),
    }
}
