pub mod activation;
pub mod align;
pub mod cli;
pub mod config;
pub mod csv_gateway;
pub mod data;
pub mod diff;
pub mod exclusion;
pub mod gateway;
pub mod io_utils;
pub mod normalize;
pub mod reconcile;
pub mod report;
pub mod resolver;
pub mod snapshot;
pub mod summary;
pub mod table;

use std::{env, fs, sync::OnceLock};

use anyhow::{Context, Result, bail};
use chrono::Local;
use clap::Parser;
use log::{LevelFilter, info, warn};

use crate::{
    activation::{Activator, PrefixDuplicator},
    cli::{Cli, Commands, StoreArgs},
    config::ReconcileConfig,
    csv_gateway::CsvGateway,
    diff::DiffEngine,
    exclusion::ExclusionPolicy,
    gateway::{QueryGateway, RecordKeys},
    reconcile::Reconciler,
    resolver::{IdentifierResolver, RetryPolicy},
    snapshot::FileSnapshotStore,
    summary::ProductSummary,
};

static LOGGER: OnceLock<()> = OnceLock::new();

fn init_logging() {
    LOGGER.get_or_init(|| {
        let mut builder = env_logger::Builder::from_env(env_logger::Env::default());
        if env::var("RUST_LOG").is_err() {
            builder.filter_module("record_reconciler", LevelFilter::Info);
        }
        let _ = builder.format_timestamp_millis().try_init();
    });
}

pub fn run() -> Result<()> {
    init_logging();
    let cli = Cli::parse();
    match cli.command {
        Commands::Compare(args) => handle_compare(&args),
        Commands::Capture(args) => handle_capture(&args),
        Commands::Activate(args) => handle_activate(&args),
        Commands::Reconcile(args) => handle_reconcile(&args),
        Commands::Extract(args) => handle_extract(&args),
    }
}

fn open_store(args: &StoreArgs) -> Result<(ReconcileConfig, CsvGateway)> {
    let config = ReconcileConfig::load_or_default(args.config.as_deref())?;
    let encoding = io_utils::resolve_encoding(args.input_encoding.as_deref())?;
    if !args.data.is_dir() {
        bail!("Data directory {:?} does not exist", args.data);
    }
    let gateway = CsvGateway::new(&args.data, config.lookup.clone())
        .with_delimiter(args.delimiter.unwrap_or(io_utils::DEFAULT_CSV_DELIMITER))
        .with_encoding(encoding);
    Ok((config, gateway))
}

fn handle_compare(args: &cli::CompareArgs) -> Result<()> {
    let encoding = io_utils::resolve_encoding(args.input_encoding.as_deref())?;
    let policy = if args.no_exclusions {
        ExclusionPolicy::empty()
    } else {
        ReconcileConfig::load_or_default(args.config.as_deref())?.exclusions
    };
    let read = |path: &std::path::Path| {
        let delimiter = io_utils::resolve_input_delimiter(path, args.delimiter);
        csv_gateway::read_dataset(path, delimiter, encoding)
            .with_context(|| format!("Reading {path:?}"))
    };
    let source = read(args.source.as_path())?;
    let target = read(args.target.as_path())?;
    info!(
        "Comparing {} source row(s) with {} target row(s) for {}",
        source.row_count(),
        target.row_count(),
        args.table
    );

    let comparison = DiffEngine::new(policy).compare(&source, &target, &args.table);
    if args.json {
        let rendered =
            serde_json::to_string_pretty(&comparison).context("Serializing comparison")?;
        println!("{rendered}");
        return Ok(());
    }

    println!("{}: {}", comparison.table, comparison.verdict);
    if let Some(message) = comparison.diagnostic() {
        println!("{message}");
    }
    let differences = comparison.differences();
    if !differences.is_empty() {
        let headers = ["row", "column", "source", "target"].map(String::from);
        let rows = differences
            .iter()
            .map(|cell| {
                vec![
                    cell.row.to_string(),
                    cell.column.clone(),
                    cell.source_text().to_string(),
                    cell.target_text().to_string(),
                ]
            })
            .collect::<Vec<_>>();
        table::print_table(&headers, &rows);
    }
    for warning in &comparison.warnings {
        warn!("{warning}");
    }
    Ok(())
}

fn handle_capture(args: &cli::CaptureArgs) -> Result<()> {
    let (config, gateway) = open_store(&args.store)?;
    let store = FileSnapshotStore::new(&args.snapshots);
    let key = IdentifierResolver::new(&gateway)
        .resolve(&args.reference, &config.retry.routine)
        .with_context(|| format!("Resolving {}", args.reference))?;
    let keys = RecordKeys::new(&args.reference, key);
    for table in &config.tables {
        snapshot::capture(&gateway, &store, table, &keys)
            .with_context(|| format!("Capturing {} for {}", table.name, args.reference))?;
    }
    info!(
        "{} snapshot(s) of {} written to {:?}",
        config.tables.len(),
        args.reference,
        args.snapshots
    );
    Ok(())
}

fn handle_activate(args: &cli::ActivateArgs) -> Result<()> {
    let (config, gateway) = open_store(&args.store)?;
    let input_encoding = io_utils::resolve_encoding(args.store.input_encoding.as_deref())?;
    let output_encoding = io_utils::resolve_encoding(args.output_encoding.as_deref())?;
    let sources = report::read_sources(
        &args.sources,
        io_utils::resolve_input_delimiter(&args.sources, None),
        input_encoding,
    )
    .with_context(|| format!("Reading sources from {:?}", args.sources))?;
    if sources.is_empty() {
        warn!("No source reference found in {:?}", args.sources);
    }

    let store = FileSnapshotStore::new(&args.snapshots);
    let duplicator = PrefixDuplicator::new(&args.target_prefix, args.keep_digits);
    let entries = Activator::new(&gateway, &store, &duplicator, &config.tables)
        .with_source_policy(RetryPolicy::single())
        .with_target_policy(config.retry.fresh)
        .activate_all(&sources);
    report::write_activation(
        &args.output,
        &entries,
        io_utils::resolve_input_delimiter(&args.output, None),
        output_encoding,
    )
}

fn handle_reconcile(args: &cli::ReconcileArgs) -> Result<()> {
    let (config, gateway) = open_store(&args.store)?;
    let input_encoding = io_utils::resolve_encoding(args.store.input_encoding.as_deref())?;
    let output_encoding = io_utils::resolve_encoding(args.output_encoding.as_deref())?;
    let mapping_delimiter = io_utils::resolve_input_delimiter(&args.mapping, args.mapping_delimiter);
    let entries = report::read_mapping(&args.mapping, mapping_delimiter, input_encoding)
        .with_context(|| format!("Reading mapping {:?}", args.mapping))?;

    let store = FileSnapshotStore::new(&args.snapshots);
    let engine = DiffEngine::new(config.exclusions.clone());
    let records = Reconciler::new(&gateway, &store, &engine, &config.tables)
        .with_policy(config.retry.routine)
        .run(&entries);
    if records.is_empty() {
        warn!("No record was processed from {:?}", args.mapping);
        return Ok(());
    }

    fs::create_dir_all(&args.output_dir)
        .with_context(|| format!("Creating output directory {:?}", args.output_dir))?;
    let stamp = Local::now().format("%Y%m%d_%H%M%S");
    report::write_detail_report(
        &args.output_dir.join(format!("detail_report_{stamp}.csv")),
        &records,
        output_encoding,
    )?;

    let summary = ProductSummary::from_records(&records);
    println!();
    table::print_table(&summary.headers(), &summary.table_rows());
    println!();
    report::write_summary(
        &args.output_dir.join(format!("product_summary_{stamp}.csv")),
        &summary,
        output_encoding,
    )?;
    info!("Reconciliation of {} record(s) finished", records.len());
    Ok(())
}

fn handle_extract(args: &cli::ExtractArgs) -> Result<()> {
    let (config, gateway) = open_store(&args.store)?;
    let (reference, key) = IdentifierResolver::new(&gateway)
        .resolve_any_form(&args.reference, &RetryPolicy::single())
        .with_context(|| format!("Resolving {}", args.reference))?;
    info!("{reference} has internal key {key}");

    let keys = RecordKeys::new(&reference, key);
    let encoding = io_utils::resolve_encoding(args.store.input_encoding.as_deref())?;
    let mut written = 0;
    for table in &config.tables {
        let query = table.bind(&keys);
        let dataset = match gateway.execute(&query) {
            Ok(dataset) => dataset,
            Err(err) => {
                warn!("{}: {err}", table.name);
                continue;
            }
        };
        if dataset.columns().is_empty() {
            warn!("{}: no column returned, nothing written", table.name);
            continue;
        }
        if dataset.is_empty() {
            warn!("{}: no row", table.name);
        } else {
            info!("{}: {} row(s)", table.name, dataset.row_count());
        }
        let path = args.output_dir.join(format!("{}.csv", table.name));
        csv_gateway::write_dataset(&path, &dataset, io_utils::DEFAULT_CSV_DELIMITER, encoding)?;
        written += 1;
    }
    info!(
        "Extraction of {reference}: {written} table(s) written to {:?}",
        args.output_dir
    );
    Ok(())
}
