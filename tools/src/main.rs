//! etl-runner: headless run of the rental ETL pipeline.
//!
//! Usage:
//!   etl-runner --config etl.json
//!   etl-runner --db rental.db --export out/summary.csv --report out/dashboard.xlsx
//!   etl-runner --db rental.db --strict --json

use anyhow::{Context, Result};
use rental_etl_core::{
    config::{EmptyInputPolicy, EtlConfig},
    engine::{EtlEngine, RunSummary},
    store::RentalStore,
};
use std::env;
use std::path::PathBuf;

fn main() -> Result<()> {
    let args: Vec<String> = env::args().collect();
    let config = load_config(&args)?;
    let json_output = args.iter().any(|a| a == "--json");
    let migrate = args.iter().any(|a| a == "--migrate");

    env_logger::Builder::new()
        .parse_filters(&config.log_filter)
        .init();
    log::debug!("Effective config: {config:?}");

    if !json_output {
        println!("Rental ETL: etl-runner");
        println!("  db:        {}", config.source.database_path);
        println!("  export:    {}", config.export_path.display());
        println!("  report:    {}", config.report_path.display());
        println!("  on empty:  {:?}", config.empty_input);
        println!();
    }

    let started = chrono::Utc::now();
    let store = RentalStore::open(&config.source.database_path)
        .with_context(|| format!("opening {}", config.source.database_path))?;
    if migrate {
        store.migrate()?;
    }

    let engine = EtlEngine::build(config)?;
    let summary = engine.run(&store)?;
    let elapsed_ms = (chrono::Utc::now() - started).num_milliseconds();

    if json_output {
        println!("{}", serde_json::to_string(&summary)?);
    } else {
        print_summary(&summary, elapsed_ms);
    }
    Ok(())
}

/// File config first (or defaults), then command-line overrides on top.
fn load_config(args: &[String]) -> Result<EtlConfig> {
    let mut config = match arg_value(args, "--config") {
        Some(path) => EtlConfig::load(path)?,
        None => EtlConfig::default(),
    };
    if let Some(db) = arg_value(args, "--db") {
        config.source.database_path = db.to_string();
    }
    if let Some(export) = arg_value(args, "--export") {
        config.export_path = PathBuf::from(export);
    }
    if let Some(report) = arg_value(args, "--report") {
        config.report_path = PathBuf::from(report);
    }
    if let Some(filter) = arg_value(args, "--log") {
        config.log_filter = filter.to_string();
    }
    if args.iter().any(|a| a == "--strict") {
        config.empty_input = EmptyInputPolicy::Reject;
    }
    config.validate()?;
    Ok(config)
}

fn print_summary(summary: &RunSummary, elapsed_ms: i64) {
    println!("=== RUN SUMMARY ===");
    println!("  source:          {}", summary.source);
    println!("  records:         {}", summary.records);
    println!("  customer rows:   {}", summary.customer_rows);
    println!("  geography rows:  {}", summary.geography_rows);
    println!("  total revenue:   {}", summary.total_revenue);
    println!("  top countries:   {}", summary.top_countries);
    println!(
        "  chart:           {}",
        if summary.chart_included { "yes" } else { "omitted (no geography)" }
    );
    println!("  generated at:    {}", summary.generated_at.format("%Y-%m-%d %H:%M:%S"));
    println!("  elapsed:         {elapsed_ms} ms");
    println!();
    println!("  export:  {}", summary.export_path.display());
    println!("  report:  {}", summary.report_path.display());
}

fn arg_value<'a>(args: &'a [String], flag: &str) -> Option<&'a str> {
    args.windows(2)
        .find(|w| w[0] == flag)
        .map(|w| w[1].as_str())
}
