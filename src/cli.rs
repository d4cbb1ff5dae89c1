//! CLI definition and dispatch.

use std::fs;
use std::path::{Path, PathBuf};
use std::process::ExitCode;
use std::sync::Arc;

use chrono::NaiveDate;
use clap::{Parser, Subcommand};

use crate::adapters::csv_adapter::CsvAdapter;
use crate::adapters::file_config_adapter::FileConfigAdapter;
use crate::adapters::retrying::RetryingMarketData;
use crate::adapters::sqlite_adapter::SqliteAdapter;
use crate::domain::config::{IndexConfiguration, WeightScheme};
use crate::domain::config_validation::{
    self, MarketSource, validate_definition, validate_engine_config,
};
use crate::domain::error::EngineError;
use crate::domain::index::NewIndexDefinition;
use crate::domain::jobs::{self, JobContext, JobKind, JobReport};
use crate::domain::ranking_strategy::StrategyRegistry;
use crate::domain::screening::ScreeningPlan;
use crate::domain::security::Security;
use crate::ports::config_port::ConfigPort;
use crate::ports::index_store::IndexStore;
use crate::ports::market_data_port::MarketDataPort;

#[derive(Parser, Debug)]
#[command(name = "theoindex", about = "Theoretical market index engine")]
pub struct Cli {
    #[command(subcommand)]
    pub command: Command,
}

#[derive(Subcommand, Debug)]
pub enum Command {
    /// Create the database schema
    Init {
        #[arg(short, long)]
        config: PathBuf,
    },
    /// Register a new index from a JSON configuration file
    Create {
        #[arg(short, long)]
        config: PathBuf,
        #[arg(long)]
        code: String,
        #[arg(long)]
        name: String,
        #[arg(long, default_value = "")]
        methodology: String,
        /// Index configuration JSON
        #[arg(long)]
        definition: PathBuf,
        /// Inception date (YYYY-MM-DD), defaults to today
        #[arg(long, value_parser = parse_date)]
        inception: Option<NaiveDate>,
    },
    /// Replace the configuration of an existing index
    UpdateConfig {
        #[arg(short, long)]
        config: PathBuf,
        #[arg(long)]
        code: String,
        #[arg(long)]
        definition: PathBuf,
    },
    /// Re-enable an index
    Enable {
        #[arg(short, long)]
        config: PathBuf,
        #[arg(long)]
        code: String,
    },
    /// Disable an index; jobs skip it
    Disable {
        #[arg(short, long)]
        config: PathBuf,
        #[arg(long)]
        code: String,
    },
    /// Validate an engine INI file and/or an index configuration JSON
    Validate {
        #[arg(short, long)]
        config: Option<PathBuf>,
        #[arg(long)]
        definition: Option<PathBuf>,
    },
    /// Compute index points, back-filling any missed trading days
    Points {
        #[arg(short, long)]
        config: PathBuf,
        #[arg(long)]
        code: Option<String>,
        /// Compute up to this date (YYYY-MM-DD), defaults to today
        #[arg(long, value_parser = parse_date)]
        date: Option<NaiveDate>,
    },
    /// Screen and rebalance index compositions
    Rebalance {
        #[arg(short, long)]
        config: PathBuf,
        #[arg(long)]
        code: Option<String>,
        #[arg(long, value_parser = parse_date)]
        date: Option<NaiveDate>,
    },
    /// Points then rebalance for every enabled index
    Daily {
        #[arg(short, long)]
        config: PathBuf,
        #[arg(long)]
        code: Option<String>,
        #[arg(long, value_parser = parse_date)]
        date: Option<NaiveDate>,
    },
    /// Print an index with its recent points, composition and rebalance log
    Show {
        #[arg(short, long)]
        config: PathBuf,
        #[arg(long)]
        code: String,
        #[arg(long, default_value_t = 10)]
        limit: usize,
    },
    /// Export the point series as CSV
    Export {
        #[arg(short, long)]
        config: PathBuf,
        #[arg(long)]
        code: String,
        /// Output file, stdout when omitted
        #[arg(short, long)]
        output: Option<PathBuf>,
        #[arg(long, value_parser = parse_date)]
        from: Option<NaiveDate>,
        #[arg(long, value_parser = parse_date)]
        to: Option<NaiveDate>,
    },
    /// Load closes and dividends from a symbol,date,close[,dividend] CSV
    ImportPrices {
        #[arg(short, long)]
        config: PathBuf,
        #[arg(long)]
        file: PathBuf,
    },
    /// Load a JSON array of securities into a universe
    ImportSecurities {
        #[arg(short, long)]
        config: PathBuf,
        #[arg(long)]
        file: PathBuf,
        #[arg(long)]
        universe: String,
    },
}

pub fn run(cli: Cli) -> ExitCode {
    match cli.command {
        Command::Init { config } => run_init(&config),
        Command::Create {
            config,
            code,
            name,
            methodology,
            definition,
            inception,
        } => run_create(&config, &code, &name, &methodology, &definition, inception),
        Command::UpdateConfig {
            config,
            code,
            definition,
        } => run_update_config(&config, &code, &definition),
        Command::Enable { config, code } => run_set_enabled(&config, &code, true),
        Command::Disable { config, code } => run_set_enabled(&config, &code, false),
        Command::Validate { config, definition } => {
            run_validate(config.as_deref(), definition.as_deref())
        }
        Command::Points { config, code, date } => {
            run_job(&config, JobKind::Points, code.as_deref(), date)
        }
        Command::Rebalance { config, code, date } => {
            run_job(&config, JobKind::Rebalance, code.as_deref(), date)
        }
        Command::Daily { config, code, date } => {
            run_job(&config, JobKind::Daily, code.as_deref(), date)
        }
        Command::Show {
            config,
            code,
            limit,
        } => run_show(&config, &code, limit),
        Command::Export {
            config,
            code,
            output,
            from,
            to,
        } => run_export(&config, &code, output.as_deref(), from, to),
        Command::ImportPrices { config, file } => run_import_prices(&config, &file),
        Command::ImportSecurities {
            config,
            file,
            universe,
        } => run_import_securities(&config, &file, &universe),
    }
}

fn parse_date(s: &str) -> Result<NaiveDate, String> {
    NaiveDate::parse_from_str(s, "%Y-%m-%d")
        .map_err(|e| format!("invalid date '{s}' (expected YYYY-MM-DD): {e}"))
}

fn today() -> NaiveDate {
    chrono::Local::now().date_naive()
}

fn fail(e: &EngineError) -> ExitCode {
    eprintln!("error: {e}");
    e.into()
}

pub fn load_config(path: &Path) -> Result<FileConfigAdapter, ExitCode> {
    FileConfigAdapter::from_file(path).map_err(|e| fail(&e))
}

/// Load and validate the INI, then open the store with its schema in place.
fn open(path: &Path) -> Result<(FileConfigAdapter, SqliteAdapter), ExitCode> {
    let config = load_config(path)?;
    validate_engine_config(&config).map_err(|e| fail(&e))?;
    let store = SqliteAdapter::from_config(&config).map_err(|e| fail(&e))?;
    store.initialize_schema().map_err(|e| fail(&e))?;
    Ok((config, store))
}

fn read_index_configuration(path: &Path) -> Result<(String, IndexConfiguration), EngineError> {
    let text = fs::read_to_string(path)?;
    let configuration = IndexConfiguration::from_json(&text)?;
    Ok((text, configuration))
}

/// Market data provider selected by `[market_data] source`, wrapped in the
/// retry policy.
pub fn market_data(
    config: &dyn ConfigPort,
    store: Arc<SqliteAdapter>,
) -> Result<RetryingMarketData, EngineError> {
    let inner: Arc<dyn MarketDataPort> = match config_validation::market_source(config)? {
        MarketSource::Sqlite => store,
        MarketSource::Csv => {
            let dir = config.get_string("market_data", "csv_dir").ok_or_else(|| {
                EngineError::ConfigMissing {
                    section: "market_data".into(),
                    key: "csv_dir".into(),
                }
            })?;
            Arc::new(CsvAdapter::new(PathBuf::from(dir)))
        }
        #[cfg(feature = "postgres")]
        MarketSource::Postgres => {
            use crate::adapters::postgres_adapter::PostgresAdapter;
            Arc::new(PostgresAdapter::from_config(config)?)
        }
        #[cfg(not(feature = "postgres"))]
        MarketSource::Postgres => {
            return Err(EngineError::ConfigInvalid {
                section: "market_data".into(),
                key: "source".into(),
                reason: "postgres feature is required for the postgres source".into(),
            });
        }
    };
    Ok(RetryingMarketData::from_config(inner, config))
}

fn run_init(config_path: &Path) -> ExitCode {
    eprintln!("Loading config from {}", config_path.display());
    match open(config_path) {
        Ok(_) => {
            eprintln!("Schema initialized");
            ExitCode::SUCCESS
        }
        Err(code) => code,
    }
}

fn run_create(
    config_path: &Path,
    code: &str,
    name: &str,
    methodology: &str,
    definition_path: &Path,
    inception: Option<NaiveDate>,
) -> ExitCode {
    let (_, store) = match open(config_path) {
        Ok(opened) => opened,
        Err(code) => return code,
    };
    let (text, configuration) = match read_index_configuration(definition_path) {
        Ok(parsed) => parsed,
        Err(e) => return fail(&e),
    };

    let definition = NewIndexDefinition {
        code: code.trim().to_uppercase(),
        name: name.trim().to_string(),
        methodology: methodology.to_string(),
        configuration,
        inception_date: inception.unwrap_or_else(today),
    };
    if let Err(e) = validate_definition(&definition, &StrategyRegistry::with_builtins()) {
        return report_definition_error(&e, &text);
    }

    match store.create_definition(&definition) {
        Ok(created) => {
            eprintln!(
                "Created index {} (id {}), inception {}",
                created.code, created.id, created.inception_date
            );
            ExitCode::SUCCESS
        }
        Err(e) => fail(&e),
    }
}

fn report_definition_error(e: &EngineError, document: &str) -> ExitCode {
    match e {
        EngineError::Filter(filter) => {
            eprintln!("error: {}", filter.display_with_context(document));
            e.into()
        }
        other => fail(other),
    }
}

fn run_update_config(config_path: &Path, code: &str, definition_path: &Path) -> ExitCode {
    let (_, store) = match open(config_path) {
        Ok(opened) => opened,
        Err(code) => return code,
    };
    let existing = match store.get_definition(code) {
        Ok(d) => d,
        Err(e) => return fail(&e),
    };
    let (text, configuration) = match read_index_configuration(definition_path) {
        Ok(parsed) => parsed,
        Err(e) => return fail(&e),
    };

    let candidate = NewIndexDefinition {
        code: existing.code.clone(),
        name: existing.name.clone(),
        methodology: existing.methodology.clone(),
        configuration,
        inception_date: existing.inception_date,
    };
    if let Err(e) = validate_definition(&candidate, &StrategyRegistry::with_builtins()) {
        return report_definition_error(&e, &text);
    }

    match store.update_configuration(&existing.code, &candidate.configuration) {
        Ok(()) => {
            eprintln!("Configuration of {} updated", existing.code);
            ExitCode::SUCCESS
        }
        Err(e) => fail(&e),
    }
}

fn run_set_enabled(config_path: &Path, code: &str, enabled: bool) -> ExitCode {
    let (_, store) = match open(config_path) {
        Ok(opened) => opened,
        Err(code) => return code,
    };
    match store.set_enabled(code, enabled) {
        Ok(()) => {
            eprintln!("{code} {}", if enabled { "enabled" } else { "disabled" });
            ExitCode::SUCCESS
        }
        Err(e) => fail(&e),
    }
}

fn run_validate(config_path: Option<&Path>, definition_path: Option<&Path>) -> ExitCode {
    if config_path.is_none() && definition_path.is_none() {
        eprintln!("error: pass --config and/or --definition");
        return ExitCode::from(2);
    }

    if let Some(path) = config_path {
        eprintln!("Validating config: {}", path.display());
        let config = match load_config(path) {
            Ok(c) => c,
            Err(code) => return code,
        };
        if let Err(e) = validate_engine_config(&config) {
            return fail(&e);
        }
        eprintln!("  engine configuration is valid");
    }

    if let Some(path) = definition_path {
        eprintln!("Validating index configuration: {}", path.display());
        let (text, configuration) = match read_index_configuration(path) {
            Ok(parsed) => parsed,
            Err(e) => return fail(&e),
        };
        let plan = match ScreeningPlan::compile(&configuration, &StrategyRegistry::with_builtins())
        {
            Ok(p) => p,
            Err(e) => return report_definition_error(&e, &text),
        };

        eprintln!("\nQuality filter (parsed):");
        eprintln!("  {}", plan.filters());
        eprintln!("\nSelection:");
        eprintln!(
            "  top {} by {} ({:?})",
            configuration.selection.top_n,
            plan.metric().name(),
            plan.direction()
        );
        if let Some(bands) = &configuration.selection.score_bands {
            eprintln!("  {} score bands", bands.len());
        }
        let weights = match &configuration.weights {
            WeightScheme::Equal => "equal".to_string(),
            WeightScheme::Score => "score".to_string(),
            WeightScheme::Fixed { value } => format!("fixed ({} symbols)", value.len()),
        };
        eprintln!("  weights: {weights}");
        eprintln!(
            "  rebalance threshold: {:.1}%, quality check: {}",
            configuration.rebalance.threshold * 100.0,
            configuration.rebalance.check_quality
        );
        if !plan.exclusions().is_empty() {
            eprintln!(
                "  exclusions: {} tickers, {} patterns",
                configuration.excluded_tickers.len(),
                configuration.excluded_ticker_patterns.len()
            );
        }
    }

    eprintln!("\nConfiguration is valid.");
    ExitCode::SUCCESS
}

fn run_job(
    config_path: &Path,
    kind: JobKind,
    code: Option<&str>,
    date: Option<NaiveDate>,
) -> ExitCode {
    let (config, store) = match open(config_path) {
        Ok(opened) => opened,
        Err(code) => return code,
    };
    let store = Arc::new(store);
    let market = match market_data(&config, Arc::clone(&store)) {
        Ok(m) => m,
        Err(e) => return fail(&e),
    };
    let calendar = match config_validation::calendar(&config) {
        Ok(c) => c,
        Err(e) => return fail(&e),
    };
    let registry = StrategyRegistry::with_builtins();

    let ctx = JobContext {
        store: &*store,
        quotes: &market,
        dividends: &market,
        universe: &*store,
        registry: &registry,
        calendar: &calendar,
        threads: config.get_int("jobs", "threads", 0).max(0) as usize,
    };

    let date = date.unwrap_or_else(today);
    match jobs::run_job(&ctx, kind, code, date) {
        Ok(report) => print_report(&report),
        Err(e) => fail(&e),
    }
}

fn print_report(report: &JobReport) -> ExitCode {
    if report.outcomes.is_empty() {
        eprintln!("No enabled indices");
        return ExitCode::SUCCESS;
    }

    for outcome in &report.outcomes {
        match &outcome.result {
            Ok(run) => {
                let mut parts = Vec::new();
                if let Some(points) = &run.points {
                    let mut text = format!("{} computed", points.computed.len());
                    if points.seeded {
                        text.push_str(", seeded");
                    }
                    if let Some(latest) = &points.latest {
                        text.push_str(&format!(", {} = {:.4}", latest.date, latest.points));
                    }
                    parts.push(text);
                }
                if let Some(decision) = &run.rebalance {
                    parts.push(if decision.changed {
                        format!(
                            "rebalanced ({} constituents, {} changes)",
                            decision.composition.len(),
                            decision.log.len()
                        )
                    } else {
                        "composition unchanged".to_string()
                    });
                }
                eprintln!("  {}: {}", outcome.code, parts.join("; "));
            }
            Err(e) => eprintln!("  {}: FAILED: {e}", outcome.code),
        }
    }

    match report.failures().next() {
        Some((_, e)) => {
            let failed = report.failures().count();
            eprintln!("{failed} of {} indices failed", report.outcomes.len());
            e.into()
        }
        None => ExitCode::SUCCESS,
    }
}

fn run_show(config_path: &Path, code: &str, limit: usize) -> ExitCode {
    let (_, store) = match open(config_path) {
        Ok(opened) => opened,
        Err(code) => return code,
    };
    let definition = match store.get_definition(code) {
        Ok(d) => d,
        Err(e) => return fail(&e),
    };

    let loaded = store.history(definition.id, None, None).and_then(|history| {
        let composition = store.composition(definition.id)?;
        let log = store.rebalance_log(definition.id, Some(limit))?;
        Ok((history, composition, log))
    });
    let (history, composition, log) = match loaded {
        Ok(data) => data,
        Err(e) => return fail(&e),
    };

    println!("{} - {}", definition.code, definition.name);
    if !definition.methodology.is_empty() {
        println!("{}", definition.methodology);
    }
    println!(
        "inception {}, {}",
        definition.inception_date,
        if definition.enabled { "enabled" } else { "disabled" }
    );

    println!("\nPoints:");
    let start = history.len().saturating_sub(limit);
    for p in &history[start..] {
        println!(
            "  {}  {:>12.4}  {:>+8.4}%  yield {:.4}%{}",
            p.date,
            p.points,
            p.daily_change * 100.0,
            p.current_yield * 100.0,
            if p.missing_constituents > 0 {
                format!("  ({} missing)", p.missing_constituents)
            } else {
                String::new()
            }
        );
    }

    println!("\nComposition:");
    for c in &composition {
        println!(
            "  {:<8} {:>7.2}%  entered {} at {:.4}",
            c.symbol,
            c.target_weight * 100.0,
            c.entry_date,
            c.entry_price
        );
    }

    println!("\nRebalance log:");
    for entry in &log {
        println!(
            "  {}  {:<9} {:<8} {}",
            entry.date, entry.action, entry.symbol, entry.reason
        );
    }
    ExitCode::SUCCESS
}

fn run_export(
    config_path: &Path,
    code: &str,
    output: Option<&Path>,
    from: Option<NaiveDate>,
    to: Option<NaiveDate>,
) -> ExitCode {
    let (_, store) = match open(config_path) {
        Ok(opened) => opened,
        Err(code) => return code,
    };
    let history = match store
        .get_definition(code)
        .and_then(|d| store.history(d.id, from, to))
    {
        Ok(h) => h,
        Err(e) => return fail(&e),
    };

    let result = match output {
        Some(path) => fs::File::create(path)
            .map_err(EngineError::from)
            .and_then(|file| write_history_csv(file, &history)),
        None => write_history_csv(std::io::stdout().lock(), &history),
    };
    match result {
        Ok(()) => {
            if let Some(path) = output {
                eprintln!("{} points written to {}", history.len(), path.display());
            }
            ExitCode::SUCCESS
        }
        Err(e) => fail(&e),
    }
}

pub fn write_history_csv<W: std::io::Write>(
    writer: W,
    history: &[crate::domain::index::IndexHistoryPoint],
) -> Result<(), EngineError> {
    let csv_err = |e: csv::Error| EngineError::Csv {
        reason: e.to_string(),
    };
    let mut wtr = csv::Writer::from_writer(writer);
    wtr.write_record([
        "date",
        "points",
        "daily_change",
        "current_yield",
        "dividend_points",
    ])
    .map_err(csv_err)?;
    for p in history {
        wtr.write_record([
            p.date.format("%Y-%m-%d").to_string(),
            format!("{:.6}", p.points),
            format!("{:.8}", p.daily_change),
            format!("{:.8}", p.current_yield),
            format!("{:.6}", p.dividend_points),
        ])
        .map_err(csv_err)?;
    }
    wtr.flush()?;
    Ok(())
}

fn run_import_prices(config_path: &Path, file: &Path) -> ExitCode {
    let (_, store) = match open(config_path) {
        Ok(opened) => opened,
        Err(code) => return code,
    };
    eprintln!("Reading {}", file.display());
    let imported = CsvAdapter::read_price_file(file).and_then(|parsed| {
        let prices = store.insert_prices(&parsed.prices)?;
        let dividends = store.insert_dividends(&parsed.dividends)?;
        Ok((prices, dividends))
    });
    match imported {
        Ok((prices, dividends)) => {
            eprintln!("Imported {prices} closes and {dividends} dividends");
            ExitCode::SUCCESS
        }
        Err(e) => fail(&e),
    }
}

fn run_import_securities(config_path: &Path, file: &Path, universe: &str) -> ExitCode {
    let (_, store) = match open(config_path) {
        Ok(opened) => opened,
        Err(code) => return code,
    };
    let imported = fs::read_to_string(file)
        .map_err(EngineError::from)
        .and_then(|text| Ok(serde_json::from_str::<Vec<Security>>(&text)?))
        .and_then(|securities| store.upsert_securities(universe, &securities));
    match imported {
        Ok(count) => {
            eprintln!("Imported {count} securities into universe '{universe}'");
            ExitCode::SUCCESS
        }
        Err(e) => fail(&e),
    }
}
