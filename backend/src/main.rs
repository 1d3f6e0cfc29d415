//! Inventory Sync CLI - Copy a vehicle inventory sheet into PostgreSQL
//!
//! # Main Commands
//!
//! ```bash
//! inventory-sync sync                       # Google Sheet -> PostgreSQL
//! inventory-sync sync --csv export.csv      # Local CSV export -> PostgreSQL
//! inventory-sync sync --dry-run --json      # Run against an in-memory table
//! inventory-sync sync --log-file run.jsonl  # Keep the run log as JSON lines
//! ```
//!
//! # Inspection Commands
//!
//! ```bash
//! inventory-sync preview --csv export.csv   # Show mapped records, touch no store
//! inventory-sync rules                      # Print the default rule set
//! inventory-sync rules --describe           # List available rule types
//! ```
//!
//! `sync` exits with 0 when the run completes (even if some rows were
//! skipped or failed), otherwise with the code of the stage that halted it:
//! 1 connection, 2 schema check, 3 schema creation, 4 fetch, 5 setup.

use clap::{Args, Parser, Subcommand};
use inventory_sync::config::{load_dotenv, rules_file_from_env, DatabaseConfig, SheetConfig};
use inventory_sync::logs::{log_info, log_success, LOG_BROADCASTER};
use inventory_sync::{
    default_rule_set, rules_description, ConfigError, CsvFileSource, HaltedRun, MemoryConnector,
    PgConnector, Persister, RawRow, RowSource, RuleError, ServiceAccountKey, SheetsSource,
    SyncPipeline, SyncReport, TransformChain,
};
use serde_json::json;
use std::fs;
use std::io::{BufWriter, Write};
use std::path::{Path, PathBuf};

#[derive(Parser)]
#[command(name = "inventory-sync")]
#[command(about = "Synchronize a vehicle inventory spreadsheet into a relational table", long_about = None)]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

/// Where rows come from and how they are cleaned
#[derive(Args)]
struct SourceArgs {
    /// Read a local CSV export instead of the Google Sheet
    #[arg(long)]
    csv: Option<PathBuf>,

    /// CSV field delimiter (default: detected from the first line)
    #[arg(long, value_parser = parse_delimiter, requires = "csv")]
    delimiter: Option<u8>,

    /// The CSV file has no header row
    #[arg(long, requires = "csv")]
    no_headers: bool,

    /// JSON transform rule file (default: INVENTORY_RULES_FILE or built-in rules)
    #[arg(short, long)]
    rules: Option<PathBuf>,
}

impl SourceArgs {
    fn csv_source(&self, path: &Path) -> CsvFileSource {
        let source = CsvFileSource::new(path).with_headers(!self.no_headers);
        match self.delimiter {
            Some(delimiter) => source.with_delimiter(delimiter),
            None => source,
        }
    }
}

fn parse_delimiter(value: &str) -> Result<u8, String> {
    match value {
        "\\t" | "tab" => Ok(b'\t'),
        _ => match value.as_bytes() {
            [byte] if byte.is_ascii() => Ok(*byte),
            _ => Err(format!("expected a single ASCII character, got '{}'", value)),
        },
    }
}

#[derive(Subcommand)]
enum Commands {
    /// Run the full sync: fetch, normalize, map, persist
    Sync {
        #[command(flatten)]
        source: SourceArgs,

        /// Use an in-memory table instead of PostgreSQL
        #[arg(long)]
        dry_run: bool,

        /// Skip the VIN lookup before each insert
        #[arg(long)]
        no_precheck: bool,

        /// Print the full report as JSON instead of the summary
        #[arg(long)]
        json: bool,

        /// Also write the run log to this file, one JSON entry per line
        #[arg(long)]
        log_file: Option<PathBuf>,
    },

    /// Fetch, normalize and map rows without touching a store
    Preview {
        #[command(flatten)]
        source: SourceArgs,

        /// Show at most this many records
        #[arg(short, long)]
        limit: Option<usize>,

        /// Output file (default: stdout)
        #[arg(short, long)]
        output: Option<PathBuf>,
    },

    /// Print the default transform rule set
    Rules {
        /// Output file (default: stdout)
        #[arg(short, long)]
        output: Option<PathBuf>,

        /// List available rule types instead
        #[arg(long)]
        describe: bool,
    },
}

#[tokio::main]
async fn main() {
    // Load .env file (if present)
    load_dotenv();

    let cli = Cli::parse();

    let code = match cli.command {
        Commands::Sync {
            source,
            dry_run,
            no_precheck,
            json,
            log_file,
        } => cmd_sync(&source, dry_run, no_precheck, json, log_file.as_deref()).await,

        Commands::Preview { source, limit, output } => {
            exit_code(cmd_preview(&source, limit, output.as_deref()).await)
        }

        Commands::Rules { output, describe } => exit_code(cmd_rules(output.as_deref(), describe)),
    };

    std::process::exit(code);
}

fn exit_code(result: Result<(), Box<dyn std::error::Error>>) -> i32 {
    match result {
        Ok(()) => 0,
        Err(e) => {
            eprintln!("❌ Error: {}", e);
            1
        }
    }
}

// =============================================================================
// sync
// =============================================================================

async fn cmd_sync(args: &SourceArgs, dry_run: bool, no_precheck: bool, json: bool, log_file: Option<&Path>) -> i32 {
    let result = match log_file {
        Some(path) => run_sync_logged(args, dry_run, no_precheck, path).await,
        None => run_sync(args, dry_run, no_precheck).await,
    };

    let (out, code) = match &result {
        Ok(report) if json => (report.to_json(), 0),
        Ok(report) => (Ok(report.summary.to_string()), 0),
        Err(halted) if json => (halted.to_json(), halted.exit_code()),
        // Already logged by the pipeline
        Err(halted) => return halted.exit_code(),
    };

    match out {
        Ok(out) => println!("{}", out),
        Err(e) => {
            eprintln!("❌ Error: {}", e);
            return 1;
        }
    }
    code
}

/// Run a sync while recording its log entries to `path`
async fn run_sync_logged(
    args: &SourceArgs,
    dry_run: bool,
    no_precheck: bool,
    path: &Path,
) -> Result<SyncReport, HaltedRun> {
    let file = fs::File::create(path).map_err(|e| {
        HaltedRun::before_start(ConfigError::InvalidValue {
            name: "--log-file".to_string(),
            message: format!("{}: {}", path.display(), e),
        })
    })?;
    let mut sink = BufWriter::new(file);

    let (result, written) = LOG_BROADCASTER
        .record_while(run_sync(args, dry_run, no_precheck), &mut sink)
        .await;

    if let Err(e) = written.and_then(|()| sink.flush()) {
        eprintln!("⚠️ Run log {} is incomplete: {}", path.display(), e);
    }
    result
}

async fn run_sync(args: &SourceArgs, dry_run: bool, no_precheck: bool) -> Result<SyncReport, HaltedRun> {
    let chain = load_chain(args.rules.as_deref()).map_err(HaltedRun::before_start)?;
    let pipeline = SyncPipeline::new(chain).with_persister(Persister::new().with_precheck(!no_precheck));

    match &args.csv {
        Some(path) => run_against_store(&pipeline, dry_run, &args.csv_source(path)).await,
        None => {
            let source = sheets_source().map_err(HaltedRun::before_start)?;
            run_against_store(&pipeline, dry_run, &source).await
        }
    }
}

async fn run_against_store<R: RowSource>(
    pipeline: &SyncPipeline,
    dry_run: bool,
    source: &R,
) -> Result<SyncReport, HaltedRun> {
    if dry_run {
        log_info("Dry run: writing to an in-memory table");
        return pipeline.run(&MemoryConnector::new(), source).await;
    }

    let db = DatabaseConfig::from_env().map_err(HaltedRun::before_start)?;
    let connector = PgConnector::new(db.url, db.table).map_err(|e| {
        HaltedRun::before_start(ConfigError::InvalidValue {
            name: "DB_TABLE".to_string(),
            message: e.to_string(),
        })
    })?;
    pipeline.run(&connector, source).await
}

fn sheets_source() -> Result<SheetsSource, ConfigError> {
    let sheet = SheetConfig::from_env()?;
    let key = ServiceAccountKey::from_file(&sheet.credentials_file).map_err(|e| ConfigError::InvalidValue {
        name: "GOOGLE_SERVICE_ACCOUNT_FILE".to_string(),
        message: e.to_string(),
    })?;
    Ok(SheetsSource::new(key, sheet.spreadsheet_id, sheet.range))
}

fn load_chain(path: Option<&Path>) -> Result<TransformChain, RuleError> {
    match path.map(Path::to_path_buf).or_else(rules_file_from_env) {
        Some(path) => {
            log_info(format!("📐 Loading transform rules: {}", path.display()));
            let chain = TransformChain::from_file(&path)?;
            log_success(format!("Loaded {} rules", chain.len()));
            Ok(chain)
        }
        None => Ok(TransformChain::inventory_defaults()),
    }
}

// =============================================================================
// preview
// =============================================================================

async fn cmd_preview(
    args: &SourceArgs,
    limit: Option<usize>,
    output: Option<&Path>,
) -> Result<(), Box<dyn std::error::Error>> {
    let pipeline = SyncPipeline::new(load_chain(args.rules.as_deref())?);

    let rows: Vec<RawRow> = match &args.csv {
        Some(path) => fetch(&args.csv_source(path)).await?,
        None => fetch(&sheets_source()?).await?,
    };

    let prepared = pipeline.prepare(&rows);
    let limit = limit.unwrap_or(prepared.len());

    let mut records = Vec::new();
    let mut malformed = 0;
    for row in &prepared {
        match &row.mapped {
            Ok(record) => {
                if records.len() < limit {
                    records.push(json!({ "row": row.row, "record": record }));
                }
            }
            Err(error) => {
                malformed += 1;
                eprintln!("   ⚠️ Row {}: {}", row.row, error);
                eprintln!("      cells: {}", row.normalized.cells().join(" | "));
            }
        }
    }

    eprintln!(
        "✅ {} rows: {} mappable, {} malformed",
        prepared.len(),
        prepared.len() - malformed,
        malformed
    );

    let json = serde_json::to_string_pretty(&records)?;
    write_output(&json, output)?;

    Ok(())
}

async fn fetch<R: RowSource>(source: &R) -> Result<Vec<RawRow>, Box<dyn std::error::Error>> {
    eprintln!("📥 Fetching rows from {}", source.describe());
    Ok(source.fetch_rows().await?)
}

// =============================================================================
// rules
// =============================================================================

fn cmd_rules(output: Option<&Path>, describe: bool) -> Result<(), Box<dyn std::error::Error>> {
    if describe {
        println!("{}", rules_description());
        return Ok(());
    }

    let json = default_rule_set().to_json()?;
    write_output(&json, output)
}

fn write_output(content: &str, path: Option<&Path>) -> Result<(), Box<dyn std::error::Error>> {
    match path {
        Some(p) => {
            fs::write(p, content)?;
            eprintln!("💾 Output written to: {}", p.display());
        }
        None => {
            println!("{}", content);
        }
    }
    Ok(())
}
