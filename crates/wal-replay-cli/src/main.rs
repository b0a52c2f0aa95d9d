//! wal-replay CLI - replay decoded change events into PostgreSQL.

use clap::{Parser, Subcommand, ValueEnum};
use std::path::{Path, PathBuf};
use std::process::ExitCode;
use std::sync::Arc;
use tokio_util::sync::CancellationToken;
use tracing::{info, warn, Level};
use tracing_subscriber::fmt::format::FmtSpan;
use wal_replay::adapter::copy::copy_statement;
use wal_replay::core::{Action, SchemaSnapshot};
use wal_replay::{
    AdaptedRow, BulkAdapter, ChangeEvent, Config, CopyEncoder, CopyFormat, PostgresDriver,
    ReplayError, RowAdapter, SchemaHandle, SqlValue, Strictness, ValueNormalizer,
    WriteDispatcher,
};

#[cfg(unix)]
use tokio::signal::unix::{signal, SignalKind};

#[derive(Parser)]
#[command(name = "wal-replay")]
#[command(about = "Replay decoded WAL change events into PostgreSQL")]
#[command(version)]
struct Cli {
    /// Path to YAML configuration file
    #[arg(short, long)]
    config: Option<PathBuf>,

    /// Log format: text or json
    #[arg(long, default_value = "text")]
    log_format: String,

    /// Log verbosity: debug, info, warn, error
    #[arg(long, default_value = "info")]
    verbosity: String,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Adapt events offline and print the result
    Adapt {
        /// Schema snapshot document (YAML)
        #[arg(long)]
        schema: PathBuf,

        /// Change events, one JSON object per line
        #[arg(long)]
        events: PathBuf,

        /// Output mode
        #[arg(long, value_enum, default_value = "row")]
        mode: Mode,

        /// COPY format for bulk mode
        #[arg(long, value_enum, default_value = "text")]
        format: Format,

        /// Fail on unknown tables, columns and types
        #[arg(long)]
        strict: bool,
    },

    /// Apply events to the configured target
    Apply {
        /// Schema snapshot document (YAML)
        #[arg(long)]
        schema: PathBuf,

        /// Change events, one JSON object per line
        #[arg(long)]
        events: PathBuf,

        /// Events per dispatched batch
        #[arg(long, default_value = "1000")]
        batch_size: usize,
    },

    /// Load and validate the configuration file
    CheckConfig,
}

#[derive(Clone, Copy, ValueEnum)]
enum Mode {
    Row,
    Bulk,
}

#[derive(Clone, Copy, ValueEnum)]
enum Format {
    Text,
    Binary,
}

impl From<Format> for CopyFormat {
    fn from(format: Format) -> Self {
        match format {
            Format::Text => CopyFormat::Text,
            Format::Binary => CopyFormat::Binary,
        }
    }
}

#[tokio::main]
async fn main() -> ExitCode {
    match run().await {
        Ok(()) => ExitCode::SUCCESS,
        Err(e) => {
            eprintln!("{}", e.format_detailed());
            ExitCode::from(e.exit_code())
        }
    }
}

async fn run() -> Result<(), ReplayError> {
    let cli = Cli::parse();

    setup_logging(&cli.verbosity, &cli.log_format)?;

    match cli.command {
        Commands::Adapt {
            schema,
            events,
            mode,
            format,
            strict,
        } => {
            let mut strictness = match &cli.config {
                Some(path) => Strictness::from(&load_config(path)?.adapter),
                None => Strictness::default(),
            };
            if strict {
                strictness = Strictness::strict();
            }

            let snapshot = SchemaSnapshot::load(&schema)?;
            let events = ChangeEvent::load_jsonl(&events)?;
            info!(
                "Loaded {} events, schema fingerprint {}",
                events.len(),
                &snapshot.fingerprint()[..12]
            );

            match mode {
                Mode::Row => adapt_rows(&events, &snapshot, strictness)?,
                Mode::Bulk => adapt_bulk(&events, &snapshot, strictness, format.into())?,
            }
        }

        Commands::Apply {
            schema,
            events,
            batch_size,
        } => {
            if batch_size == 0 {
                return Err(ReplayError::Config("--batch-size must be at least 1".into()));
            }
            let path = cli
                .config
                .ok_or_else(|| ReplayError::Config("--config is required for apply".into()))?;
            let config = load_config(&path)?;

            let handle = SchemaHandle::new(SchemaSnapshot::load(&schema)?);
            let events = ChangeEvent::load_jsonl(&events)?;

            // Setup signal handling for graceful shutdown (SIGINT and SIGTERM)
            let cancel_token = setup_signal_handler().await?;

            let driver = PostgresDriver::connect(&config.target).await?;
            let dispatcher =
                WriteDispatcher::from_config(Arc::new(driver), Arc::new(handle), &config);

            let mut statements = 0;
            let mut rows = 0;
            let mut skipped = 0;
            for batch in events.chunks(batch_size) {
                if cancel_token.is_cancelled() {
                    return Err(ReplayError::Cancelled);
                }
                let stats = dispatcher.write_batch(batch).await?;
                statements += stats.statements;
                rows += stats.rows_written;
                skipped += stats.skipped;
            }

            println!("\nReplay completed!");
            println!("  Events: {}", events.len());
            println!("  Statements: {}", statements);
            println!("  Rows written: {}", rows);
            if skipped > 0 {
                println!("  Skipped: {}", skipped);
            }
        }

        Commands::CheckConfig => {
            let path = cli.config.unwrap_or_else(|| PathBuf::from("config.yaml"));
            let config = load_config(&path)?;
            println!("Configuration OK");
            println!("  Target: {}", config.target.display_name());
            println!("  Bulk threshold: {}", config.dispatch.bulk_threshold);
            println!("  Bulk format: {}", config.dispatch.bulk_format);
            println!("  Hash: {}", config.hash());
        }
    }

    Ok(())
}

fn load_config(path: &Path) -> Result<Config, ReplayError> {
    let config = Config::load(path)?;
    info!("Loaded configuration from {:?} ({})", path, &config.hash()[..12]);
    Ok(config)
}

/// Print one JSON line per event with the row adapter's output.
fn adapt_rows(
    events: &[ChangeEvent],
    snapshot: &SchemaSnapshot,
    strictness: Strictness,
) -> Result<(), ReplayError> {
    let adapter = RowAdapter::new(ValueNormalizer::default(), strictness);
    for event in events {
        let table = event.qualified_table();
        let row = adapter.adapt(&table, &event.columns, snapshot)?;
        let line = serde_json::json!({
            "table": table,
            "names": row.names,
            "values": row.values.iter().map(value_to_json).collect::<Vec<_>>(),
        });
        println!("{}", serde_json::to_string(&line)?);
    }
    Ok(())
}

/// Print psql-style COPY blocks, one per table and column list.
fn adapt_bulk(
    events: &[ChangeEvent],
    snapshot: &SchemaSnapshot,
    strictness: Strictness,
    format: CopyFormat,
) -> Result<(), ReplayError> {
    let adapter = BulkAdapter::new(ValueNormalizer::default(), strictness);

    let mut groups: Vec<(String, AdaptedRow<'_>, CopyEncoder)> = Vec::new();
    for event in events {
        if event.action != Action::Insert {
            warn!("Skipping {:?} on {}: bulk mode only loads inserts", event.action, event.qualified_table());
            continue;
        }
        let table = event.qualified_table();
        let row = adapter.adapt(&table, &event.columns, snapshot)?;
        if row.is_empty() {
            continue;
        }
        let index = match groups
            .iter()
            .position(|(t, first, _)| *t == table && first.names == row.names)
        {
            Some(i) => i,
            None => {
                groups.push((table.clone(), row.clone(), CopyEncoder::new(format)));
                groups.len() - 1
            }
        };
        groups[index].2.push_row(&row)?;
    }

    for (table, first, encoder) in groups {
        let Some(schema) = snapshot.columns_for(&table) else {
            continue;
        };
        println!(
            "{};",
            copy_statement(schema.schema(), schema.name(), &first.names, format)
        );
        let payload = encoder.finish();
        match format {
            CopyFormat::Text => {
                print!("{}", String::from_utf8_lossy(&payload));
                println!("\\.");
            }
            CopyFormat::Binary => println!("{}", hex::encode(&payload)),
        }
    }
    Ok(())
}

/// Display form of a canonical value. JSON values are shown as their exact
/// JSON text.
fn value_to_json(value: &SqlValue<'_>) -> serde_json::Value {
    use serde_json::Value;

    match value {
        SqlValue::Null(_) => Value::Null,
        SqlValue::Bool(b) => Value::Bool(*b),
        SqlValue::I16(i) => Value::from(*i),
        SqlValue::I32(i) => Value::from(*i),
        SqlValue::I64(i) => Value::from(*i),
        SqlValue::F32(f) => float_json(f64::from(*f)),
        SqlValue::F64(f) => float_json(*f),
        SqlValue::Text(s) => Value::String(s.to_string()),
        SqlValue::Bytes(b) => Value::String(format!("\\x{}", hex::encode(b.as_ref()))),
        SqlValue::Uuid(u) => Value::String(u.to_string()),
        SqlValue::Decimal(d) => Value::String(d.to_string()),
        SqlValue::DateTime(dt) => Value::String(dt.to_string()),
        SqlValue::DateTimeOffset(dto) => Value::String(dto.to_rfc3339()),
        SqlValue::Date(d) => Value::String(d.to_string()),
        SqlValue::Time(t) => Value::String(t.to_string()),
        SqlValue::Json(_, body) => Value::String(String::from_utf8_lossy(body).into_owned()),
    }
}

fn float_json(f: f64) -> serde_json::Value {
    serde_json::Number::from_f64(f)
        .map(serde_json::Value::Number)
        .unwrap_or_else(|| serde_json::Value::String(f.to_string()))
}

fn setup_logging(verbosity: &str, format: &str) -> Result<(), ReplayError> {
    let level = match verbosity.to_lowercase().as_str() {
        "debug" => Level::DEBUG,
        "info" => Level::INFO,
        "warn" => Level::WARN,
        "error" => Level::ERROR,
        _ => Level::INFO,
    };

    // stdout carries adapt output, so logs go to stderr
    let subscriber = tracing_subscriber::fmt()
        .with_max_level(level)
        .with_span_events(FmtSpan::CLOSE)
        .with_target(false)
        .with_writer(std::io::stderr);

    match format {
        "json" => subscriber.json().init(),
        "text" => subscriber.init(),
        other => {
            return Err(ReplayError::Config(format!(
                "unknown log format '{}' (expected text or json)",
                other
            )))
        }
    }

    Ok(())
}

/// Setup signal handlers for graceful shutdown.
/// Handles both SIGINT (Ctrl-C) and SIGTERM.
/// Returns a CancellationToken that will be cancelled when a signal is received.
#[cfg(unix)]
async fn setup_signal_handler() -> Result<CancellationToken, ReplayError> {
    let cancel_token = CancellationToken::new();

    let mut sigint = signal(SignalKind::interrupt())?;
    let mut sigterm = signal(SignalKind::terminate())?;

    let token = cancel_token.clone();
    tokio::spawn(async move {
        tokio::select! {
            _ = sigint.recv() => eprintln!("\nReceived SIGINT. Stopping after the current batch..."),
            _ = sigterm.recv() => eprintln!("\nReceived SIGTERM. Stopping after the current batch..."),
        }
        token.cancel();
    });

    Ok(cancel_token)
}

/// Setup signal handler for Windows (only Ctrl-C)
#[cfg(not(unix))]
async fn setup_signal_handler() -> Result<CancellationToken, ReplayError> {
    let cancel_token = CancellationToken::new();
    let token = cancel_token.clone();

    tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            eprintln!("\nReceived Ctrl-C. Stopping after the current batch...");
            token.cancel();
        }
    });

    Ok(cancel_token)
}
