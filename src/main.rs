use std::io::{self, Read, Write};
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::thread;

use anyhow::{bail, Context, Result};
use chrono::{DateTime, SecondsFormat};
use clap::{Parser, Subcommand, ValueEnum};
use tracing_subscriber::{fmt, EnvFilter};

use dhbuffer::clock::{Clock, SystemClock};
use dhbuffer::config::Config;
use dhbuffer::metrics::BufferMetrics;
use dhbuffer::report::{parse_lines, Report};
use dhbuffer::{Aggregate, Buffer, Status};

/// Aggregate DeepHealth reports in memory and summarize them.
#[derive(Parser)]
#[command(name = "dhbuffer", about)]
struct Cli {
    /// Path to the YAML configuration file.
    #[arg(short, long)]
    config: Option<PathBuf>,

    /// Logging verbosity level (trace, debug, info, warn, error).
    /// Overrides the configured log_level.
    #[arg(long)]
    log_level: Option<String>,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand)]
enum Command {
    /// Replay a JSON-lines report file into a buffer and print the aggregates.
    Replay {
        /// Report file to read, or "-" for stdin.
        input: PathBuf,

        /// Producer threads inserting into the buffer (overrides ingest.workers).
        #[arg(long)]
        workers: Option<usize>,

        /// Output format for the aggregates.
        #[arg(long, value_enum, default_value_t = OutputFormat::Table)]
        format: OutputFormat,

        /// Print Prometheus metrics after the aggregates.
        #[arg(long)]
        metrics: bool,
    },
    /// Print version information and exit.
    Version,
}

#[derive(Clone, Copy, ValueEnum)]
enum OutputFormat {
    Table,
    Json,
}

/// Build-time version info, injected via build.rs.
mod version {
    /// Release version string.
    pub const RELEASE: &str = env!("CARGO_PKG_VERSION");

    /// Git commit hash, or "unknown".
    pub fn git_commit() -> &'static str {
        option_env!("GIT_COMMIT").unwrap_or("unknown")
    }

    /// Full version string with platform info.
    pub fn full() -> String {
        format!(
            "{} (commit: {}, {}/{})",
            RELEASE,
            git_commit(),
            std::env::consts::OS,
            std::env::consts::ARCH,
        )
    }
}

fn main() -> Result<()> {
    let cli = Cli::parse();

    if let Command::Version = &cli.command {
        println!("dhbuffer {}", version::full());
        return Ok(());
    }

    let cfg = match &cli.config {
        Some(path) => Config::load(path)
            .with_context(|| format!("loading config from {}", path.display()))?,
        None => Config::default(),
    };

    let log_level = cli.log_level.as_deref().unwrap_or(&cfg.log_level);
    let filter = EnvFilter::try_new(log_level)
        .with_context(|| format!("invalid log level: {log_level}"))?;

    fmt()
        .with_env_filter(filter)
        .with_target(true)
        .with_writer(io::stderr)
        .init();

    tracing::debug!(
        version = version::RELEASE,
        commit = version::git_commit(),
        "starting dhbuffer",
    );

    match cli.command {
        Command::Replay {
            input,
            workers,
            format,
            metrics,
        } => replay(&cfg, &input, workers, format, metrics),
        Command::Version => Ok(()),
    }
}

fn replay(
    cfg: &Config,
    input: &Path,
    workers: Option<usize>,
    format: OutputFormat,
    print_metrics: bool,
) -> Result<()> {
    let workers = workers.unwrap_or(cfg.ingest.workers);
    if workers == 0 {
        bail!("--workers must be at least 1");
    }

    let text = read_input(input)?;

    let metrics = Arc::new(BufferMetrics::new().context("registering metrics")?);
    let clock: Arc<dyn Clock> = Arc::new(SystemClock);
    let buffer: Buffer =
        Buffer::from_config(&cfg.buffer, Arc::clone(&clock)).with_metrics(Arc::clone(&metrics));

    let now = clock.now_millis();
    let mut reports = Vec::new();
    let mut errors = 0usize;
    let mut stale = 0usize;

    for result in parse_lines(&text) {
        match result {
            Ok(report) if report.is_stale(now, cfg.ingest.stale_after) => {
                stale += 1;
                metrics.reports_stale.inc();
                tracing::debug!(
                    subject = %report.subject,
                    observer = %report.observer,
                    "skipping stale report",
                );
            }
            Ok(report) => reports.push(report),
            Err(e) => {
                errors += 1;
                metrics.reports_rejected.with_label_values(&[e.kind()]).inc();
                tracing::warn!(error = %e, "rejecting report");

                if cfg.ingest.max_errors > 0 && errors > cfg.ingest.max_errors {
                    bail!(
                        "too many invalid reports ({errors}), giving up at line {}",
                        e.line()
                    );
                }
            }
        }
    }

    let inserted = ingest(&buffer, &reports, workers);

    tracing::info!(
        reports = reports.len(),
        inserted,
        stale,
        errors,
        subjects = buffer.subject_count(),
        buckets = buffer.bucket_count(),
        "replay complete",
    );

    let mut aggregates = buffer.aggregates();
    aggregates.sort_by(|a, b| (&a.subject, &a.name, a.status).cmp(&(&b.subject, &b.name, b.status)));

    let stdout = io::stdout();
    let mut out = stdout.lock();

    match format {
        OutputFormat::Table => write_table(&mut out, &aggregates)?,
        OutputFormat::Json => write_json(&mut out, &aggregates)?,
    }

    if print_metrics {
        write!(out, "{}", metrics.encode()?).context("writing metrics")?;
    }

    out.flush().context("flushing output")
}

fn read_input(input: &Path) -> Result<String> {
    if input == Path::new("-") {
        let mut text = String::new();
        io::stdin()
            .read_to_string(&mut text)
            .context("reading reports from stdin")?;
        return Ok(text);
    }

    std::fs::read_to_string(input)
        .with_context(|| format!("reading reports from {}", input.display()))
}

/// Splits `reports` across `workers` producer threads sharing one buffer.
/// Returns the number of inserts performed.
fn ingest(buffer: &Buffer, reports: &[Report], workers: usize) -> usize {
    if reports.is_empty() {
        return 0;
    }

    let chunk_size = reports.len().div_ceil(workers);

    thread::scope(|s| {
        let handles: Vec<_> = reports
            .chunks(chunk_size)
            .map(|part| {
                s.spawn(move || part.iter().map(|r| buffer.insert_report(r)).sum::<usize>())
            })
            .collect();

        handles
            .into_iter()
            .map(|h| h.join().unwrap_or_else(|e| std::panic::resume_unwind(e)))
            .sum()
    })
}

fn write_table(out: &mut impl Write, aggregates: &[Aggregate<Status>]) -> Result<()> {
    writeln!(
        out,
        "{:<20} {:<20} {:<16} {:>8} {:>8} {:<24} {:<24}",
        "SUBJECT", "NAME", "STATUS", "SCORE", "COUNT", "FIRST", "LAST"
    )?;

    for agg in aggregates {
        writeln!(
            out,
            "{:<20} {:<20} {:<16} {:>8.3} {:>8} {:<24} {:<24}",
            agg.subject,
            agg.name,
            agg.status.as_str(),
            agg.score,
            agg.count,
            format_millis(agg.first),
            format_millis(agg.last),
        )?;
    }

    Ok(())
}

fn write_json(out: &mut impl Write, aggregates: &[Aggregate<Status>]) -> Result<()> {
    for agg in aggregates {
        serde_json::to_writer(&mut *out, agg).context("encoding aggregate")?;
        writeln!(out)?;
    }

    Ok(())
}

/// Formats epoch milliseconds as RFC 3339, falling back to the raw value.
fn format_millis(ms: u64) -> String {
    i64::try_from(ms)
        .ok()
        .and_then(DateTime::from_timestamp_millis)
        .map(|t| t.to_rfc3339_opts(SecondsFormat::Millis, true))
        .unwrap_or_else(|| ms.to_string())
}
