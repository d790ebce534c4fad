//! driftwatch core - anomaly detection engine CLI
//!
//! The main entry point for dw-core, handling:
//! - Metric ingestion from JSONL files or stdin
//! - One-off detection of single observations
//! - Baseline, model and anomaly administration
//! - The `watch` monitor loop

use std::io::{BufRead, BufReader, Read, Write};
use std::path::PathBuf;
use std::sync::mpsc::{self, RecvTimeoutError};
use std::thread;

use chrono::{DateTime, TimeDelta, Utc};
use clap::{Args, Parser, Subcommand};
use dw_common::{
    AnomalyId, Error, MetricKind, OutputFormat, Result, SeriesKey, StructuredError, SCHEMA_VERSION,
};
use dw_config::{
    list_presets, load_config, load_config_file, LoadOptions, LoadedConfig, PresetName,
    CONFIG_SCHEMA_VERSION,
};
use dw_core::detect::{AnomalyRecord, DetectionOutcome, Severity};
use dw_core::engine::{AnomalyEngine, BatchReport};
use dw_core::exit_codes::ExitCode;
use dw_core::ingest::{is_skippable, parse_numbered_line, RawPoint, RawTimestamp};
use dw_core::log_event;
use dw_core::logging::{
    event_names, init_logging, LogConfig, LogContext, LogFormat, LogOverrides, Stage,
};
use dw_core::ml::TrainOutcome;
use dw_core::monitor::{process_tick, MonitorState};
use dw_core::store::AnomalyFilter;
use serde::Serialize;

/// driftwatch - statistical and ML anomaly detection for metric streams
#[derive(Parser)]
#[command(name = "dw-core")]
#[command(author, version, about, long_about = None)]
#[command(propagate_version = true)]
struct Cli {
    #[command(subcommand)]
    command: Commands,

    #[command(flatten)]
    global: GlobalOpts,
}

/// Global options available to all commands
#[derive(Args, Debug)]
struct GlobalOpts {
    /// Config file (overrides DRIFTWATCH_CONFIG and the XDG lookup)
    #[arg(long, global = true)]
    config: Option<PathBuf>,

    /// SQLite database path (overrides storage.db_path)
    #[arg(long, global = true, env = "DRIFTWATCH_DB")]
    db: Option<PathBuf>,

    /// Built-in preset used as the base configuration layer
    #[arg(long, global = true)]
    preset: Option<PresetName>,

    /// Output format
    #[arg(long, short = 'f', global = true, default_value = "json")]
    format: OutputFormat,

    /// Increase verbosity (-v, -vv)
    #[arg(short, long, global = true, action = clap::ArgAction::Count)]
    verbose: u8,

    /// Only log errors
    #[arg(short, long, global = true)]
    quiet: bool,

    /// Log format on stderr
    #[arg(long, global = true)]
    log_format: Option<LogFormat>,
}

#[derive(Subcommand)]
enum Commands {
    /// Ingest JSONL metric points from a file or stdin
    Ingest(IngestArgs),

    /// Score a single observation
    Detect(DetectArgs),

    /// Baseline management
    Baseline(BaselineArgs),

    /// Train ML models now
    Train(TrainArgs),

    /// List, inspect and label detected anomalies
    Anomalies(AnomaliesArgs),

    /// Read JSONL points from stdin and stream anomalies to stdout
    Watch,

    /// Prune old points, refresh due baselines, retrain due models
    Maintain,

    /// Store and model statistics
    Stats,

    /// Configuration management
    Config(ConfigArgs),

    /// Print version information
    Version,
}

// ============================================================================
// Command argument structs
// ============================================================================

#[derive(Args, Debug)]
struct IngestArgs {
    /// Input file (`-` or absent reads stdin)
    file: Option<PathBuf>,

    /// Score each point instead of only storing it
    #[arg(long)]
    detect: bool,
}

#[derive(Args, Debug)]
struct DetectArgs {
    /// Metric name
    #[arg(long)]
    metric: String,

    #[arg(long, allow_negative_numbers = true)]
    value: f64,

    #[arg(long)]
    source: Option<String>,

    /// RFC 3339 or epoch seconds; defaults to now
    #[arg(long)]
    timestamp: Option<String>,

    /// network, performance, security or generic; inferred from the name
    #[arg(long, value_parser = parse_kind)]
    kind: Option<MetricKind>,
}

#[derive(Args, Debug)]
struct BaselineArgs {
    #[command(subcommand)]
    command: BaselineCommands,
}

#[derive(Subcommand, Debug)]
enum BaselineCommands {
    /// Refit baselines from stored points
    Refresh {
        /// Series as `name` or `name@source`; all series when absent
        #[arg(long, value_parser = parse_series)]
        series: Option<SeriesKey>,
    },
    /// Show stored baselines
    Show {
        #[arg(long, value_parser = parse_series)]
        series: Option<SeriesKey>,
    },
    /// Export all baselines as JSON
    Export {
        /// Write to a file instead of stdout
        #[arg(long, short = 'o')]
        output: Option<PathBuf>,

        /// Origin label recorded in the export
        #[arg(long, default_value = "dw-core")]
        origin: String,
    },
    /// Import baselines exported by another instance
    Import {
        file: PathBuf,
    },
    /// Delete baselines so they are relearned
    Reset {
        #[arg(long, value_parser = parse_series)]
        series: Option<SeriesKey>,
    },
}

#[derive(Args, Debug)]
struct TrainArgs {
    /// Train only this metric kind
    #[arg(long, value_parser = parse_kind)]
    kind: Option<MetricKind>,
}

#[derive(Args, Debug)]
struct AnomaliesArgs {
    #[command(subcommand)]
    command: AnomaliesCommands,
}

#[derive(Subcommand, Debug)]
enum AnomaliesCommands {
    /// List anomalies, newest first
    List {
        /// RFC 3339 timestamp or a relative age such as `30m`, `24h`, `7d`
        #[arg(long)]
        since: Option<String>,

        /// Minimum severity
        #[arg(long, value_parser = parse_severity)]
        severity: Option<Severity>,

        #[arg(long)]
        metric: Option<String>,

        #[arg(long)]
        source: Option<String>,

        #[arg(long, value_parser = parse_kind)]
        kind: Option<MetricKind>,

        /// Only anomalies without analyst feedback
        #[arg(long)]
        unlabeled: bool,

        #[arg(long, default_value = "50")]
        limit: usize,
    },
    /// Show one anomaly
    Show {
        id: String,
    },
    /// Record analyst feedback
    Label {
        id: String,

        /// The anomaly was real
        #[arg(long, conflicts_with = "false_positive", required_unless_present = "false_positive")]
        confirmed: bool,

        /// The anomaly was a false positive
        #[arg(long)]
        false_positive: bool,
    },
}

#[derive(Args, Debug)]
struct ConfigArgs {
    #[command(subcommand)]
    command: ConfigCommands,
}

#[derive(Subcommand, Debug)]
enum ConfigCommands {
    /// Show the effective configuration and where it came from
    Show,
    /// Validate a config file (or the resolved one)
    Validate {
        path: Option<PathBuf>,
    },
    /// List built-in presets
    Presets,
}

// ============================================================================
// Argument parsers
// ============================================================================

fn parse_kind(s: &str) -> std::result::Result<MetricKind, String> {
    MetricKind::parse(s).ok_or_else(|| {
        format!("unknown metric kind '{}' (network, performance, security, generic)", s)
    })
}

fn parse_severity(s: &str) -> std::result::Result<Severity, String> {
    Severity::parse(s)
        .ok_or_else(|| format!("unknown severity '{}' (low, medium, high, critical)", s))
}

fn parse_series(s: &str) -> std::result::Result<SeriesKey, String> {
    SeriesKey::parse(s).ok_or_else(|| format!("invalid series '{}' (expected name[@source])", s))
}

/// RFC 3339, or a relative age (`90s`, `30m`, `24h`, `7d`) before now.
fn parse_since(s: &str) -> Result<DateTime<Utc>> {
    if let Ok(ts) = DateTime::parse_from_rfc3339(s) {
        return Ok(ts.with_timezone(&Utc));
    }
    let invalid = |message: String| Error::InvalidArgument {
        name: "--since".to_string(),
        message,
    };
    let err = || invalid(format!("'{}' is not RFC 3339 or an age such as 30m, 24h, 7d", s));
    let (split, _) = s.char_indices().last().ok_or_else(err)?;
    let (num, unit) = s.split_at(split);
    let n: i64 = num.parse().map_err(|_| err())?;
    let age = match unit {
        "s" => TimeDelta::try_seconds(n),
        "m" => TimeDelta::try_minutes(n),
        "h" => TimeDelta::try_hours(n),
        "d" => TimeDelta::try_days(n),
        "w" => TimeDelta::try_weeks(n),
        _ => return Err(err()),
    }
    .ok_or_else(|| invalid(format!("'{}' is out of range", s)))?;
    Utc::now()
        .checked_sub_signed(age)
        .ok_or_else(|| invalid(format!("'{}' is out of range", s)))
}

// ============================================================================
// Entry point
// ============================================================================

fn main() {
    let cli = Cli::parse();

    init_logging(&LogConfig::from_env(LogOverrides {
        verbose: cli.global.verbose,
        quiet: cli.global.quiet,
        format: cli.global.log_format,
    }));
    let ctx = LogContext::for_current_run();
    let _span = ctx.span(Stage::Init).entered();

    let exit_code = match run(&cli, &ctx) {
        Ok(code) => code,
        Err(e) => report_error(&cli.global, &e),
    };

    log_event!(
        ctx,
        DEBUG,
        event_names::RUN_FINISHED,
        Stage::Init,
        "run finished",
        exit_code = exit_code.as_i32()
    );
    std::process::exit(exit_code.as_i32());
}

fn run(cli: &Cli, ctx: &LogContext) -> Result<ExitCode> {
    let global = &cli.global;
    match &cli.command {
        Commands::Ingest(args) => run_ingest(global, ctx, args),
        Commands::Detect(args) => run_detect(global, ctx, args),
        Commands::Baseline(args) => run_baseline(global, ctx, args),
        Commands::Train(args) => run_train(global, ctx, args),
        Commands::Anomalies(args) => run_anomalies(global, ctx, args),
        Commands::Watch => run_watch(global, ctx),
        Commands::Maintain => run_maintain(global, ctx),
        Commands::Stats => run_stats(global, ctx),
        Commands::Config(args) => run_config(global, args),
        Commands::Version => {
            print_version(global);
            Ok(ExitCode::Clean)
        }
    }
}

/// Resolve configuration, apply `--db`, open the engine.
fn open_engine(global: &GlobalOpts, ctx: &LogContext) -> Result<(AnomalyEngine, LoadedConfig)> {
    let loaded = load_configuration(global)?;
    if loaded.path.path.is_none() {
        log_event!(
            ctx,
            DEBUG,
            event_names::CONFIG_DEFAULT_USED,
            Stage::Init,
            "no config file found; using built-in defaults"
        );
    }
    log_event!(
        ctx,
        DEBUG,
        event_names::CONFIG_LOADED,
        Stage::Init,
        "configuration loaded",
        source = loaded.path.source.as_str(),
        effective_hash = loaded.snapshot.short_id()
    );
    let mut config = loaded.config.clone();
    if let Some(db) = &global.db {
        config.storage.db_path = Some(db.clone());
    }
    let engine = AnomalyEngine::open(config)?;
    Ok((engine, loaded))
}

fn load_configuration(global: &GlobalOpts) -> Result<LoadedConfig> {
    let options = LoadOptions {
        config_path: global.config.clone(),
        preset: global.preset,
    };
    load_config(&options).map_err(|e| {
        tracing::warn!(target: event_names::CONFIG_ERROR, error = %e);
        Error::from(e)
    })
}

// ============================================================================
// Output helpers
// ============================================================================

/// Write a command payload to stdout in the selected format. `summary` and
/// `markdown` are only rendered when those formats are selected.
fn emit<T: Serialize>(
    global: &GlobalOpts,
    command: &str,
    payload: &T,
    summary: impl FnOnce() -> String,
    markdown: impl FnOnce() -> String,
) -> Result<()> {
    let mut stdout = std::io::stdout().lock();
    match global.format {
        format if format.is_json() => {
            let envelope = serde_json::json!({
                "schema_version": SCHEMA_VERSION,
                "command": command,
                "generated_at": Utc::now().to_rfc3339(),
                "result": payload,
            });
            let text = if global.format == OutputFormat::Json {
                serde_json::to_string_pretty(&envelope)?
            } else {
                serde_json::to_string(&envelope)?
            };
            writeln!(stdout, "{}", text)?;
        }
        OutputFormat::Md => write!(stdout, "{}", markdown())?,
        _ => writeln!(stdout, "{}", summary())?,
    }
    Ok(())
}

fn report_error(global: &GlobalOpts, error: &Error) -> ExitCode {
    let exit_code = ExitCode::for_error(error);
    tracing::error!(
        target: event_names::INTERNAL_ERROR,
        code = error.code(),
        exit_code = exit_code.as_i32(),
        error = %error,
    );
    match global.format {
        format if format.is_json() => {
            let structured = StructuredError::from(error);
            let response = serde_json::json!({
                "schema_version": SCHEMA_VERSION,
                "status": "error",
                "exit_code": exit_code.code_name(),
                "error": structured,
            });
            eprintln!("{}", response);
        }
        OutputFormat::Md => eprintln!("{}", error.render_human()),
        _ => eprintln!("error [{}]: {}", error.code(), error),
    }
    exit_code
}

fn anomalies_exit(found: bool) -> ExitCode {
    if found {
        ExitCode::AnomaliesFound
    } else {
        ExitCode::Clean
    }
}

fn anomaly_line(record: &AnomalyRecord) -> String {
    format!(
        "{} {} {} value={} expected={:.3} score={:.3} [{}] {}",
        record.timestamp.to_rfc3339(),
        record.severity,
        record.series,
        record.value,
        record.expected,
        record.score,
        record.methods.join(","),
        record.id
    )
}

fn anomalies_markdown(title: &str, records: &[AnomalyRecord]) -> String {
    let mut out = format!("# {}\n\n", title);
    if records.is_empty() {
        out.push_str("No anomalies.\n");
        return out;
    }
    out.push_str("| Time | Series | Value | Expected | Score | Severity | Methods | Label |\n");
    out.push_str("|---|---|---|---|---|---|---|---|\n");
    for r in records {
        let label = match r.label {
            Some(true) => "confirmed",
            Some(false) => "false positive",
            None => "",
        };
        out.push_str(&format!(
            "| {} | {} | {} | {:.3} | {:.3} | {} | {} | {} |\n",
            r.timestamp.to_rfc3339(),
            r.series,
            r.value,
            r.expected,
            r.score,
            r.severity,
            r.methods.join(", "),
            label
        ));
    }
    out
}

// ============================================================================
// Commands
// ============================================================================

/// Parsed input lines, with the line number of each point.
struct ParsedInput {
    points: Vec<RawPoint>,
    line_numbers: Vec<usize>,
    malformed: Vec<(usize, String)>,
}

fn read_points(reader: impl Read) -> Result<ParsedInput> {
    let mut input = ParsedInput {
        points: Vec::new(),
        line_numbers: Vec::new(),
        malformed: Vec::new(),
    };
    for (idx, line) in BufReader::new(reader).lines().enumerate() {
        let line = line?;
        let line_no = idx + 1;
        if is_skippable(&line) {
            continue;
        }
        match parse_numbered_line(&line, line_no) {
            Ok(raw) => {
                input.points.push(raw);
                input.line_numbers.push(line_no);
            }
            Err(e) => {
                tracing::debug!(target: event_names::INGEST_REJECTED, line = line_no, reason = %e);
                input.malformed.push((line_no, e.to_string()));
            }
        }
    }
    Ok(input)
}

#[derive(Serialize)]
struct IngestOutput {
    mode: &'static str,
    lines_read: usize,
    processed: usize,
    learning: usize,
    normal: usize,
    anomaly_count: usize,
    anomalies: Vec<AnomalyRecord>,
    rejected: Vec<RejectedLine>,
}

#[derive(Serialize)]
struct RejectedLine {
    line: usize,
    reason: String,
}

fn run_ingest(global: &GlobalOpts, ctx: &LogContext, args: &IngestArgs) -> Result<ExitCode> {
    let (mut engine, _) = open_engine(global, ctx)?;
    let _span = ctx.span(Stage::Ingest).entered();

    let input = match args.file.as_deref() {
        Some(path) if path.as_os_str() != "-" => read_points(std::fs::File::open(path)?)?,
        _ => read_points(std::io::stdin().lock())?,
    };
    let lines_read = input.points.len() + input.malformed.len();

    let now = Utc::now();
    let report: BatchReport = if args.detect {
        engine.process_batch(input.points, now)?
    } else {
        engine.store_batch(input.points, now)?
    };

    let mut rejected: Vec<RejectedLine> = input
        .malformed
        .into_iter()
        .map(|(line, reason)| RejectedLine { line, reason })
        .collect();
    rejected.extend(report.rejected.iter().map(|r| RejectedLine {
        line: input.line_numbers.get(r.index).copied().unwrap_or(0),
        reason: r.reason.clone(),
    }));
    rejected.sort_by_key(|r| r.line);

    let output = IngestOutput {
        mode: if args.detect { "detect" } else { "store" },
        lines_read,
        processed: report.processed,
        learning: report.learning,
        normal: report.normal,
        anomaly_count: report.anomalies.len(),
        anomalies: report.anomalies,
        rejected,
    };

    emit(
        global,
        "ingest",
        &output,
        || {
            format!(
                "ingest: {} processed, {} rejected, {} anomalies",
                output.processed,
                output.rejected.len(),
                output.anomaly_count
            )
        },
        || {
            let mut md = format!(
                "# Ingest\n\nProcessed: {}\nLearning: {}\nNormal: {}\nRejected: {}\n\n",
                output.processed,
                output.learning,
                output.normal,
                output.rejected.len()
            );
            for r in &output.rejected {
                md.push_str(&format!("- line {}: {}\n", r.line, r.reason));
            }
            if !output.anomalies.is_empty() {
                md.push('\n');
                md.push_str(&anomalies_markdown("Anomalies", &output.anomalies));
            }
            md
        },
    )?;
    Ok(anomalies_exit(output.anomaly_count > 0))
}

fn run_detect(global: &GlobalOpts, ctx: &LogContext, args: &DetectArgs) -> Result<ExitCode> {
    let (mut engine, _) = open_engine(global, ctx)?;
    let _span = ctx.span(Stage::Detect).entered();

    let mut raw = RawPoint::new(&args.metric, args.value);
    raw.source = args.source.clone();
    raw.timestamp = args.timestamp.clone().map(RawTimestamp::Text);
    raw.kind = args.kind;

    let outcome = engine.process(raw, Utc::now())?;
    emit(
        global,
        "detect",
        &outcome,
        || match &outcome {
            DetectionOutcome::Learning {
                series,
                observations,
            } => format!("{}: learning ({} observations)", series, observations),
            DetectionOutcome::Normal { series, score, .. } => {
                format!("{}: normal (score {:.3})", series, score)
            }
            DetectionOutcome::Anomalous(record) => anomaly_line(record),
        },
        || match &outcome {
            DetectionOutcome::Anomalous(record) => {
                anomalies_markdown("Detection", std::slice::from_ref(&**record))
            }
            other => format!("# Detection\n\n{}: {}\n", other.series(), outcome_label(other)),
        },
    )?;
    Ok(anomalies_exit(outcome.is_anomalous()))
}

fn outcome_label(outcome: &DetectionOutcome) -> &'static str {
    match outcome {
        DetectionOutcome::Learning { .. } => "learning",
        DetectionOutcome::Normal { .. } => "normal",
        DetectionOutcome::Anomalous(_) => "anomalous",
    }
}

fn run_baseline(global: &GlobalOpts, ctx: &LogContext, args: &BaselineArgs) -> Result<ExitCode> {
    let (mut engine, _) = open_engine(global, ctx)?;
    let _span = ctx.span(Stage::Baseline).entered();
    let now = Utc::now();

    match &args.command {
        BaselineCommands::Refresh { series } => {
            let refreshed = engine.refresh_baselines(series.as_ref(), now)?;
            let payload = serde_json::json!({
                "series": series.as_ref().map(|s| s.to_string()),
                "refreshed": refreshed,
            });
            emit(
                global,
                "baseline refresh",
                &payload,
                || format!("baseline refresh: {}", refreshed),
                || format!("# Baseline refresh\n\nRefreshed: {}\n", refreshed),
            )?;
        }
        BaselineCommands::Show { series } => {
            let baselines = engine.baselines(series.as_ref())?;
            let payload: Vec<_> = baselines
                .iter()
                .map(|(s, b)| serde_json::json!({ "series": s, "baseline": b }))
                .collect();
            emit(
                global,
                "baseline show",
                &payload,
                || format!("baseline show: {} baselines", baselines.len()),
                || {
                    let mut md = String::from("# Baselines\n\n");
                    md.push_str("| Series | Window | n | Mean | Std | Median | P95 | Seasonality |\n");
                    md.push_str("|---|---|---|---|---|---|---|---|\n");
                    for (s, b) in &baselines {
                        let pattern = b
                            .seasonal
                            .as_ref()
                            .map(|p| format!("{:?}", p.pattern))
                            .unwrap_or_default();
                        md.push_str(&format!(
                            "| {} | {} | {} | {:.3} | {:.3} | {:.3} | {:.3} | {} |\n",
                            s,
                            b.window,
                            b.n,
                            b.mean,
                            b.std_dev,
                            b.median,
                            b.p95(),
                            pattern
                        ));
                    }
                    md
                },
            )?;
        }
        BaselineCommands::Export { output, origin } => {
            let json = engine.export_baselines(origin, now)?;
            match output {
                Some(path) => {
                    std::fs::write(path, &json)?;
                    let payload = serde_json::json!({ "path": path, "bytes": json.len() });
                    emit(
                        global,
                        "baseline export",
                        &payload,
                        || format!("baseline export: {}", path.display()),
                        || format!("# Baseline export\n\nWritten to {}\n", path.display()),
                    )?;
                }
                None => println!("{}", json),
            }
        }
        BaselineCommands::Import { file } => {
            let json = std::fs::read_to_string(file)?;
            let imported = engine.import_baselines(&json, now)?;
            let payload = serde_json::json!({ "file": file, "imported": imported });
            emit(
                global,
                "baseline import",
                &payload,
                || format!("baseline import: {} baselines", imported),
                || format!("# Baseline import\n\nImported: {}\n", imported),
            )?;
        }
        BaselineCommands::Reset { series } => {
            let removed = engine.reset_baselines(series.as_ref(), now)?;
            let payload = serde_json::json!({
                "series": series.as_ref().map(|s| s.to_string()),
                "removed": removed,
            });
            emit(
                global,
                "baseline reset",
                &payload,
                || format!("baseline reset: {} removed", removed),
                || format!("# Baseline reset\n\nRemoved: {}\n", removed),
            )?;
        }
    }
    Ok(ExitCode::Clean)
}

fn train_line(outcome: &TrainOutcome) -> String {
    match outcome {
        TrainOutcome::Trained {
            kind,
            n_samples,
            supervised,
            n_labeled,
        } => format!(
            "{}: trained on {} samples{}",
            kind,
            n_samples,
            if *supervised {
                format!(" (+ supervised, {} labels)", n_labeled)
            } else {
                String::new()
            }
        ),
        TrainOutcome::Skipped { kind, reason } => format!("{}: skipped ({})", kind, reason),
    }
}

fn run_train(global: &GlobalOpts, ctx: &LogContext, args: &TrainArgs) -> Result<ExitCode> {
    let (mut engine, _) = open_engine(global, ctx)?;
    let _span = ctx.span(Stage::Train).entered();
    let outcomes = engine.train(args.kind, Utc::now())?;
    emit(
        global,
        "train",
        &outcomes,
        || outcomes.iter().map(train_line).collect::<Vec<_>>().join("; "),
        || {
            let mut md = String::from("# Training\n\n");
            for o in &outcomes {
                md.push_str(&format!("- {}\n", train_line(o)));
            }
            md
        },
    )?;
    Ok(ExitCode::Clean)
}

fn parse_anomaly_id(id: &str) -> Result<AnomalyId> {
    AnomalyId::parse(id).ok_or_else(|| Error::AnomalyNotFound { id: id.to_string() })
}

fn run_anomalies(global: &GlobalOpts, ctx: &LogContext, args: &AnomaliesArgs) -> Result<ExitCode> {
    let (engine, _) = open_engine(global, ctx)?;
    match &args.command {
        AnomaliesCommands::List {
            since,
            severity,
            metric,
            source,
            kind,
            unlabeled,
            limit,
        } => {
            let filter = AnomalyFilter {
                since: since.as_deref().map(parse_since).transpose()?,
                severity: *severity,
                metric: metric.clone(),
                source: source.clone(),
                kind: *kind,
                unlabeled_only: *unlabeled,
                limit: Some(*limit),
            };
            let records = engine.list_anomalies(&filter)?;
            if global.format == OutputFormat::Jsonl {
                let mut stdout = std::io::stdout().lock();
                for r in &records {
                    writeln!(stdout, "{}", serde_json::to_string(r)?)?;
                }
            } else {
                emit(
                    global,
                    "anomalies list",
                    &records,
                    || {
                        if records.is_empty() {
                            "anomalies: none".to_string()
                        } else {
                            records.iter().map(anomaly_line).collect::<Vec<_>>().join("\n")
                        }
                    },
                    || anomalies_markdown("Anomalies", &records),
                )?;
            }
            Ok(anomalies_exit(!records.is_empty()))
        }
        AnomaliesCommands::Show { id } => {
            let record = engine.get_anomaly(&parse_anomaly_id(id)?)?;
            emit(
                global,
                "anomalies show",
                &record,
                || anomaly_line(&record),
                || anomalies_markdown("Anomaly", std::slice::from_ref(&record)),
            )?;
            Ok(ExitCode::Clean)
        }
        AnomaliesCommands::Label {
            id,
            confirmed,
            false_positive: _,
        } => {
            let record = engine.label_anomaly(&parse_anomaly_id(id)?, *confirmed)?;
            let label = if *confirmed { "confirmed" } else { "false positive" };
            emit(
                global,
                "anomalies label",
                &record,
                || format!("{}: {}", record.id, label),
                || format!("# Anomaly {}\n\nLabeled {}\n", record.id, label),
            )?;
            Ok(ExitCode::Clean)
        }
    }
}

fn run_watch(global: &GlobalOpts, ctx: &LogContext) -> Result<ExitCode> {
    let (mut engine, loaded) = open_engine(global, ctx)?;
    let _span = ctx.span(Stage::Monitor).entered();
    let settings = loaded.config.monitor.clone();
    let mut state = MonitorState::new(&settings, Utc::now());
    log_event!(
        ctx,
        INFO,
        event_names::RUN_STARTED,
        Stage::Monitor,
        "watching stdin",
        tick_interval_secs = settings.tick_interval_secs
    );

    // Lines arrive over a channel so ticks keep running while stdin is idle.
    let (tx, rx) = mpsc::channel::<std::io::Result<String>>();
    thread::Builder::new()
        .name("dw-stdin".to_string())
        .spawn(move || {
            for line in std::io::stdin().lock().lines() {
                if tx.send(line).is_err() {
                    break;
                }
            }
        })?;

    let mut stdout = std::io::stdout().lock();
    let mut line_no = 0usize;
    loop {
        match rx.recv_timeout(state.time_until_tick(&settings, Utc::now())) {
            Ok(line) => {
                let line = line?;
                line_no += 1;
                let now = Utc::now();
                if !is_skippable(&line) {
                    let result = parse_numbered_line(&line, line_no).and_then(|raw| engine.process(raw, now));
                    match result {
                        Ok(outcome) => {
                            if let Some(record) = outcome.anomaly() {
                                writeln!(stdout, "{}", serde_json::to_string(record)?)?;
                                stdout.flush()?;
                            }
                            state.record_outcome(&outcome, now);
                        }
                        Err(e) if e.category() == dw_common::ErrorCategory::Ingestion => {
                            tracing::warn!(target: event_names::INGEST_REJECTED, line = line_no, reason = %e);
                            state.record_rejection(&e.to_string(), now);
                        }
                        Err(e) => return Err(e),
                    }
                }
            }
            Err(RecvTimeoutError::Timeout) => {}
            Err(RecvTimeoutError::Disconnected) => break,
        }

        let now = Utc::now();
        if state.tick_due(&settings, now) {
            let outcome = process_tick(&mut state, &mut engine, now);
            if let Some(err) = outcome.error {
                tracing::warn!(target: event_names::MONITOR_TICK, tick = outcome.tick_number, error = %err);
            }
        }
    }

    state.stop(Utc::now());
    Ok(anomalies_exit(state.anomalies > 0))
}

fn run_maintain(global: &GlobalOpts, ctx: &LogContext) -> Result<ExitCode> {
    let (mut engine, _) = open_engine(global, ctx)?;
    let report = engine.maintenance(Utc::now())?;
    emit(
        global,
        "maintain",
        &report,
        || {
            format!(
                "maintain: {} points pruned, {} series refreshed, {} models trained",
                report.points_pruned,
                report.baselines_refreshed,
                report.models_trained()
            )
        },
        || {
            let mut md = format!(
                "# Maintenance\n\nPoints pruned: {}\nSeries refreshed: {}\n\n## Models\n\n",
                report.points_pruned, report.baselines_refreshed
            );
            for m in &report.models {
                md.push_str(&format!("- {}\n", train_line(m)));
            }
            md
        },
    )?;
    Ok(ExitCode::Clean)
}

fn run_stats(global: &GlobalOpts, ctx: &LogContext) -> Result<ExitCode> {
    let (engine, _) = open_engine(global, ctx)?;
    let stats = engine.stats()?;
    let path = engine
        .store()
        .path()
        .map(|p| p.display().to_string())
        .unwrap_or_else(|| ":memory:".to_string());
    emit(
        global,
        "stats",
        &stats,
        || {
            format!(
                "stats: {} points in {} series, {} baselines, {} anomalies ({} labeled), {} models",
                stats.store.points,
                stats.store.series,
                stats.store.baselines,
                stats.store.anomalies,
                stats.store.labeled_anomalies,
                stats.store.models
            )
        },
        || {
            let mut md = format!(
                "# Store\n\nDatabase: {}\n\n| Item | Count |\n|---|---|\n| Points | {} |\n| Series | {} |\n| Baselines | {} |\n| Anomalies | {} |\n| Labeled | {} |\n| Models | {} |\n",
                path,
                stats.store.points,
                stats.store.series,
                stats.store.baselines,
                stats.store.anomalies,
                stats.store.labeled_anomalies,
                stats.store.models
            );
            for m in &stats.models {
                md.push_str(&format!(
                    "\n- {} {}: {} samples, trained {}",
                    m.kind,
                    m.model_type,
                    m.n_samples,
                    m.trained_at.to_rfc3339()
                ));
            }
            md.push('\n');
            md
        },
    )?;
    Ok(ExitCode::Clean)
}

fn run_config(global: &GlobalOpts, args: &ConfigArgs) -> Result<ExitCode> {
    match &args.command {
        ConfigCommands::Show => {
            let loaded = load_configuration(global)?;
            let source = loaded
                .path
                .path
                .as_ref()
                .map(|p| p.display().to_string())
                .unwrap_or_else(|| "built-in defaults".to_string());
            let payload = serde_json::json!({
                "snapshot": &loaded.snapshot,
                "config": &loaded.config,
            });
            emit(
                global,
                "config show",
                &payload,
                || {
                    format!(
                        "config: {} ({}) hash {}",
                        source,
                        loaded.path.source.as_str(),
                        loaded.snapshot.short_id()
                    )
                },
                || {
                    format!(
                        "# Configuration\n\nSource: {} ({})\nEffective hash: {}\n\n```json\n{}\n```\n",
                        source,
                        loaded.path.source.as_str(),
                        loaded.snapshot.effective_hash,
                        loaded.config.to_json_pretty().unwrap_or_default()
                    )
                },
            )?;
        }
        ConfigCommands::Validate { path } => {
            let checked = match path {
                Some(p) => {
                    load_config_file(p)?;
                    p.display().to_string()
                }
                None => {
                    let loaded = load_configuration(global)?;
                    loaded
                        .path
                        .path
                        .map(|p| p.display().to_string())
                        .unwrap_or_else(|| "built-in defaults".to_string())
                }
            };
            let payload = serde_json::json!({ "status": "valid", "path": checked });
            emit(
                global,
                "config validate",
                &payload,
                || format!("config validate: OK ({})", checked),
                || format!("# Configuration Validation\n\nStatus: valid\nFile: {}\n", checked),
            )?;
        }
        ConfigCommands::Presets => {
            let presets = list_presets();
            emit(
                global,
                "config presets",
                &presets,
                || {
                    presets
                        .iter()
                        .map(|p| p.name.as_str())
                        .collect::<Vec<_>>()
                        .join(", ")
                },
                || {
                    let mut md = String::from("# Presets\n\n");
                    for p in &presets {
                        md.push_str(&format!("- **{}**: {}\n", p.name, p.description));
                    }
                    md
                },
            )?;
        }
    }
    Ok(ExitCode::Clean)
}

fn print_version(global: &GlobalOpts) {
    let version_info = serde_json::json!({
        "schema_version": SCHEMA_VERSION,
        "config_schema_version": CONFIG_SCHEMA_VERSION,
        "dw_core_version": env!("CARGO_PKG_VERSION"),
        "rust_version": env!("CARGO_PKG_RUST_VERSION"),
    });

    match global.format {
        OutputFormat::Json => match serde_json::to_string_pretty(&version_info) {
            Ok(text) => println!("{}", text),
            Err(_) => println!("{}", version_info),
        },
        OutputFormat::Jsonl => println!("{}", version_info),
        _ => {
            println!("dw-core {}", env!("CARGO_PKG_VERSION"));
            println!("schema version: {}", SCHEMA_VERSION);
        }
    }
}
