//! `courier run` / `courier validate`: config-driven local reconciliation.

use std::fs::File;
use std::io::{BufWriter, Write};
use std::path::{Path, PathBuf};

use courier_recon::feed::{parse_feed, FeedFormat};
use courier_recon::model::{FeedKind, RawRecord, ReconResult, Severity};
use courier_recon::{ReconConfig, ReconInput};
use serde::Serialize;
use tracing::{info, warn};

use crate::exit_codes::{EXIT_CONFIG, EXIT_IO, EXIT_QUALITY_GATE, EXIT_USAGE};
use crate::{logging, CliError};

pub const UNIFIED_FILE: &str = "unified_messages.jsonl";
pub const DUPLICATES_FILE: &str = "duplicates.jsonl";
pub const GROUPS_FILE: &str = "duplicate_groups.jsonl";
pub const REJECTIONS_FILE: &str = "rejections.jsonl";
pub const REPORT_FILE: &str = "quality_report.json";

pub struct RunArgs<'a> {
    pub config: PathBuf,
    pub messages: Option<PathBuf>,
    pub statuses: Option<PathBuf>,
    pub out_dir: Option<PathBuf>,
    pub json: bool,
    pub strict: bool,
    pub log_level: Option<&'a str>,
}

pub fn cmd_run(args: RunArgs<'_>) -> Result<(), CliError> {
    let config = load_config(&args.config)?;
    logging::init(args.log_level, config.logging.level.as_deref());

    // Config-relative paths resolve against the config file's directory.
    let base_dir = args
        .config
        .parent()
        .unwrap_or_else(|| Path::new("."))
        .to_path_buf();
    let from_config = |p: &Option<String>| p.as_ref().map(|p| base_dir.join(p));

    let messages_path = args
        .messages
        .or_else(|| from_config(&config.inputs.messages))
        .ok_or_else(|| {
            CliError::new(EXIT_USAGE, "no messages feed configured")
                .with_hint("set [inputs] messages in the config or pass --messages <PATH>")
        })?;
    let statuses_path = args.statuses.or_else(|| from_config(&config.inputs.statuses));

    let messages = load_feed(FeedKind::Messages, &messages_path)?;
    let statuses = match statuses_path {
        Some(path) => load_feed(FeedKind::Statuses, &path)?,
        None => {
            warn!("no statuses feed configured; every message resolves to unknown");
            Vec::new()
        }
    };

    let result = courier_recon::run(&config, &ReconInput { messages, statuses })?;

    let out_dir = args
        .out_dir
        .unwrap_or_else(|| base_dir.join(&config.output.dir));
    write_outputs(&out_dir, &result)?;
    info!(dir = %out_dir.display(), "outputs written");

    if args.json {
        let json = serde_json::to_string_pretty(&result.report)
            .map_err(|e| CliError::new(EXIT_IO, format!("JSON serialization error: {e}")))?;
        println!("{json}");
    }

    print_summary(&result, &out_dir);

    if args.strict && result.report.has_errors() {
        return Err(CliError::new(EXIT_QUALITY_GATE, "quality gate failed")
            .with_hint("see the `error` checks in quality_report.json"));
    }
    Ok(())
}

pub fn cmd_validate(config_path: PathBuf, log_level: Option<&str>) -> Result<(), CliError> {
    let config = load_config(&config_path)?;
    logging::init(log_level, config.logging.level.as_deref());

    eprintln!(
        "config '{}' ok: window {}s, likely >= {}, possible >= {}, {} accepted statuses",
        config.name,
        config.duplicates.window_secs,
        config.duplicates.likely_threshold,
        config.duplicates.possible_threshold,
        config.statuses.accepted.len(),
    );
    Ok(())
}

fn load_config(path: &Path) -> Result<ReconConfig, CliError> {
    let text = std::fs::read_to_string(path).map_err(|e| {
        CliError::new(EXIT_IO, format!("cannot read config {}: {e}", path.display()))
    })?;
    ReconConfig::from_toml(&text).map_err(|e| CliError::new(EXIT_CONFIG, e.to_string()))
}

fn load_feed(kind: FeedKind, path: &Path) -> Result<Vec<RawRecord>, CliError> {
    let format = path
        .extension()
        .and_then(|e| e.to_str())
        .and_then(FeedFormat::from_extension)
        .ok_or_else(|| {
            CliError::new(EXIT_USAGE, format!("cannot tell the format of {}", path.display()))
                .with_hint("use a .csv, .json, .jsonl or .ndjson file")
        })?;
    let data = std::fs::read_to_string(path)
        .map_err(|e| CliError::new(EXIT_IO, format!("cannot read {}: {e}", path.display())))?;
    let records = parse_feed(kind, format, &data)?;
    info!(feed = %kind, path = %path.display(), records = records.len(), "feed loaded");
    Ok(records)
}

// ---------------------------------------------------------------------------
// Outputs
// ---------------------------------------------------------------------------

fn write_outputs(dir: &Path, result: &ReconResult) -> Result<(), CliError> {
    std::fs::create_dir_all(dir).map_err(|e| io_err(dir, e))?;

    write_jsonl(&dir.join(UNIFIED_FILE), &result.unified)?;
    write_jsonl(&dir.join(DUPLICATES_FILE), &result.duplicates)?;
    write_jsonl(&dir.join(GROUPS_FILE), &result.duplicate_groups)?;
    write_jsonl(&dir.join(REJECTIONS_FILE), &result.rejections)?;

    #[derive(Serialize)]
    struct ReportFile<'a> {
        meta: &'a courier_recon::model::ReconMeta,
        #[serde(flatten)]
        report: &'a courier_recon::model::QualityReport,
    }
    let path = dir.join(REPORT_FILE);
    let json = serde_json::to_string_pretty(&ReportFile {
        meta: &result.meta,
        report: &result.report,
    })
    .map_err(|e| CliError::new(EXIT_IO, format!("JSON serialization error: {e}")))?;
    std::fs::write(&path, json).map_err(|e| io_err(&path, e))
}

fn write_jsonl<T: Serialize>(path: &Path, rows: &[T]) -> Result<(), CliError> {
    let file = File::create(path).map_err(|e| io_err(path, e))?;
    let mut out = BufWriter::new(file);
    for row in rows {
        serde_json::to_writer(&mut out, row)
            .map_err(|e| CliError::new(EXIT_IO, format!("cannot write {}: {e}", path.display())))?;
        out.write_all(b"\n").map_err(|e| io_err(path, e))?;
    }
    out.flush().map_err(|e| io_err(path, e))
}

fn io_err(path: &Path, e: std::io::Error) -> CliError {
    CliError::new(EXIT_IO, format!("cannot write {}: {e}", path.display()))
}

// ---------------------------------------------------------------------------
// Human summary (stderr)
// ---------------------------------------------------------------------------

fn print_summary(result: &ReconResult, out_dir: &Path) {
    let r = &result.report;
    eprintln!(
        "messages: {} seen, {} valid, {} rejected",
        r.messages.total, r.messages.valid, r.messages.invalid,
    );
    eprintln!(
        "statuses: {} seen, {} valid, {} rejected, {} orphaned",
        r.statuses.total, r.statuses.valid, r.statuses.invalid, r.orphan_statuses,
    );
    eprintln!(
        "duplicates: {} pairs in {} groups ({} messages in exact duplicates)",
        r.duplicate_pairs, r.duplicate_groups, r.records_in_exact_duplicates,
    );
    for check in r.checks.iter().filter(|c| c.severity > Severity::Info) {
        eprintln!("  [{:?}] {}: {}", check.severity, check.check_name, check.value);
    }
    eprintln!("quality score: {:.4}", r.quality_score);
    eprintln!("wrote {}", out_dir.display());
}
