//! tokledger - cumulative token usage ledger
//!
//! Scans local JSONL session logs, keeps a cumulative total that survives
//! log deletion, and sums per-device exports toward a token goal.
//!
//! ## Usage
//!
//! ```bash
//! # Write a default config to ~/.tokledger/config.yaml
//! tokledger init
//!
//! # Merge new usage into the ledger (the default command)
//! tokledger scan
//!
//! # Scan, then write this device's export (run daily)
//! tokledger sync
//!
//! # Totals and goal progress across all devices
//! tokledger total
//! tokledger goal
//!
//! # What a scan would see, without writing anything
//! tokledger inspect
//! ```

use std::path::{Path, PathBuf};
use std::process::ExitCode;

use anyhow::{Context, bail};
use chrono::Utc;
use clap::{Parser, Subcommand};
use tokledger_config::Config;
use tokledger_core::{LedgerError, LogGuard, init_logging, paths};
use tokledger_usage::{
    DeviceExport, EventReader, FleetUsage, GoalProgress, LedgerStore,
    MergeResult, Pace, PeakSnapshot, Pricing, ScanStats, TokenCounts, aggregate_devices,
};
use tracing::{Level, error, info, warn};

/// Cumulative token usage ledger
///
/// Counts every usage record in your session logs exactly once, keeps the
/// totals after the logs are gone, and tracks progress toward a goal
/// across devices.
#[derive(Parser, Debug)]
#[command(name = "tokledger")]
#[command(author, version, about, long_about = None)]
struct Cli {
    /// Enable verbose logging (increases log level)
    #[arg(short, long, action = clap::ArgAction::Count)]
    verbose: u8,

    /// Directory for log files (defaults to ~/.tokledger/logs/)
    #[arg(long)]
    log_dir: Option<PathBuf>,

    /// Configuration file (defaults to ~/.tokledger/config.yaml)
    #[arg(long)]
    config: Option<PathBuf>,

    #[command(subcommand)]
    command: Option<Command>,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Write a default configuration file
    Init {
        /// Overwrite an existing configuration
        #[arg(long)]
        force: bool,
    },

    /// Merge new usage events into the ledger
    Scan,

    /// Write this device's usage export
    Export {
        /// Directory to write to (defaults to data_dir)
        #[arg(long)]
        output: Option<PathBuf>,
    },

    /// Scan, then export
    Sync,

    /// Show usage totals across all devices
    Total,

    /// Show progress toward the token goal across all devices
    Goal,

    /// Show what a scan would read, without changing the ledger
    Inspect,

    /// Rebuild the ledger from a trusted peak snapshot
    Reseed {
        /// YAML or JSON file with `as_of` and `usage`
        #[arg(long)]
        snapshot: PathBuf,
    },
}

fn main() -> ExitCode {
    let cli = Cli::parse();

    // Initialize logging
    let _guard = match setup_logging(&cli) {
        Ok(guard) => guard,
        Err(e) => {
            eprintln!("Failed to initialize logging: {}", e);
            return ExitCode::from(1);
        }
    };

    match run(&cli) {
        Ok(()) => ExitCode::SUCCESS,
        Err(e) => {
            report_failure(&e);
            ExitCode::from(1)
        }
    }
}

/// Log level for a failed command.
///
/// Missing config or data is something the user fixes, so it only warns.
fn failure_level(e: &anyhow::Error) -> Level {
    match e.downcast_ref::<LedgerError>() {
        Some(err) if err.is_fatal() => Level::ERROR,
        Some(err) if err.is_config_error() || err.is_missing_data() => Level::WARN,
        _ => Level::ERROR,
    }
}

fn report_failure(e: &anyhow::Error) {
    let message = format!("{e:#}");
    let ledger_error = e.downcast_ref::<LedgerError>();
    if failure_level(e) == Level::WARN {
        warn!(error = %message, "command could not run");
    } else if ledger_error.is_some_and(LedgerError::is_fatal) {
        error!(error = %message, "ledger needs manual attention");
    } else {
        error!(error = %message, "command failed");
    }

    eprintln!("Error: {message}");
    if let Some(hint) = ledger_error.and_then(LedgerError::guidance) {
        eprintln!("Hint: {hint}");
    }
}

/// Set up logging based on CLI arguments.
fn setup_logging(cli: &Cli) -> tokledger_core::Result<LogGuard> {
    init_logging(cli.log_dir.clone(), cli.verbose > 0)
}

fn config_path(cli: &Cli) -> anyhow::Result<PathBuf> {
    match &cli.config {
        Some(path) => Ok(paths::expand_tilde(path)),
        None => Ok(paths::default_config_path()?),
    }
}

fn run(cli: &Cli) -> anyhow::Result<()> {
    let path = config_path(cli)?;
    let default = Command::Scan;
    let command = cli.command.as_ref().unwrap_or(&default);

    // Fleet reports need a real goal; local commands run on defaults.
    match command {
        Command::Init { force } => cmd_init(&path, *force),
        Command::Total => cmd_total(&Config::load(&path)?),
        Command::Goal => cmd_goal(&Config::load(&path)?),
        Command::Scan => cmd_scan(&Config::load_or_default(&path)?).map(|_| ()),
        Command::Export { output } => {
            cmd_export(&Config::load_or_default(&path)?, output.as_deref())
        }
        Command::Sync => {
            let config = Config::load_or_default(&path)?;
            cmd_scan(&config)?;
            cmd_export(&config, None)
        }
        Command::Inspect => cmd_inspect(&Config::load_or_default(&path)?),
        Command::Reseed { snapshot } => cmd_reseed(&Config::load_or_default(&path)?, snapshot),
    }
}

fn store_for(config: &Config) -> LedgerStore {
    LedgerStore::new(config.ledger_path(), config.period_start).with_history_limit(config.history_limit)
}

fn reader_for(config: &Config) -> EventReader {
    EventReader::new(config.projects_dir(), config.period_start_utc())
}

fn cmd_init(path: &Path, force: bool) -> anyhow::Result<()> {
    if path.exists() && !force {
        bail!(
            "configuration already exists at {} (use --force to overwrite)",
            path.display()
        );
    }

    let defaults = Config::default();
    let config = Config {
        device_id: Some(defaults.device_id()),
        ..defaults
    };
    config.save(path)?;

    info!(path = %path.display(), "wrote configuration");
    println!("Wrote configuration to {}", path.display());
    Ok(())
}

fn cmd_scan(config: &Config) -> anyhow::Result<MergeResult> {
    let reader = reader_for(config);
    let store = store_for(config);

    info!(root = %reader.root().display(), ledger = %store.path().display(), "scan started");
    let mut events = reader.events();
    let result = store
        .merge(events.by_ref())
        .with_context(|| format!("merging usage into {}", store.path().display()))?;
    let stats = events.stats();

    println!("Scanned {} log files ({} usage events)", stats.files, stats.events);
    println!();
    println!("This run:");
    println!("  New sessions:       {}", fmt_count(result.new_sessions));
    println!("  Already counted:    {}", fmt_count(result.duplicates));
    print_tokens("  ", &result.new_tokens);
    println!();
    println!("Cumulative since {}:", config.period_start);
    println!("  Sessions:           {}", fmt_count(result.cumulative.total_sessions));
    print_tokens("  ", &result.cumulative.tokens);
    println!(
        "  Estimated cost:     ${:.2}",
        Pricing::default().estimate(&result.cumulative.tokens).total
    );

    Ok(result)
}

fn cmd_export(config: &Config, output: Option<&Path>) -> anyhow::Result<()> {
    let ledger = store_for(config).load()?;
    let export = DeviceExport::from_ledger(&ledger, &config.device_id(), &Pricing::default(), Utc::now());

    let dir = output.map(paths::expand_tilde).unwrap_or_else(|| config.data_dir());
    let path = export.write_to(&dir)?;

    println!("Exported {} to {}", export.device_id, path.display());
    println!(
        "  Processed tokens:   {}",
        fmt_count(export.usage.tokens.processed())
    );
    println!("  Estimated cost:     ${:.2}", export.estimated_cost);
    Ok(())
}

fn cmd_total(config: &Config) -> anyhow::Result<()> {
    let fleet = aggregate_devices(&config.data_dir())?;

    println!("Usage across {} devices", fleet.devices.len());
    println!();
    println!(
        "{:<24} {:>16} {:>10} {:>10}  {}",
        "DEVICE", "PROCESSED", "SESSIONS", "COST", "UPDATED"
    );
    for device in &fleet.devices {
        let updated = device
            .last_updated
            .map(|t| t.format("%Y-%m-%d %H:%M").to_string())
            .unwrap_or_else(|| "unknown".to_string());
        println!(
            "{:<24} {:>16} {:>10} {:>10}  {}",
            device.device_id,
            fmt_count(device.usage.tokens.processed()),
            fmt_count(device.usage.total_sessions),
            format!("${:.2}", device.estimated_cost),
            updated
        );
    }
    println!();
    println!("Combined:");
    println!("  Sessions:           {}", fmt_count(fleet.usage.total_sessions));
    print_tokens("  ", &fleet.usage.tokens);
    println!(
        "  Estimated cost:     ${:.2}",
        Pricing::default().estimate(&fleet.usage.tokens).total
    );

    let progress = goal_progress(config, &fleet);
    println!(
        "  Goal:               {:.1}% of {}",
        progress.percent,
        fmt_count(progress.goal)
    );
    print_skipped(&fleet);
    Ok(())
}

fn goal_progress(config: &Config, fleet: &FleetUsage) -> GoalProgress {
    GoalProgress::calculate(
        &fleet.usage,
        config.goal_tokens,
        config.period_start_utc(),
        config.deadline,
        Utc::now(),
    )
}

fn cmd_goal(config: &Config) -> anyhow::Result<()> {
    let fleet = aggregate_devices(&config.data_dir())?;
    let progress = goal_progress(config, &fleet);

    println!(
        "Goal: {} tokens by {}",
        fmt_count(progress.goal),
        config.deadline.format("%Y-%m-%d")
    );
    println!();
    println!("  Devices:            {}", fleet.devices.len());
    println!("  Sessions:           {}", fmt_count(fleet.usage.total_sessions));
    println!(
        "  Processed:          {} ({})",
        fmt_count(progress.processed),
        fmt_millions(progress.processed as f64)
    );
    println!();
    println!("  [{}] {:.1}%", progress.bar(50), progress.percent);
    println!(
        "  Remaining:          {} ({})",
        fmt_signed(progress.remaining),
        fmt_millions(progress.remaining as f64)
    );
    println!("  Days remaining:     {}", progress.days_remaining);

    match progress.pace() {
        Pace::DeadlinePassed { achieved: true } => {
            println!();
            println!("Deadline has passed. Goal achieved.");
        }
        Pace::DeadlinePassed { achieved: false } => {
            println!();
            println!(
                "Deadline has passed. Goal missed by {} tokens.",
                fmt_signed(progress.remaining)
            );
        }
        pace => {
            println!(
                "  Needed per day:     {} ({})",
                fmt_float(progress.daily_needed),
                fmt_millions(progress.daily_needed)
            );
            if let Pace::NoHistory = pace {
                println!();
                println!("Not enough history yet to project a pace.");
            } else {
                println!(
                    "  Daily average:      {} ({})",
                    fmt_float(progress.daily_average),
                    fmt_millions(progress.daily_average)
                );
                println!(
                    "  Projected total:    {} ({})",
                    fmt_float(progress.projected_total),
                    fmt_millions(progress.projected_total)
                );
                println!();
                match pace {
                    Pace::OnTrack { surplus } => {
                        println!("On track (+{} tokens)", fmt_float(surplus));
                    }
                    Pace::Behind {
                        deficit,
                        daily_increase,
                    } => {
                        println!("Behind pace (-{} tokens)", fmt_float(deficit));
                        println!(
                            "Increase daily usage by {} tokens",
                            fmt_float(daily_increase)
                        );
                    }
                    _ => {}
                }
            }
        }
    }

    print_skipped(&fleet);
    Ok(())
}

fn cmd_inspect(config: &Config) -> anyhow::Result<()> {
    let reader = reader_for(config);
    let store = store_for(config);
    let ledger = store.load()?;

    let mut events = reader.events();
    let mut pending = 0u64;
    let mut pending_tokens = TokenCounts::default();
    for event in events.by_ref() {
        if !ledger.contains(&event.identity()) {
            pending += 1;
            pending_tokens.add(&event.counts);
        }
    }
    let stats = events.into_stats();

    println!("Log root:  {}", reader.root().display());
    println!("Cutoff:    {}", reader.cutoff().format("%Y-%m-%d %H:%M:%S UTC"));
    println!();
    print_file_table(&stats);
    println!();
    print_skip_reasons(&stats);
    println!();
    println!("Ledger:    {}", store.path().display());
    println!(
        "  Counted sessions:   {}",
        fmt_count(ledger.processed_sessions.len() as u64)
    );
    if let Some(peak) = ledger.restored_from_peak {
        println!("  Restored from peak: {}", peak);
    }
    println!("  Not yet counted:    {}", fmt_count(pending));
    print_tokens("  ", &pending_tokens);
    Ok(())
}

fn print_file_table(stats: &ScanStats) {
    println!("{:<48} {:>8} {:>14}", "FILE", "EVENTS", "BEFORE CUTOFF");
    for file in &stats.per_file {
        if file.events == 0 && file.before_cutoff == 0 {
            continue;
        }
        println!(
            "{:<48} {:>8} {:>14}",
            file.file, file.events, file.before_cutoff
        );
    }
}

fn print_skip_reasons(stats: &ScanStats) {
    println!("Files:            {}", stats.files);
    println!("Unreadable files: {}", stats.unreadable_files);
    println!("Lines:            {}", stats.lines);
    println!("Usage events:     {}", stats.events);
    println!("Skipped:          {}", stats.skipped());
    println!("  malformed:      {}", stats.malformed);
    println!("  no timestamp:   {}", stats.no_timestamp);
    println!("  bad timestamp:  {}", stats.bad_timestamp);
    println!("  before cutoff:  {}", stats.before_cutoff);
    println!("  no usage:       {}", stats.no_usage);
}

fn cmd_reseed(config: &Config, snapshot_path: &Path) -> anyhow::Result<()> {
    let snapshot = PeakSnapshot::load(&paths::expand_tilde(snapshot_path))?;
    let store = store_for(config);

    let report = store
        .reseed(&snapshot, reader_for(config).events(), Utc::now())
        .with_context(|| format!("reseeding {}", store.path().display()))?;

    if let Some(backup) = &report.backup_path {
        println!("Backed up previous ledger to {}", backup.display());
    }
    println!("Restored ledger from peak of {}", report.peak_date);
    println!(
        "  Peak processed tokens:    {}",
        fmt_count(snapshot.usage.tokens.processed())
    );
    println!(
        "  Sessions marked counted:  {}",
        fmt_count(report.tally.marked_seen)
    );
    println!(
        "  Sessions after peak:      {}",
        fmt_count(report.tally.merged.new_sessions)
    );
    println!(
        "  Processed tokens now:     {}",
        fmt_count(report.tally.merged.cumulative.tokens.processed())
    );
    Ok(())
}

fn print_tokens(indent: &str, tokens: &TokenCounts) {
    println!("{indent}Input tokens:       {}", fmt_count(tokens.input_tokens));
    println!("{indent}Output tokens:      {}", fmt_count(tokens.output_tokens));
    println!("{indent}Cache write tokens: {}", fmt_count(tokens.cache_creation_tokens));
    println!("{indent}Cache read tokens:  {}", fmt_count(tokens.cache_read_tokens));
    println!("{indent}Processed tokens:   {}", fmt_count(tokens.processed()));
}

fn print_skipped(fleet: &FleetUsage) {
    if fleet.skipped.is_empty() {
        return;
    }
    eprintln!();
    for skipped in &fleet.skipped {
        eprintln!("Skipped {}: {}", skipped.path.display(), skipped.reason);
    }
}

/// `1234567` -> `1,234,567`
fn fmt_count(n: u64) -> String {
    let digits = n.to_string();
    let mut out = String::with_capacity(digits.len() + digits.len() / 3);
    for (i, c) in digits.chars().enumerate() {
        if i > 0 && (digits.len() - i) % 3 == 0 {
            out.push(',');
        }
        out.push(c);
    }
    out
}

fn fmt_signed(n: i64) -> String {
    if n < 0 {
        format!("-{}", fmt_count(n.unsigned_abs()))
    } else {
        fmt_count(n as u64)
    }
}

fn fmt_float(x: f64) -> String {
    fmt_signed(x.round() as i64)
}

fn fmt_millions(x: f64) -> String {
    format!("{:.2}M", x / 1_000_000.0)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_fmt_count() {
        assert_eq!(fmt_count(0), "0");
        assert_eq!(fmt_count(999), "999");
        assert_eq!(fmt_count(1000), "1,000");
        assert_eq!(fmt_count(1_234_567), "1,234,567");
    }

    #[test]
    fn test_fmt_signed_and_float() {
        assert_eq!(fmt_signed(-60_000_000), "-60,000,000");
        assert_eq!(fmt_float(666_666.67), "666,667");
        assert_eq!(fmt_millions(2_000_000.0), "2.00M");
    }

    #[test]
    fn test_cli_defaults_to_scan() {
        let cli = Cli::parse_from(["tokledger"]);
        assert!(cli.command.is_none());

        let cli = Cli::parse_from(["tokledger", "-v", "reseed", "--snapshot", "peak.yaml"]);
        assert_eq!(cli.verbose, 1);
        assert!(matches!(cli.command, Some(Command::Reseed { .. })));
    }

    #[test]
    fn test_failure_level_by_error_kind() {
        let missing = anyhow::Error::new(LedgerError::NoUsageData {
            path: PathBuf::from("/data"),
        });
        assert_eq!(failure_level(&missing), Level::WARN);

        let config = anyhow::Error::new(LedgerError::config_not_found("/etc/tokledger.yaml"))
            .context("loading configuration");
        assert_eq!(failure_level(&config), Level::WARN);

        let corrupt = anyhow::Error::new(LedgerError::ledger_corrupt("/ledger.json", "eof"));
        assert_eq!(failure_level(&corrupt), Level::ERROR);

        assert_eq!(failure_level(&anyhow::anyhow!("something else")), Level::ERROR);
    }

    #[test]
    fn test_inspect_without_ledger_leaves_none_behind() {
        let tmp = tempfile::tempdir().unwrap();
        let config = Config {
            projects_dir: tmp.path().join("projects"),
            ledger_path: tmp.path().join("ledger.json"),
            ..Config::default()
        };
        std::fs::create_dir_all(&config.projects_dir).unwrap();

        cmd_inspect(&config).unwrap();
        assert!(!config.ledger_path().exists());
    }

    #[test]
    fn test_scan_then_export_with_temp_config() {
        let tmp = tempfile::tempdir().unwrap();
        let logs = tmp.path().join("projects");
        std::fs::create_dir_all(&logs).unwrap();
        std::fs::write(
            logs.join("s.jsonl"),
            r#"{"timestamp":"2025-10-05T12:00:00Z","message":{"usage":{"input_tokens":10,"output_tokens":5}}}"#,
        )
        .unwrap();

        let config = Config {
            projects_dir: logs,
            ledger_path: tmp.path().join("ledger.json"),
            data_dir: tmp.path().join("data"),
            device_id: Some("Test Box".to_string()),
            ..Config::default()
        };

        let result = cmd_scan(&config).unwrap();
        assert_eq!(result.new_sessions, 1);

        cmd_export(&config, None).unwrap();
        let export: serde_json::Value = serde_json::from_str(
            &std::fs::read_to_string(tmp.path().join("data").join("test-box.json")).unwrap(),
        )
        .unwrap();
        assert_eq!(export["usage"]["input_tokens"], 10);

        let fleet = aggregate_devices(&config.data_dir()).unwrap();
        assert_eq!(fleet.usage.total_sessions, 1);
    }
}
