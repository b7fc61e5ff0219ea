//! Cumulative ledger.
//!
//! The ledger is the durable record of every usage event ever counted. Each
//! accepted event is remembered by its identity in `processed_sessions`, so
//! re-scanning the same logs is a no-op and logs deleted after a run leave
//! the totals untouched.
//!
//! [`CumulativeLedger`] is a plain value: [`LedgerStore`] loads it, the
//! caller folds events into it, and the store writes it back atomically.
//! Two processes merging into the same file at once is not supported.

use std::collections::BTreeMap;
use std::path::{Path, PathBuf};

use chrono::{DateTime, NaiveDate, NaiveTime, Utc};
use serde::{Deserialize, Serialize};
use tokledger_core::fs::write_json_atomic;
use tokledger_core::{LedgerError, Result, log_ledger_event};
use tracing::{debug, warn};

use crate::models::{CumulativeUsage, RunRecord, SessionRecord, TokenCounts, UsageEvent};

/// Number of run summaries kept unless configured otherwise.
pub const DEFAULT_HISTORY_LIMIT: usize = 100;

/// History action recorded by a peak reseed.
pub const RESTORED_FROM_PEAK: &str = "restored_from_peak";

/// The persisted cumulative aggregate.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CumulativeLedger {
    pub created_at: DateTime<Utc>,

    pub last_updated: DateTime<Utc>,

    /// First day counted, fixed when the ledger is created
    pub period_start: NaiveDate,

    /// Snapshot date if the totals were reseeded from a known peak
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub restored_from_peak: Option<NaiveDate>,

    #[serde(default)]
    pub cumulative_usage: CumulativeUsage,

    /// Every identity ever accepted. Never pruned.
    #[serde(default)]
    pub processed_sessions: BTreeMap<String, SessionRecord>,

    /// Most recent run summaries, oldest first
    #[serde(default)]
    pub run_history: Vec<RunRecord>,
}

/// Outcome of folding one batch of events into the ledger.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct MergeResult {
    /// Events counted for the first time
    pub new_sessions: u64,

    /// Tokens from those events
    pub new_tokens: TokenCounts,

    /// Events already present in the ledger
    pub duplicates: u64,

    /// Events dated before the period start
    pub before_period: u64,

    /// Ledger totals after the merge
    pub cumulative: CumulativeUsage,
}

impl CumulativeLedger {
    /// An empty ledger counting from `period_start`.
    pub fn new(period_start: NaiveDate, now: DateTime<Utc>) -> Self {
        Self {
            created_at: now,
            last_updated: now,
            period_start,
            restored_from_peak: None,
            cumulative_usage: CumulativeUsage::default(),
            processed_sessions: BTreeMap::new(),
            run_history: Vec::new(),
        }
    }

    /// Period start as an instant (00:00 UTC).
    pub fn period_start_utc(&self) -> DateTime<Utc> {
        self.period_start.and_time(NaiveTime::MIN).and_utc()
    }

    /// Whether an event with this identity has already been counted.
    pub fn contains(&self, identity: &str) -> bool {
        self.processed_sessions.contains_key(identity)
    }

    /// Fold `events` into the ledger and record the run in the history.
    ///
    /// Events before the period start and events already present are
    /// ignored. Applying the same events twice changes nothing but the
    /// history.
    pub fn merge_events<I>(&mut self, events: I, history_limit: usize, now: DateTime<Utc>) -> MergeResult
    where
        I: IntoIterator<Item = UsageEvent>,
    {
        let mut result = MergeResult::default();
        let period_start = self.period_start_utc();

        for event in events {
            if event.timestamp < period_start {
                result.before_period += 1;
                continue;
            }
            self.accept(event, &mut result);
        }

        self.cumulative_usage
            .add(&CumulativeUsage::new(result.new_tokens, result.new_sessions));
        result.cumulative = self.cumulative_usage;

        self.push_history(
            RunRecord::merge(now, result.new_sessions, result.new_tokens),
            history_limit,
        );
        self.last_updated = now;

        result
    }

    /// Record an in-period event as new or duplicate.
    fn accept(&mut self, event: UsageEvent, result: &mut MergeResult) {
        let identity = event.identity();
        if self.processed_sessions.contains_key(&identity) {
            result.duplicates += 1;
            return;
        }
        result.new_sessions += 1;
        result.new_tokens.add(&event.counts);
        self.processed_sessions.insert(identity, event.to_record());
    }

    fn push_history(&mut self, record: RunRecord, history_limit: usize) {
        self.run_history.push(record);
        if self.run_history.len() > history_limit {
            let excess = self.run_history.len() - history_limit;
            self.run_history.drain(..excess);
        }
    }

    /// Build a ledger seeded from a trusted peak snapshot.
    ///
    /// In-period events at or before `snapshot.as_of` are marked seen
    /// without being added, since the snapshot totals already include them.
    /// Later events are merged normally.
    pub fn reseeded<I>(
        period_start: NaiveDate,
        snapshot: &PeakSnapshot,
        events: I,
        history_limit: usize,
        now: DateTime<Utc>,
    ) -> (Self, ReseedTally)
    where
        I: IntoIterator<Item = UsageEvent>,
    {
        let mut ledger = Self::new(period_start, now);
        ledger.restored_from_peak = Some(snapshot.as_of.date_naive());
        ledger.cumulative_usage = snapshot.usage;

        let period_start = ledger.period_start_utc();
        let mut tally = ReseedTally::default();

        for event in events {
            if event.timestamp < period_start {
                tally.merged.before_period += 1;
            } else if event.timestamp <= snapshot.as_of {
                let identity = event.identity();
                if !ledger.processed_sessions.contains_key(&identity) {
                    ledger.processed_sessions.insert(identity, event.to_record());
                    tally.marked_seen += 1;
                }
            } else {
                ledger.accept(event, &mut tally.merged);
            }
        }

        let merged = &mut tally.merged;
        ledger
            .cumulative_usage
            .add(&CumulativeUsage::new(merged.new_tokens, merged.new_sessions));
        merged.cumulative = ledger.cumulative_usage;

        ledger.push_history(
            RunRecord {
                timestamp: now,
                action: Some(RESTORED_FROM_PEAK.to_string()),
                new_sessions: merged.new_sessions,
                new_tokens: merged.new_tokens,
                peak_date: ledger.restored_from_peak,
                peak_tokens: Some(snapshot.usage.tokens.processed()),
            },
            history_limit,
        );

        (ledger, tally)
    }
}

/// A trusted historical total used to reseed the ledger.
///
/// Read from YAML or JSON:
///
/// ```yaml
/// as_of: 2025-11-21T23:59:59Z
/// usage:
///   input_tokens: 1200000
///   output_tokens: 3400000
///   cache_creation_tokens: 45000000
///   cache_read_tokens: 610000000
///   total_sessions: 18000
/// ```
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct PeakSnapshot {
    /// Instant the totals were observed
    pub as_of: DateTime<Utc>,

    pub usage: CumulativeUsage,
}

impl PeakSnapshot {
    /// Load a snapshot file. JSON is accepted as a subset of YAML.
    pub fn load(path: &Path) -> Result<Self> {
        let content = std::fs::read_to_string(path)
            .map_err(|e| LedgerError::io("reading peak snapshot", path, e))?;

        let snapshot: PeakSnapshot =
            serde_yaml::from_str(&content).map_err(|e| LedgerError::SnapshotInvalid {
                path: path.to_path_buf(),
                message: e.to_string(),
            })?;

        if snapshot.usage.tokens.is_zero() {
            return Err(LedgerError::SnapshotInvalid {
                path: path.to_path_buf(),
                message: "snapshot carries no tokens".to_string(),
            });
        }

        Ok(snapshot)
    }
}

/// Counts from rebuilding a ledger around a peak snapshot.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct ReseedTally {
    /// Events at or before the peak recorded as already counted
    pub marked_seen: u64,

    /// Events after the peak, merged normally
    pub merged: MergeResult,
}

/// Outcome of [`LedgerStore::reseed`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ReseedReport {
    /// Copy of the ledger that was replaced, if there was one
    pub backup_path: Option<PathBuf>,

    pub peak_date: NaiveDate,

    pub tally: ReseedTally,
}

/// File-backed home of a [`CumulativeLedger`].
#[derive(Debug, Clone)]
pub struct LedgerStore {
    path: PathBuf,
    period_start: NaiveDate,
    history_limit: usize,
}

impl LedgerStore {
    /// Store at `path`; new ledgers count from `period_start`.
    pub fn new(path: impl Into<PathBuf>, period_start: NaiveDate) -> Self {
        Self {
            path: path.into(),
            period_start,
            history_limit: DEFAULT_HISTORY_LIMIT,
        }
    }

    /// Bound the run history to `limit` entries.
    pub fn with_history_limit(mut self, limit: usize) -> Self {
        self.history_limit = limit.max(1);
        self
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Load the ledger, or start an empty one if the file does not exist.
    ///
    /// A file that exists but does not decode is reported as
    /// [`LedgerError::LedgerCorrupt`] and left alone.
    pub fn load(&self) -> Result<CumulativeLedger> {
        if !self.path.exists() {
            debug!(path = %self.path.display(), "no ledger yet, starting empty");
            return Ok(CumulativeLedger::new(self.period_start, Utc::now()));
        }

        let content = std::fs::read_to_string(&self.path)
            .map_err(|e| LedgerError::io("reading ledger", &self.path, e))?;
        let ledger: CumulativeLedger = serde_json::from_str(&content)
            .map_err(|e| LedgerError::ledger_corrupt(&self.path, e.to_string()))?;

        debug!(
            path = %self.path.display(),
            sessions = ledger.processed_sessions.len(),
            "loaded ledger"
        );
        Ok(ledger)
    }

    /// Stamp `last_updated` with `now` and write the ledger atomically.
    pub fn save(&self, ledger: &mut CumulativeLedger, now: DateTime<Utc>) -> Result<()> {
        ledger.last_updated = now;
        write_json_atomic(&self.path, ledger)
    }

    /// Load, merge `events`, and persist.
    pub fn merge<I>(&self, events: I) -> Result<MergeResult>
    where
        I: IntoIterator<Item = UsageEvent>,
    {
        self.merge_at(events, Utc::now())
    }

    /// [`LedgerStore::merge`] with an explicit clock.
    pub fn merge_at<I>(&self, events: I, now: DateTime<Utc>) -> Result<MergeResult>
    where
        I: IntoIterator<Item = UsageEvent>,
    {
        let mut ledger = self.load()?;
        let result = ledger.merge_events(events, self.history_limit, now);
        self.save(&mut ledger, now)?;

        log_ledger_event!(
            "merge",
            new_sessions = result.new_sessions,
            new_tokens = result.new_tokens.processed(),
            duplicates = result.duplicates,
            before_period = result.before_period,
            total_sessions = result.cumulative.total_sessions
        );
        Ok(result)
    }

    /// Replace the ledger with one seeded from `snapshot`.
    ///
    /// The current file, if any, is copied to
    /// `cumulative_usage_backup_<YYYYmmdd_HHMMSS>.json` beside it first.
    /// A corrupt current file is backed up and replaced.
    pub fn reseed<I>(&self, snapshot: &PeakSnapshot, events: I, now: DateTime<Utc>) -> Result<ReseedReport>
    where
        I: IntoIterator<Item = UsageEvent>,
    {
        let mut period_start = self.period_start;
        let mut backup_path = None;

        if self.path.exists() {
            let backup = self.backup_path(now);
            std::fs::copy(&self.path, &backup)
                .map_err(|e| LedgerError::io("backing up ledger", &backup, e))?;
            debug!(backup = %backup.display(), "backed up ledger");
            backup_path = Some(backup);

            match self.load() {
                Ok(existing) => period_start = existing.period_start,
                Err(e) => warn!(error = %e, "replacing unreadable ledger"),
            }
        }

        let (mut ledger, tally) =
            CumulativeLedger::reseeded(period_start, snapshot, events, self.history_limit, now);
        self.save(&mut ledger, now)?;

        let peak_date = snapshot.as_of.date_naive();
        log_ledger_event!(
            RESTORED_FROM_PEAK,
            peak_date = %peak_date,
            peak_tokens = snapshot.usage.tokens.processed(),
            marked_seen = tally.marked_seen,
            new_sessions = tally.merged.new_sessions
        );

        Ok(ReseedReport {
            backup_path,
            peak_date,
            tally,
        })
    }

    fn backup_path(&self, now: DateTime<Utc>) -> PathBuf {
        let name = format!("cumulative_usage_backup_{}.json", now.format("%Y%m%d_%H%M%S"));
        self.path.with_file_name(name)
    }
}
