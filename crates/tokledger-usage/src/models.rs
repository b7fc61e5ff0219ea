//! Data models for usage events and the cumulative ledger.
//!
//! Field names match the ledger files written by earlier releases, so an
//! existing `cumulative_usage.json` loads without migration.

use std::fmt::Write;

use chrono::{DateTime, NaiveDate, Utc};
use md5::{Digest, Md5};
use serde::{Deserialize, Serialize};

/// Token counts for the four metered categories.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct TokenCounts {
    /// Uncached input tokens
    pub input_tokens: u64,

    /// Output tokens
    pub output_tokens: u64,

    /// Tokens written to the prompt cache (cache-write)
    pub cache_creation_tokens: u64,

    /// Tokens served from the prompt cache (cache-read)
    pub cache_read_tokens: u64,
}

impl TokenCounts {
    pub fn new(input: u64, output: u64, cache_creation: u64, cache_read: u64) -> Self {
        Self {
            input_tokens: input,
            output_tokens: output,
            cache_creation_tokens: cache_creation,
            cache_read_tokens: cache_read,
        }
    }

    /// Add another set of counts, saturating at `u64::MAX`.
    pub fn add(&mut self, other: &TokenCounts) {
        self.input_tokens = self.input_tokens.saturating_add(other.input_tokens);
        self.output_tokens = self.output_tokens.saturating_add(other.output_tokens);
        self.cache_creation_tokens = self
            .cache_creation_tokens
            .saturating_add(other.cache_creation_tokens);
        self.cache_read_tokens = self.cache_read_tokens.saturating_add(other.cache_read_tokens);
    }

    /// Tokens counted toward goals: input + output + cache-write.
    ///
    /// Cache reads are excluded.
    pub fn processed(&self) -> u64 {
        self.input_tokens
            .saturating_add(self.output_tokens)
            .saturating_add(self.cache_creation_tokens)
    }

    /// All four categories.
    pub fn total(&self) -> u64 {
        self.processed().saturating_add(self.cache_read_tokens)
    }

    pub fn is_zero(&self) -> bool {
        self.total() == 0
    }
}

/// Token totals plus the number of distinct sessions behind them.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct CumulativeUsage {
    #[serde(flatten)]
    pub tokens: TokenCounts,

    /// Number of accepted usage events
    pub total_sessions: u64,
}

impl CumulativeUsage {
    pub fn new(tokens: TokenCounts, total_sessions: u64) -> Self {
        Self {
            tokens,
            total_sessions,
        }
    }

    /// Add another usage summary, saturating.
    pub fn add(&mut self, other: &CumulativeUsage) {
        self.tokens.add(&other.tokens);
        self.total_sessions = self.total_sessions.saturating_add(other.total_sessions);
    }
}

/// One metered usage record read from a session log.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct UsageEvent {
    /// File name (not path) of the log the record came from
    pub source_file: String,

    /// Timestamp exactly as written in the log
    pub raw_timestamp: String,

    /// Parsed timestamp, normalized to UTC
    pub timestamp: DateTime<Utc>,

    /// Token counts; absent categories are zero
    pub counts: TokenCounts,
}

impl UsageEvent {
    pub fn new(
        source_file: impl Into<String>,
        raw_timestamp: impl Into<String>,
        timestamp: DateTime<Utc>,
        counts: TokenCounts,
    ) -> Self {
        Self {
            source_file: source_file.into(),
            raw_timestamp: raw_timestamp.into(),
            timestamp,
            counts,
        }
    }

    /// Deduplication key for this event.
    ///
    /// Lowercase hex MD5 of `"{file}_{timestamp}_{input}_{output}"`. Only
    /// those four fields participate: cache counts, the directory the file
    /// lives in, and scan order do not. Keys already stored in existing
    /// ledgers were produced the same way.
    pub fn identity(&self) -> String {
        let key = format!(
            "{}_{}_{}_{}",
            self.source_file,
            self.raw_timestamp,
            self.counts.input_tokens,
            self.counts.output_tokens
        );
        let digest = Md5::digest(key.as_bytes());
        let mut out = String::with_capacity(digest.len() * 2);
        for byte in digest.iter() {
            let _ = write!(&mut out, "{:02x}", byte);
        }
        out
    }

    /// The summary stored in the ledger for an accepted event.
    pub fn to_record(&self) -> SessionRecord {
        SessionRecord {
            file: self.source_file.clone(),
            timestamp: self.raw_timestamp.clone(),
            tokens: self.counts,
        }
    }
}

/// Ledger entry for an accepted event, keyed by its identity.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SessionRecord {
    /// Source log file name
    #[serde(default)]
    pub file: String,

    /// Raw timestamp string
    #[serde(default)]
    pub timestamp: String,

    #[serde(flatten)]
    pub tokens: TokenCounts,
}

/// Audit entry appended to the ledger's run history.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RunRecord {
    /// When the run finished
    pub timestamp: DateTime<Utc>,

    /// Administrative action, absent for ordinary merges
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub action: Option<String>,

    /// Events accepted by this run
    #[serde(default)]
    pub new_sessions: u64,

    /// Tokens accepted by this run
    #[serde(default)]
    pub new_tokens: TokenCounts,

    /// Snapshot date used by a reseed
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub peak_date: Option<NaiveDate>,

    /// Processed tokens in the snapshot used by a reseed
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub peak_tokens: Option<u64>,
}

impl RunRecord {
    /// Summary of an ordinary merge.
    pub fn merge(timestamp: DateTime<Utc>, new_sessions: u64, new_tokens: TokenCounts) -> Self {
        Self {
            timestamp,
            action: None,
            new_sessions,
            new_tokens,
            peak_date: None,
            peak_tokens: None,
        }
    }
}
