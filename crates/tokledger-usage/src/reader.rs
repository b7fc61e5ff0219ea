//! Event reader for JSONL session logs.
//!
//! Walks a directory tree for `*.jsonl` files and yields one [`UsageEvent`]
//! per record that carries a timestamp at or after the cutoff and a
//! `message.usage` object:
//!
//! ```json
//! {"type":"assistant","timestamp":"2025-10-05T12:00:00.000Z","message":{"model":"claude-sonnet-4-5","usage":{"input_tokens":1000,"output_tokens":500,"cache_creation_input_tokens":0,"cache_read_input_tokens":0}}}
//! ```
//!
//! Nothing in here is fatal. Lines that are not JSON, records without a
//! timestamp or usage, and files that vanish or cannot be opened are skipped
//! and counted in [`ScanStats`].

use std::fs::File;
use std::io::{BufRead, BufReader};
use std::path::{Path, PathBuf};

use chrono::{DateTime, NaiveDateTime, Utc};
use serde::Serialize;
use serde_json::Value;
use tracing::{debug, trace, warn};
use walkdir::WalkDir;

use crate::models::{TokenCounts, UsageEvent};

/// Classification of a single log line.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum LineOutcome {
    /// A usage event at or after the cutoff
    Event(UsageEvent),
    /// Empty or whitespace-only line
    Blank,
    /// Not a JSON object
    Malformed,
    /// Record has no `timestamp` field
    NoTimestamp,
    /// `timestamp` is not a string or does not parse
    BadTimestamp,
    /// Timestamp is strictly before the cutoff
    BeforeCutoff,
    /// Record has no `message.usage` object
    NoUsage,
}

/// Per-file counts collected during a scan.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct FileScan {
    /// Log file name
    pub file: String,
    /// Events yielded from this file
    pub events: usize,
    /// Usage records skipped for predating the cutoff
    pub before_cutoff: usize,
}

/// Counters for one pass over the log tree.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct ScanStats {
    pub files: usize,
    pub unreadable_files: usize,
    pub lines: usize,
    pub events: usize,
    pub malformed: usize,
    pub no_timestamp: usize,
    pub bad_timestamp: usize,
    pub before_cutoff: usize,
    pub no_usage: usize,
    pub per_file: Vec<FileScan>,
}

impl ScanStats {
    fn record(&mut self, outcome: &LineOutcome, file: &mut FileScan) {
        if *outcome == LineOutcome::Blank {
            return;
        }
        self.lines += 1;
        match outcome {
            LineOutcome::Event(_) => {
                self.events += 1;
                file.events += 1;
            }
            LineOutcome::Malformed => self.malformed += 1,
            LineOutcome::NoTimestamp => self.no_timestamp += 1,
            LineOutcome::BadTimestamp => self.bad_timestamp += 1,
            LineOutcome::BeforeCutoff => {
                self.before_cutoff += 1;
                file.before_cutoff += 1;
            }
            LineOutcome::NoUsage => self.no_usage += 1,
            LineOutcome::Blank => {}
        }
    }

    /// Lines skipped for any reason other than being blank.
    pub fn skipped(&self) -> usize {
        self.lines - self.events
    }
}

/// Reader over a tree of JSONL session logs.
#[derive(Debug, Clone)]
pub struct EventReader {
    root: PathBuf,
    cutoff: DateTime<Utc>,
}

impl EventReader {
    /// Create a reader for `root` that drops records before `cutoff`.
    pub fn new(root: impl Into<PathBuf>, cutoff: DateTime<Utc>) -> Self {
        Self {
            root: root.into(),
            cutoff,
        }
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    pub fn cutoff(&self) -> DateTime<Utc> {
        self.cutoff
    }

    /// Start a fresh pass over the log tree.
    ///
    /// Each call walks the directory again, so files appended to or removed
    /// since the previous pass are picked up. A missing root yields nothing.
    pub fn events(&self) -> UsageEvents {
        let walker = if self.root.is_dir() {
            Some(
                WalkDir::new(&self.root)
                    .follow_links(false)
                    .sort_by_file_name()
                    .into_iter(),
            )
        } else {
            debug!(root = %self.root.display(), "log root does not exist");
            None
        };

        UsageEvents {
            walker,
            cutoff: self.cutoff,
            current: None,
            stats: ScanStats::default(),
        }
    }
}

struct OpenLog {
    reader: BufReader<File>,
    buf: Vec<u8>,
    line_number: usize,
    scan: FileScan,
}

/// Lazy sequence of usage events produced by [`EventReader::events`].
pub struct UsageEvents {
    walker: Option<walkdir::IntoIter>,
    cutoff: DateTime<Utc>,
    current: Option<OpenLog>,
    stats: ScanStats,
}

impl UsageEvents {
    /// Counters for the lines and files consumed so far.
    pub fn stats(&self) -> &ScanStats {
        &self.stats
    }

    /// Drain the remaining events and return the final counters.
    pub fn into_stats(mut self) -> ScanStats {
        for _ in self.by_ref() {}
        self.stats
    }

    fn finish_file(&mut self) {
        if let Some(log) = self.current.take() {
            debug!(
                file = %log.scan.file,
                lines = log.line_number,
                events = log.scan.events,
                before_cutoff = log.scan.before_cutoff,
                "read log file"
            );
            self.stats.per_file.push(log.scan);
        }
    }

    fn open_next_file(&mut self) -> bool {
        let Some(walker) = self.walker.as_mut() else {
            return false;
        };

        for entry in walker.by_ref() {
            let entry = match entry {
                Ok(entry) => entry,
                Err(e) => {
                    warn!(error = %e, "failed to read log directory entry");
                    continue;
                }
            };
            let path = entry.path();
            if !entry.file_type().is_file() || !is_jsonl(path) {
                continue;
            }

            let name = path
                .file_name()
                .map(|n| n.to_string_lossy().into_owned())
                .unwrap_or_default();

            match File::open(path) {
                Ok(file) => {
                    self.stats.files += 1;
                    self.current = Some(OpenLog {
                        reader: BufReader::new(file),
                        buf: Vec::new(),
                        line_number: 0,
                        scan: FileScan {
                            file: name,
                            ..FileScan::default()
                        },
                    });
                    return true;
                }
                Err(e) => {
                    self.stats.unreadable_files += 1;
                    warn!(file = %path.display(), error = %e, "skipping unreadable log file");
                }
            }
        }

        false
    }
}

impl Iterator for UsageEvents {
    type Item = UsageEvent;

    fn next(&mut self) -> Option<UsageEvent> {
        loop {
            let Some(log) = self.current.as_mut() else {
                if self.open_next_file() {
                    continue;
                }
                return None;
            };

            log.buf.clear();
            match log.reader.read_until(b'\n', &mut log.buf) {
                Ok(0) => {
                    self.finish_file();
                }
                Ok(_) => {
                    log.line_number += 1;
                    // Invalid UTF-8 spoils only the line it is on.
                    let outcome = match std::str::from_utf8(&log.buf) {
                        Ok(line) => parse_line(line, &log.scan.file, self.cutoff),
                        Err(_) => LineOutcome::Malformed,
                    };
                    if outcome == LineOutcome::Malformed {
                        trace!(file = %log.scan.file, line = log.line_number, "skipping malformed line");
                    }
                    self.stats.record(&outcome, &mut log.scan);
                    if let LineOutcome::Event(event) = outcome {
                        return Some(event);
                    }
                }
                Err(e) => {
                    warn!(
                        file = %log.scan.file,
                        line = log.line_number + 1,
                        error = %e,
                        "stopped reading log file"
                    );
                    self.finish_file();
                }
            }
        }
    }
}

fn is_jsonl(path: &Path) -> bool {
    path.extension().and_then(|e| e.to_str()) == Some("jsonl")
}

/// Classify one log line read from `source_file`.
pub fn parse_line(line: &str, source_file: &str, cutoff: DateTime<Utc>) -> LineOutcome {
    let line = line.trim();
    if line.is_empty() {
        return LineOutcome::Blank;
    }

    let value: Value = match serde_json::from_str(line) {
        Ok(value @ Value::Object(_)) => value,
        _ => return LineOutcome::Malformed,
    };

    let raw_timestamp = match value.get("timestamp") {
        None => return LineOutcome::NoTimestamp,
        Some(Value::String(raw)) => raw.as_str(),
        Some(_) => return LineOutcome::BadTimestamp,
    };
    let Some(timestamp) = parse_timestamp(raw_timestamp) else {
        return LineOutcome::BadTimestamp;
    };
    if timestamp < cutoff {
        return LineOutcome::BeforeCutoff;
    }

    let Some(usage) = value
        .get("message")
        .and_then(|m| m.get("usage"))
        .filter(|u| u.is_object())
    else {
        return LineOutcome::NoUsage;
    };

    LineOutcome::Event(UsageEvent::new(
        source_file,
        raw_timestamp,
        timestamp,
        parse_counts(usage),
    ))
}

fn parse_counts(usage: &Value) -> TokenCounts {
    let count = |key: &str| usage.get(key).and_then(Value::as_u64).unwrap_or(0);
    TokenCounts::new(
        count("input_tokens"),
        count("output_tokens"),
        count("cache_creation_input_tokens"),
        count("cache_read_input_tokens"),
    )
}

/// Parse an ISO-8601 timestamp, normalizing to UTC.
///
/// Offset-less timestamps are taken to be UTC already.
pub fn parse_timestamp(raw: &str) -> Option<DateTime<Utc>> {
    if let Ok(parsed) = DateTime::parse_from_rfc3339(raw) {
        return Some(parsed.with_timezone(&Utc));
    }
    for format in ["%Y-%m-%dT%H:%M:%S%.f", "%Y-%m-%d %H:%M:%S%.f"] {
        if let Ok(parsed) = NaiveDateTime::parse_from_str(raw, format) {
            return Some(parsed.and_utc());
        }
    }
    None
}
