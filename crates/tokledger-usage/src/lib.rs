//! # tokledger-usage
//!
//! Token usage accounting for tokledger.
//!
//! This crate provides:
//! - [`EventReader`] - Read usage events from a tree of JSONL session logs
//! - [`LedgerStore`] / [`CumulativeLedger`] - Deduplicating cumulative totals that survive log deletion
//! - [`DeviceExport`] - Per-device summary files
//! - [`aggregate_devices`] - Totals across every device's export
//! - [`GoalProgress`] - Progress and projection toward a token goal
//!
//! ## Log Format
//!
//! One JSON object per line. Records with a `timestamp` and a
//! `message.usage` object are usage events; everything else is skipped.
//! Counts are read from `input_tokens`, `output_tokens`,
//! `cache_creation_input_tokens` and `cache_read_input_tokens`.
//!
//! ## Example
//!
//! ```no_run
//! use chrono::{NaiveDate, Utc};
//! use tokledger_usage::{EventReader, LedgerStore};
//!
//! fn main() -> tokledger_core::Result<()> {
//!     let start = NaiveDate::from_ymd_opt(2025, 10, 1).unwrap_or_default();
//!     let cutoff = start.and_hms_opt(0, 0, 0).unwrap_or_default().and_utc();
//!
//!     let reader = EventReader::new("/home/me/.claude/projects", cutoff);
//!     let store = LedgerStore::new("/home/me/.claude/cumulative_usage.json", start);
//!
//!     let result = store.merge(reader.events())?;
//!     println!("{} new sessions, {} total", result.new_sessions, result.cumulative.total_sessions);
//!     Ok(())
//! }
//! ```

pub mod aggregate;
pub mod export;
pub mod goal;
pub mod ledger;
pub mod models;
pub mod pricing;
pub mod reader;

// Re-export main types
pub use aggregate::{DeviceInfo, FleetUsage, SkippedFile, aggregate_devices};
pub use export::{DeviceExport, normalize_device_id};
pub use goal::{GoalProgress, Pace};
pub use ledger::{CumulativeLedger, LedgerStore, MergeResult, PeakSnapshot, ReseedReport};
pub use models::{CumulativeUsage, RunRecord, SessionRecord, TokenCounts, UsageEvent};
pub use pricing::{CostBreakdown, Pricing};
pub use reader::{EventReader, FileScan, LineOutcome, ScanStats, UsageEvents};
