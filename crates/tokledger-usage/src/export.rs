//! Per-device export.
//!
//! Each machine writes one summary file into a shared data directory; the
//! aggregate module sums those files. The export is derived from the
//! ledger, never from a fresh scan, so it inherits the ledger's
//! deduplication and deletion safety.

use std::path::{Path, PathBuf};

use chrono::{DateTime, NaiveDate, Utc};
use serde::{Deserialize, Serialize};
use tokledger_core::Result;
use tokledger_core::fs::write_json_atomic;
use tracing::info;

use crate::ledger::CumulativeLedger;
use crate::models::CumulativeUsage;
use crate::pricing::Pricing;

/// One device's usage summary.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DeviceExport {
    pub device_id: String,
    pub last_updated: DateTime<Utc>,
    pub period_start: NaiveDate,
    /// Date of the export
    pub period_end: NaiveDate,
    pub usage: CumulativeUsage,
    /// USD, rounded to cents
    pub estimated_cost: f64,
}

impl DeviceExport {
    /// Summarize `ledger` for `device_id` as of `now`.
    pub fn from_ledger(
        ledger: &CumulativeLedger,
        device_id: &str,
        pricing: &Pricing,
        now: DateTime<Utc>,
    ) -> Self {
        let cost = pricing.estimate(&ledger.cumulative_usage.tokens);
        Self {
            device_id: normalize_device_id(device_id),
            last_updated: now,
            period_start: ledger.period_start,
            period_end: now.date_naive(),
            usage: ledger.cumulative_usage,
            estimated_cost: round_cents(cost.total),
        }
    }

    /// Export file location inside `dir`.
    pub fn path_in(&self, dir: &Path) -> PathBuf {
        dir.join(format!("{}.json", self.device_id))
    }

    /// Write `<dir>/<device_id>.json` atomically, creating `dir`.
    pub fn write_to(&self, dir: &Path) -> Result<PathBuf> {
        let path = self.path_in(dir);
        write_json_atomic(&path, self)?;
        info!(
            device_id = %self.device_id,
            path = %path.display(),
            processed_tokens = self.usage.tokens.processed(),
            "wrote device export"
        );
        Ok(path)
    }
}

/// Make a device id safe for use as a file name.
///
/// Lowercases and replaces `.` and spaces with `-`.
pub fn normalize_device_id(raw: &str) -> String {
    raw.trim()
        .chars()
        .map(|c| if c == '.' || c == ' ' { '-' } else { c })
        .collect::<String>()
        .to_lowercase()
}

fn round_cents(usd: f64) -> f64 {
    (usd * 100.0).round() / 100.0
}
