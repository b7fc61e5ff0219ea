//! Cross-device aggregation of device exports.

use std::path::{Path, PathBuf};

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use tokledger_core::{LedgerError, Result};
use tracing::{debug, warn};

use crate::models::CumulativeUsage;
use crate::reader::parse_timestamp;

/// One device's contribution to the fleet total.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct DeviceInfo {
    pub device_id: String,
    pub last_updated: Option<DateTime<Utc>>,
    pub usage: CumulativeUsage,
    pub estimated_cost: f64,
}

/// An export file that could not be used.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct SkippedFile {
    pub path: PathBuf,
    pub reason: String,
}

/// Totals across every readable device export.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct FleetUsage {
    pub usage: CumulativeUsage,
    /// Sorted by device id
    pub devices: Vec<DeviceInfo>,
    pub skipped: Vec<SkippedFile>,
}

// Exports from older versions may lack any of these fields.
#[derive(Debug, Deserialize)]
struct ExportFile {
    #[serde(default)]
    device_id: Option<String>,
    #[serde(default)]
    last_updated: Option<String>,
    #[serde(default)]
    usage: CumulativeUsage,
    #[serde(default)]
    estimated_cost: f64,
}

/// Sum every `*.json` export in `dir`.
///
/// Files that cannot be read or decoded are logged and listed in
/// [`FleetUsage::skipped`]. Nothing is written.
pub fn aggregate_devices(dir: &Path) -> Result<FleetUsage> {
    if !dir.is_dir() {
        return Err(LedgerError::DataDirNotFound {
            path: dir.to_path_buf(),
        });
    }

    let entries = std::fs::read_dir(dir)
        .map_err(|e| LedgerError::io("reading data directory", dir, e))?;

    let mut files: Vec<PathBuf> = entries
        .filter_map(|entry| match entry {
            Ok(entry) => Some(entry.path()),
            Err(e) => {
                warn!(error = %e, "failed to read directory entry");
                None
            }
        })
        .filter(|path| path.is_file() && path.extension().and_then(|e| e.to_str()) == Some("json"))
        .collect();
    files.sort();

    let mut usage = CumulativeUsage::default();
    let mut devices = Vec::new();
    let mut skipped = Vec::new();

    for path in files {
        match read_export(&path) {
            Ok(device) => {
                usage.add(&device.usage);
                devices.push(device);
            }
            Err(reason) => {
                warn!(file = %path.display(), reason = %reason, "skipping device export");
                skipped.push(SkippedFile { path, reason });
            }
        }
    }

    if devices.is_empty() {
        return Err(LedgerError::NoUsageData {
            path: dir.to_path_buf(),
        });
    }

    devices.sort_by(|a, b| a.device_id.cmp(&b.device_id));
    debug!(
        devices = devices.len(),
        skipped = skipped.len(),
        "aggregated device exports"
    );

    Ok(FleetUsage {
        usage,
        devices,
        skipped,
    })
}

fn read_export(path: &Path) -> std::result::Result<DeviceInfo, String> {
    let content = std::fs::read_to_string(path).map_err(|e| e.to_string())?;
    let export: ExportFile = serde_json::from_str(&content).map_err(|e| e.to_string())?;

    let device_id = export
        .device_id
        .filter(|id| !id.trim().is_empty())
        .or_else(|| {
            path.file_stem()
                .map(|stem| stem.to_string_lossy().into_owned())
        })
        .unwrap_or_default();

    Ok(DeviceInfo {
        device_id,
        last_updated: export.last_updated.as_deref().and_then(parse_timestamp),
        usage: export.usage,
        estimated_cost: export.estimated_cost,
    })
}
