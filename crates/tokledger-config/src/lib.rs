//! # tokledger-config
//!
//! Configuration for tokledger, loaded from `~/.tokledger/config.yaml`.
//!
//! Every field has a default, so a partial file (or no file at all, for the
//! commands that tolerate it) yields a usable configuration. Paths may start
//! with `~` and are expanded when read through the accessor methods.
//!
//! ```yaml
//! projects_dir: ~/.claude/projects
//! ledger_path: ~/.claude/cumulative_usage.json
//! data_dir: ~/.tokledger/data
//! device_id: laptop
//! period_start: 2025-10-01
//! goal_tokens: 100000000
//! deadline: 2025-12-31T23:59:59Z
//! history_limit: 100
//! ```

use std::path::{Path, PathBuf};

use chrono::{DateTime, NaiveDate, TimeZone, Utc};
use serde::{Deserialize, Serialize};
use tokledger_core::paths::expand_tilde;
use tokledger_core::{LedgerError, Result};
use tracing::debug;

/// Device id used when neither the config nor `$HOSTNAME` provides one.
pub const UNKNOWN_DEVICE: &str = "unknown-device";

/// tokledger configuration.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct Config {
    /// Root of the JSONL session logs to scan
    pub projects_dir: PathBuf,

    /// Location of the persisted cumulative ledger
    pub ledger_path: PathBuf,

    /// Directory holding one export file per device
    pub data_dir: PathBuf,

    /// Identifier for this machine's export file
    pub device_id: Option<String>,

    /// First day counted toward the cumulative totals (00:00 UTC)
    pub period_start: NaiveDate,

    /// Goal in processed tokens (input + output + cache-write)
    pub goal_tokens: u64,

    /// Instant the goal should be met by
    pub deadline: DateTime<Utc>,

    /// Number of merge summaries kept in the ledger's run history
    pub history_limit: usize,
}

fn default_period_start() -> NaiveDate {
    NaiveDate::from_ymd_opt(2025, 10, 1).unwrap_or_default()
}

fn default_deadline() -> DateTime<Utc> {
    Utc.with_ymd_and_hms(2025, 12, 31, 23, 59, 59)
        .single()
        .unwrap_or_default()
}

impl Default for Config {
    fn default() -> Self {
        Self {
            projects_dir: PathBuf::from("~/.claude/projects"),
            ledger_path: PathBuf::from("~/.claude/cumulative_usage.json"),
            data_dir: PathBuf::from("~/.tokledger/data"),
            device_id: None,
            period_start: default_period_start(),
            goal_tokens: 100_000_000,
            deadline: default_deadline(),
            history_limit: 100,
        }
    }
}

impl Config {
    /// Load configuration from a specific path.
    ///
    /// A missing file is an error; use [`Config::load_or_default`] for
    /// commands that can run unconfigured.
    pub fn load(path: &Path) -> Result<Self> {
        if !path.exists() {
            return Err(LedgerError::config_not_found(path));
        }

        let content = std::fs::read_to_string(path)
            .map_err(|e| LedgerError::config_not_found_with_source(path, e))?;
        let config = Self::parse(&content, path)?;

        debug!(path = %path.display(), "loaded config");
        Ok(config)
    }

    /// Load configuration, falling back to defaults when the file is absent.
    pub fn load_or_default(path: &Path) -> Result<Self> {
        if path.exists() {
            Self::load(path)
        } else {
            debug!(path = %path.display(), "config file does not exist, using defaults");
            Ok(Self::default())
        }
    }

    /// Parse and validate configuration read from `origin`.
    ///
    /// `origin` only labels errors.
    pub fn parse(content: &str, origin: &Path) -> Result<Self> {
        let config: Config =
            serde_yaml::from_str(content).map_err(|e| LedgerError::ConfigInvalid {
                path: origin.to_path_buf(),
                message: e.to_string(),
            })?;
        config.validate()?;
        Ok(config)
    }

    /// Validate the configuration.
    pub fn validate(&self) -> Result<()> {
        if self.goal_tokens == 0 {
            return Err(LedgerError::ConfigValidation {
                message: "goal_tokens must be greater than 0".to_string(),
            });
        }

        if self.history_limit == 0 {
            return Err(LedgerError::ConfigValidation {
                message: "history_limit must be greater than 0".to_string(),
            });
        }

        if self.deadline <= self.period_start_utc() {
            return Err(LedgerError::ConfigValidation {
                message: format!(
                    "deadline {} must be after period_start {}",
                    self.deadline, self.period_start
                ),
            });
        }

        Ok(())
    }

    /// Serialize to YAML.
    pub fn to_yaml(&self) -> Result<String> {
        serde_yaml::to_string(self).map_err(|e| LedgerError::YamlParse {
            context: "config".to_string(),
            message: e.to_string(),
        })
    }

    /// Write this configuration to `path`, creating parent directories.
    pub fn save(&self, path: &Path) -> Result<()> {
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent).map_err(|e| LedgerError::DirectoryCreation {
                path: parent.to_path_buf(),
                source: e,
            })?;
        }
        std::fs::write(path, self.to_yaml()?)
            .map_err(|e| LedgerError::io("writing config", path, e))
    }

    /// Session log root with `~` expanded.
    pub fn projects_dir(&self) -> PathBuf {
        expand_tilde(&self.projects_dir)
    }

    /// Ledger file path with `~` expanded.
    pub fn ledger_path(&self) -> PathBuf {
        expand_tilde(&self.ledger_path)
    }

    /// Device export directory with `~` expanded.
    pub fn data_dir(&self) -> PathBuf {
        expand_tilde(&self.data_dir)
    }

    /// Start of the accounting period as an instant.
    pub fn period_start_utc(&self) -> DateTime<Utc> {
        self.period_start.and_time(chrono::NaiveTime::MIN).and_utc()
    }

    /// Device id from the config, then `$HOSTNAME`, then [`UNKNOWN_DEVICE`].
    pub fn device_id(&self) -> String {
        if let Some(id) = self.device_id.as_deref().filter(|id| !id.trim().is_empty()) {
            return id.to_string();
        }
        std::env::var("HOSTNAME")
            .ok()
            .filter(|host| !host.trim().is_empty())
            .unwrap_or_else(|| UNKNOWN_DEVICE.to_string())
    }
}
