//! # tokledger-core
//!
//! Core errors, logging, and file utilities shared by the tokledger crates.
//!
//! This crate provides:
//! - [`LedgerError`] - Error type for every tokledger operation
//! - [`logging`] - Tracing setup and log management utilities
//! - [`paths`] - `~/.tokledger` locations and `~` expansion
//! - [`fs`] - Atomic JSON file replacement
//!
//! ## Example
//!
//! ```no_run
//! use tokledger_core::{LedgerError, logging, paths};
//!
//! fn main() -> tokledger_core::Result<()> {
//!     let _guard = logging::init_logging(None, false)?;
//!
//!     let config_path = paths::default_config_path()?;
//!     if !config_path.exists() {
//!         return Err(LedgerError::config_not_found(config_path));
//!     }
//!
//!     Ok(())
//! }
//! ```

pub mod error;
pub mod fs;
pub mod logging;
pub mod paths;

pub use error::{LedgerError, Result};
pub use fs::write_json_atomic;
pub use logging::{LogGuard, init_logging};
