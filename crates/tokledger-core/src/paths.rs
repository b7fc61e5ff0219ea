//! Well-known locations under the user's home directory.

use std::path::{Path, PathBuf};

use crate::error::{LedgerError, Result};

/// Name of the tokledger state directory inside `$HOME`.
pub const APP_DIR_NAME: &str = ".tokledger";

/// Get the user's home directory.
pub fn home_dir() -> Result<PathBuf> {
    dirs::home_dir().ok_or_else(|| LedgerError::ConfigMissingField {
        field: "HOME environment variable".to_string(),
    })
}

/// Get the tokledger state directory (`~/.tokledger/`).
pub fn app_dir() -> Result<PathBuf> {
    Ok(home_dir()?.join(APP_DIR_NAME))
}

/// Get the default config file path (`~/.tokledger/config.yaml`).
pub fn default_config_path() -> Result<PathBuf> {
    Ok(app_dir()?.join("config.yaml"))
}

/// Expand a leading `~` to the home directory.
///
/// Paths without a leading `~` are returned unchanged, as are `~` paths when
/// the home directory cannot be determined.
pub fn expand_tilde(path: &Path) -> PathBuf {
    let Ok(rest) = path.strip_prefix("~") else {
        return path.to_path_buf();
    };
    match dirs::home_dir() {
        Some(home) => home.join(rest),
        None => path.to_path_buf(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serial_test::serial;

    #[test]
    #[serial]
    fn test_app_dir_under_home() {
        // SAFETY: serialized with every other test touching HOME
        unsafe { std::env::set_var("HOME", "/tmp/test-home") };
        assert_eq!(app_dir().unwrap(), PathBuf::from("/tmp/test-home/.tokledger"));
        assert_eq!(
            default_config_path().unwrap(),
            PathBuf::from("/tmp/test-home/.tokledger/config.yaml")
        );
    }

    #[test]
    #[serial]
    fn test_expand_tilde() {
        // SAFETY: serialized with every other test touching HOME
        unsafe { std::env::set_var("HOME", "/tmp/test-home") };
        assert_eq!(
            expand_tilde(Path::new("~/.claude/projects")),
            PathBuf::from("/tmp/test-home/.claude/projects")
        );
        assert_eq!(expand_tilde(Path::new("~")), PathBuf::from("/tmp/test-home"));
        assert_eq!(
            expand_tilde(Path::new("/var/data")),
            PathBuf::from("/var/data")
        );
        assert_eq!(
            expand_tilde(Path::new("relative/~x")),
            PathBuf::from("relative/~x")
        );
    }
}
