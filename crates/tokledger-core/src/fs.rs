//! File helpers shared by the ledger and the device exports.

use std::fs;
use std::io::{BufWriter, Write};
use std::path::Path;

use serde::Serialize;
use tracing::debug;

use crate::error::{LedgerError, Result};

/// Serialize `value` as pretty JSON and replace `path` with it atomically.
///
/// The document is written to `<path>.tmp`, synced, then renamed over
/// `path`. If any step fails the previous contents of `path` are untouched.
/// Missing parent directories are created.
pub fn write_json_atomic<T: Serialize>(path: &Path, value: &T) -> Result<()> {
    if let Some(parent) = path.parent()
        && !parent.as_os_str().is_empty()
    {
        fs::create_dir_all(parent).map_err(|e| LedgerError::DirectoryCreation {
            path: parent.to_path_buf(),
            source: e,
        })?;
    }

    let temp_path = temp_path_for(path);
    if let Err(e) = write_temp(&temp_path, path, value) {
        if temp_path.is_file() {
            let _ = fs::remove_file(&temp_path);
        }
        return Err(e);
    }

    if let Err(e) = fs::rename(&temp_path, path) {
        let _ = fs::remove_file(&temp_path);
        return Err(LedgerError::io("replacing file", path, e));
    }

    debug!(path = %path.display(), "wrote file atomically");
    Ok(())
}

fn write_temp<T: Serialize>(temp_path: &Path, path: &Path, value: &T) -> Result<()> {
    let file = fs::File::create(temp_path)
        .map_err(|e| LedgerError::io("creating temp file", temp_path, e))?;
    let mut writer = BufWriter::new(file);

    serde_json::to_writer_pretty(&mut writer, value)
        .map_err(|e| LedgerError::json_parse(format!("serializing {}", path.display()), e))?;
    writer
        .write_all(b"\n")
        .and_then(|()| writer.flush())
        .map_err(|e| LedgerError::io("writing temp file", temp_path, e))?;
    writer
        .get_ref()
        .sync_all()
        .map_err(|e| LedgerError::io("syncing temp file", temp_path, e))
}

/// Temp file used by [`write_json_atomic`]: `<path>.tmp`.
pub fn temp_path_for(path: &Path) -> std::path::PathBuf {
    let mut name = path
        .file_name()
        .map(|n| n.to_os_string())
        .unwrap_or_default();
    name.push(".tmp");
    path.with_file_name(name)
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    #[derive(Serialize)]
    struct Doc {
        name: &'static str,
        count: u64,
    }

    #[test]
    fn test_write_json_atomic_creates_parents() {
        let tmp = TempDir::new().unwrap();
        let path = tmp.path().join("nested").join("doc.json");

        write_json_atomic(&path, &Doc { name: "a", count: 1 }).unwrap();

        let content = fs::read_to_string(&path).unwrap();
        let value: serde_json::Value = serde_json::from_str(&content).unwrap();
        assert_eq!(value["name"], "a");
        assert_eq!(value["count"], 1);
        assert!(!temp_path_for(&path).exists());
    }

    #[test]
    fn test_write_json_atomic_replaces_existing() {
        let tmp = TempDir::new().unwrap();
        let path = tmp.path().join("doc.json");
        fs::write(&path, "old").unwrap();

        write_json_atomic(&path, &Doc { name: "b", count: 2 }).unwrap();

        let value: serde_json::Value =
            serde_json::from_str(&fs::read_to_string(&path).unwrap()).unwrap();
        assert_eq!(value["count"], 2);
    }

    #[test]
    fn test_failed_write_keeps_previous_file() {
        let tmp = TempDir::new().unwrap();
        let path = tmp.path().join("doc.json");
        fs::write(&path, "previous").unwrap();

        // A directory squatting on the temp path makes File::create fail.
        fs::create_dir(temp_path_for(&path)).unwrap();

        let result = write_json_atomic(&path, &Doc { name: "c", count: 3 });
        assert!(result.is_err());
        assert_eq!(fs::read_to_string(&path).unwrap(), "previous");
    }

    #[test]
    fn test_serialize_failure_removes_temp_file() {
        let tmp = TempDir::new().unwrap();
        let path = tmp.path().join("doc.json");
        fs::write(&path, "previous").unwrap();

        // Non-string map keys fail after the temp file is already open.
        let value: std::collections::BTreeMap<(u32, u32), u32> = [((1, 2), 3)].into();

        let err = write_json_atomic(&path, &value).unwrap_err();
        assert!(matches!(err, LedgerError::JsonParse { .. }));
        assert!(!temp_path_for(&path).exists());
        assert_eq!(fs::read_to_string(&path).unwrap(), "previous");
    }

    #[test]
    fn test_temp_path_for() {
        assert_eq!(
            temp_path_for(Path::new("/a/cumulative_usage.json")),
            std::path::PathBuf::from("/a/cumulative_usage.json.tmp")
        );
    }
}
