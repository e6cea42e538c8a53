//! Durable and in-memory backends for the access-code table.
//!
//! Every operation on a store is a single load-mutate-save cycle run under
//! the store's exclusive lock, so an issue racing a redeem (even from
//! another process, for the file store) cannot lose an update or let a
//! code be redeemed twice.

use std::collections::BTreeMap;
use std::fs::{self, OpenOptions};
use std::io::{self, Write};
use std::path::{Path, PathBuf};
use std::sync::Mutex;

use tempfile::NamedTempFile;
use tracing::debug;

use super::code::{AccessCode, CodeTable};
use crate::error::AccessError;

/// Storage backend for access codes.
pub trait CodeStore {
    /// Runs `f` over the current table while holding the store's exclusive
    /// lock, persisting the table afterwards if `f` changed it.
    fn update<T, F>(&self, f: F) -> Result<T, AccessError>
    where
        F: FnOnce(&mut CodeTable) -> T;

    /// Runs `f` over the current table under a shared lock. Never writes.
    fn read<T, F>(&self, f: F) -> Result<T, AccessError>
    where
        F: FnOnce(&CodeTable) -> T;
}

/// JSON file store guarded by an advisory lock on a sidecar `.lock` file.
#[derive(Debug, Clone)]
pub struct FileCodeStore {
    path: PathBuf,
}

impl FileCodeStore {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    fn lock_path(&self) -> PathBuf {
        let mut name = self.path.as_os_str().to_owned();
        name.push(".lock");
        PathBuf::from(name)
    }

    fn unavailable(&self, source: io::Error) -> AccessError {
        AccessError::StorageUnavailable {
            path: self.path.clone(),
            source,
        }
    }

    fn load(&self) -> Result<CodeTable, AccessError> {
        let bytes = match fs::read(&self.path) {
            Ok(bytes) => bytes,
            Err(e) if e.kind() == io::ErrorKind::NotFound => return Ok(CodeTable::new()),
            Err(e) => return Err(self.unavailable(e)),
        };

        if bytes.iter().all(u8::is_ascii_whitespace) {
            return Ok(CodeTable::new());
        }

        let entries: BTreeMap<String, AccessCode> =
            serde_json::from_slice(&bytes).map_err(|source| AccessError::Corrupt {
                path: self.path.clone(),
                source,
            })?;
        Ok(CodeTable::from_entries(entries))
    }

    /// Writes to a temp file beside the store and renames it into place so a
    /// crash mid-write never truncates the existing table.
    fn save(&self, table: &CodeTable) -> Result<(), AccessError> {
        let dir = parent_dir(&self.path);
        let mut tmp = NamedTempFile::new_in(dir).map_err(|e| self.unavailable(e))?;

        serde_json::to_writer_pretty(&mut tmp, table.entries())
            .map_err(|e| self.unavailable(io::Error::from(e)))?;
        tmp.write_all(b"\n").map_err(|e| self.unavailable(e))?;
        tmp.as_file().sync_all().map_err(|e| self.unavailable(e))?;

        #[cfg(unix)]
        {
            use std::os::unix::fs::PermissionsExt;
            tmp.as_file()
                .set_permissions(fs::Permissions::from_mode(0o600))
                .map_err(|e| self.unavailable(e))?;
        }

        tmp.persist(&self.path)
            .map_err(|e| self.unavailable(e.error))?;
        debug!(path = %self.path.display(), codes = table.len(), "access code store saved");
        Ok(())
    }
}

impl CodeStore for FileCodeStore {
    fn update<T, F>(&self, f: F) -> Result<T, AccessError>
    where
        F: FnOnce(&mut CodeTable) -> T,
    {
        let dir = parent_dir(&self.path);
        fs::create_dir_all(dir).map_err(|e| self.unavailable(e))?;

        let lock_file = OpenOptions::new()
            .create(true)
            .read(true)
            .write(true)
            .truncate(false)
            .open(self.lock_path())
            .map_err(|e| self.unavailable(e))?;
        let mut lock = fd_lock::RwLock::new(lock_file);
        let _guard = lock.write().map_err(|e| self.unavailable(e))?;

        let mut table = self.load()?;
        let output = f(&mut table);
        if table.is_dirty() {
            self.save(&table)?;
        }
        Ok(output)
    }

    fn read<T, F>(&self, f: F) -> Result<T, AccessError>
    where
        F: FnOnce(&CodeTable) -> T,
    {
        // No lock file means no writer has ever run, so there is nothing
        // to wait for and nothing is created.
        let lock_file = match OpenOptions::new().read(true).open(self.lock_path()) {
            Ok(file) => file,
            Err(e) if e.kind() == io::ErrorKind::NotFound => return Ok(f(&self.load()?)),
            Err(e) => return Err(self.unavailable(e)),
        };
        let lock = fd_lock::RwLock::new(lock_file);
        let _guard = lock.read().map_err(|e| self.unavailable(e))?;
        Ok(f(&self.load()?))
    }
}

fn parent_dir(path: &Path) -> &Path {
    match path.parent() {
        Some(parent) if !parent.as_os_str().is_empty() => parent,
        _ => Path::new("."),
    }
}

/// Process-local store, used in tests and for dry runs.
#[derive(Debug, Default)]
pub struct MemoryCodeStore {
    table: Mutex<CodeTable>,
}

impl MemoryCodeStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Returns a copy of the current table.
    pub fn snapshot(&self) -> CodeTable {
        match self.table.lock() {
            Ok(table) => table.clone(),
            Err(poisoned) => poisoned.into_inner().clone(),
        }
    }
}

impl CodeStore for MemoryCodeStore {
    fn update<T, F>(&self, f: F) -> Result<T, AccessError>
    where
        F: FnOnce(&mut CodeTable) -> T,
    {
        let mut table = match self.table.lock() {
            Ok(table) => table,
            Err(poisoned) => poisoned.into_inner(),
        };
        let output = f(&mut table);
        table.mark_clean();
        Ok(output)
    }

    fn read<T, F>(&self, f: F) -> Result<T, AccessError>
    where
        F: FnOnce(&CodeTable) -> T,
    {
        let table = match self.table.lock() {
            Ok(table) => table,
            Err(poisoned) => poisoned.into_inner(),
        };
        Ok(f(&table))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::tempdir;

    #[test]
    fn test_read_of_missing_store_creates_nothing() {
        let dir = tempdir().expect("tempdir");
        let state = dir.path().join("state");
        let store = FileCodeStore::new(state.join("codes.json"));

        assert_eq!(store.read(|table| table.len()).expect("read"), 0);
        assert!(!state.exists());
    }

    #[cfg(unix)]
    #[test]
    fn test_read_works_in_read_only_directory() {
        use std::os::unix::fs::PermissionsExt;

        let dir = tempdir().expect("tempdir");
        let state = dir.path().join("state");
        let store = FileCodeStore::new(state.join("codes.json"));
        store
            .update(|table| table.insert_new("AB12CD34", AccessCode::new("bob", 10, 60)))
            .expect("seed");

        fs::set_permissions(&state, fs::Permissions::from_mode(0o555)).expect("chmod");
        let read = store.read(|table| table.get("AB12CD34").cloned());
        fs::set_permissions(&state, fs::Permissions::from_mode(0o755)).expect("chmod back");

        assert_eq!(read.expect("read").map(|r| r.name), Some("bob".to_string()));
    }

    #[test]
    fn test_missing_file_is_empty_table() {
        let dir = tempdir().expect("tempdir");
        let store = FileCodeStore::new(dir.path().join("codes.json"));

        let len = store.update(|table| table.len()).expect("update");
        assert_eq!(len, 0);
        // Nothing changed, nothing written.
        assert!(!store.path().exists());
    }

    #[test]
    fn test_file_store_round_trips_through_disk() {
        let dir = tempdir().expect("tempdir");
        let path = dir.path().join("nested").join("codes.json");
        let store = FileCodeStore::new(&path);

        store
            .update(|table| table.insert_new("AB12CD34", AccessCode::new("bob", 10, 60)))
            .expect("insert");

        let reopened = FileCodeStore::new(&path);
        let record = reopened
            .update(|table| table.get("AB12CD34").cloned())
            .expect("read")
            .expect("record present");
        assert_eq!(record.name, "bob");
        assert_eq!(record.expires_at, 70);

        let leftovers: Vec<_> = fs::read_dir(path.parent().expect("parent"))
            .expect("read_dir")
            .filter_map(|e| e.ok())
            .map(|e| e.file_name().to_string_lossy().into_owned())
            .filter(|name| name != "codes.json" && name != "codes.json.lock")
            .collect();
        assert!(leftovers.is_empty(), "unexpected files: {:?}", leftovers);
    }

    #[test]
    fn test_persisted_format_is_code_keyed_map() {
        let dir = tempdir().expect("tempdir");
        let path = dir.path().join("codes.json");
        let store = FileCodeStore::new(&path);
        store
            .update(|table| table.insert_new("QWERTY12", AccessCode::new("eve", 5, 5)))
            .expect("insert");

        let raw: serde_json::Value =
            serde_json::from_str(&fs::read_to_string(&path).expect("read")).expect("json");
        assert_eq!(raw["QWERTY12"]["name"], "eve");
        assert_eq!(raw["QWERTY12"]["created_at"], 5);
        assert_eq!(raw["QWERTY12"]["expires_at"], 10);
    }

    #[test]
    fn test_corrupt_file_is_reported() {
        let dir = tempdir().expect("tempdir");
        let path = dir.path().join("codes.json");
        fs::write(&path, "{not json").expect("write");

        let err = FileCodeStore::new(&path)
            .update(|table| table.len())
            .expect_err("should fail");
        assert!(matches!(err, AccessError::Corrupt { .. }));
    }

    #[test]
    fn test_concurrent_updates_do_not_lose_writes() {
        let dir = tempdir().expect("tempdir");
        let path = dir.path().join("codes.json");

        let handles: Vec<_> = (0..8)
            .map(|i| {
                let store = FileCodeStore::new(&path);
                std::thread::spawn(move || {
                    store
                        .update(|table| {
                            table.insert_new(&format!("CODE000{}", i), AccessCode::new("t", 0, 60))
                        })
                        .expect("update")
                })
            })
            .collect();
        for handle in handles {
            assert!(handle.join().expect("thread"));
        }

        let len = FileCodeStore::new(&path)
            .update(|table| table.len())
            .expect("read");
        assert_eq!(len, 8);
    }

    #[test]
    fn test_memory_store_applies_changes() {
        let store = MemoryCodeStore::new();
        store
            .update(|table| table.insert_new("MEM00001", AccessCode::new("m", 0, 1)))
            .expect("insert");
        let snapshot = store.snapshot();
        assert!(snapshot.contains("MEM00001"));
        assert!(!snapshot.is_dirty());
    }
}
