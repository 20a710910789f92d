//! File-backed store: one file per key.
//!
//! ```text
//! <dir>/<key>.json      - current value
//! <dir>/<key>.json.tmp  - in-progress write (ignored on read)
//! ```
//!
//! Values are written with the write-to-temp-then-rename pattern:
//! 1. Write to `<key>.json.tmp`
//! 2. fsync the temp file
//! 3. Rename to `<key>.json`
//! 4. fsync the directory
//!
//! Readers therefore see either the old or the new value, never a partial one.

use std::fs::{File, OpenOptions};
use std::io::{self, Write};
use std::path::{Path, PathBuf};

use super::{PersistentStore, Result, StoreError};

/// Validates that a key is safe to use as a file name.
///
/// A key is unsafe if it is empty, contains path separators or null bytes,
/// or starts with a dot (hidden file, directory traversal).
fn validate_key(key: &str) -> Result<()> {
    if key.is_empty()
        || key.contains('/')
        || key.contains('\\')
        || key.contains('\0')
        || key.starts_with('.')
    {
        return Err(StoreError::InvalidKey(key.to_string()));
    }
    Ok(())
}

#[derive(Debug, Clone)]
pub struct FileStore {
    dir: PathBuf,
}

impl FileStore {
    /// Opens a store rooted at `dir`, creating the directory if needed.
    pub fn open(dir: impl Into<PathBuf>) -> Result<Self> {
        let dir = dir.into();
        std::fs::create_dir_all(&dir)?;
        Ok(FileStore { dir })
    }

    pub fn dir(&self) -> &Path {
        &self.dir
    }

    fn value_path(&self, key: &str) -> PathBuf {
        self.dir.join(format!("{key}.json"))
    }

    fn temp_path(&self, key: &str) -> PathBuf {
        self.dir.join(format!("{key}.json.tmp"))
    }

    /// Makes renames and removals in the store directory survive power loss.
    fn sync_dir(&self) -> io::Result<()> {
        File::open(&self.dir)?.sync_all()
    }
}

impl PersistentStore for FileStore {
    fn get_item(&self, key: &str) -> Result<Option<String>> {
        validate_key(key)?;
        match std::fs::read_to_string(self.value_path(key)) {
            Ok(text) => Ok(Some(text)),
            Err(e) if e.kind() == io::ErrorKind::NotFound => Ok(None),
            Err(e) => Err(e.into()),
        }
    }

    fn set_item(&self, key: &str, value: &str) -> Result<()> {
        validate_key(key)?;

        let temp_path = self.temp_path(key);
        {
            let mut file = OpenOptions::new()
                .write(true)
                .create(true)
                .truncate(true)
                .open(&temp_path)?;
            file.write_all(value.as_bytes())?;
            file.sync_all()?;
        }

        std::fs::rename(&temp_path, self.value_path(key))?;
        self.sync_dir()?;
        Ok(())
    }

    fn remove_item(&self, key: &str) -> Result<()> {
        validate_key(key)?;
        // A leftover temp file from an interrupted write is dropped as well.
        let _ = std::fs::remove_file(self.temp_path(key));
        match std::fs::remove_file(self.value_path(key)) {
            Ok(()) => {}
            Err(e) if e.kind() == io::ErrorKind::NotFound => return Ok(()),
            Err(e) => return Err(e.into()),
        }
        self.sync_dir()?;
        Ok(())
    }
}
