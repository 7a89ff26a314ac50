// Copyright (c) 2025-2026 Adrian Robinson. Licensed under the AGPL-3.0.
// See LICENSE file in the project root for full license text.

//! Directory-backed key-value store for Tier-1.
//!
//! One file per key under the cache directory. Writes go to a temp file
//! in the same directory and are renamed into place, so a crash mid-write
//! leaves either the old value or the new one, never a torn file.
//!
//! The quota covers the sum of all value files, mirroring the fixed
//! budget a browser-style local storage gives an origin.

use std::collections::HashMap;
use std::fs;
use std::io::{ErrorKind, Write};
use std::path::{Path, PathBuf};

use parking_lot::Mutex;
use tempfile::NamedTempFile;
use tracing::{debug, warn};

use super::traits::{KeyValueStore, StorageError};

const VALUE_EXTENSION: &str = "json";

pub struct FileKeyValueStore {
    dir: PathBuf,
    max_bytes: usize,
    /// File name → size, for quota accounting. Also serializes writers.
    sizes: Mutex<HashMap<String, usize>>,
    available: bool,
}

impl FileKeyValueStore {
    /// Open (creating if needed) a store rooted at `dir`.
    ///
    /// A directory that cannot be created does not fail construction; the
    /// store reports itself unavailable and every operation errors.
    pub fn open(dir: impl AsRef<Path>, max_bytes: usize) -> Self {
        let dir = dir.as_ref().to_path_buf();
        let (available, sizes) = match fs::create_dir_all(&dir) {
            Ok(()) => (true, Self::scan_sizes(&dir)),
            Err(e) => {
                warn!(dir = %dir.display(), error = %e, "Cache directory unavailable");
                (false, HashMap::new())
            }
        };

        debug!(dir = %dir.display(), files = sizes.len(), "Opened file key-value store");
        Self {
            dir,
            max_bytes,
            sizes: Mutex::new(sizes),
            available,
        }
    }

    fn scan_sizes(dir: &Path) -> HashMap<String, usize> {
        let Ok(entries) = fs::read_dir(dir) else {
            return HashMap::new();
        };

        entries
            .filter_map(Result::ok)
            .filter(|e| e.path().extension().is_some_and(|ext| ext == VALUE_EXTENSION))
            .filter_map(|e| {
                let name = e.file_name().to_string_lossy().to_string();
                let len = e.metadata().ok()?.len() as usize;
                Some((name, len))
            })
            .collect()
    }

    /// Keys become file names; anything outside a safe set is replaced.
    fn file_name(key: &str) -> String {
        let safe: String = key
            .chars()
            .map(|c| if c.is_ascii_alphanumeric() || c == '-' || c == '_' { c } else { '_' })
            .collect();
        format!("{safe}.{VALUE_EXTENSION}")
    }

    fn ensure_available(&self) -> Result<(), StorageError> {
        if self.available {
            Ok(())
        } else {
            Err(StorageError::Unavailable(format!(
                "cache directory {} could not be created",
                self.dir.display()
            )))
        }
    }

    #[must_use]
    pub fn used_bytes(&self) -> usize {
        self.sizes.lock().values().sum()
    }

    #[must_use]
    pub fn dir(&self) -> &Path {
        &self.dir
    }
}

impl KeyValueStore for FileKeyValueStore {
    fn get(&self, key: &str) -> Result<Option<String>, StorageError> {
        self.ensure_available()?;
        match fs::read_to_string(self.dir.join(Self::file_name(key))) {
            Ok(value) => Ok(Some(value)),
            Err(e) if e.kind() == ErrorKind::NotFound => Ok(None),
            Err(e) => Err(StorageError::Backend(e.to_string())),
        }
    }

    fn set(&self, key: &str, value: &str) -> Result<(), StorageError> {
        self.ensure_available()?;
        let name = Self::file_name(key);
        let mut sizes = self.sizes.lock();

        let others: usize = sizes.iter().filter(|(k, _)| **k != name).map(|(_, v)| *v).sum();
        let needed = others + value.len();
        if needed > self.max_bytes {
            return Err(StorageError::QuotaExceeded { needed, limit: self.max_bytes });
        }

        let mut tmp = NamedTempFile::new_in(&self.dir)
            .map_err(|e| StorageError::Backend(format!("temp file: {e}")))?;
        tmp.write_all(value.as_bytes())
            .and_then(|()| tmp.as_file().sync_all())
            .map_err(|e| StorageError::Backend(format!("write: {e}")))?;
        tmp.persist(self.dir.join(&name))
            .map_err(|e| StorageError::Backend(format!("rename: {e}")))?;

        sizes.insert(name, value.len());
        Ok(())
    }

    fn remove(&self, key: &str) -> Result<(), StorageError> {
        self.ensure_available()?;
        let name = Self::file_name(key);
        let mut sizes = self.sizes.lock();
        match fs::remove_file(self.dir.join(&name)) {
            Ok(()) => {}
            Err(e) if e.kind() == ErrorKind::NotFound => {}
            Err(e) => return Err(StorageError::Backend(e.to_string())),
        }
        sizes.remove(&name);
        Ok(())
    }

    fn is_available(&self) -> bool {
        self.available
    }
}
