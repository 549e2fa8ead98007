//! File-change detection for `FILES(...)` cells.
//!
//! A file-producer cell is dirty when its glob matches at least one file
//! modified strictly after the last build. That is the only way a cell
//! becomes dirty; everything else is rerun because it depends on one.
//!
//! Bad patterns and unreadable files are not errors here, they just don't
//! count as modified.

use std::io;
use std::path::{Path, PathBuf};
use std::sync::Arc;

use chrono::{DateTime, Utc};
use shellgrid_engine::engine::CellRef;
use tracing::debug;

use crate::sheet::Sheet;

/// Filesystem access needed by change tracking and `FILES(...)` evaluation.
pub trait FileSystem: Send + Sync {
    /// Paths matching the glob pattern, in the order the matcher yields them.
    fn glob(&self, pattern: &str) -> Vec<PathBuf>;

    fn modified(&self, path: &Path) -> io::Result<DateTime<Utc>>;
}

/// Source of "now" for build timestamps.
pub trait Clock: Send + Sync {
    fn now(&self) -> DateTime<Utc>;
}

/// The real filesystem, globbed with the `glob` crate.
#[derive(Debug, Clone, Copy, Default)]
pub struct OsFileSystem;

impl FileSystem for OsFileSystem {
    fn glob(&self, pattern: &str) -> Vec<PathBuf> {
        let paths = match glob::glob(pattern) {
            Ok(paths) => paths,
            Err(err) => {
                debug!(pattern, error = %err, "invalid glob pattern");
                return Vec::new();
            }
        };
        paths
            .filter_map(|entry| match entry {
                Ok(path) => Some(path),
                Err(err) => {
                    debug!(pattern, error = %err, "skipping unreadable glob entry");
                    None
                }
            })
            .collect()
    }

    fn modified(&self, path: &Path) -> io::Result<DateTime<Utc>> {
        let modified = std::fs::metadata(path)?.modified()?;
        Ok(DateTime::<Utc>::from(modified))
    }
}

#[derive(Debug, Clone, Copy, Default)]
pub struct SystemClock;

impl Clock for SystemClock {
    fn now(&self) -> DateTime<Utc> {
        Utc::now()
    }
}

/// Decides which file-producer cells need a rebuild.
#[derive(Clone)]
pub struct ChangeTracker {
    fs: Arc<dyn FileSystem>,
}

impl ChangeTracker {
    pub fn new(fs: Arc<dyn FileSystem>) -> Self {
        ChangeTracker { fs }
    }

    /// True if `cell` is a registered file producer with a matching file
    /// modified after `since`.
    pub fn is_dirty(&self, sheet: &Sheet, cell: &CellRef, since: DateTime<Utc>) -> bool {
        if !sheet.file_producers().contains(cell) {
            return false;
        }
        self.producer_changed(sheet, cell, since)
    }

    /// Every dirty file-producer cell, in row-major order.
    pub fn dirty_file_producers(&self, sheet: &Sheet, since: DateTime<Utc>) -> Vec<CellRef> {
        sheet
            .file_producers()
            .iter()
            .filter(|cell| self.producer_changed(sheet, cell, since))
            .copied()
            .collect()
    }

    /// Mtime check for a cell already known to be a file producer.
    fn producer_changed(&self, sheet: &Sheet, cell: &CellRef, since: DateTime<Utc>) -> bool {
        let Some(pattern) = sheet.cell(cell).and_then(|text| sheet.syntax().file_pattern(text))
        else {
            return false;
        };

        self.fs.glob(pattern).iter().any(|path| match self.fs.modified(path) {
            Ok(modified) => {
                let newer = modified > since;
                if newer {
                    debug!(cell = %cell, path = %path.display(), "file changed since last build");
                }
                newer
            }
            Err(err) => {
                debug!(cell = %cell, path = %path.display(), error = %err, "cannot stat file");
                false
            }
        })
    }
}

#[cfg(test)]
pub(crate) mod testing {
    //! In-memory filesystem and clock for deterministic tests.

    use super::*;
    use std::collections::BTreeMap;
    use std::sync::Mutex;

    #[derive(Default)]
    pub struct FakeFileSystem {
        files: Mutex<BTreeMap<PathBuf, Option<DateTime<Utc>>>>,
    }

    impl FakeFileSystem {
        pub fn with_file(self, path: &str, modified: DateTime<Utc>) -> Self {
            self.touch(path, modified);
            self
        }

        pub fn touch(&self, path: &str, modified: DateTime<Utc>) {
            self.files
                .lock()
                .unwrap()
                .insert(PathBuf::from(path), Some(modified));
        }

        /// A file that globs but cannot be stat'ed.
        pub fn with_broken_file(self, path: &str) -> Self {
            self.files.lock().unwrap().insert(PathBuf::from(path), None);
            self
        }
    }

    impl FileSystem for FakeFileSystem {
        /// Supports exact paths and a single `*` wildcard.
        fn glob(&self, pattern: &str) -> Vec<PathBuf> {
            let files = self.files.lock().unwrap();
            files
                .keys()
                .filter(|path| {
                    let path = path.to_string_lossy();
                    match pattern.split_once('*') {
                        Some((prefix, suffix)) => {
                            path.len() >= prefix.len() + suffix.len()
                                && path.starts_with(prefix)
                                && path.ends_with(suffix)
                        }
                        None => path == pattern,
                    }
                })
                .cloned()
                .collect()
        }

        fn modified(&self, path: &Path) -> io::Result<DateTime<Utc>> {
            match self.files.lock().unwrap().get(path) {
                Some(Some(modified)) => Ok(*modified),
                Some(None) => Err(io::Error::new(io::ErrorKind::PermissionDenied, "denied")),
                None => Err(io::Error::new(io::ErrorKind::NotFound, "missing")),
            }
        }
    }

    pub struct FixedClock(pub Mutex<DateTime<Utc>>);

    impl FixedClock {
        pub fn at(now: DateTime<Utc>) -> Self {
            FixedClock(Mutex::new(now))
        }
    }

    impl Clock for FixedClock {
        fn now(&self) -> DateTime<Utc> {
            *self.0.lock().unwrap()
        }
    }
}
