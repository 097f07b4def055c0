//! Directory polling for newly written exposures.
//!
//! Files are ordered by last-modified time, which is acquisition order.
//! Each poll returns only the files never returned before.

use std::collections::HashSet;
use std::fs;
use std::path::{Path, PathBuf};
use std::time::SystemTime;

use crate::{Error, Result};

/// Extension predicate with excluded suffixes.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FileFilter {
    extensions: Vec<String>,
    excluded_suffixes: Vec<String>,
}

impl FileFilter {
    /// Accepts files ending in `.<ext>` for any of `extensions`.
    #[must_use]
    pub fn new<I, S>(extensions: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: AsRef<str>,
    {
        Self {
            extensions: extensions
                .into_iter()
                .map(|ext| format!(".{}", ext.as_ref().trim_start_matches('.')))
                .collect(),
            excluded_suffixes: Vec::new(),
        }
    }

    /// Detector images, skipping dark and raw frames.
    #[must_use]
    pub fn images(ext: &str) -> Self {
        let ext = ext.trim_start_matches('.');
        Self::new([ext])
            .exclude(format!(".dark.{ext}"))
            .exclude(format!(".raw.{ext}"))
    }

    /// Rejects files whose name ends with `suffix`.
    #[must_use]
    pub fn exclude(mut self, suffix: impl Into<String>) -> Self {
        self.excluded_suffixes.push(suffix.into());
        self
    }

    /// Returns true if `file_name` passes the filter.
    #[must_use]
    pub fn accepts(&self, file_name: &str) -> bool {
        self.extensions.iter().any(|ext| file_name.ends_with(ext.as_str()))
            && !self
                .excluded_suffixes
                .iter()
                .any(|suffix| file_name.ends_with(suffix.as_str()))
    }
}

/// Polls one directory for files matching a [`FileFilter`].
#[derive(Debug, Clone)]
pub struct FileWatcher {
    directory: PathBuf,
    filter: FileFilter,
    seen: Vec<PathBuf>,
    seen_set: HashSet<PathBuf>,
}

impl FileWatcher {
    /// Watches `directory`.
    ///
    /// # Errors
    /// Returns [`Error::NotADirectory`] if the path is missing or not a directory.
    pub fn new<P: AsRef<Path>>(directory: P, filter: FileFilter) -> Result<Self> {
        let directory = directory.as_ref();
        if !directory.is_dir() {
            return Err(Error::NotADirectory(directory.to_path_buf()));
        }
        Ok(Self {
            directory: directory.to_path_buf(),
            filter,
            seen: Vec::new(),
            seen_set: HashSet::new(),
        })
    }

    /// Watched directory.
    #[must_use]
    pub fn directory(&self) -> &Path {
        &self.directory
    }

    /// Every matching file, oldest first.
    ///
    /// # Errors
    /// Returns an error if the directory or a file's metadata cannot be read.
    pub fn list(&self) -> Result<Vec<PathBuf>> {
        let mut entries: Vec<(SystemTime, String, PathBuf)> = Vec::new();
        for entry in fs::read_dir(&self.directory)? {
            let entry = entry?;
            let name = entry.file_name().to_string_lossy().into_owned();
            if !self.filter.accepts(&name) {
                continue;
            }
            let metadata = entry.metadata()?;
            if !metadata.is_file() {
                continue;
            }
            entries.push((metadata.modified()?, name, entry.path()));
        }
        entries.sort_by(|a, b| (a.0, &a.1).cmp(&(b.0, &b.1)));
        Ok(entries.into_iter().map(|(_, _, path)| path).collect())
    }

    /// Files not returned by any earlier poll, oldest first.
    ///
    /// # Errors
    /// See [`Self::list`].
    pub fn poll_new(&mut self) -> Result<Vec<PathBuf>> {
        let fresh: Vec<PathBuf> = self
            .list()?
            .into_iter()
            .filter(|path| !self.seen_set.contains(path))
            .collect();
        for path in &fresh {
            self.seen_set.insert(path.clone());
            self.seen.push(path.clone());
        }
        if !fresh.is_empty() {
            log::debug!("{} new files in {}", fresh.len(), self.directory.display());
        }
        Ok(fresh)
    }

    /// Un-sees `paths` so the next poll returns them again.
    pub fn forget(&mut self, paths: &[PathBuf]) {
        for path in paths {
            self.seen_set.remove(path);
        }
        self.seen.retain(|path| self.seen_set.contains(path));
    }

    /// Files already returned, in the order they were returned.
    #[must_use]
    pub fn seen(&self) -> &[PathBuf] {
        &self.seen
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::fs::File;
    use std::time::Duration;
    use tempfile::tempdir;

    fn touch(dir: &Path, name: &str, age_secs: u64) {
        let file = File::create(dir.join(name)).unwrap();
        let when = SystemTime::now() - Duration::from_secs(age_secs);
        file.set_modified(when).unwrap();
    }

    #[test]
    fn test_image_filter() {
        let filter = FileFilter::images("tif");
        assert!(filter.accepts("sample_001.tif"));
        assert!(!filter.accepts("sample_001.dark.tif"));
        assert!(!filter.accepts("sample_001.raw.tif"));
        assert!(!filter.accepts("Q_sample_001.chi"));
        assert!(!filter.accepts("sample_001.tiff"));
    }

    #[test]
    fn test_missing_directory() {
        let dir = tempdir().unwrap();
        let err = FileWatcher::new(dir.path().join("nope"), FileFilter::images("tif")).unwrap_err();
        assert!(matches!(err, Error::NotADirectory(_)));
    }

    #[test]
    fn test_list_orders_by_mtime() {
        let dir = tempdir().unwrap();
        touch(dir.path(), "b.tif", 30);
        touch(dir.path(), "a.tif", 10);
        touch(dir.path(), "c.tif", 20);
        touch(dir.path(), "c.dark.tif", 40);
        let watcher = FileWatcher::new(dir.path(), FileFilter::images("tif")).unwrap();
        let names: Vec<_> = watcher
            .list()
            .unwrap()
            .iter()
            .map(|p| p.file_name().unwrap().to_string_lossy().into_owned())
            .collect();
        assert_eq!(names, vec!["b.tif", "c.tif", "a.tif"]);
    }

    #[test]
    fn test_poll_returns_set_difference() {
        let dir = tempdir().unwrap();
        touch(dir.path(), "first.tif", 20);
        let mut watcher = FileWatcher::new(dir.path(), FileFilter::images("tif")).unwrap();
        assert_eq!(watcher.poll_new().unwrap().len(), 1);
        assert!(watcher.poll_new().unwrap().is_empty());
        assert!(watcher.poll_new().unwrap().is_empty());

        touch(dir.path(), "second.tif", 5);
        let fresh = watcher.poll_new().unwrap();
        assert_eq!(fresh, vec![dir.path().join("second.tif")]);
        assert_eq!(watcher.seen().len(), 2);

        watcher.forget(&fresh);
        assert_eq!(watcher.seen().len(), 1);
        assert_eq!(watcher.poll_new().unwrap(), fresh);
    }
}
