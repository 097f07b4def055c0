//! Pairing of detector images with their integrated pattern files.
//!
//! An image `<stem>.tif` pairs with `Q_<stem>.chi` (prefix configurable),
//! falling back to `<stem>.chi`. For `.gr` files no prefix is expected.

use std::path::{Path, PathBuf};

use xpdview_core::ExposureKey;

use crate::watcher::{FileFilter, FileWatcher};
use crate::Result;

#[cfg(feature = "serde")]
use serde::Serialize;

/// Axis labels of a pattern kind.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "serde", derive(Serialize))]
pub struct AxisUnits {
    /// Horizontal axis label.
    pub x: &'static str,
    /// Vertical axis label.
    pub y: &'static str,
}

impl AxisUnits {
    /// Pair distribution function.
    pub const PDF: Self = Self {
        x: "r (Å)",
        y: "G (Å⁻²)",
    };
    /// Prefixed `.chi` written by the acquisition pipeline.
    pub const Q_NM: Self = Self {
        x: "Q (nm⁻¹)",
        y: "I(Q) (a.u.)",
    };
    /// Plain `.chi`, fit2d style.
    pub const Q_ANGSTROM: Self = Self {
        x: "Q (Å⁻¹)",
        y: "I(Q) (a.u.)",
    };
}

/// How a pattern file name is derived from an exposure key.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PairingRule {
    /// Image extension without the dot.
    pub image_ext: String,
    /// Pattern extension without the dot.
    pub pattern_ext: String,
    /// Prefix tried first for the pattern file name.
    pub prefix: String,
}

impl Default for PairingRule {
    fn default() -> Self {
        Self::new("tif", "chi", "Q_")
    }
}

impl PairingRule {
    /// Creates a rule. Leading dots on the extensions are dropped.
    #[must_use]
    pub fn new(image_ext: &str, pattern_ext: &str, prefix: &str) -> Self {
        Self {
            image_ext: image_ext.trim_start_matches('.').to_string(),
            pattern_ext: pattern_ext.trim_start_matches('.').to_string(),
            prefix: prefix.to_string(),
        }
    }

    /// Filter matching this rule's image files.
    #[must_use]
    pub fn image_filter(&self) -> FileFilter {
        FileFilter::images(&self.image_ext)
    }

    fn prefixed_name(&self, key: &str) -> Option<String> {
        (!self.prefix.is_empty()).then(|| format!("{}{key}.{}", self.prefix, self.pattern_ext))
    }

    fn plain_name(&self, key: &str) -> String {
        format!("{key}.{}", self.pattern_ext)
    }

    /// Pattern file for `key` in `dir`, prefixed name first.
    #[must_use]
    pub fn resolve_pattern(&self, dir: &Path, key: &ExposureKey) -> Option<PathBuf> {
        self.prefixed_name(key.as_str())
            .map(|name| dir.join(name))
            .filter(|path| path.is_file())
            .or_else(|| {
                let plain = dir.join(self.plain_name(key.as_str()));
                plain.is_file().then_some(plain)
            })
    }

    /// Axis labels implied by a resolved pattern path.
    #[must_use]
    pub fn units_for(&self, pattern: &Path) -> AxisUnits {
        let is_gr = pattern
            .extension()
            .is_some_and(|ext| ext.eq_ignore_ascii_case("gr"));
        if is_gr {
            return AxisUnits::PDF;
        }
        let prefixed = !self.prefix.is_empty()
            && pattern
                .file_name()
                .and_then(|name| name.to_str())
                .is_some_and(|name| name.starts_with(&self.prefix));
        if prefixed {
            AxisUnits::Q_NM
        } else {
            AxisUnits::Q_ANGSTROM
        }
    }
}

/// One exposure found on disk.
#[derive(Debug, Clone, PartialEq)]
#[cfg_attr(feature = "serde", derive(Serialize))]
pub struct ExposureEntry {
    /// Exposure key (image file stem).
    pub key: ExposureKey,
    /// Image file.
    pub image: PathBuf,
    /// Paired pattern file, if present.
    pub pattern: Option<PathBuf>,
}

/// Inventory of a data directory.
#[derive(Debug, Clone, PartialEq)]
#[cfg_attr(feature = "serde", derive(Serialize))]
pub struct DirectoryLayout {
    /// Scanned directory.
    pub directory: PathBuf,
    /// Exposures in modification-time order.
    pub exposures: Vec<ExposureEntry>,
    /// Units of the paired patterns, by majority.
    pub units: Option<AxisUnits>,
}

impl DirectoryLayout {
    /// Number of exposures with a pattern file.
    #[must_use]
    pub fn paired(&self) -> usize {
        self.exposures.iter().filter(|e| e.pattern.is_some()).count()
    }
}

/// Lists the exposures in `dir` and pairs each with its pattern file.
///
/// # Errors
/// Returns [`crate::Error::NotADirectory`] or an I/O error from the listing.
pub fn scan_layout<P: AsRef<Path>>(dir: P, rule: &PairingRule) -> Result<DirectoryLayout> {
    let dir = dir.as_ref();
    let watcher = FileWatcher::new(dir, rule.image_filter())?;

    let mut exposures = Vec::new();
    let mut votes: Vec<(AxisUnits, usize)> = Vec::new();
    for image in watcher.list()? {
        let Some(key) = ExposureKey::from_path(&image) else {
            continue;
        };
        let pattern = rule.resolve_pattern(dir, &key);
        if let Some(path) = &pattern {
            let units = rule.units_for(path);
            match votes.iter_mut().find(|(u, _)| *u == units) {
                Some((_, count)) => *count += 1,
                None => votes.push((units, 1)),
            }
        }
        exposures.push(ExposureEntry {
            key,
            image,
            pattern,
        });
    }

    let units = votes
        .into_iter()
        .max_by_key(|&(_, count)| count)
        .map(|(units, _)| units);

    Ok(DirectoryLayout {
        directory: dir.to_path_buf(),
        exposures,
        units,
    })
}
