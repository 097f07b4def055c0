//! Exposure keys, detector images and integrated 1D patterns.

use std::borrow::Borrow;
use std::fmt;
use std::path::Path;

use ndarray::Array2;

use crate::{Error, Result};

#[cfg(feature = "serde")]
use serde::{Deserialize, Serialize};

/// A 2D detector image indexed `[row, column]`, i.e. `[y, x]`.
pub type Image = Array2<f64>;

/// Key of the synthetic image shown before any real data is loaded.
pub const PLACEHOLDER_KEY: &str = "home";

/// Unique name of one acquisition, shared by its image and its pattern.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
#[cfg_attr(feature = "serde", serde(transparent))]
pub struct ExposureKey(String);

impl ExposureKey {
    /// Creates a key from any string-like value.
    pub fn new(key: impl Into<String>) -> Self {
        Self(key.into())
    }

    /// Derives the key from a file name by stripping directory and extension.
    ///
    /// Returns `None` for paths without a UTF-8 file stem.
    pub fn from_path(path: &Path) -> Option<Self> {
        path.file_stem()
            .and_then(|stem| stem.to_str())
            .map(Self::new)
    }

    /// Returns the key as a string slice.
    #[must_use]
    pub fn as_str(&self) -> &str {
        &self.0
    }

    /// Returns at most the first `n` characters, used for legend labels.
    #[must_use]
    pub fn short(&self, n: usize) -> &str {
        match self.0.char_indices().nth(n) {
            Some((idx, _)) => &self.0[..idx],
            None => &self.0,
        }
    }
}

impl fmt::Display for ExposureKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl Borrow<str> for ExposureKey {
    fn borrow(&self) -> &str {
        &self.0
    }
}

impl From<&str> for ExposureKey {
    fn from(value: &str) -> Self {
        Self::new(value)
    }
}

impl From<String> for ExposureKey {
    fn from(value: String) -> Self {
        Self(value)
    }
}

/// An azimuthally integrated 1D diffraction pattern.
#[derive(Debug, Clone, Default, PartialEq)]
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
pub struct Pattern {
    /// Scattering coordinate (Q, 2θ or r depending on the source).
    pub x: Vec<f64>,
    /// Intensity at each coordinate.
    pub y: Vec<f64>,
}

impl Pattern {
    /// Creates a pattern from equal-length coordinate and intensity vectors.
    ///
    /// # Errors
    /// Returns [`Error::LengthMismatch`] if `x` and `y` differ in length.
    pub fn new(x: Vec<f64>, y: Vec<f64>) -> Result<Self> {
        if x.len() != y.len() {
            return Err(Error::LengthMismatch {
                expected: x.len(),
                actual: y.len(),
            });
        }
        Ok(Self { x, y })
    }

    /// The empty pattern drawn when data is missing.
    #[must_use]
    pub fn empty() -> Self {
        Self::default()
    }

    /// Number of samples.
    #[must_use]
    pub fn len(&self) -> usize {
        self.x.len()
    }

    /// Returns true if the pattern has no samples.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.x.is_empty()
    }

    /// Returns `(min, max)` of the intensities, or `None` when empty.
    #[must_use]
    pub fn y_range(&self) -> Option<(f64, f64)> {
        min_max(&self.y)
    }

    /// Returns `(min, max)` of the coordinates, or `None` when empty.
    #[must_use]
    pub fn x_range(&self) -> Option<(f64, f64)> {
        min_max(&self.x)
    }
}

fn min_max(values: &[f64]) -> Option<(f64, f64)> {
    let first = *values.first()?;
    Some(
        values
            .iter()
            .fold((first, first), |(lo, hi), &v| (lo.min(v), hi.max(v))),
    )
}

/// Generates the radial-falloff image shown before a directory is set.
///
/// Intensity is `height / distance` from the image center, zero at the center.
#[must_use]
#[allow(clippy::cast_precision_loss)]
pub fn placeholder_image(rows: usize, cols: usize, height: f64) -> Image {
    let cy = rows / 2;
    let cx = cols / 2;
    Array2::from_shape_fn((rows, cols), |(r, c)| {
        if r == cy && c == cx {
            return 0.0;
        }
        let dy = r as f64 - cy as f64;
        let dx = c as f64 - cx as f64;
        height / (dy * dy + dx * dx).sqrt()
    })
}
