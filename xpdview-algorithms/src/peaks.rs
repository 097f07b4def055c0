//! Local-maximum peak finding over integrated patterns.
//!
//! A sample is a peak when it is strictly greater than every neighbor
//! within `order` samples on each side. Neighbor indices are clipped to
//! the array ends, so the first and last samples never qualify.

use xpdview_core::{Error, ExposureKey, IntegrationStore, Pattern, Result};

#[cfg(feature = "serde")]
use serde::{Deserialize, Serialize};

/// Default neighborhood half-width.
pub const DEFAULT_ORDER: usize = 30;

/// Strict relative maxima of `y` within `order` samples on each side.
#[must_use]
pub fn relative_maxima(y: &[f64], order: usize) -> Vec<usize> {
    let len = y.len();
    if len == 0 {
        return Vec::new();
    }
    let last = len - 1;
    (0..len)
        .filter(|&i| {
            (1..=order).all(|shift| {
                let ahead = (i + shift).min(last);
                let behind = i.saturating_sub(shift);
                y[i] > y[ahead] && y[i] > y[behind]
            })
        })
        .collect()
}

/// Peak detection settings.
#[derive(Debug, Clone, Copy, PartialEq)]
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
pub struct PeakFinder {
    order: usize,
    sides: usize,
    threshold: Option<f64>,
}

impl Default for PeakFinder {
    fn default() -> Self {
        Self {
            order: DEFAULT_ORDER,
            sides: 0,
            threshold: None,
        }
    }
}

impl PeakFinder {
    /// Creates a finder.
    ///
    /// # Errors
    /// Returns [`Error::Config`] if `order` is zero.
    pub fn new(order: usize, sides: usize, threshold: Option<f64>) -> Result<Self> {
        if order == 0 {
            return Err(Error::Config("peak order must be at least 1".into()));
        }
        Ok(Self {
            order,
            sides,
            threshold,
        })
    }

    /// Neighborhood half-width.
    #[must_use]
    pub fn order(&self) -> usize {
        self.order
    }

    /// Distance of the side samples used by the shoulder test.
    #[must_use]
    pub fn sides(&self) -> usize {
        self.sides
    }

    /// Minimum height kept by the shoulder test.
    #[must_use]
    pub fn threshold(&self) -> Option<f64> {
        self.threshold
    }

    /// Indices of the peaks of `y`.
    #[must_use]
    pub fn peak_indices(&self, y: &[f64]) -> Vec<usize> {
        let candidates = relative_maxima(y, self.order);
        match self.threshold {
            Some(threshold) if self.sides > 0 => {
                let sides = self.sides;
                candidates
                    .into_iter()
                    .filter(|&p| {
                        p >= sides
                            && p + sides < y.len()
                            && y[p] >= 2.0 * y[p + sides]
                            && y[p] >= 2.0 * y[p - sides]
                            && y[p] >= threshold
                    })
                    .collect()
            }
            _ => candidates,
        }
    }

    /// X positions of the peaks of `pattern`.
    #[must_use]
    pub fn get_peaks(&self, pattern: &Pattern) -> Vec<f64> {
        self.peak_indices(&pattern.y)
            .into_iter()
            .map(|i| pattern.x[i])
            .collect()
    }
}

/// One detected peak: the frame it belongs to and its x position.
#[derive(Debug, Clone, Copy, PartialEq)]
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
pub struct PeakPoint {
    /// Arrival index of the pattern.
    pub frame: usize,
    /// Peak position on the pattern's x axis.
    pub position: f64,
}

/// Peak scatter plot kept in step with the integration store.
#[derive(Debug, Clone, Default)]
pub struct PeakAccumulator {
    finder: PeakFinder,
    points: Vec<PeakPoint>,
    scanned: usize,
}

impl PeakAccumulator {
    /// Creates an empty accumulator.
    #[must_use]
    pub fn new(finder: PeakFinder) -> Self {
        Self {
            finder,
            points: Vec::new(),
            scanned: 0,
        }
    }

    /// Current finder settings.
    #[must_use]
    pub fn finder(&self) -> &PeakFinder {
        &self.finder
    }

    /// Replaces the finder. Takes effect on the next [`Self::get_plot`].
    pub fn set_finder(&mut self, finder: PeakFinder) {
        self.finder = finder;
    }

    /// Rescans every pattern listed in `keys`.
    pub fn get_plot(&mut self, keys: &[ExposureKey], store: &IntegrationStore) {
        self.points.clear();
        self.scanned = 0;
        for key in keys {
            if let Some(pattern) = store.get(key.as_str()) {
                self.push_pattern(pattern);
            } else {
                log::warn!("no integrated data for '{key}', skipping peak search");
            }
            self.scanned += 1;
        }
    }

    /// Appends the peaks of newly arrived patterns and returns how many were found.
    ///
    /// Frame indices continue from the number of patterns already scanned.
    pub fn update_the_plot<'a, I>(&mut self, new_patterns: I) -> usize
    where
        I: IntoIterator<Item = (&'a ExposureKey, &'a Pattern)>,
    {
        let before = self.points.len();
        for (key, pattern) in new_patterns {
            let found = self.push_pattern(pattern);
            log::debug!("frame {} ('{key}'): {found} peaks", self.scanned);
            self.scanned += 1;
        }
        self.points.len() - before
    }

    fn push_pattern(&mut self, pattern: &Pattern) -> usize {
        let frame = self.scanned;
        let positions = self.finder.get_peaks(pattern);
        let found = positions.len();
        self.points
            .extend(positions.into_iter().map(|position| PeakPoint { frame, position }));
        found
    }

    /// All peaks found so far.
    #[must_use]
    pub fn points(&self) -> &[PeakPoint] {
        &self.points
    }

    /// Number of patterns scanned.
    #[must_use]
    pub fn scanned(&self) -> usize {
        self.scanned
    }
}
