//! Reduced representation: one scalar per image over a region of interest.
//!
//! The ordered image stack is split into contiguous partitions, one per
//! worker. Each partition is reduced on a dedicated rayon pool that lives
//! only for the duration of the call, and the partial results are put back
//! in order by partition index.

use std::num::NonZeroUsize;

use rayon::prelude::*;
use sysinfo::System;
use xpdview_core::{
    DetectorBounds, Error, ExposureKey, Image, Result, Roi, StatisticRegistry,
};

#[cfg(feature = "serde")]
use serde::{Deserialize, Serialize};

/// Number of processing units on this host.
///
/// Falls back to the standard library estimate, then to 1.
#[must_use]
pub fn available_cpus() -> usize {
    let mut system = System::new();
    system.refresh_cpu();
    let count = system.cpus().len();
    if count > 0 {
        count
    } else {
        std::thread::available_parallelism().map_or(1, NonZeroUsize::get)
    }
}

/// Splits `items` into at most `parts` contiguous chunks tagged with their index.
fn partition<T>(items: &[T], parts: usize) -> Vec<(usize, &[T])> {
    if items.is_empty() {
        return Vec::new();
    }
    let chunk_len = items.len().div_ceil(parts.max(1));
    items.chunks(chunk_len).enumerate().collect()
}

/// Parallel ROI reduction over an ordered image stack.
#[derive(Debug, Clone)]
pub struct ReductionEngine {
    workers: usize,
    bounds: DetectorBounds,
}

impl Default for ReductionEngine {
    fn default() -> Self {
        Self::with_available_cpus()
    }
}

impl ReductionEngine {
    /// Creates an engine with a fixed worker count (at least 1).
    #[must_use]
    pub fn new(workers: usize) -> Self {
        Self {
            workers: workers.max(1),
            bounds: DetectorBounds::default(),
        }
    }

    /// Creates an engine with one worker per processing unit.
    #[must_use]
    pub fn with_available_cpus() -> Self {
        Self::new(available_cpus())
    }

    /// Sets the detector bounds ROIs are validated against.
    #[must_use]
    pub fn with_bounds(mut self, bounds: DetectorBounds) -> Self {
        self.bounds = bounds;
        self
    }

    /// Configured worker count.
    #[must_use]
    pub fn workers(&self) -> usize {
        self.workers
    }

    /// Detector bounds used for validation.
    #[must_use]
    pub fn bounds(&self) -> DetectorBounds {
        self.bounds
    }

    /// Reduces every image to one scalar, preserving input order.
    ///
    /// # Errors
    /// - [`Error::UnknownStatistic`] if `statistic` is not registered.
    /// - [`Error::InvalidRoi`] if the ROI violates ordering or detector bounds.
    /// - [`Error::RoiOutOfImage`] if the ROI does not fit an image.
    /// - Any error returned by the reducer; no partial result is kept.
    pub fn reduce<'a, I>(
        &self,
        images: I,
        roi: &Roi,
        statistic: &str,
        registry: &StatisticRegistry,
    ) -> Result<Vec<f64>>
    where
        I: IntoIterator<Item = (&'a ExposureKey, &'a Image)>,
    {
        let items: Vec<(&ExposureKey, &Image)> = images.into_iter().collect();

        let reducer = registry.get(statistic)?;
        roi.validate(&self.bounds)?;
        for (key, image) in &items {
            roi.check_fits(image, key.as_str())?;
        }
        if items.is_empty() {
            return Ok(Vec::new());
        }

        let partitions = partition(&items, self.workers);
        log::debug!(
            "reducing {} images with '{statistic}' over {roi}: {} partitions on {} workers",
            items.len(),
            partitions.len(),
            self.workers
        );

        let pool = rayon::ThreadPoolBuilder::new()
            .num_threads(self.workers)
            .thread_name(|i| format!("xpdview-reduce-{i}"))
            .build()
            .map_err(|e| Error::Config(format!("cannot build worker pool: {e}")))?;

        let mut chunks: Vec<(usize, Vec<f64>)> = pool.install(|| {
            partitions
                .par_iter()
                .map(|&(index, chunk)| {
                    let values = chunk
                        .iter()
                        .map(|(_, image)| reducer.reduce(roi.view(image)))
                        .collect::<Result<Vec<f64>>>()?;
                    Ok((index, values))
                })
                .collect::<Result<Vec<_>>>()
        })?;

        chunks.sort_by_key(|&(index, _)| index);
        let values: Vec<f64> = chunks.into_iter().flat_map(|(_, values)| values).collect();

        if values.len() != items.len() {
            return Err(Error::LengthMismatch {
                expected: items.len(),
                actual: values.len(),
            });
        }
        Ok(values)
    }

    /// Reduces only newly arrived images, for appending to an existing series.
    ///
    /// An empty input returns an empty vector without touching the pool.
    ///
    /// # Errors
    /// Same as [`Self::reduce`].
    pub fn reduce_with_new_data<'a, I>(
        &self,
        new_images: I,
        roi: &Roi,
        statistic: &str,
        registry: &StatisticRegistry,
    ) -> Result<Vec<f64>>
    where
        I: IntoIterator<Item = (&'a ExposureKey, &'a Image)>,
    {
        let mut new_images = new_images.into_iter().peekable();
        if new_images.peek().is_none() {
            return Ok(Vec::new());
        }
        self.reduce(new_images, roi, statistic, registry)
    }
}

/// A reduced representation: one value per exposure, in store order.
#[derive(Debug, Clone, PartialEq)]
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
pub struct ReducedSeries {
    /// Statistic name the values were computed with.
    pub label: String,
    /// Region the statistic was applied to.
    pub roi: Roi,
    /// One value per exposure.
    pub values: Vec<f64>,
}

impl ReducedSeries {
    /// Creates an empty series for `label` over `roi`.
    #[must_use]
    pub fn new(label: impl Into<String>, roi: Roi) -> Self {
        Self {
            label: label.into(),
            roi,
            values: Vec::new(),
        }
    }

    /// Appends values computed for newly arrived exposures.
    pub fn extend(&mut self, values: impl IntoIterator<Item = f64>) {
        self.values.extend(values);
    }

    /// Number of values.
    #[must_use]
    pub fn len(&self) -> usize {
        self.values.len()
    }

    /// Returns true if no value has been computed.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.values.is_empty()
    }

    /// `(frame index, value)` points for plotting.
    pub fn points(&self) -> impl Iterator<Item = (usize, f64)> + '_ {
        self.values.iter().copied().enumerate()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_relative_eq;
    use ndarray::Array2;

    #[test]
    fn test_partition_covers_everything_in_order() {
        let items: Vec<usize> = (0..10).collect();
        let parts = partition(&items, 3);
        assert_eq!(parts.len(), 3);
        assert_eq!(parts[0], (0, &items[0..4]));
        assert_eq!(parts[1], (1, &items[4..8]));
        assert_eq!(parts[2], (2, &items[8..10]));
    }

    #[test]
    fn test_partition_more_workers_than_items() {
        let items = [1, 2];
        let parts = partition(&items, 8);
        assert_eq!(parts.len(), 2);
        assert!(partition::<u8>(&[], 4).is_empty());
    }

    #[test]
    fn test_engine_clamps_workers() {
        assert_eq!(ReductionEngine::new(0).workers(), 1);
        assert!(available_cpus() >= 1);
    }

    #[test]
    fn test_reduce_single_image() {
        let key = ExposureKey::new("a");
        let image = Array2::from_elem((4, 4), 2.0);
        let engine = ReductionEngine::new(2);
        let values = engine
            .reduce(
                [(&key, &image)],
                &Roi::new(0, 2, 0, 2),
                "sum",
                &StatisticRegistry::new(),
            )
            .unwrap();
        assert_eq!(values.len(), 1);
        assert_relative_eq!(values[0], 8.0);
    }

    #[test]
    fn test_series_extend() {
        let mut series = ReducedSeries::new("mean", Roi::new(0, 1, 0, 1));
        series.extend([1.0, 2.0]);
        series.extend(Vec::new());
        assert_eq!(series.len(), 2);
        assert_eq!(series.points().collect::<Vec<_>>(), vec![(0, 1.0), (1, 2.0)]);
    }
}
