//! Session configuration.

#[cfg(feature = "serde")]
use std::path::Path;

use xpdview_algorithms::{OffsetMode, PeakFinder, ReductionEngine};
use xpdview_core::{DetectorBounds, IntegrationParameters};

use crate::layout::PairingRule;
use crate::{Error, Result};

#[cfg(feature = "serde")]
use serde::{Deserialize, Serialize};

fn config_error(message: &str) -> Error {
    Error::Core(xpdview_core::Error::Config(message.to_string()))
}

/// Configuration for a viewing session.
#[derive(Clone, Debug, PartialEq)]
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
#[cfg_attr(feature = "serde", serde(default))]
pub struct SessionConfig {
    /// Extension of detector image files.
    pub image_extension: String,
    /// Extension of integrated pattern files.
    pub pattern_extension: String,
    /// Prefix tried first when pairing pattern files.
    pub pattern_prefix: String,
    /// ROIs are validated against these bounds.
    pub detector_bounds: DetectorBounds,
    /// Reduction worker count. `None` uses one per CPU.
    pub workers: Option<usize>,
    /// Peak neighborhood half-width.
    pub peak_order: usize,
    /// Shoulder distance of the peak filter (0 disables it).
    pub peak_sides: usize,
    /// Minimum peak height of the peak filter.
    pub peak_threshold: Option<f64>,
    /// Waterfall x offset per curve.
    pub x_offset: f64,
    /// Waterfall y offset per curve.
    pub y_offset: f64,
    /// Draw normalized waterfall curves.
    pub normalized: bool,
    /// Interpretation of the waterfall offsets.
    pub offset_mode: OffsetMode,
    /// Geometry handed to the integrator.
    pub integration: IntegrationParameters,
}

impl Default for SessionConfig {
    fn default() -> Self {
        Self {
            image_extension: "tif".to_string(),
            pattern_extension: "chi".to_string(),
            pattern_prefix: "Q_".to_string(),
            detector_bounds: DetectorBounds::default(),
            workers: None,
            peak_order: 30,
            peak_sides: 0,
            peak_threshold: None,
            x_offset: 0.0,
            y_offset: 0.5,
            normalized: true,
            offset_mode: OffsetMode::Absolute,
            integration: IntegrationParameters::default(),
        }
    }
}

impl SessionConfig {
    /// Set the image extension (leading dot optional).
    #[must_use]
    pub fn with_image_extension(mut self, ext: &str) -> Self {
        self.image_extension = ext.trim_start_matches('.').to_string();
        self
    }

    /// Set the pattern extension (leading dot optional).
    #[must_use]
    pub fn with_pattern_extension(mut self, ext: &str) -> Self {
        self.pattern_extension = ext.trim_start_matches('.').to_string();
        self
    }

    /// Set the pattern file prefix. An empty prefix disables the prefixed lookup.
    #[must_use]
    pub fn with_pattern_prefix(mut self, prefix: &str) -> Self {
        self.pattern_prefix = prefix.to_string();
        self
    }

    /// Set the detector bounds.
    #[must_use]
    pub fn with_detector_bounds(mut self, bounds: DetectorBounds) -> Self {
        self.detector_bounds = bounds;
        self
    }

    /// Set the number of reduction workers.
    ///
    /// Values less than 1 are clamped to 1. Use [`Self::try_with_workers`]
    /// to surface invalid values as an error instead.
    #[must_use]
    pub fn with_workers(mut self, workers: usize) -> Self {
        self.workers = Some(workers.max(1));
        self
    }

    /// Set the peak finder parameters.
    ///
    /// An order of 0 is clamped to 1. Use [`Self::try_with_peaks`] to
    /// surface it as an error instead.
    #[must_use]
    pub fn with_peaks(mut self, order: usize, sides: usize, threshold: Option<f64>) -> Self {
        self.peak_order = order.max(1);
        self.peak_sides = sides;
        self.peak_threshold = threshold;
        self
    }

    /// Set the waterfall offsets.
    #[must_use]
    pub fn with_offsets(mut self, x_offset: f64, y_offset: f64) -> Self {
        self.x_offset = x_offset;
        self.y_offset = y_offset;
        self
    }

    /// Draw normalized or raw waterfall curves.
    #[must_use]
    pub fn with_normalized(mut self, normalized: bool) -> Self {
        self.normalized = normalized;
        self
    }

    /// Set the waterfall offset interpretation.
    #[must_use]
    pub fn with_offset_mode(mut self, mode: OffsetMode) -> Self {
        self.offset_mode = mode;
        self
    }

    /// Set the integration geometry.
    #[must_use]
    pub fn with_integration(mut self, params: IntegrationParameters) -> Self {
        self.integration = params;
        self
    }

    /// Fallible variant of [`Self::with_workers`].
    ///
    /// # Errors
    /// Returns an error if `workers` is 0.
    pub fn try_with_workers(mut self, workers: usize) -> Result<Self> {
        if workers == 0 {
            return Err(config_error("workers must be at least 1"));
        }
        self.workers = Some(workers);
        Ok(self)
    }

    /// Fallible variant of [`Self::with_peaks`].
    ///
    /// # Errors
    /// Returns an error if `order` is 0.
    pub fn try_with_peaks(
        mut self,
        order: usize,
        sides: usize,
        threshold: Option<f64>,
    ) -> Result<Self> {
        if order == 0 {
            return Err(config_error("peak_order must be at least 1"));
        }
        self.peak_order = order;
        self.peak_sides = sides;
        self.peak_threshold = threshold;
        Ok(self)
    }

    /// Fallible variant of [`Self::with_detector_bounds`].
    ///
    /// # Errors
    /// Returns an error if either bound is 0.
    pub fn try_with_detector_bounds(mut self, bounds: DetectorBounds) -> Result<Self> {
        if bounds.max_x == 0 || bounds.max_y == 0 {
            return Err(config_error("detector bounds must be non-zero"));
        }
        self.detector_bounds = bounds;
        Ok(self)
    }

    /// Pairing rule for the configured extensions and prefix.
    #[must_use]
    pub fn pairing_rule(&self) -> PairingRule {
        PairingRule::new(
            &self.image_extension,
            &self.pattern_extension,
            &self.pattern_prefix,
        )
    }

    /// Peak finder for the configured parameters.
    ///
    /// # Errors
    /// Returns an error if `peak_order` is 0.
    pub fn peak_finder(&self) -> Result<PeakFinder> {
        Ok(PeakFinder::new(
            self.peak_order,
            self.peak_sides,
            self.peak_threshold,
        )?)
    }

    /// Reduction engine sized by `workers` and bounded by `detector_bounds`.
    #[must_use]
    pub fn engine(&self) -> ReductionEngine {
        let engine = match self.workers {
            Some(workers) => ReductionEngine::new(workers),
            None => ReductionEngine::with_available_cpus(),
        };
        engine.with_bounds(self.detector_bounds)
    }

    /// Reads a JSON configuration file. Missing fields take their defaults.
    ///
    /// # Errors
    /// Returns an error if the file cannot be read or parsed.
    #[cfg(feature = "serde")]
    pub fn load_json<P: AsRef<Path>>(path: P) -> Result<Self> {
        let text = std::fs::read_to_string(path)?;
        Ok(serde_json::from_str(&text)?)
    }

    /// Writes the configuration as pretty-printed JSON.
    ///
    /// # Errors
    /// Returns an error if the file cannot be written.
    #[cfg(feature = "serde")]
    pub fn save_json<P: AsRef<Path>>(&self, path: P) -> Result<()> {
        let text = serde_json::to_string_pretty(self)?;
        std::fs::write(path, text)?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults() {
        let config = SessionConfig::default();
        assert_eq!(config.pairing_rule(), PairingRule::new("tif", "chi", "Q_"));
        assert_eq!(config.peak_finder().unwrap(), PeakFinder::default());
        assert_eq!(config.detector_bounds, DetectorBounds::new(2048, 2048));
        assert!(config.normalized);
    }

    #[test]
    fn test_builders_clamp() {
        let config = SessionConfig::default().with_workers(0).with_peaks(0, 2, Some(1.0));
        assert_eq!(config.workers, Some(1));
        assert_eq!(config.peak_order, 1);
        assert_eq!(config.engine().workers(), 1);
    }

    #[test]
    fn test_try_builders_reject() {
        assert!(SessionConfig::default().try_with_workers(0).is_err());
        assert!(SessionConfig::default().try_with_peaks(0, 0, None).is_err());
        assert!(SessionConfig::default()
            .try_with_detector_bounds(DetectorBounds::new(0, 10))
            .is_err());
        let config = SessionConfig::default().try_with_workers(3).unwrap();
        assert_eq!(config.workers, Some(3));
    }

    #[cfg(feature = "serde")]
    #[test]
    fn test_json_round_trip_with_defaults() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("session.json");
        std::fs::write(&path, r#"{ "image_extension": "npy", "workers": 2 }"#).unwrap();
        let config = SessionConfig::load_json(&path).unwrap();
        assert_eq!(config.image_extension, "npy");
        assert_eq!(config.workers, Some(2));
        assert_eq!(config.pattern_prefix, "Q_");

        config.save_json(&path).unwrap();
        assert_eq!(SessionConfig::load_json(&path).unwrap(), config);
    }
}
