//! Waterfall plot: stacked, offset copies of every integrated pattern.

use xpdview_core::{ExposureKey, IntegrationStore, Pattern};

#[cfg(feature = "serde")]
use serde::{Deserialize, Serialize};

/// Legend labels are truncated to this many characters.
pub const LEGEND_LEN: usize = 10;

/// How the x and y offsets are interpreted.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
#[cfg_attr(feature = "serde", serde(rename_all = "lowercase"))]
pub enum OffsetMode {
    /// Offsets are added as-is, multiplied by the curve index.
    #[default]
    Absolute,
    /// Offsets are fractions of the largest peak-to-peak span across curves.
    Range,
}

/// One offset curve ready to draw.
#[derive(Debug, Clone, PartialEq)]
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
pub struct WaterfallCurve {
    /// Exposure the curve belongs to.
    pub key: ExposureKey,
    /// Short legend label.
    pub label: String,
    /// Shifted x values.
    pub x: Vec<f64>,
    /// Shifted y values.
    pub y: Vec<f64>,
}

/// Min-max normalization of `y` into `[0, 1]`. A flat curve maps to zeros.
#[must_use]
pub fn normalize(y: &[f64]) -> Vec<f64> {
    let (min, max) = y
        .iter()
        .fold((f64::INFINITY, f64::NEG_INFINITY), |(lo, hi), &v| {
            (lo.min(v), hi.max(v))
        });
    let span = max - min;
    if span > 0.0 && span.is_finite() {
        y.iter().map(|v| (v - min) / span).collect()
    } else {
        vec![0.0; y.len()]
    }
}

fn peak_to_peak(values: &[f64]) -> f64 {
    let (lo, hi) = values
        .iter()
        .fold((f64::INFINITY, f64::NEG_INFINITY), |(lo, hi), &v| {
            (lo.min(v), hi.max(v))
        });
    if values.is_empty() {
        0.0
    } else {
        hi - lo
    }
}

/// Waterfall cache.
#[derive(Debug, Clone)]
pub struct Waterfall {
    keys: Vec<ExposureKey>,
    raw: Vec<Pattern>,
    normalized_data: Vec<Pattern>,
    normalized: bool,
    offset_mode: OffsetMode,
}

impl Default for Waterfall {
    fn default() -> Self {
        Self::new(true, OffsetMode::Absolute)
    }
}

impl Waterfall {
    /// Creates an empty waterfall.
    #[must_use]
    pub fn new(normalized: bool, offset_mode: OffsetMode) -> Self {
        Self {
            keys: Vec::new(),
            raw: Vec::new(),
            normalized_data: Vec::new(),
            normalized,
            offset_mode,
        }
    }

    /// Whether normalized copies are drawn.
    #[must_use]
    pub fn is_normalized(&self) -> bool {
        self.normalized
    }

    /// Switches between normalized and raw curves.
    pub fn set_normalized(&mut self, normalized: bool) {
        self.normalized = normalized;
    }

    /// Current offset interpretation.
    #[must_use]
    pub fn offset_mode(&self) -> OffsetMode {
        self.offset_mode
    }

    /// Sets the offset interpretation.
    pub fn set_offset_mode(&mut self, mode: OffsetMode) {
        self.offset_mode = mode;
    }

    /// Rebuilds the cache from the current key list.
    ///
    /// Missing patterns are drawn empty.
    pub fn normalize_data(&mut self, keys: &[ExposureKey], store: &IntegrationStore) {
        self.keys = keys.to_vec();
        self.raw = keys.iter().map(|key| store.give_plot(key.as_str())).collect();
        self.normalized_data = self
            .raw
            .iter()
            .map(|pattern| Pattern {
                x: pattern.x.clone(),
                y: normalize(&pattern.y),
            })
            .collect();
    }

    /// Curves currently drawn, before offsets.
    #[must_use]
    pub fn curves(&self) -> &[Pattern] {
        if self.normalized {
            &self.normalized_data
        } else {
            &self.raw
        }
    }

    /// Number of cached curves.
    #[must_use]
    pub fn len(&self) -> usize {
        self.keys.len()
    }

    /// Returns true if no curve is cached.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.keys.is_empty()
    }

    /// Offset curves in key order: curve `i` is shifted by `offset * i`.
    #[must_use]
    pub fn generate_waterfall(&self, x_offset: f64, y_offset: f64) -> Vec<WaterfallCurve> {
        let curves = self.curves();
        let (x_step, y_step) = match self.offset_mode {
            OffsetMode::Absolute => (x_offset, y_offset),
            OffsetMode::Range => {
                let (x_span, y_span) = curves.iter().fold((0.0_f64, 0.0_f64), |(xs, ys), c| {
                    (xs.max(peak_to_peak(&c.x)), ys.max(peak_to_peak(&c.y)))
                });
                (x_offset * x_span, y_offset * y_span)
            }
        };

        self.keys
            .iter()
            .zip(curves)
            .enumerate()
            .map(|(i, (key, curve))| {
                #[allow(clippy::cast_precision_loss)]
                let shift = i as f64;
                WaterfallCurve {
                    key: key.clone(),
                    label: key.short(LEGEND_LEN).to_string(),
                    x: curve.x.iter().map(|v| v + x_step * shift).collect(),
                    y: curve.y.iter().map(|v| v + y_step * shift).collect(),
                }
            })
            .collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_relative_eq;

    fn store_with(curves: &[(&str, Vec<f64>)]) -> IntegrationStore {
        let mut store = IntegrationStore::new();
        for (key, y) in curves {
            let x: Vec<f64> = (0..y.len()).map(|i| f64::from(u32::try_from(i).unwrap())).collect();
            store.insert((*key).into(), Pattern::new(x, y.clone()).unwrap()).unwrap();
        }
        store
    }

    #[test]
    fn test_normalize_range() {
        let y = normalize(&[2.0, 4.0, 6.0]);
        assert_relative_eq!(y[0], 0.0);
        assert_relative_eq!(y[1], 0.5);
        assert_relative_eq!(y[2], 1.0);
    }

    #[test]
    fn test_flat_curve_normalizes_to_zeros() {
        assert_eq!(normalize(&[3.0, 3.0, 3.0]), vec![0.0; 3]);
        assert!(normalize(&[]).is_empty());
    }

    #[test]
    fn test_absolute_offsets() {
        let store = store_with(&[("a", vec![0.0, 1.0]), ("b", vec![0.0, 2.0])]);
        let mut waterfall = Waterfall::default();
        waterfall.normalize_data(store.keys(), &store);
        let curves = waterfall.generate_waterfall(1.0, 0.5);
        assert_eq!(curves.len(), 2);
        assert_eq!(curves[0].y, vec![0.0, 1.0]);
        assert_eq!(curves[1].x, vec![1.0, 2.0]);
        assert_eq!(curves[1].y, vec![0.5, 1.5]);
    }

    #[test]
    fn test_raw_range_offsets() {
        let store = store_with(&[("a", vec![0.0, 4.0]), ("b", vec![1.0, 3.0])]);
        let mut waterfall = Waterfall::new(false, OffsetMode::Range);
        waterfall.normalize_data(store.keys(), &store);
        let curves = waterfall.generate_waterfall(0.0, 0.5);
        // largest y span is 4, so curve 1 moves up by 2
        assert_eq!(curves[1].y, vec![3.0, 5.0]);
        assert_eq!(curves[1].x, vec![0.0, 1.0]);
    }

    #[test]
    fn test_legend_label_truncated() {
        let store = store_with(&[("a_very_long_exposure_name", vec![0.0, 1.0])]);
        let mut waterfall = Waterfall::default();
        waterfall.normalize_data(store.keys(), &store);
        let curves = waterfall.generate_waterfall(0.0, 0.0);
        assert_eq!(curves[0].label, "a_very_lon");
    }
}
