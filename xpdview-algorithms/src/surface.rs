//! Wire-frame / surface grid of every pattern.

use ndarray::Array2;
use xpdview_core::{Error, ExposureKey, IntegrationStore, Result};

/// Three `n_points x n_curves` grids for a 3D waterfall.
///
/// Column `i` holds curve `i`: `x` its pattern x values, `y` the curve
/// index repeated, `z` its intensities.
#[derive(Debug, Clone, PartialEq)]
pub struct WaterfallSurface {
    /// Pattern x values.
    pub x: Array2<f64>,
    /// Curve index.
    pub y: Array2<f64>,
    /// Pattern intensities.
    pub z: Array2<f64>,
}

impl WaterfallSurface {
    /// Builds the grids for `keys`.
    ///
    /// # Errors
    /// - [`Error::EmptyInput`] if `keys` is empty.
    /// - [`Error::ShapeMismatch`] if a pattern is missing or its length
    ///   differs from the first pattern's.
    pub fn build(keys: &[ExposureKey], store: &IntegrationStore) -> Result<Self> {
        let first = keys
            .first()
            .ok_or(Error::EmptyInput("no patterns for the waterfall surface"))?;
        let n_points = store.get(first.as_str()).map_or(0, |p| p.len());

        let mut x = Array2::zeros((n_points, keys.len()));
        let mut y = Array2::zeros((n_points, keys.len()));
        let mut z = Array2::zeros((n_points, keys.len()));

        for (col, key) in keys.iter().enumerate() {
            let pattern = store.get(key.as_str()).ok_or_else(|| Error::ShapeMismatch {
                key: key.to_string(),
                expected: n_points,
                actual: 0,
            })?;
            if pattern.len() != n_points {
                return Err(Error::ShapeMismatch {
                    key: key.to_string(),
                    expected: n_points,
                    actual: pattern.len(),
                });
            }
            #[allow(clippy::cast_precision_loss)]
            let index = col as f64;
            for row in 0..n_points {
                x[[row, col]] = pattern.x[row];
                y[[row, col]] = index;
                z[[row, col]] = pattern.y[row];
            }
        }

        Ok(Self { x, y, z })
    }

    /// `(n_points, n_curves)`.
    #[must_use]
    pub fn shape(&self) -> (usize, usize) {
        self.x.dim()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use xpdview_core::Pattern;

    #[test]
    fn test_surface_grids() {
        let mut store = IntegrationStore::new();
        store
            .insert("a".into(), Pattern::new(vec![0.0, 1.0, 2.0], vec![5.0, 6.0, 7.0]).unwrap())
            .unwrap();
        store
            .insert("b".into(), Pattern::new(vec![0.0, 1.0, 2.0], vec![8.0, 9.0, 10.0]).unwrap())
            .unwrap();
        let surface = WaterfallSurface::build(store.keys(), &store).unwrap();
        assert_eq!(surface.shape(), (3, 2));
        assert_eq!(surface.x[[2, 1]], 2.0);
        assert_eq!(surface.y[[0, 1]], 1.0);
        assert_eq!(surface.z[[1, 0]], 6.0);
    }

    #[test]
    fn test_surface_rejects_ragged_patterns() {
        let mut store = IntegrationStore::new();
        store
            .insert("a".into(), Pattern::new(vec![0.0, 1.0], vec![1.0, 1.0]).unwrap())
            .unwrap();
        store
            .insert("b".into(), Pattern::new(vec![0.0], vec![1.0]).unwrap())
            .unwrap();
        let err = WaterfallSurface::build(store.keys(), &store).unwrap_err();
        assert!(matches!(
            err,
            Error::ShapeMismatch { expected: 2, actual: 1, .. }
        ));
    }

    #[test]
    fn test_surface_empty_keys() {
        let store = IntegrationStore::new();
        assert!(matches!(
            WaterfallSurface::build(&[], &store),
            Err(Error::EmptyInput(_))
        ));
    }
}
