//! Rectangular regions of interest and detector bounds.

use std::fmt;

use ndarray::{s, ArrayView2};

use crate::exposure::Image;
use crate::{Error, Result};

#[cfg(feature = "serde")]
use serde::{Deserialize, Serialize};

/// Pixel extent of the detector, used to validate ROI stops.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
pub struct DetectorBounds {
    /// Number of columns (x extent).
    pub max_x: usize,
    /// Number of rows (y extent).
    pub max_y: usize,
}

impl Default for DetectorBounds {
    fn default() -> Self {
        // PerkinElmer flat panel used on the XPD beamline
        Self {
            max_x: 2048,
            max_y: 2048,
        }
    }
}

impl DetectorBounds {
    /// Creates bounds for a `max_x` by `max_y` detector.
    #[must_use]
    pub fn new(max_x: usize, max_y: usize) -> Self {
        Self { max_x, max_y }
    }
}

/// Half-open pixel window `[x_start, x_stop) x [y_start, y_stop)`.
///
/// `x` selects columns and `y` selects rows of an [`Image`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
pub struct Roi {
    pub x_start: usize,
    pub x_stop: usize,
    pub y_start: usize,
    pub y_stop: usize,
}

impl Roi {
    /// Creates an ROI without validating it.
    #[must_use]
    pub fn new(x_start: usize, x_stop: usize, y_start: usize, y_stop: usize) -> Self {
        Self {
            x_start,
            x_stop,
            y_start,
            y_stop,
        }
    }

    /// ROI covering a whole `rows` by `cols` image.
    #[must_use]
    pub fn full(rows: usize, cols: usize) -> Self {
        Self::new(0, cols, 0, rows)
    }

    /// Width in pixels.
    #[must_use]
    pub fn width(&self) -> usize {
        self.x_stop.saturating_sub(self.x_start)
    }

    /// Height in pixels.
    #[must_use]
    pub fn height(&self) -> usize {
        self.y_stop.saturating_sub(self.y_start)
    }

    /// Number of pixels covered.
    #[must_use]
    pub fn area(&self) -> usize {
        self.width() * self.height()
    }

    /// Checks ordering on both axes and the detector bounds.
    ///
    /// # Errors
    /// Returns [`Error::InvalidRoi`] describing the violated constraint.
    pub fn validate(&self, bounds: &DetectorBounds) -> Result<()> {
        if self.x_start >= self.x_stop {
            return Err(Error::InvalidRoi(format!(
                "x_start ({}) must be less than x_stop ({})",
                self.x_start, self.x_stop
            )));
        }
        if self.y_start >= self.y_stop {
            return Err(Error::InvalidRoi(format!(
                "y_start ({}) must be less than y_stop ({})",
                self.y_start, self.y_stop
            )));
        }
        if self.x_stop > bounds.max_x {
            return Err(Error::InvalidRoi(format!(
                "x_stop ({}) exceeds detector width ({})",
                self.x_stop, bounds.max_x
            )));
        }
        if self.y_stop > bounds.max_y {
            return Err(Error::InvalidRoi(format!(
                "y_stop ({}) exceeds detector height ({})",
                self.y_stop, bounds.max_y
            )));
        }
        Ok(())
    }

    /// Checks that the ROI lies inside `image`.
    ///
    /// # Errors
    /// Returns [`Error::RoiOutOfImage`] if the window extends past the image.
    pub fn check_fits(&self, image: &Image, key: &str) -> Result<()> {
        let (rows, cols) = image.dim();
        if self.y_stop > rows || self.x_stop > cols {
            return Err(Error::RoiOutOfImage {
                roi: self.to_string(),
                key: key.to_string(),
                rows,
                cols,
            });
        }
        Ok(())
    }

    /// Borrows the ROI sub-array of `image`.
    ///
    /// # Panics
    /// Panics if the ROI does not fit; call [`Self::check_fits`] first.
    #[must_use]
    pub fn view<'a>(&self, image: &'a Image) -> ArrayView2<'a, f64> {
        image.slice(s![self.y_start..self.y_stop, self.x_start..self.x_stop])
    }
}

impl fmt::Display for Roi {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "x[{}..{}] y[{}..{}]",
            self.x_start, self.x_stop, self.y_start, self.y_stop
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use ndarray::Array2;

    #[test]
    fn test_validate_ordering() {
        let bounds = DetectorBounds::default();
        assert!(Roi::new(0, 10, 0, 10).validate(&bounds).is_ok());
        assert!(matches!(
            Roi::new(10, 10, 0, 10).validate(&bounds),
            Err(Error::InvalidRoi(_))
        ));
        assert!(matches!(
            Roi::new(0, 10, 5, 2).validate(&bounds),
            Err(Error::InvalidRoi(_))
        ));
    }

    #[test]
    fn test_validate_detector_bounds() {
        let bounds = DetectorBounds::new(100, 50);
        assert!(Roi::new(0, 100, 0, 50).validate(&bounds).is_ok());
        assert!(Roi::new(0, 101, 0, 50).validate(&bounds).is_err());
        assert!(Roi::new(0, 100, 0, 51).validate(&bounds).is_err());
    }

    #[test]
    fn test_view_selects_rows_by_y() {
        let image = Array2::from_shape_fn((4, 6), |(r, c)| (r * 10 + c) as f64);
        let roi = Roi::new(1, 3, 2, 4);
        let view = roi.view(&image);
        assert_eq!(view.dim(), (2, 2));
        assert!((view[[0, 0]] - 21.0).abs() < f64::EPSILON);
        assert!((view[[1, 1]] - 32.0).abs() < f64::EPSILON);
    }

    #[test]
    fn test_check_fits() {
        let image = Array2::<f64>::zeros((10, 20));
        assert!(Roi::new(0, 20, 0, 10).check_fits(&image, "a").is_ok());
        let err = Roi::new(0, 21, 0, 10).check_fits(&image, "a").unwrap_err();
        assert!(matches!(err, Error::RoiOutOfImage { rows: 10, cols: 20, .. }));
    }
}
