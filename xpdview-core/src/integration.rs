//! Azimuthal integration boundary.
//!
//! The physics lives outside this workspace. The session only needs to hand
//! an image and the current beam geometry to something that returns a
//! 1D pattern.

use crate::exposure::{Image, Pattern};
use crate::Result;

#[cfg(feature = "serde")]
use serde::{Deserialize, Serialize};

/// Beam geometry passed through to the integrator.
#[derive(Debug, Clone, Copy, PartialEq)]
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
pub struct IntegrationParameters {
    /// X-ray wavelength in Angstroms.
    pub wavelength: f64,
    /// Sample to detector distance in meters.
    pub distance: f64,
    /// Point of normal incidence along the slow axis (m).
    pub poni1: f64,
    /// Point of normal incidence along the fast axis (m).
    pub poni2: f64,
    /// First detector rotation (radians).
    pub rot1: f64,
    /// Second detector rotation (radians).
    pub rot2: f64,
}

impl Default for IntegrationParameters {
    fn default() -> Self {
        // Ni calibration at XPD
        Self {
            wavelength: 0.184_320,
            distance: 0.241_821_7,
            poni1: 0.100_679_3,
            poni2: 0.100_077_4,
            rot1: 0.0,
            rot2: 0.0,
        }
    }
}

/// Converts a detector image into a 1D diffraction pattern.
pub trait AzimuthalIntegrator: Send + Sync {
    /// Integrates `image` with the given geometry.
    ///
    /// # Errors
    /// Returns [`crate::Error::Integration`] if the image cannot be integrated.
    fn integrate(&self, image: &Image, params: &IntegrationParameters) -> Result<Pattern>;

    /// Short name used in log messages.
    fn name(&self) -> &'static str {
        "integrator"
    }
}
