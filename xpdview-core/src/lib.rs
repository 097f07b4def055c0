//! xpdview-core: Core types for X-ray powder diffraction viewing.
//!
//! This crate provides exposure keys, detector images and 1D patterns,
//! regions of interest, the statistic registry, the ordered exposure
//! stores and the azimuthal integration boundary.
//!

pub mod error;
pub mod exposure;
pub mod integration;
pub mod roi;
pub mod statistic;
pub mod store;

pub use error::{Error, Result};
pub use exposure::{placeholder_image, ExposureKey, Image, Pattern, PLACEHOLDER_KEY};
pub use integration::{AzimuthalIntegrator, IntegrationParameters};
pub use roi::{DetectorBounds, Roi};
pub use statistic::{FnReducer, InsertPolicy, ReduceFn, Reducer, Statistic, StatisticRegistry};
pub use store::{ImageStore, IntegrationStore, OrderedStore};
