//! xpdview-algorithms: Derived views over an exposure stack.
//!
//! This crate provides:
//! - **Reduction** - parallel ROI statistics, one scalar per image
//! - **Peaks** - local-maximum peak positions per pattern
//! - **Waterfall** - normalized, offset 1D curves
//! - **Surface** - 3D wire/surface grids of all patterns
//!
#![warn(missing_docs)]

pub mod peaks;
mod reduction;
mod surface;
pub mod waterfall;

pub use peaks::{PeakAccumulator, PeakFinder, PeakPoint};
pub use reduction::{available_cpus, ReducedSeries, ReductionEngine};
pub use surface::WaterfallSurface;
pub use waterfall::{OffsetMode, Waterfall, WaterfallCurve};

// Re-export the statistic registry used by the engine
pub use xpdview_core::statistic::{Reducer, Statistic, StatisticRegistry};
