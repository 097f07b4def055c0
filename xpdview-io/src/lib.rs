//! xpdview-io: Data directory access and the live viewing session.
//!
//! This crate polls a directory for new exposures, reads TIFF and NumPy
//! detector images (memory-mapped via memmap2), reads `.chi`/`.gr`
//! patterns, and keeps every derived view current in a [`Session`].
//!

pub mod config;
mod error;
pub mod image;
pub mod layout;
pub mod pattern;
pub mod session;
pub mod watcher;
mod writer;

pub use config::SessionConfig;
pub use error::{Error, Result};
pub use image::{decode_npy, decode_tiff, load_image, ImageFormat, MappedFileReader};
pub use layout::{scan_layout, AxisUnits, DirectoryLayout, ExposureEntry, PairingRule};
pub use pattern::{load_pattern, parse_pattern, PatternFormat};
pub use session::{Frame, PlotId, ReductionPlot, RefreshReport, Session};
pub use watcher::{FileFilter, FileWatcher};
pub use writer::ResultWriter;
