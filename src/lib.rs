//! Streaming estimation of how much of a read stream's k-mer content is novel
//! relative to a reference catalog.
//!
//! Reference genomes are sketched in parallel into a mergeable cardinality
//! sketch (the catalog). Reads are then consumed in fixed-size windows; each
//! window is sketched, united with the catalog, and the growth of the union
//! relative to the catalog gives the window's novelty ratio. An adaptive
//! threshold calibrated on the first windows decides which windows alert.
//! Memory use is bounded by the sketch size and one window of reads.

pub mod builder;
pub mod catalog;
pub mod detector;
pub mod error;
pub mod hashing;
pub mod io_utils;
pub mod kmer;
pub mod progress;
pub mod report;
pub mod sketch;
pub mod sketch_params;
pub mod windows;

pub use crate::builder::{build_catalog, BuildReport};
pub use crate::catalog::Catalog;
pub use crate::detector::{DetectionRecord, DetectorParams, DetectorState, NoveltyDetector};
pub use crate::error::{KrarityError, Result};
pub use crate::sketch::CardinalitySketch;
pub use crate::sketch_params::SketchParams;
