//! Error kinds raised by sketching, catalog handling, and stream analysis.

use std::path::PathBuf;

use thiserror::Error;

use crate::kmer::MAX_KMER_LENGTH;
use crate::sketch_params::{MAX_PRECISION, MIN_PRECISION};

pub type Result<T> = std::result::Result<T, KrarityError>;

#[derive(Debug, Error)]
pub enum KrarityError {
    #[error("Input file {} does not exist", .0.display())]
    InputNotFound(PathBuf),

    #[error("Sketch has precision p = {left}, but other sketch has p = {right}")]
    PrecisionMismatch { left: u8, right: u8 },

    #[error("Sketch has k = {left}, but other sketch has k = {right}")]
    KmerLengthMismatch { left: u8, right: u8 },

    #[error("Precision must be in the range [{min}, {max}], got {0}", min = MIN_PRECISION, max = MAX_PRECISION)]
    InvalidPrecision(u8),

    #[error("k-mer length must be in the range [1, {max}], got {0}", max = MAX_KMER_LENGTH)]
    InvalidKmerLength(u8),

    #[error("Malformed sketch file: {0}")]
    MalformedSketchFile(String),

    #[error("No genome files could be sketched ({failures} failed)")]
    NoGenomesSketched { failures: usize },

    #[error("Invalid parameter: {0}")]
    InvalidParameter(String),

    #[error("Failed to parse sequence file: {0}")]
    Parse(#[from] needletail::errors::ParseError),

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
}
