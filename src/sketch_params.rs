//! This module defines the `SketchParams` struct, which encapsulates the parameters
//! required to configure and create cardinality sketches: the k-mer length and the
//! register precision. It provides methods for constructing and validating parameter
//! sets, deriving a precision from a target error rate, creating sketches, and
//! checking compatibility between different parameter sets.

use serde::{Deserialize, Serialize};

use crate::error::{KrarityError, Result};
use crate::kmer::MAX_KMER_LENGTH;
use crate::sketch::CardinalitySketch;

pub const MIN_PRECISION: u8 = 4;
pub const MAX_PRECISION: u8 = 18;

#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct SketchParams {
    kmer_length: u8,
    precision: u8,
}

impl Default for SketchParams {
    fn default() -> Self {
        SketchParams {
            kmer_length: 31,
            precision: 14,
        }
    }
}

impl SketchParams {
    pub fn new(kmer_length: u8, precision: u8) -> Result<Self> {
        if !(1..=MAX_KMER_LENGTH).contains(&kmer_length) {
            return Err(KrarityError::InvalidKmerLength(kmer_length));
        }

        if !(MIN_PRECISION..=MAX_PRECISION).contains(&precision) {
            return Err(KrarityError::InvalidPrecision(precision));
        }

        Ok(SketchParams {
            kmer_length,
            precision,
        })
    }

    /// Smallest precision whose expected relative error (1.04/√m) does not exceed `error_rate`.
    pub fn from_error_rate(kmer_length: u8, error_rate: f64) -> Result<Self> {
        if !(error_rate > 0.0 && error_rate < 1.0) {
            return Err(KrarityError::InvalidParameter(format!(
                "error rate must be in (0, 1), got {error_rate}"
            )));
        }

        let registers = (1.04 / error_rate).powi(2);
        let precision = registers.log2().ceil().max(MIN_PRECISION as f64);
        if precision > MAX_PRECISION as f64 {
            return Err(KrarityError::InvalidParameter(format!(
                "error rate {error_rate} requires more than 2^{MAX_PRECISION} registers"
            )));
        }

        SketchParams::new(kmer_length, precision as u8)
    }

    pub fn create_sketch(&self) -> CardinalitySketch {
        CardinalitySketch::new(*self)
    }

    pub fn k(&self) -> u8 {
        self.kmer_length
    }

    pub fn precision(&self) -> u8 {
        self.precision
    }

    /// Number of registers, m = 2^p.
    pub fn num_registers(&self) -> usize {
        1 << self.precision
    }

    /// Return an error unless the sketches built with these parameters can be merged.
    pub fn check_compatibility(&self, other: &SketchParams) -> Result<()> {
        if self.precision() != other.precision() {
            return Err(KrarityError::PrecisionMismatch {
                left: self.precision(),
                right: other.precision(),
            });
        }

        // Registers of sketches over different k describe different item sets,
        // so a union would be meaningless even though it is computable.
        if self.k() != other.k() {
            return Err(KrarityError::KmerLengthMismatch {
                left: self.k(),
                right: other.k(),
            });
        }

        Ok(())
    }
}
