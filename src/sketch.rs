//! This module provides the `CardinalitySketch`, a HyperLogLog estimator of the
//! number of distinct canonical k-mers added to it. The sketch keeps `m = 2^p`
//! one-byte registers; each item is hashed to 64 bits, the top `p` bits select a
//! register and the register keeps the largest `leading zeros + 1` seen in the
//! remaining bits. Memory use is fixed at `m` bytes regardless of how many items
//! are added.
//!
//! Sketches built with the same parameters can be merged with an element-wise
//! maximum, which makes merging commutative, associative and idempotent.
//!
//! See Flajolet et al., 2007: https://algo.inria.fr/flajolet/Publications/FlFuGaMe07.pdf

use std::io::{Read, Write};

use crate::error::{KrarityError, Result};
use crate::hashing::{hash_bytes, tw_hash64, ItemHash};
use crate::io_utils::{expect_end, read_array, read_field};
use crate::kmer::{canonicalize, Kmer};
use crate::sketch_params::SketchParams;

pub const SKETCH_MAGIC: [u8; 4] = *b"KRHL";
pub const SKETCH_FORMAT_VERSION: u16 = 1;

/// 2^64, the size of the hash space.
const HASH_SPACE: f64 = 18_446_744_073_709_551_616.0;

/// Bias-correction constant for m registers.
pub fn alpha(num_registers: usize) -> f64 {
    match num_registers {
        16 => 0.673,
        32 => 0.697,
        64 => 0.709,
        m => 0.7213 / (1.0 + 1.079 / m as f64),
    }
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub struct CardinalitySketch {
    params: SketchParams,
    registers: Vec<u8>,
}

impl CardinalitySketch {
    pub fn new(params: SketchParams) -> Self {
        CardinalitySketch {
            params,
            registers: vec![0; params.num_registers()],
        }
    }

    pub fn params(&self) -> &SketchParams {
        &self.params
    }

    pub fn precision(&self) -> u8 {
        self.params.precision()
    }

    pub fn registers(&self) -> &[u8] {
        &self.registers
    }

    /// True if no item has been added.
    pub fn is_empty(&self) -> bool {
        self.registers.iter().all(|&r| r == 0)
    }

    /// Expected relative standard error, 1.04/√m.
    pub fn relative_error(&self) -> f64 {
        1.04 / (self.registers.len() as f64).sqrt()
    }

    /// Add an arbitrary byte string.
    pub fn add(&mut self, item: &[u8]) {
        self.add_hash(hash_bytes(item));
    }

    /// Add a packed canonical k-mer.
    #[inline]
    pub fn add_kmer(&mut self, kmer: Kmer) {
        self.add_hash(tw_hash64(kmer));
    }

    /// Add every canonical k-mer of a sequence, returning how many were added.
    pub fn add_seq(&mut self, seq: &[u8]) -> u64 {
        let mut num_kmers = 0;
        for kmer in canonicalize(seq, self.params.k()) {
            self.add_kmer(kmer);
            num_kmers += 1;
        }

        num_kmers
    }

    /// Add a pre-computed 64-bit hash.
    #[inline]
    pub fn add_hash(&mut self, hash: ItemHash) {
        let p = self.params.precision() as u32;
        let index = (hash >> (64 - p)) as usize;

        // low p bits of the shifted word are always zero, so the rank is at most 64 - p + 1
        let rest = hash << p;
        let rank: u8 = if rest == 0 {
            (64 - p + 1) as u8
        } else {
            (rest.leading_zeros() + 1) as u8
        };

        if rank > self.registers[index] {
            self.registers[index] = rank;
        }
    }

    /// Estimated number of distinct items.
    pub fn estimate(&self) -> f64 {
        let m = self.registers.len() as f64;

        let mut harmonic_sum = 0.0;
        let mut zero_registers = 0usize;
        for &r in &self.registers {
            harmonic_sum += 2f64.powi(-(r as i32));
            if r == 0 {
                zero_registers += 1;
            }
        }

        let raw = alpha(self.registers.len()) * m * m / harmonic_sum;

        if raw <= 2.5 * m {
            if zero_registers > 0 {
                // linear counting
                return m * (m / zero_registers as f64).ln();
            }
            return raw;
        }

        if raw > HASH_SPACE / 30.0 {
            let ratio = raw / HASH_SPACE;
            if ratio < 1.0 {
                return -HASH_SPACE * (1.0 - ratio).ln();
            }
        }

        raw
    }

    /// Union of two sketches as a new sketch. Neither operand is modified.
    pub fn merge(&self, other: &CardinalitySketch) -> Result<CardinalitySketch> {
        let mut union = self.clone();
        union.absorb(other)?;
        Ok(union)
    }

    /// In-place union, used by owners of an accumulator sketch.
    pub(crate) fn absorb(&mut self, other: &CardinalitySketch) -> Result<()> {
        self.params.check_compatibility(&other.params)?;

        for (r, &o) in self.registers.iter_mut().zip(&other.registers) {
            if o > *r {
                *r = o;
            }
        }

        Ok(())
    }

    /// Write the fixed binary layout: magic, version, p, k, registers.
    pub fn write_to<W: Write>(&self, writer: &mut W) -> Result<()> {
        writer.write_all(&SKETCH_MAGIC)?;
        writer.write_all(&SKETCH_FORMAT_VERSION.to_le_bytes())?;
        writer.write_all(&[self.params.precision(), self.params.k()])?;
        writer.write_all(&self.registers)?;
        Ok(())
    }

    /// Read a sketch written by `write_to`, leaving the reader just past the registers.
    pub fn read_from<R: Read>(reader: &mut R) -> Result<CardinalitySketch> {
        let magic: [u8; 4] = read_array(reader, "magic bytes")?;
        if magic != SKETCH_MAGIC {
            return Err(KrarityError::MalformedSketchFile(format!(
                "bad magic bytes {magic:?}"
            )));
        }

        let version = u16::from_le_bytes(read_array(reader, "format version")?);
        if version != SKETCH_FORMAT_VERSION {
            return Err(KrarityError::MalformedSketchFile(format!(
                "unsupported format version {version}"
            )));
        }

        let [precision, kmer_length]: [u8; 2] = read_array(reader, "sketch parameters")?;
        let params = SketchParams::new(kmer_length, precision)
            .map_err(|err| KrarityError::MalformedSketchFile(err.to_string()))?;

        let mut registers = vec![0u8; params.num_registers()];
        read_field(reader, &mut registers, "end of registers")?;

        let max_rank = 64 - precision + 1;
        if let Some(bad) = registers.iter().find(|&&r| r > max_rank) {
            return Err(KrarityError::MalformedSketchFile(format!(
                "register value {bad} exceeds {max_rank}"
            )));
        }

        Ok(CardinalitySketch { params, registers })
    }

    pub fn to_bytes(&self) -> Vec<u8> {
        let mut bytes = Vec::with_capacity(8 + self.registers.len());
        // writing to a Vec cannot fail
        let _ = self.write_to(&mut bytes);
        bytes
    }

    pub fn from_bytes(mut bytes: &[u8]) -> Result<CardinalitySketch> {
        let sketch = CardinalitySketch::read_from(&mut bytes)?;
        expect_end(&mut bytes)?;
        Ok(sketch)
    }
}
