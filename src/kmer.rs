//! Canonical k-mer extraction.
//!
//! K-mers are packed 2 bits per base (A=0, C=1, G=2, T=3) into a `u64`, which
//! limits k to 32. With this encoding numeric order equals lexicographic order,
//! so the canonical k-mer is simply the smaller of the forward and reverse
//! complement words. Any k-mer spanning a base outside {A,C,G,T} is skipped.

use crate::hashing::{INVALID_NT, NT_TO_BYTE};

pub type Kmer = u64;

/// Largest k-mer length that fits in a packed `Kmer`.
pub const MAX_KMER_LENGTH: u8 = 32;

const BYTE_TO_NT: [u8; 4] = [b'A', b'C', b'G', b'T'];

/// Lazy iterator over the canonical k-mers of a sequence.
// Rolling forward/reverse encoding modified from the fmh_seeds method by Jim Shaw in skani.
#[derive(Clone, Debug)]
pub struct CanonicalKmers<'a> {
    seq: &'a [u8],
    k: usize,
    pos: usize,
    valid_run: usize,
    fwd_kmer: Kmer,
    rev_kmer: Kmer,
    fwd_mask: Kmer,
    rev_shift_dist: usize,
}

impl Iterator for CanonicalKmers<'_> {
    type Item = Kmer;

    fn next(&mut self) -> Option<Kmer> {
        while self.pos < self.seq.len() {
            let nuc = NT_TO_BYTE[self.seq[self.pos] as usize];
            self.pos += 1;

            if nuc == INVALID_NT {
                self.valid_run = 0;
                self.fwd_kmer = 0;
                self.rev_kmer = 0;
                continue;
            }

            let nuc_f = nuc as Kmer;
            self.fwd_kmer = ((self.fwd_kmer << 2) | nuc_f) & self.fwd_mask;

            let nuc_r = 3 - nuc_f;
            self.rev_kmer = (self.rev_kmer >> 2) | (nuc_r << self.rev_shift_dist);

            self.valid_run += 1;
            if self.valid_run >= self.k {
                return Some(self.fwd_kmer.min(self.rev_kmer));
            }
        }

        None
    }
}

/// Canonical k-mers of `seq` in order of occurrence.
///
/// Case-insensitive. Sequences shorter than `k` and k outside [1, 32]
/// produce no k-mers.
pub fn canonicalize(seq: &[u8], k: u8) -> CanonicalKmers<'_> {
    let k = k as usize;
    let usable = (1..=MAX_KMER_LENGTH as usize).contains(&k);

    CanonicalKmers {
        seq,
        k,
        pos: if usable { 0 } else { seq.len() },
        valid_run: 0,
        fwd_kmer: 0,
        rev_kmer: 0,
        fwd_mask: if usable { Kmer::MAX >> (64 - 2 * k) } else { 0 },
        rev_shift_dist: if usable { 2 * (k - 1) } else { 0 },
    }
}

/// Pack a k-mer. Returns `None` if it is too long or holds an ambiguous base.
pub fn encode_kmer(kmer: &[u8]) -> Option<Kmer> {
    if kmer.len() > MAX_KMER_LENGTH as usize {
        return None;
    }

    let mut packed: Kmer = 0;
    for &b in kmer {
        let nuc = NT_TO_BYTE[b as usize];
        if nuc == INVALID_NT {
            return None;
        }
        packed = (packed << 2) | nuc as Kmer;
    }

    Some(packed)
}

/// Unpack a k-mer into upper-case bases.
pub fn decode_kmer(kmer: Kmer, k: u8) -> Vec<u8> {
    (0..k as usize)
        .rev()
        .map(|i| BYTE_TO_NT[((kmer >> (2 * i)) & 3) as usize])
        .collect()
}

/// Reverse complement of a sequence. Bases outside {A,C,G,T} become `N`.
pub fn reverse_complement(seq: &[u8]) -> Vec<u8> {
    seq.iter()
        .rev()
        .map(|&b| match NT_TO_BYTE[b as usize] {
            INVALID_NT => b'N',
            nuc => BYTE_TO_NT[3 - nuc as usize],
        })
        .collect()
}
