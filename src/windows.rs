//! Streaming access to reads and fixed-size batching of a read stream.
//!
//! `ReadStream` pulls records one at a time from a FASTA/FASTQ file (optionally
//! compressed) and yields owned sequences. `Windows` groups any fallible stream
//! into consecutive batches of W items, holding only the current batch in memory.

use std::path::Path;

use log::warn;
use needletail::{parse_fastx_file, FastxReader};

use crate::error::{KrarityError, Result};

/// Record-by-record reader over a sequence file. Qualities are ignored.
///
/// The parser cannot resume past a malformed record, so the first parse error
/// ends the stream and is passed to the caller rather than truncating it silently.
pub struct ReadStream {
    reader: Box<dyn FastxReader>,
    records: u64,
    finished: bool,
}

impl ReadStream {
    pub fn open(path: &Path) -> Result<Self> {
        if !path.exists() {
            return Err(KrarityError::InputNotFound(path.to_path_buf()));
        }

        Ok(ReadStream {
            reader: parse_fastx_file(path)?,
            records: 0,
            finished: false,
        })
    }

    /// Records successfully read so far.
    pub fn records(&self) -> u64 {
        self.records
    }
}

impl Iterator for ReadStream {
    type Item = Result<Vec<u8>>;

    fn next(&mut self) -> Option<Self::Item> {
        if self.finished {
            return None;
        }

        match self.reader.next() {
            None => {
                self.finished = true;
                None
            }
            Some(Ok(record)) => {
                self.records += 1;
                Some(Ok(record.seq().into_owned()))
            }
            Some(Err(err)) => {
                self.finished = true;
                warn!("Unreadable record after {} reads: {}", self.records, err);
                Some(Err(err.into()))
            }
        }
    }
}

/// A batch of consecutive reads.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Window<T> {
    pub reads: Vec<T>,
    /// True if the stream ended before the batch was filled.
    pub partial: bool,
}

/// Lazy, finite sequence of fixed-size batches over a fallible stream.
///
/// An error from the underlying stream is passed through and ends the sequence.
pub struct Windows<I> {
    stream: I,
    size: usize,
    done: bool,
}

impl<I> Windows<I> {
    pub fn new(stream: I, size: usize) -> Self {
        Windows {
            stream,
            size: size.max(1),
            done: false,
        }
    }
}

impl<I, T, E> Iterator for Windows<I>
where
    I: Iterator<Item = std::result::Result<T, E>>,
{
    type Item = std::result::Result<Window<T>, E>;

    fn next(&mut self) -> Option<Self::Item> {
        if self.done {
            return None;
        }

        let mut reads = Vec::with_capacity(self.size.min(1 << 16));
        while reads.len() < self.size {
            match self.stream.next() {
                Some(Ok(read)) => reads.push(read),
                Some(Err(err)) => {
                    self.done = true;
                    return Some(Err(err));
                }
                None => {
                    self.done = true;
                    break;
                }
            }
        }

        if reads.is_empty() {
            return None;
        }

        let partial = reads.len() < self.size;
        Some(Ok(Window { reads, partial }))
    }
}
