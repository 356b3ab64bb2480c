//! This module builds reference catalogs from collections of genome files.
//!
//! Genomes are sketched independently in parallel on the rayon thread pool. Each
//! worker produces a self-contained sketch for its file and sends it back over a
//! channel; the calling thread is the only one that touches the accumulator and
//! merges results in whatever order they complete. Since merging is commutative
//! and associative, the completion order does not affect the final catalog.
//!
//! Files that cannot be opened or parsed are skipped and reported. The build
//! fails only if no file could be sketched.

use std::path::{Path, PathBuf};
use std::sync::mpsc;
use std::time::{Duration, Instant};

use log::{debug, info, warn};
use needletail::parse_fastx_file;
use num_format::{Locale, ToFormattedString};
use rayon::iter::{IntoParallelRefIterator, ParallelIterator};

use crate::catalog::{Catalog, CatalogMetadata};
use crate::error::{KrarityError, Result};
use crate::io_utils::genome_id_from_filename;
use crate::progress::progress_bar;
use crate::sketch::CardinalitySketch;
use crate::sketch_params::SketchParams;

/// Sketch of a single sequence file.
#[derive(Clone, Debug)]
pub struct FileSketch {
    pub sketch: CardinalitySketch,
    pub num_records: u64,
    pub num_kmers: u64,
}

/// A genome file excluded from the catalog.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct FileFailure {
    pub path: PathBuf,
    pub reason: String,
}

/// Result of a catalog build.
#[derive(Debug)]
pub struct BuildReport {
    pub catalog: Catalog,
    pub file_count: usize,
    pub successes: usize,
    pub failures: Vec<FileFailure>,
    pub elapsed: Duration,
}

impl BuildReport {
    pub fn kmer_length(&self) -> u8 {
        self.catalog.params().k()
    }

    pub fn precision(&self) -> u8 {
        self.catalog.params().precision()
    }

    pub fn estimate(&self) -> f64 {
        self.catalog.cardinality()
    }
}

/// Create sketch from sequence file.
pub fn sketch_file(seq_file: &Path, params: &SketchParams) -> Result<FileSketch> {
    if !seq_file.exists() {
        return Err(KrarityError::InputNotFound(seq_file.to_path_buf()));
    }

    let mut sketch = params.create_sketch();
    let mut num_records = 0;
    let mut num_kmers = 0;

    let mut fastx_reader = parse_fastx_file(seq_file)?;
    while let Some(rec) = fastx_reader.next() {
        let record = rec?;
        num_kmers += sketch.add_seq(&record.seq());
        num_records += 1;
    }

    Ok(FileSketch {
        sketch,
        num_records,
        num_kmers,
    })
}

/// Build a catalog over the given genome files.
pub fn build_catalog(genome_files: &[PathBuf], params: &SketchParams, name: &str) -> Result<BuildReport> {
    let start = Instant::now();
    let progress_bar = progress_bar(genome_files.len() as u64);

    let (sender, receiver) = mpsc::channel();
    let mut accumulator = params.create_sketch();
    let mut successes = 0;
    let mut failures = Vec::new();

    std::thread::scope(|scope| -> Result<()> {
        scope.spawn(move || {
            genome_files.par_iter().for_each_with(sender, |sender, genome_file| {
                let result = sketch_file(genome_file, params);

                // a closed channel means the coordinator has already given up
                let _ = sender.send((genome_file, result));
            });
        });

        for (genome_file, result) in receiver {
            match result {
                Ok(file_sketch) => {
                    accumulator.absorb(&file_sketch.sketch)?;
                    successes += 1;
                    debug!(
                        "Sketched {}: {} records, {} k-mers",
                        genome_id_from_filename(genome_file),
                        file_sketch.num_records,
                        file_sketch.num_kmers
                    );
                }
                Err(err) => {
                    warn!("Skipping genome file {}: {}", genome_file.display(), err);
                    failures.push(FileFailure {
                        path: genome_file.clone(),
                        reason: err.to_string(),
                    });
                }
            }
            progress_bar.inc(1);
        }

        Ok(())
    })?;

    progress_bar.finish();

    if successes == 0 {
        return Err(KrarityError::NoGenomesSketched {
            failures: failures.len(),
        });
    }

    failures.sort_by(|a, b| a.path.cmp(&b.path));

    let metadata = CatalogMetadata::now(
        name,
        genome_files.len() as u64,
        successes as u64,
        failures.len() as u64,
    );
    let catalog = Catalog::new(accumulator, Some(metadata));
    let elapsed = start.elapsed();

    info!(
        "Sketched {} of {} genomes in {:.2} s ({:.3} s/genome).",
        successes,
        genome_files.len(),
        elapsed.as_secs_f64(),
        elapsed.as_secs_f64() / genome_files.len() as f64
    );
    if !failures.is_empty() {
        warn!("{} genome files could not be sketched.", failures.len());
    }
    info!(
        "Catalog cardinality: {} distinct k-mers",
        (catalog.cardinality().round() as u64).to_formatted_string(&Locale::en)
    );

    Ok(BuildReport {
        catalog,
        file_count: genome_files.len(),
        successes,
        failures,
        elapsed,
    })
}
