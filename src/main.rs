//! Main entry point for the krarity application.
//!
//! This file handles command-line parsing, logging setup, input validation, and orchestrates
//! the two commands: building a reference catalog sketch from a collection of genomes, and
//! analyzing a read file window by window against such a catalog. Results are written to
//! the output paths given on the command line.

use std::env;
use std::fs::File;
use std::io::{BufWriter, Write};
use std::path::{Path, PathBuf};
use std::time::Instant;

use anyhow::{bail, Context, Result};
use clap::Parser;
use log::info;
use num_format::{Locale, ToFormattedString};

use krarity::builder::{build_catalog, FileFailure};
use krarity::catalog::Catalog;
use krarity::detector::{DetectorParams, NoveltyDetector};
use krarity::io_utils::{find_genome_files, genome_id_from_filename, parse_genome_list};
use krarity::progress::progress_spinner;
use krarity::report::{RecordSink, TsvSink};
use krarity::sketch_params::SketchParams;
use krarity::windows::ReadStream;

use crate::cli::{AnalyzeArgs, BuildArgs, Cli, Command, DEFAULT_ERROR_RATE};
use crate::logging::setup_logger;

mod cli;
mod logging;

/// Common initialization required by all commands.
fn init(threads: usize) -> Result<()> {
    const VERSION: &str = env!("CARGO_PKG_VERSION");
    info!("{} v{}", env!("CARGO_PKG_NAME"), VERSION);
    info!("{}", env::args().collect::<Vec<String>>().join(" "));

    info!("Using {} threads.", threads);
    rayon::ThreadPoolBuilder::new()
        .num_threads(threads)
        .build_global()?;

    Ok(())
}

/// Directory holding an output file; the log file is written alongside it.
fn output_dir(output: &Path) -> PathBuf {
    match output.parent() {
        Some(parent) if !parent.as_os_str().is_empty() => parent.to_path_buf(),
        _ => PathBuf::from("."),
    }
}

fn format_count(value: f64) -> String {
    (value.round() as u64).to_formatted_string(&Locale::en)
}

fn write_failures(path: &Path, failures: &[FileFailure]) -> Result<()> {
    let mut writer = BufWriter::new(File::create(path)?);
    writeln!(writer, "path\treason")?;
    for failure in failures {
        writeln!(writer, "{}\t{}", failure.path.display(), failure.reason)?;
    }
    writer.flush()?;
    Ok(())
}

fn build(args: &BuildArgs) -> Result<()> {
    let (genome_files, default_name) = if let Some(genome_list) = &args.genome_list {
        info!("Using genome list: {}", genome_list.display());
        (parse_genome_list(genome_list)?, genome_id_from_filename(genome_list))
    } else if let Some(input_dir) = &args.input_dir {
        info!("Using input directory: {}", input_dir.display());
        (find_genome_files(input_dir)?, genome_id_from_filename(input_dir))
    } else {
        bail!("No input specified. Use --input-dir or --genome-list.");
    };

    if genome_files.is_empty() {
        bail!("No genomic FASTA files found.");
    }

    let params = match (args.precision, args.error_rate) {
        (Some(precision), _) => SketchParams::new(args.kmer_length, precision)?,
        (None, error_rate) => {
            SketchParams::from_error_rate(args.kmer_length, error_rate.unwrap_or(DEFAULT_ERROR_RATE))?
        }
    };
    let name = args.name.clone().unwrap_or(default_name);

    info!(
        "Building catalog '{}' from {} genomes (k = {}, p = {}, expected error = {:.2}%).",
        name,
        genome_files.len(),
        params.k(),
        params.precision(),
        100.0 * params.create_sketch().relative_error()
    );

    let report = build_catalog(&genome_files, &params, &name)?;

    report
        .catalog
        .save(&args.output)
        .with_context(|| format!("Failed to write catalog {}", args.output.display()))?;
    info!("Catalog written to {}", args.output.display());

    if !report.failures.is_empty() {
        let failures_path = PathBuf::from(format!("{}.failures.tsv", args.output.display()));
        write_failures(&failures_path, &report.failures)
            .with_context(|| format!("Failed to write {}", failures_path.display()))?;
        info!("Failed genome files listed in {}", failures_path.display());
    }

    info!(
        "Build summary: {} files, {} succeeded, {} failed, {} distinct k-mers, {:.2} s.",
        report.file_count,
        report.successes,
        report.failures.len(),
        format_count(report.estimate()),
        report.elapsed.as_secs_f64()
    );

    Ok(())
}

fn analyze(args: &AnalyzeArgs) -> Result<()> {
    let catalog = Catalog::load(&args.catalog)
        .with_context(|| format!("Failed to load catalog {}", args.catalog.display()))?;
    info!(
        "Catalog '{}': k = {}, p = {}, |R| = {} distinct k-mers",
        catalog.name(),
        catalog.params().k(),
        catalog.params().precision(),
        format_count(catalog.cardinality())
    );

    let params = DetectorParams::new(
        args.window_size,
        args.calibration_windows,
        args.sigma,
        args.safety_ceiling,
        args.min_gap,
    )?;

    let mut reads = ReadStream::open(&args.input)
        .with_context(|| format!("Failed to open reads {}", args.input.display()))?;
    let mut sink = TsvSink::create(&args.output)
        .with_context(|| format!("Failed to create {}", args.output.display()))?;

    info!(
        "Analyzing {} in windows of {} reads ({} calibration windows).",
        args.input.display(),
        params.window_size(),
        params.calibration_windows()
    );

    let spinner = progress_spinner();
    let mut num_windows = 0u64;
    let mut num_alerts = 0u64;

    let mut detections = NoveltyDetector::new(&catalog, params).run(reads.by_ref());
    for record in detections.by_ref() {
        let record = record.with_context(|| format!("Failed while reading {}", args.input.display()))?;
        sink.write_record(&record)?;

        num_windows += 1;
        if record.alert {
            num_alerts += 1;
        }
        spinner.inc(1);
        spinner.set_message(format!("rho = {:.4}", record.rho));
    }
    let threshold = detections.detector().threshold();
    drop(detections);

    sink.finish()?;
    spinner.finish_and_clear();

    info!(
        "Processed {} reads in {} windows; {} alerts.",
        reads.records().to_formatted_string(&Locale::en),
        num_windows,
        num_alerts
    );
    match threshold {
        Some(tau) => info!("Detection threshold: {:.6}", tau),
        None => info!("Stream ended before calibration completed; no threshold was set."),
    }
    info!("Results written to {}", args.output.display());

    Ok(())
}

fn main() -> Result<()> {
    let start = Instant::now();

    let args = Cli::parse();

    let out_dir = match &args.command {
        Command::Build(build_args) => output_dir(&build_args.output),
        Command::Analyze(analyze_args) => output_dir(&analyze_args.output),
    };
    std::fs::create_dir_all(&out_dir)?;
    setup_logger(&out_dir, args.verbose)?;

    init(args.threads)?;

    match &args.command {
        Command::Build(build_args) => build(build_args)?,
        Command::Analyze(analyze_args) => analyze(analyze_args)?,
    }

    info!("Elapsed time (sec): {:.2}", start.elapsed().as_secs_f32());
    info!("Done.");

    Ok(())
}
