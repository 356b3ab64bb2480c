//! Command-line interface definition for the krarity application.
//!
//! This file defines the `Cli` struct using the `clap` crate to parse and validate command-line arguments.
//! The `build` command sketches a directory (or list) of reference genomes into a catalog file, and the
//! `analyze` command streams a read file against a catalog and writes one detection record per window.
//! Custom value parsers are provided for k-mer length, precision, error rate, and thread count.
//! The CLI output is styled using the `anstyle` crate for improved readability.

use std::path::PathBuf;

use clap::{Args, Parser, Subcommand};

use krarity::kmer::MAX_KMER_LENGTH;
use krarity::sketch_params::{MAX_PRECISION, MIN_PRECISION};

const DEFAULT_K: u8 = 31;
const DEFAULT_WINDOW_SIZE: usize = 10_000;
const DEFAULT_CALIBRATION_WINDOWS: usize = 5;
const DEFAULT_SIGMA: f64 = 3.0;
const DEFAULT_SAFETY_CEILING: f64 = 0.20;
const DEFAULT_MIN_GAP: f64 = 0.01;
pub const DEFAULT_ERROR_RATE: f64 = 0.01;

#[derive(Parser)]
#[command(author, version, about, long_about = None)]
#[command(styles=get_styles())]
#[command(disable_help_subcommand = true)]
#[command(arg_required_else_help = true)]
pub struct Cli {
    #[command(subcommand)]
    pub command: Command,

    /// Number of threads to use
    #[arg(short, long, global = true, default_value_t = default_threads(), value_parser = validate_threads)]
    pub threads: usize,

    /// Log per-genome and per-window detail
    #[arg(short, long, global = true, default_value_t = false)]
    pub verbose: bool,
}

#[derive(Subcommand)]
pub enum Command {
    /// Build a reference catalog sketch from a collection of genomes
    Build(BuildArgs),

    /// Estimate the novel k-mer content of a read file, window by window
    Analyze(AnalyzeArgs),
}

#[derive(Args)]
pub struct BuildArgs {
    /// Directory of genomes to process (searched recursively)
    #[arg(short = 'i', long, help_heading = "Inputs", group = "input", value_parser = clap::value_parser!(PathBuf))]
    pub input_dir: Option<PathBuf>,

    /// File listing one genome FASTA path per line
    #[arg(short = 'g', long, help_heading = "Inputs", group = "input", value_parser = clap::value_parser!(PathBuf))]
    pub genome_list: Option<PathBuf>,

    /// Output catalog file
    #[arg(short = 'o', long, help_heading = "Output", value_parser = clap::value_parser!(PathBuf))]
    pub output: PathBuf,

    /// Catalog name [default: name of the input directory or list file]
    #[arg(short = 'n', long, help_heading = "Output")]
    pub name: Option<String>,

    /// Length of k-mers to use
    #[arg(short, long, help_heading = "Sketching parameters", default_value_t = DEFAULT_K, value_parser = validate_kmer_length)]
    pub kmer_length: u8,

    /// Register precision p; the sketch uses 2^p registers
    #[arg(short, long, help_heading = "Sketching parameters", value_parser = validate_precision)]
    pub precision: Option<u8>,

    /// Target relative error, used to choose the precision [default: 0.01]
    #[arg(short, long, help_heading = "Sketching parameters", conflicts_with = "precision", value_parser = validate_error_rate)]
    pub error_rate: Option<f64>,
}

#[derive(Args)]
pub struct AnalyzeArgs {
    /// Catalog file created with the build command
    #[arg(short, long, help_heading = "Inputs", value_parser = clap::value_parser!(PathBuf))]
    pub catalog: PathBuf,

    /// Read file to analyze (FASTA/FASTQ, optionally compressed)
    #[arg(short, long, help_heading = "Inputs", value_parser = clap::value_parser!(PathBuf))]
    pub input: PathBuf,

    /// Output TSV file with one row per window
    #[arg(short, long, help_heading = "Output", value_parser = clap::value_parser!(PathBuf))]
    pub output: PathBuf,

    /// Number of reads per window
    #[arg(short, long, help_heading = "Detection parameters", default_value_t = DEFAULT_WINDOW_SIZE)]
    pub window_size: usize,

    /// Number of initial windows used to calibrate the threshold
    #[arg(long, help_heading = "Detection parameters", default_value_t = DEFAULT_CALIBRATION_WINDOWS)]
    pub calibration_windows: usize,

    /// Standard deviations above the calibration mean at which a window alerts
    #[arg(short, long, help_heading = "Detection parameters", default_value_t = DEFAULT_SIGMA)]
    pub sigma: f64,

    /// Threshold used when the calibration mean itself exceeds this value
    #[arg(long, help_heading = "Detection parameters", default_value_t = DEFAULT_SAFETY_CEILING)]
    pub safety_ceiling: f64,

    /// Minimum distance between the threshold and the calibration mean
    #[arg(long, help_heading = "Detection parameters", default_value_t = DEFAULT_MIN_GAP)]
    pub min_gap: f64,
}

/// All available cores but one, which is left to the coordinating thread.
fn default_threads() -> usize {
    std::thread::available_parallelism()
        .map(|n| n.get().saturating_sub(1).max(1))
        .unwrap_or(1)
}

fn validate_kmer_length(k: &str) -> Result<u8, String> {
    let k: u8 = k
        .parse()
        .map_err(|_| format!("`{k}` isn't a valid k-mer length"))?;

    if !(1..=MAX_KMER_LENGTH).contains(&k) {
        return Err(format!("k-mer length must be in the range [1, {MAX_KMER_LENGTH}]"));
    }

    Ok(k)
}

fn validate_precision(p: &str) -> Result<u8, String> {
    let p: u8 = p
        .parse()
        .map_err(|_| format!("`{p}` isn't a valid precision"))?;

    if !(MIN_PRECISION..=MAX_PRECISION).contains(&p) {
        return Err(format!("precision must be in the range [{MIN_PRECISION}, {MAX_PRECISION}]"));
    }

    Ok(p)
}

fn validate_error_rate(rate: &str) -> Result<f64, String> {
    let rate: f64 = rate
        .parse()
        .map_err(|_| format!("`{rate}` isn't a valid error rate"))?;

    if !(rate > 0.0 && rate < 1.0) {
        return Err("error rate must be in the range (0, 1)".to_string());
    }

    Ok(rate)
}

fn validate_threads(threads: &str) -> Result<usize, String> {
    let threads: usize = threads
        .parse()
        .map_err(|_| format!("`{threads}` isn't a valid value"))?;

    if !(1..=1024).contains(&threads) {
        return Err("Threads  must be in the range [1, 1024]".to_string());
    }

    Ok(threads)
}

fn get_styles() -> clap::builder::Styles {
    clap::builder::Styles::styled()
        .usage(
            anstyle::Style::new()
                .bold()
                .fg_color(Some(anstyle::Color::Ansi(anstyle::AnsiColor::White))),
        )
        .header(
            anstyle::Style::new()
                .bold()
                .fg_color(Some(anstyle::Color::Ansi(anstyle::AnsiColor::White))),
        )
        .literal(
            anstyle::Style::new().fg_color(Some(anstyle::Color::Ansi(anstyle::AnsiColor::Green))),
        )
        .invalid(
            anstyle::Style::new()
                .bold()
                .fg_color(Some(anstyle::Color::Ansi(anstyle::AnsiColor::Red))),
        )
        .error(
            anstyle::Style::new()
                .bold()
                .fg_color(Some(anstyle::Color::Ansi(anstyle::AnsiColor::Red))),
        )
        .valid(
            anstyle::Style::new()
                .bold()
                .underline()
                .fg_color(Some(anstyle::Color::Ansi(anstyle::AnsiColor::Green))),
        )
        .placeholder(
            anstyle::Style::new().fg_color(Some(anstyle::Color::Ansi(anstyle::AnsiColor::White))),
        )
}
