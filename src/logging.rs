//! Logging setup for the krarity binary.
//!
//! Messages go to stderr and to `krarity.log` next to the command's output. The log
//! file always records debug detail (per-genome sketch counts, periodic window
//! status) so a run can be audited afterwards; stderr shows it only with `--verbose`.

use std::path::Path;

use log::LevelFilter;
use log4rs::{
    append::{console::{ConsoleAppender, Target}, file::FileAppender},
    config::{Appender, Config, Logger, Root},
    encode::pattern::PatternEncoder,
    filter::threshold::ThresholdFilter,
};

pub const LOG_FILE_NAME: &str = "krarity.log";

const PATTERN: &str = "[{d(%Y-%m-%d %H:%M:%S)}] {h({l})}: {m}{n}";

/// Level shown on stderr.
fn console_level(verbose: bool) -> LevelFilter {
    if verbose { LevelFilter::Debug } else { LevelFilter::Info }
}

/// Configure logger to write to stderr and to a log file in `log_dir`.
pub fn setup_logger(log_dir: &Path, verbose: bool) -> anyhow::Result<()> {
    let stderr = ConsoleAppender::builder()
        .encoder(Box::new(PatternEncoder::new(PATTERN)))
        .target(Target::Stderr)
        .build();

    let logfile = FileAppender::builder()
        .encoder(Box::new(PatternEncoder::new(PATTERN)))
        .append(false)
        .build(log_dir.join(LOG_FILE_NAME))?;

    let config = Config::builder()
        .appender(
            Appender::builder()
                .filter(Box::new(ThresholdFilter::new(console_level(verbose))))
                .build("stderr", Box::new(stderr)),
        )
        .appender(
            Appender::builder()
                .filter(Box::new(ThresholdFilter::new(LevelFilter::Debug)))
                .build("logfile", Box::new(logfile)),
        )
        // only this crate's debug output is of interest
        .logger(Logger::builder().build("krarity", LevelFilter::Debug))
        .build(Root::builder().appender("stderr").appender("logfile").build(LevelFilter::Info))?;

    log4rs::init_config(config)?;
    Ok(())
}
