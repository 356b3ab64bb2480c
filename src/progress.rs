//! Utilities for creating and styling progress indicators using the `indicatif` crate.
//!
//! Catalog builds know how many genome files they will process and use a bar;
//! stream analysis does not know its length up front and uses a spinner.

use std::time::Duration;

use indicatif::{ProgressBar, ProgressStyle};

/// Create a progress bar over a known number of genome files.
pub fn progress_bar(len: u64) -> ProgressBar {
    let progress_bar = ProgressBar::new(len);
    progress_bar.set_style(ProgressStyle::default_bar().template(
        "[{elapsed_precise}] {bar:40.cyan/blue} {percent}% [{human_pos}/{human_len} genomes] [Remaining: {eta}]",
    ).expect("Invalid progress style."));

    progress_bar
}

/// Create a spinner reporting a running count and a terminal message.
pub fn progress_spinner() -> ProgressBar {
    let spinner = ProgressBar::new_spinner();
    spinner.set_style(ProgressStyle::default_spinner().template(
        "[{elapsed_precise}] {spinner:.cyan} {human_pos} windows [{msg}]",
    ).expect("Invalid progress style."));
    spinner.enable_steady_tick(Duration::from_millis(200));

    spinner
}
