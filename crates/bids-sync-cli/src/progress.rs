use bids_sync_core::ProgressReporter;
use indicatif::{ProgressBar, ProgressStyle};
use std::sync::{Mutex, MutexGuard, PoisonError};
use std::time::Duration;

const TICK_CHARS: &str = "⠋⠙⠹⠸⠼⠴⠦⠧⠇⠏";

/// CLI progress reporter using indicatif progress bars.
///
/// - Validation, reset and metadata phases: spinner
/// - Upload phase: progress bar over upload units
pub struct CliReporter {
    bar: Mutex<Option<ProgressBar>>,
}

impl CliReporter {
    pub fn new() -> Self {
        Self {
            bar: Mutex::new(None),
        }
    }

    fn lock(&self) -> MutexGuard<'_, Option<ProgressBar>> {
        self.bar.lock().unwrap_or_else(PoisonError::into_inner)
    }

    fn set_bar(&self, pb: ProgressBar) {
        let mut guard = self.lock();
        if let Some(old) = guard.take() {
            old.finish_and_clear();
        }
        *guard = Some(pb);
    }

    fn finish_bar(&self) {
        if let Some(pb) = self.lock().take() {
            pb.finish_and_clear();
        }
    }

    fn start_spinner(&self, message: &'static str) {
        let pb = ProgressBar::new_spinner();
        if let Ok(style) = ProgressStyle::with_template("{spinner:.cyan} {msg}") {
            pb.set_style(style.tick_chars(TICK_CHARS));
        }
        pb.set_message(message);
        pb.enable_steady_tick(Duration::from_millis(80));
        self.set_bar(pb);
    }
}

impl ProgressReporter for CliReporter {
    fn on_validation_start(&self) {
        self.start_spinner("Validating BIDS dataset...");
    }

    fn on_validation_complete(&self, valid: bool, duration_secs: f64) {
        self.finish_bar();
        if valid {
            eprintln!(
                "  \x1b[32m✓\x1b[0m Validation passed in {:.2}s",
                duration_secs
            );
        } else {
            eprintln!(
                "  \x1b[31m✗\x1b[0m Validation failed after {:.2}s",
                duration_secs
            );
        }
    }

    fn on_reset_start(&self) {
        self.start_spinner("Deleting existing content...");
    }

    fn on_reset_complete(&self, entities_deleted: usize, duration_secs: f64) {
        self.finish_bar();
        eprintln!(
            "  \x1b[32m✓\x1b[0m Reset complete: {} entities deleted in {:.2}s",
            entities_deleted, duration_secs
        );
    }

    fn on_upload_start(&self, total_units: usize) {
        let pb = ProgressBar::new(total_units as u64);
        if let Ok(style) = ProgressStyle::with_template(
            "  {spinner:.cyan} Uploading [{bar:30.cyan/dim}] {pos}/{len} items {wide_msg:.dim}",
        ) {
            pb.set_style(style.progress_chars("━╸─").tick_chars(TICK_CHARS));
        }
        pb.enable_steady_tick(Duration::from_millis(80));
        self.set_bar(pb);
    }

    fn on_upload_progress(&self, units_done: usize, total_units: usize, current_path: &str) {
        let guard = self.lock();
        if let Some(pb) = guard.as_ref() {
            if pb.length() != Some(total_units as u64) {
                pb.set_length(total_units as u64);
            }
            pb.set_position(units_done as u64);
            pb.set_message(current_path.to_string());
        }
    }

    fn on_upload_complete(&self, items_uploaded: usize, duration_secs: f64) {
        self.finish_bar();
        eprintln!(
            "  \x1b[32m✓\x1b[0m Upload complete: {} items in {:.2}s",
            items_uploaded, duration_secs
        );
    }

    fn on_metadata_start(&self) {
        self.start_spinner("Extracting sidecar metadata...");
    }

    fn on_metadata_complete(&self, entities_updated: usize, duration_secs: f64) {
        self.finish_bar();
        eprintln!(
            "  \x1b[32m✓\x1b[0m Metadata complete: {} entities updated in {:.2}s",
            entities_updated, duration_secs
        );
    }
}
