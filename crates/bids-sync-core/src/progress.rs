/// Trait for reporting import progress.
///
/// The CLI implements it with indicatif. All methods have default no-op implementations.
pub trait ProgressReporter: Send + Sync {
    fn on_validation_start(&self) {}
    fn on_validation_complete(&self, _valid: bool, _duration_secs: f64) {}
    fn on_reset_start(&self) {}
    fn on_reset_complete(&self, _entities_deleted: usize, _duration_secs: f64) {}
    fn on_upload_start(&self, _total_units: usize) {}
    fn on_upload_progress(&self, _units_done: usize, _total_units: usize, _current_path: &str) {}
    fn on_upload_complete(&self, _items_uploaded: usize, _duration_secs: f64) {}
    fn on_metadata_start(&self) {}
    fn on_metadata_complete(&self, _entities_updated: usize, _duration_secs: f64) {}
}

/// No-op progress reporter for silent operation.
pub struct SilentReporter;

impl ProgressReporter for SilentReporter {}
