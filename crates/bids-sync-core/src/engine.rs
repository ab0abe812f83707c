use std::path::Path;
use std::time::{Duration, Instant};
use tracing::{debug, info};

use crate::config::{AppConfig, DEFAULT_VALIDATOR_COMMAND};
use crate::error::{Error, Result};
use crate::metadata::{self, AssociationRule, MetadataStats};
use crate::progress::ProgressReporter;
use crate::reconcile::{self, Comparison, DeletionStats, ImportMode, UploadPlan};
use crate::remote::{read_remote_tree, RemoteStore};
use crate::scanner::{self, LocalTree};
use crate::upload::{UploadStats, Uploader};
use crate::validator::BidsValidator;

#[derive(Debug, Clone)]
pub struct ImportOptions {
    pub mode: ImportMode,
    pub skip_validation: bool,
    pub validator_command: String,
    pub ignore_patterns: Vec<String>,
    pub pair_sidecars: bool,
    pub upload_modified: bool,
    pub association_rule: AssociationRule,
}

impl Default for ImportOptions {
    fn default() -> Self {
        Self {
            mode: ImportMode::default(),
            skip_validation: false,
            validator_command: DEFAULT_VALIDATOR_COMMAND.to_string(),
            ignore_patterns: Vec::new(),
            pair_sidecars: false,
            upload_modified: true,
            association_rule: AssociationRule::default(),
        }
    }
}

impl ImportOptions {
    pub fn from_config(config: &AppConfig, mode: ImportMode) -> Self {
        Self {
            mode,
            skip_validation: false,
            validator_command: config.validator_command.clone(),
            ignore_patterns: config.ignore_patterns.clone(),
            pair_sidecars: config.pair_sidecars,
            upload_modified: config.upload_modified,
            association_rule: config.association_rule,
        }
    }

    /// Run the external validator over `local_root`; an invalid verdict is an error.
    ///
    /// Touches nothing remote, so callers can check a dataset before connecting.
    pub fn validate_dataset(&self, local_root: &Path, reporter: &dyn ProgressReporter) -> Result<()> {
        reporter.on_validation_start();
        let start = Instant::now();
        let validator = BidsValidator::new(self.validator_command.as_str());
        let valid = validator.validate(local_root);
        reporter.on_validation_complete(valid, start.elapsed().as_secs_f64());

        if !valid {
            return Err(Error::Validation(format!(
                "{} rejected {}",
                validator.command(),
                local_root.display()
            )));
        }
        info!("BIDS validation passed");
        Ok(())
    }
}

#[derive(Debug)]
pub struct ImportResult {
    pub mode: ImportMode,
    pub validation_duration: Duration,
    pub scan_duration: Duration,
    pub reset_duration: Duration,
    pub upload_duration: Duration,
    pub metadata_duration: Duration,
    pub local_files: usize,
    /// Set only for `SkipExisting`.
    pub comparison: Option<Comparison>,
    /// Set only for `Reset`.
    pub deletion: Option<DeletionStats>,
    pub upload: UploadStats,
    pub metadata: MetadataStats,
}

/// Drives one import of a local dataset into a remote folder.
pub struct ImportEngine<S: RemoteStore> {
    store: S,
    folder_id: String,
    options: ImportOptions,
}

impl<S: RemoteStore> ImportEngine<S> {
    pub fn new(store: S, folder_id: impl Into<String>, options: ImportOptions) -> Self {
        Self {
            store,
            folder_id: folder_id.into(),
            options,
        }
    }

    pub fn options(&self) -> &ImportOptions {
        &self.options
    }

    pub fn store(&self) -> &S {
        &self.store
    }

    /// Run the full import pipeline:
    /// 1. Validate the dataset (unless disabled); nothing remote is touched on failure
    /// 2. Look up the target folder
    /// 3. SkipExisting: diff local against remote to plan skips
    /// 4. Reset: empty the target folder
    /// 5. Upload, reusing same-named folders and items
    /// 6. Attach sidecar metadata across the whole target tree
    pub fn run(&self, local_root: &Path, reporter: &dyn ProgressReporter) -> Result<ImportResult> {
        let mode = self.options.mode;
        info!("Importing {} in {} mode", local_root.display(), mode);

        // Phase 1: Validate
        let validation_start = Instant::now();
        if self.options.skip_validation {
            debug!("Validation disabled for this run");
        } else {
            self.options.validate_dataset(local_root, reporter)?;
        }
        let validation_duration = validation_start.elapsed();

        // Phase 2: Target lookup
        let folder = self.store.get_folder(&self.folder_id)?;
        info!("Target folder: {} ({})", folder.name, folder.id);

        let scan_start = Instant::now();
        let tree = self.scan(local_root)?;
        let scan_duration = scan_start.elapsed();

        // Phase 3: Plan
        let comparison = match mode {
            ImportMode::SkipExisting => Some(self.compare_tree(&tree)?),
            _ => None,
        };
        let plan = UploadPlan::for_mode(mode, comparison.as_ref(), self.options.upload_modified);
        if let Some(comparison) = &comparison {
            info!(
                "{} new, {} identical, {} modified; skipping {}",
                comparison.new.len(),
                comparison.identical.len(),
                comparison.modified.len(),
                plan.skipped()
            );
        }

        // Phase 4: Reset
        let reset_start = Instant::now();
        let deletion = if mode == ImportMode::Reset {
            info!("Deleting existing content under {}", folder.name);
            reporter.on_reset_start();
            let stats = reconcile::reset_folder(&self.store, &self.folder_id)?;
            reporter.on_reset_complete(
                stats.items_deleted + stats.folders_deleted,
                reset_start.elapsed().as_secs_f64(),
            );
            Some(stats)
        } else {
            None
        };
        let reset_duration = reset_start.elapsed();

        // Phase 5: Upload
        info!("Uploading {} files...", tree.files.len());
        let upload_start = Instant::now();
        let upload = Uploader::new(&self.store)
            .with_pair_sidecars(self.options.pair_sidecars)
            .upload_tree(&tree, &self.folder_id, &plan, reporter)?;
        let upload_duration = upload_start.elapsed();
        reporter.on_upload_complete(upload.items_uploaded, upload_duration.as_secs_f64());
        debug!(
            "Upload completed in {:.2}s: {} items, {} bytes",
            upload_duration.as_secs_f64(),
            upload.items_uploaded,
            upload.bytes_uploaded
        );

        // Phase 6: Metadata
        let metadata_start = Instant::now();
        let metadata = self.propagate_with(reporter, true)?;
        let metadata_duration = metadata_start.elapsed();

        Ok(ImportResult {
            mode,
            validation_duration,
            scan_duration,
            reset_duration,
            upload_duration,
            metadata_duration,
            local_files: tree.files.len(),
            comparison,
            deletion,
            upload,
            metadata,
        })
    }

    /// Diff the local dataset against the target folder without changing anything.
    pub fn compare(&self, local_root: &Path) -> Result<Comparison> {
        self.store.get_folder(&self.folder_id)?;
        let tree = self.scan(local_root)?;
        self.compare_tree(&tree)
    }

    /// Attach sidecar metadata under the target folder only.
    pub fn propagate_metadata(&self, recursive: bool, reporter: &dyn ProgressReporter) -> Result<MetadataStats> {
        self.store.get_folder(&self.folder_id)?;
        self.propagate_with(reporter, recursive)
    }

    fn scan(&self, local_root: &Path) -> Result<LocalTree> {
        let tree = scanner::scan_local_tree(local_root, &self.options.ignore_patterns)?;
        debug!(
            "Local tree: {} files, {} bytes, {} directories",
            tree.files.len(),
            tree.files.total_bytes(),
            tree.directories.len()
        );
        Ok(tree)
    }

    fn compare_tree(&self, tree: &LocalTree) -> Result<Comparison> {
        let remote = read_remote_tree(&self.store, &self.folder_id)?;
        Ok(reconcile::diff(&tree.files, &remote))
    }

    fn propagate_with(&self, reporter: &dyn ProgressReporter, recursive: bool) -> Result<MetadataStats> {
        info!("Extracting sidecar metadata...");
        reporter.on_metadata_start();
        let start = Instant::now();
        let stats = metadata::propagate_metadata(
            &self.store,
            &self.folder_id,
            recursive,
            self.options.association_rule,
            self.options.pair_sidecars,
        )?;
        reporter.on_metadata_complete(stats.entities_updated(), start.elapsed().as_secs_f64());
        Ok(stats)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::progress::SilentReporter;
    use crate::remote::MemoryStore;
    use std::fs;

    fn options(mode: ImportMode) -> ImportOptions {
        ImportOptions {
            mode,
            skip_validation: true,
            ..ImportOptions::default()
        }
    }

    #[test]
    fn test_from_config_copies_settings() {
        let config = AppConfig {
            ignore_patterns: vec!["derivatives".to_string()],
            pair_sidecars: true,
            upload_modified: false,
            association_rule: AssociationRule::ExactStem,
            ..AppConfig::default()
        };
        let opts = ImportOptions::from_config(&config, ImportMode::SkipExisting);
        assert_eq!(opts.mode, ImportMode::SkipExisting);
        assert_eq!(opts.ignore_patterns, vec!["derivatives"]);
        assert!(opts.pair_sidecars);
        assert!(!opts.upload_modified);
        assert_eq!(opts.association_rule, AssociationRule::ExactStem);
        assert!(!opts.skip_validation);
    }

    #[test]
    fn test_missing_target_folder_fails_before_upload() {
        let dir = tempfile::tempdir().unwrap();
        fs::write(dir.path().join("README"), b"hello").unwrap();
        let store = MemoryStore::new();

        let engine = ImportEngine::new(&store, "does-not-exist", options(ImportMode::default()));
        let err = engine.run(dir.path(), &SilentReporter).unwrap_err();

        assert!(err.is_not_found());
        assert_eq!(store.upload_count(), 0);
    }

    #[test]
    fn test_run_reports_phases() {
        let dir = tempfile::tempdir().unwrap();
        fs::write(dir.path().join("README"), b"hello").unwrap();
        let store = MemoryStore::new();
        let root = store.create_root("target");

        let engine = ImportEngine::new(&store, root, options(ImportMode::Reset));
        let result = engine.run(dir.path(), &SilentReporter).unwrap();

        assert_eq!(result.mode, ImportMode::Reset);
        assert_eq!(result.local_files, 1);
        assert_eq!(result.deletion, Some(DeletionStats::default()));
        assert!(result.comparison.is_none());
        assert_eq!(result.upload.items_uploaded, 1);
    }
}
