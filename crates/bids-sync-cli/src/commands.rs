use clap::{Args, Parser, Subcommand, ValueEnum};
use std::path::PathBuf;

use bids_sync_core::{AppConfig, ImportMode};

#[derive(Debug, Parser)]
#[command(name = "bids-sync")]
#[command(about = "Upload BIDS datasets into Girder folders", long_about = None)]
pub struct Cli {
    /// Girder API URL, e.g. http://localhost:8080/api/v1
    #[arg(long, global = true)]
    pub api_url: Option<String>,

    /// Girder API key
    #[arg(long, global = true)]
    pub api_key: Option<String>,

    /// Id of the destination folder
    #[arg(long, global = true)]
    pub folder_id: Option<String>,

    /// Accept invalid TLS certificates
    #[arg(long, global = true)]
    pub no_verify_ssl: bool,

    /// Extra PEM root certificate to trust
    #[arg(long, global = true, value_name = "PATH")]
    pub ca_cert: Option<PathBuf>,

    /// Log at debug level
    #[arg(short, long, global = true, conflicts_with = "quiet")]
    pub verbose: bool,

    /// Log warnings and errors only
    #[arg(short, long, global = true)]
    pub quiet: bool,

    /// Also write logs to this file
    #[arg(long, global = true, value_name = "PATH")]
    pub log_file: Option<PathBuf>,

    #[command(subcommand)]
    pub command: Option<Commands>,
}

#[derive(Debug, Subcommand)]
pub enum Commands {
    /// Validate, upload and attach sidecar metadata
    Import(ImportArgs),
    /// Report how a local dataset differs from the destination folder
    Compare {
        bids_dir: PathBuf,
    },
    /// Run the BIDS validator only
    Validate {
        bids_dir: PathBuf,
    },
    /// Attach sidecar metadata already present in the destination folder
    ExtractMetadata {
        /// Only handle items directly inside the folder
        #[arg(long)]
        no_recursive: bool,
        /// Match sidecars to items by exact BIDS stem
        #[arg(long)]
        exact_stem: bool,
        /// Also read `.json` files attached to NIfTI items
        #[arg(long)]
        pair_sidecars: bool,
    },
    /// Print configuration values
    PrintConfig,
}

#[derive(Debug, Args)]
pub struct ImportArgs {
    pub bids_dir: PathBuf,

    /// What to do with content already in the destination folder (defaults to the `mode` setting)
    #[arg(long, value_enum)]
    pub mode: Option<ModeArg>,

    /// Skip BIDS validation
    #[arg(long)]
    pub no_validate: bool,

    /// Upload each NIfTI file and its sidecar as one item
    #[arg(long)]
    pub pair_sidecars: bool,

    /// With skip-existing, also leave files whose size changed
    #[arg(long)]
    pub skip_modified: bool,

    /// Match sidecars to items by exact BIDS stem
    #[arg(long)]
    pub exact_stem: bool,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, ValueEnum)]
pub enum ModeArg {
    /// Delete everything in the destination folder first
    Reset,
    /// Upload everything, reusing same-named folders and items
    Overwrite,
    /// Upload only what the destination lacks
    SkipExisting,
}

impl From<ModeArg> for ImportMode {
    fn from(mode: ModeArg) -> Self {
        match mode {
            ModeArg::Reset => ImportMode::Reset,
            ModeArg::Overwrite => ImportMode::OverwriteOnSameName,
            ModeArg::SkipExisting => ImportMode::SkipExisting,
        }
    }
}

impl ImportArgs {
    /// The `--mode` flag wins over the configured mode.
    pub fn import_mode(&self, config: &AppConfig) -> ImportMode {
        self.mode.map_or(config.mode, ImportMode::from)
    }
}

impl Cli {
    /// Flags take precedence over file and environment settings.
    pub fn apply_overrides(&self, config: &mut AppConfig) {
        if let Some(api_url) = &self.api_url {
            config.api_url = Some(api_url.clone());
        }
        if let Some(api_key) = &self.api_key {
            config.api_key = Some(api_key.clone());
        }
        if let Some(folder_id) = &self.folder_id {
            config.folder_id = Some(folder_id.clone());
        }
        if self.no_verify_ssl {
            config.verify_ssl = false;
        }
        if let Some(ca_cert) = &self.ca_cert {
            config.ca_cert = Some(ca_cert.clone());
        }
    }
}
