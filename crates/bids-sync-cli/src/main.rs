mod commands;
mod logging;
mod progress;
mod report;

use std::io::{self, Write};
use std::path::Path;
use std::process::ExitCode;

use anyhow::{bail, Context, Result};
use bids_sync_core::config::{load_configuration, AppConfig};
use bids_sync_core::{
    AssociationRule, BidsValidator, GirderClient, ImportEngine, ImportOptions, ImportResult,
};
use clap::{CommandFactory, Parser};
use colored::*;
use commands::{Cli, Commands, ImportArgs};
use dotenv::dotenv;
use logging::LogSettings;
use progress::CliReporter;
use tracing::{error, info};

fn main() -> ExitCode {
    dotenv().ok();

    let args = Cli::parse();
    let settings = LogSettings {
        verbose: args.verbose,
        quiet: args.quiet,
        log_file: args.log_file.clone(),
    };
    let _guard = match logging::init_logger(&settings) {
        Ok(guard) => guard,
        Err(err) => {
            eprintln!("Error setting up logging: {:#}", err);
            return ExitCode::FAILURE;
        }
    };

    let mut config = match load_configuration() {
        Ok(config) => config,
        Err(err) => {
            error!("Error loading configuration: {}", err);
            return ExitCode::FAILURE;
        }
    };
    args.apply_overrides(&mut config);

    let outcome = match args.command {
        Some(Commands::Import(import)) => run_import(&config, import),
        Some(Commands::Compare { bids_dir }) => run_compare(&config, &bids_dir),
        Some(Commands::Validate { bids_dir }) => run_validate(&config, &bids_dir),
        Some(Commands::ExtractMetadata {
            no_recursive,
            exact_stem,
            pair_sidecars,
        }) => run_extract_metadata(&config, !no_recursive, exact_stem, pair_sidecars),
        Some(Commands::PrintConfig) => {
            print_config(&config);
            Ok(())
        }
        None => print_help(&mut io::stdout()),
    };

    match outcome {
        Ok(()) => ExitCode::SUCCESS,
        Err(err) => {
            error!("Error: {:#}", err);
            ExitCode::FAILURE
        }
    }
}

fn print_help(mut out: &mut dyn Write) -> Result<()> {
    Cli::command()
        .write_long_help(&mut out)
        .context("cannot print help")
}

fn connect(config: &AppConfig) -> Result<(GirderClient, String)> {
    let settings = config.connection()?;
    let folder_id = config.folder_id()?.to_string();
    let client = GirderClient::connect(&settings)
        .with_context(|| format!("cannot reach {}", settings.api_url))?;
    Ok((client, folder_id))
}

fn run_import(config: &AppConfig, args: ImportArgs) -> Result<()> {
    let mut options = ImportOptions::from_config(config, args.import_mode(config));
    if args.pair_sidecars {
        options.pair_sidecars = true;
    }
    if args.skip_modified {
        options.upload_modified = false;
    }
    if args.exact_stem {
        options.association_rule = AssociationRule::ExactStem;
    }

    let reporter = CliReporter::new();

    // Validation runs before a session is opened; the engine must not repeat it.
    if args.no_validate {
        info!("Skipping BIDS validation (--no-validate)");
    } else {
        options.validate_dataset(&args.bids_dir, &reporter)?;
    }
    options.skip_validation = true;

    let (client, folder_id) = connect(config)?;
    let engine = ImportEngine::new(client, folder_id, options);
    let result = engine.run(&args.bids_dir, &reporter)?;
    print_import_summary(&result);
    Ok(())
}

fn run_compare(config: &AppConfig, bids_dir: &Path) -> Result<()> {
    let (client, folder_id) = connect(config)?;
    let options = ImportOptions::from_config(config, config.mode);
    let engine = ImportEngine::new(client, folder_id, options);
    let comparison = engine.compare(bids_dir)?;
    print!("{}", report::render_comparison(&comparison));
    Ok(())
}

fn run_validate(config: &AppConfig, bids_dir: &Path) -> Result<()> {
    let validator = BidsValidator::new(config.validator_command.as_str());
    if validator.validate(bids_dir) {
        println!("{} {} is a valid BIDS dataset", "✓".green(), bids_dir.display());
        Ok(())
    } else {
        bail!("BIDS validation failed for {}", bids_dir.display())
    }
}

fn run_extract_metadata(
    config: &AppConfig,
    recursive: bool,
    exact_stem: bool,
    pair_sidecars: bool,
) -> Result<()> {
    let (client, folder_id) = connect(config)?;
    let mut options = ImportOptions::from_config(config, config.mode);
    if exact_stem {
        options.association_rule = AssociationRule::ExactStem;
    }
    if pair_sidecars {
        options.pair_sidecars = true;
    }
    let engine = ImportEngine::new(client, folder_id, options);
    let stats = engine.propagate_metadata(recursive, &CliReporter::new())?;
    info!(
        "{} entities updated, {} sidecars without a match",
        format!("{}", stats.entities_updated()).green(),
        format!("{}", stats.unmatched).yellow(),
    );
    Ok(())
}

fn print_config(config: &AppConfig) {
    let mut shown = config.clone();
    if shown.api_key.is_some() {
        shown.api_key = Some("********".to_string());
    }
    println!("Configuration: {:#?}", shown);
}

fn print_import_summary(result: &ImportResult) {
    println!();
    info!(
        "Validate: {}, Scan: {}, Reset: {}, Upload: {}, Metadata: {}",
        format!("{:.2}s", result.validation_duration.as_secs_f64()).green(),
        format!("{:.2}s", result.scan_duration.as_secs_f64()).green(),
        format!("{:.2}s", result.reset_duration.as_secs_f64()).green(),
        format!("{:.2}s", result.upload_duration.as_secs_f64()).green(),
        format!("{:.2}s", result.metadata_duration.as_secs_f64()).green(),
    );
    info!(
        "{} mode: {} items uploaded ({} bytes), {} unchanged, {} skipped, {} folders",
        result.mode,
        format!("{}", result.upload.items_uploaded).cyan(),
        result.upload.bytes_uploaded,
        result.upload.items_unchanged,
        result.upload.items_skipped,
        result.upload.folders,
    );
    if let Some(deletion) = &result.deletion {
        info!(
            "Reset removed {} items and {} folders",
            format!("{}", deletion.items_deleted).red(),
            format!("{}", deletion.folders_deleted).red(),
        );
    }
    info!(
        "Metadata attached to {} entities",
        format!("{}", result.metadata.entities_updated()).cyan(),
    );
}
