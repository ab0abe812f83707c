use anyhow::{Context, Result};
use std::env;
use std::path::{Path, PathBuf};
use tracing::subscriber::DefaultGuard;
use tracing_appender::non_blocking::WorkerGuard;
use tracing_appender::rolling::{RollingFileAppender, Rotation};
use tracing_subscriber::prelude::*;
use tracing_subscriber::{fmt, EnvFilter};

/// Overrides every filter the flags would produce.
pub const LOG_FILTER_ENV: &str = "BIDS_SYNC_LOG";

const HTTP_DIRECTIVES: &str = "reqwest=warn,hyper=warn,hyper_util=warn";

/// Logging choices for one run, taken from the command line.
#[derive(Debug, Clone, Default)]
pub struct LogSettings {
    pub verbose: bool,
    pub quiet: bool,
    pub log_file: Option<PathBuf>,
}

impl LogSettings {
    pub fn level(&self) -> &'static str {
        if self.verbose {
            "debug"
        } else if self.quiet {
            "warn"
        } else {
            "info"
        }
    }

    fn directives(&self, env_override: Option<String>) -> String {
        match env_override {
            Some(directives) if !directives.trim().is_empty() => directives,
            _ => format!("{},{}", self.level(), HTTP_DIRECTIVES),
        }
    }
}

/// Keeps the run's subscriber installed and flushes the file writer on drop.
pub struct LoggingGuard {
    _default: DefaultGuard,
    _file: Option<WorkerGuard>,
}

/// Install a stdout subscriber (plus a file layer when asked) as the default
/// for the current thread until the returned guard is dropped.
pub fn init_logger(settings: &LogSettings) -> Result<LoggingGuard> {
    let directives = settings.directives(env::var(LOG_FILTER_ENV).ok());
    let filter_layer = EnvFilter::try_new(&directives)
        .with_context(|| format!("invalid log filter '{}'", directives))?;

    let (file_layer, file_guard) = match &settings.log_file {
        Some(path) => {
            let (non_blocking, guard) = tracing_appender::non_blocking(file_appender(path)?);
            let layer = fmt::layer().with_writer(non_blocking).with_ansi(false);
            (Some(layer), Some(guard))
        }
        None => (None, None),
    };

    let subscriber = tracing_subscriber::registry()
        .with(
            fmt::layer()
                .with_writer(std::io::stdout)
                .with_target(false)
                .without_time()
                .with_ansi(true),
        )
        .with(file_layer)
        .with(filter_layer);

    let default = tracing::subscriber::set_default(subscriber);

    Ok(LoggingGuard {
        _default: default,
        _file: file_guard,
    })
}

fn file_appender(path: &Path) -> Result<RollingFileAppender> {
    let file_name = path
        .file_name()
        .with_context(|| format!("log file path {} has no file name", path.display()))?;
    let directory = match path.parent() {
        Some(parent) if !parent.as_os_str().is_empty() => parent,
        _ => Path::new("."),
    };

    RollingFileAppender::builder()
        .rotation(Rotation::NEVER)
        .filename_prefix(file_name.to_string_lossy())
        .build(directory)
        .with_context(|| format!("cannot open log file {}", path.display()))
}
