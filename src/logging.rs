use std::fs::{self, File, OpenOptions};
use std::io::Write;
use std::path::{Path, PathBuf};
use std::sync::Arc;

use tracing_subscriber::prelude::*;
use tracing_subscriber::{fmt, EnvFilter};

use crate::error::LoggingError;

/// How the process-wide subscriber is set up.
#[derive(Debug, Clone, Default)]
pub struct LoggingOptions {
    /// Debug level for this crate instead of info.
    pub verbose: bool,
    /// Also write plain-text events to this file.
    pub log_file: Option<PathBuf>,
}

impl LoggingOptions {
    /// Filter used when `RUST_LOG` is unset.
    pub fn default_directive(&self) -> String {
        let level = if self.verbose { "debug" } else { "info" };
        format!("{}={level},warn", env!("CARGO_CRATE_NAME"))
    }
}

/// The installed subscriber. Flush with [`LoggingContext::shutdown`]
/// before exiting.
#[derive(Debug)]
pub struct LoggingContext {
    log_file: Option<(PathBuf, Arc<File>)>,
}

impl LoggingContext {
    /// Install the global subscriber: stderr, plus the log file if one is
    /// configured. Fails if a subscriber is already installed.
    pub fn init(options: &LoggingOptions) -> Result<Self, LoggingError> {
        let filter = EnvFilter::try_from_default_env()
            .unwrap_or_else(|_| EnvFilter::new(options.default_directive()));

        let log_file = match &options.log_file {
            Some(path) => Some((path.clone(), Arc::new(open_log_file(path)?))),
            None => None,
        };
        let file_layer = log_file.as_ref().map(|(_, file)| {
            fmt::layer()
                .with_ansi(false)
                .with_target(false)
                .with_writer(Arc::clone(file))
        });

        tracing_subscriber::registry()
            .with(filter)
            .with(fmt::layer().with_writer(std::io::stderr))
            .with(file_layer)
            .try_init()
            .map_err(|e| LoggingError::Init(e.to_string()))?;

        if let Some((path, _)) = &log_file {
            tracing::debug!("Logging to {}", path.display());
        }
        Ok(LoggingContext { log_file })
    }

    /// Flush buffered output.
    pub fn shutdown(self) {
        if let Some((path, file)) = self.log_file {
            if let Err(e) = (&*file).flush().and_then(|_| file.sync_all()) {
                eprintln!("failed to flush log file {}: {e}", path.display());
            }
        }
    }
}

/// Open `path` for appending, creating its directory.
fn open_log_file(path: &Path) -> Result<File, LoggingError> {
    let to_err = |source: std::io::Error| LoggingError::LogFile {
        path: path.to_path_buf(),
        source,
    };
    if let Some(parent) = path.parent() {
        fs::create_dir_all(parent).map_err(to_err)?;
    }
    OpenOptions::new()
        .create(true)
        .append(true)
        .open(path)
        .map_err(to_err)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_directive() {
        let quiet = LoggingOptions::default();
        assert_eq!(quiet.default_directive(), "det_eval=info,warn");
        let verbose = LoggingOptions {
            verbose: true,
            log_file: None,
        };
        assert_eq!(verbose.default_directive(), "det_eval=debug,warn");
    }

    #[test]
    fn test_open_log_file_appends() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("run").join("eval.log");
        writeln!(open_log_file(&path).unwrap(), "first").unwrap();
        writeln!(open_log_file(&path).unwrap(), "second").unwrap();
        assert_eq!(fs::read_to_string(&path).unwrap(), "first\nsecond\n");
    }

    #[test]
    fn test_open_log_file_error() {
        let dir = tempfile::tempdir().unwrap();
        let blocker = dir.path().join("file");
        fs::write(&blocker, "x").unwrap();
        let err = open_log_file(&blocker.join("eval.log")).unwrap_err();
        assert!(matches!(err, LoggingError::LogFile { .. }));
    }
}
