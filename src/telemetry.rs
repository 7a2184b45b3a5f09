//! Tracing subscriber setup.

use std::fs::{self, File, OpenOptions};
use std::sync::Mutex;

use tracing_subscriber::fmt::{self, format};
use tracing_subscriber::prelude::*;
use tracing_subscriber::EnvFilter;

use crate::config::{LogFormat, LoggingConfig};
use crate::error::{Error, Result};

/// Installs the global subscriber: stdout in the configured format, plus an
/// append-only plain-text file when `logging.file` is set.
///
/// `RUST_LOG`, when present, replaces `logging.filter`. Call once, early in
/// `main`; a second call fails with [`Error::Config`].
pub fn init(config: &LoggingConfig) -> Result<()> {
    let filter = EnvFilter::try_from_default_env()
        .or_else(|_| EnvFilter::try_new(&config.filter))
        .map_err(|e| Error::Config(format!("logging.filter `{}`: {e}", config.filter)))?;

    let file_layer = match &config.file {
        Some(path) => {
            if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
                fs::create_dir_all(parent)?;
            }
            let file = OpenOptions::new().create(true).append(true).open(path)?;
            Some(file_layer(file))
        }
        None => None,
    };

    let (text, json) = match config.format {
        LogFormat::Text => (Some(fmt::layer()), None),
        LogFormat::Json => (None, Some(fmt::layer().json())),
    };

    tracing_subscriber::registry()
        .with(filter)
        .with(text)
        .with(json)
        .with(file_layer)
        .try_init()
        .map_err(|e| Error::Config(format!("tracing subscriber: {e}")))
}

/// Plain-text events with their source location, for the log file.
fn file_layer<S>(file: File) -> fmt::Layer<S, format::DefaultFields, format::Format, Mutex<File>> {
    fmt::layer()
        .with_ansi(false)
        .with_file(true)
        .with_line_number(true)
        .with_writer(Mutex::new(file))
}
