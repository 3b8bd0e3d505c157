// SPDX-License-Identifier: AGPL-3.0
// Shard Transfer Core - Tracing setup
//
// Two layers: stdout at the configured level (RUST_LOG wins when set) and
// an optional append-only log file that only receives warnings and errors.

use crate::settings::CoordinatorSettings;
use crate::types::AppError;
use std::fs::{self, OpenOptions};
use std::path::Path;
use std::sync::Arc;
use tracing_subscriber::{fmt, layer::SubscriberExt, util::SubscriberInitExt, EnvFilter, Layer};

/// Install the global tracing subscriber
pub fn init_logging(default_level: &str, log_file: Option<&Path>) -> Result<(), AppError> {
    let stdout_filter = match EnvFilter::try_from_default_env() {
        Ok(filter) => filter,
        Err(_) => EnvFilter::try_new(default_level)
            .map_err(|e| AppError::InvalidConfig(format!("Invalid log level: {}", e)))?,
    };

    let stdout_layer = fmt::layer()
        .with_writer(std::io::stdout)
        .with_filter(stdout_filter);

    let file_layer = match log_file {
        Some(path) => {
            if let Some(parent) = path.parent() {
                fs::create_dir_all(parent)?;
            }
            let file = OpenOptions::new().create(true).append(true).open(path)?;

            Some(
                fmt::layer()
                    .with_ansi(false)
                    .with_writer(Arc::new(file))
                    .with_filter(EnvFilter::new("warn")),
            )
        }
        None => None,
    };

    tracing_subscriber::registry()
        .with(stdout_layer)
        .with(file_layer)
        .try_init()
        .map_err(|e| AppError::InvalidConfig(format!("Logging already initialized: {}", e)))
}

/// Install the global tracing subscriber from the persisted settings
pub fn init_from_settings(settings: &CoordinatorSettings) -> Result<(), AppError> {
    init_logging(&settings.log_level, settings.log_file.as_deref())
}
