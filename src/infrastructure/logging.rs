//! Logging system configuration and initialization
//!
//! Tracing setup driven by `LoggingConfig`:
//! - console output through a fmt layer
//! - optional non-blocking daily-rolling file output
//! - level + per-module filters compiled into an `EnvFilter`
//!   (`RUST_LOG` still wins when set)

use anyhow::Result;
use once_cell::sync::Lazy;
use std::path::PathBuf;
use std::sync::Mutex;
use tracing_appender::{non_blocking, rolling};
use tracing_subscriber::{
    EnvFilter, Registry, fmt, layer::SubscriberExt, util::SubscriberInitExt,
};

use crate::infrastructure::config::LoggingConfig;

// Guards must stay alive for the lifetime of the process or the non-blocking
// file writer silently drops messages.
static LOG_GUARDS: Lazy<Mutex<Vec<non_blocking::WorkerGuard>>> = Lazy::new(|| Mutex::new(Vec::new()));

/// Build the filter directive string from config level + module filters.
fn filter_directives(config: &LoggingConfig) -> String {
    let mut directives = vec![config.level.clone()];
    let mut modules: Vec<_> = config.module_filters.iter().collect();
    modules.sort();
    for (module, level) in modules {
        directives.push(format!("{module}={level}"));
    }
    directives.join(",")
}

/// Resolve the log directory, defaulting to `logs/` beside the executable.
fn log_directory(config: &LoggingConfig) -> PathBuf {
    if let Some(dir) = &config.log_dir {
        return PathBuf::from(dir);
    }
    let exe_dir = std::env::current_exe()
        .ok()
        .and_then(|p| p.parent().map(std::path::Path::to_path_buf))
        .unwrap_or_else(|| std::env::current_dir().unwrap_or_default());
    exe_dir.join("logs")
}

/// Initialize the logging system. Call once at startup.
pub fn init_logging(config: &LoggingConfig) -> Result<()> {
    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new(filter_directives(config)));

    let console_layer = config
        .console_output
        .then(|| fmt::layer().with_target(true));

    let file_layer = if config.file_output {
        let dir = log_directory(config);
        std::fs::create_dir_all(&dir)?;
        let appender = rolling::daily(dir, "shipwatch.log");
        let (writer, guard) = non_blocking(appender);
        if let Ok(mut guards) = LOG_GUARDS.lock() {
            guards.push(guard);
        }
        Some(fmt::layer().with_ansi(false).with_writer(writer))
    } else {
        None
    };

    Registry::default()
        .with(filter)
        .with(console_layer)
        .with(file_layer)
        .try_init()?;

    tracing::info!("logging initialized (level: {})", config.level);
    Ok(())
}
