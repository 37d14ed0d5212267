//! Tracing bootstrap

use std::path::Path;

use tracing_appender::non_blocking::WorkerGuard;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

use crate::error::Result;

/// Initialize the global subscriber from the configured level and optional
/// log file. The returned guard must be held for the process lifetime so
/// the file writer flushes on shutdown.
pub fn init_tracing(level: &str, log_file: Option<&str>) -> Result<Option<WorkerGuard>> {
    let filter = EnvFilter::try_from_default_env()
        .or_else(|_| EnvFilter::try_new(format!("sentinel={level},tower_http=warn")))
        .unwrap_or_else(|_| EnvFilter::new("info"));

    let registry = tracing_subscriber::registry()
        .with(filter)
        .with(tracing_subscriber::fmt::layer());

    let guard = match log_file {
        Some(path) => {
            let path = Path::new(path);
            let dir = path.parent().unwrap_or_else(|| Path::new("."));
            let file = path.file_name().map(|f| f.to_string_lossy().to_string());
            let appender = tracing_appender::rolling::never(
                dir,
                file.unwrap_or_else(|| "sentinel.log".to_string()),
            );
            let (writer, guard) = tracing_appender::non_blocking(appender);
            registry
                .with(tracing_subscriber::fmt::layer().with_ansi(false).with_writer(writer))
                .init();
            Some(guard)
        }
        None => {
            registry.init();
            None
        }
    };

    tracing::info!(level, "tracing initialized");
    Ok(guard)
}
