//! Tracing subscriber setup: console output plus an optional log file.

use std::path::{Path, PathBuf};
use std::sync::OnceLock;

use tracing_appender::non_blocking::WorkerGuard;
use tracing_subscriber::EnvFilter;
use tracing_subscriber::layer::SubscriberExt;
use tracing_subscriber::util::SubscriberInitExt;

use crate::config::ENV_PREFIX;

static LOG_GUARD: OnceLock<WorkerGuard> = OnceLock::new();

const DEFAULT_LEVEL: &str = "info";

/// Logger settings.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LogSettings {
    /// Filter directive used when `RUST_LOG` is unset (e.g. `"info"` or
    /// `"wangchain=debug"`).
    pub level: String,
    /// Also write plain-text logs to this file.
    pub file: Option<PathBuf>,
}

impl Default for LogSettings {
    fn default() -> Self {
        Self {
            level: DEFAULT_LEVEL.to_string(),
            file: None,
        }
    }
}

impl LogSettings {
    /// Reads `WANGCHAIN_LOG_LEVEL` and `WANGCHAIN_LOG_FILE`.
    #[must_use]
    pub fn from_env() -> Self {
        let var = |suffix: &str| {
            std::env::var(format!("{ENV_PREFIX}{suffix}"))
                .ok()
                .filter(|v| !v.trim().is_empty())
        };
        Self {
            level: var("LOG_LEVEL").unwrap_or_else(|| DEFAULT_LEVEL.to_string()),
            file: var("LOG_FILE").map(PathBuf::from),
        }
    }

    /// Sets the file sink.
    #[must_use]
    pub fn with_file(mut self, path: impl Into<PathBuf>) -> Self {
        self.file = Some(path.into());
        self
    }
}

/// Installs the global subscriber.
///
/// Returns `false` if a subscriber was already installed, in which case
/// nothing changes. A log file whose directory cannot be created is skipped
/// and console logging still starts.
pub fn init(settings: &LogSettings) -> bool {
    let env_filter =
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(&settings.level));

    let stdout_layer = tracing_subscriber::fmt::layer().with_target(false);

    let (file_layer, guard) = match settings.file.as_deref().and_then(file_writer) {
        Some((writer, guard)) => (
            Some(
                tracing_subscriber::fmt::layer()
                    .with_target(false)
                    .with_ansi(false)
                    .with_writer(writer),
            ),
            Some(guard),
        ),
        None => (None, None),
    };

    let installed = tracing_subscriber::registry()
        .with(env_filter)
        .with(stdout_layer)
        .with(file_layer)
        .try_init()
        .is_ok();

    if installed && let Some(guard) = guard {
        let _ = LOG_GUARD.set(guard);
    }
    installed
}

fn file_writer(path: &Path) -> Option<(tracing_appender::non_blocking::NonBlocking, WorkerGuard)> {
    let dir = match path.parent() {
        Some(p) if !p.as_os_str().is_empty() => p,
        _ => Path::new("."),
    };
    let name = path.file_name()?;
    std::fs::create_dir_all(dir).ok()?;
    let appender = tracing_appender::rolling::never(dir, name);
    Some(tracing_appender::non_blocking(appender))
}
