//! Process-wide diagnostics for the AllerPaws core.
//!
//! # Responsibility
//! - Route `log` records to a size-rotated file in the app's log directory.
//! - Announce core start-up with the schema version and the draft slot key.
//! - Report a panic as one redacted line before the previous hook runs.
//!
//! # Invariants
//! - Events carry ids, states and counts. Pet names, emails and draft
//!   payloads never reach a log line.
//! - The first accepted [`LogConfig`] stays active for the process; a
//!   different one is refused.

use crate::db::migrations::latest_version;
use crate::repo::draft_store::DEFAULT_DRAFT_SLOT_KEY;
use flexi_logger::{
    Cleanup, Criterion, FileSpec, FlexiLoggerError, Logger, LoggerHandle, Naming, WriteMode,
};
use log::{error, info};
use once_cell::sync::{Lazy, OnceCell};
use regex::Regex;
use std::any::Any;
use std::error::Error;
use std::fmt::{Display, Formatter};
use std::path::{Path, PathBuf};
use std::sync::Once;

const FILE_BASENAME: &str = "allerpaws";
const ROTATE_AT_BYTES: u64 = 10 * 1024 * 1024;
const KEEP_FILES: usize = 5;
const PANIC_MESSAGE_LIMIT: usize = 160;

static ACTIVE: OnceCell<ActiveLogger> = OnceCell::new();
static PANIC_REPORTER: Once = Once::new();
static EMAIL: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"[A-Za-z0-9._%+-]+@[A-Za-z0-9.-]+\.[A-Za-z]{2,}").expect("valid email pattern")
});

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LogLevel {
    Trace,
    Debug,
    Info,
    Warn,
    Error,
}

impl LogLevel {
    /// Case-insensitive; `warning` is accepted for `warn`.
    pub fn parse(raw: &str) -> Result<Self, LoggingError> {
        match raw.trim().to_ascii_lowercase().as_str() {
            "trace" => Ok(Self::Trace),
            "debug" => Ok(Self::Debug),
            "info" => Ok(Self::Info),
            "warn" | "warning" => Ok(Self::Warn),
            "error" => Ok(Self::Error),
            _ => Err(LoggingError::UnknownLevel(raw.trim().to_string())),
        }
    }

    pub fn as_str(self) -> &'static str {
        match self {
            Self::Trace => "trace",
            Self::Debug => "debug",
            Self::Info => "info",
            Self::Warn => "warn",
            Self::Error => "error",
        }
    }

    /// `Debug` in debug builds, `Info` otherwise.
    pub fn for_build() -> Self {
        if cfg!(debug_assertions) {
            Self::Debug
        } else {
            Self::Info
        }
    }
}

/// Validated logging settings handed over by the host app.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LogConfig {
    pub level: LogLevel,
    pub dir: PathBuf,
}

impl LogConfig {
    /// # Errors
    /// - `UnknownLevel` for anything outside `trace|debug|info|warn|error`.
    /// - `MissingDir` / `RelativeDir` unless `dir` is an absolute path.
    pub fn new(level: &str, dir: &str) -> Result<Self, LoggingError> {
        let level = LogLevel::parse(level)?;
        let dir = dir.trim();
        if dir.is_empty() {
            return Err(LoggingError::MissingDir);
        }
        let dir = Path::new(dir);
        if !dir.is_absolute() {
            return Err(LoggingError::RelativeDir(dir.to_path_buf()));
        }
        Ok(Self {
            level,
            dir: dir.to_path_buf(),
        })
    }
}

#[derive(Debug)]
pub enum LoggingError {
    UnknownLevel(String),
    MissingDir,
    RelativeDir(PathBuf),
    CreateDir {
        path: PathBuf,
        source: std::io::Error,
    },
    Backend(FlexiLoggerError),
    /// Logging already runs with `active`.
    Reconfigure {
        active: LogConfig,
        requested: LogConfig,
    },
}

impl Display for LoggingError {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::UnknownLevel(raw) => write!(
                f,
                "unsupported log level `{raw}`; expected trace|debug|info|warn|error"
            ),
            Self::MissingDir => write!(f, "log directory cannot be empty"),
            Self::RelativeDir(path) => {
                write!(f, "log directory must be absolute, got `{}`", path.display())
            }
            Self::CreateDir { path, source } => write!(
                f,
                "failed to create log directory `{}`: {source}",
                path.display()
            ),
            Self::Backend(err) => write!(f, "failed to start logger: {err}"),
            Self::Reconfigure { active, requested } => write!(
                f,
                "logging already active ({} at `{}`); refusing {} at `{}`",
                active.level.as_str(),
                active.dir.display(),
                requested.level.as_str(),
                requested.dir.display()
            ),
        }
    }
}

impl Error for LoggingError {
    fn source(&self) -> Option<&(dyn Error + 'static)> {
        match self {
            Self::CreateDir { source, .. } => Some(source),
            Self::Backend(err) => Some(err),
            _ => None,
        }
    }
}

impl From<FlexiLoggerError> for LoggingError {
    fn from(value: FlexiLoggerError) -> Self {
        Self::Backend(value)
    }
}

struct ActiveLogger {
    config: LogConfig,
    _handle: LoggerHandle,
}

/// Starts file logging once per process.
///
/// Repeating the active configuration is a no-op.
///
/// # Errors
/// - Invalid `level` or `log_dir` (see [`LogConfig::new`]).
/// - `Reconfigure` when a different configuration is already active.
/// - Directory creation or backend start-up failures.
pub fn init_logging(level: &str, log_dir: &str) -> Result<(), LoggingError> {
    let requested = LogConfig::new(level, log_dir)?;
    let active = ACTIVE.get_or_try_init(|| start(requested.clone()))?;
    if active.config != requested {
        return Err(LoggingError::Reconfigure {
            active: active.config.clone(),
            requested,
        });
    }
    Ok(())
}

/// Configuration of the running logger, if any.
pub fn logging_status() -> Option<LogConfig> {
    ACTIVE.get().map(|active| active.config.clone())
}

/// Level name the host should pass when it has no preference.
pub fn default_log_level() -> &'static str {
    LogLevel::for_build().as_str()
}

fn start(config: LogConfig) -> Result<ActiveLogger, LoggingError> {
    std::fs::create_dir_all(&config.dir).map_err(|source| LoggingError::CreateDir {
        path: config.dir.clone(),
        source,
    })?;

    let handle = Logger::try_with_str(config.level.as_str())?
        .log_to_file(
            FileSpec::default()
                .directory(config.dir.as_path())
                .basename(FILE_BASENAME),
        )
        .rotate(
            Criterion::Size(ROTATE_AT_BYTES),
            Naming::Numbers,
            Cleanup::KeepLogFiles(KEEP_FILES),
        )
        .write_mode(WriteMode::BufferAndFlush)
        .append()
        .format_for_files(flexi_logger::detailed_format)
        .start()?;

    install_panic_reporter();
    info!("{}", core_init_event());

    Ok(ActiveLogger {
        config,
        _handle: handle,
    })
}

fn core_init_event() -> String {
    format!(
        "event=core_init module=core status=ok version={} build={} platform={} schema_version={} slot_key={}",
        env!("CARGO_PKG_VERSION"),
        if cfg!(debug_assertions) { "debug" } else { "release" },
        std::env::consts::OS,
        latest_version(),
        DEFAULT_DRAFT_SLOT_KEY
    )
}

fn install_panic_reporter() {
    PANIC_REPORTER.call_once(|| {
        let previous = std::panic::take_hook();
        std::panic::set_hook(Box::new(move |info| {
            let at = info.location().map_or_else(
                || "unknown".to_string(),
                |location| format!("{}:{}", location.file(), location.line()),
            );
            // Panic text may echo credentials typed into the sign-up form.
            let message = redact(panic_text(info.payload()), PANIC_MESSAGE_LIMIT);
            error!("event=panic module=core status=error at={at} message={message}");
            previous(info);
        }));
    });
}

fn panic_text(payload: &(dyn Any + Send)) -> &str {
    payload
        .downcast_ref::<&str>()
        .copied()
        .or_else(|| payload.downcast_ref::<String>().map(String::as_str))
        .unwrap_or("<non-string payload>")
}

/// One-line copy of `text`, emails masked, at most `limit` chars plus `...`.
fn redact(text: &str, limit: usize) -> String {
    let masked = EMAIL.replace_all(text, "<email>");
    let flat: String = masked
        .chars()
        .map(|c| if c.is_control() { ' ' } else { c })
        .collect();
    match flat.char_indices().nth(limit) {
        Some((cut, _)) => format!("{}...", &flat[..cut]),
        None => flat,
    }
}
