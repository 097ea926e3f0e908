//! Rolling file logs for the trip core.
//!
//! # Responsibility
//! - Start the `flexi_logger` backend once per process.
//! - Route panics into the log as one flattened line.
//!
//! # Invariants
//! - Log lines carry IDs, counts and durations; never trip titles or memos.
//! - A second `init_logging` with the same settings is a no-op; with other
//!   settings it fails and the active logger keeps running.
//! - Nothing here panics.

use flexi_logger::{
    Cleanup, Criterion, FileSpec, LogSpecification, Logger, LoggerHandle, Naming, WriteMode,
};
use log::{error, info, LevelFilter};
use once_cell::sync::OnceCell;
use std::error::Error;
use std::fmt::{Display, Formatter};
use std::path::{Path, PathBuf};

const LOG_BASENAME: &str = "tripnote";
const ROTATE_AT_BYTES: u64 = 10 * 1024 * 1024;
const KEEP_ROTATED_FILES: usize = 5;
const PANIC_LINE_LIMIT: usize = 160;

static LOGGER: OnceCell<RunningLogger> = OnceCell::new();
static PANIC_HOOK: OnceCell<()> = OnceCell::new();

#[derive(Debug)]
pub enum LoggingError {
    UnknownLevel(String),
    /// Log directories must be absolute so restarts write to the same place.
    RelativeDir(PathBuf),
    CreateDir {
        path: PathBuf,
        source: std::io::Error,
    },
    Start(String),
    AlreadyActive {
        level: LevelFilter,
        dir: PathBuf,
    },
}

impl Display for LoggingError {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::UnknownLevel(level) => write!(
                f,
                "unknown log level `{level}`, use off|error|warn|info|debug|trace"
            ),
            Self::RelativeDir(path) => {
                write!(f, "log dir `{}` is not absolute", path.display())
            }
            Self::CreateDir { path, source } => {
                write!(f, "cannot create log dir `{}`: {source}", path.display())
            }
            Self::Start(message) => write!(f, "logger did not start: {message}"),
            Self::AlreadyActive { level, dir } => write!(
                f,
                "logging already runs at {level} in `{}`",
                dir.display()
            ),
        }
    }
}

impl Error for LoggingError {
    fn source(&self) -> Option<&(dyn Error + 'static)> {
        match self {
            Self::CreateDir { source, .. } => Some(source),
            _ => None,
        }
    }
}

struct RunningLogger {
    level: LevelFilter,
    dir: PathBuf,
    _handle: LoggerHandle,
}

/// Starts logging to `<log_dir>/tripnote*.log` at `level`.
pub fn init_logging(level: &str, log_dir: &Path) -> Result<(), LoggingError> {
    let level = parse_level(level)?;
    if !log_dir.is_absolute() {
        return Err(LoggingError::RelativeDir(log_dir.to_path_buf()));
    }

    let running = LOGGER.get_or_try_init(|| start(level, log_dir))?;
    if running.level != level || running.dir != log_dir {
        return Err(LoggingError::AlreadyActive {
            level: running.level,
            dir: running.dir.clone(),
        });
    }
    Ok(())
}

/// Level and directory of the running logger, if any.
pub fn logging_status() -> Option<(LevelFilter, PathBuf)> {
    LOGGER
        .get()
        .map(|running| (running.level, running.dir.clone()))
}

/// Level used when neither flags nor environment choose one.
pub fn default_log_level() -> &'static str {
    if cfg!(debug_assertions) {
        "debug"
    } else {
        "info"
    }
}

fn parse_level(raw: &str) -> Result<LevelFilter, LoggingError> {
    raw.trim()
        .parse::<LevelFilter>()
        .map_err(|_| LoggingError::UnknownLevel(raw.trim().to_string()))
}

fn start(level: LevelFilter, dir: &Path) -> Result<RunningLogger, LoggingError> {
    std::fs::create_dir_all(dir).map_err(|source| LoggingError::CreateDir {
        path: dir.to_path_buf(),
        source,
    })?;

    let spec = LogSpecification::builder().default(level).build();
    let handle = Logger::with(spec)
        .log_to_file(FileSpec::default().directory(dir).basename(LOG_BASENAME))
        .rotate(
            Criterion::Size(ROTATE_AT_BYTES),
            Naming::Numbers,
            Cleanup::KeepLogFiles(KEEP_ROTATED_FILES),
        )
        .write_mode(WriteMode::BufferAndFlush)
        .append()
        .format_for_files(flexi_logger::detailed_format)
        .start()
        .map_err(|err| LoggingError::Start(err.to_string()))?;

    route_panics_to_log();
    info!(
        "event=logging_init module=core status=ok level={} os={} version={}",
        level,
        std::env::consts::OS,
        env!("CARGO_PKG_VERSION")
    );

    Ok(RunningLogger {
        level,
        dir: dir.to_path_buf(),
        _handle: handle,
    })
}

fn route_panics_to_log() {
    if PANIC_HOOK.set(()).is_err() {
        return;
    }

    let chained = std::panic::take_hook();
    std::panic::set_hook(Box::new(move |info| {
        let payload = info
            .payload()
            .downcast_ref::<&str>()
            .copied()
            .map(str::to_owned)
            .or_else(|| info.payload().downcast_ref::<String>().cloned())
            .unwrap_or_default();
        let at = info
            .location()
            .map_or_else(String::new, |loc| format!("{}:{}", loc.file(), loc.line()));
        error!(
            "event=panic module=core status=error at={} message={}",
            at,
            one_line(&payload, PANIC_LINE_LIMIT)
        );
        chained(info);
    }));
}

/// Joins lines and cuts to `limit` characters, marking the cut with `...`.
fn one_line(text: &str, limit: usize) -> String {
    let joined: String = text
        .chars()
        .map(|ch| if ch == '\n' || ch == '\r' { ' ' } else { ch })
        .collect();
    match joined.char_indices().nth(limit) {
        Some((cut, _)) => format!("{}...", &joined[..cut]),
        None => joined,
    }
}

#[cfg(test)]
mod tests {
    use super::{init_logging, logging_status, one_line, parse_level, LoggingError};
    use log::LevelFilter;
    use std::path::{Path, PathBuf};
    use std::time::{SystemTime, UNIX_EPOCH};

    #[test]
    fn levels_parse_case_insensitively() {
        assert_eq!(parse_level(" WARN ").unwrap(), LevelFilter::Warn);
        assert_eq!(parse_level("trace").unwrap(), LevelFilter::Trace);
        assert!(matches!(
            parse_level("loud"),
            Err(LoggingError::UnknownLevel(level)) if level == "loud"
        ));
    }

    #[test]
    fn relative_dir_is_rejected_before_start() {
        let err = init_logging("info", Path::new("logs")).unwrap_err();
        assert!(matches!(err, LoggingError::RelativeDir(_)));
    }

    #[test]
    fn one_line_flattens_and_cuts() {
        assert_eq!(one_line("Tokyo\nday 2\rmemo", 6), "Tokyo ...");
        assert_eq!(one_line("짧은 메모", 10), "짧은 메모");
    }

    #[test]
    fn second_init_must_match_first() {
        let dir = scratch_dir("logs");
        let other = scratch_dir("other");

        init_logging("info", &dir).unwrap();
        init_logging("INFO", &dir).unwrap();
        assert!(matches!(
            init_logging("debug", &dir),
            Err(LoggingError::AlreadyActive { .. })
        ));
        assert!(matches!(
            init_logging("info", &other),
            Err(LoggingError::AlreadyActive { .. })
        ));

        assert_eq!(logging_status(), Some((LevelFilter::Info, dir)));
    }

    // Outlives the test: the logger keeps its file open for the process.
    fn scratch_dir(name: &str) -> PathBuf {
        let nanos = SystemTime::now()
            .duration_since(UNIX_EPOCH)
            .unwrap()
            .as_nanos();
        std::env::temp_dir().join(format!("tripnote-{name}-{}-{nanos}", std::process::id()))
    }
}
