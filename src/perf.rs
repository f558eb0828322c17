//! Timing scopes and the layout debug log.
//!
//! Scopes report through `tracing` at debug level when timing is enabled.
//! The debug log is a plain text file of timestamped engine events, opened
//! with `--layout-debug-log` or the `SIDENOTES_LAYOUT_DEBUG_LOG` variable.

use std::fs::File;
use std::io::{BufWriter, Write};
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{LazyLock, Mutex, MutexGuard, PoisonError};
use std::time::Instant;

/// Environment variable naming a debug log file.
pub const DEBUG_LOG_ENV: &str = "SIDENOTES_LAYOUT_DEBUG_LOG";

static ENABLED: AtomicBool = AtomicBool::new(false);
static DEBUG_LOG: LazyLock<Mutex<DebugLog>> = LazyLock::new(|| Mutex::new(DebugLog::default()));

/// Measures the time until it drops.
#[derive(Debug)]
#[must_use = "a scope measures nothing unless held"]
pub struct Scope {
    name: &'static str,
    start: Instant,
}

impl Scope {
    pub fn elapsed_ms(&self) -> f64 {
        self.start.elapsed().as_secs_f64() * 1000.0
    }
}

impl Drop for Scope {
    fn drop(&mut self) {
        if !is_enabled() {
            return;
        }
        let elapsed_ms = self.elapsed_ms();
        tracing::debug!(target: "sidenotes::perf", scope = self.name, elapsed_ms, "timing");
        log_event(self.name, format!("{elapsed_ms:.3} ms"));
    }
}

#[derive(Debug, Default)]
struct DebugLog {
    start: Option<Instant>,
    writer: Option<BufWriter<File>>,
}

fn debug_log() -> MutexGuard<'static, DebugLog> {
    DEBUG_LOG.lock().unwrap_or_else(PoisonError::into_inner)
}

pub fn set_enabled(enabled: bool) {
    ENABLED.store(enabled, Ordering::Relaxed);
}

pub fn is_enabled() -> bool {
    ENABLED.load(Ordering::Relaxed)
}

pub fn scope(name: &'static str) -> Scope {
    Scope {
        name,
        start: Instant::now(),
    }
}

/// Open (or with `None`, close) the debug log.
///
/// # Errors
/// Returns an error if the file cannot be created or written.
pub fn set_debug_log_path(path: Option<&Path>) -> std::io::Result<()> {
    let mut log = debug_log();
    let Some(path) = path else {
        if let Some(mut writer) = log.writer.take() {
            writer.flush()?;
        }
        log.start = None;
        return Ok(());
    };
    let mut writer = BufWriter::new(File::create(path)?);
    writeln!(writer, "sidenotes layout debug log start")?;
    writer.flush()?;
    log.start = Some(Instant::now());
    log.writer = Some(writer);
    Ok(())
}

/// The debug log path from the environment, if set and non-empty.
pub fn debug_log_path_from_env() -> Option<PathBuf> {
    std::env::var_os(DEBUG_LOG_ENV)
        .filter(|value| !value.is_empty())
        .map(PathBuf::from)
}

pub fn is_debug_log_enabled() -> bool {
    debug_log().writer.is_some()
}

/// Append one event line to the debug log, if open.
pub fn log_event(name: &str, detail: impl AsRef<str>) {
    let mut log = debug_log();
    let elapsed_ms = log
        .start
        .map_or(0.0, |start| start.elapsed().as_secs_f64() * 1000.0);
    if let Some(writer) = log.writer.as_mut() {
        let written = writeln!(writer, "[{elapsed_ms:>10.3} ms] {name}: {}", detail.as_ref())
            .and_then(|()| writer.flush());
        if let Err(err) = written {
            tracing::warn!("layout debug log write failed: {err}");
        }
    }
}
