//! Minimal logger for the grading tools.
//!
//! Prints `[elapsed LEVEL phase] message` to stderr. The elapsed prefix makes
//! the step output readable when many scan workers interleave; the phase tag
//! tells the stages of a multi-stage run apart (`scan`, `reconstruct`,
//! `tables`, `annotate`). Install once at startup with `init_with_level`;
//! each pipeline stage announces itself with [`set_phase`].

use std::io::Write;
use std::sync::{Mutex, OnceLock};
use std::time::Instant;

use log::{Level, LevelFilter, Log, Metadata, Record};

#[cfg(feature = "tracing")]
use tracing_subscriber::fmt::format::FmtSpan;
#[cfg(feature = "tracing")]
use tracing_subscriber::util::SubscriberInitExt;
#[cfg(feature = "tracing")]
use tracing_subscriber::{fmt, EnvFilter};

static PHASE: Mutex<&'static str> = Mutex::new("");

/// Tag subsequent log lines with the named pipeline phase.
///
/// An empty phase drops the tag again.
pub fn set_phase(phase: &'static str) {
    *PHASE.lock().unwrap_or_else(|p| p.into_inner()) = phase;
}

fn current_phase() -> &'static str {
    *PHASE.lock().unwrap_or_else(|p| p.into_inner())
}

fn prefix(elapsed: f64, level: Level, phase: &str) -> String {
    if phase.is_empty() {
        format!("[{elapsed:7.3}s {level:>5}]")
    } else {
        format!("[{elapsed:7.3}s {level:>5} {phase}]")
    }
}

struct ElapsedLogger {
    level: LevelFilter,
    started: Instant,
}

impl Log for ElapsedLogger {
    fn enabled(&self, metadata: &Metadata) -> bool {
        metadata.level() <= self.level
    }

    fn log(&self, record: &Record) {
        if !self.enabled(record.metadata()) {
            return;
        }

        let elapsed = self.started.elapsed().as_secs_f64();
        let mut stderr = std::io::stderr();
        let _ = writeln!(
            stderr,
            "{} {}",
            prefix(elapsed, record.level(), current_phase()),
            record.args()
        );
    }

    fn flush(&self) {}
}

static LOGGER: OnceLock<ElapsedLogger> = OnceLock::new();

/// Install the elapsed-time logger with the provided level filter.
///
/// Calling this more than once is a no-op after the first successful
/// initialization.
pub fn init_with_level(level: LevelFilter) -> Result<(), log::SetLoggerError> {
    if LOGGER.get().is_none() {
        let logger = LOGGER.get_or_init(|| ElapsedLogger {
            level,
            started: Instant::now(),
        });
        log::set_logger(logger)?;
        log::set_max_level(level);
    }
    Ok(())
}

#[cfg(feature = "tracing")]
pub fn init_tracing(json: bool) {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));
    if json {
        let _ = fmt()
            .with_env_filter(filter)
            .with_span_events(FmtSpan::CLOSE)
            .json()
            .flatten_event(true)
            .finish()
            .try_init();
    } else {
        let _ = fmt()
            .with_env_filter(filter)
            .with_span_events(FmtSpan::CLOSE)
            .with_timer(fmt::time::Uptime::default())
            .finish()
            .try_init();
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn phase_tag_appears_in_the_prefix() {
        assert_eq!(prefix(1.5, Level::Info, ""), "[  1.500s  INFO]");
        assert_eq!(prefix(1.5, Level::Warn, "scan"), "[  1.500s  WARN scan]");
    }

    #[test]
    fn set_phase_swaps_the_tag() {
        set_phase("reconstruct");
        assert_eq!(current_phase(), "reconstruct");
        set_phase("");
        assert_eq!(current_phase(), "");
    }
}
