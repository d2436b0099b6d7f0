//! Logging for mmpack-build.
//!
//! This crate provides:
//! - Structured logging setup
//! - Per-phase timing of a source package build
//! - JSON log output for build farms (`MMPACK_LOG_JSON`)

use std::fmt;
use std::time::Instant;
use tracing_subscriber::{
    EnvFilter,
    fmt::{self as tfmt, format::FmtSpan},
    prelude::*,
};

/// Environment variable switching log output to JSON.
pub const LOG_JSON_ENV: &str = "MMPACK_LOG_JSON";

/// Initialize the tracing subscriber.
///
/// `RUST_LOG` takes precedence; otherwise mmpack crates log at `debug` when
/// verbose and at `warn` (spec drift reports included) when not.
pub fn init(verbose: bool) {
    let default_directive = if verbose { "mmpack=debug" } else { "mmpack=warn" };
    let filter =
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default_directive));

    let subscriber = tracing_subscriber::registry().with(filter);

    if std::env::var(LOG_JSON_ENV).is_ok() {
        let json_layer = tfmt::layer()
            .json()
            .with_span_events(FmtSpan::CLOSE)
            .with_target(true)
            .with_current_span(true);

        subscriber.with(json_layer).init();
    } else {
        let fmt_layer = tfmt::layer().with_target(false).without_time();

        subscriber.with(fmt_layer).init();
    }
}

/// The sequential phases of a source package build.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Phase {
    /// Normalizing the local install tree
    PostInstall,
    /// Assigning files to packages
    Ventilate,
    /// Collecting what each package provides
    Provides,
    /// Resolving what each package depends on
    Depends,
    /// Writing package metadata and archives
    Finalize,
}

impl Phase {
    /// Name used in log records.
    pub fn as_str(&self) -> &'static str {
        match self {
            Phase::PostInstall => "post-install",
            Phase::Ventilate => "ventilate",
            Phase::Provides => "provides",
            Phase::Depends => "depends",
            Phase::Finalize => "finalize",
        }
    }
}

impl fmt::Display for Phase {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Logs the duration of a build phase when dropped.
pub struct PhaseGuard {
    srcname: String,
    phase: Phase,
    start: Instant,
}

impl PhaseGuard {
    /// Start timing `phase` of the build of `srcname`.
    pub fn start(srcname: impl Into<String>, phase: Phase) -> Self {
        let srcname = srcname.into();
        tracing::debug!(source = %srcname, phase = %phase, "Phase started");
        Self {
            srcname,
            phase,
            start: Instant::now(),
        }
    }

    /// The phase being timed.
    pub fn phase(&self) -> Phase {
        self.phase
    }
}

impl Drop for PhaseGuard {
    fn drop(&mut self) {
        tracing::info!(
            source = %self.srcname,
            phase = %self.phase,
            duration_ms = self.start.elapsed().as_millis() as u64,
            "Phase completed"
        );
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_phase_names() {
        assert_eq!(Phase::Ventilate.to_string(), "ventilate");
        assert_eq!(Phase::PostInstall.as_str(), "post-install");
    }

    #[test]
    fn test_guard_logs_after_init() {
        init(true);
        let guard = PhaseGuard::start("foo", Phase::Provides);
        assert_eq!(guard.phase(), Phase::Provides);
        drop(guard);
    }
}
