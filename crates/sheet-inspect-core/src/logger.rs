//! Stderr logging for the inspection crates.
//!
//! Records from the `sheet_inspect*` crates pass at the configured level;
//! everything else (decoders, thread pools) is capped at `warn`. Lines look
//! like `[  1.234s  WARN detect::pipeline] message`.

use std::io::Write;
use std::sync::OnceLock;
use std::time::Instant;

use log::{Level, LevelFilter, Log, Metadata, Record};

#[cfg(feature = "tracing")]
use tracing_subscriber::fmt::format::FmtSpan;
#[cfg(feature = "tracing")]
use tracing_subscriber::util::SubscriberInitExt;
#[cfg(feature = "tracing")]
use tracing_subscriber::{fmt, EnvFilter};

/// Crate-name prefix shared by every crate of the workspace.
const CRATE_PREFIX: &str = "sheet_inspect";

/// Crates whose records are shown at the configured level.
pub const INSPECT_CRATES: &[&str] = &[
    "sheet_inspect",
    "sheet_inspect_core",
    "sheet_inspect_align",
    "sheet_inspect_detect",
];

const DEPENDENCY_LEVEL: Level = Level::Warn;

fn is_inspect_target(target: &str) -> bool {
    target
        .split("::")
        .next()
        .is_some_and(|root| root.starts_with(CRATE_PREFIX))
}

/// Short label of a record target: the crate prefix is dropped and at most
/// the innermost module is kept (`sheet_inspect_detect::cues::color` becomes
/// `detect::color`, the facade becomes `cli`).
fn target_label(target: &str) -> String {
    if !is_inspect_target(target) {
        return target.split("::").next().unwrap_or(target).to_string();
    }
    let mut parts = target.split("::");
    let root = parts.next().unwrap_or(target);
    let krate = root
        .strip_prefix(CRATE_PREFIX)
        .map(|s| s.trim_start_matches('_'))
        .filter(|s| !s.is_empty())
        .unwrap_or("cli");
    match parts.last() {
        Some(module) => format!("{krate}::{module}"),
        None => krate.to_string(),
    }
}

struct InspectLogger {
    level: LevelFilter,
    started: Instant,
}

impl Log for InspectLogger {
    fn enabled(&self, metadata: &Metadata) -> bool {
        if is_inspect_target(metadata.target()) {
            metadata.level() <= self.level
        } else {
            metadata.level() <= self.level.min(DEPENDENCY_LEVEL.to_level_filter())
        }
    }

    fn log(&self, record: &Record) {
        if !self.enabled(record.metadata()) {
            return;
        }

        let elapsed = self.started.elapsed().as_secs_f64();
        let mut stderr = std::io::stderr().lock();
        let _ = writeln!(
            stderr,
            "[{:8.3}s {:>5} {}] {}",
            elapsed,
            record.level(),
            target_label(record.target()),
            record.args()
        );
    }

    fn flush(&self) {}
}

static LOGGER: OnceLock<InspectLogger> = OnceLock::new();

/// Install the stderr logger; `level` applies to the inspection crates.
///
/// Calling this more than once is a no-op after the first successful
/// initialization.
pub fn init_with_level(level: LevelFilter) -> Result<(), log::SetLoggerError> {
    if LOGGER.get().is_none() {
        let logger = LOGGER.get_or_init(|| InspectLogger {
            level,
            started: Instant::now(),
        });
        log::set_logger(logger)?;
        log::set_max_level(level);
    }
    Ok(())
}

/// `EnvFilter` directives equivalent to [`init_with_level`]: `warn` for
/// dependencies, `level` for the inspection crates.
pub fn default_directives(level: LevelFilter) -> String {
    let level = level.to_string().to_lowercase();
    let mut out = DEPENDENCY_LEVEL.to_string().to_lowercase();
    for krate in INSPECT_CRATES {
        out.push_str(&format!(",{krate}={level}"));
    }
    out
}

/// Install a `tracing` fmt subscriber filtered by `RUST_LOG`, falling back to
/// [`default_directives`] at `info`.
///
/// Span close events carry the stage timings recorded by the instrumented
/// pipeline functions.
#[cfg(feature = "tracing")]
pub fn init_tracing(json: bool) {
    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new(default_directives(LevelFilter::Info)));
    let builder = fmt()
        .with_env_filter(filter)
        .with_span_events(FmtSpan::CLOSE)
        .with_writer(std::io::stderr);
    if json {
        let _ = builder.json().flatten_event(true).finish().try_init();
    } else {
        let _ = builder
            .with_timer(fmt::time::Uptime::default())
            .finish()
            .try_init();
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn meta(target: &str, level: Level) -> Metadata<'_> {
        Metadata::builder().target(target).level(level).build()
    }

    #[test]
    fn labels_drop_the_crate_prefix() {
        assert_eq!(target_label("sheet_inspect_detect::cues::color"), "detect::color");
        assert_eq!(target_label("sheet_inspect_align"), "align");
        assert_eq!(target_label("sheet_inspect::detect"), "cli::detect");
        assert_eq!(target_label("rayon_core::registry"), "rayon_core");
    }

    #[test]
    fn dependencies_are_capped_at_warn() {
        let logger = InspectLogger {
            level: LevelFilter::Debug,
            started: Instant::now(),
        };
        assert!(logger.enabled(&meta("sheet_inspect_detect::pipeline", Level::Debug)));
        assert!(!logger.enabled(&meta("sheet_inspect_detect::pipeline", Level::Trace)));
        assert!(!logger.enabled(&meta("png::decoder", Level::Info)));
        assert!(logger.enabled(&meta("png::decoder", Level::Warn)));

        let quiet = InspectLogger {
            level: LevelFilter::Error,
            started: Instant::now(),
        };
        assert!(!quiet.enabled(&meta("png::decoder", Level::Warn)));
    }

    #[test]
    fn directives_name_every_workspace_crate() {
        let d = default_directives(LevelFilter::Debug);
        assert!(d.starts_with("warn,"));
        for krate in INSPECT_CRATES {
            assert!(d.contains(&format!("{krate}=debug")), "{d}");
        }
    }
}
