//! Logging setup for applications and tests using block-ad
//!
//! The library itself only emits `tracing` events: `debug!` per factor linearization,
//! `trace!` per composed node and `error!` whenever an error is constructed through
//! `log()`. Installing a subscriber is up to the caller.

use tracing::Level;
use tracing_subscriber::fmt::{FmtContext, FormatEvent, FormatFields, format::Writer};
use tracing_subscriber::registry::LookupSpan;

/// Install the block-ad subscriber with INFO as the default level.
///
/// Format: `[LEVEL YYYY-MM-DD HH:MM:SS module]` for INFO/WARN/ERROR
///         `[LEVEL YYYY-MM-DD HH:MM:SS file:line]` for DEBUG/TRACE
///
/// Returns `false` when a global subscriber was already installed.
///
/// # Example
/// ```no_run
/// use block_ad::init_logger;
///
/// init_logger();
/// tracing::info!("Linearizing camera factors");
/// ```
///
/// # Environment Variables
/// ```bash
/// RUST_LOG=block_ad=trace cargo test
/// ```
pub fn init_logger() -> bool {
    init_logger_with_level(Level::INFO)
}

/// Install the block-ad subscriber with a custom default level (overridable via `RUST_LOG`).
///
/// # Example
/// ```no_run
/// use block_ad::init_logger_with_level;
/// use tracing::Level;
///
/// init_logger_with_level(Level::DEBUG);
/// tracing::debug!("Per-factor linearization logging enabled");
/// ```
pub fn init_logger_with_level(default_level: Level) -> bool {
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::builder()
                .with_default_directive(default_level.into())
                .from_env_lossy(),
        )
        .event_format(BracketFormatter)
        .try_init()
        .is_ok()
}

fn level_label(level: &Level) -> &'static str {
    match *level {
        Level::ERROR => "\x1b[31mERROR\x1b[0m",
        Level::WARN => "\x1b[33mWARN\x1b[0m",
        Level::INFO => "\x1b[32mINFO\x1b[0m",
        Level::DEBUG => "\x1b[34mDEBUG\x1b[0m",
        Level::TRACE => "\x1b[35mTRACE\x1b[0m",
    }
}

/// Where an event came from: `file:line` for verbose levels, the module otherwise.
fn location(metadata: &tracing::Metadata<'_>) -> String {
    let verbose = *metadata.level() == Level::DEBUG || *metadata.level() == Level::TRACE;
    match (verbose, metadata.file()) {
        (true, Some(file)) => {
            let filename = file.rsplit(['/', '\\']).next().unwrap_or(file);
            match metadata.line() {
                Some(line) => format!("{filename}:{line}"),
                None => filename.to_string(),
            }
        }
        _ => metadata.target().to_string(),
    }
}

/// Bracketed, colored single-line event format
struct BracketFormatter;

impl<S, N> FormatEvent<S, N> for BracketFormatter
where
    S: tracing::Subscriber + for<'a> LookupSpan<'a>,
    N: for<'a> FormatFields<'a> + 'static,
{
    fn format_event(
        &self,
        ctx: &FmtContext<'_, S, N>,
        mut writer: Writer<'_>,
        event: &tracing::Event<'_>,
    ) -> std::fmt::Result {
        let metadata = event.metadata();
        write!(
            writer,
            "[{} {} {}] ",
            level_label(metadata.level()),
            chrono::Local::now().format("%Y-%m-%d %H:%M:%S"),
            location(metadata)
        )?;
        ctx.field_format().format_fields(writer.by_ref(), event)?;
        writeln!(writer)
    }
}
