//! Logging setup for the binary, built on `tracing-subscriber`.
//!
//! - `warn`: data-quality findings (multiple admissions, over-full schools)
//! - `info`: pipeline stage summaries
//! - `debug`: per-file and per-slot row counts
//!
//! `RUST_LOG` takes precedence over the verbosity flag when set.

use tracing::Level;
use tracing_subscriber::{fmt, layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

/// Map the `-v` count to a level: none → warn, `-v` → info, `-vv` → debug, more → trace.
pub fn level_from_verbosity(verbosity: u8) -> Level {
    match verbosity {
        0 => Level::WARN,
        1 => Level::INFO,
        2 => Level::DEBUG,
        _ => Level::TRACE,
    }
}

/// Install the global subscriber. Log lines go to stderr so they do not mix
/// with the status output on stdout.
pub fn init_logging(verbosity: u8) -> anyhow::Result<()> {
    let level = level_from_verbosity(verbosity);
    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new(format!("admissions_analyzer={}", level)));

    tracing_subscriber::registry()
        .with(filter)
        .with(fmt::layer().with_target(false).with_writer(std::io::stderr))
        .try_init()
        .map_err(|e| anyhow::anyhow!("failed to install log subscriber: {}", e))?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn verbosity_levels() {
        assert_eq!(level_from_verbosity(0), Level::WARN);
        assert_eq!(level_from_verbosity(2), Level::DEBUG);
        assert_eq!(level_from_verbosity(9), Level::TRACE);
    }
}
