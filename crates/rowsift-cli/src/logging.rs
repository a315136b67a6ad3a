//! Log output for the `rowsift` binary.
//!
//! `RUST_LOG` wins when it is set. Otherwise the level comes from the
//! number of `-v` flags: warnings by default, then info, debug and trace.

use std::io;

use tracing::level_filters::LevelFilter;
use tracing_subscriber::EnvFilter;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct LogConfig {
    pub verbosity: u8,
    /// Include the event target (module path) in each line.
    pub with_target: bool,
}

impl LogConfig {
    pub fn from_verbosity(verbosity: u8) -> Self {
        Self {
            verbosity,
            with_target: verbosity >= 2,
        }
    }

    pub fn level(&self) -> LevelFilter {
        match self.verbosity {
            0 => LevelFilter::WARN,
            1 => LevelFilter::INFO,
            2 => LevelFilter::DEBUG,
            _ => LevelFilter::TRACE,
        }
    }

    fn env_filter(&self) -> EnvFilter {
        EnvFilter::builder()
            .with_default_directive(self.level().into())
            .from_env_lossy()
    }
}

/// Install the global subscriber, writing to stderr so stdout stays
/// machine-readable. Calling it again is a no-op.
pub fn init_logging(config: &LogConfig) {
    let _ = tracing_subscriber::fmt()
        .with_env_filter(config.env_filter())
        .with_writer(io::stderr)
        .with_target(config.with_target)
        .try_init();
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn verbosity_raises_the_level() {
        assert_eq!(LogConfig::default().level(), LevelFilter::WARN);
        assert_eq!(LogConfig::from_verbosity(1).level(), LevelFilter::INFO);
        assert_eq!(LogConfig::from_verbosity(2).level(), LevelFilter::DEBUG);
        assert_eq!(LogConfig::from_verbosity(7).level(), LevelFilter::TRACE);
        assert!(!LogConfig::from_verbosity(1).with_target);
    }
}
