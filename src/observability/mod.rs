//! Observability
//!
//! Process-wide `env_logger` setup. `RUST_LOG` always wins; without it only warnings are
//! shown, plus the call log of the logging decorator when requested.

use log::LevelFilter;

/// Target of the entry/exit records written by the logging decorator.
pub const CALL_LOG_TARGET: &str = "posix_support::backend::logging";

/// Target of emulated-backend compatibility notes (ignored flags, approximations).
pub const COMPAT_LOG_TARGET: &str = "posix_support::compat";

/// Level of the call log for the decorator's `Debug`/`Trace` split.
pub fn call_log_level(trace: bool) -> LevelFilter {
    if trace {
        LevelFilter::Trace
    } else {
        LevelFilter::Debug
    }
}

/// Filter used when `RUST_LOG` is unset.
pub fn default_filter(call_log: Option<LevelFilter>) -> String {
    match call_log {
        Some(level) => format!(
            "warn,{}={},{}=info",
            CALL_LOG_TARGET,
            level.as_str().to_ascii_lowercase(),
            COMPAT_LOG_TARGET
        ),
        None => "warn".to_string(),
    }
}

/// Install the global logger. Later calls are no-ops, so tests and binaries can both
/// call this freely.
pub fn init_logging(call_log: Option<LevelFilter>) {
    let env = env_logger::Env::default().default_filter_or(default_filter(call_log));
    if env_logger::Builder::from_env(env).format_timestamp_millis().try_init().is_err() {
        log::debug!("Logger already initialized");
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_filter() {
        assert_eq!(default_filter(None), "warn");
        assert_eq!(
            default_filter(Some(call_log_level(false))),
            "warn,posix_support::backend::logging=debug,posix_support::compat=info"
        );
        assert!(default_filter(Some(call_log_level(true))).contains("logging=trace"));
    }

    #[test]
    fn test_repeated_init_is_harmless() {
        init_logging(None);
        init_logging(Some(LevelFilter::Debug));
    }
}
