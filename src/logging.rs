//! Logging setup
//! The library only uses the `log` facade; binaries call [`init_logging`] once.

use env_logger::Env;

/// Initializes `env_logger`. `RUST_LOG` wins over `default_filter`.
/// Calling it twice is harmless.
pub fn init_logging(default_filter: &str) {
    let result = env_logger::Builder::from_env(Env::default().default_filter_or(default_filter))
        .format_timestamp_millis()
        .try_init();

    match result {
        Ok(()) => log::info!("Logging initialized"),
        Err(e) => log::debug!("Logger already initialized: {}", e),
    }
}
