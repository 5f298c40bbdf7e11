//! Tracing subscriber setup for hosts and tests.

use crate::settings::LoggingConfig;

/// Install a global `tracing` subscriber. `RUST_LOG` overrides
/// `config.level`. Calling this twice keeps the first subscriber.
pub fn init_logging(config: &LoggingConfig) {
    use tracing_subscriber::{fmt, EnvFilter};

    let env_filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(&config.level));

    if config.json {
        let subscriber = fmt::Subscriber::builder()
            .with_env_filter(env_filter)
            .json()
            .finish();
        tracing::subscriber::set_global_default(subscriber).ok();
    } else {
        let subscriber = fmt::Subscriber::builder()
            .with_env_filter(env_filter)
            .with_target(true)
            .finish();
        tracing::subscriber::set_global_default(subscriber).ok();
    }
}

/// Logging for tests: debug level, captured by the test harness.
pub fn init_test_logging() {
    use tracing_subscriber::{fmt, EnvFilter};

    let subscriber = fmt::Subscriber::builder()
        .with_env_filter(EnvFilter::new("debug"))
        .with_test_writer()
        .finish();
    tracing::subscriber::set_global_default(subscriber).ok();
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_second_init_is_ignored() {
        init_test_logging();
        init_logging(&LoggingConfig::default());
        tracing::debug!("still logging after a second init");
    }
}
