//! Global tracing subscriber setup.

use tracing::{Level, Subscriber};
use tracing_subscriber::layer::SubscriberExt;
use tracing_subscriber::util::SubscriberInitExt;
use tracing_subscriber::{fmt, EnvFilter};

/// Installs the global tracing subscriber.
///
/// `RUST_LOG` takes precedence over `level`. With `json` set, log lines are
/// newline-delimited JSON. Only the first call in a process has any effect.
pub fn init_tracing(json: bool, level: Level) {
    let env_filter =
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(level.as_str()));

    if subscriber(json, env_filter).try_init().is_ok() {
        tracing::debug!(json, level = %level, "Tracing initialised");
    }
}

fn subscriber(json: bool, env_filter: EnvFilter) -> Box<dyn Subscriber + Send + Sync> {
    if json {
        Box::new(
            tracing_subscriber::registry()
                .with(env_filter)
                .with(fmt::layer().with_target(false).json()),
        )
    } else {
        Box::new(
            tracing_subscriber::registry()
                .with(env_filter)
                .with(fmt::layer().with_target(false)),
        )
    }
}
