//! Logging setup.

use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

/// Default filter when `RUST_LOG` is unset.
pub const DEFAULT_FILTER: &str = "ta_fixture=info,ta_engine=info";

/// Filter used when debug output is requested.
pub const DEBUG_FILTER: &str = "ta_fixture=debug,ta_engine=debug";

/// Installs the global subscriber.
///
/// Safe to call from every test: only the first call installs anything.
pub fn init(debug: bool) {
    let filter = if debug { DEBUG_FILTER } else { DEFAULT_FILTER };

    let _ = tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env().unwrap_or_else(|_| filter.into()),
        )
        .with(tracing_subscriber::fmt::layer().with_target(false))
        .try_init();
}
