//! Tracing setup shared by the backup worker and the test suites.

use std::sync::Once;

use tracing_subscriber::EnvFilter;
use tracing_subscriber::layer::SubscriberExt;
use tracing_subscriber::util::SubscriberInitExt;

/// Default filter when `RUST_LOG` is not set.
const DEFAULT_LOG_LEVEL: &str = "info";

static TEST_TRACING: Once = Once::new();

/// Installs the global subscriber for a binary.
///
/// `RUST_LOG` wins when present; otherwise `{crate_name}=info,tablestore=info` is used.
pub fn init_tracing(crate_name: &str) {
    let default_filter = format!("{crate_name}={DEFAULT_LOG_LEVEL},tablestore={DEFAULT_LOG_LEVEL}");

    tracing_subscriber::registry()
        .with(EnvFilter::try_from_default_env().unwrap_or_else(|_| default_filter.into()))
        .with(tracing_subscriber::fmt::layer().with_target(true))
        .init();
}

/// Installs a subscriber writing through the test harness, once per process.
///
/// Output only shows up for failing tests or with `--nocapture`.
pub fn init_test_tracing() {
    TEST_TRACING.call_once(|| {
        let filter = EnvFilter::try_from_default_env()
            .unwrap_or_else(|_| EnvFilter::new(format!("tablestore={DEFAULT_LOG_LEVEL}")));

        let _ = tracing_subscriber::registry()
            .with(filter)
            .with(tracing_subscriber::fmt::layer().with_test_writer())
            .try_init();
    });
}
