//! Test log output.

use std::sync::Once;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

const DEFAULT_FILTER: &str = "env_harness=info,wrenidm_env_tests=info";

static INIT: Once = Once::new();

/// Install the fmt subscriber. Safe to call from every test.
///
/// `RUST_LOG` overrides the default filter.
pub fn init() {
    INIT.call_once(|| {
        let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| DEFAULT_FILTER.into());

        // Another subscriber may already be installed by the test binary
        let _ = tracing_subscriber::registry()
            .with(filter)
            .with(tracing_subscriber::fmt::layer().with_test_writer())
            .try_init();
    });
}
