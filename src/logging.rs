//! Structured logging setup.

use tracing_subscriber::EnvFilter;

/// Environment variable holding the log filter directive.
pub const LOG_ENV: &str = "VANTAGE_LOG";

/// Install the global subscriber.
///
/// Respects `VANTAGE_LOG` for filtering and defaults to `info`. With `json`
/// set, events are emitted as one JSON object per line.
pub fn init_tracing(json: bool) {
    let filter = EnvFilter::try_from_env(LOG_ENV).unwrap_or_else(|_| EnvFilter::new("info"));

    let builder = tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_target(true);

    // try_init: a second call (tests, embedding) keeps the first subscriber
    if json {
        let _ = builder.json().try_init();
    } else {
        let _ = builder.try_init();
    }
}
