//! JSON tracing subscriber.
//!
//! One JSON object per line on stdout, with the current span's fields
//! (`queue`, `delivery_tag`, ...) attached to every event. Filtering follows
//! `RUST_LOG`; without it the process logs at `info`.

use tracing_subscriber::EnvFilter;

/// Filter used when `RUST_LOG` is unset or unparsable.
pub const DEFAULT_DIRECTIVE: &str = "info";

/// Initialize tracing for `service`.
///
/// Safe to call multiple times; only the first call installs a subscriber.
pub fn init(service: &'static str) {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| default_filter());

    let installed = tracing_subscriber::fmt()
        .with_env_filter(filter)
        .json()
        .with_current_span(true)
        .with_span_list(false)
        .with_timer(tracing_subscriber::fmt::time::SystemTime)
        .with_target(false)
        .try_init()
        .is_ok();

    if installed {
        tracing::info!(service, "tracing initialized");
    }
}

fn default_filter() -> EnvFilter {
    EnvFilter::new(DEFAULT_DIRECTIVE)
}
