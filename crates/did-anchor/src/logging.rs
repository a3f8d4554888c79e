use tracing_subscriber::{fmt, EnvFilter};

/// Filter directive used when neither `DID_ANCHOR_LOG` nor `RUST_LOG` is set.
/// Only the payment crates log at `info`; dependencies stay at `warn`.
pub const DEFAULT_LOG_FILTER: &str = "warn,did_anchor=info,btc_payment=info";

/// Resolve the filter: `DID_ANCHOR_LOG`, then `RUST_LOG`, then
/// [`DEFAULT_LOG_FILTER`]. Unparseable directives fall back to the default.
fn log_filter() -> EnvFilter {
    EnvFilter::try_from_env("DID_ANCHOR_LOG")
        .or_else(|_| EnvFilter::try_from_default_env())
        .unwrap_or_else(|_| EnvFilter::new(DEFAULT_LOG_FILTER))
}

/// Install a stderr subscriber for the payment flows.
///
/// Set `DID_ANCHOR_LOG_JSON=1` for JSON lines with flattened event fields.
/// Calling this more than once, or after the host installed its own
/// subscriber, is a no-op.
pub fn init_logging() {
    let use_json = std::env::var("DID_ANCHOR_LOG_JSON")
        .map(|value| value == "1")
        .unwrap_or(false);

    let builder = fmt::Subscriber::builder()
        .with_env_filter(log_filter())
        .with_target(true)
        .with_writer(std::io::stderr);

    if use_json {
        let _ = builder.json().flatten_event(true).try_init();
    } else {
        let _ = builder.compact().try_init();
    }
}
