use std::io::IsTerminal;
use tracing_subscriber::{fmt, layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

/// Environment variable consulted when `RUST_LOG` is unset.
pub const LOG_ENV: &str = "LAN_SWEEP_LOGLEVEL";

/// Install the global stderr subscriber.
///
/// The filter comes from `RUST_LOG`, then [`LOG_ENV`], then defaults to
/// warnings from this crate only so scan output stays readable.
pub fn init() {
    let filter = std::env::var("RUST_LOG")
        .or_else(|_| std::env::var(LOG_ENV))
        .unwrap_or_else(|_| format!("{}=warn", env!("CARGO_CRATE_NAME")));

    let layer = fmt::layer()
        .with_writer(std::io::stderr)
        .with_target(false)
        .with_ansi(std::io::stderr().is_terminal());

    // A second init (tests, embedding) keeps the first subscriber.
    let _ = tracing_subscriber::registry()
        .with(layer)
        .with(EnvFilter::new(filter))
        .try_init();
}
