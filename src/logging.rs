//! Tracing subscriber setup.
//!
//! Logs go to stderr. `RUST_LOG` wins when set; otherwise the verbosity
//! count picks the level for the `documentor` crates.

use tracing_subscriber::EnvFilter;

fn default_directive(verbosity: u8) -> &'static str {
    match verbosity {
        0 => "warn",
        1 => "info,documentor=info,documentor_core=info",
        _ => "debug,documentor=debug,documentor_core=debug,sqlx=warn,hyper=info",
    }
}

/// Install the global subscriber. Safe to call more than once.
pub fn init(verbosity: u8) {
    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new(default_directive(verbosity)));

    let _ = tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .with_target(false)
        .try_init();
}
