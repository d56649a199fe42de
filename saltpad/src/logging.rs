//! Diagnostic tracing for saltpad itself.
//!
//! Deployment reports are product output and go through [`crate::console`];
//! tracing is for debugging the tool and is silent unless `RUST_LOG` asks.

use tracing_subscriber::{EnvFilter, fmt, layer::SubscriberExt, util::SubscriberInitExt};

/// Initialize the tracing subscriber.
///
/// Reads `RUST_LOG`, defaulting to `warn`. Output goes to stderr in compact format
/// so it never mixes with deployment reports on stdout.
///
/// ```bash
/// RUST_LOG=saltpad=debug saltpad deploy 'web*'
/// ```
pub fn init() {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("warn"));

    tracing_subscriber::registry()
        .with(filter)
        .with(fmt::layer().with_writer(std::io::stderr).compact())
        .init();
}
