//! Logging setup for the CLI and daemon binaries. Wraps
//! `tracing_subscriber::fmt` with an `EnvFilter` so a level can be set per
//! deployment, and an optional JSON formatter for the daemon where logs
//! are typically shipped rather than read on a terminal.

use tracing_subscriber::EnvFilter;

/// `RUST_LOG` is honored when set; otherwise this is the default filter
/// directive applied to the whole crate.
const DEFAULT_FILTER: &str = "ldpipe=info,warn";

pub struct LoggingOptions {
    pub json: bool,
    pub verbose: bool,
}

impl Default for LoggingOptions {
    fn default() -> Self {
        Self { json: false, verbose: false }
    }
}

pub fn init(options: LoggingOptions) {
    let directive = if options.verbose { "ldpipe=debug,info" } else { DEFAULT_FILTER };
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(directive));

    let subscriber = tracing_subscriber::fmt().with_env_filter(filter);

    if options.json {
        subscriber.json().init();
    } else {
        subscriber.init();
    }
}
