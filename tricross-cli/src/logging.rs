//! Tracing setup for the CLI.
//!
//! Logs go to stderr so exported rows and summaries on stdout stay clean.
//! `RUST_LOG` overrides everything; otherwise the base level is `info`, or
//! `debug` with `--verbose`, and HTTP internals are held at `warn`.

use tracing_subscriber::prelude::*;
use tracing_subscriber::EnvFilter;

/// Library modules that are loud at debug level.
const NOISY_MODULES: &[&str] = &["hyper", "hyper_util", "reqwest", "h2", "rustls"];

fn build_filter(verbose: bool) -> EnvFilter {
    if let Ok(filter) = EnvFilter::try_from_default_env() {
        return filter;
    }
    let mut directives = String::from(if verbose { "debug" } else { "info" });
    for module in NOISY_MODULES {
        directives.push_str(&format!(",{module}=warn"));
    }
    EnvFilter::new(directives)
}

pub fn init(verbose: bool) {
    let fmt_layer = tracing_subscriber::fmt::layer()
        .with_writer(std::io::stderr)
        .with_target(verbose)
        .with_file(false)
        .with_line_number(false);

    let _ = tracing_subscriber::registry()
        .with(build_filter(verbose))
        .with(fmt_layer)
        .try_init();

    tracing::debug!(verbose, "logging initialized");
}
