//! Diagnostic logging via `tracing` + `tracing-subscriber`.
//!
//! Level priority:
//! 1. `IDLEGUARD_LOG` environment variable (an `EnvFilter` directive)
//! 2. `debug` when `--verbose` is given
//! 3. `warn`
//!
//! Everything goes to stderr. The child's stdout is forwarded untouched, and
//! at the default level nothing is added to its stderr either.

use tracing_subscriber::EnvFilter;

pub const LOG_ENV: &str = "IDLEGUARD_LOG";

/// Install the global subscriber. Call once at startup.
pub fn init(verbose: bool) {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::new(directive(
            std::env::var(LOG_ENV).ok().as_deref(),
            verbose,
        )))
        .with_target(false)
        .with_thread_ids(false)
        .with_writer(std::io::stderr)
        .init();
}

/// The env directive if it parses, otherwise the default level.
fn directive(env: Option<&str>, verbose: bool) -> &str {
    match env {
        Some(d) if EnvFilter::try_new(d).is_ok() => d,
        _ => default_level(verbose),
    }
}

fn default_level(verbose: bool) -> &'static str {
    if verbose {
        "debug"
    } else {
        "warn"
    }
}
