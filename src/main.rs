mod clock;
mod config;
mod forward;
mod logging;
mod monitor;
mod process;
mod supervisor;

use clap::error::ErrorKind;
use clap::{CommandFactory, Parser};
use config::{Cli, ConfigError, GuardConfig, USAGE_EXIT_CODE};
use supervisor::Supervisor;

#[tokio::main]
async fn main() {
    let cli = Cli::try_parse().unwrap_or_else(|e| exit_with(ConfigError::Usage(e)));

    logging::init(cli.verbose);

    let config = GuardConfig::from_cli(&cli).unwrap_or_else(|e| exit_with(e));
    tracing::debug!(?config, "parsed configuration");

    let code = match Supervisor::new(config).run().await {
        Ok(outcome) => outcome.exit_code(),
        Err(e) => {
            eprintln!("idleguard: {e}");
            1
        }
    };

    // Exit without waiting on the runtime; a forwarder abandoned after the
    // drain window must not hold the process open.
    std::process::exit(code);
}

/// Report a configuration problem and exit before anything is spawned.
fn exit_with(err: ConfigError) -> ! {
    match err {
        ConfigError::Usage(e)
            if matches!(e.kind(), ErrorKind::DisplayHelp | ErrorKind::DisplayVersion) =>
        {
            e.exit()
        }
        ConfigError::Usage(e) => {
            let _ = e.print();
        }
        ConfigError::InvalidTimeout { .. } => {
            eprintln!("error: {err}\n\n{}", Cli::command().render_usage());
        }
    }
    std::process::exit(USAGE_EXIT_CODE);
}
