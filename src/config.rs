use clap::error::ErrorKind;
use clap::{CommandFactory, Parser};
use std::ffi::{OsStr, OsString};
use std::time::Duration;

/// Exit code for malformed or missing command-line arguments.
pub const USAGE_EXIT_CODE: i32 = 1;

/// Run a command, forward its stdout and stderr unchanged, and kill it when it
/// produces no output for longer than the idle timeout (exit code 124).
#[derive(Parser, Debug)]
#[command(name = "idleguard", version, about)]
pub struct Cli {
    /// Seconds without any output before the command is killed (fractions allowed)
    #[arg(value_name = "IDLE_TIMEOUT_SECONDS", allow_negative_numbers = true)]
    pub timeout: String,

    /// Command to run, followed by its arguments (passed through unmodified)
    #[arg(
        value_name = "COMMAND",
        required = true,
        num_args = 1..,
        trailing_var_arg = true,
        allow_hyphen_values = true
    )]
    pub command: Vec<OsString>,

    /// Extra logging on stderr (spawn, signals, forwarder summaries)
    #[arg(short, long)]
    pub verbose: bool,
}

/// Immutable supervisor configuration, validated once at startup.
#[derive(Debug, Clone, PartialEq)]
pub struct GuardConfig {
    pub idle_timeout: Duration,
    pub program: OsString,
    pub args: Vec<OsString>,
}

#[derive(Debug)]
pub enum ConfigError {
    /// The command line does not match the usage, or help/version was asked for.
    Usage(clap::Error),
    /// The idle timeout is not a finite, non-negative number of seconds.
    InvalidTimeout { value: String },
}

impl std::fmt::Display for ConfigError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            ConfigError::InvalidTimeout { value } => write!(
                f,
                "invalid idle timeout '{}': must be a non-negative number of seconds",
                value
            ),
            ConfigError::Usage(e) => write!(f, "{}", e),
        }
    }
}

impl std::error::Error for ConfigError {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        match self {
            ConfigError::Usage(e) => Some(e),
            ConfigError::InvalidTimeout { .. } => None,
        }
    }
}

impl From<clap::Error> for ConfigError {
    fn from(e: clap::Error) -> Self {
        ConfigError::Usage(e)
    }
}

impl GuardConfig {
    /// Validate parsed arguments.
    pub fn from_cli(cli: &Cli) -> Result<Self, ConfigError> {
        let idle_timeout = parse_timeout(&cli.timeout)?;
        let (program, args) = cli.command.split_first().ok_or_else(|| {
            Cli::command().error(ErrorKind::MissingRequiredArgument, "no command given")
        })?;
        Ok(Self {
            idle_timeout,
            program: program.clone(),
            args: args.to_vec(),
        })
    }

    pub fn program(&self) -> &OsStr {
        &self.program
    }
}

/// Parse a decimal number of seconds into a `Duration`.
pub fn parse_timeout(value: &str) -> Result<Duration, ConfigError> {
    let invalid = || ConfigError::InvalidTimeout {
        value: value.to_string(),
    };
    let secs: f64 = value.trim().parse().map_err(|_| invalid())?;
    if !secs.is_finite() {
        return Err(invalid());
    }
    Duration::try_from_secs_f64(secs).map_err(|_| invalid())
}
