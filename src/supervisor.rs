/// Top-level wiring: spawn the child, run both forwarders and the idle
/// monitor, and decide the supervisor's exit outcome.
use crate::clock::ActivityClock;
use crate::config::GuardConfig;
use crate::forward::{forward, ForwardProgress, ForwardReport, Stream};
use crate::monitor::{IdleMonitor, MonitorOutcome};
use crate::process::{exit_code_of, ChildProcess, ProcessError, Termination};
use std::process::ExitStatus;
use std::time::Duration;
use tokio::io::AsyncWrite;
use tokio::task::JoinHandle;

/// Exit code used when the child was killed for being idle.
pub const TIMED_OUT_EXIT_CODE: i32 = 124;

/// How a supervised run ended.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Outcome {
    Completed(ExitStatus),
    TimedOut,
}

impl Outcome {
    pub fn exit_code(&self) -> i32 {
        match self {
            Outcome::Completed(status) => exit_code_of(*status),
            Outcome::TimedOut => TIMED_OUT_EXIT_CODE,
        }
    }
}

/// Fixed intervals of the supervision loop.
#[derive(Debug, Clone, Copy)]
pub struct Timings {
    pub poll_interval: Duration,
    /// Time between SIGTERM and SIGKILL.
    pub grace_period: Duration,
    /// Once the outcome is known, how long a forwarder may sit waiting on a
    /// pipe with no new bytes before it is abandoned. Time spent writing to a
    /// slow parent never counts against it.
    pub drain_limit: Duration,
}

impl Default for Timings {
    fn default() -> Self {
        Self {
            poll_interval: Duration::from_secs(1),
            grace_period: Duration::from_secs(5),
            drain_limit: Duration::from_secs(1),
        }
    }
}

pub struct Supervisor<O, E> {
    config: GuardConfig,
    timings: Timings,
    stdout: O,
    stderr: E,
}

impl Supervisor<tokio::io::Stdout, tokio::io::Stderr> {
    /// Supervisor forwarding to this process's own stdout and stderr.
    pub fn new(config: GuardConfig) -> Self {
        Self::with_sinks(config, tokio::io::stdout(), tokio::io::stderr())
    }
}

impl<O, E> Supervisor<O, E>
where
    O: AsyncWrite + Unpin + Send + 'static,
    E: AsyncWrite + Unpin + Send + 'static,
{
    pub fn with_sinks(config: GuardConfig, stdout: O, stderr: E) -> Self {
        Self {
            config,
            timings: Timings::default(),
            stdout,
            stderr,
        }
    }

    #[cfg(test)]
    pub fn timings(mut self, timings: Timings) -> Self {
        self.timings = timings;
        self
    }

    /// Run the child to completion or until it is killed for idling.
    ///
    /// Only a failed spawn, or losing track of the child's status, is an
    /// error; in the latter case the child is killed before returning.
    pub async fn run(self) -> Result<Outcome, ProcessError> {
        let Supervisor {
            config,
            timings,
            stdout,
            stderr,
        } = self;

        let (mut child, pipes) = ChildProcess::spawn(config.program(), &config.args)?;
        let clock = ActivityClock::new();
        tracing::info!(
            pid = ?child.pid(),
            timeout_ms = config.idle_timeout.as_millis() as u64,
            "supervising child"
        );

        let out_progress = ForwardProgress::new();
        let err_progress = ForwardProgress::new();
        let forwarders = [
            (
                tokio::spawn(forward(
                    pipes.stdout,
                    stdout,
                    clock.clone(),
                    out_progress.clone(),
                    Stream::Stdout,
                )),
                out_progress,
            ),
            (
                tokio::spawn(forward(
                    pipes.stderr,
                    stderr,
                    clock.clone(),
                    err_progress.clone(),
                    Stream::Stderr,
                )),
                err_progress,
            ),
        ];

        let monitor = IdleMonitor::new(clock, config.idle_timeout, timings.poll_interval);
        let outcome = match monitor.watch(&mut child).await {
            MonitorOutcome::Exited(status) => {
                tracing::info!(exit_code = exit_code_of(status), "child exited");
                Ok(Outcome::Completed(status))
            }
            MonitorOutcome::Breached { idle } => {
                eprintln!(
                    "\n[idleguard] No output for {} seconds. Killing process...",
                    config.idle_timeout.as_secs_f64()
                );
                tracing::info!(idle_ms = idle.as_millis() as u64, "idle timeout, stopping child");
                escalate(&mut child, timings.grace_period).await?;
                Ok(Outcome::TimedOut)
            }
            MonitorOutcome::Lost(e) => {
                tracing::warn!(error = %e, "lost track of child, killing it");
                escalate(&mut child, timings.grace_period).await?;
                Err(e)
            }
        };

        drain(forwarders, timings.drain_limit).await;
        outcome
    }
}

async fn escalate(child: &mut ChildProcess, grace: Duration) -> Result<(), ProcessError> {
    let termination = child.terminate_then_kill(grace).await?;
    let exit_code = exit_code_of(termination.status());
    match termination {
        Termination::Killed(_) => {
            tracing::info!(pid = ?child.pid(), exit_code, "child ignored SIGTERM and was killed");
        }
        Termination::Terminated(_) | Termination::AlreadyExited(_) => {
            tracing::debug!(pid = ?child.pid(), state = ?child.state(), exit_code, "child stopped");
        }
    }
    Ok(())
}

/// Let both forwarders run to end-of-stream.
///
/// A grandchild holding a pipe open would otherwise keep a forwarder alive
/// indefinitely, so each one is aborted only after `limit` passes with no
/// new bytes read and no write in flight.
async fn drain(forwarders: [(JoinHandle<ForwardReport>, ForwardProgress); 2], limit: Duration) {
    let [(out, out_progress), (err, err_progress)] = forwarders;
    tokio::join!(
        drain_one(out, out_progress, limit),
        drain_one(err, err_progress, limit)
    );
}

async fn drain_one(
    mut handle: JoinHandle<ForwardReport>,
    progress: ForwardProgress,
    limit: Duration,
) {
    loop {
        let seen = progress.bytes_read();
        match tokio::time::timeout(limit, &mut handle).await {
            Ok(Ok(report)) => {
                tracing::debug!(
                    stream = %report.stream,
                    bytes = report.bytes,
                    end = ?report.end,
                    "forwarder drained"
                );
                return;
            }
            Ok(Err(e)) => {
                tracing::debug!(error = %e, "forwarder task failed");
                return;
            }
            Err(_) if progress.is_writing() || progress.bytes_read() != seen => continue,
            Err(_) => {
                tracing::debug!(
                    limit_ms = limit.as_millis() as u64,
                    bytes_read = seen,
                    "pipe still open with no output, abandoning forwarder"
                );
                handle.abort();
                return;
            }
        }
    }
}
