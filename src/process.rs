/// Child process lifecycle: spawn, graceful terminate, forced kill, wait.
///
/// The child inherits the supervisor's stdin and stays in its process group;
/// stdout and stderr are piped so the forwarders can copy them. All
/// state-changing calls take `&mut self`, so a liveness check can never race
/// with reaping.
use nix::errno::Errno;
use nix::sys::signal::{kill, Signal};
use nix::unistd::Pid;
use std::ffi::{OsStr, OsString};
use std::os::unix::process::ExitStatusExt;
use std::process::{ExitStatus, Stdio};
use std::time::Duration;
use tokio::process::{Child, ChildStderr, ChildStdout, Command};

/// Lifecycle of the child as seen by the supervisor.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ChildState {
    Running,
    /// SIGTERM sent, waiting out the grace period.
    Terminating,
    /// SIGKILL sent.
    Killed,
    Reaped(ExitStatus),
}

/// Which escalation phase ended the child.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Termination {
    /// The child had exited before any signal was sent.
    AlreadyExited(ExitStatus),
    /// The child exited within the grace period after SIGTERM.
    Terminated(ExitStatus),
    /// The child had to be SIGKILLed.
    Killed(ExitStatus),
}

impl Termination {
    pub fn status(&self) -> ExitStatus {
        match *self {
            Termination::AlreadyExited(s) | Termination::Terminated(s) | Termination::Killed(s) => s,
        }
    }
}

/// Errors that can occur while managing the child.
#[derive(Debug)]
pub enum ProcessError {
    /// The command could not be started.
    Spawn {
        program: OsString,
        source: std::io::Error,
    },
    /// A piped stream was not available after spawn.
    MissingPipe { stream: &'static str },
    /// Waiting on the child failed.
    Wait { source: std::io::Error },
    /// Delivering a signal failed.
    Signal { signal: Signal, source: Errno },
}

impl std::fmt::Display for ProcessError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            ProcessError::Spawn { program, source } => {
                write!(f, "failed to spawn {}: {}", program.to_string_lossy(), source)
            }
            ProcessError::MissingPipe { stream } => {
                write!(f, "child {} pipe was not captured", stream)
            }
            ProcessError::Wait { source } => {
                write!(f, "failed to wait for child: {}", source)
            }
            ProcessError::Signal { signal, source } => {
                write!(f, "failed to send {} to child: {}", signal, source)
            }
        }
    }
}

impl std::error::Error for ProcessError {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        match self {
            ProcessError::Spawn { source, .. } => Some(source),
            ProcessError::MissingPipe { .. } => None,
            ProcessError::Wait { source } => Some(source),
            ProcessError::Signal { source, .. } => Some(source),
        }
    }
}

/// The child's output pipes, handed to the forwarders.
#[derive(Debug)]
pub struct ChildPipes {
    pub stdout: ChildStdout,
    pub stderr: ChildStderr,
}

/// Exclusive owner of the spawned child.
#[derive(Debug)]
pub struct ChildProcess {
    child: Child,
    pid: Option<u32>,
    state: ChildState,
}

impl ChildProcess {
    /// Launch `program` with `args`, returning the handle and its output pipes.
    pub fn spawn(
        program: &OsStr,
        args: &[OsString],
    ) -> Result<(ChildProcess, ChildPipes), ProcessError> {
        let mut child = Command::new(program)
            .args(args)
            .stdin(Stdio::inherit())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .kill_on_drop(true)
            .spawn()
            .map_err(|e| ProcessError::Spawn {
                program: program.to_os_string(),
                source: e,
            })?;

        let stdout = child
            .stdout
            .take()
            .ok_or(ProcessError::MissingPipe { stream: "stdout" })?;
        let stderr = child
            .stderr
            .take()
            .ok_or(ProcessError::MissingPipe { stream: "stderr" })?;

        let pid = child.id();
        tracing::debug!(pid = ?pid, program = %program.to_string_lossy(), "child spawned");

        Ok((
            ChildProcess {
                child,
                pid,
                state: ChildState::Running,
            },
            ChildPipes { stdout, stderr },
        ))
    }

    /// OS process id captured at spawn.
    pub fn pid(&self) -> Option<u32> {
        self.pid
    }

    pub fn state(&self) -> ChildState {
        self.state
    }

    /// Block until the child exits. Reaps once; later calls return the cached status.
    pub async fn wait(&mut self) -> Result<ExitStatus, ProcessError> {
        if let ChildState::Reaped(status) = self.state {
            return Ok(status);
        }
        let status = self
            .child
            .wait()
            .await
            .map_err(|e| ProcessError::Wait { source: e })?;
        self.state = ChildState::Reaped(status);
        Ok(status)
    }

    /// Non-blocking exit check.
    pub fn try_wait(&mut self) -> Result<Option<ExitStatus>, ProcessError> {
        if let ChildState::Reaped(status) = self.state {
            return Ok(Some(status));
        }
        let status = self
            .child
            .try_wait()
            .map_err(|e| ProcessError::Wait { source: e })?;
        if let Some(status) = status {
            self.state = ChildState::Reaped(status);
        }
        Ok(status)
    }

    /// SIGTERM, wait up to `grace`, then SIGKILL. Always ends with the child reaped.
    pub async fn terminate_then_kill(
        &mut self,
        grace: Duration,
    ) -> Result<Termination, ProcessError> {
        if let Some(status) = self.try_wait()? {
            return Ok(Termination::AlreadyExited(status));
        }

        match self.signal(Signal::SIGTERM) {
            Ok(true) => {
                self.state = ChildState::Terminating;
                tracing::debug!(pid = ?self.pid, grace_ms = grace.as_millis() as u64, "sent SIGTERM");
                if let Ok(status) = tokio::time::timeout(grace, self.wait()).await {
                    return status.map(Termination::Terminated);
                }
            }
            Ok(false) => {}
            Err(e) => {
                // Skip the grace period; SIGKILL below does not depend on the pid.
                tracing::warn!(pid = ?self.pid, error = %e, "SIGTERM failed, killing immediately");
            }
        }

        if let Some(status) = self.try_wait()? {
            return Ok(Termination::Terminated(status));
        }

        tracing::debug!(pid = ?self.pid, "grace period elapsed, sending SIGKILL");
        self.state = ChildState::Killed;
        if let Err(e) = self.child.start_kill() {
            // Raced with exit; the wait below picks up the status.
            tracing::debug!(error = %e, "SIGKILL not delivered");
        }
        let status = self.wait().await?;
        Ok(Termination::Killed(status))
    }

    /// Send `signal` to the child. Returns `false` if the process is already gone.
    fn signal(&self, signal: Signal) -> Result<bool, ProcessError> {
        let Some(pid) = self.pid else {
            return Ok(false);
        };
        let pid = i32::try_from(pid).map_err(|_| ProcessError::Signal {
            signal,
            source: Errno::EINVAL,
        })?;
        match kill(Pid::from_raw(pid), signal) {
            Ok(()) => Ok(true),
            Err(Errno::ESRCH) => Ok(false),
            Err(e) => Err(ProcessError::Signal { signal, source: e }),
        }
    }
}

/// Map an exit status to a shell-style exit code: the child's code, or
/// `128 + signal` when it was killed by a signal.
pub fn exit_code_of(status: ExitStatus) -> i32 {
    match (status.code(), status.signal()) {
        (Some(code), _) => code,
        (None, Some(signal)) => 128 + signal,
        (None, None) => 1,
    }
}
