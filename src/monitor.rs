/// Idle monitor: periodically compares "now" against the activity clock.
///
/// Runs alongside the forwarders. If the child stays silent for longer than
/// the idle timeout, the monitor declares a breach once and stops; if the
/// child exits first, it stops without one.
use crate::clock::ActivityClock;
use crate::process::{ChildProcess, ProcessError};
use std::process::ExitStatus;
use std::time::{Duration, Instant};
use tokio::time::MissedTickBehavior;

/// Result of a single idle check.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Verdict {
    Active { idle: Duration },
    Breached { idle: Duration },
}

/// Why monitoring stopped.
#[derive(Debug)]
pub enum MonitorOutcome {
    /// The child exited on its own.
    Exited(ExitStatus),
    /// The child was idle for longer than the timeout.
    Breached { idle: Duration },
    /// The child's status could no longer be observed.
    Lost(ProcessError),
}

pub struct IdleMonitor {
    clock: ActivityClock,
    timeout: Duration,
    poll_interval: Duration,
}

impl IdleMonitor {
    pub fn new(clock: ActivityClock, timeout: Duration, poll_interval: Duration) -> Self {
        Self {
            clock,
            timeout,
            poll_interval,
        }
    }

    /// Breach iff idle time is strictly greater than the timeout.
    pub fn check(&self, now: Instant) -> Verdict {
        let idle = self.clock.idle_for(now);
        if idle > self.timeout {
            Verdict::Breached { idle }
        } else {
            Verdict::Active { idle }
        }
    }

    /// Poll until the child exits or a breach is declared.
    ///
    /// Child exit is checked before the idle verdict on every tick, so an exit
    /// that lands on the same tick as a breach is reported as an exit.
    pub async fn watch(&self, child: &mut ChildProcess) -> MonitorOutcome {
        let start = tokio::time::Instant::now() + self.poll_interval;
        let mut ticker = tokio::time::interval_at(start, self.poll_interval);
        ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);

        loop {
            tokio::select! {
                biased;

                status = child.wait() => {
                    return match status {
                        Ok(status) => MonitorOutcome::Exited(status),
                        Err(e) => MonitorOutcome::Lost(e),
                    };
                }

                _ = ticker.tick() => {
                    match child.try_wait() {
                        Ok(Some(status)) => return MonitorOutcome::Exited(status),
                        Ok(None) => {}
                        Err(e) => {
                            tracing::debug!(error = %e, "child status poll failed, still monitoring");
                            continue;
                        }
                    }

                    match self.check(Instant::now()) {
                        Verdict::Breached { idle } => {
                            tracing::debug!(
                                idle_ms = idle.as_millis() as u64,
                                timeout_ms = self.timeout.as_millis() as u64,
                                "idle timeout breached"
                            );
                            return MonitorOutcome::Breached { idle };
                        }
                        Verdict::Active { idle } => {
                            tracing::trace!(idle_ms = idle.as_millis() as u64, "idle check");
                        }
                    }
                }
            }
        }
    }
}
