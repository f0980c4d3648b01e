/// Activity clock: the time of the most recent output byte seen from the child.
///
/// Shared by both forwarders (writers) and the idle monitor (reader). The
/// timestamp is stored as nanoseconds since the clock's origin in a single
/// atomic, and only ever moves forward.
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::{Duration, Instant};

/// Cloneable handle to a shared activity timestamp.
#[derive(Debug, Clone)]
pub struct ActivityClock {
    inner: Arc<Inner>,
}

#[derive(Debug)]
struct Inner {
    origin: Instant,
    last_nanos: AtomicU64,
}

impl ActivityClock {
    /// Create a clock whose last activity is "now" (spawn time).
    pub fn new() -> Self {
        Self::starting_at(Instant::now())
    }

    /// Create a clock whose last activity is `origin`.
    pub fn starting_at(origin: Instant) -> Self {
        Self {
            inner: Arc::new(Inner {
                origin,
                last_nanos: AtomicU64::new(0),
            }),
        }
    }

    /// Record activity at the current instant.
    pub fn touch(&self) {
        self.record(Instant::now());
    }

    /// Record activity at `at`. Instants older than the current value are ignored.
    pub fn record(&self, at: Instant) {
        let nanos = at.saturating_duration_since(self.inner.origin).as_nanos();
        let nanos = u64::try_from(nanos).unwrap_or(u64::MAX);
        self.inner.last_nanos.fetch_max(nanos, Ordering::AcqRel);
    }

    /// Instant of the most recent recorded activity.
    pub fn last_activity(&self) -> Instant {
        let nanos = self.inner.last_nanos.load(Ordering::Acquire);
        self.inner.origin + Duration::from_nanos(nanos)
    }

    /// How long the child has been quiet as of `now`.
    pub fn idle_for(&self, now: Instant) -> Duration {
        now.saturating_duration_since(self.last_activity())
    }
}

impl Default for ActivityClock {
    fn default() -> Self {
        Self::new()
    }
}
