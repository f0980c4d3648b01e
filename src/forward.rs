/// Stream forwarding: copy one child output stream to the matching parent stream.
///
/// Every chunk is written and flushed before the next read, and every
/// non-empty read touches the activity clock before the bytes go downstream.
/// I/O failures end the forwarder quietly; they are reported, never raised.
use crate::clock::ActivityClock;
use std::io::ErrorKind;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::Arc;
use tokio::io::{AsyncRead, AsyncReadExt, AsyncWrite, AsyncWriteExt};

const CHUNK_SIZE: usize = 8 * 1024;

/// Which child stream a forwarder is attached to.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Stream {
    Stdout,
    Stderr,
}

impl Stream {
    pub fn as_str(&self) -> &'static str {
        match self {
            Stream::Stdout => "stdout",
            Stream::Stderr => "stderr",
        }
    }
}

impl std::fmt::Display for Stream {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// How a forwarder stopped.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ForwardEnd {
    /// The child closed the stream.
    Eof,
    /// Reading from the child failed.
    ReadError(ErrorKind),
    /// Writing or flushing to the parent failed.
    WriteError(ErrorKind),
}

/// Summary of a finished forwarder.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ForwardReport {
    pub stream: Stream,
    /// Bytes successfully written downstream.
    pub bytes: u64,
    pub end: ForwardEnd,
}

/// Live view of a running forwarder, observable from outside its task.
///
/// Lets the supervisor tell a forwarder that is stuck writing to a slow
/// parent (still owed bytes) from one parked on a pipe nobody writes to.
#[derive(Debug, Clone, Default)]
pub struct ForwardProgress {
    inner: Arc<ProgressInner>,
}

#[derive(Debug, Default)]
struct ProgressInner {
    bytes_read: AtomicU64,
    writing: AtomicBool,
}

impl ForwardProgress {
    pub fn new() -> Self {
        Self::default()
    }

    /// Total bytes read from the child so far.
    pub fn bytes_read(&self) -> u64 {
        self.inner.bytes_read.load(Ordering::Acquire)
    }

    /// Whether a chunk is currently being written downstream.
    pub fn is_writing(&self) -> bool {
        self.inner.writing.load(Ordering::Acquire)
    }

    fn record_read(&self, n: usize) {
        self.inner.bytes_read.fetch_add(n as u64, Ordering::AcqRel);
    }

    fn set_writing(&self, writing: bool) {
        self.inner.writing.store(writing, Ordering::Release);
    }
}

/// Copy `source` to `sink` until end-of-stream or an I/O error.
pub async fn forward<R, W>(
    mut source: R,
    mut sink: W,
    clock: ActivityClock,
    progress: ForwardProgress,
    stream: Stream,
) -> ForwardReport
where
    R: AsyncRead + Unpin,
    W: AsyncWrite + Unpin,
{
    let mut buf = vec![0u8; CHUNK_SIZE];
    let mut bytes = 0u64;

    let end = loop {
        let n = match source.read(&mut buf).await {
            Ok(0) => break ForwardEnd::Eof,
            Ok(n) => n,
            Err(e) if is_transient(e.kind()) => continue,
            Err(e) => break ForwardEnd::ReadError(e.kind()),
        };

        clock.touch();
        progress.set_writing(true);
        progress.record_read(n);

        let written = write_chunk(&mut sink, &buf[..n]).await;
        progress.set_writing(false);
        if let Err(e) = written {
            break ForwardEnd::WriteError(e.kind());
        }
        bytes += n as u64;
    };

    // Whatever the outcome, push out anything the sink still holds.
    let _ = sink.flush().await;

    tracing::debug!(%stream, bytes, end = ?end, "forwarder finished");
    ForwardReport { stream, bytes, end }
}

async fn write_chunk<W: AsyncWrite + Unpin>(sink: &mut W, chunk: &[u8]) -> std::io::Result<()> {
    sink.write_all(chunk).await?;
    sink.flush().await
}

fn is_transient(kind: ErrorKind) -> bool {
    matches!(kind, ErrorKind::Interrupted | ErrorKind::WouldBlock)
}
