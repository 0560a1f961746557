// SPDX-License-Identifier: MIT OR Apache-2.0
//! Standard stream bindings and the copy loops that service them.

use std::fmt;
use std::io;
use std::pin::Pin;
use std::sync::{Arc, Mutex as StdMutex, MutexGuard};
use std::task::{Context, Poll};
use tokio::io::{AsyncRead, AsyncReadExt, AsyncWrite, AsyncWriteExt};
use tokio::sync::Mutex;

const COPY_BUF: usize = 8 * 1024;

/// Reader bound to a child's stdin.
///
/// Clones share the reader; bytes consumed by one launch are gone for the next.
#[derive(Clone)]
pub struct InputSource(Arc<Mutex<dyn AsyncRead + Send + Unpin>>);

impl InputSource {
    /// Wrap any async reader.
    pub fn new<R: AsyncRead + Send + Unpin + 'static>(reader: R) -> Self {
        Self(Arc::new(Mutex::new(reader)))
    }

    /// Reader over an in-memory byte slice.
    pub fn from_bytes(bytes: impl Into<Vec<u8>>) -> Self {
        Self::new(io::Cursor::new(bytes.into()))
    }

    pub(crate) async fn copy_into<W: AsyncWrite + Unpin>(&self, dst: &mut W) -> io::Result<u64> {
        let mut src = self.0.lock().await;
        tokio::io::copy(&mut *src, dst).await
    }
}

impl fmt::Debug for InputSource {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str("InputSource(..)")
    }
}

/// Writer bound to a child's stdout or stderr.
///
/// Clones share the writer, so one sink may be bound to several streams.
#[derive(Clone)]
pub struct OutputSink(Arc<Mutex<dyn AsyncWrite + Send + Unpin>>);

impl OutputSink {
    /// Wrap any async writer.
    pub fn new<W: AsyncWrite + Send + Unpin + 'static>(writer: W) -> Self {
        Self(Arc::new(Mutex::new(writer)))
    }

    /// Returns `true` if both sinks share the same writer.
    pub fn same_sink(&self, other: &OutputSink) -> bool {
        Arc::ptr_eq(&self.0, &other.0)
    }

    async fn write_all(&self, chunk: &[u8]) -> io::Result<()> {
        self.0.lock().await.write_all(chunk).await
    }

    async fn flush(&self) -> io::Result<()> {
        self.0.lock().await.flush().await
    }
}

impl From<CaptureBuffer> for OutputSink {
    fn from(buf: CaptureBuffer) -> Self {
        Self::new(buf)
    }
}

impl fmt::Debug for OutputSink {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str("OutputSink(..)")
    }
}

/// Shared, growable in-memory byte buffer.
///
/// Every clone appends to the same storage, so binding one buffer to stdout
/// and stderr keeps the two streams interleaved in arrival order.
#[derive(Clone, Default)]
pub struct CaptureBuffer(Arc<StdMutex<Vec<u8>>>);

impl CaptureBuffer {
    /// Create an empty buffer.
    pub fn new() -> Self {
        Self::default()
    }

    /// Copy of the bytes captured so far.
    pub fn contents(&self) -> Vec<u8> {
        self.lock().clone()
    }

    /// Captured bytes decoded lossily as UTF-8.
    pub fn contents_lossy(&self) -> String {
        String::from_utf8_lossy(&self.lock()).into_owned()
    }

    /// Take the captured bytes, leaving the buffer empty.
    pub fn take(&self) -> Vec<u8> {
        std::mem::take(&mut *self.lock())
    }

    /// Number of bytes captured so far.
    pub fn len(&self) -> usize {
        self.lock().len()
    }

    /// Returns `true` when nothing has been captured.
    pub fn is_empty(&self) -> bool {
        self.lock().is_empty()
    }

    fn lock(&self) -> MutexGuard<'_, Vec<u8>> {
        // A poisoned buffer still holds valid bytes.
        self.0.lock().unwrap_or_else(|e| e.into_inner())
    }
}

impl fmt::Debug for CaptureBuffer {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("CaptureBuffer")
            .field("len", &self.len())
            .finish()
    }
}

impl AsyncWrite for CaptureBuffer {
    fn poll_write(
        self: Pin<&mut Self>,
        _cx: &mut Context<'_>,
        buf: &[u8],
    ) -> Poll<io::Result<usize>> {
        self.lock().extend_from_slice(buf);
        Poll::Ready(Ok(buf.len()))
    }

    fn poll_flush(self: Pin<&mut Self>, _cx: &mut Context<'_>) -> Poll<io::Result<()>> {
        Poll::Ready(Ok(()))
    }

    fn poll_shutdown(self: Pin<&mut Self>, _cx: &mut Context<'_>) -> Poll<io::Result<()>> {
        Poll::Ready(Ok(()))
    }
}

/// Anonymous pipe whose write end can back both stdout and stderr.
#[cfg(target_os = "linux")]
pub(crate) fn merged_pipe() -> io::Result<(tokio::net::unix::pipe::Receiver, std::os::fd::OwnedFd)> {
    let (read, write) = nix::unistd::pipe2(nix::fcntl::OFlag::O_CLOEXEC)?;
    let read = tokio::net::unix::pipe::Receiver::from_owned_fd(read)?;
    Ok((read, write))
}

/// Copy a child pipe into every sink, in binding order.
///
/// After the first sink error the pipe is still drained so the child never
/// blocks on a full pipe; the first error is returned at EOF.
pub(crate) async fn fan_out<R: AsyncRead + Unpin>(
    mut pipe: R,
    sinks: Vec<OutputSink>,
) -> io::Result<()> {
    let mut buf = vec![0u8; COPY_BUF];
    let mut failed: Option<io::Error> = None;
    loop {
        let n = pipe.read(&mut buf).await?;
        if n == 0 {
            break;
        }
        if failed.is_some() {
            continue;
        }
        for sink in &sinks {
            if let Err(e) = sink.write_all(&buf[..n]).await {
                failed = Some(e);
                break;
            }
        }
    }
    if let Some(e) = failed {
        return Err(e);
    }
    for sink in &sinks {
        sink.flush().await?;
    }
    Ok(())
}
