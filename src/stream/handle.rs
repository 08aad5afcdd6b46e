// StreamHandle - single owner of a live byte source

use std::fmt;
use std::io;
use std::pin::Pin;
use std::task::{Context, Poll};

use bytes::Bytes;
use futures::stream::BoxStream;
use futures::{Stream, StreamExt};
use tokio_util::sync::{CancellationToken, DropGuard};
use tracing::{debug, info, warn};

/// Owns a byte stream plus the cancellation token of whatever feeds it.
///
/// Dropping the handle cancels the token exactly once, whichever way the
/// response ended (completion, upstream error or client disconnect). Sources
/// register their cleanup on the token before the handle is created.
pub struct StreamHandle {
    inner: BoxStream<'static, io::Result<Bytes>>,
    label: String,
    bytes_sent: u64,
    finished: bool,
    cancel: CancellationToken,
    _guard: DropGuard,
}

impl StreamHandle {
    pub fn new<S>(stream: S, cancel: CancellationToken, label: impl Into<String>) -> Self
    where
        S: Stream<Item = io::Result<Bytes>> + Send + 'static,
    {
        Self {
            inner: stream.boxed(),
            label: label.into(),
            bytes_sent: 0,
            finished: false,
            _guard: cancel.clone().drop_guard(),
            cancel,
        }
    }

    /// Wrap a source that needs no cleanup beyond being dropped.
    pub fn from_stream<S>(stream: S, label: impl Into<String>) -> Self
    where
        S: Stream<Item = io::Result<Bytes>> + Send + 'static,
    {
        Self::new(stream, CancellationToken::new(), label)
    }

    pub fn cancellation(&self) -> CancellationToken {
        self.cancel.clone()
    }

    pub fn bytes_sent(&self) -> u64 {
        self.bytes_sent
    }

    pub fn label(&self) -> &str {
        &self.label
    }
}

impl Stream for StreamHandle {
    type Item = io::Result<Bytes>;

    fn poll_next(mut self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<Option<Self::Item>> {
        if self.finished {
            return Poll::Ready(None);
        }

        let polled = self.inner.poll_next_unpin(cx);
        match &polled {
            Poll::Ready(Some(Ok(chunk))) => self.bytes_sent += chunk.len() as u64,
            Poll::Ready(Some(Err(e))) => {
                warn!(source = %self.label, bytes = self.bytes_sent, error = %e, "stream aborted mid-body");
                self.finished = true;
            }
            Poll::Ready(None) => {
                debug!(source = %self.label, bytes = self.bytes_sent, "stream completed");
                self.finished = true;
            }
            Poll::Pending => {}
        }
        polled
    }
}

impl Drop for StreamHandle {
    fn drop(&mut self) {
        if !self.finished {
            info!(
                source = %self.label,
                bytes = self.bytes_sent,
                "stream closed early, releasing source"
            );
        }
    }
}

impl fmt::Debug for StreamHandle {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("StreamHandle")
            .field("label", &self.label)
            .field("bytes_sent", &self.bytes_sent)
            .field("finished", &self.finished)
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use futures::stream;

    #[tokio::test]
    async fn test_counts_bytes_and_cancels_on_drop() {
        let chunks = vec![Ok(Bytes::from_static(b"abc")), Ok(Bytes::from_static(b"de"))];
        let mut handle = StreamHandle::from_stream(stream::iter(chunks), "test");
        let token = handle.cancellation();

        assert_eq!(handle.next().await.unwrap().unwrap(), Bytes::from_static(b"abc"));
        assert_eq!(handle.bytes_sent(), 3);
        assert!(!token.is_cancelled());

        drop(handle);
        assert!(token.is_cancelled());
    }

    #[tokio::test]
    async fn test_error_ends_stream() {
        let chunks = vec![
            Ok(Bytes::from_static(b"abc")),
            Err(io::Error::other("boom")),
            Ok(Bytes::from_static(b"never")),
        ];
        let mut handle = StreamHandle::from_stream(stream::iter(chunks), "test");
        assert!(handle.next().await.unwrap().is_ok());
        assert!(handle.next().await.unwrap().is_err());
        assert!(handle.next().await.is_none());
    }
}
