// Subprocess-backed live source
//
// The extractor writes the media to stdout. The source is only handed out
// once the first chunk has arrived, so a process that dies before producing
// anything is reported as an ordinary resolver failure instead of an empty
// 200 response.

use std::io;
use std::path::Path;
use std::process::{ExitStatus, Stdio};
use std::time::Duration;

use bytes::Bytes;
use futures::{stream, StreamExt};
use tokio::io::{AsyncRead, AsyncReadExt};
use tokio::process::{Child, Command};
use tokio::sync::oneshot;
use tokio::task::JoinHandle;
use tokio::time::timeout;
use tokio_util::io::ReaderStream;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

use super::handle::StreamHandle;
use crate::resolver::errors::ResolveError;

/// Stderr kept for diagnostics; the rest is drained and discarded.
const STDERR_LIMIT: usize = 64 * 1024;

/// Spawn `program` and expose its stdout as a [`StreamHandle`].
///
/// Waits at most `first_chunk_timeout` for output. Cancelling the handle
/// (dropping it) kills the process.
pub async fn spawn_stdout_stream(
    program: &Path,
    args: &[String],
    first_chunk_timeout: Duration,
    label: &str,
) -> Result<StreamHandle, ResolveError> {
    let mut child = Command::new(program)
        .args(args)
        .stdin(Stdio::null())
        .stdout(Stdio::piped())
        .stderr(Stdio::piped())
        .kill_on_drop(true)
        .spawn()
        .map_err(|e| ResolveError::Upstream(format!("Failed to start {}: {}", program.display(), e)))?;

    let pid = child.id();
    let stdout = child
        .stdout
        .take()
        .ok_or_else(|| ResolveError::Upstream("Failed to capture extractor stdout".to_string()))?;
    let stderr = child
        .stderr
        .take()
        .ok_or_else(|| ResolveError::Upstream("Failed to capture extractor stderr".to_string()))?;

    let stderr_task = tokio::spawn(collect_stderr(stderr));
    let mut reader = ReaderStream::new(stdout);

    let first = match timeout(first_chunk_timeout, reader.next()).await {
        Ok(Some(Ok(chunk))) => chunk,
        Ok(Some(Err(e))) => {
            let _ = child.kill().await;
            return Err(ResolveError::Upstream(format!("Failed to read extractor output: {}", e)));
        }
        Ok(None) => {
            let status = child
                .wait()
                .await
                .map_err(|e| ResolveError::Upstream(format!("Failed to wait for extractor: {}", e)))?;
            let stderr = stderr_task.await.unwrap_or_default();
            return Err(classify_exit(status, &stderr));
        }
        Err(_) => {
            let _ = child.kill().await;
            stderr_task.abort();
            return Err(ResolveError::Upstream(format!(
                "Extractor produced no output within {}s",
                first_chunk_timeout.as_secs()
            )));
        }
    };

    debug!(source = label, ?pid, "extractor started streaming");

    let cancel = CancellationToken::new();
    let (exit_tx, exit_rx) = oneshot::channel();
    tokio::spawn(supervise(child, cancel.clone(), exit_tx, label.to_string()));

    let tail = stream::once(exit_check(exit_rx, stderr_task)).filter_map(|r| async move { r });
    let body = stream::once(async move { Ok::<Bytes, io::Error>(first) })
        .chain(reader)
        .chain(tail);

    Ok(StreamHandle::new(body, cancel, label))
}

/// Owns the child: kills it on cancellation, otherwise reports its exit.
async fn supervise(
    mut child: Child,
    cancel: CancellationToken,
    exit_tx: oneshot::Sender<io::Result<ExitStatus>>,
    label: String,
) {
    let pid = child.id();
    tokio::select! {
        _ = cancel.cancelled() => {
            if let Err(e) = child.start_kill() {
                debug!(source = %label, ?pid, error = %e, "extractor already gone");
            }
            let _ = child.wait().await;
            info!(source = %label, ?pid, "extractor terminated");
        }
        status = child.wait() => {
            let _ = exit_tx.send(status);
        }
    }
}

/// Yields an error item when the extractor exited unsuccessfully, so the
/// connection is torn down rather than finished cleanly.
async fn exit_check(
    exit_rx: oneshot::Receiver<io::Result<ExitStatus>>,
    stderr_task: JoinHandle<String>,
) -> Option<io::Result<Bytes>> {
    match exit_rx.await {
        Ok(Ok(status)) if status.success() => None,
        Ok(Ok(status)) => {
            let stderr = stderr_task.await.unwrap_or_default();
            warn!(%status, "extractor failed mid-stream");
            Some(Err(io::Error::other(format!(
                "extractor exited with {}: {}",
                status,
                last_line(&stderr)
            ))))
        }
        Ok(Err(e)) => Some(Err(e)),
        // Supervisor was cancelled; nobody is reading anymore
        Err(_) => None,
    }
}

async fn collect_stderr<R: AsyncRead + Unpin>(mut pipe: R) -> String {
    let mut kept = Vec::new();
    let mut buf = [0u8; 4096];
    loop {
        match pipe.read(&mut buf).await {
            Ok(0) | Err(_) => break,
            Ok(n) => {
                let room = STDERR_LIMIT.saturating_sub(kept.len());
                kept.extend_from_slice(&buf[..n.min(room)]);
            }
        }
    }
    String::from_utf8_lossy(&kept).into_owned()
}

fn classify_exit(status: ExitStatus, stderr: &str) -> ResolveError {
    let stderr = stderr.trim();
    if stderr.is_empty() {
        return ResolveError::Upstream(format!("extractor exited with {} and no output", status));
    }
    ResolveError::from(stderr.to_string())
}

fn last_line(text: &str) -> &str {
    text.lines()
        .rev()
        .find(|l| !l.trim().is_empty())
        .unwrap_or("")
}
