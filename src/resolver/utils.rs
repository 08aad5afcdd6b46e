// Helper functions shared by resolver implementations

use std::process::Stdio;
use std::time::Duration;

use tokio::io::AsyncReadExt;
use tokio::process::Command as TokioCommand;
use tokio::time::timeout;

use super::errors::ResolveError;

pub const BROWSER_USER_AGENT: &str = "Mozilla/5.0 (Windows NT 10.0; Win64; x64) AppleWebKit/537.36 (KHTML, like Gecko) Chrome/120.0.0.0 Safari/537.36";

/// Headers sent with every spoofed request, user agent first
pub fn browser_headers() -> Vec<(String, String)> {
    vec![
        ("User-Agent".to_string(), BROWSER_USER_AGENT.to_string()),
        ("Accept-Language".to_string(), "en-US,en;q=0.9".to_string()),
        ("Sec-Fetch-Mode".to_string(), "navigate".to_string()),
    ]
}

/// Build the shared HTTP client, optionally routed through a proxy.
pub fn build_http_client(
    proxy: Option<&str>,
    request_timeout: Duration,
) -> Result<reqwest::Client, ResolveError> {
    let mut builder = reqwest::Client::builder()
        .user_agent(BROWSER_USER_AGENT)
        .connect_timeout(Duration::from_secs(10))
        .redirect(reqwest::redirect::Policy::limited(10));

    // Streaming bodies must not be cut off by a whole-request timeout, so the
    // read timeout only bounds gaps between chunks.
    builder = builder.read_timeout(request_timeout);

    if let Some(proxy_url) = proxy {
        let proxy = reqwest::Proxy::all(proxy_url)
            .map_err(|e| ResolveError::Upstream(format!("Invalid proxy URL {}: {}", proxy_url, e)))?;
        builder = builder.proxy(proxy);
    }

    builder
        .build()
        .map_err(|e| ResolveError::Upstream(format!("Failed to build HTTP client: {}", e)))
}

/// Map a non-success HTTP status onto the failure taxonomy.
pub fn error_for_status(status: u16, context: impl Into<String>) -> ResolveError {
    let message = format!("HTTP {}: {}", status, context.into());
    match status {
        404 | 410 => ResolveError::NotFound(message),
        429 => ResolveError::RateLimited(message),
        401 => ResolveError::AuthRequired(message),
        451 => ResolveError::Restricted(message),
        _ => ResolveError::Upstream(message),
    }
}

/// Statuses a player endpoint or media host answers with when it refuses
/// this client rather than the content.
pub fn is_blocking_status(status: u16) -> bool {
    matches!(status, 410 | 429)
}

/// Mime type for a container extension; unknown extensions default to mp4 audio.
pub fn mime_for_extension(ext: &str) -> &'static str {
    match ext.to_lowercase().as_str() {
        "mp3" => "audio/mpeg",
        "m4a" | "mp4" => "audio/mp4",
        "opus" => "audio/opus",
        "ogg" => "audio/ogg",
        "webm" | "weba" => "audio/webm",
        "aac" => "audio/aac",
        "flac" => "audio/flac",
        _ => "audio/mp4",
    }
}

/// Container extension for a mime type such as `audio/webm; codecs="opus"`.
pub fn extension_for_mime(mime: &str) -> String {
    let essence = mime.split(';').next().unwrap_or("").trim().to_lowercase();
    match essence.as_str() {
        "audio/mp4" => "m4a".to_string(),
        "audio/mpeg" => "mp3".to_string(),
        other => other
            .split_once('/')
            .map(|(_, subtype)| subtype.to_string())
            .unwrap_or_default(),
    }
}

/// Parse a number that relays sometimes encode as a JSON string.
pub fn json_u64(value: &serde_json::Value) -> Option<u64> {
    match value {
        serde_json::Value::Number(n) => n
            .as_u64()
            .or_else(|| n.as_f64().filter(|f| *f >= 0.0).map(|f| f as u64)),
        serde_json::Value::String(s) => s.trim().parse().ok(),
        _ => None,
    }
}

/// Run command with timeout, capturing stdout and stderr
pub async fn run_output_with_timeout(
    program: &str,
    args: &[String],
    limit: Duration,
) -> Result<std::process::Output, String> {
    let mut child = TokioCommand::new(program)
        .args(args)
        .stdin(Stdio::null())
        .stdout(Stdio::piped())
        .stderr(Stdio::piped())
        .kill_on_drop(true)
        .spawn()
        .map_err(|e| format!("Failed to start {}: {}", program, e))?;

    let mut stdout_pipe = child
        .stdout
        .take()
        .ok_or_else(|| format!("Failed to capture stdout from {}", program))?;
    let mut stderr_pipe = child
        .stderr
        .take()
        .ok_or_else(|| format!("Failed to capture stderr from {}", program))?;

    let stdout_task = tokio::spawn(async move {
        let mut buf = Vec::new();
        stdout_pipe
            .read_to_end(&mut buf)
            .await
            .map_err(|e| format!("Failed to read stdout: {}", e))?;
        Ok::<Vec<u8>, String>(buf)
    });
    let stderr_task = tokio::spawn(async move {
        let mut buf = Vec::new();
        stderr_pipe
            .read_to_end(&mut buf)
            .await
            .map_err(|e| format!("Failed to read stderr: {}", e))?;
        Ok::<Vec<u8>, String>(buf)
    });

    let waited = timeout(limit, child.wait()).await;
    match waited {
        Ok(status_res) => {
            let status = status_res.map_err(|e| format!("Failed to wait for {}: {}", program, e))?;
            let stdout = stdout_task
                .await
                .map_err(|e| format!("stdout task failed: {}", e))??;
            let stderr = stderr_task
                .await
                .map_err(|e| format!("stderr task failed: {}", e))??;
            Ok(std::process::Output {
                status,
                stdout,
                stderr,
            })
        }
        Err(_) => {
            let _ = child.kill().await;
            stdout_task.abort();
            stderr_task.abort();
            Err(format!("Timed out after {:.1}s", limit.as_secs_f64()))
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_status_mapping() {
        assert!(matches!(error_for_status(410, "gone"), ResolveError::NotFound(_)));
        assert!(matches!(error_for_status(404, "x"), ResolveError::NotFound(_)));
        assert!(matches!(error_for_status(429, "x"), ResolveError::RateLimited(_)));
        assert!(matches!(error_for_status(502, "x"), ResolveError::Upstream(_)));
    }

    #[test]
    fn test_blocking_statuses() {
        assert!(is_blocking_status(410));
        assert!(is_blocking_status(429));
        assert!(!is_blocking_status(404));
        assert!(!is_blocking_status(403));
    }

    #[test]
    fn test_mime_for_extension() {
        assert_eq!(mime_for_extension("mp3"), "audio/mpeg");
        assert_eq!(mime_for_extension("WEBM"), "audio/webm");
        assert_eq!(mime_for_extension(""), "audio/mp4");
    }

    #[test]
    fn test_extension_for_mime() {
        assert_eq!(extension_for_mime("audio/webm; codecs=\"opus\""), "webm");
        assert_eq!(extension_for_mime("audio/mp4; codecs=\"mp4a.40.2\""), "m4a");
        assert_eq!(extension_for_mime("video/mp4"), "mp4");
        assert_eq!(extension_for_mime(""), "");
    }

    #[test]
    fn test_json_u64_accepts_strings() {
        assert_eq!(json_u64(&json!("160000")), Some(160_000));
        assert_eq!(json_u64(&json!(128000)), Some(128_000));
        assert_eq!(json_u64(&json!(129.5)), Some(129));
        assert_eq!(json_u64(&json!(null)), None);
        assert_eq!(json_u64(&json!("n/a")), None);
    }

    #[cfg(unix)]
    #[tokio::test]
    async fn test_run_output_with_timeout_kills_slow_process() {
        let result = run_output_with_timeout("sleep", &["5".to_string()], Duration::from_secs(1)).await;
        assert_eq!(result.unwrap_err(), "Timed out after 1.0s");
    }

    #[cfg(unix)]
    #[tokio::test]
    async fn test_run_output_captures_stdout() {
        let out = run_output_with_timeout("echo", &["hello".to_string()], Duration::from_secs(5))
            .await
            .unwrap();
        assert!(out.status.success());
        assert_eq!(String::from_utf8_lossy(&out.stdout).trim(), "hello");
    }
}
