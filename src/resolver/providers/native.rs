// Native resolver - uses a locally installed `yt-dlp` binary
//
// Metadata mode runs `--dump-json` and picks the best audio format.
// Streaming mode has the binary write that format to stdout, which is piped
// straight to the client without touching disk.

use std::path::Path;
use std::time::Duration;

use async_trait::async_trait;
use tokio::time::Instant;
use tracing::{debug, warn};

use crate::resolver::errors::ResolveError;
use crate::resolver::format_selector::FormatSelector;
use crate::resolver::models::{
    AudioMetadata, CodecKind, ContentId, MediaFormat, ResolvedAudio, ResolverId,
};
use crate::resolver::policy::{CookieSource, ResolverConfig};
use crate::resolver::traits::{ProviderResolver, ResolutionOutcome};
use crate::resolver::utils::run_output_with_timeout;
use crate::stream::{spawn_stdout_stream, StreamHandle};

const ALTERNATE_PLAYER_CLIENT: &str = "android";

pub struct NativeExtractorResolver;

/// Result of a successful `--dump-json` run.
struct Probe {
    metadata: AudioMetadata,
    format: MediaFormat,
    used_embed: bool,
}

impl NativeExtractorResolver {
    pub fn new() -> Self {
        Self
    }

    fn target_url(id: &ContentId, use_embed: bool) -> String {
        if use_embed {
            id.embed_url()
        } else {
            id.watch_url()
        }
    }

    /// Arguments shared by both modes, without the target URL.
    fn build_args(config: &ResolverConfig) -> Vec<String> {
        let mut args = vec![
            "--no-playlist".to_string(),
            "--no-warnings".to_string(),
            "--no-check-certificates".to_string(),
        ];

        for (name, value) in &config.headers {
            if name.eq_ignore_ascii_case("user-agent") {
                args.push("--user-agent".to_string());
                args.push(value.clone());
            } else {
                args.push("--add-header".to_string());
                args.push(format!("{}:{}", name, value));
            }
        }

        if config.alternate_persona {
            args.push("--extractor-args".to_string());
            args.push(format!("youtube:player_client={}", ALTERNATE_PLAYER_CLIENT));
        }

        match &config.cookie_source {
            Some(CookieSource::File(path)) => {
                args.push("--cookies".to_string());
                args.push(path.display().to_string());
            }
            Some(CookieSource::Browser(browser)) => {
                args.push("--cookies-from-browser".to_string());
                args.push(browser.clone());
            }
            None => {}
        }

        if let Some(proxy) = &config.proxy {
            args.push("--proxy".to_string());
            args.push(proxy.clone());
        }

        args
    }

    /// Time for the next subprocess step: the step timeout, cut short by the
    /// deadline of the whole attempt.
    fn step_limit(config: &ResolverConfig, deadline: Instant) -> Result<Duration, ResolveError> {
        let left = deadline.saturating_duration_since(Instant::now());
        if left.is_zero() {
            return Err(ResolveError::Upstream(format!(
                "extractor attempt ran out of time ({}s step timeout)",
                config.timeout.as_secs()
            )));
        }
        Ok(left.min(config.timeout))
    }

    /// Run `--dump-json`, retrying once with the embed URL on a non-zero exit.
    async fn probe(
        &self,
        tool: &Path,
        id: &ContentId,
        config: &ResolverConfig,
        deadline: Instant,
    ) -> Result<Probe, ResolveError> {
        let program = tool.display().to_string();
        let mut use_embed = config.use_embed_url;

        loop {
            let mut args = Self::build_args(config);
            args.push("--dump-json".to_string());
            args.push("--skip-download".to_string());
            args.push(Self::target_url(id, use_embed));
            debug!(tool = %program, args = %args.join(" "), "running extractor");

            let limit = Self::step_limit(config, deadline)?;
            let output = run_output_with_timeout(&program, &args, limit)
                .await
                .map_err(ResolveError::Upstream)?;

            if output.status.success() {
                let (metadata, format) = Self::parse_json(&output.stdout)?;
                return Ok(Probe {
                    metadata,
                    format,
                    used_embed: use_embed,
                });
            }

            let stderr = String::from_utf8_lossy(&output.stderr).trim().to_string();
            if !use_embed {
                warn!(content_id = %id, status = %output.status, "extractor failed, retrying with embed URL");
                use_embed = true;
                continue;
            }

            return Err(if stderr.is_empty() {
                ResolveError::Upstream(format!("extractor exited with {}", output.status))
            } else {
                ResolveError::from(stderr)
            });
        }
    }

    /// Start `-o -` for `selector` and wait for its first bytes.
    async fn stream_from(
        &self,
        tool: &Path,
        id: &ContentId,
        config: &ResolverConfig,
        selector: &str,
        use_embed: bool,
        deadline: Instant,
    ) -> Result<StreamHandle, ResolveError> {
        let mut args = Self::build_args(config);
        args.extend(
            ["-f", selector, "--no-part", "--no-progress", "--quiet", "-o", "-"]
                .iter()
                .map(|s| s.to_string()),
        );
        args.push(Self::target_url(id, use_embed));
        debug!(tool = %tool.display(), args = %args.join(" "), "starting extractor stream");

        let limit = Self::step_limit(config, deadline)?;
        spawn_stdout_stream(tool, &args, limit, self.name()).await
    }

    fn parse_json(stdout: &[u8]) -> Result<(AudioMetadata, MediaFormat), ResolveError> {
        let json: serde_json::Value = serde_json::from_slice(stdout)?;
        if !json.is_object() {
            return Err(ResolveError::Parse("extractor output is not an object".to_string()));
        }

        let formats = Self::parse_formats(&json);
        let format = FormatSelector::best_playable_audio(&formats)?;

        let author = json["uploader"]
            .as_str()
            .or_else(|| json["channel"].as_str())
            .unwrap_or("Unknown");
        let metadata = AudioMetadata::new(json["title"].as_str().unwrap_or("Unknown"), author)
            .with_duration(json["duration"].as_f64().unwrap_or(0.0) as u64)
            .with_format(&format);

        Ok((metadata, format))
    }

    fn parse_formats(json: &serde_json::Value) -> Vec<MediaFormat> {
        let Some(list) = json["formats"].as_array() else {
            // Single-format extractions put the URL at the top level
            if json["url"].is_string() {
                return vec![Self::parse_format(json)];
            }
            return Vec::new();
        };

        list.iter().map(Self::parse_format).collect()
    }

    fn parse_format(f: &serde_json::Value) -> MediaFormat {
        // abr/tbr are kbit/s
        let kbps = f["abr"].as_f64().or_else(|| f["tbr"].as_f64());
        MediaFormat::new(
            f["url"].as_str().unwrap_or(""),
            CodecKind::from_codecs(f["vcodec"].as_str(), f["acodec"].as_str()),
        )
        .with_bitrate(kbps.map(|k| (k * 1000.0) as u64))
        .with_file_size(f["filesize"].as_u64())
        .with_extension(f["ext"].as_str().unwrap_or(""))
        .with_format_id(f["format_id"].as_str().map(str::to_string))
    }
}

impl Default for NativeExtractorResolver {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl ProviderResolver for NativeExtractorResolver {
    fn id(&self) -> ResolverId {
        ResolverId::Native
    }

    fn name(&self) -> &'static str {
        "yt-dlp"
    }

    async fn resolve_metadata(&self, id: &ContentId, config: &ResolverConfig) -> ResolutionOutcome {
        let Some(tool) = &config.tool_path else {
            return ResolutionOutcome::Failure(ResolveError::Upstream(
                "yt-dlp executable not found".to_string(),
            ));
        };

        let deadline = Instant::now() + config.metadata_budget();
        self.probe(tool, id, config, deadline)
            .await
            .map(|probe| ResolvedAudio::from_url(probe.metadata, probe.format.url))
            .into()
    }

    async fn produce_stream(&self, id: &ContentId, config: &ResolverConfig) -> ResolutionOutcome {
        let Some(tool) = &config.tool_path else {
            return ResolutionOutcome::Failure(ResolveError::Upstream(
                "yt-dlp executable not found".to_string(),
            ));
        };

        let deadline = Instant::now() + config.stream_budget();

        // The probe only improves headers; streaming proceeds without it
        let (metadata, selector, use_embed) = match self.probe(tool, id, config, deadline).await {
            Ok(probe) => {
                let selector = probe
                    .format
                    .format_id
                    .clone()
                    .unwrap_or_else(|| "bestaudio/best".to_string());
                (probe.metadata, selector, probe.used_embed)
            }
            Err(e) => {
                warn!(content_id = %id, error = %e, "metadata probe failed, streaming best audio");
                (
                    AudioMetadata::new("Unknown", "Unknown"),
                    "bestaudio/best".to_string(),
                    config.use_embed_url,
                )
            }
        };

        let first = self.stream_from(tool, id, config, &selector, use_embed, deadline).await;
        let result = match first {
            Err(e) if !use_embed => {
                warn!(content_id = %id, error = %e, "extractor stream failed, retrying with embed URL");
                self.stream_from(tool, id, config, &selector, true, deadline).await
            }
            other => other,
        };

        result
            .map(|handle| ResolvedAudio::live(metadata, handle))
            .into()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::path::PathBuf;
    use std::time::Duration;

    fn content() -> ContentId {
        ContentId::parse("abc123").unwrap()
    }

    #[test]
    fn test_args_cookie_file_and_persona() {
        let config = ResolverConfig::default()
            .with_cookie_source(Some(CookieSource::File(PathBuf::from("/srv/cookies.txt"))))
            .with_alternate_persona(true)
            .with_proxy(Some("socks5://127.0.0.1:1080".into()));
        let args = NativeExtractorResolver::build_args(&config);

        let joined = args.join(" ");
        assert!(joined.contains("--cookies /srv/cookies.txt"));
        assert!(!joined.contains("--cookies-from-browser"));
        assert!(joined.contains("--extractor-args youtube:player_client=android"));
        assert!(joined.contains("--proxy socks5://127.0.0.1:1080"));
        assert!(joined.contains("--user-agent Mozilla/5.0"));
        assert!(joined.contains("--add-header Accept-Language:en-US,en;q=0.9"));
    }

    #[test]
    fn test_args_browser_jar() {
        let config = ResolverConfig::default()
            .with_cookie_source(Some(CookieSource::Browser("firefox".into())));
        let args = NativeExtractorResolver::build_args(&config);
        let joined = args.join(" ");
        assert!(joined.contains("--cookies-from-browser firefox"));
        assert!(!args.iter().any(|a| a == "--cookies"));
        assert!(!joined.contains("player_client"));
    }

    #[test]
    fn test_parse_json_picks_best_audio() {
        let json = br#"{
            "title": "Song", "uploader": "Band", "duration": 212.4,
            "formats": [
                {"format_id": "139", "url": "https://m/139", "ext": "m4a", "vcodec": "none", "acodec": "mp4a.40.5", "abr": 48.0, "filesize": 1000},
                {"format_id": "18", "url": "https://m/18", "ext": "mp4", "vcodec": "avc1", "acodec": "mp4a.40.2", "tbr": 600.0},
                {"format_id": "251", "url": "https://m/251", "ext": "webm", "vcodec": "none", "acodec": "opus", "abr": 160.0, "filesize": 4000}
            ]
        }"#;
        let (metadata, format) = NativeExtractorResolver::parse_json(json).unwrap();
        assert_eq!(format.format_id.as_deref(), Some("251"));
        assert_eq!(format.bitrate, Some(160_000));
        assert_eq!(metadata.title, "Song");
        assert_eq!(metadata.author, "Band");
        assert_eq!(metadata.duration_seconds, 212);
        assert_eq!(metadata.mime_type.as_deref(), Some("audio/webm"));
        assert_eq!(metadata.content_length, 4000);
    }

    #[test]
    fn test_parse_json_rejects_garbage() {
        assert!(matches!(
            NativeExtractorResolver::parse_json(b"not json"),
            Err(ResolveError::Parse(_))
        ));
        assert_eq!(
            NativeExtractorResolver::parse_json(br#"{"title": "x", "formats": []}"#).unwrap_err(),
            ResolveError::NoFormatAvailable
        );
    }

    #[tokio::test]
    async fn test_missing_tool_fails() {
        let resolver = NativeExtractorResolver::new();
        let outcome = resolver
            .resolve_metadata(&content(), &ResolverConfig::default())
            .await;
        assert!(matches!(outcome, ResolutionOutcome::Failure(ResolveError::Upstream(_))));
    }

    #[cfg(unix)]
    fn fake_tool(dir: &Path, body: &str) -> PathBuf {
        use std::os::unix::fs::PermissionsExt;
        let path = dir.join("yt-dlp");
        std::fs::write(&path, format!("#!/bin/sh\n{}\n", body)).unwrap();
        std::fs::set_permissions(&path, std::fs::Permissions::from_mode(0o755)).unwrap();
        path
    }

    #[cfg(unix)]
    const INFO_JSON: &str = r#"{"title":"Embedded","uploader":"U","duration":3,"formats":[{"format_id":"140","url":"https://m/140","ext":"m4a","vcodec":"none","acodec":"mp4a","abr":128}]}"#;

    #[cfg(unix)]
    #[tokio::test]
    async fn test_retries_with_embed_url() {
        let dir = tempfile::tempdir().unwrap();
        let body = format!(
            r#"for a in "$@"; do last="$a"; done
case "$last" in
  *embed*) echo '{}' ;;
  *) echo "ERROR: Sign in to confirm you're not a bot" >&2; exit 1 ;;
esac"#,
            INFO_JSON
        );
        let tool = fake_tool(dir.path(), &body);
        let config = ResolverConfig::default()
            .with_tool_path(Some(tool))
            .with_timeout(Duration::from_secs(5));

        let outcome = NativeExtractorResolver::new()
            .resolve_metadata(&content(), &config)
            .await;
        match outcome {
            ResolutionOutcome::Success(audio) => {
                assert_eq!(audio.metadata.title, "Embedded");
                assert_eq!(audio.source.url(), Some("https://m/140"));
            }
            other => panic!("unexpected outcome: {:?}", other),
        }
    }

    #[cfg(unix)]
    #[tokio::test]
    async fn test_unavailable_is_not_found_after_retry() {
        let dir = tempfile::tempdir().unwrap();
        let tool = fake_tool(
            dir.path(),
            "echo 'ERROR: [youtube] abc123: Video unavailable' >&2; exit 1",
        );
        let config = ResolverConfig::default()
            .with_tool_path(Some(tool))
            .with_timeout(Duration::from_secs(5));
        let outcome = NativeExtractorResolver::new()
            .resolve_metadata(&content(), &config)
            .await;
        assert!(matches!(outcome, ResolutionOutcome::Failure(ResolveError::NotFound(_))));
    }

    #[cfg(unix)]
    #[tokio::test]
    async fn test_stream_mode_pipes_stdout() {
        use futures::StreamExt;

        let dir = tempfile::tempdir().unwrap();
        let body = format!(
            r#"case "$*" in
  *--dump-json*) echo '{}' ;;
  *"-f 140"*) printf 'AUDIO' ;;
  *) exit 2 ;;
esac"#,
            INFO_JSON
        );
        let tool = fake_tool(dir.path(), &body);
        let config = ResolverConfig::default()
            .with_tool_path(Some(tool))
            .with_timeout(Duration::from_secs(5));

        let outcome = NativeExtractorResolver::new()
            .produce_stream(&content(), &config)
            .await;
        let ResolutionOutcome::Success(audio) = outcome else {
            panic!("stream did not start");
        };
        assert_eq!(audio.metadata.mime_type.as_deref(), Some("audio/mp4"));
        let crate::resolver::models::AudioSource::Live(mut handle) = audio.source else {
            panic!("expected live source");
        };
        let mut bytes = Vec::new();
        while let Some(chunk) = handle.next().await {
            bytes.extend_from_slice(&chunk.unwrap());
        }
        assert_eq!(bytes, b"AUDIO");
    }

    #[cfg(unix)]
    #[tokio::test]
    async fn test_stream_retries_with_embed_url() {
        use futures::StreamExt;

        let dir = tempfile::tempdir().unwrap();
        let body = format!(
            r#"for a in "$@"; do last="$a"; done
case "$*" in
  *--dump-json*) echo '{}' ;;
  *) case "$last" in
       *embed*) printf 'EMBEDDED' ;;
       *) echo "ERROR: HTTP Error 403: Forbidden" >&2; exit 1 ;;
     esac ;;
esac"#,
            INFO_JSON
        );
        let tool = fake_tool(dir.path(), &body);
        let config = ResolverConfig::default()
            .with_tool_path(Some(tool))
            .with_timeout(Duration::from_secs(5));

        let outcome = NativeExtractorResolver::new()
            .produce_stream(&content(), &config)
            .await;
        let ResolutionOutcome::Success(audio) = outcome else {
            panic!("embed retry did not start a stream");
        };
        let crate::resolver::models::AudioSource::Live(mut handle) = audio.source else {
            panic!("expected live source");
        };
        let mut bytes = Vec::new();
        while let Some(chunk) = handle.next().await {
            bytes.extend_from_slice(&chunk.unwrap());
        }
        assert_eq!(bytes, b"EMBEDDED");
    }

    #[cfg(unix)]
    #[tokio::test]
    async fn test_stream_failure_on_embed_url_is_not_retried() {
        let dir = tempfile::tempdir().unwrap();
        let count = dir.path().join("streams");
        let body = format!(
            r#"case "$*" in
  *--dump-json*) echo '{}' ;;
  *) echo x >> {}; echo "ERROR: HTTP Error 403: Forbidden" >&2; exit 1 ;;
esac"#,
            INFO_JSON,
            count.display()
        );
        let tool = fake_tool(dir.path(), &body);
        let config = ResolverConfig::default()
            .with_tool_path(Some(tool))
            .with_embed_url(true)
            .with_timeout(Duration::from_secs(5));

        let outcome = NativeExtractorResolver::new()
            .produce_stream(&content(), &config)
            .await;
        assert!(matches!(outcome, ResolutionOutcome::Failure(_)));
        assert_eq!(std::fs::read_to_string(&count).unwrap().lines().count(), 1);
    }

    #[test]
    fn test_step_limit_is_capped_by_deadline() {
        let config = ResolverConfig::default().with_timeout(Duration::from_secs(10));

        let far = Instant::now() + Duration::from_secs(60);
        assert_eq!(
            NativeExtractorResolver::step_limit(&config, far).unwrap(),
            Duration::from_secs(10)
        );

        let near = Instant::now() + Duration::from_secs(2);
        assert!(NativeExtractorResolver::step_limit(&config, near).unwrap() <= Duration::from_secs(2));

        assert!(matches!(
            NativeExtractorResolver::step_limit(&config, Instant::now()),
            Err(ResolveError::Upstream(_))
        ));
    }
}
