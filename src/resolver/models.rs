// Common data models for resolvers

use std::fmt;
use std::str::FromStr;

use lazy_static::lazy_static;
use regex::Regex;
use serde::{Deserialize, Serialize};

use super::errors::ResolveError;
use super::utils::mime_for_extension;
use crate::stream::StreamHandle;

lazy_static! {
    static ref CONTENT_ID_RE: Regex = Regex::new(r"^[A-Za-z0-9_-]{1,64}$").unwrap();
}

pub const DEFAULT_MIME_TYPE: &str = "audio/mp4";

/// Platform-assigned identifier of one video.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct ContentId(String);

impl ContentId {
    /// Validate a raw identifier; empty or malformed input is rejected up front
    /// so no resolver ever sees it.
    pub fn parse(raw: &str) -> Result<Self, ResolveError> {
        if !CONTENT_ID_RE.is_match(raw) {
            return Err(ResolveError::InvalidIdentifier(raw.to_string()));
        }
        Ok(Self(raw.to_string()))
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }

    pub fn watch_url(&self) -> String {
        format!("https://www.youtube.com/watch?v={}", self.0)
    }

    pub fn embed_url(&self) -> String {
        format!("https://www.youtube.com/embed/{}", self.0)
    }
}

impl fmt::Display for ContentId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// Identity of one resolution strategy.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum ResolverId {
    /// Locally spawned extraction executable
    Native,
    /// In-process player API extraction, first persona
    EmbeddedA,
    /// In-process player API extraction, second persona
    EmbeddedB,
    /// Relay with several interchangeable instances
    RelayA,
    /// Relay with a single endpoint and a flat format list
    RelayB,
    /// Lightweight embed metadata, last resort
    Minimal,
}

impl ResolverId {
    pub const ALL: [ResolverId; 6] = [
        Self::Native,
        Self::EmbeddedA,
        Self::EmbeddedB,
        Self::RelayA,
        Self::RelayB,
        Self::Minimal,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Native => "native",
            Self::EmbeddedA => "embedded-a",
            Self::EmbeddedB => "embedded-b",
            Self::RelayA => "relay-a",
            Self::RelayB => "relay-b",
            Self::Minimal => "minimal",
        }
    }
}

impl fmt::Display for ResolverId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for ResolverId {
    type Err = String;

    // Accepts "relay-b", "relay_b" and "relayB" alike
    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let normalized: String = s
            .trim()
            .chars()
            .filter(|c| *c != '-' && *c != '_')
            .collect::<String>()
            .to_lowercase();
        Self::ALL
            .iter()
            .find(|id| id.as_str().replace('-', "") == normalized)
            .copied()
            .ok_or_else(|| format!("unknown resolver id: {}", s))
    }
}

/// What kind of elementary streams a rendition carries.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum CodecKind {
    Audio,
    Video,
    /// Audio and video muxed together
    Both,
    Unknown,
}

impl CodecKind {
    /// From extractor-style codec fields where `"none"` marks an absent track.
    pub fn from_codecs(vcodec: Option<&str>, acodec: Option<&str>) -> Self {
        let present = |c: Option<&str>| c.is_some_and(|v| !v.is_empty() && v != "none");
        match (present(vcodec), present(acodec)) {
            (true, true) => Self::Both,
            (true, false) => Self::Video,
            (false, true) => Self::Audio,
            (false, false) => Self::Unknown,
        }
    }

    /// From a mime type such as `video/mp4; codecs="avc1.42001E, mp4a.40.2"`.
    pub fn from_mime(mime: &str) -> Self {
        let lower = mime.to_lowercase();
        if lower.starts_with("audio/") {
            Self::Audio
        } else if lower.starts_with("video/") {
            let codec_count = lower
                .split_once("codecs=")
                .map(|(_, codecs)| codecs.split(',').count())
                .unwrap_or(1);
            if codec_count > 1 {
                Self::Both
            } else {
                Self::Video
            }
        } else {
            Self::Unknown
        }
    }

    pub fn has_audio(&self) -> bool {
        matches!(self, Self::Audio | Self::Both)
    }

    pub fn has_video(&self) -> bool {
        matches!(self, Self::Video | Self::Both)
    }
}

/// One playable rendition reported by a provider.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MediaFormat {
    /// Resolvable media location; empty for metadata-only providers
    pub url: String,
    pub codec: CodecKind,
    /// Bits per second; absent is treated as 0
    pub bitrate: Option<u64>,
    pub file_size: Option<u64>,
    /// Container extension (m4a, webm, mp4)
    pub extension: String,
    pub mime_type: Option<String>,
    /// Provider-specific format id (itag / yt-dlp format_id)
    pub format_id: Option<String>,
}

impl MediaFormat {
    pub fn new(url: impl Into<String>, codec: CodecKind) -> Self {
        Self {
            url: url.into(),
            codec,
            bitrate: None,
            file_size: None,
            extension: String::new(),
            mime_type: None,
            format_id: None,
        }
    }

    pub fn with_bitrate(mut self, bitrate: Option<u64>) -> Self {
        self.bitrate = bitrate;
        self
    }

    pub fn with_file_size(mut self, size: Option<u64>) -> Self {
        self.file_size = size;
        self
    }

    pub fn with_extension(mut self, ext: impl Into<String>) -> Self {
        self.extension = ext.into();
        self
    }

    pub fn with_mime_type(mut self, mime: Option<String>) -> Self {
        self.mime_type = mime;
        self
    }

    pub fn with_format_id(mut self, id: Option<String>) -> Self {
        self.format_id = id;
        self
    }

    pub fn is_audio_only(&self) -> bool {
        self.codec.has_audio() && !self.codec.has_video()
    }

    pub fn effective_bitrate(&self) -> u64 {
        self.bitrate.unwrap_or(0)
    }

    /// Mime type as reported, else derived from the container extension
    pub fn effective_mime(&self) -> String {
        match &self.mime_type {
            Some(mime) if !mime.is_empty() => mime.clone(),
            _ => mime_for_extension(&self.extension).to_string(),
        }
    }
}

/// Descriptive part of a resolution, reported by the info endpoint.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AudioMetadata {
    pub title: String,
    pub author: String,
    pub duration_seconds: u64,
    /// `None` when the provider cannot know it up front
    pub mime_type: Option<String>,
    /// 0 if unknown
    pub content_length: u64,
}

impl AudioMetadata {
    pub fn new(title: impl Into<String>, author: impl Into<String>) -> Self {
        Self {
            title: title.into(),
            author: author.into(),
            duration_seconds: 0,
            mime_type: None,
            content_length: 0,
        }
    }

    pub fn with_duration(mut self, seconds: u64) -> Self {
        self.duration_seconds = seconds;
        self
    }

    pub fn with_format(mut self, format: &MediaFormat) -> Self {
        self.mime_type = Some(format.effective_mime());
        self.content_length = format.file_size.unwrap_or(0);
        self
    }

    pub fn with_mime_type(mut self, mime: Option<String>) -> Self {
        self.mime_type = mime;
        self
    }

    pub fn with_content_length(mut self, length: u64) -> Self {
        self.content_length = length;
        self
    }

    pub fn mime_or_default(&self) -> &str {
        self.mime_type.as_deref().unwrap_or(DEFAULT_MIME_TYPE)
    }
}

/// Where the audio bytes come from.
pub enum AudioSource {
    /// To be fetched by the stream pipeline
    Url(String),
    /// Already flowing bytes (e.g. subprocess stdout)
    Live(StreamHandle),
}

impl AudioSource {
    pub fn url(&self) -> Option<&str> {
        match self {
            Self::Url(url) => Some(url),
            Self::Live(_) => None,
        }
    }
}

impl fmt::Debug for AudioSource {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Url(url) => f.debug_tuple("Url").field(url).finish(),
            Self::Live(_) => f.write_str("Live(..)"),
        }
    }
}

/// The orchestrator's output for one request.
#[derive(Debug)]
pub struct ResolvedAudio {
    pub metadata: AudioMetadata,
    pub source: AudioSource,
}

impl ResolvedAudio {
    pub fn from_url(metadata: AudioMetadata, url: impl Into<String>) -> Self {
        Self {
            metadata,
            source: AudioSource::Url(url.into()),
        }
    }

    pub fn live(metadata: AudioMetadata, handle: StreamHandle) -> Self {
        Self {
            metadata,
            source: AudioSource::Live(handle),
        }
    }
}
