// Embedded resolvers - in-process extraction against the player API
//
// Two personas share one implementation. A mobile client identity returns
// direct (non-ciphered) media URLs for most content, so no signature
// handling is needed. The second persona also hands requests over to the
// native resolver when the player API blocks it while streaming.

use async_trait::async_trait;
use serde_json::{json, Value};
use tracing::{debug, info};

use crate::resolver::diagnostics::diagnose_playability;
use crate::resolver::errors::ResolveError;
use crate::resolver::format_selector::FormatSelector;
use crate::resolver::models::{
    AudioMetadata, CodecKind, ContentId, MediaFormat, ResolvedAudio, ResolverId,
};
use crate::resolver::policy::ResolverConfig;
use crate::resolver::traits::{ProviderResolver, ResolutionOutcome};
use crate::resolver::utils::{error_for_status, extension_for_mime, is_blocking_status, json_u64};

pub const PLAYER_API_URL: &str = "https://www.youtube.com/youtubei/v1/player";

/// Client identity presented to the player API.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Persona {
    Ios,
    Android,
}

impl Persona {
    fn client_context(&self) -> Value {
        match self {
            Self::Ios => json!({
                "clientName": "IOS",
                "clientVersion": "21.02.3",
                "deviceMake": "Apple",
                "deviceModel": "iPhone16,2",
                "osName": "iPhone",
                "osVersion": "18.3.2.22D82"
            }),
            Self::Android => json!({
                "clientName": "ANDROID",
                "clientVersion": "21.02.35",
                "androidSdkVersion": 30,
                "osName": "Android",
                "osVersion": "11"
            }),
        }
    }

    fn user_agent(&self) -> &'static str {
        match self {
            Self::Ios => {
                "com.google.ios.youtube/21.02.3 (iPhone16,2; U; CPU iOS 18_3_2 like Mac OS X;)"
            }
            Self::Android => "com.google.android.youtube/21.02.35 (Linux; U; Android 11) gzip",
        }
    }
}

enum PlayerError {
    /// 410 or 429 from the player API itself
    Blocked(u16),
    Failed(ResolveError),
}

impl From<ResolveError> for PlayerError {
    fn from(e: ResolveError) -> Self {
        Self::Failed(e)
    }
}

impl From<reqwest::Error> for PlayerError {
    fn from(e: reqwest::Error) -> Self {
        Self::Failed(e.into())
    }
}

impl PlayerError {
    fn into_error(self) -> ResolveError {
        match self {
            Self::Blocked(status) => error_for_status(status, "player API"),
            Self::Failed(e) => e,
        }
    }
}

pub struct EmbeddedPlayerResolver {
    id: ResolverId,
    persona: Persona,
    client: reqwest::Client,
    endpoint: String,
    redirect_when_blocked: bool,
}

impl EmbeddedPlayerResolver {
    /// First persona (iOS client), plain failures only.
    pub fn persona_a(client: reqwest::Client) -> Self {
        Self {
            id: ResolverId::EmbeddedA,
            persona: Persona::Ios,
            client,
            endpoint: PLAYER_API_URL.to_string(),
            redirect_when_blocked: false,
        }
    }

    /// Second persona (Android client), redirects to the native resolver when blocked.
    pub fn persona_b(client: reqwest::Client) -> Self {
        Self {
            id: ResolverId::EmbeddedB,
            persona: Persona::Android,
            client,
            endpoint: PLAYER_API_URL.to_string(),
            redirect_when_blocked: true,
        }
    }

    pub fn with_endpoint(mut self, endpoint: impl Into<String>) -> Self {
        self.endpoint = endpoint.into();
        self
    }

    async fn fetch(
        &self,
        id: &ContentId,
        config: &ResolverConfig,
    ) -> Result<(AudioMetadata, MediaFormat), PlayerError> {
        let payload = json!({
            "context": { "client": self.persona.client_context() },
            "videoId": id.as_str(),
            "contentCheckOk": true,
            "racyCheckOk": true
        });

        let mut request = self
            .client
            .post(&self.endpoint)
            .header("User-Agent", self.persona.user_agent())
            .json(&payload);
        for (name, value) in &config.headers {
            if !name.eq_ignore_ascii_case("user-agent") {
                request = request.header(name.as_str(), value.as_str());
            }
        }

        let response = request.send().await?;
        let status = response.status().as_u16();
        if is_blocking_status(status) {
            return Err(PlayerError::Blocked(status));
        }
        if !response.status().is_success() {
            return Err(error_for_status(status, "player API").into());
        }

        let data: Value = response.json().await?;
        Ok(Self::parse_player(&data)?)
    }

    fn parse_player(data: &Value) -> Result<(AudioMetadata, MediaFormat), ResolveError> {
        if !data.is_object() {
            return Err(ResolveError::Parse("player response is not an object".to_string()));
        }

        let playability = data["playabilityStatus"]["status"].as_str().unwrap_or("UNKNOWN");
        if playability != "OK" {
            let reason = data["playabilityStatus"]["reason"].as_str().unwrap_or("");
            return Err(diagnose_playability(playability, reason));
        }

        let streaming = &data["streamingData"];
        let formats: Vec<MediaFormat> = ["adaptiveFormats", "formats"]
            .iter()
            .filter_map(|key| streaming[*key].as_array())
            .flatten()
            .map(Self::parse_format)
            .collect();
        let format = FormatSelector::best_playable_audio(&formats)?;

        let details = &data["videoDetails"];
        let duration = json_u64(&details["lengthSeconds"]).unwrap_or(0);
        let metadata = AudioMetadata::new(
            details["title"].as_str().unwrap_or("Unknown"),
            details["author"].as_str().unwrap_or("Unknown"),
        )
        .with_duration(duration)
        .with_format(&format);

        Ok((metadata, format))
    }

    fn parse_format(f: &Value) -> MediaFormat {
        let mime = f["mimeType"].as_str().unwrap_or("");
        MediaFormat::new(f["url"].as_str().unwrap_or(""), CodecKind::from_mime(mime))
            .with_bitrate(json_u64(&f["bitrate"]).or_else(|| json_u64(&f["averageBitrate"])))
            .with_file_size(json_u64(&f["contentLength"]))
            .with_extension(extension_for_mime(mime))
            .with_mime_type(Some(mime.to_string()).filter(|m| !m.is_empty()))
            .with_format_id(json_u64(&f["itag"]).map(|itag| itag.to_string()))
    }
}

#[async_trait]
impl ProviderResolver for EmbeddedPlayerResolver {
    fn id(&self) -> ResolverId {
        self.id
    }

    fn name(&self) -> &'static str {
        match self.persona {
            Persona::Ios => "player-api-ios",
            Persona::Android => "player-api-android",
        }
    }

    async fn resolve_metadata(&self, id: &ContentId, config: &ResolverConfig) -> ResolutionOutcome {
        match self.fetch(id, config).await {
            Ok((metadata, format)) => {
                debug!(resolver = self.name(), itag = ?format.format_id, "player API format selected");
                ResolutionOutcome::Success(ResolvedAudio::from_url(metadata, format.url))
            }
            Err(e) => ResolutionOutcome::Failure(e.into_error()),
        }
    }

    async fn produce_stream(&self, id: &ContentId, config: &ResolverConfig) -> ResolutionOutcome {
        match self.fetch(id, config).await {
            Ok((metadata, format)) => {
                ResolutionOutcome::Success(ResolvedAudio::from_url(metadata, format.url))
            }
            Err(PlayerError::Blocked(status)) if self.redirect_when_blocked => {
                info!(
                    resolver = self.name(),
                    status,
                    "player API blocked, handing over to native extractor"
                );
                ResolutionOutcome::Redirect(ResolverId::Native)
            }
            Err(e) => ResolutionOutcome::Failure(e.into_error()),
        }
    }

    fn blocked_handover(&self) -> Option<ResolverId> {
        self.redirect_when_blocked.then_some(ResolverId::Native)
    }
}
