// Relay resolvers - public mirrors of the platform's metadata
//
// Relay A spreads calls over several interchangeable instances, picking one
// at random per call. A failing instance fails the whole attempt; there is
// no retry against a second instance. Relay B is a single endpoint with a
// flat audio-stream list.

use async_trait::async_trait;
use parking_lot::Mutex;
use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};
use serde_json::Value;
use tracing::debug;

use crate::resolver::errors::ResolveError;
use crate::resolver::format_selector::FormatSelector;
use crate::resolver::models::{
    AudioMetadata, CodecKind, ContentId, MediaFormat, ResolvedAudio, ResolverId,
};
use crate::resolver::policy::ResolverConfig;
use crate::resolver::traits::{ProviderResolver, ResolutionOutcome};
use crate::resolver::utils::{error_for_status, extension_for_mime, json_u64};

pub const DEFAULT_RELAY_INSTANCES: [&str; 6] = [
    "https://invidious.snopyta.org",
    "https://yewtu.be",
    "https://invidious.kavin.rocks",
    "https://vid.puffyan.us",
    "https://invidious.namazso.eu",
    "https://inv.riverside.rocks",
];

pub const DEFAULT_PIPED_API: &str = "https://pipedapi.kavin.rocks";

/// GET a relay URL and decode its JSON body, mapping relay error payloads.
async fn fetch_json(
    client: &reqwest::Client,
    url: &str,
    config: &ResolverConfig,
) -> Result<Value, ResolveError> {
    let mut request = client.get(url);
    for (name, value) in &config.headers {
        request = request.header(name.as_str(), value.as_str());
    }
    let response = request.send().await?;
    let status = response.status();
    let text = response.text().await?;

    // Relays report "video unavailable" and friends in an error field
    let body: Option<Value> = serde_json::from_str(&text).ok();
    let relay_error = body.as_ref().and_then(|b| {
        b["error"]
            .as_str()
            .or_else(|| b["message"].as_str().filter(|_| !status.is_success()))
            .map(str::to_string)
    });

    if let Some(message) = relay_error {
        let classified = ResolveError::from(message.clone());
        return Err(match classified {
            ResolveError::Upstream(_) if !status.is_success() => {
                error_for_status(status.as_u16(), message)
            }
            other => other,
        });
    }
    if !status.is_success() {
        return Err(error_for_status(status.as_u16(), url.to_string()));
    }

    body.ok_or_else(|| ResolveError::Parse(format!("relay returned non-JSON body from {}", url)))
}

fn relay_format(f: &Value, mime_key: &str, size_keys: &[&str]) -> MediaFormat {
    let mime = f[mime_key].as_str().unwrap_or("");
    let codec = match CodecKind::from_mime(mime) {
        CodecKind::Unknown => CodecKind::Audio,
        kind => kind,
    };
    let size = size_keys.iter().find_map(|key| json_u64(&f[*key]));
    MediaFormat::new(f["url"].as_str().unwrap_or(""), codec)
        .with_bitrate(json_u64(&f["bitrate"]))
        .with_file_size(size)
        .with_extension(extension_for_mime(mime))
        .with_mime_type(Some(mime.to_string()).filter(|m| !m.is_empty()))
        .with_format_id(json_u64(&f["itag"]).map(|i| i.to_string()))
}

/// Relay A: Invidious-style instances chosen at random.
pub struct InvidiousRelayResolver {
    client: reqwest::Client,
    instances: Vec<String>,
    rng: Mutex<StdRng>,
}

impl InvidiousRelayResolver {
    pub fn new(client: reqwest::Client, instances: Vec<String>) -> Self {
        Self::with_rng(client, instances, StdRng::from_rng(&mut rand::rng()))
    }

    /// Deterministic instance selection.
    pub fn seeded(client: reqwest::Client, instances: Vec<String>, seed: u64) -> Self {
        Self::with_rng(client, instances, StdRng::seed_from_u64(seed))
    }

    fn with_rng(client: reqwest::Client, instances: Vec<String>, rng: StdRng) -> Self {
        let instances = instances
            .into_iter()
            .map(|i| i.trim().trim_end_matches('/').to_string())
            .filter(|i| !i.is_empty())
            .collect();
        Self {
            client,
            instances,
            rng: Mutex::new(rng),
        }
    }

    pub fn instances(&self) -> &[String] {
        &self.instances
    }

    fn pick_instance(&self) -> Option<&str> {
        if self.instances.is_empty() {
            return None;
        }
        let index = self.rng.lock().random_range(0..self.instances.len());
        Some(self.instances[index].as_str())
    }

    async fn resolve(&self, id: &ContentId, config: &ResolverConfig) -> Result<ResolvedAudio, ResolveError> {
        let instance = self
            .pick_instance()
            .ok_or_else(|| ResolveError::Upstream("no relay instances configured".to_string()))?;
        let url = format!("{}/api/v1/videos/{}", instance, id);
        debug!(instance, content_id = %id, "querying relay");

        let data = fetch_json(&self.client, &url, config).await?;
        let formats: Vec<MediaFormat> = data["adaptiveFormats"]
            .as_array()
            .ok_or_else(|| ResolveError::Parse("relay response has no adaptiveFormats".to_string()))?
            .iter()
            .map(|f| relay_format(f, "type", &["clen", "contentLength"]))
            .collect();
        let format = FormatSelector::best_playable_audio(&formats)?;

        let metadata = AudioMetadata::new(
            data["title"].as_str().unwrap_or("Unknown"),
            data["author"].as_str().unwrap_or("Unknown"),
        )
        .with_duration(json_u64(&data["lengthSeconds"]).unwrap_or(0))
        .with_format(&format);

        Ok(ResolvedAudio::from_url(metadata, format.url))
    }
}

#[async_trait]
impl ProviderResolver for InvidiousRelayResolver {
    fn id(&self) -> ResolverId {
        ResolverId::RelayA
    }

    fn name(&self) -> &'static str {
        "invidious"
    }

    async fn resolve_metadata(&self, id: &ContentId, config: &ResolverConfig) -> ResolutionOutcome {
        self.resolve(id, config).await.into()
    }

    async fn produce_stream(&self, id: &ContentId, config: &ResolverConfig) -> ResolutionOutcome {
        self.resolve(id, config).await.into()
    }
}

/// Relay B: Piped-style single endpoint.
pub struct PipedRelayResolver {
    client: reqwest::Client,
    api_base: String,
}

impl PipedRelayResolver {
    pub fn new(client: reqwest::Client, api_base: impl Into<String>) -> Self {
        Self {
            client,
            api_base: api_base.into().trim_end_matches('/').to_string(),
        }
    }

    async fn resolve(&self, id: &ContentId, config: &ResolverConfig) -> Result<ResolvedAudio, ResolveError> {
        let url = format!("{}/streams/{}", self.api_base, id);
        debug!(api = %self.api_base, content_id = %id, "querying relay");

        let data = fetch_json(&self.client, &url, config).await?;
        let formats: Vec<MediaFormat> = data["audioStreams"]
            .as_array()
            .ok_or_else(|| ResolveError::Parse("relay response has no audioStreams".to_string()))?
            .iter()
            .map(|f| relay_format(f, "mimeType", &["contentLength"]))
            .collect();
        let format = FormatSelector::best_playable_audio(&formats)?;

        let metadata = AudioMetadata::new(
            data["title"].as_str().unwrap_or("Unknown"),
            data["uploader"].as_str().unwrap_or("Unknown"),
        )
        .with_duration(json_u64(&data["duration"]).unwrap_or(0))
        .with_format(&format);

        Ok(ResolvedAudio::from_url(metadata, format.url))
    }
}

#[async_trait]
impl ProviderResolver for PipedRelayResolver {
    fn id(&self) -> ResolverId {
        ResolverId::RelayB
    }

    fn name(&self) -> &'static str {
        "piped"
    }

    async fn resolve_metadata(&self, id: &ContentId, config: &ResolverConfig) -> ResolutionOutcome {
        self.resolve(id, config).await.into()
    }

    async fn produce_stream(&self, id: &ContentId, config: &ResolverConfig) -> ResolutionOutcome {
        self.resolve(id, config).await.into()
    }
}
