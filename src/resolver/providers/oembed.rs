// Minimal resolver - platform oEmbed metadata, last resort
//
// Only title and author are known. The canonical watch URL becomes the
// source and the stream pipeline serves whatever it returns, so no mime
// type is claimed up front.

use async_trait::async_trait;
use serde::Deserialize;

use crate::resolver::errors::ResolveError;
use crate::resolver::models::{AudioMetadata, ContentId, ResolvedAudio, ResolverId};
use crate::resolver::policy::ResolverConfig;
use crate::resolver::traits::{ProviderResolver, ResolutionOutcome};
use crate::resolver::utils::error_for_status;

pub const OEMBED_URL: &str = "https://www.youtube.com/oembed";

#[derive(Debug, Deserialize)]
struct OEmbed {
    title: Option<String>,
    author_name: Option<String>,
}

pub struct MinimalMetadataResolver {
    client: reqwest::Client,
    endpoint: String,
}

impl MinimalMetadataResolver {
    pub fn new(client: reqwest::Client) -> Self {
        Self {
            client,
            endpoint: OEMBED_URL.to_string(),
        }
    }

    pub fn with_endpoint(mut self, endpoint: impl Into<String>) -> Self {
        self.endpoint = endpoint.into();
        self
    }

    async fn resolve(&self, id: &ContentId) -> Result<ResolvedAudio, ResolveError> {
        let watch_url = id.watch_url();
        let response = self
            .client
            .get(&self.endpoint)
            .query(&[("url", watch_url.as_str()), ("format", "json")])
            .send()
            .await?;

        let status = response.status();
        if !status.is_success() {
            // oEmbed answers 401 for private and embed-disabled videos
            return Err(match status.as_u16() {
                401 | 403 => ResolveError::AuthRequired(format!("oEmbed HTTP {}", status)),
                code => error_for_status(code, "oEmbed"),
            });
        }

        let info: OEmbed = response.json().await?;
        let metadata = AudioMetadata::new(
            info.title.unwrap_or_else(|| "Unknown".to_string()),
            info.author_name.unwrap_or_else(|| "Unknown".to_string()),
        );
        Ok(ResolvedAudio::from_url(metadata, watch_url))
    }
}

#[async_trait]
impl ProviderResolver for MinimalMetadataResolver {
    fn id(&self) -> ResolverId {
        ResolverId::Minimal
    }

    fn name(&self) -> &'static str {
        "oembed"
    }

    async fn resolve_metadata(&self, id: &ContentId, _config: &ResolverConfig) -> ResolutionOutcome {
        self.resolve(id).await.into()
    }

    async fn produce_stream(&self, id: &ContentId, _config: &ResolverConfig) -> ResolutionOutcome {
        self.resolve(id).await.into()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use axum::extract::Query;
    use axum::http::StatusCode;
    use axum::response::{IntoResponse, Response};
    use axum::routing::get;
    use axum::{Json, Router};
    use serde_json::json;
    use std::collections::HashMap;

    async fn oembed(Query(params): Query<HashMap<String, String>>) -> Response {
        let url = params.get("url").cloned().unwrap_or_default();
        if url.ends_with("missing") {
            return StatusCode::NOT_FOUND.into_response();
        }
        if url.ends_with("private") {
            return StatusCode::UNAUTHORIZED.into_response();
        }
        Json(json!({ "title": "Minimal Title", "author_name": "Channel", "type": "video" }))
            .into_response()
    }

    async fn resolver() -> MinimalMetadataResolver {
        let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        tokio::spawn(async move {
            axum::serve(listener, Router::new().route("/oembed", get(oembed)))
                .await
                .unwrap();
        });
        MinimalMetadataResolver::new(reqwest::Client::new())
            .with_endpoint(format!("http://{}/oembed", addr))
    }

    #[tokio::test]
    async fn test_returns_watch_url_without_mime() {
        let resolver = resolver().await;
        let id = ContentId::parse("abc123").unwrap();
        let ResolutionOutcome::Success(audio) =
            resolver.resolve_metadata(&id, &ResolverConfig::default()).await
        else {
            panic!("oEmbed lookup failed");
        };
        assert_eq!(audio.metadata.title, "Minimal Title");
        assert_eq!(audio.metadata.author, "Channel");
        assert_eq!(audio.metadata.mime_type, None);
        assert_eq!(audio.metadata.mime_or_default(), "audio/mp4");
        assert_eq!(
            audio.source.url(),
            Some("https://www.youtube.com/watch?v=abc123")
        );
    }

    #[tokio::test]
    async fn test_status_mapping() {
        let resolver = resolver().await;
        let config = ResolverConfig::default();
        let missing = ContentId::parse("missing").unwrap();
        let private = ContentId::parse("private").unwrap();
        assert!(matches!(
            resolver.resolve_metadata(&missing, &config).await,
            ResolutionOutcome::Failure(ResolveError::NotFound(_))
        ));
        assert!(matches!(
            resolver.produce_stream(&private, &config).await,
            ResolutionOutcome::Failure(ResolveError::AuthRequired(_))
        ));
    }
}
