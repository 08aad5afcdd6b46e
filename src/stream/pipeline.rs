// StreamPipeline - turns a resolved source into a live HTTP response body

use std::io;

use axum::body::Body;
use axum::http::{header, HeaderValue};
use axum::response::{IntoResponse, Response};
use futures::TryStreamExt;
use tracing::{debug, info};

use super::handle::StreamHandle;
use crate::resolver::errors::ResolveError;
use crate::resolver::models::{AudioMetadata, AudioSource, ResolvedAudio};
use crate::resolver::utils::{error_for_status, is_blocking_status};

/// Metadata plus a byte source that is already flowing.
#[derive(Debug)]
pub struct LiveAudio {
    pub metadata: AudioMetadata,
    pub handle: StreamHandle,
}

impl LiveAudio {
    /// Value for the outgoing `Content-Type`: the mime type up to the first `;`.
    pub fn content_type(&self) -> &str {
        self.metadata
            .mime_or_default()
            .split(';')
            .next()
            .map(str::trim)
            .unwrap_or_default()
    }
}

impl IntoResponse for LiveAudio {
    fn into_response(self) -> Response {
        let content_type = self.content_type().to_string();
        let content_length = self.metadata.content_length;
        info!(
            source = self.handle.label(),
            content_type = %content_type,
            content_length,
            "streaming audio"
        );

        let mut response = Response::new(Body::from_stream(self.handle));
        let headers = response.headers_mut();
        if let Ok(value) = HeaderValue::from_str(&content_type) {
            headers.insert(header::CONTENT_TYPE, value);
        }
        if content_length > 0 {
            headers.insert(header::CONTENT_LENGTH, HeaderValue::from(content_length));
        }
        headers.insert(header::ACCEPT_RANGES, HeaderValue::from_static("bytes"));
        response
    }
}

/// A source that could not be opened, with the upstream status if one arrived.
#[derive(Debug)]
pub struct OpenError {
    pub status: Option<u16>,
    pub error: ResolveError,
}

impl OpenError {
    /// The media host refused this client (410 or 429).
    pub fn is_blocked(&self) -> bool {
        self.status.is_some_and(is_blocking_status)
    }
}

impl From<ResolveError> for OpenError {
    fn from(error: ResolveError) -> Self {
        Self {
            status: None,
            error,
        }
    }
}

impl From<reqwest::Error> for OpenError {
    fn from(e: reqwest::Error) -> Self {
        ResolveError::from(e).into()
    }
}

impl From<OpenError> for ResolveError {
    fn from(e: OpenError) -> Self {
        e.error
    }
}

pub struct StreamPipeline {
    client: reqwest::Client,
}

impl StreamPipeline {
    pub fn new(client: reqwest::Client) -> Self {
        Self { client }
    }

    /// Make sure bytes are flowing: URL sources are opened, live sources pass through.
    ///
    /// Failing here happens before any header is sent, so the caller can still
    /// treat it as an ordinary resolution failure.
    pub async fn open(&self, audio: ResolvedAudio) -> Result<LiveAudio, OpenError> {
        match audio.source {
            AudioSource::Live(handle) => Ok(LiveAudio {
                metadata: audio.metadata,
                handle,
            }),
            AudioSource::Url(url) => self.open_url(audio.metadata, &url).await,
        }
    }

    async fn open_url(
        &self,
        mut metadata: AudioMetadata,
        url: &str,
    ) -> Result<LiveAudio, OpenError> {
        debug!(url, "opening upstream media URL");
        let response = self.client.get(url).send().await?;

        let status = response.status();
        if !status.is_success() {
            return Err(OpenError {
                status: Some(status.as_u16()),
                error: error_for_status(status.as_u16(), format!("media URL {}", url)),
            });
        }

        if metadata.mime_type.is_none() {
            metadata.mime_type = response
                .headers()
                .get(header::CONTENT_TYPE)
                .and_then(|v| v.to_str().ok())
                .map(str::to_string);
        }
        // Only the upstream's own length is trusted for the outgoing header
        metadata.content_length = response.content_length().unwrap_or(0);

        let host = response
            .url()
            .host_str()
            .unwrap_or("upstream")
            .to_string();
        let body = response.bytes_stream().map_err(io::Error::other);

        Ok(LiveAudio {
            metadata,
            handle: StreamHandle::from_stream(body, format!("http:{}", host)),
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use axum::http::StatusCode;
    use axum::routing::get;
    use axum::Router;
    use bytes::Bytes;
    use futures::{stream, StreamExt};

    async fn serve(router: Router) -> String {
        let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        tokio::spawn(async move {
            axum::serve(listener, router).await.unwrap();
        });
        format!("http://{}", addr)
    }

    fn media_router() -> Router {
        Router::new()
            .route(
                "/audio",
                get(|| async { ([(header::CONTENT_TYPE, "audio/webm")], "0123456789") }),
            )
            .route("/moved", get(|| async { axum::response::Redirect::temporary("/audio") }))
            .route("/gone", get(|| async { StatusCode::GONE }))
            .route("/missing", get(|| async { StatusCode::NOT_FOUND }))
    }

    #[tokio::test]
    async fn test_opens_url_and_fills_headers() {
        let base = serve(media_router()).await;
        let pipeline = StreamPipeline::new(reqwest::Client::new());
        let audio = ResolvedAudio::from_url(AudioMetadata::new("t", "a"), format!("{}/moved", base));

        let mut live = pipeline.open(audio).await.unwrap();
        assert_eq!(live.content_type(), "audio/webm");
        assert_eq!(live.metadata.content_length, 10);

        let mut body = Vec::new();
        while let Some(chunk) = live.handle.next().await {
            body.extend_from_slice(&chunk.unwrap());
        }
        assert_eq!(body, b"0123456789");
    }

    #[tokio::test]
    async fn test_resolved_mime_wins_over_upstream() {
        let base = serve(media_router()).await;
        let pipeline = StreamPipeline::new(reqwest::Client::new());
        let metadata = AudioMetadata::new("t", "a")
            .with_mime_type(Some("audio/mp4; codecs=\"mp4a.40.2\"".into()));
        let live = pipeline
            .open(ResolvedAudio::from_url(metadata, format!("{}/audio", base)))
            .await
            .unwrap();
        assert_eq!(live.content_type(), "audio/mp4");
    }

    #[tokio::test]
    async fn test_gone_url_is_not_found_and_blocked() {
        let base = serve(media_router()).await;
        let pipeline = StreamPipeline::new(reqwest::Client::new());
        let audio = ResolvedAudio::from_url(AudioMetadata::new("t", "a"), format!("{}/gone", base));
        let err = pipeline.open(audio).await.unwrap_err();
        assert_eq!(err.status, Some(410));
        assert!(err.is_blocked());
        assert!(matches!(err.error, ResolveError::NotFound(_)));
    }

    #[tokio::test]
    async fn test_missing_url_is_not_blocked() {
        let base = serve(media_router()).await;
        let pipeline = StreamPipeline::new(reqwest::Client::new());
        let audio =
            ResolvedAudio::from_url(AudioMetadata::new("t", "a"), format!("{}/missing", base));
        let err = pipeline.open(audio).await.unwrap_err();
        assert!(!err.is_blocked());
        assert!(matches!(ResolveError::from(err), ResolveError::NotFound(_)));
    }

    #[test]
    fn test_response_headers() {
        let chunks = vec![Ok(Bytes::from_static(b"abcd"))];
        let live = LiveAudio {
            metadata: AudioMetadata::new("t", "a")
                .with_mime_type(Some("audio/webm; codecs=\"opus\"".into()))
                .with_content_length(4),
            handle: StreamHandle::from_stream(stream::iter(chunks), "test"),
        };
        let response = IntoResponse::into_response(live);
        let headers = response.headers();
        assert_eq!(headers[header::CONTENT_TYPE], "audio/webm");
        assert_eq!(headers[header::CONTENT_LENGTH], "4");
        assert_eq!(headers[header::ACCEPT_RANGES], "bytes");
    }

    #[test]
    fn test_unknown_length_omits_header() {
        let live = LiveAudio {
            metadata: AudioMetadata::new("t", "a"),
            handle: StreamHandle::from_stream(stream::empty(), "test"),
        };
        let response = IntoResponse::into_response(live);
        assert!(response.headers().get(header::CONTENT_LENGTH).is_none());
        assert_eq!(response.headers()[header::CONTENT_TYPE], "audio/mp4");
    }
}
