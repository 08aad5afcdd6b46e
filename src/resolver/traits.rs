// Resolver trait definition

use async_trait::async_trait;

use super::errors::ResolveError;
use super::models::{ContentId, ResolvedAudio, ResolverId};
use super::policy::ResolverConfig;

/// Tagged result of one resolver attempt.
///
/// `Redirect` is control flow, not an error: the orchestrator jumps to the
/// named resolver instead of continuing down the list.
#[derive(Debug)]
pub enum ResolutionOutcome {
    Success(ResolvedAudio),
    Redirect(ResolverId),
    Failure(ResolveError),
}

impl ResolutionOutcome {
    pub fn is_success(&self) -> bool {
        matches!(self, Self::Success(_))
    }
}

impl From<Result<ResolvedAudio, ResolveError>> for ResolutionOutcome {
    fn from(result: Result<ResolvedAudio, ResolveError>) -> Self {
        match result {
            Ok(audio) => Self::Success(audio),
            Err(e) => Self::Failure(e),
        }
    }
}

/// Trait for audio source resolution strategies
#[async_trait]
pub trait ProviderResolver: Send + Sync {
    fn id(&self) -> ResolverId;

    /// Name of the resolver (for logging)
    fn name(&self) -> &'static str;

    /// Obtain title/author/duration plus a source URL or enough to stream.
    async fn resolve_metadata(&self, id: &ContentId, config: &ResolverConfig)
        -> ResolutionOutcome;

    /// Obtain a byte source, whether or not `resolve_metadata` ran first.
    async fn produce_stream(&self, id: &ContentId, config: &ResolverConfig) -> ResolutionOutcome;

    /// Resolver to hand over to when the media URL this resolver produced
    /// answers 410 or 429 while being opened for streaming.
    fn blocked_handover(&self) -> Option<ResolverId> {
        None
    }
}
