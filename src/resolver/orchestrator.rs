// FallbackOrchestrator - drives the ordered resolver list for one request
//
// Strategy:
// 1. Ask the environment policy for the ordered plan
// 2. Try each resolver in turn, strictly one at a time
// 3. A redirect jumps straight to the named resolver, even one already tried,
//    but each resolver can be a redirect target only once per request
// 4. Exhaustion reports the last error of every resolver tried

use std::collections::{HashMap, HashSet};
use std::panic::AssertUnwindSafe;
use std::sync::Arc;
use std::time::Duration;

use futures::FutureExt;
use tokio::time::timeout;
use tracing::{debug, info, warn};

use super::errors::{AttemptFailure, ResolveError};
use super::models::{AudioSource, ContentId, ResolvedAudio, ResolverId};
use super::policy::{EnvironmentPolicy, PlannedResolver};
use super::traits::{ProviderResolver, ResolutionOutcome};
use crate::stream::{LiveAudio, StreamPipeline};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Stage {
    Metadata,
    Stream,
}

impl Stage {
    fn as_str(&self) -> &'static str {
        match self {
            Self::Metadata => "metadata",
            Self::Stream => "stream",
        }
    }
}

pub struct FallbackOrchestrator {
    policy: Arc<EnvironmentPolicy>,
    resolvers: HashMap<ResolverId, Arc<dyn ProviderResolver>>,
    pipeline: Arc<StreamPipeline>,
}

impl FallbackOrchestrator {
    pub fn new(policy: Arc<EnvironmentPolicy>, pipeline: Arc<StreamPipeline>) -> Self {
        Self {
            policy,
            resolvers: HashMap::new(),
            pipeline,
        }
    }

    /// Register a resolver; a later registration with the same id replaces it.
    pub fn with_resolver(mut self, resolver: Arc<dyn ProviderResolver>) -> Self {
        self.resolvers.insert(resolver.id(), resolver);
        self
    }

    pub fn with_resolvers(
        self,
        resolvers: impl IntoIterator<Item = Arc<dyn ProviderResolver>>,
    ) -> Self {
        resolvers
            .into_iter()
            .fold(self, |orchestrator, r| orchestrator.with_resolver(r))
    }

    /// Metadata and a source (URL or live) from the first resolver that succeeds.
    pub async fn resolve_metadata(&self, id: &ContentId) -> Result<ResolvedAudio, ResolveError> {
        self.run(id, Stage::Metadata).await
    }

    /// A flowing byte source, opened before any response header is written.
    pub async fn resolve_stream(&self, id: &ContentId) -> Result<LiveAudio, ResolveError> {
        let audio = self.run(id, Stage::Stream).await?;
        match audio.source {
            AudioSource::Live(handle) => Ok(LiveAudio {
                metadata: audio.metadata,
                handle,
            }),
            AudioSource::Url(url) => Err(ResolveError::Upstream(format!(
                "stream source {} was not opened",
                url
            ))),
        }
    }

    async fn run(&self, id: &ContentId, stage: Stage) -> Result<ResolvedAudio, ResolveError> {
        self.policy.refresh_if_incomplete();
        let plan = self.policy.plan();
        debug!(
            content_id = %id,
            stage = stage.as_str(),
            plan = ?plan.iter().map(|p| p.id.as_str()).collect::<Vec<_>>(),
            "resolution plan"
        );

        let mut visited: HashSet<ResolverId> = HashSet::new();
        let mut redirected_into: HashSet<ResolverId> = HashSet::new();
        let mut failures: Vec<AttemptFailure> = Vec::new();
        let mut cursor = 0;
        let mut jump: Option<usize> = None;

        loop {
            // After a jump, iteration continues from the target's position and
            // skips whatever already ran
            let index = match jump.take() {
                Some(index) => index,
                None => match (cursor..plan.len()).find(|i| !visited.contains(&plan[*i].id)) {
                    Some(index) => index,
                    None => break,
                },
            };
            let planned = &plan[index];
            visited.insert(planned.id);
            cursor = index + 1;

            let Some(resolver) = self.resolvers.get(&planned.id) else {
                warn!(resolver = %planned.id, "resolver planned but not registered, skipping");
                continue;
            };

            info!(
                content_id = %id,
                resolver = %planned.id,
                stage = stage.as_str(),
                "trying resolver"
            );

            match self.attempt(resolver.as_ref(), id, planned, stage).await {
                ResolutionOutcome::Success(audio) => {
                    info!(content_id = %id, resolver = %planned.id, title = %audio.metadata.title, "resolved");
                    return Ok(audio);
                }
                ResolutionOutcome::Redirect(target) => {
                    match plan.iter().position(|p| p.id == target) {
                        Some(target_index) if !redirected_into.contains(&target) => {
                            redirected_into.insert(target);
                            info!(
                                content_id = %id,
                                from = %planned.id,
                                to = %target,
                                rerun = visited.contains(&target),
                                "resolver redirected"
                            );
                            jump = Some(target_index);
                        }
                        Some(_) => {
                            warn!(from = %planned.id, to = %target, "second redirect into resolver refused");
                            record(
                                &mut failures,
                                planned.id,
                                ResolveError::Upstream(format!(
                                    "redirect to {} refused: already redirected to once",
                                    target
                                )),
                            );
                        }
                        None => {
                            warn!(from = %planned.id, to = %target, "redirect target not enabled");
                            record(
                                &mut failures,
                                planned.id,
                                ResolveError::Upstream(format!("redirect to {} refused: not enabled", target)),
                            );
                        }
                    }
                }
                ResolutionOutcome::Failure(error) => {
                    warn!(content_id = %id, resolver = %planned.id, error = %error, "resolver failed");
                    record(&mut failures, planned.id, error);
                }
            }
        }

        let exhausted = ResolveError::AllProvidersExhausted(failures);
        warn!(content_id = %id, stage = stage.as_str(), error = %exhausted, "all resolvers failed");
        Err(exhausted)
    }

    /// One bounded attempt. Timeouts and panics become upstream failures so
    /// the chain keeps advancing.
    async fn attempt(
        &self,
        resolver: &dyn ProviderResolver,
        id: &ContentId,
        planned: &PlannedResolver,
        stage: Stage,
    ) -> ResolutionOutcome {
        let config = &planned.config;
        let work = async {
            match stage {
                Stage::Metadata => resolver.resolve_metadata(id, config).await,
                Stage::Stream => match resolver.produce_stream(id, config).await {
                    ResolutionOutcome::Success(audio) => {
                        match self.pipeline.open(audio).await {
                            Ok(live) => ResolutionOutcome::Success(ResolvedAudio::live(
                                live.metadata,
                                live.handle,
                            )),
                            Err(e) => match resolver.blocked_handover() {
                                Some(target) if e.is_blocked() => {
                                    info!(
                                        resolver = %planned.id,
                                        status = ?e.status,
                                        to = %target,
                                        "media URL blocked, handing over"
                                    );
                                    ResolutionOutcome::Redirect(target)
                                }
                                _ => ResolutionOutcome::Failure(e.error),
                            },
                        }
                    }
                    other => other,
                },
            }
        };

        let budget = match stage {
            Stage::Metadata => config.metadata_budget(),
            Stage::Stream => config.stream_budget(),
        };
        let limit = attempt_limit(budget);
        match timeout(limit, AssertUnwindSafe(work).catch_unwind()).await {
            Ok(Ok(outcome)) => outcome,
            Ok(Err(_)) => {
                warn!(resolver = %planned.id, "resolver panicked");
                ResolutionOutcome::Failure(ResolveError::Upstream(format!(
                    "{} resolver panicked",
                    planned.id
                )))
            }
            Err(_) => ResolutionOutcome::Failure(ResolveError::Upstream(format!(
                "{} timed out after {:.1}s",
                planned.id,
                limit.as_secs_f64()
            ))),
        }
    }
}

// Leaves the resolver's own deadline room to fire first
fn attempt_limit(budget: Duration) -> Duration {
    budget + Duration::from_secs(1)
}

/// Keep only the last error per resolver, in first-attempt order.
fn record(failures: &mut Vec<AttemptFailure>, resolver: ResolverId, error: ResolveError) {
    match failures.iter_mut().find(|f| f.resolver == resolver) {
        Some(existing) => existing.error = error,
        None => failures.push(AttemptFailure { resolver, error }),
    }
}
