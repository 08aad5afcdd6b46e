// Audio source resolution: policy, fallback orchestration and providers

pub mod cache;
pub mod diagnostics;
pub mod errors;
pub mod format_selector;
pub mod models;
pub mod orchestrator;
pub mod policy;
pub mod providers;
pub mod traits;
pub mod utils;

pub use cache::MetadataCache;
pub use errors::{AttemptFailure, ResolveError};
pub use format_selector::FormatSelector;
pub use models::{AudioMetadata, AudioSource, CodecKind, ContentId, MediaFormat, ResolvedAudio, ResolverId};
pub use orchestrator::FallbackOrchestrator;
pub use policy::{CookieSource, DeploymentEnv, EnvironmentPolicy, PolicyPaths, ResolverConfig};
pub use traits::{ProviderResolver, ResolutionOutcome};
