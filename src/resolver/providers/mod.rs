// Concrete resolution strategies

pub mod embedded;
pub mod native;
pub mod oembed;
pub mod relay;

use std::sync::Arc;

pub use embedded::EmbeddedPlayerResolver;
pub use native::NativeExtractorResolver;
pub use oembed::MinimalMetadataResolver;
pub use relay::{InvidiousRelayResolver, PipedRelayResolver, DEFAULT_PIPED_API, DEFAULT_RELAY_INSTANCES};

use super::traits::ProviderResolver;

/// One instance of every resolver, sharing `client` for outbound HTTP.
pub fn default_resolvers(
    client: reqwest::Client,
    relay_instances: Vec<String>,
    piped_api: &str,
) -> Vec<Arc<dyn ProviderResolver>> {
    vec![
        Arc::new(NativeExtractorResolver::new()),
        Arc::new(EmbeddedPlayerResolver::persona_a(client.clone())),
        Arc::new(EmbeddedPlayerResolver::persona_b(client.clone())),
        Arc::new(InvidiousRelayResolver::new(client.clone(), relay_instances)),
        Arc::new(PipedRelayResolver::new(client.clone(), piped_api)),
        Arc::new(MinimalMetadataResolver::new(client)),
    ]
}
