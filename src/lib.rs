pub mod config;
pub mod resolver;
pub mod server;
pub mod stream;

use std::sync::Arc;

use tracing::info;

use config::AppConfig;
use resolver::cache::MetadataCache;
use resolver::orchestrator::FallbackOrchestrator;
use resolver::providers::default_resolvers;
use resolver::utils::build_http_client;
use server::{AppState, HealthProbe};
use stream::StreamPipeline;

/// Wire every component from `config` into the application state.
pub fn build_state(config: &AppConfig) -> Result<AppState, Box<dyn std::error::Error>> {
    let client = build_http_client(config.proxy.as_deref(), config.attempt_timeout())?;
    let policy = Arc::new(config.build_policy());
    let pipeline = Arc::new(StreamPipeline::new(client.clone()));

    let orchestrator = FallbackOrchestrator::new(policy, pipeline).with_resolvers(
        default_resolvers(client, config.relay_instances(), &config.piped_api),
    );

    Ok(AppState::new(
        orchestrator,
        MetadataCache::new(config.cache_capacity),
        HealthProbe::new(config.base_dir(), config.environment),
    ))
}

pub async fn run(config: AppConfig) -> Result<(), Box<dyn std::error::Error>> {
    let addr = config.socket_addr()?;
    let state = build_state(&config)?;

    let listener = tokio::net::TcpListener::bind(addr).await?;
    info!(
        %addr,
        environment = %config.environment,
        base_dir = %config.base_dir().display(),
        "audio proxy listening"
    );

    axum::serve(listener, server::router(state))
        .with_graceful_shutdown(shutdown_signal())
        .await?;
    info!("server stopped");
    Ok(())
}

async fn shutdown_signal() {
    if tokio::signal::ctrl_c().await.is_ok() {
        info!("shutdown requested");
    }
}
