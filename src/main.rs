use clap::Parser;
use tracing_subscriber::EnvFilter;

use youtube_audio_proxy::config::AppConfig;

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| EnvFilter::new("youtube_audio_proxy=info,tower_http=warn")),
        )
        .init();

    let config = AppConfig::parse();
    youtube_audio_proxy::run(config).await
}
