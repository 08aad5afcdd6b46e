// Process configuration - command line flags with environment fallbacks

use std::net::SocketAddr;
use std::path::PathBuf;
use std::time::Duration;

use clap::Parser;

use crate::resolver::models::ResolverId;
use crate::resolver::policy::{DeploymentEnv, EnvironmentPolicy, PolicyPaths};
use crate::resolver::providers::{DEFAULT_PIPED_API, DEFAULT_RELAY_INSTANCES};

#[derive(Debug, Clone, Parser)]
#[command(name = "youtube-audio-proxy")]
#[command(about = "Resolves and proxies audio for video content identifiers")]
#[command(version)]
pub struct AppConfig {
    /// Interface to bind
    #[arg(long, env = "HOST", default_value = "0.0.0.0")]
    pub host: String,

    #[arg(short, long, env = "PORT", default_value_t = 5000)]
    pub port: u16,

    /// Selects the resolver plan
    #[arg(long, env = "APP_ENV", value_enum, default_value_t = DeploymentEnv::Development)]
    pub environment: DeploymentEnv,

    /// Directory holding bin/, config/ and cookie files (defaults to the working directory)
    #[arg(long, env = "APP_BASE_DIR")]
    pub base_dir: Option<PathBuf>,

    /// Upper bound for one network call or extractor step of a resolver attempt
    #[arg(long, env = "ATTEMPT_TIMEOUT_SECS", default_value_t = 30)]
    pub attempt_timeout_secs: u64,

    /// HTTP or SOCKS5 proxy for outbound requests and the extractor
    #[arg(long, env = "PROXY_URL")]
    pub proxy: Option<String>,

    /// Comma separated relay instance base URLs
    #[arg(long, env = "RELAY_INSTANCES", value_delimiter = ',')]
    pub relay_instances: Vec<String>,

    #[arg(long, env = "PIPED_API_URL", default_value = DEFAULT_PIPED_API)]
    pub piped_api: String,

    /// Comma separated resolver ids replacing the computed fallback order
    #[arg(long, env = "RESOLVER_ORDER", value_delimiter = ',')]
    pub resolver_order: Vec<ResolverId>,

    /// Metadata cache entries, 0 disables the cache
    #[arg(long, env = "METADATA_CACHE_CAPACITY", default_value_t = 256)]
    pub cache_capacity: usize,
}

impl AppConfig {
    pub fn base_dir(&self) -> PathBuf {
        self.base_dir
            .clone()
            .or_else(|| std::env::current_dir().ok())
            .unwrap_or_else(|| PathBuf::from("."))
    }

    pub fn policy_paths(&self) -> PolicyPaths {
        PolicyPaths::new(self.base_dir())
    }

    pub fn socket_addr(&self) -> Result<SocketAddr, String> {
        format!("{}:{}", self.host, self.port)
            .parse()
            .map_err(|e| format!("Invalid listen address {}:{}: {}", self.host, self.port, e))
    }

    pub fn attempt_timeout(&self) -> Duration {
        Duration::from_secs(self.attempt_timeout_secs.max(1))
    }

    /// Configured relay instances, or the built-in list when none are given.
    pub fn relay_instances(&self) -> Vec<String> {
        let configured: Vec<String> = self
            .relay_instances
            .iter()
            .map(|s| s.trim().trim_end_matches('/').to_string())
            .filter(|s| !s.is_empty())
            .collect();
        if configured.is_empty() {
            DEFAULT_RELAY_INSTANCES.iter().map(|s| s.to_string()).collect()
        } else {
            configured
        }
    }

    pub fn resolver_order(&self) -> Option<Vec<ResolverId>> {
        if self.resolver_order.is_empty() {
            None
        } else {
            Some(self.resolver_order.clone())
        }
    }

    pub fn build_policy(&self) -> EnvironmentPolicy {
        EnvironmentPolicy::new(self.environment, self.policy_paths())
            .with_proxy(self.proxy.clone())
            .with_attempt_timeout(self.attempt_timeout())
            .with_order_override(self.resolver_order())
    }
}
