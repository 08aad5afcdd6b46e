// EnvironmentPolicy - decides which resolvers run, in what order, with what auth
//
// Probes the filesystem for the extraction tool, the optional resolver
// configuration file and a cookie file. Probing only ever refines what is
// known (a found tool is never forgotten), so `refresh` may run from any
// number of concurrent requests.

use std::fmt;
use std::path::PathBuf;
use std::str::FromStr;
use std::time::Duration;

use parking_lot::RwLock;
use serde::{Deserialize, Serialize};
use tracing::{debug, info};

use super::models::ResolverId;
use super::utils::browser_headers;

#[cfg(windows)]
pub const TOOL_BINARY: &str = "yt-dlp.exe";
#[cfg(not(windows))]
pub const TOOL_BINARY: &str = "yt-dlp";

/// Platform-specific cookie file first, generic name second
pub const COOKIE_FILE_NAMES: [&str; 2] = ["www.youtube.com_cookies.txt", "cookies.txt"];

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, clap::ValueEnum)]
#[serde(rename_all = "lowercase")]
pub enum DeploymentEnv {
    Development,
    Production,
}

impl DeploymentEnv {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Development => "development",
            Self::Production => "production",
        }
    }
}

impl fmt::Display for DeploymentEnv {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for DeploymentEnv {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_lowercase().as_str() {
            "development" | "dev" => Ok(Self::Development),
            "production" | "prod" => Ok(Self::Production),
            other => Err(format!("unknown environment: {}", other)),
        }
    }
}

/// Where cookies come from. The extractor accepts one or the other, never both.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum CookieSource {
    File(PathBuf),
    /// Name of a local browser whose cookie jar is read (chrome, safari, firefox)
    Browser(String),
}

/// Per-resolver auth and behavior parameters.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ResolverConfig {
    pub cookie_source: Option<CookieSource>,
    /// Spoofed browser headers, user agent first
    pub headers: Vec<(String, String)>,
    pub use_embed_url: bool,
    pub alternate_persona: bool,
    pub proxy: Option<String>,
    /// Resolved extractor executable, native resolver only
    pub tool_path: Option<PathBuf>,
    /// Bound on a single network call or subprocess step
    pub timeout: Duration,
}

impl Default for ResolverConfig {
    fn default() -> Self {
        Self {
            cookie_source: None,
            headers: browser_headers(),
            use_embed_url: false,
            alternate_persona: false,
            proxy: None,
            tool_path: None,
            timeout: Duration::from_secs(30),
        }
    }
}

impl ResolverConfig {
    pub fn with_cookie_source(mut self, source: Option<CookieSource>) -> Self {
        self.cookie_source = source;
        self
    }

    pub fn with_embed_url(mut self, enabled: bool) -> Self {
        self.use_embed_url = enabled;
        self
    }

    pub fn with_alternate_persona(mut self, enabled: bool) -> Self {
        self.alternate_persona = enabled;
        self
    }

    pub fn with_proxy(mut self, proxy: Option<String>) -> Self {
        self.proxy = proxy;
        self
    }

    pub fn with_tool_path(mut self, path: Option<PathBuf>) -> Self {
        self.tool_path = path;
        self
    }

    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = timeout;
        self
    }

    /// Whole metadata attempt: a probe plus its embed-URL retry.
    pub fn metadata_budget(&self) -> Duration {
        self.timeout * 2
    }

    /// Whole stream attempt: the metadata budget plus the wait for first bytes.
    pub fn stream_budget(&self) -> Duration {
        self.timeout * 3
    }

    pub fn user_agent(&self) -> Option<&str> {
        self.headers
            .iter()
            .find(|(name, _)| name.eq_ignore_ascii_case("user-agent"))
            .map(|(_, value)| value.as_str())
    }
}

/// Filesystem locations the policy probes.
#[derive(Debug, Clone)]
pub struct PolicyPaths {
    pub base_dir: PathBuf,
    /// Project-local executable, checked first
    pub local_tool: PathBuf,
    pub config_file: PathBuf,
    pub cookie_candidates: Vec<PathBuf>,
    /// OS search path followed by common install locations
    pub search_dirs: Vec<PathBuf>,
}

impl PolicyPaths {
    pub fn new(base_dir: impl Into<PathBuf>) -> Self {
        let mut paths = Self::isolated(base_dir);

        if let Some(path_var) = std::env::var_os("PATH") {
            paths.search_dirs.extend(std::env::split_paths(&path_var));
        }
        for dir in ["/usr/bin", "/usr/local/bin", "/opt/homebrew/bin"] {
            paths.search_dirs.push(PathBuf::from(dir));
        }
        if let Some(home) = dirs::home_dir() {
            paths.search_dirs.push(home.join(".local").join("bin"));
        }
        paths
    }

    /// Only project-local locations, no OS search path.
    pub fn isolated(base_dir: impl Into<PathBuf>) -> Self {
        let base_dir = base_dir.into();
        Self {
            local_tool: base_dir.join("bin").join(TOOL_BINARY),
            config_file: base_dir.join("config").join("yt-dlp.conf"),
            cookie_candidates: COOKIE_FILE_NAMES
                .iter()
                .map(|name| base_dir.join(name))
                .collect(),
            search_dirs: Vec::new(),
            base_dir,
        }
    }

    pub fn find_tool(&self) -> Option<PathBuf> {
        if self.local_tool.is_file() {
            return Some(self.local_tool.clone());
        }
        self.search_dirs
            .iter()
            .map(|dir| dir.join(TOOL_BINARY))
            .find(|candidate| candidate.is_file())
    }

    pub fn find_cookie_file(&self) -> Option<PathBuf> {
        self.cookie_candidates
            .iter()
            .find(|path| path.is_file())
            .cloned()
    }

    pub fn read_flags(&self) -> Option<PolicyFlags> {
        std::fs::read_to_string(&self.config_file)
            .ok()
            .map(|text| PolicyFlags::parse(&text))
    }
}

/// Flags read from the resolver configuration file.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct PolicyFlags {
    /// Try the embed URL before the watch URL
    pub embed_url: bool,
    /// Skip the native executable entirely
    pub fallback_only: bool,
}

impl PolicyFlags {
    /// Parse `key=value` lines; `#` starts a comment.
    pub fn parse(text: &str) -> Self {
        let mut flags = Self::default();
        for line in text.lines() {
            let line = line.split('#').next().unwrap_or("").trim();
            let Some((key, value)) = line.split_once('=') else {
                continue;
            };
            let enabled = matches!(
                value.trim().to_lowercase().as_str(),
                "true" | "1" | "yes" | "on"
            );
            match key.trim() {
                "embed_url" => flags.embed_url = enabled,
                "fallback_only" => flags.fallback_only = enabled,
                _ => {}
            }
        }
        flags
    }
}

/// What the probes have found so far.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ProbeState {
    pub tool_path: Option<PathBuf>,
    pub cookie_file: Option<PathBuf>,
    pub flags: PolicyFlags,
    pub config_present: bool,
}

impl ProbeState {
    fn is_complete(&self) -> bool {
        self.tool_path.is_some() && self.cookie_file.is_some() && self.config_present
    }
}

/// One entry of the ordered plan handed to the orchestrator.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PlannedResolver {
    pub id: ResolverId,
    pub config: ResolverConfig,
}

pub struct EnvironmentPolicy {
    env: DeploymentEnv,
    paths: PolicyPaths,
    proxy: Option<String>,
    attempt_timeout: Duration,
    order_override: Option<Vec<ResolverId>>,
    state: RwLock<ProbeState>,
}

impl EnvironmentPolicy {
    pub fn new(env: DeploymentEnv, paths: PolicyPaths) -> Self {
        let policy = Self {
            env,
            paths,
            proxy: None,
            attempt_timeout: Duration::from_secs(30),
            order_override: None,
            state: RwLock::new(ProbeState::default()),
        };
        policy.refresh();

        let state = policy.snapshot();
        info!(
            environment = %env,
            tool = ?state.tool_path,
            cookie_file = ?state.cookie_file,
            embed_url = state.flags.embed_url,
            fallback_only = state.flags.fallback_only,
            "environment policy initialised"
        );
        policy
    }

    pub fn with_proxy(mut self, proxy: Option<String>) -> Self {
        self.proxy = proxy;
        self
    }

    pub fn with_attempt_timeout(mut self, timeout: Duration) -> Self {
        self.attempt_timeout = timeout;
        self
    }

    /// Pin the resolver order instead of computing it from the environment.
    pub fn with_order_override(mut self, order: Option<Vec<ResolverId>>) -> Self {
        self.order_override = order.filter(|o| !o.is_empty());
        self
    }

    pub fn snapshot(&self) -> ProbeState {
        self.state.read().clone()
    }

    /// Re-run the probes. Returns whether anything new was found.
    pub fn refresh(&self) -> bool {
        let current = self.snapshot();
        let mut found = current.clone();

        if found.tool_path.is_none() {
            found.tool_path = self.paths.find_tool();
        }
        if found.cookie_file.is_none() {
            found.cookie_file = self.paths.find_cookie_file();
        }
        if let Some(flags) = self.paths.read_flags() {
            found.config_present = true;
            found.flags.embed_url |= flags.embed_url;
            found.flags.fallback_only |= flags.fallback_only;
        }

        if found == current {
            return false;
        }

        let mut state = self.state.write();
        // Merge rather than overwrite; another request may have refined too
        if state.tool_path.is_none() {
            state.tool_path = found.tool_path;
        }
        if state.cookie_file.is_none() {
            state.cookie_file = found.cookie_file;
        }
        state.config_present |= found.config_present;
        state.flags.embed_url |= found.flags.embed_url;
        state.flags.fallback_only |= found.flags.fallback_only;
        debug!(state = ?*state, "environment probes refined");
        true
    }

    /// Refresh only when some probed resource is still missing.
    pub fn refresh_if_incomplete(&self) {
        if !self.state.read().is_complete() {
            self.refresh();
        }
    }

    /// Ordered resolvers for one request, each with its configuration.
    pub fn plan(&self) -> Vec<PlannedResolver> {
        let state = self.snapshot();

        let order = match &self.order_override {
            Some(order) => order.clone(),
            None => self.default_order(&state),
        };

        order
            .into_iter()
            .map(|id| PlannedResolver {
                id,
                config: self.config_for(id, &state),
            })
            .collect()
    }

    fn default_order(&self, state: &ProbeState) -> Vec<ResolverId> {
        let fallback_only = state.flags.fallback_only;

        let mut order = Vec::with_capacity(ResolverId::ALL.len());
        if state.tool_path.is_some() && !fallback_only {
            order.push(ResolverId::Native);
        }
        // Production with fallback_only goes straight to the relays
        if self.env == DeploymentEnv::Development || !fallback_only {
            order.push(ResolverId::EmbeddedA);
            order.push(ResolverId::EmbeddedB);
        }
        order.extend([ResolverId::RelayA, ResolverId::RelayB, ResolverId::Minimal]);
        order
    }

    fn config_for(&self, id: ResolverId, state: &ProbeState) -> ResolverConfig {
        let base = ResolverConfig::default()
            .with_proxy(self.proxy.clone())
            .with_timeout(self.attempt_timeout);

        if id != ResolverId::Native {
            return base;
        }

        let base = base
            .with_tool_path(state.tool_path.clone())
            .with_embed_url(state.flags.embed_url);

        match self.env {
            DeploymentEnv::Development => base.with_cookie_source(Some(CookieSource::Browser(
                default_browser().to_string(),
            ))),
            DeploymentEnv::Production => base
                .with_cookie_source(state.cookie_file.clone().map(CookieSource::File))
                .with_alternate_persona(true),
        }
    }
}

/// Browser whose cookie jar development builds read from.
pub fn default_browser() -> &'static str {
    if cfg!(target_os = "windows") {
        "chrome"
    } else if cfg!(target_os = "macos") {
        "safari"
    } else {
        "firefox"
    }
}
