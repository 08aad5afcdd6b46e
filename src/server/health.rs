// Health report - filesystem probes independent of the resolver policy

use std::path::PathBuf;
use std::time::{Duration, Instant, SystemTime};

use serde::Serialize;
use time::format_description::well_known::Rfc3339;
use time::OffsetDateTime;

use crate::resolver::policy::{DeploymentEnv, PolicyFlags, COOKIE_FILE_NAMES, TOOL_BINARY};
use crate::resolver::utils::run_output_with_timeout;

const VERSION_TIMEOUT: Duration = Duration::from_secs(5);

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum ServiceStatus {
    Ok,
    Missing,
    Error,
}

#[derive(Debug, Clone, Serialize)]
pub struct ToolReport {
    pub status: ServiceStatus,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub path: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub version: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

#[derive(Debug, Clone, Serialize)]
pub struct ConfigReport {
    pub status: ServiceStatus,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub path: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub fallback_only: Option<bool>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub embed_url: Option<bool>,
}

#[derive(Debug, Clone, Serialize)]
pub struct CookieReport {
    pub status: ServiceStatus,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub path: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub size: Option<u64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub modified: Option<String>,
}

#[derive(Debug, Clone, Serialize)]
pub struct Services {
    pub native_tool: ToolReport,
    pub config: ConfigReport,
    pub cookies: CookieReport,
}

#[derive(Debug, Clone, Serialize)]
pub struct HealthReport {
    pub status: ServiceStatus,
    pub uptime_secs: u64,
    pub timestamp: String,
    pub version: &'static str,
    pub environment: DeploymentEnv,
    pub services: Services,
    pub check_time_ms: u64,
}

/// Probes `base_dir` the way an operator would check a deployment by hand.
#[derive(Debug, Clone)]
pub struct HealthProbe {
    base_dir: PathBuf,
    environment: DeploymentEnv,
    search_dirs: Vec<PathBuf>,
}

impl HealthProbe {
    pub fn new(base_dir: impl Into<PathBuf>, environment: DeploymentEnv) -> Self {
        let mut search_dirs: Vec<PathBuf> = ["/opt/homebrew/bin", "/usr/local/bin", "/usr/bin"]
            .iter()
            .map(PathBuf::from)
            .collect();
        if let Some(path_var) = std::env::var_os("PATH") {
            search_dirs.extend(std::env::split_paths(&path_var));
        }
        Self {
            base_dir: base_dir.into(),
            environment,
            search_dirs,
        }
    }

    /// Restrict tool lookup to `dirs` after the project `bin/` directory.
    pub fn with_search_dirs(mut self, dirs: Vec<PathBuf>) -> Self {
        self.search_dirs = dirs;
        self
    }

    pub async fn check(&self, started_at: Instant) -> HealthReport {
        let begin = Instant::now();
        let native_tool = self.check_tool().await;
        let config = self.check_config();
        let cookies = self.check_cookies();

        // Without the extractor production has no primary resolver
        let status = if self.environment == DeploymentEnv::Production
            && native_tool.status != ServiceStatus::Ok
        {
            ServiceStatus::Error
        } else {
            ServiceStatus::Ok
        };

        HealthReport {
            status,
            uptime_secs: started_at.elapsed().as_secs(),
            timestamp: rfc3339(SystemTime::now()),
            version: env!("CARGO_PKG_VERSION"),
            environment: self.environment,
            services: Services {
                native_tool,
                config,
                cookies,
            },
            check_time_ms: begin.elapsed().as_millis() as u64,
        }
    }

    fn locate_tool(&self) -> Option<PathBuf> {
        let local = self.base_dir.join("bin").join(TOOL_BINARY);
        if local.is_file() {
            return Some(local);
        }
        self.search_dirs
            .iter()
            .map(|dir| dir.join(TOOL_BINARY))
            .find(|candidate| candidate.is_file())
    }

    async fn check_tool(&self) -> ToolReport {
        let Some(path) = self.locate_tool() else {
            return ToolReport {
                status: ServiceStatus::Missing,
                path: None,
                version: None,
                error: None,
            };
        };

        let display = path.display().to_string();
        match run_output_with_timeout(&display, &["--version".to_string()], VERSION_TIMEOUT)
            .await
        {
            Ok(output) if output.status.success() => ToolReport {
                status: ServiceStatus::Ok,
                path: Some(display),
                version: Some(String::from_utf8_lossy(&output.stdout).trim().to_string()),
                error: None,
            },
            Ok(output) => ToolReport {
                status: ServiceStatus::Error,
                path: Some(display),
                version: None,
                error: Some(String::from_utf8_lossy(&output.stderr).trim().to_string()),
            },
            Err(e) => ToolReport {
                status: ServiceStatus::Error,
                path: Some(display),
                version: None,
                error: Some(e),
            },
        }
    }

    fn check_config(&self) -> ConfigReport {
        let path = self.base_dir.join("config").join("yt-dlp.conf");
        match std::fs::read_to_string(&path) {
            Ok(text) => {
                let flags = PolicyFlags::parse(&text);
                ConfigReport {
                    status: ServiceStatus::Ok,
                    path: Some(path.display().to_string()),
                    fallback_only: Some(flags.fallback_only),
                    embed_url: Some(flags.embed_url),
                }
            }
            Err(_) => ConfigReport {
                status: ServiceStatus::Missing,
                path: None,
                fallback_only: None,
                embed_url: None,
            },
        }
    }

    fn check_cookies(&self) -> CookieReport {
        let found = COOKIE_FILE_NAMES
            .iter()
            .map(|name| self.base_dir.join(name))
            .find_map(|path| std::fs::metadata(&path).ok().map(|meta| (path, meta)));

        match found {
            Some((path, meta)) => CookieReport {
                status: ServiceStatus::Ok,
                path: Some(path.display().to_string()),
                size: Some(meta.len()),
                modified: meta.modified().ok().map(rfc3339),
            },
            None => CookieReport {
                status: ServiceStatus::Missing,
                path: None,
                size: None,
                modified: None,
            },
        }
    }
}

fn rfc3339(at: SystemTime) -> String {
    OffsetDateTime::from(at)
        .format(&Rfc3339)
        .unwrap_or_else(|_| "unknown".to_string())
}
