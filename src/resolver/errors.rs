// Error taxonomy shared by every resolver, the orchestrator and the HTTP layer

use std::fmt;

use super::diagnostics::diagnose;
use super::models::ResolverId;

/// Last failure reported by one resolver during a request.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AttemptFailure {
    pub resolver: ResolverId,
    pub error: ResolveError,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ResolveError {
    /// Content identifier is missing or malformed
    InvalidIdentifier(String),

    /// Content removed, private or never existed
    NotFound(String),

    /// Platform or relay answered 429 / "too many requests"
    RateLimited(String),

    /// Platform demands interactive verification (bot check, login, age gate)
    AuthRequired(String),

    /// Copyright or region block
    Restricted(String),

    /// Non-2xx answer, transport failure, timeout or failed subprocess
    Upstream(String),

    /// Response had an unexpected shape
    Parse(String),

    /// Resolver returned an empty format list
    NoFormatAvailable,

    /// Every enabled resolver failed; holds the last error per resolver
    AllProvidersExhausted(Vec<AttemptFailure>),

    /// Client went away; never reported to the client
    ClientDisconnected,
}

impl ResolveError {
    /// Short machine-readable label used in JSON error bodies.
    pub fn kind(&self) -> &'static str {
        match self {
            Self::InvalidIdentifier(_) => "invalid_identifier",
            Self::NotFound(_) => "not_found",
            Self::RateLimited(_) => "rate_limited",
            Self::AuthRequired(_) => "auth_required",
            Self::Restricted(_) => "restricted",
            Self::Upstream(_) => "upstream_error",
            Self::Parse(_) => "parse_error",
            Self::NoFormatAvailable => "no_format_available",
            Self::AllProvidersExhausted(_) => "all_providers_exhausted",
            Self::ClientDisconnected => "client_disconnected",
        }
    }

    /// HTTP status the boundary reports for this error.
    ///
    /// Only `InvalidIdentifier` and `AllProvidersExhausted` are expected to
    /// reach the boundary; everything else maps to 500.
    pub fn status_code(&self) -> u16 {
        match self {
            Self::InvalidIdentifier(_) => 400,
            Self::AllProvidersExhausted(attempts) => {
                if attempts
                    .iter()
                    .any(|a| matches!(a.error, Self::Restricted(_)))
                {
                    403
                } else if !attempts.is_empty()
                    && attempts
                        .iter()
                        .all(|a| matches!(a.error, Self::NotFound(_)))
                {
                    404
                } else {
                    500
                }
            }
            _ => 500,
        }
    }
}

impl fmt::Display for ResolveError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::InvalidIdentifier(id) => write!(f, "Invalid content identifier: {:?}", id),
            Self::NotFound(msg) => write!(f, "Content not found: {}", msg),
            Self::RateLimited(msg) => write!(f, "Rate limited: {}", msg),
            Self::AuthRequired(msg) => write!(f, "Authentication required: {}", msg),
            Self::Restricted(msg) => write!(f, "Content blocked (copyright or region): {}", msg),
            Self::Upstream(msg) => write!(f, "Upstream error: {}", msg),
            Self::Parse(msg) => write!(f, "Parse error: {}", msg),
            Self::NoFormatAvailable => write!(f, "No playable format available"),
            Self::AllProvidersExhausted(attempts) => {
                write!(f, "All providers exhausted")?;
                if attempts.is_empty() {
                    return write!(f, " (no provider enabled)");
                }
                for (i, attempt) in attempts.iter().enumerate() {
                    let sep = if i == 0 { ": " } else { "; " };
                    write!(f, "{}{} -> {}", sep, attempt.resolver, attempt.error)?;
                }
                Ok(())
            }
            Self::ClientDisconnected => write!(f, "Client disconnected"),
        }
    }
}

impl std::error::Error for ResolveError {}

// Free-form messages (extractor stderr, relay bodies) are classified by pattern
impl From<String> for ResolveError {
    fn from(s: String) -> Self {
        match diagnose(&s) {
            Some(reason) => reason.into_error(s),
            None => Self::Upstream(s),
        }
    }
}

impl From<reqwest::Error> for ResolveError {
    fn from(e: reqwest::Error) -> Self {
        if e.is_timeout() {
            return Self::Upstream(format!("request timed out: {}", e));
        }
        if e.is_decode() {
            return Self::Parse(e.to_string());
        }
        match e.status() {
            Some(status) => super::utils::error_for_status(status.as_u16(), e.to_string()),
            None => Self::Upstream(e.to_string()),
        }
    }
}

impl From<serde_json::Error> for ResolveError {
    fn from(e: serde_json::Error) -> Self {
        Self::Parse(format!("Invalid JSON: {}", e))
    }
}
