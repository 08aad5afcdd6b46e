// Blocking diagnostics - identifies why the platform refused a request
//
// Analyzes extractor stderr, relay error bodies and player playability
// reasons to determine the failure kind the orchestrator should record.

use lazy_static::lazy_static;
use regex::Regex;
use serde::{Deserialize, Serialize};

use super::errors::ResolveError;

lazy_static! {
    static ref HTTP_STATUS_RE: Regex = Regex::new(r"(?i)HTTP Error (\d{3})").unwrap();
}

/// Reasons why the platform might refuse a request
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum BlockingReason {
    /// Removed for copyright
    CopyrightBlocked,

    /// Not available in the caller's country
    GeoBlocked,

    /// Bot check ("confirm you're not a bot")
    BotDetection,

    /// Age-restricted content requiring login
    AgeRestricted,

    /// Private video
    PrivateVideo,

    /// Deleted or never existed
    VideoUnavailable,

    /// Members-only or other login wall
    LoginRequired,

    /// 429 or similar
    RateLimited,

    /// HTTP 403 without a more specific reason
    Http403Forbidden,

    /// Network timeout (soft IP block)
    NetworkTimeout,
}

impl BlockingReason {
    pub fn description(&self) -> &'static str {
        match self {
            Self::CopyrightBlocked => "Blocked on copyright grounds",
            Self::GeoBlocked => "Geographic restriction",
            Self::BotDetection => "Bot detection triggered",
            Self::AgeRestricted => "Age-restricted content",
            Self::PrivateVideo => "Private video",
            Self::VideoUnavailable => "Video unavailable",
            Self::LoginRequired => "Login required",
            Self::RateLimited => "Rate limited",
            Self::Http403Forbidden => "Access denied (HTTP 403)",
            Self::NetworkTimeout => "Network timeout",
        }
    }

    /// Map the reason onto the resolver failure taxonomy.
    pub fn into_error(self, message: String) -> ResolveError {
        match self {
            Self::VideoUnavailable | Self::PrivateVideo => ResolveError::NotFound(message),
            Self::CopyrightBlocked | Self::GeoBlocked => ResolveError::Restricted(message),
            Self::BotDetection | Self::AgeRestricted | Self::LoginRequired => {
                ResolveError::AuthRequired(message)
            }
            Self::RateLimited => ResolveError::RateLimited(message),
            Self::Http403Forbidden | Self::NetworkTimeout => ResolveError::Upstream(message),
        }
    }
}

/// Analyze an error message and return the blocking reason, if recognizable.
pub fn diagnose(error: &str) -> Option<BlockingReason> {
    let lower = error.to_lowercase();

    // Checked before "video unavailable": the platform prefixes these with it
    if lower.contains("copyright") {
        return Some(BlockingReason::CopyrightBlocked);
    }

    if lower.contains("not available in your country")
        || lower.contains("blocked in your country")
        || lower.contains("geo restriction")
        || lower.contains("geo-restricted")
    {
        return Some(BlockingReason::GeoBlocked);
    }

    if lower.contains("not a bot")
        || lower.contains("captcha")
        || lower.contains("unusual traffic")
    {
        return Some(BlockingReason::BotDetection);
    }

    if lower.contains("confirm your age")
        || lower.contains("age-restricted")
        || lower.contains("age restricted")
    {
        return Some(BlockingReason::AgeRestricted);
    }

    if lower.contains("private video") || lower.contains("video is private") {
        return Some(BlockingReason::PrivateVideo);
    }

    if lower.contains("video unavailable")
        || lower.contains("video is unavailable")
        || lower.contains("video has been removed")
        || lower.contains("no longer available")
        || lower.contains("does not exist")
    {
        return Some(BlockingReason::VideoUnavailable);
    }

    if lower.contains("members-only")
        || lower.contains("members only")
        || lower.contains("login required")
        || lower.contains("sign in")
    {
        return Some(BlockingReason::LoginRequired);
    }

    if lower.contains("too many requests") || lower.contains("rate limit") {
        return Some(BlockingReason::RateLimited);
    }

    if let Some(caps) = HTTP_STATUS_RE.captures(error) {
        match &caps[1] {
            "404" | "410" => return Some(BlockingReason::VideoUnavailable),
            "429" => return Some(BlockingReason::RateLimited),
            "403" => return Some(BlockingReason::Http403Forbidden),
            _ => {}
        }
    }

    if lower.contains("forbidden") {
        return Some(BlockingReason::Http403Forbidden);
    }

    if lower.contains("timed out") || lower.contains("timeout") {
        return Some(BlockingReason::NetworkTimeout);
    }

    None
}

/// Classify a non-OK `playabilityStatus` from the player API.
pub fn diagnose_playability(status: &str, reason: &str) -> ResolveError {
    let message = if reason.is_empty() {
        status.to_string()
    } else {
        format!("{}: {}", status, reason)
    };

    if let Some(found) = diagnose(reason) {
        return found.into_error(message);
    }

    match status {
        "ERROR" => ResolveError::NotFound(message),
        "LOGIN_REQUIRED" | "AGE_CHECK_REQUIRED" | "CONTENT_CHECK_REQUIRED" => {
            ResolveError::AuthRequired(message)
        }
        "UNPLAYABLE" => ResolveError::Restricted(message),
        _ => ResolveError::Upstream(message),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_copyright_wins_over_unavailable() {
        let error = "ERROR: [youtube] abc: Video unavailable. This video contains content from X, who has blocked it on copyright grounds";
        assert_eq!(diagnose(error), Some(BlockingReason::CopyrightBlocked));
    }

    #[test]
    fn test_unavailable_detection() {
        let error = "ERROR: [youtube] abc123: Video unavailable";
        assert_eq!(diagnose(error), Some(BlockingReason::VideoUnavailable));
    }

    #[test]
    fn test_bot_detection() {
        let error = "Sign in to confirm you're not a bot. Use --cookies-from-browser";
        assert_eq!(diagnose(error), Some(BlockingReason::BotDetection));
    }

    #[test]
    fn test_age_detection() {
        assert_eq!(
            diagnose("Sign in to confirm your age"),
            Some(BlockingReason::AgeRestricted)
        );
    }

    #[test]
    fn test_geo_detection() {
        let error = "The uploader has not made this video available in your country";
        assert_eq!(diagnose(error), Some(BlockingReason::GeoBlocked));
    }

    #[test]
    fn test_http_status_detection() {
        assert_eq!(
            diagnose("ERROR: unable to download webpage: HTTP Error 429"),
            Some(BlockingReason::RateLimited)
        );
        assert_eq!(
            diagnose("HTTP Error 410: Gone"),
            Some(BlockingReason::VideoUnavailable)
        );
        assert_eq!(
            diagnose("HTTP Error 403: Forbidden"),
            Some(BlockingReason::Http403Forbidden)
        );
    }

    #[test]
    fn test_unknown_message() {
        assert_eq!(diagnose("segfault in extractor"), None);
        assert_eq!(diagnose(""), None);
    }

    #[test]
    fn test_playability_mapping() {
        assert!(matches!(
            diagnose_playability("ERROR", "This video has been removed by the uploader"),
            ResolveError::NotFound(_)
        ));
        assert!(matches!(
            diagnose_playability("LOGIN_REQUIRED", "Sign in to confirm you're not a bot"),
            ResolveError::AuthRequired(_)
        ));
        assert!(matches!(
            diagnose_playability("UNPLAYABLE", ""),
            ResolveError::Restricted(_)
        ));
        assert!(matches!(
            diagnose_playability("LIVE_STREAM_OFFLINE", ""),
            ResolveError::Upstream(_)
        ));
    }
}
