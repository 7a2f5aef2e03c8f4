//! Rate limit header parsing for 429 backoff.
//!
//! The provider answers throttled requests with 429 and some combination of
//! `Retry-After`, `X-RateLimit-Reset` and `X-RateLimit-Remaining`. When
//! enabled, the retry policy waits for the advertised time instead of its own
//! computed backoff, capped by [`RateLimitConfig::max_wait`].

use http::HeaderMap;
use std::time::{Duration, SystemTime, UNIX_EPOCH};

/// Rate limit data extracted from response headers.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RateLimitInfo {
    /// When the window resets (`X-RateLimit-Reset` / `RateLimit-Reset`).
    pub reset_at: Option<SystemTime>,

    /// How long to wait before retrying (`Retry-After`).
    pub retry_after: Option<Duration>,

    /// Requests remaining in the current window (`X-RateLimit-Remaining`).
    pub remaining: Option<u64>,
}

impl RateLimitInfo {
    /// Extracts rate limit information from response headers.
    ///
    /// # Examples
    ///
    /// ```
    /// use linode_rest::rate_limit::RateLimitInfo;
    /// use http::HeaderMap;
    ///
    /// let mut headers = HeaderMap::new();
    /// headers.insert("retry-after", "60".parse().unwrap());
    ///
    /// let info = RateLimitInfo::from_headers(&headers);
    /// assert!(info.is_rate_limited());
    /// ```
    pub fn from_headers(headers: &HeaderMap) -> Self {
        Self {
            reset_at: parse_rate_limit_reset(headers),
            retry_after: parse_retry_after(headers),
            remaining: parse_header_u64(headers, "x-ratelimit-remaining"),
        }
    }

    /// Returns the advertised delay, capped by `max_wait`.
    ///
    /// `Retry-After` wins over the reset timestamp. Returns `None` when
    /// neither is usable.
    pub fn delay(&self, max_wait: Duration) -> Option<Duration> {
        if let Some(retry_after) = self.retry_after {
            return Some(retry_after.min(max_wait));
        }

        let until_reset = self.reset_at?.duration_since(SystemTime::now()).ok()?;
        Some(until_reset.min(max_wait))
    }

    /// Returns `true` when `Retry-After` is present or no requests remain.
    pub fn is_rate_limited(&self) -> bool {
        self.retry_after.is_some() || self.remaining == Some(0)
    }
}

/// Configuration for rate limit handling.
///
/// # Examples
///
/// ```
/// use linode_rest::rate_limit::RateLimitConfig;
/// use std::time::Duration;
///
/// let config = RateLimitConfig::builder()
///     .max_wait(Duration::from_secs(60))
///     .build();
/// assert!(config.enabled);
/// ```
#[derive(Debug, Clone)]
pub struct RateLimitConfig {
    /// Whether advertised wait times replace the computed backoff.
    pub enabled: bool,

    /// Upper bound on a single advertised wait. Defaults to 5 minutes.
    pub max_wait: Duration,
}

impl Default for RateLimitConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            max_wait: Duration::from_secs(300),
        }
    }
}

impl RateLimitConfig {
    /// Creates a new builder.
    pub fn builder() -> RateLimitConfigBuilder {
        RateLimitConfigBuilder::default()
    }

    /// Ignore rate limit headers and always use the retry strategy's delay.
    pub fn disabled() -> Self {
        Self {
            enabled: false,
            ..Default::default()
        }
    }
}

/// Builder for [`RateLimitConfig`].
#[derive(Debug, Default)]
pub struct RateLimitConfigBuilder {
    enabled: Option<bool>,
    max_wait: Option<Duration>,
}

impl RateLimitConfigBuilder {
    /// Sets whether rate limit handling is enabled.
    pub fn enabled(mut self, enabled: bool) -> Self {
        self.enabled = Some(enabled);
        self
    }

    /// Sets the maximum wait time for a single rate limit pause.
    pub fn max_wait(mut self, max_wait: Duration) -> Self {
        self.max_wait = Some(max_wait);
        self
    }

    /// Builds the `RateLimitConfig`.
    pub fn build(self) -> RateLimitConfig {
        let default = RateLimitConfig::default();
        RateLimitConfig {
            enabled: self.enabled.unwrap_or(default.enabled),
            max_wait: self.max_wait.unwrap_or(default.max_wait),
        }
    }
}

/// Parses `Retry-After` as delay-seconds or an HTTP date.
fn parse_retry_after(headers: &HeaderMap) -> Option<Duration> {
    let header = headers.get("retry-after")?.to_str().ok()?;

    if let Ok(seconds) = header.trim().parse::<u64>() {
        return Some(Duration::from_secs(seconds));
    }

    let date_time = httpdate::parse_http_date(header).ok()?;
    Some(
        date_time
            .duration_since(SystemTime::now())
            .unwrap_or(Duration::ZERO),
    )
}

/// Parses `X-RateLimit-Reset`, falling back to `RateLimit-Reset` (Unix seconds).
fn parse_rate_limit_reset(headers: &HeaderMap) -> Option<SystemTime> {
    ["x-ratelimit-reset", "ratelimit-reset"]
        .iter()
        .find_map(|name| parse_header_u64(headers, name))
        .map(|timestamp| UNIX_EPOCH + Duration::from_secs(timestamp))
}

fn parse_header_u64(headers: &HeaderMap, name: &str) -> Option<u64> {
    headers.get(name)?.to_str().ok()?.trim().parse().ok()
}
