//! Per-client token bucket admission control for the HTTP surface
//!
//! Buckets refill in whole windows only: after `n` complete windows the
//! bucket gains `n * refill_rate` tokens (capped at `max_tokens`) and its
//! refill timestamp advances by exactly `n` windows, so partial windows carry
//! over instead of being lost or double counted.

use std::collections::HashMap;
use std::sync::Arc;
use std::time::{Duration, Instant};

use axum::extract::{Request, State};
use axum::http::{HeaderMap, HeaderName, HeaderValue, StatusCode};
use axum::middleware::Next;
use axum::response::{IntoResponse, Response};
use axum::Json;
use parking_lot::Mutex;
use serde::{Deserialize, Serialize};
use tokio::sync::watch;

/// Identity shared by every client that sent no forwarding headers
pub const UNKNOWN_CLIENT: &str = "unknown";

pub const LIMIT_HEADER: HeaderName = HeaderName::from_static("x-ratelimit-limit");
pub const REMAINING_HEADER: HeaderName = HeaderName::from_static("x-ratelimit-remaining");

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct RateLimitConfig {
    /// Bucket capacity, also the initial token count
    pub max_tokens: u32,
    /// Tokens added per elapsed window
    pub refill_rate: u32,
    /// Refill window, in milliseconds
    pub window_ms: u64,
    /// Buckets untouched for this long are dropped, in seconds
    pub idle_ttl_secs: u64,
    /// How often idle buckets are swept, in seconds
    pub sweep_interval_secs: u64,
}

impl Default for RateLimitConfig {
    fn default() -> Self {
        Self {
            max_tokens: 100,
            refill_rate: 100,
            window_ms: 60_000,
            idle_ttl_secs: 3600,
            sweep_interval_secs: 300,
        }
    }
}

#[derive(Debug, thiserror::Error)]
pub enum RateLimitConfigError {
    #[error("rate limit {0} must be greater than zero")]
    Zero(&'static str),
}

impl RateLimitConfig {
    pub fn validate(&self) -> Result<(), RateLimitConfigError> {
        if self.max_tokens == 0 {
            return Err(RateLimitConfigError::Zero("max_tokens"));
        }
        if self.refill_rate == 0 {
            return Err(RateLimitConfigError::Zero("refill_rate"));
        }
        if self.window_ms == 0 {
            return Err(RateLimitConfigError::Zero("window_ms"));
        }
        if self.idle_ttl_secs == 0 {
            return Err(RateLimitConfigError::Zero("idle_ttl_secs"));
        }
        if self.sweep_interval_secs == 0 {
            return Err(RateLimitConfigError::Zero("sweep_interval_secs"));
        }
        Ok(())
    }

    pub fn window(&self) -> Duration {
        Duration::from_millis(self.window_ms)
    }

    pub fn idle_ttl(&self) -> Duration {
        Duration::from_secs(self.idle_ttl_secs)
    }
}

/// Outcome of one admission check
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Admission {
    Admitted { limit: u32, remaining: u32 },
    Rejected { limit: u32, retry_after_secs: u64 },
}

impl Admission {
    pub fn is_admitted(&self) -> bool {
        matches!(self, Admission::Admitted { .. })
    }
}

#[derive(Debug, Clone)]
struct Bucket {
    tokens: u32,
    last_refill: Instant,
    last_access: Instant,
}

impl Bucket {
    fn full(max_tokens: u32, now: Instant) -> Self {
        Self {
            tokens: max_tokens,
            last_refill: now,
            last_access: now,
        }
    }

    fn refill(&mut self, config: &RateLimitConfig, now: Instant) {
        let window = config.window();
        let elapsed = now.saturating_duration_since(self.last_refill);
        let windows = elapsed.as_millis() / window.as_millis();
        if windows == 0 {
            return;
        }

        let added = windows.saturating_mul(config.refill_rate as u128);
        let tokens = (self.tokens as u128).saturating_add(added);
        self.tokens = tokens.min(config.max_tokens as u128) as u32;

        let advance = window.as_millis().saturating_mul(windows);
        self.last_refill += Duration::from_millis(u64::try_from(advance).unwrap_or(u64::MAX));
    }

    /// Whole seconds until the next refill boundary, at least one
    fn retry_after_secs(&self, config: &RateLimitConfig, now: Instant) -> u64 {
        let next_refill = self.last_refill + config.window();
        let wait = next_refill.saturating_duration_since(now);
        let secs = wait.as_secs() + u64::from(wait.subsec_nanos() > 0);
        secs.max(1)
    }
}

/// Thread-safe rate limiter keyed by client identity
pub struct RateLimiter {
    config: RateLimitConfig,
    buckets: Mutex<HashMap<String, Bucket>>,
}

impl std::fmt::Debug for RateLimiter {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("RateLimiter")
            .field("config", &self.config)
            .field("tracked_keys", &self.tracked_keys())
            .finish()
    }
}

impl RateLimiter {
    pub fn new(config: RateLimitConfig) -> Result<Self, RateLimitConfigError> {
        config.validate()?;
        Ok(Self {
            config,
            buckets: Mutex::new(HashMap::new()),
        })
    }

    pub fn config(&self) -> &RateLimitConfig {
        &self.config
    }

    pub fn check(&self, identity: &str) -> Admission {
        self.check_at(identity, Instant::now())
    }

    /// Refill and consume atomically for `identity` as of `now`
    pub fn check_at(&self, identity: &str, now: Instant) -> Admission {
        let limit = self.config.max_tokens;
        let mut buckets = self.buckets.lock();
        let bucket = buckets
            .entry(identity.to_string())
            .or_insert_with(|| Bucket::full(limit, now));

        bucket.refill(&self.config, now);
        bucket.last_access = now;

        if bucket.tokens == 0 {
            return Admission::Rejected {
                limit,
                retry_after_secs: bucket.retry_after_secs(&self.config, now),
            };
        }

        bucket.tokens -= 1;
        Admission::Admitted {
            limit,
            remaining: bucket.tokens,
        }
    }

    /// Drop buckets not touched within the idle TTL; returns how many went
    pub fn sweep_idle(&self, now: Instant) -> usize {
        let idle_ttl = self.config.idle_ttl();
        let mut buckets = self.buckets.lock();
        let before = buckets.len();
        buckets.retain(|_, bucket| now.saturating_duration_since(bucket.last_access) < idle_ttl);
        before - buckets.len()
    }

    pub fn tracked_keys(&self) -> usize {
        self.buckets.lock().len()
    }

    /// Run [`RateLimiter::sweep_idle`] periodically until shutdown
    ///
    /// The task is detached; it holds no handle that keeps the runtime alive.
    pub fn spawn_cleanup(self: &Arc<Self>, mut shutdown_rx: watch::Receiver<()>) {
        let limiter = Arc::downgrade(self);
        let period = Duration::from_secs(self.config.sweep_interval_secs);

        tokio::spawn(async move {
            let mut interval = tokio::time::interval(period);
            interval.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Skip);
            interval.tick().await;

            loop {
                tokio::select! {
                    _ = interval.tick() => {
                        let Some(limiter) = limiter.upgrade() else {
                            break;
                        };
                        let removed = limiter.sweep_idle(Instant::now());
                        if removed > 0 {
                            tracing::debug!(removed, remaining = limiter.tracked_keys(), "swept idle rate limit buckets");
                        }
                    }
                    _ = shutdown_rx.changed() => {
                        break;
                    }
                }
            }
            tracing::debug!("rate limit cleanup stopped");
        });
    }
}

/// Resolve the client identity from forwarding headers
///
/// First `x-forwarded-for` entry, then `x-real-ip`, then [`UNKNOWN_CLIENT`].
pub fn client_identity(headers: &HeaderMap) -> String {
    let forwarded = headers
        .get("x-forwarded-for")
        .and_then(|v| v.to_str().ok())
        .and_then(|v| v.split(',').next())
        .map(str::trim)
        .filter(|v| !v.is_empty());
    if let Some(ip) = forwarded {
        return ip.to_string();
    }

    let real_ip = headers
        .get("x-real-ip")
        .and_then(|v| v.to_str().ok())
        .map(str::trim)
        .filter(|v| !v.is_empty());
    if let Some(ip) = real_ip {
        return ip.to_string();
    }

    UNKNOWN_CLIENT.to_string()
}

/// Axum middleware gating every request through the limiter
pub async fn rate_limit_middleware(
    State(limiter): State<Arc<RateLimiter>>,
    req: Request,
    next: Next,
) -> Response {
    let identity = client_identity(req.headers());

    match limiter.check(&identity) {
        Admission::Admitted { limit, remaining } => {
            let mut response = next.run(req).await;
            set_limit_headers(response.headers_mut(), limit, remaining);
            response
        }
        Admission::Rejected {
            limit,
            retry_after_secs,
        } => {
            tracing::warn!(client = %identity, retry_after_secs, "rate limit exceeded");
            let body = serde_json::json!({
                "error": "rate limit exceeded",
                "retry_after": retry_after_secs,
            });
            let mut response = (StatusCode::TOO_MANY_REQUESTS, Json(body)).into_response();
            let headers = response.headers_mut();
            set_limit_headers(headers, limit, 0);
            headers.insert(http::header::RETRY_AFTER, HeaderValue::from(retry_after_secs));
            response
        }
    }
}

fn set_limit_headers(headers: &mut HeaderMap, limit: u32, remaining: u32) {
    headers.insert(LIMIT_HEADER, HeaderValue::from(limit));
    headers.insert(REMAINING_HEADER, HeaderValue::from(remaining));
}

#[cfg(test)]
mod tests {
    use super::*;

    fn limiter(max_tokens: u32, refill_rate: u32, window_ms: u64) -> RateLimiter {
        RateLimiter::new(RateLimitConfig {
            max_tokens,
            refill_rate,
            window_ms,
            ..Default::default()
        })
        .unwrap()
    }

    #[test]
    fn test_burst_then_reject_with_retry_after() {
        let limiter = limiter(3, 3, 60_000);
        let now = Instant::now();

        for expected in [2, 1, 0] {
            assert_eq!(
                limiter.check_at("10.0.0.1", now),
                Admission::Admitted {
                    limit: 3,
                    remaining: expected
                }
            );
        }

        match limiter.check_at("10.0.0.1", now + Duration::from_secs(1)) {
            Admission::Rejected {
                limit,
                retry_after_secs,
            } => {
                assert_eq!(limit, 3);
                assert_eq!(retry_after_secs, 59);
            }
            other => panic!("expected rejection, got {:?}", other),
        }
    }

    #[test]
    fn test_identities_are_independent() {
        let limiter = limiter(3, 3, 60_000);
        let now = Instant::now();

        for _ in 0..4 {
            limiter.check_at("10.0.0.1", now);
        }
        assert!(!limiter.check_at("10.0.0.1", now).is_admitted());
        assert!(limiter.check_at("10.0.0.2", now).is_admitted());
        assert_eq!(limiter.tracked_keys(), 2);
    }

    #[test]
    fn test_refill_is_capped_at_max() {
        let limiter = limiter(3, 3, 60_000);
        let start = Instant::now();

        for _ in 0..3 {
            limiter.check_at("a", start);
        }
        assert!(!limiter.check_at("a", start).is_admitted());

        // ten windows later the bucket is full again, not 30 tokens
        let later = start + Duration::from_secs(600);
        assert_eq!(
            limiter.check_at("a", later),
            Admission::Admitted {
                limit: 3,
                remaining: 2
            }
        );
    }

    #[test]
    fn test_refill_only_in_whole_windows() {
        let limiter = limiter(4, 1, 1_000);
        let start = Instant::now();

        for _ in 0..4 {
            limiter.check_at("a", start);
        }
        // 1.5 windows: one token, half a window carried over
        let t1 = start + Duration::from_millis(1_500);
        assert!(limiter.check_at("a", t1).is_admitted());
        assert!(!limiter.check_at("a", t1).is_admitted());

        // at 2.0 windows the carried half completes the second window
        let t2 = start + Duration::from_millis(2_000);
        assert!(limiter.check_at("a", t2).is_admitted());
        assert!(!limiter.check_at("a", t2).is_admitted());

        match limiter.check_at("a", t2 + Duration::from_millis(200)) {
            Admission::Rejected {
                retry_after_secs, ..
            } => assert_eq!(retry_after_secs, 1),
            other => panic!("expected rejection, got {:?}", other),
        }
    }

    #[test]
    fn test_sweep_removes_only_idle_buckets() {
        let limiter = RateLimiter::new(RateLimitConfig {
            idle_ttl_secs: 60,
            ..Default::default()
        })
        .unwrap();
        let start = Instant::now();

        limiter.check_at("old", start);
        limiter.check_at("fresh", start + Duration::from_secs(50));

        let removed = limiter.sweep_idle(start + Duration::from_secs(61));
        assert_eq!(removed, 1);
        assert_eq!(limiter.tracked_keys(), 1);
    }

    #[test]
    fn test_invalid_config_rejected() {
        let config = RateLimitConfig {
            window_ms: 0,
            ..Default::default()
        };
        assert!(matches!(
            RateLimiter::new(config),
            Err(RateLimitConfigError::Zero("window_ms"))
        ));
    }

    #[test]
    fn test_client_identity_resolution() {
        let mut headers = HeaderMap::new();
        assert_eq!(client_identity(&headers), UNKNOWN_CLIENT);

        headers.insert("x-real-ip", HeaderValue::from_static("198.51.100.2"));
        assert_eq!(client_identity(&headers), "198.51.100.2");

        headers.insert(
            "x-forwarded-for",
            HeaderValue::from_static("203.0.113.9, 10.0.0.1"),
        );
        assert_eq!(client_identity(&headers), "203.0.113.9");
    }
}
