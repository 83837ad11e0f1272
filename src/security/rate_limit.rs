//! Sliding-window rate limiting for the control plane.
//!
//! Each client key keeps the timestamps of its admitted requests inside the
//! trailing window. Stale timestamps are pruned lazily on access. The number
//! of distinct keys is bounded: when the table is full, keys with no request
//! left in the window go first, then the key that was seen least recently.

use axum::{
    body::Body,
    extract::{ConnectInfo, State},
    http::{HeaderMap, Request, StatusCode},
    middleware::Next,
    response::{IntoResponse, Response},
};
use std::collections::{HashMap, VecDeque};
use std::net::SocketAddr;
use std::sync::{Arc, Mutex, MutexGuard};
use std::time::{Duration, Instant};

use crate::config::RateLimitConfig;
use crate::observability::metrics;

/// Headers consulted for the originating client, in priority order.
const CLIENT_IP_HEADERS: [&str; 3] = ["x-forwarded-for", "x-real-ip", "cf-connecting-ip"];

/// Source of "now" for the limiter.
pub trait Clock: Send + Sync {
    fn now(&self) -> Instant;
}

/// Wall clock backed by `Instant::now`.
#[derive(Debug, Default, Clone, Copy)]
pub struct SystemClock;

impl Clock for SystemClock {
    fn now(&self) -> Instant {
        Instant::now()
    }
}

/// Manually advanced clock for deterministic tests.
#[derive(Debug)]
pub struct ManualClock {
    base: Instant,
    offset: Mutex<Duration>,
}

impl ManualClock {
    pub fn new() -> Self {
        Self {
            base: Instant::now(),
            offset: Mutex::new(Duration::ZERO),
        }
    }

    /// Move the clock forward.
    pub fn advance(&self, by: Duration) {
        let mut offset = self.offset.lock().unwrap_or_else(|e| e.into_inner());
        *offset += by;
    }
}

impl Default for ManualClock {
    fn default() -> Self {
        Self::new()
    }
}

impl Clock for ManualClock {
    fn now(&self) -> Instant {
        let offset = *self.offset.lock().unwrap_or_else(|e| e.into_inner());
        self.base + offset
    }
}

/// Per-client sliding window limiter.
pub struct RateLimiter {
    history: Mutex<HashMap<String, VecDeque<Instant>>>,
    max_requests: usize,
    window: Duration,
    max_tracked_clients: usize,
    clock: Arc<dyn Clock>,
}

impl RateLimiter {
    pub fn new(config: &RateLimitConfig) -> Self {
        Self::with_clock(config, Arc::new(SystemClock))
    }

    pub fn with_clock(config: &RateLimitConfig, clock: Arc<dyn Clock>) -> Self {
        Self {
            history: Mutex::new(HashMap::new()),
            max_requests: config.max_requests,
            window: config.window,
            max_tracked_clients: config.max_tracked_clients.max(1),
            clock,
        }
    }

    /// Admit or reject one request from `key`.
    ///
    /// Check and record happen under a single lock acquisition, so concurrent
    /// callers can never both observe spare capacity for the last slot.
    pub fn allow(&self, key: &str) -> bool {
        let now = self.clock.now();
        // None when the process is younger than the window: nothing can be stale yet.
        let cutoff = now.checked_sub(self.window);

        let mut history = self.lock();

        if !history.contains_key(key) && history.len() >= self.max_tracked_clients {
            self.evict(&mut history, cutoff);
        }

        let stamps = history.entry(key.to_string()).or_default();
        if let Some(cutoff) = cutoff {
            while stamps.front().is_some_and(|t| *t <= cutoff) {
                stamps.pop_front();
            }
        }

        if stamps.len() >= self.max_requests {
            return false;
        }

        stamps.push_back(now);
        true
    }

    /// Number of client keys currently held.
    pub fn tracked_clients(&self) -> usize {
        self.lock().len()
    }

    fn evict(&self, history: &mut HashMap<String, VecDeque<Instant>>, cutoff: Option<Instant>) {
        if let Some(cutoff) = cutoff {
            history.retain(|_, stamps| stamps.back().is_some_and(|t| *t > cutoff));
        }
        if history.len() < self.max_tracked_clients {
            return;
        }

        let oldest = history
            .iter()
            .min_by_key(|(_, stamps)| stamps.back().copied())
            .map(|(key, _)| key.clone());
        if let Some(key) = oldest {
            tracing::debug!(client = %key, "Rate limiter full, evicting least recent client");
            history.remove(&key);
        }
    }

    fn lock(&self) -> MutexGuard<'_, HashMap<String, VecDeque<Instant>>> {
        self.history.lock().unwrap_or_else(|e| e.into_inner())
    }
}

/// Derive the rate-limit key for a request.
///
/// Forwarding headers win over the socket peer; for `X-Forwarded-For` only the
/// first (originating) hop is used.
pub fn client_key(headers: &HeaderMap, peer: Option<SocketAddr>) -> String {
    for name in CLIENT_IP_HEADERS {
        let value = headers
            .get(name)
            .and_then(|v| v.to_str().ok())
            .and_then(|v| v.split(',').next())
            .map(str::trim)
            .filter(|v| !v.is_empty());
        if let Some(ip) = value {
            return ip.to_string();
        }
    }

    match peer {
        Some(addr) => addr.ip().to_string(),
        None => "unknown".to_string(),
    }
}

/// Middleware rejecting clients over their admission budget.
pub async fn rate_limit_middleware(
    State(limiter): State<Arc<RateLimiter>>,
    request: Request<Body>,
    next: Next,
) -> Response {
    let peer = request
        .extensions()
        .get::<ConnectInfo<SocketAddr>>()
        .map(|ConnectInfo(addr)| *addr);
    let key = client_key(request.headers(), peer);

    if limiter.allow(&key) {
        next.run(request).await
    } else {
        tracing::warn!(client = %key, "Rate limit exceeded");
        metrics::record_rate_limited();
        (StatusCode::TOO_MANY_REQUESTS, "rate limit exceeded").into_response()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use axum::http::HeaderValue;

    fn config(
        max_requests: usize,
        window_secs: u64,
        max_tracked_clients: usize,
    ) -> RateLimitConfig {
        RateLimitConfig {
            max_requests,
            window: Duration::from_secs(window_secs),
            max_tracked_clients,
        }
    }

    #[test]
    fn test_limit_is_exact() {
        let limiter = RateLimiter::new(&config(10, 60, 100));
        let admitted = (0..15).filter(|_| limiter.allow("10.0.0.1")).count();
        assert_eq!(admitted, 10);
    }

    #[test]
    fn test_keys_are_independent() {
        let limiter = RateLimiter::new(&config(1, 60, 100));
        assert!(limiter.allow("a"));
        assert!(!limiter.allow("a"));
        assert!(limiter.allow("b"));
    }

    #[test]
    fn test_window_slides() {
        let clock = Arc::new(ManualClock::new());
        let limiter = RateLimiter::with_clock(&config(2, 60, 100), clock.clone());

        clock.advance(Duration::from_secs(120));
        assert!(limiter.allow("k"));
        clock.advance(Duration::from_secs(30));
        assert!(limiter.allow("k"));
        assert!(!limiter.allow("k"));

        // first stamp sits exactly on the cutoff and is dropped
        clock.advance(Duration::from_secs(30));
        assert!(limiter.allow("k"));
        assert!(!limiter.allow("k"));
    }

    #[test]
    fn test_rejections_are_not_recorded() {
        let clock = Arc::new(ManualClock::new());
        let limiter = RateLimiter::with_clock(&config(1, 10, 100), clock.clone());

        clock.advance(Duration::from_secs(100));
        assert!(limiter.allow("k"));
        for _ in 0..5 {
            clock.advance(Duration::from_secs(1));
            assert!(!limiter.allow("k"));
        }
        clock.advance(Duration::from_secs(5));
        assert!(limiter.allow("k"));
    }

    #[test]
    fn test_concurrent_admission_is_exact() {
        let limiter = Arc::new(RateLimiter::new(&config(10, 60, 100)));
        let handles: Vec<_> = (0..25)
            .map(|_| {
                let limiter = limiter.clone();
                std::thread::spawn(move || limiter.allow("shared"))
            })
            .collect();
        let admitted = handles
            .into_iter()
            .map(|h| h.join().unwrap())
            .filter(|ok| *ok)
            .count();
        assert_eq!(admitted, 10);
    }

    #[test]
    fn test_tracked_clients_are_bounded() {
        let clock = Arc::new(ManualClock::new());
        let limiter = RateLimiter::with_clock(&config(5, 60, 3), clock.clone());
        clock.advance(Duration::from_secs(120));

        for key in ["a", "b", "c"] {
            assert!(limiter.allow(key));
            clock.advance(Duration::from_secs(1));
        }
        assert!(limiter.allow("d"));
        assert_eq!(limiter.tracked_clients(), 3);

        // "a" was the least recent and lost its history
        for _ in 0..5 {
            assert!(limiter.allow("a"));
        }
    }

    #[test]
    fn test_stale_clients_are_evicted_first() {
        let clock = Arc::new(ManualClock::new());
        let limiter = RateLimiter::with_clock(&config(5, 10, 2), clock.clone());
        clock.advance(Duration::from_secs(100));

        assert!(limiter.allow("old"));
        clock.advance(Duration::from_secs(20));
        assert!(limiter.allow("fresh"));
        assert!(limiter.allow("new"));
        assert_eq!(limiter.tracked_clients(), 2);
    }

    #[test]
    fn test_client_key_prefers_forwarded_headers() {
        let peer: SocketAddr = "192.0.2.7:4000".parse().unwrap();
        let mut headers = HeaderMap::new();
        assert_eq!(client_key(&headers, Some(peer)), "192.0.2.7");
        assert_eq!(client_key(&headers, None), "unknown");

        headers.insert("cf-connecting-ip", HeaderValue::from_static("203.0.113.3"));
        assert_eq!(client_key(&headers, Some(peer)), "203.0.113.3");

        headers.insert("x-real-ip", HeaderValue::from_static("203.0.113.2"));
        assert_eq!(client_key(&headers, Some(peer)), "203.0.113.2");

        headers.insert(
            "x-forwarded-for",
            HeaderValue::from_static("203.0.113.1, 10.0.0.1"),
        );
        assert_eq!(client_key(&headers, Some(peer)), "203.0.113.1");
    }
}
