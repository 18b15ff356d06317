//! Single-provider HTTP execution: pacing, bounded retry, and logging
//! (spec §4.2). Adapters hold one `ProviderHttpClient` per provider and
//! drive every outbound call through it, mirroring the teacher's
//! `reqwest::Client` usage in `rpc_provider.rs`.

use std::sync::Arc;
use std::time::{Duration, Instant};

use rand::Rng;
use reqwest::{Method, StatusCode};
use serde::de::DeserializeOwned;
use tokio::sync::Mutex;

use crate::error::ManagerError;
use crate::provider::RateLimitPolicy;
use crate::redact::{redact_authorization, redact_url};

const BASE_BACKOFF_MS: u64 = 200;
const MAX_BACKOFF_MS: u64 = 5_000;

/// Rolling per-minute/per-hour request counters plus a token bucket sized
/// by `requestsPerSecond` with a separate burst capacity (spec §4.2).
struct TokenBucket {
    policy: RateLimitPolicy,
    tokens: f64,
    last_refill: Instant,
    minute_window_start: Instant,
    minute_count: u32,
    hour_window_start: Instant,
    hour_count: u32,
}

impl TokenBucket {
    fn new(policy: RateLimitPolicy) -> Self {
        let now = Instant::now();
        Self {
            tokens: policy.burst as f64,
            last_refill: now,
            minute_window_start: now,
            minute_count: 0,
            hour_window_start: now,
            hour_count: 0,
            policy,
        }
    }

    fn refill(&mut self) {
        let now = Instant::now();
        let elapsed = now.duration_since(self.last_refill).as_secs_f64();
        self.tokens = (self.tokens + elapsed * self.policy.requests_per_second)
            .min(self.policy.burst as f64);
        self.last_refill = now;

        if now.duration_since(self.minute_window_start) >= Duration::from_secs(60) {
            self.minute_window_start = now;
            self.minute_count = 0;
        }
        if now.duration_since(self.hour_window_start) >= Duration::from_secs(3600) {
            self.hour_window_start = now;
            self.hour_count = 0;
        }
    }

    /// Seconds to wait before the next request is admissible under every
    /// active ceiling (token bucket, per-minute, per-hour).
    fn wait_needed(&mut self) -> Duration {
        self.refill();

        let mut wait = Duration::ZERO;
        if self.tokens < 1.0 {
            let deficit = 1.0 - self.tokens;
            let secs = deficit / self.policy.requests_per_second.max(f64::MIN_POSITIVE);
            wait = wait.max(Duration::from_secs_f64(secs));
        }
        if let Some(limit) = self.policy.requests_per_minute {
            if self.minute_count >= limit {
                let elapsed = Instant::now().duration_since(self.minute_window_start);
                wait = wait.max(Duration::from_secs(60).saturating_sub(elapsed));
            }
        }
        if let Some(limit) = self.policy.requests_per_hour {
            if self.hour_count >= limit {
                let elapsed = Instant::now().duration_since(self.hour_window_start);
                wait = wait.max(Duration::from_secs(3600).saturating_sub(elapsed));
            }
        }
        wait
    }

    fn consume(&mut self) {
        self.tokens -= 1.0;
        self.minute_count += 1;
        self.hour_count += 1;
    }
}

/// Handle returned by [`ProviderHttpClient::with_rate_limit`]. Dropping
/// without calling [`RateLimitGuard::restore`] leaves the override bucket
/// active; callers must restore on every exit path (spec §4.2).
pub struct RateLimitGuard {
    client: ProviderHttpClient,
    original: RateLimitPolicy,
}

impl RateLimitGuard {
    pub async fn restore(self) {
        *self.client.bucket.lock().await = TokenBucket::new(self.original);
    }
}

/// Per-provider HTTP execution with pacing and bounded retry (spec §4.2).
#[derive(Clone)]
pub struct ProviderHttpClient {
    provider_name: String,
    base_url: String,
    http: reqwest::Client,
    bucket: Arc<Mutex<TokenBucket>>,
    retries: u32,
    call_timeout: Duration,
    auth_header: Option<String>,
    extra_redacted_params: Vec<String>,
}

impl ProviderHttpClient {
    pub fn new(
        provider_name: impl Into<String>,
        base_url: impl Into<String>,
        rate_limit: RateLimitPolicy,
        retries: u32,
        call_timeout: Duration,
    ) -> Self {
        Self {
            provider_name: provider_name.into(),
            base_url: base_url.into(),
            http: reqwest::Client::new(),
            bucket: Arc::new(Mutex::new(TokenBucket::new(rate_limit))),
            retries,
            call_timeout,
            auth_header: None,
            extra_redacted_params: Vec::new(),
        }
    }

    pub fn with_authorization(mut self, header_value: impl Into<String>) -> Self {
        self.auth_header = Some(header_value.into());
        self
    }

    pub fn with_redacted_params(mut self, names: impl IntoIterator<Item = String>) -> Self {
        self.extra_redacted_params = names.into_iter().collect();
        self
    }

    /// Swap the active rate-limit bucket for the duration the caller holds
    /// the returned guard (spec §4.2 "scoped acquisition with guaranteed
    /// release"). Nested calls replace rather than compose (spec §9 open
    /// question, resolved in DESIGN.md).
    pub async fn with_rate_limit(&self, policy: RateLimitPolicy) -> RateLimitGuard {
        let mut guard = self.bucket.lock().await;
        let original = guard.policy;
        *guard = TokenBucket::new(policy);
        drop(guard);
        RateLimitGuard {
            client: self.clone(),
            original,
        }
    }

    async fn acquire(&self) {
        loop {
            let wait = {
                let mut bucket = self.bucket.lock().await;
                let wait = bucket.wait_needed();
                if wait.is_zero() {
                    bucket.consume();
                }
                wait
            };
            if wait.is_zero() {
                return;
            }
            tokio::time::sleep(wait).await;
        }
    }

    fn redacted_params(&self) -> Vec<&str> {
        self.extra_redacted_params.iter().map(|s| s.as_str()).collect()
    }

    pub async fn get<T: DeserializeOwned>(&self, path: &str) -> Result<T, ManagerError> {
        self.execute(Method::GET, path, None::<&()>).await
    }

    pub async fn post<T: DeserializeOwned, B: serde::Serialize>(
        &self,
        path: &str,
        body: &B,
    ) -> Result<T, ManagerError> {
        self.execute(Method::POST, path, Some(body)).await
    }

    async fn execute<T: DeserializeOwned, B: serde::Serialize>(
        &self,
        method: Method,
        path: &str,
        body: Option<&B>,
    ) -> Result<T, ManagerError> {
        let url = format!("{}{}", self.base_url, path);
        let deadline = Instant::now() + self.call_timeout;
        let mut attempt = 0u32;
        let mut retry_after: Option<Duration> = None;

        loop {
            if let Some(wait) = retry_after.take() {
                tracing::debug!(
                    provider = %self.provider_name,
                    url = %redact_url(&url, &self.redacted_params()),
                    wait_ms = wait.as_millis() as u64,
                    "http.retry.wait"
                );
                tokio::time::sleep(wait).await;
            }

            self.acquire().await;

            if Instant::now() >= deadline {
                return Err(ManagerError::Timeout {
                    provider: self.provider_name.clone(),
                    elapsed_ms: self.call_timeout.as_millis() as u64,
                });
            }

            let remaining = deadline.saturating_duration_since(Instant::now());
            let mut request = self.http.request(method.clone(), &url).timeout(remaining);
            if let Some(auth) = &self.auth_header {
                request = request.header("Authorization", auth);
            }
            if let Some(body) = body {
                request = request.json(body);
            }

            tracing::debug!(
                provider = %self.provider_name,
                method = %method,
                url = %redact_url(&url, &self.redacted_params()),
                auth = self.auth_header.as_deref().map(redact_authorization),
                "http.request"
            );

            let response = request.send().await;

            match response {
                Ok(resp) if resp.status().is_success() => {
                    let body = resp.text().await.map_err(|e| ManagerError::Service {
                        provider: self.provider_name.clone(),
                        reason: e.to_string(),
                    })?;
                    return serde_json::from_str(&body).map_err(|e| ManagerError::Validation {
                        provider: self.provider_name.clone(),
                        path: path.to_string(),
                        reason: e.to_string(),
                    });
                }
                Ok(resp) if resp.status() == StatusCode::TOO_MANY_REQUESTS => {
                    let retry_secs = resp
                        .headers()
                        .get("Retry-After")
                        .and_then(|v| v.to_str().ok())
                        .and_then(|s| s.parse::<u64>().ok());
                    if attempt >= self.retries {
                        return Err(ManagerError::RateLimit {
                            provider: self.provider_name.clone(),
                            retry_after_secs: retry_secs,
                        });
                    }
                    attempt += 1;
                    retry_after = Some(
                        retry_secs
                            .map(Duration::from_secs)
                            .unwrap_or_else(|| backoff_with_jitter(attempt)),
                    );
                }
                Ok(resp) if resp.status() == StatusCode::UNAUTHORIZED || resp.status() == StatusCode::FORBIDDEN => {
                    let body_excerpt = excerpt(&resp.text().await.unwrap_or_default());
                    return Err(ManagerError::Auth {
                        provider: self.provider_name.clone(),
                        reason: body_excerpt,
                    });
                }
                Ok(resp) if resp.status().is_client_error() => {
                    let status = resp.status().as_u16();
                    let body_excerpt = excerpt(&resp.text().await.unwrap_or_default());
                    return Err(ManagerError::Http {
                        provider: self.provider_name.clone(),
                        status,
                        body_excerpt,
                    });
                }
                Ok(resp) => {
                    // 5xx
                    if attempt >= self.retries {
                        let status = resp.status().as_u16();
                        let body_excerpt = excerpt(&resp.text().await.unwrap_or_default());
                        return Err(ManagerError::Service {
                            provider: self.provider_name.clone(),
                            reason: format!("http {status}: {body_excerpt}"),
                        });
                    }
                    attempt += 1;
                    retry_after = Some(backoff_with_jitter(attempt));
                }
                Err(err) if err.is_timeout() => {
                    return Err(ManagerError::Timeout {
                        provider: self.provider_name.clone(),
                        elapsed_ms: self.call_timeout.as_millis() as u64,
                    });
                }
                Err(err) => {
                    if attempt >= self.retries {
                        return Err(ManagerError::Service {
                            provider: self.provider_name.clone(),
                            reason: err.to_string(),
                        });
                    }
                    attempt += 1;
                    retry_after = Some(backoff_with_jitter(attempt));
                }
            }
        }
    }
}

fn backoff_with_jitter(attempt: u32) -> Duration {
    let exp = BASE_BACKOFF_MS.saturating_mul(1u64 << attempt.min(20)).min(MAX_BACKOFF_MS);
    let jitter = rand::thread_rng().gen_range(0..=exp / 2);
    Duration::from_millis(exp - jitter)
}

fn excerpt(body: &str) -> String {
    body.chars().take(200).collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn backoff_grows_with_attempt_and_stays_bounded() {
        let first = backoff_with_jitter(1);
        let later = backoff_with_jitter(10);
        assert!(first.as_millis() <= MAX_BACKOFF_MS as u128);
        assert!(later.as_millis() <= MAX_BACKOFF_MS as u128);
    }

    #[tokio::test]
    async fn token_bucket_admits_burst_then_waits() {
        let mut bucket = TokenBucket::new(RateLimitPolicy {
            requests_per_second: 1.0,
            requests_per_minute: None,
            requests_per_hour: None,
            burst: 2,
        });
        assert!(bucket.wait_needed().is_zero());
        bucket.consume();
        assert!(bucket.wait_needed().is_zero());
        bucket.consume();
        assert!(!bucket.wait_needed().is_zero());
    }

    #[tokio::test]
    async fn per_minute_ceiling_forces_wait() {
        let mut bucket = TokenBucket::new(RateLimitPolicy {
            requests_per_second: 1000.0,
            requests_per_minute: Some(1),
            requests_per_hour: None,
            burst: 1000,
        });
        assert!(bucket.wait_needed().is_zero());
        bucket.consume();
        assert!(!bucket.wait_needed().is_zero());
    }

    #[tokio::test]
    async fn rate_limit_override_restores_original_policy() {
        let client = ProviderHttpClient::new(
            "mempool",
            "https://example.invalid",
            RateLimitPolicy {
                requests_per_second: 1.0,
                requests_per_minute: None,
                requests_per_hour: None,
                burst: 1,
            },
            3,
            Duration::from_secs(5),
        );
        let guard = client
            .with_rate_limit(RateLimitPolicy {
                requests_per_second: 100.0,
                requests_per_minute: None,
                requests_per_hour: None,
                burst: 100,
            })
            .await;
        assert_eq!(client.bucket.lock().await.policy.burst, 100);
        guard.restore().await;
        assert_eq!(client.bucket.lock().await.policy.burst, 1);
    }
}
