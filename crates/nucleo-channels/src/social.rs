//! Public social posting.
//!
//! [`HttpSocialClient`] is the raw API adapter. [`GuardedPoster`] sits in
//! front of any [`SocialClient`] and applies the caller-side checks: signature,
//! length, dry-run, minimum spacing between posts and a daily budget.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use nucleo_core::config::SocialChannelConfig;
use nucleo_core::error::{NucleoError, Result};
use nucleo_core::traits::SocialClient;
use nucleo_scheduler::{RateLimiter, SharedClock};
use serde::Deserialize;
use std::time::Duration;
use tokio::sync::Mutex;

const REQUEST_TIMEOUT: Duration = Duration::from_secs(10);

#[derive(Debug, Deserialize)]
struct CreatePostResponse {
    data: CreatedPost,
}

#[derive(Debug, Deserialize)]
struct CreatedPost {
    id: String,
}

/// v2-style posting API: `POST {api_base}/2/tweets` with a bearer token.
pub struct HttpSocialClient {
    api_base: String,
    bearer_token: String,
    client: reqwest::Client,
}

impl HttpSocialClient {
    pub fn new(config: &SocialChannelConfig) -> Result<Self> {
        let client = reqwest::Client::builder()
            .timeout(REQUEST_TIMEOUT)
            .build()
            .map_err(|e| NucleoError::Channel(format!("HTTP client: {e}")))?;
        Ok(Self {
            api_base: config.api_base.trim_end_matches('/').to_string(),
            bearer_token: config.bearer_token.clone(),
            client,
        })
    }

    fn endpoint(&self) -> String {
        format!("{}/2/tweets", self.api_base)
    }
}

#[async_trait]
impl SocialClient for HttpSocialClient {
    fn name(&self) -> &str {
        "social"
    }

    async fn post(&self, text: &str) -> Result<String> {
        let response = self
            .client
            .post(self.endpoint())
            .bearer_auth(&self.bearer_token)
            .json(&serde_json::json!({ "text": text }))
            .send()
            .await
            .map_err(|e| {
                if e.is_timeout() {
                    NucleoError::Timeout(format!("social post after {}s", REQUEST_TIMEOUT.as_secs()))
                } else {
                    NucleoError::Channel(format!("social post failed: {}", e.without_url()))
                }
            })?;

        let status = response.status();
        if status == reqwest::StatusCode::UNAUTHORIZED || status == reqwest::StatusCode::FORBIDDEN {
            let body = response.text().await.unwrap_or_default();
            return Err(NucleoError::AuthFailed(format!("social API {status}: {body}")));
        }
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            return Err(NucleoError::Channel(format!("social API {status}: {body}")));
        }

        let created: CreatePostResponse = response
            .json()
            .await
            .map_err(|e| NucleoError::Channel(format!("Invalid post response: {e}")))?;
        Ok(created.data.id)
    }
}

/// Result of a guarded post attempt.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum PostOutcome {
    Posted { id: String },
    /// Would have been posted; only logged.
    DryRun { text: String },
    TooLong { chars: usize, max: usize },
    DailyLimit,
    TooSoon { wait: Duration },
    Failed { error: String },
}

impl PostOutcome {
    pub fn is_success(&self) -> bool {
        matches!(self, PostOutcome::Posted { .. } | PostOutcome::DryRun { .. })
    }
}

pub struct GuardedPoster<S: SocialClient> {
    client: S,
    limiter: RateLimiter,
    min_interval: Duration,
    signature: Option<String>,
    max_chars: usize,
    /// Time of the last successful post. Held from the spacing check until
    /// the post is recorded, so concurrent callers are serialized.
    last_post: Mutex<Option<DateTime<Utc>>>,
    clock: SharedClock,
}

impl<S: SocialClient> GuardedPoster<S> {
    pub fn new(client: S, config: &SocialChannelConfig, clock: SharedClock) -> Self {
        Self {
            client,
            limiter: RateLimiter::per_day(config.max_posts_per_day, clock.clone()),
            min_interval: Duration::from_secs(config.min_interval_secs),
            signature: Some(config.signature.clone()).filter(|s| !s.is_empty()),
            max_chars: config.max_chars,
            last_post: Mutex::new(None),
            clock,
        }
    }

    /// Text as it would be published: the signature is appended unless the
    /// text already ends with it.
    pub fn signed(&self, text: &str) -> String {
        match &self.signature {
            Some(sig) if !text.ends_with(sig.as_str()) => format!("{text}{sig}"),
            _ => text.to_string(),
        }
    }

    pub async fn post(&self, text: &str, dry_run: bool) -> PostOutcome {
        let text = self.signed(text);

        let chars = text.chars().count();
        if chars > self.max_chars {
            tracing::error!("❌ Post too long: {chars} chars (max {})", self.max_chars);
            return PostOutcome::TooLong { chars, max: self.max_chars };
        }

        if dry_run {
            let head: String = text.chars().take(50).collect();
            tracing::info!("📝 [dry-run] Would post: {head}...");
            return PostOutcome::DryRun { text };
        }

        let mut last_post = self.last_post.lock().await;

        // Checked before the daily budget so a rejected attempt costs nothing.
        if let Some(wait) = self.spacing_wait(*last_post) {
            tracing::warn!("⏳ Last post was less than {}s ago", self.min_interval.as_secs());
            return PostOutcome::TooSoon { wait };
        }

        if !self.limiter.allow() {
            tracing::warn!("🚦 Daily post limit reached ({}/day)", self.limiter.max_requests());
            return PostOutcome::DailyLimit;
        }

        match self.client.post(&text).await {
            Ok(id) => {
                *last_post = Some(self.clock.utc());
                tracing::info!("📣 Posted via {}, id {id}", self.client.name());
                PostOutcome::Posted { id }
            }
            Err(e) => {
                tracing::error!("❌ Post failed: {e}");
                PostOutcome::Failed { error: e.to_string() }
            }
        }
    }

    /// Remaining wait before another post is allowed, if any.
    fn spacing_wait(&self, last_post: Option<DateTime<Utc>>) -> Option<Duration> {
        let last = last_post?;
        let elapsed = (self.clock.utc() - last).to_std().unwrap_or(Duration::ZERO);
        (elapsed < self.min_interval).then(|| self.min_interval - elapsed)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;
    use nucleo_scheduler::ManualClock;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::sync::{Arc, Mutex as StdMutex};

    #[derive(Default)]
    struct FakeSocial {
        posts: StdMutex<Vec<String>>,
        fail: bool,
        /// Simulated API latency.
        latency: Option<Duration>,
        calls: AtomicUsize,
    }

    #[async_trait]
    impl SocialClient for FakeSocial {
        fn name(&self) -> &str {
            "fake"
        }

        async fn post(&self, text: &str) -> Result<String> {
            let n = self.calls.fetch_add(1, Ordering::SeqCst);
            if let Some(latency) = self.latency {
                tokio::time::sleep(latency).await;
            }
            if self.fail {
                return Err(NucleoError::Channel("503 Service Unavailable".into()));
            }
            self.posts.lock().unwrap().push(text.to_string());
            Ok(format!("post-{n}"))
        }
    }

    fn clock() -> Arc<ManualClock> {
        Arc::new(ManualClock::new(
            Utc.with_ymd_and_hms(2026, 2, 22, 8, 0, 0).unwrap(),
        ))
    }

    fn config() -> SocialChannelConfig {
        SocialChannelConfig {
            signature: " #cc".into(),
            max_posts_per_day: 2,
            min_interval_secs: 300,
            max_chars: 20,
            ..Default::default()
        }
    }

    #[test]
    fn test_signature_added_once() {
        let poster = GuardedPoster::new(FakeSocial::default(), &config(), clock());
        assert_eq!(poster.signed("hello"), "hello #cc");
        assert_eq!(poster.signed("hello #cc"), "hello #cc");
    }

    #[tokio::test]
    async fn test_too_long_after_signing() {
        let poster = GuardedPoster::new(FakeSocial::default(), &config(), clock());
        // 17 + 4 signature chars = 21 > 20
        let outcome = poster.post(&"a".repeat(17), false).await;
        assert_eq!(outcome, PostOutcome::TooLong { chars: 21, max: 20 });
        assert_eq!(poster.client.calls.load(Ordering::SeqCst), 0);
    }

    #[tokio::test]
    async fn test_dry_run_does_not_post_or_spend_budget() {
        let poster = GuardedPoster::new(FakeSocial::default(), &config(), clock());
        let outcome = poster.post("hi", true).await;
        assert_eq!(outcome, PostOutcome::DryRun { text: "hi #cc".into() });
        assert!(outcome.is_success());
        assert_eq!(poster.client.calls.load(Ordering::SeqCst), 0);
        assert_eq!(poster.limiter.remaining(), 2);
    }

    #[tokio::test]
    async fn test_min_interval_then_daily_limit() {
        let clock = clock();
        let poster = GuardedPoster::new(FakeSocial::default(), &config(), clock.clone());

        assert_eq!(poster.post("one", false).await, PostOutcome::Posted { id: "post-0".into() });

        clock.advance(Duration::from_secs(100));
        assert_eq!(
            poster.post("two", false).await,
            PostOutcome::TooSoon { wait: Duration::from_secs(200) }
        );

        clock.advance(Duration::from_secs(200));
        assert!(poster.post("two", false).await.is_success());

        clock.advance(Duration::from_secs(600));
        assert_eq!(poster.post("three", false).await, PostOutcome::DailyLimit);

        let posts = poster.client.posts.lock().unwrap().clone();
        assert_eq!(posts, vec!["one #cc".to_string(), "two #cc".to_string()]);
    }

    #[tokio::test]
    async fn test_failed_post_does_not_start_interval() {
        let clock = clock();
        let failing = FakeSocial {
            fail: true,
            ..Default::default()
        };
        let poster = GuardedPoster::new(failing, &config(), clock);

        let outcome = poster.post("x", false).await;
        assert!(matches!(outcome, PostOutcome::Failed { ref error } if error.contains("503")));
        assert!(poster.last_post.lock().await.is_none());
    }

    #[tokio::test(start_paused = true)]
    async fn test_concurrent_posts_respect_min_interval() {
        let slow = FakeSocial {
            latency: Some(Duration::from_secs(2)),
            ..Default::default()
        };
        let poster = GuardedPoster::new(slow, &config(), clock());

        let (a, b) = tokio::join!(poster.post("left", false), poster.post("right", false));
        let outcomes = [a, b];

        assert_eq!(outcomes.iter().filter(|o| matches!(o, PostOutcome::Posted { .. })).count(), 1);
        assert_eq!(
            outcomes.iter().filter(|o| matches!(o, PostOutcome::TooSoon { .. })).count(),
            1
        );
        assert_eq!(poster.client.calls.load(Ordering::SeqCst), 1);
        assert_eq!(poster.limiter.remaining(), 1);
    }

    #[test]
    fn test_endpoint() {
        let client = HttpSocialClient::new(&SocialChannelConfig {
            api_base: "https://api.example.com/".into(),
            ..Default::default()
        })
        .unwrap();
        assert_eq!(client.endpoint(), "https://api.example.com/2/tweets");
    }
}
