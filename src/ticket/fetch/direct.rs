//! Direct-API ticket fetcher.
//!
//! The fallback path when agent-mediated fetching is unavailable: typed
//! HTTP calls against each platform's API through the per-platform handlers,
//! guided by [`FetchPerformanceConfig`] for timeout and retry budget.
//!
//! Retry classification:
//!
//! - credential/id-format errors → `AgentIntegration`, never retried
//! - semantic not-found and platform-logical errors → `AgentFetch`, never
//!   retried
//! - HTTP 4xx except 429 → `AgentFetch`, never retried
//! - HTTP 429 → retried, honoring `Retry-After` (integer seconds or
//!   HTTP-date, negatives clamped to zero)
//! - HTTP 5xx, timeouts, other network errors → retried with jittered
//!   exponential backoff

use std::collections::BTreeMap;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use async_trait::async_trait;
use chrono::Utc;
use rand::Rng;
use serde_json::Value;
use tracing::{debug, warn};

use crate::config::FetchPerformanceConfig;
use crate::ticket::auth::AuthStore;
use crate::ticket::Platform;

use super::handlers::{
    AzureDevOpsHandler, GitHubHandler, HandlerError, JiraHandler, LinearHandler, MondayHandler,
    PlatformHandler, TrelloHandler,
};
use super::{FetchError, TicketFetcher};

const FETCHER_NAME: &str = "Direct API Fetcher";

// ============================================================================
// RETRY CLASSIFICATION
// ============================================================================

#[derive(Debug, PartialEq)]
enum Disposition {
    /// Map to `AgentIntegration`; do not retry.
    FailIntegration,
    /// Map to `AgentFetch`; do not retry.
    FailFetch,
    /// Retry after the rate-limit delay.
    RetryRateLimited { retry_after: Option<String> },
    /// Retry with exponential backoff.
    Retry,
}

fn classify(error: &HandlerError) -> Disposition {
    match error {
        HandlerError::CredentialValidation { .. } | HandlerError::TicketIdFormat { .. } => {
            Disposition::FailIntegration
        }
        // Logical platform failures and not-found are fetch failures, not
        // transport problems; retrying cannot help.
        HandlerError::PlatformApi { .. } | HandlerError::PlatformNotFound { .. } => {
            Disposition::FailFetch
        }
        HandlerError::Status { status: 429, retry_after, .. } => {
            Disposition::RetryRateLimited { retry_after: retry_after.clone() }
        }
        HandlerError::Status { status, .. } if (400..500).contains(status) => {
            Disposition::FailFetch
        }
        HandlerError::Status { .. } => Disposition::Retry,
        HandlerError::Network { .. } => Disposition::Retry,
    }
}

/// Backoff delay for an attempt: `base · 2^attempt` plus up to 10% jitter.
fn backoff_delay(base_seconds: f64, attempt: u32) -> Duration {
    let delay = base_seconds * 2f64.powi(attempt as i32);
    let jitter = rand::thread_rng().gen_range(0.0..=(delay * 0.1).max(f64::MIN_POSITIVE));
    Duration::from_secs_f64(delay + jitter)
}

/// Delay derived from a `Retry-After` header value.
///
/// Supports both RFC 7231 forms: delay-seconds and HTTP-date. A past date
/// clamps to zero; an unparseable value falls back to exponential backoff.
fn retry_after_delay(retry_after: Option<&str>, base_seconds: f64, attempt: u32) -> Duration {
    if let Some(raw) = retry_after {
        if let Ok(seconds) = raw.trim().parse::<f64>() {
            return Duration::from_secs_f64(seconds.max(0.0));
        }
        if let Ok(date) = chrono::DateTime::parse_from_rfc2822(raw.trim()) {
            let seconds = (date.with_timezone(&Utc) - Utc::now()).num_milliseconds() as f64 / 1000.0;
            return Duration::from_secs_f64(seconds.max(0.0));
        }
        warn!(retry_after = raw, "unparseable Retry-After header, using exponential backoff");
    }
    Duration::from_secs_f64(base_seconds * 2f64.powi(attempt as i32))
}

// ============================================================================
// FETCHER
// ============================================================================

/// Fetches tickets directly from platform APIs using fallback credentials.
pub struct DirectApiFetcher {
    auth: Arc<AuthStore>,
    performance: FetchPerformanceConfig,
    /// Shared connection-pooled client, created lazily on first request.
    client: Mutex<Option<reqwest::Client>>,
    /// Handlers are created lazily per platform and cached.
    handlers: Mutex<BTreeMap<Platform, Arc<dyn PlatformHandler>>>,
    closed: AtomicBool,
}

impl DirectApiFetcher {
    pub fn new(auth: Arc<AuthStore>, performance: FetchPerformanceConfig) -> Self {
        Self {
            auth,
            performance,
            client: Mutex::new(None),
            handlers: Mutex::new(BTreeMap::new()),
            closed: AtomicBool::new(false),
        }
    }

    /// Inject a handler instance; used by tests to script API behavior.
    #[cfg(test)]
    pub(crate) fn with_handler(self, platform: Platform, handler: Arc<dyn PlatformHandler>) -> Self {
        self.handlers.lock().expect("handler mutex poisoned").insert(platform, handler);
        self
    }

    fn http_client(&self) -> Result<reqwest::Client, FetchError> {
        if self.closed.load(Ordering::SeqCst) {
            return Err(FetchError::fetch(FETCHER_NAME, "fetcher is closed"));
        }
        let mut guard = self.client.lock().expect("client mutex poisoned");
        if guard.is_none() {
            let client = reqwest::Client::builder()
                .timeout(Duration::from_secs(self.performance.timeout_seconds))
                .build()
                .map_err(|e| {
                    FetchError::integration(FETCHER_NAME, format!("HTTP client init failed: {e}"))
                })?;
            *guard = Some(client);
        }
        Ok(guard.as_ref().expect("just initialized").clone())
    }

    fn handler_for(&self, platform: Platform) -> Arc<dyn PlatformHandler> {
        let mut handlers = self.handlers.lock().expect("handler mutex poisoned");
        Arc::clone(handlers.entry(platform).or_insert_with(|| match platform {
            Platform::Jira => Arc::new(JiraHandler),
            Platform::Linear => Arc::new(LinearHandler),
            Platform::GitHub => Arc::new(GitHubHandler),
            Platform::AzureDevOps => Arc::new(AzureDevOpsHandler),
            Platform::Monday => Arc::new(MondayHandler),
            Platform::Trello => Arc::new(TrelloHandler),
        }))
    }

    async fn fetch_with_retry(
        &self,
        handler: Arc<dyn PlatformHandler>,
        ticket_id: &str,
        credentials: &crate::ticket::auth::Credentials,
        client: &reqwest::Client,
    ) -> Result<Value, FetchError> {
        let max_retries = self.performance.max_retries;
        let base = self.performance.retry_delay_seconds;
        let mut last_error: Option<HandlerError> = None;

        for attempt in 0..=max_retries {
            match handler.fetch(ticket_id, credentials, client).await {
                Ok(raw) => return Ok(raw),
                Err(error) => match classify(&error) {
                    Disposition::FailIntegration => {
                        return Err(FetchError::integration(FETCHER_NAME, error.to_string()));
                    }
                    Disposition::FailFetch => {
                        return Err(FetchError::fetch(FETCHER_NAME, error.to_string()));
                    }
                    Disposition::RetryRateLimited { retry_after } => {
                        let delay = retry_after_delay(retry_after.as_deref(), base, attempt);
                        warn!(
                            ticket_id,
                            attempt = attempt + 1,
                            total = max_retries + 1,
                            delay_secs = delay.as_secs_f64(),
                            "rate limited, backing off"
                        );
                        last_error = Some(error);
                        if attempt < max_retries {
                            tokio::time::sleep(delay).await;
                        }
                    }
                    Disposition::Retry => {
                        warn!(
                            ticket_id,
                            attempt = attempt + 1,
                            total = max_retries + 1,
                            error = %error,
                            "transient fetch error"
                        );
                        last_error = Some(error);
                        if attempt < max_retries {
                            tokio::time::sleep(backoff_delay(base, attempt)).await;
                        }
                    }
                },
            }
        }

        let detail = last_error.map(|e| e.to_string()).unwrap_or_else(|| "unknown".to_string());
        Err(FetchError::fetch(
            FETCHER_NAME,
            format!("API request failed after {} attempts: {detail}", max_retries + 1),
        ))
    }
}

#[async_trait]
impl TicketFetcher for DirectApiFetcher {
    fn name(&self) -> &str {
        FETCHER_NAME
    }

    /// Cheap check against configured credentials; full validation happens
    /// during the fetch.
    fn supports_platform(&self, platform: Platform) -> bool {
        self.auth.has_fallback_configured(platform)
    }

    async fn fetch_raw(&self, ticket_id: &str, platform: Platform) -> Result<Value, FetchError> {
        let lookup = self.auth.credentials(platform);
        let Some(credentials) = lookup.credentials() else {
            return Err(FetchError::integration(
                FETCHER_NAME,
                lookup
                    .error_message()
                    .map(str::to_string)
                    .unwrap_or_else(|| format!("No credentials configured for {platform}")),
            ));
        };

        let client = self.http_client()?;
        let handler = self.handler_for(platform);
        debug!(platform = platform.name(), ticket_id, "direct API fetch");
        self.fetch_with_retry(handler, ticket_id, credentials, &client).await
    }

    /// Dispose the pooled HTTP client. Idempotent; later fetches fail with a
    /// clear error.
    async fn close(&self) {
        self.closed.store(true, Ordering::SeqCst);
        let mut guard = self.client.lock().expect("client mutex poisoned");
        *guard = None;
    }
}

// ============================================================================
// TESTS
// ============================================================================
