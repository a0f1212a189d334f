//! # Ticket Service
//!
//! The full acquisition path: detect platform → consult cache → fetch
//! (primary, then fallback on agent errors) → normalize → cache → return.
//!
//! The service owns the fallback fetcher's lifetime; the primary may be
//! shared with other components. `close()` is idempotent and later
//! `get_ticket` calls fail with a clear error.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use chrono::Duration;
use tracing::{debug, info};

use crate::backend::AiBackend;
use crate::config::{ConfigManager, FetchStrategy};
use crate::ticket::auth::AuthStore;
use crate::ticket::cache::{CacheKey, TicketCache};
use crate::ticket::fetch::agent::AgentMediatedFetcher;
use crate::ticket::fetch::direct::DirectApiFetcher;
use crate::ticket::fetch::{FetchError, TicketFetcher};
use crate::ticket::provider::TicketIdFormatError;
use crate::ticket::registry::{ProviderRegistry, RegistryError};
use crate::ticket::{GenericTicket, Platform};

// ============================================================================
// ERRORS
// ============================================================================

/// Ticket service failures.
#[derive(Debug, thiserror::Error)]
pub enum ServiceError {
    #[error(transparent)]
    Registry(#[from] RegistryError),

    #[error(transparent)]
    TicketIdFormat(#[from] TicketIdFormatError),

    #[error(transparent)]
    Fetch(#[from] FetchError),

    #[error("no configured fetcher supports platform {0}")]
    NoFetcherForPlatform(Platform),

    #[error("ticket service is not configured: {0}")]
    NotConfigured(String),

    #[error("ticket service is closed")]
    Closed,
}

// ============================================================================
// SERVICE
// ============================================================================

pub struct TicketService {
    registry: Arc<ProviderRegistry>,
    primary: Option<Arc<dyn TicketFetcher>>,
    fallback: Option<Arc<dyn TicketFetcher>>,
    cache: Option<Arc<dyn TicketCache>>,
    default_ttl: Duration,
    closed: AtomicBool,
}

impl TicketService {
    pub fn new(
        registry: Arc<ProviderRegistry>,
        primary: Option<Arc<dyn TicketFetcher>>,
        fallback: Option<Arc<dyn TicketFetcher>>,
        cache: Option<Arc<dyn TicketCache>>,
        default_ttl: Duration,
    ) -> Self {
        Self { registry, primary, fallback, cache, default_ttl, closed: AtomicBool::new(false) }
    }

    pub fn has_cache(&self) -> bool {
        self.cache.is_some()
    }

    /// Fetch and normalize a ticket from any recognised input form.
    pub async fn get_ticket(
        &self,
        input: &str,
        skip_cache: bool,
        ttl: Option<Duration>,
    ) -> Result<GenericTicket, ServiceError> {
        if self.closed.load(Ordering::SeqCst) {
            return Err(ServiceError::Closed);
        }

        let provider = self.registry.get_provider_for_input(input)?;
        let platform = provider.platform();
        let ticket_id = provider.parse_input(input)?;
        let key = CacheKey::new(platform, ticket_id.clone());

        if !skip_cache {
            if let Some(cache) = &self.cache {
                if let Some(ticket) = cache.get(&key) {
                    debug!(%key, "serving ticket from cache");
                    return Ok(ticket);
                }
            }
        }

        let raw = self.fetch_raw(&ticket_id, platform).await?;
        let ticket = provider.normalize(&raw, Some(&ticket_id));

        if let Some(cache) = &self.cache {
            cache.set(&ticket, Some(ttl.unwrap_or(self.default_ttl)), None);
        }
        Ok(ticket)
    }

    /// Primary first; on an agent-side failure, one fallback attempt.
    async fn fetch_raw(
        &self,
        ticket_id: &str,
        platform: Platform,
    ) -> Result<serde_json::Value, ServiceError> {
        let primary_supports =
            self.primary.as_ref().is_some_and(|f| f.supports_platform(platform));
        let fallback_supports =
            self.fallback.as_ref().is_some_and(|f| f.supports_platform(platform));

        if primary_supports {
            let primary = self.primary.as_ref().expect("primary_supports implies primary");
            match primary.fetch_raw(ticket_id, platform).await {
                Ok(raw) => return Ok(raw),
                // These three drive fallback; anything else propagates.
                Err(
                    error @ (FetchError::AgentIntegration { .. }
                    | FetchError::AgentFetch { .. }
                    | FetchError::AgentResponseParse { .. }),
                ) => {
                    if fallback_supports {
                        info!(
                            platform = platform.name(),
                            error = %error,
                            "primary fetch failed, trying fallback"
                        );
                        let fallback =
                            self.fallback.as_ref().expect("fallback_supports implies fallback");
                        return Ok(fallback.fetch_raw(ticket_id, platform).await?);
                    }
                    return Err(error.into());
                }
                Err(error) => return Err(error.into()),
            }
        }

        if fallback_supports {
            let fallback = self.fallback.as_ref().expect("fallback_supports implies fallback");
            return Ok(fallback.fetch_raw(ticket_id, platform).await?);
        }

        Err(ServiceError::NoFetcherForPlatform(platform))
    }

    pub fn invalidate_cache(&self, key: &CacheKey) {
        if let Some(cache) = &self.cache {
            cache.invalidate(key);
        }
    }

    pub fn clear_cache(&self, platform: Option<Platform>) {
        if let Some(cache) = &self.cache {
            match platform {
                Some(platform) => cache.clear_platform(platform),
                None => cache.clear(),
            }
        }
    }

    /// Dispose owned resources. The fallback fetcher is owned by the
    /// service; the primary may be shared and is left alone. Idempotent.
    pub async fn close(&self) {
        if self.closed.swap(true, Ordering::SeqCst) {
            return;
        }
        if let Some(fallback) = &self.fallback {
            fallback.close().await;
        }
    }
}

// ============================================================================
// FACTORY
// ============================================================================

/// Wire a [`TicketService`] from configuration.
///
/// The primary fetcher follows the backend platform: agent-capable backends
/// (Auggie, Claude, Cursor) get the agent-mediated fetcher; Manual and
/// Aider go straight to the direct API. The direct fetcher additionally
/// serves as fallback whenever fallback credentials exist, unless the
/// configured fetch strategy pins a single path.
pub fn create_ticket_service(
    backend: Option<Arc<dyn AiBackend>>,
    auth: Arc<AuthStore>,
    config: &ConfigManager,
    registry: Arc<ProviderRegistry>,
    cache: Option<Arc<dyn TicketCache>>,
) -> Result<TicketService, ServiceError> {
    let agent_config = config
        .agent_config()
        .map_err(|e| ServiceError::NotConfigured(e.to_string()))?;
    let strategy = config
        .fetch_strategy_config()
        .map_err(|e| ServiceError::NotConfigured(e.to_string()))?;
    let performance = config.fetch_performance_config();

    let direct: Arc<dyn TicketFetcher> =
        Arc::new(DirectApiFetcher::new(Arc::clone(&auth), performance));

    let agent: Option<Arc<dyn TicketFetcher>> = match (&backend, strategy.default) {
        (_, FetchStrategy::Direct) => None,
        (Some(backend), _) if agent_config.platform.supports_agent_fetch() => {
            Some(Arc::new(AgentMediatedFetcher::new(
                Arc::clone(backend),
                Some(agent_config),
                Arc::clone(&registry),
            )))
        }
        _ => None,
    };

    let (primary, fallback) = match (agent, strategy.default) {
        (Some(agent), FetchStrategy::Agent) => (Some(agent), None),
        (Some(agent), _) => (Some(agent), Some(direct)),
        (None, FetchStrategy::Agent) => {
            return Err(ServiceError::NotConfigured(
                "fetch strategy is 'agent' but the configured backend cannot fetch tickets"
                    .to_string(),
            ));
        }
        (None, _) => (Some(direct), None),
    };

    Ok(TicketService::new(
        registry,
        primary,
        fallback,
        cache,
        performance.cache_ttl(),
    ))
}

// ============================================================================
// TESTS
// ============================================================================
