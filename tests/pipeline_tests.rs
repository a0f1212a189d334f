//! Ticket-pipeline integration tests over the public API.
//!
//! Covers the cache-hit short circuit and the agent → direct fallback path
//! with real provider normalization in the loop.

use std::collections::BTreeMap;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;

use async_trait::async_trait;
use serde_json::{json, Value};

use ingot::backend::MockBackend;
use ingot::ticket::cache::{CacheKey, InMemoryTicketCache, TicketCache};
use ingot::ticket::fetch::agent::AgentMediatedFetcher;
use ingot::ticket::fetch::{FetchError, TicketFetcher};
use ingot::ticket::provider::{NonInteractive, ProviderContext};
use ingot::ticket::registry::ProviderRegistry;
use ingot::ticket::service::TicketService;
use ingot::ticket::{GenericTicket, Platform, TicketStatus};

fn jira_pinned_registry() -> Arc<ProviderRegistry> {
    let mut config = BTreeMap::new();
    config.insert("default_platform".to_string(), "jira".to_string());
    Arc::new(ProviderRegistry::with_default_providers(ProviderContext::new(
        config,
        Arc::new(NonInteractive),
    )))
}

/// Direct-API stand-in serving canned payloads; counts invocations.
struct CannedDirectFetcher {
    payload: Value,
    calls: AtomicUsize,
}

impl CannedDirectFetcher {
    fn new(payload: Value) -> Arc<Self> {
        Arc::new(Self { payload, calls: AtomicUsize::new(0) })
    }
}

#[async_trait]
impl TicketFetcher for CannedDirectFetcher {
    fn name(&self) -> &str {
        "canned direct fetcher"
    }
    fn supports_platform(&self, platform: Platform) -> bool {
        platform == Platform::Jira
    }
    async fn fetch_raw(&self, _id: &str, _platform: Platform) -> Result<Value, FetchError> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        Ok(self.payload.clone())
    }
}

#[tokio::test]
async fn cache_hit_short_circuits_the_fetchers() {
    let registry = jira_pinned_registry();
    let cache: Arc<dyn TicketCache> = Arc::new(InMemoryTicketCache::default());

    let mut primed = GenericTicket::with_id_only("PROJ-1", Platform::Jira);
    primed.title = "Primed ticket".to_string();
    cache.set(&primed, None, None);

    let backend = Arc::new(MockBackend::new());
    let primary = Arc::new(AgentMediatedFetcher::new(
        backend.clone(),
        None,
        Arc::clone(&registry),
    ));

    let service = TicketService::new(
        registry,
        Some(primary),
        None,
        Some(cache),
        chrono::Duration::hours(1),
    );

    let ticket = service.get_ticket("PROJ-1", false, None).await.unwrap();
    assert_eq!(ticket.title, "Primed ticket");
    // The oracle was never consulted.
    assert_eq!(backend.call_count(), 0);
}

#[tokio::test]
async fn agent_failure_falls_back_to_direct_and_normalizes() {
    let registry = jira_pinned_registry();

    // Primary: the backend invocation fails outright.
    let backend = Arc::new(MockBackend::new().with_failure("agent down"));
    let primary = Arc::new(AgentMediatedFetcher::new(
        backend.clone(),
        None,
        Arc::clone(&registry),
    ));

    // Fallback: serves the raw Jira payload from Scenario B.
    let fallback = CannedDirectFetcher::new(json!({
        "key": "PROJ-2",
        "fields": {"summary": "Test", "status": {"name": "In Progress"}}
    }));

    let cache: Arc<dyn TicketCache> = Arc::new(InMemoryTicketCache::default());
    let service = TicketService::new(
        registry,
        Some(primary),
        Some(fallback.clone()),
        Some(Arc::clone(&cache)),
        chrono::Duration::hours(1),
    );

    let ticket = service.get_ticket("PROJ-2", false, None).await.unwrap();
    assert_eq!(ticket.id, "PROJ-2");
    assert_eq!(ticket.status, TicketStatus::InProgress);
    assert_eq!(backend.call_count(), 1);
    assert_eq!(fallback.calls.load(Ordering::SeqCst), 1);

    // The normalized ticket was cached for next time.
    let key = CacheKey::new(Platform::Jira, "PROJ-2");
    assert_eq!(cache.get(&key).unwrap().status, TicketStatus::InProgress);
}

#[tokio::test]
async fn unparseable_agent_output_drives_fallback() {
    let registry = jira_pinned_registry();
    let backend = Arc::new(MockBackend::new().with_response("Sorry, I cannot find that."));
    let primary = Arc::new(AgentMediatedFetcher::new(
        backend.clone(),
        None,
        Arc::clone(&registry),
    ));
    let fallback = CannedDirectFetcher::new(json!({
        "key": "PROJ-3",
        "fields": {"summary": "Recovered", "status": {"name": "Done"}}
    }));

    let service = TicketService::new(
        registry,
        Some(primary),
        Some(fallback.clone()),
        None,
        chrono::Duration::hours(1),
    );

    let ticket = service.get_ticket("PROJ-3", false, None).await.unwrap();
    assert_eq!(ticket.title, "Recovered");
    assert_eq!(ticket.status, TicketStatus::Done);
}

#[tokio::test]
async fn agent_success_skips_fallback_entirely() {
    let registry = jira_pinned_registry();
    let backend = Arc::new(MockBackend::new().with_response(
        r#"{"key": "PROJ-4", "summary": "From agent", "status": "Open", "issuetype": "Task"}"#,
    ));
    let primary = Arc::new(AgentMediatedFetcher::new(
        backend.clone(),
        None,
        Arc::clone(&registry),
    ));
    let fallback = CannedDirectFetcher::new(json!({}));

    let service = TicketService::new(
        registry,
        Some(primary),
        Some(fallback.clone()),
        None,
        chrono::Duration::hours(1),
    );

    let ticket = service.get_ticket("PROJ-4", false, None).await.unwrap();
    assert_eq!(ticket.title, "From agent");
    assert_eq!(fallback.calls.load(Ordering::SeqCst), 0);
}
