//! Agent-mediated ticket fetcher.
//!
//! Delegates the fetch to the AI backend's own platform integrations: the
//! backend is prompted with a structured per-platform template and its
//! free-text answer is mined for a JSON object. This is the primary fetch
//! path whenever the configured backend supports it.

use std::sync::Arc;

use async_trait::async_trait;
use serde_json::Value;
use tracing::debug;

use crate::backend::AiBackend;
use crate::config::AgentConfig;
use crate::ticket::registry::ProviderRegistry;
use crate::ticket::Platform;

use super::{extract_json_from_text, FetchError, TicketFetcher};

/// Platforms the agent-mediated path can serve at all.
const SUPPORTED_PLATFORMS: [Platform; 3] = [Platform::Jira, Platform::Linear, Platform::GitHub];

pub struct AgentMediatedFetcher {
    backend: Arc<dyn AiBackend>,
    agent_config: Option<AgentConfig>,
    registry: Arc<ProviderRegistry>,
    name: String,
}

impl AgentMediatedFetcher {
    pub fn new(
        backend: Arc<dyn AiBackend>,
        agent_config: Option<AgentConfig>,
        registry: Arc<ProviderRegistry>,
    ) -> Self {
        let name = format!("{} agent fetcher", backend.name());
        Self { backend, agent_config, registry, name }
    }

    fn build_prompt(&self, ticket_id: &str, platform: Platform) -> Result<String, FetchError> {
        let provider = self
            .registry
            .get_provider(platform)
            .map_err(|e| FetchError::integration(&self.name, e.to_string()))?;
        Ok(provider.prompt_template().replace("{ticket_id}", ticket_id))
    }
}

#[async_trait]
impl TicketFetcher for AgentMediatedFetcher {
    fn name(&self) -> &str {
        &self.name
    }

    fn supports_platform(&self, platform: Platform) -> bool {
        if !SUPPORTED_PLATFORMS.contains(&platform) {
            return false;
        }
        match &self.agent_config {
            Some(config) => config.supports_platform(&platform.name().to_ascii_lowercase()),
            // No config to consult: assume the built-in set is available.
            None => true,
        }
    }

    async fn fetch_raw(&self, ticket_id: &str, platform: Platform) -> Result<Value, FetchError> {
        if !self.supports_platform(platform) {
            return Err(FetchError::PlatformNotSupported {
                platform,
                fetcher_name: self.name.clone(),
            });
        }

        let prompt = self.build_prompt(ticket_id, platform)?;
        debug!(platform = platform.name(), ticket_id, "agent-mediated fetch");

        // The backend call is synchronous; keep the async caller responsive.
        let backend = Arc::clone(&self.backend);
        let output = tokio::task::spawn_blocking(move || backend.run_print_quiet(&prompt))
            .await
            .map_err(|e| FetchError::integration(&self.name, format!("worker panicked: {e}")))?
            .map_err(|e| {
                FetchError::integration(&self.name, format!("backend invocation failed: {e}"))
            })?;

        extract_json_from_text(&output).map_err(|message| FetchError::AgentResponseParse {
            agent_name: self.name.clone(),
            message,
            raw_response: Some(output),
        })
    }
}

// ============================================================================
// TESTS
// ============================================================================

#[cfg(test)]
mod tests {
    use super::*;
    use crate::backend::MockBackend;
    use crate::ticket::provider::ProviderContext;

    fn fetcher_with(backend: MockBackend) -> AgentMediatedFetcher {
        let registry =
            Arc::new(ProviderRegistry::with_default_providers(ProviderContext::default()));
        AgentMediatedFetcher::new(Arc::new(backend), None, registry)
    }

    #[test]
    fn test_supports_only_builtin_platforms() {
        let fetcher = fetcher_with(MockBackend::new());
        assert!(fetcher.supports_platform(Platform::Jira));
        assert!(fetcher.supports_platform(Platform::Linear));
        assert!(fetcher.supports_platform(Platform::GitHub));
        assert!(!fetcher.supports_platform(Platform::Trello));
        assert!(!fetcher.supports_platform(Platform::Monday));
        assert!(!fetcher.supports_platform(Platform::AzureDevOps));
    }

    #[test]
    fn test_config_gates_supported_platforms() {
        let mut config = AgentConfig::default();
        config.integrations_configured = true;
        config.integrations.insert("jira".into(), true);
        let registry =
            Arc::new(ProviderRegistry::with_default_providers(ProviderContext::default()));
        let fetcher =
            AgentMediatedFetcher::new(Arc::new(MockBackend::new()), Some(config), registry);
        assert!(fetcher.supports_platform(Platform::Jira));
        assert!(!fetcher.supports_platform(Platform::Linear));
    }

    #[tokio::test]
    async fn test_fetch_parses_bare_json() {
        let backend = MockBackend::new().with_response(r#"{"key": "PROJ-1", "summary": "T"}"#);
        let fetcher = fetcher_with(backend);
        let raw = fetcher.fetch_raw("PROJ-1", Platform::Jira).await.unwrap();
        assert_eq!(raw["key"], "PROJ-1");
    }

    #[tokio::test]
    async fn test_fetch_interpolates_ticket_id() {
        let backend = MockBackend::new().with_response(r#"{"key": "PROJ-1"}"#);
        let registry =
            Arc::new(ProviderRegistry::with_default_providers(ProviderContext::default()));
        let backend = Arc::new(backend);
        let fetcher = AgentMediatedFetcher::new(backend.clone(), None, registry);
        fetcher.fetch_raw("PROJ-1", Platform::Jira).await.unwrap();
        let prompts = backend.prompts();
        assert!(prompts[0].contains("PROJ-1"));
        assert!(!prompts[0].contains("{ticket_id}"));
    }

    #[tokio::test]
    async fn test_fetch_markdown_response() {
        let backend =
            MockBackend::new().with_response("Sure!\n```json\n{\"identifier\": \"T-1\"}\n```");
        let fetcher = fetcher_with(backend);
        let raw = fetcher.fetch_raw("T-1", Platform::Linear).await.unwrap();
        assert_eq!(raw["identifier"], "T-1");
    }

    #[tokio::test]
    async fn test_unsupported_platform_errors() {
        let fetcher = fetcher_with(MockBackend::new());
        let err = fetcher.fetch_raw("x", Platform::Trello).await.unwrap_err();
        assert!(matches!(err, FetchError::PlatformNotSupported { .. }));
    }

    #[tokio::test]
    async fn test_empty_response_is_parse_error() {
        let backend = MockBackend::new().with_response("");
        let fetcher = fetcher_with(backend);
        let err = fetcher.fetch_raw("PROJ-1", Platform::Jira).await.unwrap_err();
        assert!(matches!(err, FetchError::AgentResponseParse { .. }));
    }

    #[tokio::test]
    async fn test_unparseable_response_keeps_raw() {
        let backend = MockBackend::new().with_response("I could not find that ticket.");
        let fetcher = fetcher_with(backend);
        let err = fetcher.fetch_raw("PROJ-1", Platform::Jira).await.unwrap_err();
        match err {
            FetchError::AgentResponseParse { raw_response, .. } => {
                assert_eq!(raw_response.as_deref(), Some("I could not find that ticket."));
            }
            other => panic!("expected AgentResponseParse, got {other:?}"),
        }
    }

    #[tokio::test]
    async fn test_backend_failure_is_integration_error() {
        let backend = MockBackend::new().with_failure("agent down");
        let fetcher = fetcher_with(backend);
        let err = fetcher.fetch_raw("PROJ-1", Platform::Jira).await.unwrap_err();
        assert!(matches!(err, FetchError::AgentIntegration { .. }));
    }
}
