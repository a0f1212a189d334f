//! # Provider Registry
//!
//! Platform → provider singleton lookup with lazy instantiation and
//! input-based platform detection.
//!
//! Registration is explicit: `main` (or a test) registers every provider at
//! startup. A single mutex guards registrations, the instance cache, and the
//! injected context; concurrent `get_provider` calls observe the same
//! singleton, and a constructor failure is not cached so the next call
//! retries construction.

use std::collections::BTreeMap;
use std::sync::{Arc, Mutex};

use tracing::warn;

use super::provider::{Provider, ProviderContext};
use super::providers::{
    AzureDevOpsProvider, GitHubProvider, JiraProvider, LinearProvider, MondayProvider,
    TrelloProvider,
};
use super::Platform;

// ============================================================================
// ERRORS
// ============================================================================

/// Registry-level detection and construction failures.
#[derive(Debug, thiserror::Error)]
pub enum RegistryError {
    /// No provider is registered for the platform, or no registered
    /// provider recognises the input.
    #[error("platform not supported for input '{input}' (registered: {})", registered.join(", "))]
    PlatformNotSupported { input: String, registered: Vec<String> },

    /// Several providers claim the input and no disambiguation was made.
    #[error(
        "ticket id '{input}' is ambiguous between {}; pass an explicit platform",
        candidates.join(", ")
    )]
    AmbiguousInput { input: String, candidates: Vec<String> },

    #[error("no provider registered for platform {0}")]
    NotRegistered(Platform),

    #[error("provider construction failed for {platform}: {message}")]
    Construction { platform: Platform, message: String },
}

// ============================================================================
// REGISTRATION
// ============================================================================

type Constructor =
    Box<dyn Fn(&ProviderContext) -> Result<Arc<dyn Provider>, String> + Send + Sync>;

struct Registration {
    /// Identifies the concrete provider type so re-registering the same
    /// type is a no-op while a different type replaces it.
    type_name: &'static str,
    construct: Constructor,
}

struct RegistryInner {
    registrations: BTreeMap<Platform, Registration>,
    instances: BTreeMap<Platform, Arc<dyn Provider>>,
    context: ProviderContext,
}

/// Thread-safe provider registry.
pub struct ProviderRegistry {
    inner: Mutex<RegistryInner>,
}

impl ProviderRegistry {
    /// Empty registry with the given DI context.
    pub fn new(context: ProviderContext) -> Self {
        Self {
            inner: Mutex::new(RegistryInner {
                registrations: BTreeMap::new(),
                instances: BTreeMap::new(),
                context,
            }),
        }
    }

    /// Registry with every built-in provider registered.
    pub fn with_default_providers(context: ProviderContext) -> Self {
        let registry = Self::new(context);
        registry.register::<JiraProvider>(Platform::Jira, |ctx| {
            Ok(Arc::new(JiraProvider::new(ctx)))
        });
        registry.register::<LinearProvider>(Platform::Linear, |ctx| {
            Ok(Arc::new(LinearProvider::new(ctx)))
        });
        registry.register::<GitHubProvider>(Platform::GitHub, |ctx| {
            Ok(Arc::new(GitHubProvider::new(ctx)))
        });
        registry.register::<AzureDevOpsProvider>(Platform::AzureDevOps, |ctx| {
            Ok(Arc::new(AzureDevOpsProvider::new(ctx)))
        });
        registry.register::<MondayProvider>(Platform::Monday, |ctx| {
            Ok(Arc::new(MondayProvider::new(ctx)))
        });
        registry.register::<TrelloProvider>(Platform::Trello, |ctx| {
            Ok(Arc::new(TrelloProvider::new(ctx)))
        });
        registry
    }

    /// Register a provider type for a platform.
    ///
    /// Re-registering the same type is a no-op. Registering a *different*
    /// type for an already-claimed platform replaces the registration,
    /// clears any cached instance, and logs a warning.
    pub fn register<T: 'static>(
        &self,
        platform: Platform,
        construct: impl Fn(&ProviderContext) -> Result<Arc<dyn Provider>, String> + Send + Sync + 'static,
    ) {
        let type_name = std::any::type_name::<T>();
        let mut inner = self.inner.lock().expect("registry mutex poisoned");
        if let Some(existing) = inner.registrations.get(&platform) {
            if existing.type_name == type_name {
                return;
            }
            warn!(
                platform = platform.name(),
                old = existing.type_name,
                new = type_name,
                "replacing provider registration"
            );
            inner.instances.remove(&platform);
        }
        inner
            .registrations
            .insert(platform, Registration { type_name, construct: Box::new(construct) });
    }

    /// Lazily construct (or return the cached) provider for a platform.
    pub fn get_provider(&self, platform: Platform) -> Result<Arc<dyn Provider>, RegistryError> {
        let mut inner = self.inner.lock().expect("registry mutex poisoned");
        Self::instance_locked(&mut inner, platform)
    }

    fn instance_locked(
        inner: &mut RegistryInner,
        platform: Platform,
    ) -> Result<Arc<dyn Provider>, RegistryError> {
        if let Some(instance) = inner.instances.get(&platform) {
            return Ok(Arc::clone(instance));
        }
        let registration = inner
            .registrations
            .get(&platform)
            .ok_or(RegistryError::NotRegistered(platform))?;
        let instance = (registration.construct)(&inner.context)
            .map_err(|message| RegistryError::Construction { platform, message })?;
        inner.instances.insert(platform, Arc::clone(&instance));
        Ok(instance)
    }

    /// Detect the platform for an input and return its provider.
    ///
    /// Heuristic: every registered provider is asked `can_handle`. A single
    /// claimant wins; multiple claimants (the `PROJ-123` ambiguity) are
    /// resolved by a configured `default_platform`, then by asking the
    /// user, and finally rejected as ambiguous.
    pub fn get_provider_for_input(
        &self,
        input: &str,
    ) -> Result<Arc<dyn Provider>, RegistryError> {
        let input = input.trim();

        // Collect candidates under the lock, in stable platform order.
        let (candidates, default_platform, interaction, registered) = {
            let mut inner = self.inner.lock().expect("registry mutex poisoned");
            let platforms: Vec<Platform> = inner.registrations.keys().copied().collect();
            let mut candidates = Vec::new();
            for platform in Platform::ALL {
                if !platforms.contains(&platform) {
                    continue;
                }
                let provider = Self::instance_locked(&mut inner, platform)?;
                if provider.can_handle(input) {
                    candidates.push((platform, provider));
                }
            }
            let default_platform = inner
                .context
                .get("default_platform")
                .and_then(|raw| raw.parse::<Platform>().ok());
            let registered: Vec<String> =
                platforms.iter().map(|p| p.display_name().to_string()).collect();
            (candidates, default_platform, Arc::clone(&inner.context.interaction), registered)
        };

        match candidates.len() {
            0 => Err(RegistryError::PlatformNotSupported { input: input.to_string(), registered }),
            1 => Ok(candidates.into_iter().next().expect("len checked").1),
            _ => {
                if let Some(default) = default_platform {
                    if let Some((_, provider)) =
                        candidates.iter().find(|(p, _)| *p == default)
                    {
                        return Ok(Arc::clone(provider));
                    }
                }
                // Ask the user, outside the registry lock.
                let names: Vec<String> =
                    candidates.iter().map(|(p, _)| p.display_name().to_string()).collect();
                let prompt =
                    format!("Ticket id '{input}' could be from multiple platforms.");
                if let Some(index) = interaction.choose(&prompt, &names) {
                    if let Some((_, provider)) = candidates.get(index) {
                        return Ok(Arc::clone(provider));
                    }
                }
                Err(RegistryError::AmbiguousInput { input: input.to_string(), candidates: names })
            }
        }
    }

    /// Platforms with a registration, in stable order.
    pub fn registered_platforms(&self) -> Vec<Platform> {
        let inner = self.inner.lock().expect("registry mutex poisoned");
        inner.registrations.keys().copied().collect()
    }

    /// Drop cached instances and injected context without touching
    /// registrations. Used between CLI invocations within one process.
    pub fn reset_instances(&self) {
        let mut inner = self.inner.lock().expect("registry mutex poisoned");
        inner.instances.clear();
        inner.context = ProviderContext::default();
    }

    /// Remove registrations and instances. Reserved for tests.
    pub fn clear(&self) {
        let mut inner = self.inner.lock().expect("registry mutex poisoned");
        inner.registrations.clear();
        inner.instances.clear();
    }
}

// ============================================================================
// TESTS
// ============================================================================

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::BTreeMap;

    fn registry() -> ProviderRegistry {
        ProviderRegistry::with_default_providers(ProviderContext::default())
    }

    #[test]
    fn test_get_provider_returns_singleton() {
        let registry = registry();
        let a = registry.get_provider(Platform::Jira).unwrap();
        let b = registry.get_provider(Platform::Jira).unwrap();
        assert!(Arc::ptr_eq(&a, &b));
    }

    #[test]
    fn test_duplicate_registration_preserves_singleton() {
        let registry = registry();
        let before = registry.get_provider(Platform::Jira).unwrap();
        registry.register::<JiraProvider>(Platform::Jira, |ctx| {
            Ok(Arc::new(JiraProvider::new(ctx)))
        });
        let after = registry.get_provider(Platform::Jira).unwrap();
        assert!(Arc::ptr_eq(&before, &after));
    }

    #[test]
    fn test_replacing_registration_clears_instance() {
        let registry = registry();
        let before = registry.get_provider(Platform::Jira).unwrap();
        // A different concrete type targeting the same platform.
        registry.register::<LinearProvider>(Platform::Jira, |ctx| {
            Ok(Arc::new(LinearProvider::new(ctx)))
        });
        let after = registry.get_provider(Platform::Jira).unwrap();
        assert!(!Arc::ptr_eq(&before, &after));
        assert_eq!(after.name(), "Linear");
    }

    #[test]
    fn test_detects_unambiguous_url() {
        let registry = registry();
        let provider = registry
            .get_provider_for_input("https://github.com/rust-lang/rust/issues/1")
            .unwrap();
        assert_eq!(provider.platform(), Platform::GitHub);
    }

    #[test]
    fn test_detects_github_bare_id() {
        let registry = registry();
        let provider = registry.get_provider_for_input("rust-lang/rust#1").unwrap();
        assert_eq!(provider.platform(), Platform::GitHub);
    }

    #[test]
    fn test_ambiguous_id_without_default_errors() {
        let registry = registry();
        let err = registry.get_provider_for_input("PROJ-123").unwrap_err();
        assert!(matches!(err, RegistryError::AmbiguousInput { .. }));
        let message = err.to_string();
        assert!(message.contains("Jira"));
        assert!(message.contains("Linear"));
    }

    #[test]
    fn test_ambiguous_id_with_default_platform() {
        let mut config = BTreeMap::new();
        config.insert("default_platform".to_string(), "linear".to_string());
        let registry = ProviderRegistry::with_default_providers(ProviderContext::new(
            config,
            Arc::new(crate::ticket::provider::NonInteractive),
        ));
        let provider = registry.get_provider_for_input("PROJ-123").unwrap();
        assert_eq!(provider.platform(), Platform::Linear);
    }

    #[test]
    fn test_ambiguous_id_resolved_by_interaction() {
        struct AlwaysSecond;
        impl crate::ticket::provider::UserInteraction for AlwaysSecond {
            fn choose(&self, _prompt: &str, options: &[String]) -> Option<usize> {
                (options.len() > 1).then_some(1)
            }
        }
        let registry = ProviderRegistry::with_default_providers(ProviderContext::new(
            BTreeMap::new(),
            Arc::new(AlwaysSecond),
        ));
        let provider = registry.get_provider_for_input("PROJ-123").unwrap();
        assert_eq!(provider.platform(), Platform::Linear);
    }

    #[test]
    fn test_unrecognized_input_lists_registered_platforms() {
        let registry = registry();
        let err = registry.get_provider_for_input("???").unwrap_err();
        match err {
            RegistryError::PlatformNotSupported { registered, .. } => {
                assert_eq!(registered.len(), 6);
            }
            other => panic!("expected PlatformNotSupported, got {other:?}"),
        }
    }

    #[test]
    fn test_reset_instances_keeps_registrations() {
        let registry = registry();
        let before = registry.get_provider(Platform::Trello).unwrap();
        registry.reset_instances();
        let after = registry.get_provider(Platform::Trello).unwrap();
        assert!(!Arc::ptr_eq(&before, &after));
        assert_eq!(registry.registered_platforms().len(), 6);
    }

    #[test]
    fn test_clear_removes_registrations() {
        let registry = registry();
        registry.clear();
        assert!(registry.get_provider(Platform::Jira).is_err());
        assert!(registry.registered_platforms().is_empty());
    }
}
