//! # Fallback Credential Store
//!
//! Resolves per-platform credential bundles from `FALLBACK_<PLATFORM>_<FIELD>`
//! configuration keys for the direct-API fetch path.
//!
//! Credential values are secrets: [`Credentials`] redacts them from `Debug`
//! output, error messages never echo them, and unexpected failures are
//! replaced with a generic message so nothing leaks through an error chain.

use std::collections::BTreeMap;

use tracing::debug;

use crate::config::{expand_env_vars, ConfigError, ConfigManager};
use crate::ticket::Platform;

// ============================================================================
// CREDENTIALS
// ============================================================================

/// Immutable credential bundle with lowercase keys.
#[derive(Clone, PartialEq, Eq)]
pub struct Credentials(BTreeMap<String, String>);

impl Credentials {
    pub fn new(map: BTreeMap<String, String>) -> Self {
        Self(map)
    }

    pub fn get(&self, key: &str) -> Option<&str> {
        self.0.get(key).map(String::as_str)
    }

    pub fn contains_key(&self, key: &str) -> bool {
        self.0.contains_key(key)
    }

    pub fn keys(&self) -> impl Iterator<Item = &str> {
        self.0.keys().map(String::as_str)
    }

    pub fn len(&self) -> usize {
        self.0.len()
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }
}

impl std::fmt::Debug for Credentials {
    /// Keys only. Values must never reach logs.
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_map().entries(self.0.keys().map(|k| (k, "<redacted>"))).finish()
    }
}

/// Outcome of a credential lookup.
pub enum CredentialLookup {
    Configured(Credentials),
    NotConfigured { platform: Platform, error_message: String },
}

impl CredentialLookup {
    pub fn is_configured(&self) -> bool {
        matches!(self, CredentialLookup::Configured(_))
    }

    pub fn credentials(&self) -> Option<&Credentials> {
        match self {
            CredentialLookup::Configured(creds) => Some(creds),
            CredentialLookup::NotConfigured { .. } => None,
        }
    }

    pub fn error_message(&self) -> Option<&str> {
        match self {
            CredentialLookup::Configured(_) => None,
            CredentialLookup::NotConfigured { error_message, .. } => Some(error_message),
        }
    }
}

// ============================================================================
// PLATFORM KEY SETS
// ============================================================================

/// Required credential fields per platform (canonical names).
pub fn required_credential_keys(platform: Platform) -> &'static [&'static str] {
    match platform {
        Platform::Jira => &["url", "email", "token"],
        Platform::Linear => &["api_key"],
        Platform::GitHub => &["token"],
        Platform::AzureDevOps => &["organization", "project", "pat"],
        Platform::Monday => &["api_token"],
        Platform::Trello => &["key", "token"],
    }
}

/// Canonicalize legacy field aliases. The alias table is fixed; new
/// platforms get no aliases without an explicit requirement.
fn canonical_field_name(platform: Platform, field: &str) -> String {
    match (platform, field) {
        (Platform::AzureDevOps, "org") => "organization".to_string(),
        (Platform::Jira, "base_url") => "url".to_string(),
        (Platform::Trello, "api_token") => "token".to_string(),
        _ => field.to_string(),
    }
}

// ============================================================================
// AUTH STORE
// ============================================================================

/// Serves fallback credential bundles resolved from configuration.
pub struct AuthStore {
    /// Raw `FALLBACK_*` config entries, unexpanded.
    raw: BTreeMap<String, String>,
}

impl AuthStore {
    pub fn from_config(config: &ConfigManager) -> Self {
        Self { raw: config.fallback_raw_values() }
    }

    /// Store with explicit raw entries; used by tests.
    pub fn from_raw(raw: BTreeMap<String, String>) -> Self {
        Self { raw }
    }

    /// Raw field → value map for one platform, aliases canonicalized,
    /// env placeholders not yet expanded.
    fn raw_fields(&self, platform: Platform) -> BTreeMap<String, String> {
        let prefix = format!("FALLBACK_{}_", platform.name());
        let mut fields = BTreeMap::new();
        for (key, value) in &self.raw {
            if let Some(field) = key.strip_prefix(&prefix) {
                let canonical = canonical_field_name(platform, &field.to_ascii_lowercase());
                fields.insert(canonical, value.clone());
            }
        }
        fields
    }

    /// Cheap configured-check: true iff at least one *required* field has a
    /// non-empty raw value. Does not touch the environment.
    pub fn has_fallback_configured(&self, platform: Platform) -> bool {
        let fields = self.raw_fields(platform);
        required_credential_keys(platform)
            .iter()
            .any(|key| fields.get(*key).is_some_and(|v| !v.trim().is_empty()))
    }

    /// Resolve the credential bundle for a platform.
    ///
    /// `${ENV}` placeholders in required fields are expanded strictly (a
    /// missing variable is an error); optional fields keep unresolved
    /// placeholders literally.
    pub fn credentials(&self, platform: Platform) -> CredentialLookup {
        let fields = self.raw_fields(platform);
        if fields.is_empty() {
            return CredentialLookup::NotConfigured {
                platform,
                error_message: format!(
                    "No fallback credentials configured for {} \
                     (set FALLBACK_{}_* in your config)",
                    platform.display_name(),
                    platform.name()
                ),
            };
        }

        let required = required_credential_keys(platform);
        let mut resolved = BTreeMap::new();
        for (field, value) in fields {
            let strict = required.contains(&field.as_str());
            let context = format!("FALLBACK_{}_{}", platform.name(), field.to_ascii_uppercase());
            match expand_env_vars(&value, strict, &context) {
                Ok(expanded) => {
                    resolved.insert(field, expanded);
                }
                Err(ConfigError::EnvVarExpansion { var, .. }) => {
                    return CredentialLookup::NotConfigured {
                        platform,
                        error_message: format!(
                            "Credential field '{}' for {} references unset \
                             environment variable '{}'",
                            field,
                            platform.display_name(),
                            var
                        ),
                    };
                }
                Err(_) => {
                    // Anything unexpected is replaced with a generic message
                    // so credential material cannot leak through the chain.
                    return CredentialLookup::NotConfigured {
                        platform,
                        error_message: "Failed to load credentials".to_string(),
                    };
                }
            }
        }

        let missing: Vec<&str> = required
            .iter()
            .filter(|key| resolved.get(**key).map_or(true, |v| v.trim().is_empty()))
            .copied()
            .collect();
        if !missing.is_empty() {
            return CredentialLookup::NotConfigured {
                platform,
                error_message: format!(
                    "Incomplete credentials for {}: missing {}",
                    platform.display_name(),
                    missing.join(", ")
                ),
            };
        }

        debug!(platform = platform.name(), fields = resolved.len(), "resolved credentials");
        CredentialLookup::Configured(Credentials::new(resolved))
    }
}

// ============================================================================
// TESTS
// ============================================================================

#[cfg(test)]
mod tests {
    use super::*;

    fn store(entries: &[(&str, &str)]) -> AuthStore {
        AuthStore::from_raw(
            entries.iter().map(|(k, v)| (k.to_string(), v.to_string())).collect(),
        )
    }

    #[test]
    fn test_configured_jira_bundle() {
        let store = store(&[
            ("FALLBACK_JIRA_URL", "https://x.atlassian.net"),
            ("FALLBACK_JIRA_EMAIL", "dev@example.com"),
            ("FALLBACK_JIRA_TOKEN", "secret"),
        ]);
        let lookup = store.credentials(Platform::Jira);
        assert!(lookup.is_configured());
        let creds = lookup.credentials().unwrap();
        assert_eq!(creds.get("url"), Some("https://x.atlassian.net"));
        assert_eq!(creds.len(), 3);
    }

    #[test]
    fn test_missing_required_field_reported() {
        let store = store(&[("FALLBACK_JIRA_URL", "https://x.atlassian.net")]);
        let lookup = store.credentials(Platform::Jira);
        assert!(!lookup.is_configured());
        let message = lookup.error_message().unwrap();
        assert!(message.contains("email"));
        assert!(message.contains("token"));
        // Never echo values.
        assert!(!message.contains("atlassian"));
    }

    #[test]
    fn test_unconfigured_platform() {
        let store = store(&[]);
        let lookup = store.credentials(Platform::Linear);
        assert!(!lookup.is_configured());
        assert!(lookup.error_message().unwrap().contains("FALLBACK_LINEAR_"));
    }

    #[test]
    fn test_alias_canonicalization() {
        let azure = store(&[
            ("FALLBACK_AZURE_DEVOPS_ORG", "my-org"),
            ("FALLBACK_AZURE_DEVOPS_PROJECT", "proj"),
            ("FALLBACK_AZURE_DEVOPS_PAT", "pat123"),
        ]);
        let lookup = azure.credentials(Platform::AzureDevOps);
        assert!(lookup.is_configured());
        assert_eq!(lookup.credentials().unwrap().get("organization"), Some("my-org"));

        let jira = store(&[
            ("FALLBACK_JIRA_BASE_URL", "https://x.atlassian.net"),
            ("FALLBACK_JIRA_EMAIL", "dev@example.com"),
            ("FALLBACK_JIRA_TOKEN", "secret"),
        ]);
        assert!(jira.credentials(Platform::Jira).is_configured());

        let trello = store(&[
            ("FALLBACK_TRELLO_KEY", "k"),
            ("FALLBACK_TRELLO_API_TOKEN", "t"),
        ]);
        let lookup = trello.credentials(Platform::Trello);
        assert!(lookup.is_configured());
        assert_eq!(lookup.credentials().unwrap().get("token"), Some("t"));
    }

    #[test]
    fn test_has_fallback_configured_requires_required_key() {
        let configured = store(&[("FALLBACK_LINEAR_API_KEY", "lin_123")]);
        assert!(configured.has_fallback_configured(Platform::Linear));
        assert!(!configured.has_fallback_configured(Platform::Jira));

        // An optional-only field does not count.
        let optional_only = store(&[("FALLBACK_JIRA_PROJECT", "PROJ")]);
        assert!(!optional_only.has_fallback_configured(Platform::Jira));
    }

    #[test]
    fn test_has_fallback_ignores_empty_values() {
        let store = store(&[("FALLBACK_LINEAR_API_KEY", "  ")]);
        assert!(!store.has_fallback_configured(Platform::Linear));
    }

    #[test]
    fn test_strict_expansion_failure_for_required_field() {
        let store = store(&[("FALLBACK_LINEAR_API_KEY", "${INGOT_TEST_UNSET_VAR}")]);
        let lookup = store.credentials(Platform::Linear);
        assert!(!lookup.is_configured());
        assert!(lookup.error_message().unwrap().contains("INGOT_TEST_UNSET_VAR"));
    }

    #[test]
    fn test_lenient_expansion_for_optional_field() {
        let store = store(&[
            ("FALLBACK_LINEAR_API_KEY", "lin_123"),
            ("FALLBACK_LINEAR_WORKSPACE", "${INGOT_TEST_UNSET_VAR}"),
        ]);
        let lookup = store.credentials(Platform::Linear);
        assert!(lookup.is_configured());
        assert_eq!(
            lookup.credentials().unwrap().get("workspace"),
            Some("${INGOT_TEST_UNSET_VAR}")
        );
    }

    #[test]
    fn test_debug_redacts_values() {
        let creds = Credentials::new(
            [("token".to_string(), "super-secret".to_string())].into_iter().collect(),
        );
        let debug = format!("{creds:?}");
        assert!(debug.contains("token"));
        assert!(!debug.contains("super-secret"));
    }
}
