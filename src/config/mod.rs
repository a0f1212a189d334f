//! # Configuration
//!
//! Cascading `KEY=VALUE` configuration with env-var overrides.
//!
//! Sources, later overriding earlier:
//!
//! 1. Built-in defaults
//! 2. Global config `~/.ingot-config`
//! 3. Local config `.ingot`, discovered by walking up from the working
//!    directory to the repository root (a directory containing `.git`)
//! 4. Environment variables (recognised keys only)
//!
//! The grammar is line-oriented: blank lines and `#` comments are skipped;
//! values may be double-quoted (with `\"` and `\\` escapes), single-quoted
//! (literal), or bare. Unknown keys are retained raw and ignored by the
//! typed accessors.

pub mod fetch;

pub use fetch::{AgentConfig, FetchPerformanceConfig, FetchStrategy, FetchStrategyConfig};

use std::collections::BTreeMap;
use std::path::{Path, PathBuf};

use once_cell::sync::Lazy;
use regex::Regex;
use tracing::{debug, warn};

use crate::backend::BackendPlatform;

/// Global config file name under the home directory.
pub const GLOBAL_CONFIG_NAME: &str = ".ingot-config";
/// Local config file name, discovered by upward traversal.
pub const LOCAL_CONFIG_NAME: &str = ".ingot";

static KEY_VALUE_RE: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"^([a-zA-Z_][a-zA-Z0-9_]*)=(.*)$").expect("valid regex"));

static MODEL_ID_RE: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"\[([^\[\]]+)\]\s*$").expect("valid regex"));

/// Exactly-known scalar keys honored from the environment.
const KNOWN_KEYS: &[&str] = &[
    "DEFAULT_MODEL",
    "PLANNING_MODEL",
    "IMPLEMENTATION_MODEL",
    "AI_BACKEND",
    "FETCH_STRATEGY_DEFAULT",
    "FETCH_CACHE_DURATION_HOURS",
    "FETCH_TIMEOUT_SECONDS",
    "FETCH_MAX_RETRIES",
    "FETCH_RETRY_DELAY_SECONDS",
    "AUTO_OPEN_FILES",
    "PREFERRED_EDITOR",
    "SKIP_CLARIFICATION",
    "SQUASH_AT_END",
    "PARALLEL_EXECUTION_ENABLED",
    "MAX_PARALLEL_TASKS",
    "FAIL_FAST",
    "GITHUB_HOSTS",
    "DEFAULT_JIRA_PROJECT",
    "JIRA_BASE_URL",
    "GITHUB_BASE_URL",
];

/// Key-family prefixes honored from the environment.
const KNOWN_PREFIXES: &[&str] = &["AGENT_INTEGRATION_", "FETCH_STRATEGY_", "FALLBACK_"];

// ============================================================================
// ERRORS
// ============================================================================

/// Configuration errors.
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    /// A `${VAR}` placeholder referenced an unset environment variable in
    /// strict mode.
    #[error("environment variable '{var}' is not set (required by {context})")]
    EnvVarExpansion { var: String, context: String },

    /// One or more invalid configuration values.
    #[error("invalid configuration: {}", messages.join("; "))]
    Validation { messages: Vec<String> },
}

// ============================================================================
// CONFIG MANAGER
// ============================================================================

/// Loads and serves the cascaded configuration.
pub struct ConfigManager {
    global_config_path: PathBuf,
    local_config_path: Option<PathBuf>,
    start_dir: PathBuf,
    raw: BTreeMap<String, String>,
    sources: BTreeMap<String, &'static str>,
}

impl ConfigManager {
    /// Manager rooted at the current working directory with the default
    /// global config path.
    pub fn new() -> Self {
        let home = dirs::home_dir().unwrap_or_else(|| PathBuf::from("."));
        Self::with_paths(
            home.join(GLOBAL_CONFIG_NAME),
            std::env::current_dir().unwrap_or_else(|_| PathBuf::from(".")),
        )
    }

    /// Manager with explicit paths; used by tests.
    pub fn with_paths(global_config_path: PathBuf, start_dir: PathBuf) -> Self {
        Self {
            global_config_path,
            local_config_path: None,
            start_dir,
            raw: BTreeMap::new(),
            sources: BTreeMap::new(),
        }
    }

    /// Load configuration from all sources. Idempotent: every call starts
    /// from a clean slate so stale values cannot persist across reloads.
    pub fn load(&mut self) {
        self.raw.clear();
        self.sources.clear();
        self.local_config_path = None;

        if self.global_config_path.exists() {
            debug!(path = %self.global_config_path.display(), "loading global configuration");
            let path = self.global_config_path.clone();
            self.load_file(&path, "global");
        }

        if let Some(local) = self.find_local_config() {
            debug!(path = %local.display(), "loading local configuration");
            self.load_file(&local, "local");
            self.local_config_path = Some(local);
        }

        self.load_environment();
        debug!(keys = self.raw.len(), "configuration loaded");
    }

    /// Path of the discovered local config, if any.
    pub fn local_config_path(&self) -> Option<&Path> {
        self.local_config_path.as_deref()
    }

    fn find_local_config(&self) -> Option<PathBuf> {
        let mut current = self.start_dir.clone();
        loop {
            let candidate = current.join(LOCAL_CONFIG_NAME);
            if candidate.is_file() {
                return Some(candidate);
            }
            // Stop at the repository root.
            if current.join(".git").exists() {
                return None;
            }
            if !current.pop() {
                return None;
            }
        }
    }

    fn load_file(&mut self, path: &Path, source: &'static str) {
        let content = match std::fs::read_to_string(path) {
            Ok(content) => content,
            Err(e) => {
                warn!(path = %path.display(), error = %e, "failed to read config file");
                return;
            }
        };
        for line in content.lines() {
            let line = line.trim();
            if line.is_empty() || line.starts_with('#') {
                continue;
            }
            let Some(captures) = KEY_VALUE_RE.captures(line) else { continue };
            let key = captures[1].to_string();
            let mut value = captures[2].to_string();

            if value.len() >= 2 && value.starts_with('"') && value.ends_with('"') {
                value = unescape_value(&value[1..value.len() - 1]);
            } else if value.len() >= 2 && value.starts_with('\'') && value.ends_with('\'') {
                // Single quotes are literal.
                value = value[1..value.len() - 1].to_string();
            }

            self.raw.insert(key.clone(), value);
            self.sources.insert(key, source);
        }
    }

    fn load_environment(&mut self) {
        for (key, value) in std::env::vars() {
            let recognised = KNOWN_KEYS.contains(&key.as_str())
                || KNOWN_PREFIXES.iter().any(|p| key.starts_with(p));
            if recognised {
                self.raw.insert(key.clone(), value);
                self.sources.insert(key, "environment");
            }
        }
    }

    // ------------------------------------------------------------------
    // Raw access
    // ------------------------------------------------------------------

    /// Raw value for a key, or the default.
    pub fn get(&self, key: &str) -> Option<&str> {
        self.raw.get(key).map(String::as_str)
    }

    /// Inject a raw value directly; used by tests and CLI overrides.
    pub fn set_raw(&mut self, key: impl Into<String>, value: impl Into<String>) {
        self.raw.insert(key.into(), value.into());
    }

    pub fn get_bool(&self, key: &str, default: bool) -> bool {
        self.get(key)
            .map(|v| matches!(v.to_ascii_lowercase().as_str(), "true" | "1" | "yes"))
            .unwrap_or(default)
    }

    fn get_parsed<T: std::str::FromStr>(&self, key: &str) -> Option<T> {
        let raw = self.get(key)?;
        match raw.parse() {
            Ok(value) => Some(value),
            Err(_) => {
                warn!(key, value = raw, "invalid config value, using default");
                None
            }
        }
    }

    // ------------------------------------------------------------------
    // Typed accessors
    // ------------------------------------------------------------------

    /// Model for planning phases (falls back to `DEFAULT_MODEL`).
    pub fn planning_model(&self) -> String {
        self.model_for("PLANNING_MODEL")
    }

    /// Model for implementation phase (falls back to `DEFAULT_MODEL`).
    pub fn implementation_model(&self) -> String {
        self.model_for("IMPLEMENTATION_MODEL")
    }

    fn model_for(&self, key: &str) -> String {
        let raw = self.get(key).or_else(|| self.get("DEFAULT_MODEL")).unwrap_or("");
        extract_model_id(raw)
    }

    /// AI backend configuration from `AI_BACKEND` and `AGENT_INTEGRATION_*`.
    pub fn agent_config(&self) -> Result<AgentConfig, ConfigError> {
        let platform = match self.get("AI_BACKEND") {
            Some(raw) => raw.parse::<BackendPlatform>().map_err(|_| ConfigError::Validation {
                messages: vec![format!(
                    "invalid AI_BACKEND '{raw}' (expected auggie, claude, cursor, aider, or manual)"
                )],
            })?,
            None => BackendPlatform::Auggie,
        };

        let mut integrations = BTreeMap::new();
        for (key, value) in &self.raw {
            if let Some(platform_name) = key.strip_prefix("AGENT_INTEGRATION_") {
                let enabled = matches!(value.to_ascii_lowercase().as_str(), "true" | "1" | "yes");
                integrations.insert(platform_name.to_ascii_lowercase(), enabled);
            }
        }
        let integrations_configured = !integrations.is_empty();

        Ok(AgentConfig { platform, integrations, integrations_configured })
    }

    /// Fetch strategy from `FETCH_STRATEGY_DEFAULT` and `FETCH_STRATEGY_*`.
    pub fn fetch_strategy_config(&self) -> Result<FetchStrategyConfig, ConfigError> {
        let default = match self.get("FETCH_STRATEGY_DEFAULT") {
            Some(raw) => raw.parse()?,
            None => FetchStrategy::Auto,
        };
        let mut per_platform = BTreeMap::new();
        for (key, value) in &self.raw {
            if key == "FETCH_STRATEGY_DEFAULT" {
                continue;
            }
            if let Some(platform_name) = key.strip_prefix("FETCH_STRATEGY_") {
                per_platform.insert(platform_name.to_ascii_lowercase(), value.parse()?);
            }
        }
        Ok(FetchStrategyConfig { default, per_platform })
    }

    /// Fetch performance budget, clamped to sane bounds. Invalid values log
    /// a warning and keep the default.
    pub fn fetch_performance_config(&self) -> FetchPerformanceConfig {
        let defaults = FetchPerformanceConfig::default();
        FetchPerformanceConfig {
            cache_duration_hours: self
                .get_parsed("FETCH_CACHE_DURATION_HOURS")
                .unwrap_or(defaults.cache_duration_hours),
            timeout_seconds: self
                .get_parsed("FETCH_TIMEOUT_SECONDS")
                .unwrap_or(defaults.timeout_seconds),
            max_retries: self.get_parsed("FETCH_MAX_RETRIES").unwrap_or(defaults.max_retries),
            retry_delay_seconds: self
                .get_parsed("FETCH_RETRY_DELAY_SECONDS")
                .unwrap_or(defaults.retry_delay_seconds),
        }
        .clamped()
    }

    /// Raw `FALLBACK_<PLATFORM>_*` credential values with `${ENV}` expansion.
    ///
    /// In strict mode a missing env var is an error; otherwise the
    /// placeholder is preserved literally. Returns `None` when no keys are
    /// configured for the platform at all.
    pub fn fallback_credentials(
        &self,
        platform: &str,
        strict: bool,
    ) -> Result<Option<BTreeMap<String, String>>, ConfigError> {
        let prefix = format!("FALLBACK_{}_", platform.to_ascii_uppercase());
        let mut credentials = BTreeMap::new();
        for (key, value) in &self.raw {
            if let Some(field) = key.strip_prefix(&prefix) {
                let expanded = expand_env_vars(value, strict, key)?;
                credentials.insert(field.to_ascii_lowercase(), expanded);
            }
        }
        Ok(if credentials.is_empty() { None } else { Some(credentials) })
    }

    /// All raw `FALLBACK_*` entries, unexpanded. The auth store applies
    /// per-field expansion rules itself.
    pub fn fallback_raw_values(&self) -> BTreeMap<String, String> {
        self.raw
            .iter()
            .filter(|(k, _)| k.starts_with("FALLBACK_"))
            .map(|(k, v)| (k.clone(), v.clone()))
            .collect()
    }

    /// Maximum parallel tasks, clamped to 1–5.
    pub fn max_parallel_tasks(&self) -> usize {
        self.get_parsed::<usize>("MAX_PARALLEL_TASKS").unwrap_or(3).clamp(1, 5)
    }

    pub fn parallel_execution_enabled(&self) -> bool {
        self.get_bool("PARALLEL_EXECUTION_ENABLED", true)
    }

    pub fn fail_fast(&self) -> bool {
        self.get_bool("FAIL_FAST", false)
    }

    pub fn skip_clarification(&self) -> bool {
        self.get_bool("SKIP_CLARIFICATION", false)
    }

    pub fn squash_at_end(&self) -> bool {
        self.get_bool("SQUASH_AT_END", true)
    }

    pub fn preferred_editor(&self) -> Option<String> {
        self.get("PREFERRED_EDITOR").map(str::to_string)
    }

    /// Free-form provider context handed to the registry (e.g. the default
    /// Jira project for numeric-only ids and extra GitHub hosts).
    pub fn provider_context(&self) -> BTreeMap<String, String> {
        let mut context = BTreeMap::new();
        for key in ["DEFAULT_JIRA_PROJECT", "GITHUB_HOSTS", "JIRA_BASE_URL", "GITHUB_BASE_URL"] {
            if let Some(value) = self.get(key) {
                context.insert(key.to_ascii_lowercase(), value.to_string());
            }
        }
        context
    }
}

impl Default for ConfigManager {
    fn default() -> Self {
        Self::new()
    }
}

// ============================================================================
// VALUE ESCAPING
// ============================================================================

/// Escape a value for storage in a double-quoted config entry.
pub fn escape_value(value: &str) -> String {
    value.replace('\\', "\\\\").replace('"', "\\\"")
}

/// Reverse [`escape_value`]. Backslashes first so `\\\"` survives.
pub fn unescape_value(value: &str) -> String {
    let mut out = String::with_capacity(value.len());
    let mut chars = value.chars();
    while let Some(ch) = chars.next() {
        if ch == '\\' {
            match chars.next() {
                Some('\\') => out.push('\\'),
                Some('"') => out.push('"'),
                Some(other) => {
                    out.push('\\');
                    out.push(other);
                }
                None => out.push('\\'),
            }
        } else {
            out.push(ch);
        }
    }
    out
}

// ============================================================================
// ENV VAR EXPANSION
// ============================================================================

static ENV_VAR_RE: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"\$\{([A-Za-z_][A-Za-z0-9_]*)\}").expect("valid regex"));

/// Expand `${VAR}` placeholders from the environment.
///
/// Strict mode turns a missing variable into [`ConfigError::EnvVarExpansion`];
/// lenient mode preserves the placeholder literally.
pub fn expand_env_vars(value: &str, strict: bool, context: &str) -> Result<String, ConfigError> {
    let mut result = String::with_capacity(value.len());
    let mut last_end = 0;
    for captures in ENV_VAR_RE.captures_iter(value) {
        let whole = captures.get(0).expect("group 0 always present");
        let var = &captures[1];
        result.push_str(&value[last_end..whole.start()]);
        match std::env::var(var) {
            Ok(env_value) => result.push_str(&env_value),
            Err(_) if strict => {
                return Err(ConfigError::EnvVarExpansion {
                    var: var.to_string(),
                    context: context.to_string(),
                });
            }
            Err(_) => result.push_str(whole.as_str()),
        }
        last_end = whole.end();
    }
    result.push_str(&value[last_end..]);
    Ok(result)
}

/// Extract a bare model id from a `Name [id]` display string.
///
/// `"Claude Sonnet [claude-sonnet-4]"` → `"claude-sonnet-4"`; a bare id is
/// returned unchanged.
pub fn extract_model_id(raw: &str) -> String {
    let trimmed = raw.trim();
    match MODEL_ID_RE.captures(trimmed) {
        Some(captures) => captures[1].trim().to_string(),
        None => trimmed.to_string(),
    }
}

// ============================================================================
// TESTS
// ============================================================================

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    fn manager_with_global(content: &str) -> (tempfile::TempDir, ConfigManager) {
        let dir = tempfile::tempdir().unwrap();
        let global = dir.path().join(GLOBAL_CONFIG_NAME);
        let mut file = std::fs::File::create(&global).unwrap();
        write!(file, "{content}").unwrap();
        let mut manager = ConfigManager::with_paths(global, dir.path().to_path_buf());
        manager.load();
        (dir, manager)
    }

    #[test]
    fn test_parse_basic_key_value() {
        let (_dir, manager) = manager_with_global("DEFAULT_MODEL=sonnet\n");
        assert_eq!(manager.get("DEFAULT_MODEL"), Some("sonnet"));
    }

    #[test]
    fn test_skips_comments_and_blanks() {
        let (_dir, manager) = manager_with_global("# comment\n\n  # indented comment\nFAIL_FAST=true\n");
        assert!(manager.fail_fast());
        assert!(manager.get("# comment").is_none());
    }

    #[test]
    fn test_double_quoted_values_unescaped() {
        let (_dir, manager) =
            manager_with_global(r#"PREFERRED_EDITOR="vim \"my\" \\editor""#);
        assert_eq!(manager.preferred_editor().as_deref(), Some(r#"vim "my" \editor"#));
    }

    #[test]
    fn test_single_quoted_values_literal() {
        let (_dir, manager) = manager_with_global("PREFERRED_EDITOR='code \\\"x'\n");
        assert_eq!(manager.preferred_editor().as_deref(), Some("code \\\"x"));
    }

    #[test]
    fn test_escape_unescape_roundtrip() {
        for value in [r#"plain"#, r#"with "quotes""#, r#"back\slash"#, r#"\" mixed \\ "#] {
            assert_eq!(unescape_value(&escape_value(value)), value);
        }
    }

    #[test]
    fn test_local_config_overrides_global() {
        let dir = tempfile::tempdir().unwrap();
        let global = dir.path().join(GLOBAL_CONFIG_NAME);
        std::fs::write(&global, "DEFAULT_MODEL=global-model\n").unwrap();
        let project = dir.path().join("project");
        std::fs::create_dir_all(project.join(".git")).unwrap();
        std::fs::write(project.join(LOCAL_CONFIG_NAME), "DEFAULT_MODEL=local-model\n").unwrap();

        let nested = project.join("src").join("deep");
        std::fs::create_dir_all(&nested).unwrap();
        let mut manager = ConfigManager::with_paths(global, nested);
        manager.load();

        assert_eq!(manager.get("DEFAULT_MODEL"), Some("local-model"));
        assert!(manager.local_config_path().is_some());
    }

    #[test]
    fn test_local_discovery_stops_at_git_root() {
        let dir = tempfile::tempdir().unwrap();
        // Config above the repo root must not be picked up.
        std::fs::write(dir.path().join(LOCAL_CONFIG_NAME), "FAIL_FAST=true\n").unwrap();
        let repo = dir.path().join("repo");
        std::fs::create_dir_all(repo.join(".git")).unwrap();

        let global = dir.path().join("missing-global");
        let mut manager = ConfigManager::with_paths(global, repo);
        manager.load();
        assert!(manager.local_config_path().is_none());
    }

    #[test]
    fn test_extract_model_id() {
        assert_eq!(extract_model_id("Claude Sonnet [claude-sonnet-4]"), "claude-sonnet-4");
        assert_eq!(extract_model_id("claude-sonnet-4"), "claude-sonnet-4");
        assert_eq!(extract_model_id("  spaced  "), "spaced");
    }

    #[test]
    fn test_performance_defaults_on_invalid_values() {
        let (_dir, manager) =
            manager_with_global("FETCH_MAX_RETRIES=lots\nFETCH_TIMEOUT_SECONDS=45\n");
        let perf = manager.fetch_performance_config();
        assert_eq!(perf.max_retries, 3);
        assert_eq!(perf.timeout_seconds, 45);
    }

    #[test]
    fn test_agent_config_parsing() {
        let (_dir, manager) = manager_with_global(
            "AI_BACKEND=claude\nAGENT_INTEGRATION_JIRA=true\nAGENT_INTEGRATION_LINEAR=false\n",
        );
        let agent = manager.agent_config().unwrap();
        assert_eq!(agent.platform, BackendPlatform::Claude);
        assert!(agent.supports_platform("jira"));
        assert!(!agent.supports_platform("linear"));
        // Unlisted platforms are unsupported once integrations are configured.
        assert!(!agent.supports_platform("github"));
    }

    #[test]
    fn test_agent_config_invalid_backend() {
        let (_dir, manager) = manager_with_global("AI_BACKEND=skynet\n");
        assert!(manager.agent_config().is_err());
    }

    #[test]
    fn test_fetch_strategy_per_platform() {
        let (_dir, manager) = manager_with_global(
            "FETCH_STRATEGY_DEFAULT=auto\nFETCH_STRATEGY_JIRA=direct\n",
        );
        let strategies = manager.fetch_strategy_config().unwrap();
        assert_eq!(strategies.strategy_for("jira"), FetchStrategy::Direct);
        assert_eq!(strategies.strategy_for("github"), FetchStrategy::Auto);
    }

    #[test]
    fn test_fallback_credentials_expansion_lenient() {
        let (_dir, manager) = manager_with_global(
            "FALLBACK_JIRA_URL=https://x.atlassian.net\nFALLBACK_JIRA_TOKEN=${INGOT_TEST_UNSET_VAR}\n",
        );
        let creds = manager.fallback_credentials("jira", false).unwrap().unwrap();
        assert_eq!(creds.get("url").unwrap(), "https://x.atlassian.net");
        assert_eq!(creds.get("token").unwrap(), "${INGOT_TEST_UNSET_VAR}");
    }

    #[test]
    fn test_fallback_credentials_strict_missing_var_errors() {
        let (_dir, manager) =
            manager_with_global("FALLBACK_JIRA_TOKEN=${INGOT_TEST_UNSET_VAR}\n");
        let err = manager.fallback_credentials("jira", true).unwrap_err();
        assert!(matches!(err, ConfigError::EnvVarExpansion { .. }));
    }

    #[test]
    fn test_fallback_credentials_none_when_unconfigured() {
        let (_dir, manager) = manager_with_global("DEFAULT_MODEL=m\n");
        assert!(manager.fallback_credentials("trello", false).unwrap().is_none());
    }

    #[test]
    fn test_max_parallel_tasks_clamped() {
        let (_dir, manager) = manager_with_global("MAX_PARALLEL_TASKS=9\n");
        assert_eq!(manager.max_parallel_tasks(), 5);
        let (_dir, manager) = manager_with_global("MAX_PARALLEL_TASKS=0\n");
        assert_eq!(manager.max_parallel_tasks(), 1);
    }

    #[test]
    fn test_expand_env_vars_present() {
        std::env::set_var("INGOT_TEST_PRESENT_VAR", "value42");
        let expanded = expand_env_vars("token-${INGOT_TEST_PRESENT_VAR}-end", true, "test").unwrap();
        assert_eq!(expanded, "token-value42-end");
        std::env::remove_var("INGOT_TEST_PRESENT_VAR");
    }
}
