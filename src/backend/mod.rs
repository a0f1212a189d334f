//! # AI Backend Abstraction
//!
//! The rest of the system treats the AI as an opaque oracle: hand it a
//! prompt, get text back. [`AiBackend`] is that contract. Implementations
//! shell out to an agent CLI (`auggie`, `claude`, `cursor`, `aider`); the
//! [`MockBackend`] serves tests with scripted responses.
//!
//! All trait methods are synchronous; async callers offload through
//! `tokio::task::spawn_blocking`.

use std::collections::VecDeque;
use std::io::{BufRead, BufReader, Read};
use std::process::{Command, Stdio};
use std::str::FromStr;
use std::sync::Mutex;
use std::time::Duration;

use wait_timeout::ChildExt;

/// Default timeout for a single backend invocation.
const DEFAULT_EXECUTE_TIMEOUT: Duration = Duration::from_secs(600);

/// Timeout for the CLI availability probe.
const CLI_CHECK_TIMEOUT: Duration = Duration::from_secs(5);

// ============================================================================
// BACKEND PLATFORM
// ============================================================================

/// Which AI agent product drives the workflow.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum BackendPlatform {
    Auggie,
    Claude,
    Cursor,
    Aider,
    /// No agent; ticket fetching must go through the direct API path.
    Manual,
}

impl BackendPlatform {
    pub fn name(&self) -> &'static str {
        match self {
            BackendPlatform::Auggie => "auggie",
            BackendPlatform::Claude => "claude",
            BackendPlatform::Cursor => "cursor",
            BackendPlatform::Aider => "aider",
            BackendPlatform::Manual => "manual",
        }
    }

    /// CLI binary for this backend, if it has one.
    pub fn cli_binary(&self) -> Option<&'static str> {
        match self {
            BackendPlatform::Auggie => Some("auggie"),
            BackendPlatform::Claude => Some("claude"),
            BackendPlatform::Cursor => Some("cursor-agent"),
            BackendPlatform::Aider => Some("aider"),
            BackendPlatform::Manual => None,
        }
    }

    /// Whether this backend can run agent-mediated ticket fetches.
    pub fn supports_agent_fetch(&self) -> bool {
        matches!(self, BackendPlatform::Auggie | BackendPlatform::Claude | BackendPlatform::Cursor)
    }
}

impl FromStr for BackendPlatform {
    type Err = BackendError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "auggie" => Ok(BackendPlatform::Auggie),
            "claude" | "claude_desktop" => Ok(BackendPlatform::Claude),
            "cursor" => Ok(BackendPlatform::Cursor),
            "aider" => Ok(BackendPlatform::Aider),
            "manual" => Ok(BackendPlatform::Manual),
            _ => Err(BackendError::UnknownPlatform(s.to_string())),
        }
    }
}

impl std::fmt::Display for BackendPlatform {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.name())
    }
}

// ============================================================================
// ERRORS
// ============================================================================

/// Backend invocation and configuration errors.
#[derive(Debug, thiserror::Error)]
pub enum BackendError {
    #[error("unknown AI backend: '{0}'")]
    UnknownPlatform(String),

    #[error("backend '{backend}' CLI not installed (looked for '{binary}')")]
    NotInstalled { backend: String, binary: String },

    #[error("backend '{0}' cannot execute prompts (manual mode)")]
    NotExecutable(String),

    #[error("backend '{backend}' invocation failed: {message}")]
    Invocation { backend: String, message: String },

    #[error("backend '{backend}' timed out after {seconds}s")]
    Timeout { backend: String, seconds: u64 },
}

// ============================================================================
// TRAIT
// ============================================================================

/// Opaque AI oracle. One prompt in, text out.
pub trait AiBackend: Send + Sync {
    /// Backend name for diagnostics.
    fn name(&self) -> &str;

    fn platform(&self) -> BackendPlatform;

    /// Execute a prompt non-interactively and return the captured output.
    fn run_print_quiet(&self, prompt: &str) -> Result<String, BackendError>;

    /// Execute a prompt, invoking `on_line` for each output line as it
    /// arrives. Returns whether the invocation succeeded.
    fn run_streaming(
        &self,
        prompt: &str,
        on_line: &mut dyn FnMut(&str),
    ) -> Result<bool, BackendError>;

    /// Whether the backing CLI is installed and answers a version probe.
    fn is_available(&self) -> bool {
        true
    }
}

impl std::fmt::Debug for dyn AiBackend {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("AiBackend").field("name", &self.name()).finish()
    }
}

// ============================================================================
// CLI BACKEND
// ============================================================================

/// Backend that shells out to an agent CLI.
pub struct CliBackend {
    platform: BackendPlatform,
    cli_path: String,
    model: Option<String>,
    execute_timeout: Duration,
}

impl CliBackend {
    pub fn new(platform: BackendPlatform) -> Result<Self, BackendError> {
        let binary = platform
            .cli_binary()
            .ok_or_else(|| BackendError::NotExecutable(platform.name().to_string()))?;
        Ok(Self {
            platform,
            cli_path: binary.to_string(),
            model: None,
            execute_timeout: DEFAULT_EXECUTE_TIMEOUT,
        })
    }

    pub fn with_model(mut self, model: impl Into<String>) -> Self {
        let model = model.into();
        if !model.is_empty() {
            self.model = Some(model);
        }
        self
    }

    pub fn with_cli_path(mut self, path: impl Into<String>) -> Self {
        self.cli_path = path.into();
        self
    }

    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.execute_timeout = timeout;
        self
    }

    fn base_command(&self, prompt: &str) -> Command {
        let mut cmd = Command::new(&self.cli_path);
        match self.platform {
            // auggie --print --quiet "<prompt>"
            BackendPlatform::Auggie => {
                cmd.arg("--print").arg("--quiet").arg(prompt);
            }
            // claude -p "<prompt>"
            BackendPlatform::Claude => {
                cmd.arg("-p").arg(prompt);
            }
            // cursor-agent --print "<prompt>"
            BackendPlatform::Cursor => {
                cmd.arg("--print").arg(prompt);
            }
            // aider --message "<prompt>" --yes
            BackendPlatform::Aider => {
                cmd.arg("--message").arg(prompt).arg("--yes");
            }
            BackendPlatform::Manual => {}
        }
        if let Some(model) = &self.model {
            cmd.arg("--model").arg(model);
        }
        cmd
    }

    /// Probe the CLI with `--version`, bounded by a short timeout.
    fn check_cli(&self) -> bool {
        Command::new(&self.cli_path)
            .arg("--version")
            .stdout(Stdio::null())
            .stderr(Stdio::null())
            .spawn()
            .and_then(|mut child| match child.wait_timeout(CLI_CHECK_TIMEOUT)? {
                Some(status) => Ok(status.success()),
                None => {
                    let _ = child.kill();
                    Ok(false)
                }
            })
            .unwrap_or(false)
    }

    fn invocation_error(&self, message: impl Into<String>) -> BackendError {
        BackendError::Invocation { backend: self.name().to_string(), message: message.into() }
    }
}

impl AiBackend for CliBackend {
    fn name(&self) -> &str {
        self.platform.name()
    }

    fn platform(&self) -> BackendPlatform {
        self.platform
    }

    fn run_print_quiet(&self, prompt: &str) -> Result<String, BackendError> {
        let mut child = self
            .base_command(prompt)
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .spawn()
            .map_err(|e| self.invocation_error(format!("failed to spawn: {e}")))?;

        let status = child
            .wait_timeout(self.execute_timeout)
            .map_err(|e| self.invocation_error(format!("wait failed: {e}")))?;

        match status {
            Some(status) => {
                let mut stdout = String::new();
                if let Some(mut out) = child.stdout.take() {
                    let _ = out.read_to_string(&mut stdout);
                }
                if status.success() {
                    Ok(stdout)
                } else {
                    let mut stderr = String::new();
                    if let Some(mut err) = child.stderr.take() {
                        let _ = err.read_to_string(&mut stderr);
                    }
                    Err(self.invocation_error(format!(
                        "exited with {}: {}",
                        status,
                        stderr.trim()
                    )))
                }
            }
            None => {
                let _ = child.kill();
                let _ = child.wait();
                Err(BackendError::Timeout {
                    backend: self.name().to_string(),
                    seconds: self.execute_timeout.as_secs(),
                })
            }
        }
    }

    fn run_streaming(
        &self,
        prompt: &str,
        on_line: &mut dyn FnMut(&str),
    ) -> Result<bool, BackendError> {
        let mut child = self
            .base_command(prompt)
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .spawn()
            .map_err(|e| self.invocation_error(format!("failed to spawn: {e}")))?;

        let stdout = child
            .stdout
            .take()
            .ok_or_else(|| self.invocation_error("child stdout not captured"))?;
        for line in BufReader::new(stdout).lines() {
            match line {
                Ok(line) => on_line(&line),
                Err(e) => {
                    let _ = child.kill();
                    let _ = child.wait();
                    return Err(self.invocation_error(format!("read failed: {e}")));
                }
            }
        }

        let status =
            child.wait().map_err(|e| self.invocation_error(format!("wait failed: {e}")))?;
        if !status.success() {
            let mut stderr = String::new();
            if let Some(mut err) = child.stderr.take() {
                let _ = err.read_to_string(&mut stderr);
            }
            for line in stderr.lines() {
                on_line(line);
            }
        }
        Ok(status.success())
    }

    fn is_available(&self) -> bool {
        self.check_cli()
    }
}

// ============================================================================
// FACTORY
// ============================================================================

/// Create a backend for a platform, optionally verifying the CLI exists.
///
/// `Manual` yields an error from prompt execution but is a valid platform
/// for direct-API-only configurations, so it is rejected here.
pub fn create_backend(
    platform: BackendPlatform,
    model: Option<&str>,
    verify_installed: bool,
) -> Result<Box<dyn AiBackend>, BackendError> {
    if platform == BackendPlatform::Manual {
        return Err(BackendError::NotExecutable(platform.name().to_string()));
    }
    let mut backend = CliBackend::new(platform)?;
    if let Some(model) = model {
        backend = backend.with_model(model);
    }
    if verify_installed && !backend.is_available() {
        return Err(BackendError::NotInstalled {
            backend: platform.name().to_string(),
            binary: platform.cli_binary().unwrap_or_default().to_string(),
        });
    }
    Ok(Box::new(backend))
}

// ============================================================================
// MOCK BACKEND
// ============================================================================

/// Scripted backend for tests: pops responses in order and records prompts.
pub struct MockBackend {
    responses: Mutex<VecDeque<Result<String, String>>>,
    prompts: Mutex<Vec<String>>,
}

impl MockBackend {
    pub fn new() -> Self {
        Self { responses: Mutex::new(VecDeque::new()), prompts: Mutex::new(Vec::new()) }
    }

    pub fn with_response(self, response: impl Into<String>) -> Self {
        self.responses.lock().unwrap().push_back(Ok(response.into()));
        self
    }

    pub fn with_failure(self, message: impl Into<String>) -> Self {
        self.responses.lock().unwrap().push_back(Err(message.into()));
        self
    }

    /// Prompts seen so far, in invocation order.
    pub fn prompts(&self) -> Vec<String> {
        self.prompts.lock().unwrap().clone()
    }

    pub fn call_count(&self) -> usize {
        self.prompts.lock().unwrap().len()
    }

    fn next_response(&self, prompt: &str) -> Result<String, BackendError> {
        self.prompts.lock().unwrap().push(prompt.to_string());
        match self.responses.lock().unwrap().pop_front() {
            Some(Ok(response)) => Ok(response),
            Some(Err(message)) => {
                Err(BackendError::Invocation { backend: "mock".into(), message })
            }
            None => Ok(String::new()),
        }
    }
}

impl Default for MockBackend {
    fn default() -> Self {
        Self::new()
    }
}

impl AiBackend for MockBackend {
    fn name(&self) -> &str {
        "mock"
    }

    fn platform(&self) -> BackendPlatform {
        BackendPlatform::Auggie
    }

    fn run_print_quiet(&self, prompt: &str) -> Result<String, BackendError> {
        self.next_response(prompt)
    }

    fn run_streaming(
        &self,
        prompt: &str,
        on_line: &mut dyn FnMut(&str),
    ) -> Result<bool, BackendError> {
        match self.next_response(prompt) {
            Ok(output) => {
                for line in output.lines() {
                    on_line(line);
                }
                Ok(true)
            }
            Err(BackendError::Invocation { message, .. }) => {
                for line in message.lines() {
                    on_line(line);
                }
                Ok(false)
            }
            Err(e) => Err(e),
        }
    }
}

// ============================================================================
// TESTS
// ============================================================================

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_backend_platform_parse() {
        assert_eq!("auggie".parse::<BackendPlatform>().unwrap(), BackendPlatform::Auggie);
        assert_eq!("CLAUDE".parse::<BackendPlatform>().unwrap(), BackendPlatform::Claude);
        assert_eq!("claude_desktop".parse::<BackendPlatform>().unwrap(), BackendPlatform::Claude);
        assert!("copilot".parse::<BackendPlatform>().is_err());
    }

    #[test]
    fn test_agent_fetch_support_matrix() {
        assert!(BackendPlatform::Auggie.supports_agent_fetch());
        assert!(BackendPlatform::Claude.supports_agent_fetch());
        assert!(BackendPlatform::Cursor.supports_agent_fetch());
        assert!(!BackendPlatform::Aider.supports_agent_fetch());
        assert!(!BackendPlatform::Manual.supports_agent_fetch());
    }

    #[test]
    fn test_manual_backend_is_not_executable() {
        let err = create_backend(BackendPlatform::Manual, None, false).unwrap_err();
        assert!(matches!(err, BackendError::NotExecutable(_)));
    }

    #[test]
    fn test_mock_backend_scripted_responses() {
        let backend = MockBackend::new().with_response("first").with_response("second");
        assert_eq!(backend.run_print_quiet("a").unwrap(), "first");
        assert_eq!(backend.run_print_quiet("b").unwrap(), "second");
        assert_eq!(backend.prompts(), vec!["a", "b"]);
    }

    #[test]
    fn test_mock_backend_failure() {
        let backend = MockBackend::new().with_failure("boom");
        assert!(backend.run_print_quiet("x").is_err());
    }

    #[test]
    fn test_mock_backend_streaming_emits_lines() {
        let backend = MockBackend::new().with_response("one\ntwo\nthree");
        let mut lines = Vec::new();
        let ok = backend.run_streaming("x", &mut |line| lines.push(line.to_string())).unwrap();
        assert!(ok);
        assert_eq!(lines, vec!["one", "two", "three"]);
    }

    #[test]
    fn test_mock_backend_streaming_failure_returns_false() {
        let backend = MockBackend::new().with_failure("error: it broke");
        let mut lines = Vec::new();
        let ok = backend.run_streaming("x", &mut |line| lines.push(line.to_string())).unwrap();
        assert!(!ok);
        assert_eq!(lines, vec!["error: it broke"]);
    }
}
