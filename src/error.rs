//! # Top-Level Error Handling
//!
//! Domain errors stay in their modules (`thiserror` enums at each subsystem
//! boundary); this module provides the unified wrapper the CLI entry point
//! works with, the process exit-code mapping, and the [`FixSuggestion`]
//! trait that turns an error into an actionable hint.

use crate::backend::BackendError;
use crate::config::ConfigError;
use crate::runtime::AsyncBridgeError;
use crate::ticket::fetch::FetchError;
use crate::ticket::registry::RegistryError;
use crate::ticket::service::ServiceError;
use crate::workflow::WorkflowError;

// ============================================================================
// EXIT CODES
// ============================================================================

/// Process exit codes.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[repr(i32)]
pub enum ExitCode {
    Success = 0,
    GeneralError = 1,
    BackendNotInstalled = 2,
    PlatformNotConfigured = 3,
    UserCancelled = 4,
    GitError = 5,
}

impl ExitCode {
    pub fn code(self) -> i32 {
        self as i32
    }
}

// ============================================================================
// FIX SUGGESTIONS
// ============================================================================

/// Errors that can tell the user what to do about them.
pub trait FixSuggestion {
    fn fix_suggestion(&self) -> Option<&'static str>;
}

// ============================================================================
// INGOT ERROR
// ============================================================================

/// Unified top-level error for the CLI.
#[derive(Debug, thiserror::Error)]
pub enum IngotError {
    #[error("{0}")]
    Service(#[from] ServiceError),

    #[error("{0}")]
    Backend(#[from] BackendError),

    #[error("{0}")]
    Config(#[from] ConfigError),

    #[error("{0}")]
    Workflow(#[from] WorkflowError),

    #[error("{0}")]
    AsyncBridge(#[from] AsyncBridgeError),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("git error: {0}")]
    Git(String),

    #[error("{0}")]
    Other(String),
}

impl IngotError {
    pub fn other(message: impl Into<String>) -> Self {
        IngotError::Other(message.into())
    }

    /// Map each error kind onto its process exit code.
    pub fn exit_code(&self) -> ExitCode {
        match self {
            IngotError::Backend(BackendError::NotInstalled { .. }) => ExitCode::BackendNotInstalled,
            IngotError::Backend(_) => ExitCode::GeneralError,
            IngotError::Service(ServiceError::Registry(RegistryError::PlatformNotSupported {
                ..
            }))
            | IngotError::Service(ServiceError::NoFetcherForPlatform(_))
            | IngotError::Service(ServiceError::NotConfigured(_))
            | IngotError::Service(ServiceError::Fetch(FetchError::AgentIntegration { .. })) => {
                ExitCode::PlatformNotConfigured
            }
            IngotError::Workflow(WorkflowError::UserCancelled) => ExitCode::UserCancelled,
            IngotError::Git(_) => ExitCode::GitError,
            _ => ExitCode::GeneralError,
        }
    }
}

impl FixSuggestion for IngotError {
    fn fix_suggestion(&self) -> Option<&'static str> {
        match self {
            IngotError::Backend(BackendError::NotInstalled { .. }) => {
                Some("Install the backend CLI or pick another with AI_BACKEND in your config")
            }
            IngotError::Backend(BackendError::UnknownPlatform(_)) => {
                Some("Valid backends: auggie, claude, cursor, aider, manual")
            }
            IngotError::Service(ServiceError::Registry(RegistryError::AmbiguousInput {
                ..
            })) => Some("Pass --platform to pin the tracker, or set DEFAULT_PLATFORM in config"),
            IngotError::Service(ServiceError::Registry(
                RegistryError::PlatformNotSupported { .. },
            )) => Some("Check the ticket id or URL format against the supported platforms"),
            IngotError::Service(ServiceError::NoFetcherForPlatform(_))
            | IngotError::Service(ServiceError::Fetch(FetchError::AgentIntegration { .. })) => {
                Some("Configure FALLBACK_<PLATFORM>_* credentials or enable the agent integration")
            }
            IngotError::Service(ServiceError::Fetch(FetchError::AgentFetch { .. })) => {
                Some("Verify the ticket exists and your network can reach the platform")
            }
            IngotError::Config(ConfigError::EnvVarExpansion { .. }) => {
                Some("Export the referenced environment variable or inline the value")
            }
            IngotError::Config(ConfigError::Validation { .. }) => {
                Some("Fix the reported config keys in ~/.ingot-config or .ingot")
            }
            IngotError::Git(_) => Some("Check `git status` and resolve the repository state"),
            _ => None,
        }
    }
}

/// Print an error with its hint to stderr.
pub fn print_error(error: &IngotError) {
    eprintln!("Error: {error}");
    if let Some(suggestion) = error.fix_suggestion() {
        eprintln!("  Fix: {suggestion}");
    }
}

// ============================================================================
// TESTS
// ============================================================================

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ticket::Platform;

    #[test]
    fn test_exit_code_values() {
        assert_eq!(ExitCode::Success.code(), 0);
        assert_eq!(ExitCode::GeneralError.code(), 1);
        assert_eq!(ExitCode::BackendNotInstalled.code(), 2);
        assert_eq!(ExitCode::PlatformNotConfigured.code(), 3);
        assert_eq!(ExitCode::UserCancelled.code(), 4);
        assert_eq!(ExitCode::GitError.code(), 5);
    }

    #[test]
    fn test_backend_not_installed_maps_to_2() {
        let error: IngotError = BackendError::NotInstalled {
            backend: "claude".into(),
            binary: "claude".into(),
        }
        .into();
        assert_eq!(error.exit_code(), ExitCode::BackendNotInstalled);
        assert!(error.fix_suggestion().is_some());
    }

    #[test]
    fn test_user_cancelled_maps_to_4() {
        let error: IngotError = WorkflowError::UserCancelled.into();
        assert_eq!(error.exit_code(), ExitCode::UserCancelled);
    }

    #[test]
    fn test_unconfigured_platform_maps_to_3() {
        let error: IngotError = ServiceError::NoFetcherForPlatform(Platform::Trello).into();
        assert_eq!(error.exit_code(), ExitCode::PlatformNotConfigured);
        assert!(error.fix_suggestion().unwrap().contains("FALLBACK_"));
    }

    #[test]
    fn test_git_error_maps_to_5() {
        let error = IngotError::Git("merge conflict".into());
        assert_eq!(error.exit_code(), ExitCode::GitError);
    }

    #[test]
    fn test_generic_errors_map_to_1() {
        assert_eq!(IngotError::other("boom").exit_code(), ExitCode::GeneralError);
    }
}
