//! # Workflow Orchestration
//!
//! The three-phase, ticket-driven development workflow:
//!
//! 1. [`plan`] - draft an implementation plan with the AI backend
//! 2. [`tasklist`] - turn the plan into an approved checkbox task list
//! 3. [`execute`] - run the tasks through the scheduler with live events
//!
//! [`runner`] owns the state machine and cleanup-on-failure reporting;
//! [`state`] carries the shared run record; [`events`] defines the
//! lifecycle events consumed by the dashboard.

pub mod events;
pub mod execute;
pub mod plan;
pub mod runner;
pub mod state;
pub mod tasklist;
pub mod tasks;

use crate::backend::BackendError;

/// Workflow-phase failures.
#[derive(Debug, thiserror::Error)]
pub enum WorkflowError {
    #[error(transparent)]
    Io(#[from] std::io::Error),

    #[error(transparent)]
    Backend(#[from] BackendError),

    /// The user aborted an interactive prompt.
    #[error("cancelled by user")]
    UserCancelled,
}
