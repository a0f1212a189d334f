//! # Ingot
//!
//! AI-assisted, ticket-driven development workflows.
//!
//! ## Overview
//!
//! Given a ticket reference from any supported issue tracker, Ingot fetches
//! and normalizes the ticket, drafts an implementation plan with an AI
//! backend, decomposes it into an approved task list, and executes the
//! tasks (sequentially or in parallel) while a live terminal dashboard
//! shows progress.
//!
//! ## Pipeline
//!
//! ```text
//! input ──► registry detects platform ──► TicketService
//!              │                             │ cache? ──► hit: done
//!              │                             ▼
//!              │                  agent fetcher ──► direct API fallback
//!              ▼                             │
//!         provider.normalize ◄───────────────┘
//!              │
//!              ▼
//!         WorkflowRunner: plan ──► tasklist ──► scheduler ──► TUI
//! ```
//!
//! ## Modules
//!
//! - [`ticket`] - Platforms, providers, fetchers, cache, and the service
//! - [`backend`] - The AI-oracle abstraction over agent CLIs
//! - [`workflow`] - Three-phase runner, task parsing, scheduler, events
//! - [`ui`] - Ratatui dashboard, keyboard polling, log buffers
//! - [`config`] - Cascading `KEY=VALUE` configuration
//! - [`error`] - Top-level error type, exit codes, fix suggestions
//!
//! ## Supported Platforms
//!
//! | Platform | Input forms | Direct API |
//! |----------|-------------|------------|
//! | Jira | `PROJ-123`, `/browse/` URLs | REST v3, basic auth |
//! | Linear | `TEAM-123`, `linear.app` URLs | GraphQL, header token |
//! | GitHub | `owner/repo#42`, issue/PR URLs | REST, bearer token |
//! | Azure DevOps | numeric ids, `dev.azure.com` URLs | REST, PAT |
//! | Monday.com | numeric ids, `/pulses/` URLs | GraphQL, header token |
//! | Trello | 8-char short links, `/c/` URLs | REST, query key+token |

pub mod backend;
pub mod config;
pub mod error;
pub mod git;
pub mod runtime;
pub mod ticket;
pub mod ui;
pub mod workflow;

pub use backend::{create_backend, AiBackend, BackendPlatform};
pub use config::ConfigManager;
pub use error::{ExitCode, FixSuggestion, IngotError};
pub use ticket::cache::{CacheKey, InMemoryTicketCache, TicketCache};
pub use ticket::registry::ProviderRegistry;
pub use ticket::service::{create_ticket_service, TicketService};
pub use ticket::{GenericTicket, Platform, TicketStatus, TicketType};
pub use workflow::runner::{WorkflowOptions, WorkflowRunner};
pub use workflow::state::WorkflowState;
