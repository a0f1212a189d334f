//! Ingot CLI - ticket-driven AI development workflows.

use std::sync::Arc;

use clap::{Parser, Subcommand};
use colored::Colorize;
use tracing::warn;

use ingot::backend::{create_backend, BackendPlatform};
use ingot::config::ConfigManager;
use ingot::error::{print_error, IngotError};
use ingot::runtime::run_async;
use ingot::ticket::auth::AuthStore;
use ingot::ticket::cache::{get_global_cache, CacheKind};
use ingot::ticket::provider::{CliInteraction, ProviderContext};
use ingot::ticket::registry::ProviderRegistry;
use ingot::ticket::service::create_ticket_service;
use ingot::ticket::{GenericTicket, Platform};
use ingot::workflow::runner::{WorkflowOptions, WorkflowRunner};
use ingot::workflow::tasklist::CliPrompter;

#[derive(Parser)]
#[command(name = "ingot")]
#[command(about = "Ingot - AI-assisted, ticket-driven development workflows")]
#[command(version)]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Run the full workflow for a ticket
    Run {
        /// Ticket id or URL (e.g. PROJ-123, owner/repo#42, a tracker URL)
        ticket: String,

        /// Pin the platform for ambiguous ids (jira, linear, github, ...)
        #[arg(short, long)]
        platform: Option<String>,

        /// Override the configured AI backend
        #[arg(short, long)]
        backend: Option<String>,

        /// Skip the ticket cache
        #[arg(long)]
        skip_cache: bool,

        /// Disable the live dashboard
        #[arg(long)]
        no_tui: bool,

        /// Abort the run on the first task failure
        #[arg(long)]
        fail_fast: bool,
    },

    /// Fetch and display a ticket without starting a workflow
    Ticket {
        /// Ticket id or URL
        input: String,

        /// Pin the platform for ambiguous ids
        #[arg(short, long)]
        platform: Option<String>,

        /// Skip the ticket cache
        #[arg(long)]
        skip_cache: bool,

        /// Print the normalized ticket as JSON
        #[arg(long)]
        json: bool,
    },

    /// Inspect or clear the ticket cache
    Cache {
        #[command(subcommand)]
        action: CacheAction,
    },
}

#[derive(Subcommand)]
enum CacheAction {
    /// Show per-platform entry counts
    Stats,
    /// Remove cached entries
    Clear {
        /// Only clear one platform
        #[arg(short, long)]
        platform: Option<String>,
    },
}

fn main() {
    init_logging();

    let cli = Cli::parse();
    let result = match cli.command {
        Commands::Run { ticket, platform, backend, skip_cache, no_tui, fail_fast } => {
            cmd_run(&ticket, platform.as_deref(), backend.as_deref(), skip_cache, no_tui, fail_fast)
        }
        Commands::Ticket { input, platform, skip_cache, json } => {
            cmd_ticket(&input, platform.as_deref(), skip_cache, json)
        }
        Commands::Cache { action } => cmd_cache(action),
    };

    if let Err(error) = result {
        print_error(&error);
        std::process::exit(error.exit_code().code());
    }
}

/// `INGOT_LOG=true` tees debug logs to a file (`INGOT_LOG_FILE` or
/// `~/.ingot.log`); otherwise warnings go to stderr, tunable via RUST_LOG.
fn init_logging() {
    use tracing_subscriber::EnvFilter;

    let file_logging = std::env::var("INGOT_LOG")
        .map(|v| matches!(v.to_ascii_lowercase().as_str(), "true" | "1" | "yes"))
        .unwrap_or(false);

    if file_logging {
        let path = std::env::var("INGOT_LOG_FILE").unwrap_or_else(|_| {
            dirs::home_dir()
                .unwrap_or_default()
                .join(".ingot.log")
                .to_string_lossy()
                .into_owned()
        });
        if let Ok(file) = std::fs::OpenOptions::new().create(true).append(true).open(&path) {
            tracing_subscriber::fmt()
                .with_env_filter(
                    EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("debug")),
                )
                .with_writer(Arc::new(file))
                .with_ansi(false)
                .init();
            return;
        }
        eprintln!("{} could not open log file {path}", "warning:".yellow());
    }
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("warn")),
        )
        .with_writer(std::io::stderr)
        .init();
}

/// Shared wiring: config, registry, auth.
struct AppContext {
    config: ConfigManager,
    registry: Arc<ProviderRegistry>,
    auth: Arc<AuthStore>,
}

fn build_context(platform_override: Option<&str>) -> Result<AppContext, IngotError> {
    let mut config = ConfigManager::new();
    config.load();

    let mut provider_config = config.provider_context();
    if let Some(platform) = platform_override {
        let platform: Platform = platform
            .parse()
            .map_err(|e: ingot::ticket::UnknownPlatform| IngotError::other(e.to_string()))?;
        provider_config.insert("default_platform".to_string(), platform.name().to_string());
    }

    let registry = Arc::new(ProviderRegistry::with_default_providers(ProviderContext::new(
        provider_config,
        Arc::new(CliInteraction),
    )));
    let auth = Arc::new(AuthStore::from_config(&config));
    Ok(AppContext { config, registry, auth })
}

fn fetch_ticket(
    ctx: &AppContext,
    input: &str,
    backend_override: Option<&str>,
    skip_cache: bool,
) -> Result<GenericTicket, IngotError> {
    let mut agent_config = ctx.config.agent_config()?;
    if let Some(name) = backend_override {
        agent_config.platform = name.parse()?;
    }

    let backend = if agent_config.platform == BackendPlatform::Manual {
        None
    } else {
        Some(Arc::from(create_backend(agent_config.platform, None, true)?))
    };

    let performance = ctx.config.fetch_performance_config();
    let cache = get_global_cache(CacheKind::File, performance.cache_ttl(), 0);

    let service = create_ticket_service(
        backend,
        Arc::clone(&ctx.auth),
        &ctx.config,
        Arc::clone(&ctx.registry),
        Some(cache),
    )?;

    let ticket = run_async(async {
        let result = service.get_ticket(input, skip_cache, None).await;
        service.close().await;
        result
    })??;
    Ok(ticket)
}

fn cmd_run(
    input: &str,
    platform: Option<&str>,
    backend_override: Option<&str>,
    skip_cache: bool,
    no_tui: bool,
    fail_fast: bool,
) -> Result<(), IngotError> {
    let ctx = build_context(platform)?;

    // Best-effort fetch: a failed lookup degrades to an id-only ticket so
    // the workflow can still run.
    let ticket = match fetch_ticket(&ctx, input, backend_override, skip_cache) {
        Ok(ticket) => ticket,
        Err(error @ IngotError::Backend(_)) => return Err(error),
        Err(error) => {
            warn!(error = %error, "ticket fetch failed, continuing with id only");
            println!(
                "{} Could not fetch ticket details. Continuing with the ticket id only.",
                "warning:".yellow()
            );
            let provider = ctx.registry.get_provider_for_input(input).map_err(|e| {
                IngotError::Service(ingot::ticket::service::ServiceError::Registry(e))
            })?;
            let id = provider
                .parse_input(input)
                .map_err(|e| IngotError::other(e.to_string()))?;
            GenericTicket::with_id_only(id, provider.platform())
        }
    };

    let mut agent_config = ctx.config.agent_config()?;
    if let Some(name) = backend_override {
        agent_config.platform = name.parse()?;
    }
    let backend: Arc<dyn ingot::backend::AiBackend> = Arc::from(create_backend(
        agent_config.platform,
        Some(&ctx.config.implementation_model()),
        true,
    )?);

    let options = WorkflowOptions {
        planning_model: ctx.config.planning_model(),
        implementation_model: ctx.config.implementation_model(),
        skip_clarification: ctx.config.skip_clarification(),
        squash_at_end: ctx.config.squash_at_end(),
        fail_fast: fail_fast || ctx.config.fail_fast(),
        use_tui: if no_tui { Some(false) } else { None },
        parallel_enabled: ctx.config.parallel_execution_enabled(),
        max_parallel: ctx.config.max_parallel_tasks(),
        max_retries: ctx.config.fetch_performance_config().max_retries,
        retry_delay_seconds: ctx.config.fetch_performance_config().retry_delay_seconds,
        specs_dir: None,
        runs_dir: None,
    };
    let prompter = Arc::new(CliPrompter { editor: ctx.config.preferred_editor() });
    let runner = WorkflowRunner::new(backend, prompter, options);

    if runner.run(ticket)? {
        Ok(())
    } else {
        Err(IngotError::other("workflow did not complete successfully"))
    }
}

fn cmd_ticket(
    input: &str,
    platform: Option<&str>,
    skip_cache: bool,
    json: bool,
) -> Result<(), IngotError> {
    let ctx = build_context(platform)?;
    let ticket = fetch_ticket(&ctx, input, None, skip_cache)?;

    if json {
        println!("{}", serde_json::to_string_pretty(&ticket).map_err(|e| IngotError::other(e.to_string()))?);
        return Ok(());
    }

    println!("{} {}", ticket.platform.display_name().bold(), ticket.id.bold());
    if !ticket.title.is_empty() {
        println!("  {}", ticket.title);
    }
    println!("  status: {}  type: {}", ticket.status, ticket.ty);
    if let Some(assignee) = &ticket.assignee {
        println!("  assignee: {assignee}");
    }
    if !ticket.labels.is_empty() {
        println!("  labels: {}", ticket.labels.join(", "));
    }
    if !ticket.url.is_empty() {
        println!("  {}", ticket.url.dimmed());
    }
    Ok(())
}

fn cmd_cache(action: CacheAction) -> Result<(), IngotError> {
    let mut config = ConfigManager::new();
    config.load();
    let cache = get_global_cache(
        CacheKind::File,
        config.fetch_performance_config().cache_ttl(),
        0,
    );

    match action {
        CacheAction::Stats => {
            let stats = cache.stats();
            if stats.is_empty() {
                println!("Cache is empty.");
            } else {
                for (platform, count) in stats {
                    println!("{platform:>14}: {count}");
                }
                println!("{:>14}: {}", "total", cache.size());
            }
        }
        CacheAction::Clear { platform } => match platform {
            Some(name) => {
                let platform: Platform = name
                    .parse()
                    .map_err(|e: ingot::ticket::UnknownPlatform| IngotError::other(e.to_string()))?;
                cache.clear_platform(platform);
                println!("{} Cleared {} cache entries", "✓".green(), platform.display_name());
            }
            None => {
                cache.clear();
                println!("{} Cache cleared", "✓".green());
            }
        },
    }
    Ok(())
}
