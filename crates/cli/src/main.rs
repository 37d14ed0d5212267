//! The `sentinel` binary: serve the API, initialize the schema, add a
//! subscription, or run a one-shot collection sweep.

mod bootstrap;

use clap::{Parser, Subcommand};
use tokio_util::sync::CancellationToken;
use uuid::Uuid;

use sentinel_common::{SentinelConfig, SentinelEvent};
use sentinel_storage::{NewSubscription, NewUser};

#[derive(Parser)]
#[command(name = "sentinel")]
#[command(about = "Repository-activity sentinel")]
struct Cli {
    /// Path to a config file (defaults to config/config.yml, then
    /// config/config.yaml, then built-in defaults).
    #[arg(long, global = true)]
    config: Option<String>,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Run the HTTP/WS server with the scheduler and notification engine
    Serve {
        #[arg(long)]
        host: Option<String>,
        #[arg(long)]
        port: Option<u16>,
    },
    /// Create the database schema
    Init,
    /// Subscribe to a repository
    AddSubscription {
        /// owner/name
        #[arg(long)]
        repo: String,
        /// Owner handle; defaults to the first user, created if absent
        #[arg(long)]
        user: Option<String>,
    },
    /// One-shot collection sweep over every active subscription
    Collect,
}

fn load_config(path: Option<&str>) -> anyhow::Result<SentinelConfig> {
    match path {
        Some(path) => Ok(SentinelConfig::load_from(path)?),
        None => Ok(SentinelConfig::load()?),
    }
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();
    let config = load_config(cli.config.as_deref())?;
    let _log_guard =
        sentinel_common::logging::init_tracing(&config.log_level, config.log_file.as_deref())?;

    match cli.command {
        Commands::Serve { host, port } => serve(config, host, port).await,
        Commands::Init => init(config).await,
        Commands::AddSubscription { repo, user } => add_subscription(config, repo, user).await,
        Commands::Collect => collect(config).await,
    }
}

async fn serve(
    mut config: SentinelConfig,
    host: Option<String>,
    port: Option<u16>,
) -> anyhow::Result<()> {
    if let Some(host) = host {
        config.app.host = host;
    }
    if let Some(port) = port {
        config.app.port = port;
    }

    let services = bootstrap::build(config).await?;
    let state = services.state.clone();

    // A platform token is mandatory once anything is actively watched.
    {
        let config = state.config.read().await;
        if config.github.token.is_empty()
            && state.store.count_active_subscriptions().await? > 0
        {
            anyhow::bail!(
                "github.token is not configured but active subscriptions exist; \
                 set it in config/config.yml"
            );
        }
    }

    // The engine consumes pipeline events until shutdown.
    let engine_cancel = state.scheduler.cancellation_token();
    tokio::spawn(services.engine.clone().run(state.events.clone(), engine_cancel));

    bootstrap::register_jobs(&services).await?;

    let (addr_host, addr_port) = {
        let config = state.config.read().await;
        (config.app.host.clone(), config.app.port)
    };
    let app = sentinel_api::router(state.clone());
    let listener = tokio::net::TcpListener::bind(format!("{addr_host}:{addr_port}")).await?;
    tracing::info!(host = %addr_host, port = addr_port, "sentinel serving");

    axum::serve(listener, app)
        .with_graceful_shutdown(async {
            let _ = tokio::signal::ctrl_c().await;
            tracing::info!("shutdown signal received");
        })
        .await?;

    state.scheduler.shutdown().await;
    Ok(())
}

async fn init(config: SentinelConfig) -> anyhow::Result<()> {
    let store = sentinel_storage::SqliteStore::connect(&config.database.url).await?;
    store.init_schema().await?;
    println!("schema ready at {}", config.database.url);
    Ok(())
}

async fn add_subscription(
    config: SentinelConfig,
    repo: String,
    user_handle: Option<String>,
) -> anyhow::Result<()> {
    let store = sentinel_storage::SqliteStore::connect(&config.database.url).await?;
    store.init_schema().await?;

    let users = store.list_users(200, 0).await?;
    let owner = match &user_handle {
        Some(handle) => users
            .into_iter()
            .find(|u| &u.handle == handle)
            .ok_or_else(|| anyhow::anyhow!("no user with handle {handle}"))?,
        None => match users.into_iter().next() {
            Some(user) => user,
            None => {
                let token = Uuid::new_v4().to_string();
                let user = store
                    .create_user(NewUser {
                        handle: "admin".to_string(),
                        email: "admin@localhost".to_string(),
                        display_name: None,
                        api_token: Some(token.clone()),
                    })
                    .await?;
                println!("created user 'admin' with api token {token}");
                user
            }
        },
    };

    let subscription = store
        .create_subscription(NewSubscription {
            owner_user_id: owner.id,
            repo_ref: repo,
            cadence: sentinel_common::types::Cadence::Daily,
            watches: Default::default(),
            filters: Default::default(),
            delivery: Default::default(),
        })
        .await?;
    println!(
        "subscription {} created for {} (owner {})",
        subscription.id, subscription.repo_ref, owner.handle
    );
    Ok(())
}

async fn collect(config: SentinelConfig) -> anyhow::Result<()> {
    let services = bootstrap::build(config).await?;
    let state = services.state;

    // Surface the event flow on the console for the one-shot run.
    let mut events = state.events.subscribe();
    let printer = tokio::spawn(async move {
        while let Ok(event) = events.recv().await {
            if let SentinelEvent::NewActivity { activity, subscription } = event {
                println!(
                    "new {} in {}: {}",
                    activity.kind, subscription.repo_ref, activity.title
                );
            }
        }
    });

    let cancel = CancellationToken::new();
    let summary = state
        .collector
        .collect_sweep(bootstrap::COLLECTION_WINDOW, &cancel)
        .await?;
    printer.abort();

    println!(
        "sweep finished: {} subscriptions, {} ok, {} failed, {} new activities",
        summary.subscriptions, summary.success_count, summary.error_count, summary.inserted
    );
    Ok(())
}
