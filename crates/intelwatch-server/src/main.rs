use anyhow::Result;
use chrono::Utc;
use intelwatch_feeds::collector::FeedCollector;
use intelwatch_feeds::{build_provider, FeedProvider};
use intelwatch_ingest::{IngestEngine, RetentionSweeper};
use intelwatch_storage::SqlThreatStore;
use std::net::SocketAddr;
use std::sync::Arc;
use tokio::signal;
use tracing_subscriber::EnvFilter;

use intelwatch_server::app;
use intelwatch_server::config::ServerConfig;
use intelwatch_server::intel::scheduler::CollectionScheduler;
use intelwatch_server::state::AppState;

#[allow(clippy::print_stderr)]
fn print_usage() {
    eprintln!("Usage:");
    eprintln!("  intelwatch-server [config.toml]    Start the server");
}

#[tokio::main]
async fn main() -> Result<()> {
    intelwatch_common::id::init(1, 1);

    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::from_default_env().add_directive("intelwatch=info".parse()?))
        .init();

    let args: Vec<String> = std::env::args().collect();
    match args.get(1).map(|s| s.as_str()) {
        Some("--help" | "-h") => {
            print_usage();
            Ok(())
        }
        arg => {
            let config_path = arg.unwrap_or("config/server.toml");
            run_server(config_path).await
        }
    }
}

async fn run_server(config_path: &str) -> Result<()> {
    let config = ServerConfig::load(config_path)?;

    tracing::info!(
        http_port = config.http_port,
        data_dir = %config.database.data_dir,
        db = %config.database.redacted_url(),
        "intelwatch-server starting"
    );

    std::fs::create_dir_all(&config.database.data_dir)?;
    let store = Arc::new(SqlThreatStore::connect(&config.database.connection_url()).await?);

    // Default admin account: create if the users table is empty
    match store.count_users().await {
        Ok(0) => {
            let password_hash =
                intelwatch_storage::auth::hash_password(&config.auth.default_password)?;
            match store
                .create_user(
                    &config.auth.default_username,
                    &config.auth.default_email,
                    &password_hash,
                    "admin",
                )
                .await
            {
                Ok(_) => {
                    tracing::info!(
                        username = %config.auth.default_username,
                        "Created default admin account"
                    );
                }
                Err(e) => {
                    tracing::error!(error = %e, "Failed to create default admin account");
                }
            }
        }
        Ok(count) => {
            tracing::info!(count, "Users table already has accounts, skipping default admin");
        }
        Err(e) => {
            tracing::error!(error = %e, "Failed to check users table");
        }
    }

    // JWT secret: use configured value or generate a random one
    let jwt_secret = match &config.auth.jwt_secret {
        Some(secret) => Arc::new(secret.clone()),
        None => {
            tracing::warn!(
                "No jwt_secret configured. A random secret was generated and will change on \
                 restart. Set [auth].jwt_secret in config for production use."
            );
            Arc::new(intelwatch_storage::auth::generate_secret())
        }
    };

    // Feed providers from config
    let mut providers: Vec<Arc<dyn FeedProvider>> = Vec::new();
    for source in config.collection.sources.iter().filter(|s| s.enabled) {
        match build_provider(source) {
            Ok(provider) => providers.push(Arc::from(provider)),
            Err(e) => {
                tracing::error!(source = %source.name, error = %e, "Failed to build feed provider");
            }
        }
    }

    let engine = Arc::new(IngestEngine::new(store.clone()));
    let sweeper = RetentionSweeper::new(store.clone());
    let collector = FeedCollector::new(providers, config.collection.fetch_timeout_secs);
    let scheduler = Arc::new(CollectionScheduler::new(
        store.clone(),
        engine.clone(),
        collector,
        sweeper,
        config.collection.interval_secs,
        config.sweep.interval_secs,
        config.sweep.retention_days,
    ));

    let state = AppState {
        store,
        engine,
        scheduler: scheduler.clone(),
        jwt_secret,
        token_expire_secs: config.auth.token_expire_secs,
        start_time: Utc::now(),
        config: Arc::new(config.clone()),
    };

    // Background jobs run as their own tasks so cycles never block request
    // handling
    let collection_handle = if config.collection.enabled {
        let scheduler = scheduler.clone();
        Some(tokio::spawn(async move {
            scheduler.run_collection_loop().await;
        }))
    } else {
        tracing::info!("Threat collection scheduler disabled");
        None
    };
    let sweep_handle = if config.sweep.enabled {
        let scheduler = scheduler.clone();
        Some(tokio::spawn(async move {
            scheduler.run_sweep_loop().await;
        }))
    } else {
        tracing::info!("Retention sweep scheduler disabled");
        None
    };

    // HTTP/REST server
    let http_addr: SocketAddr = format!("0.0.0.0:{}", config.http_port).parse()?;
    let listener = tokio::net::TcpListener::bind(http_addr).await?;
    let server = axum::serve(
        listener,
        app::build_http_app(state).into_make_service_with_connect_info::<SocketAddr>(),
    );

    tracing::info!(http = %http_addr, "Server started");

    tokio::select! {
        result = server.with_graceful_shutdown(async { signal::ctrl_c().await.ok(); }) => {
            if let Err(e) = result {
                tracing::error!(error = %e, "HTTP server error");
            }
        }
        _ = signal::ctrl_c() => {
            tracing::info!("Shutting down gracefully");
        }
    }

    if let Some(h) = collection_handle {
        h.abort();
    }
    if let Some(h) = sweep_handle {
        h.abort();
    }
    tracing::info!("Server stopped");

    Ok(())
}
