pub mod api;
pub mod config;
pub mod error;
pub mod logic;
pub mod model;
pub mod seed;
pub mod store;

use std::sync::Arc;

// Export API types
pub use api::handlers;
pub use api::routes;

pub use error::{ApiError, ConversionError};

// Export logic types
pub use logic::{FormatConverter, Registry, StateMachine, StudyIndexer, Workflow};

// Export all model types
pub use model::*;

// Export seed module
pub use seed::*;

// Export store types
pub use store::{InMemoryStore, PostgresStore, Store};

use crate::config::{AppConfig, StoreBackend};
use crate::logic::search_index::HttpStudyIndexer;

/// Assemble the study service for `store` from the configured workflow and
/// search index.
pub async fn build_registry<S: Store + 'static>(store: Arc<S>, config: &AppConfig) -> anyhow::Result<Registry<S>> {
    let workflow = match &config.workflow.states_file {
        Some(path) => Workflow::from_file(path)?,
        None => Workflow::default(),
    };
    log::info!("Workflow states: {}", workflow.states().len());

    let mut registry = Registry::new(store, Arc::new(workflow));
    if let Some(indexer) = HttpStudyIndexer::from_config(&config.search) {
        log::info!("Search indexing enabled ({})", config.search.url);
        registry = registry.with_indexer(Arc::new(indexer));
    }

    if std::env::var("LOAD_SEED_DATA").unwrap_or_default() == "true" {
        log::info!("Loading seed data...");
        seed::load_seed_data(&**registry.store()).await?;
    }

    if config.index.rebuild_on_start {
        let rebuilt = registry.rebuild_entity_index().await?;
        log::info!("Entity index rebuilt for {} studies", rebuilt);
    }

    Ok(registry)
}

/// Serve the API for `store` on `listener` until the server stops.
pub async fn serve<S: Store + 'static>(
    store: Arc<S>,
    config: &AppConfig,
    listener: tokio::net::TcpListener,
) -> anyhow::Result<()> {
    let registry = Arc::new(build_registry(store, config).await?);
    let app = crate::api::routes::create_router().with_state(registry);

    axum::serve(listener, app).await?;

    Ok(())
}

// Function for integration testing
pub async fn run_server() -> anyhow::Result<()> {
    use tokio::net::TcpListener;

    // Load environment variables from .env file if it exists
    dotenvy::dotenv().ok();

    // Initialize logging with INFO level only (suppress DEBUG logs)
    let _ = env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("info"))
        .try_init();

    // Load configuration
    let config = AppConfig::load()?;
    log::info!(
        "Configuration loaded: server={}, backend={:?}",
        config.server_address(),
        config.database.backend
    );
    let listener = TcpListener::bind(config.server_address()).await?;
    log::info!("Metadata registry listening on http://{}", config.server_address());

    match config.database.backend {
        StoreBackend::Memory => serve(Arc::new(InMemoryStore::new()), &config, listener).await,
        StoreBackend::Postgres => {
            let database_url = config.database_url()?;
            let max_connections = config.database.max_connections.unwrap_or(20);
            let postgres_store = PostgresStore::new(&database_url, max_connections).await?;

            // Run migrations
            postgres_store.migrate().await?;

            serve(Arc::new(postgres_store), &config, listener).await
        }
    }
}
