use std::sync::Arc;

use rental_api::{
    config::{Config, StoreBackend},
    db::{create_pool, create_redis_client, Cache, CacheWriterHandle},
    routes::{create_router, AppState},
    services::{
        MemoryStore, MemoryViewCounter, PgRecordStore, RecordStore, RedisViewCounter,
        RestRecordStore, ViewCounter,
    },
};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    tracing_subscriber::registry()
        .with(
            EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "rental_api=info,tower_http=info".into()),
        )
        .with(tracing_subscriber::fmt::layer())
        .init();

    let config = Config::from_env()?;
    let backend = config.backend()?;

    let store = build_store(&config, backend).await?;

    let (counter, cache, cache_handle) = build_redis(&config)?;

    tracing::info!(
        store = store.name(),
        views = counter.name(),
        "Record store ready"
    );

    let state = Arc::new(AppState::new(store, counter, cache, config.car_cache_ttl));
    let app = create_router(state);

    let addr = config.bind_addr();
    let listener = tokio::net::TcpListener::bind(&addr).await?;
    tracing::info!(addr = %addr, "Server running");

    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await?;

    if let Some(handle) = cache_handle {
        handle.shutdown().await;
    }

    Ok(())
}

async fn build_store(config: &Config, backend: StoreBackend) -> anyhow::Result<Arc<dyn RecordStore>> {
    let store: Arc<dyn RecordStore> = match backend {
        StoreBackend::Postgres => {
            let pool = create_pool(&config.database_url).await?;
            Arc::new(PgRecordStore::new(pool))
        }
        StoreBackend::Rest => {
            if config.rest_api_key.is_empty() {
                tracing::warn!("REST_API_KEY is empty, requests will be anonymous");
            }
            Arc::new(RestRecordStore::new(
                config.rest_url.clone(),
                config.rest_api_key.clone(),
            ))
        }
        StoreBackend::Memory => match &config.seed_file {
            Some(path) => {
                let store = MemoryStore::load(path).await?;
                if store.is_empty() {
                    tracing::warn!(path = %path, "Seed file has no cars");
                }
                Arc::new(store)
            }
            None => {
                tracing::warn!("SEED_FILE not set, memory store starts empty");
                Arc::new(MemoryStore::default())
            }
        },
    };

    tracing::info!(backend = %backend, "Record store configured");

    Ok(store)
}

/// View counter and car cache, both fall back to process memory without Redis
fn build_redis(
    config: &Config,
) -> anyhow::Result<(Arc<dyn ViewCounter>, Option<Cache>, Option<CacheWriterHandle>)> {
    match &config.redis_url {
        Some(redis_url) => {
            let client = create_redis_client(redis_url)?;
            let (cache, handle) = Cache::new(client.clone());
            let counter: Arc<dyn ViewCounter> = Arc::new(RedisViewCounter::new(client));
            Ok((counter, Some(cache), Some(handle)))
        }
        None => {
            tracing::warn!(
                "REDIS_URL not set, car detail caching disabled and view counts kept in memory"
            );
            let counter: Arc<dyn ViewCounter> = Arc::new(MemoryViewCounter::new());
            Ok((counter, None, None))
        }
    }
}

async fn shutdown_signal() {
    if let Err(e) = tokio::signal::ctrl_c().await {
        tracing::error!(error = %e, "Failed to listen for shutdown signal");
    }
    tracing::info!("Shutdown signal received");
}
