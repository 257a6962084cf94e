use std::sync::Arc;

use axum::{Router, http::HeaderValue};
use dotenv::dotenv;
use eyre::WrapErr;
use tower_http::{
    cors::{AllowOrigin, CorsLayer},
    trace::TraceLayer,
};
use tracing_subscriber::{EnvFilter, layer::SubscriberExt, util::SubscriberInitExt};

mod butterfly;
mod config;
mod error;
mod json;
mod revalidate;
mod store;

use config::{Env, ServerConfig, StoreConfig};
use revalidate::Revalidator;
use store::{ButterflyStore, InMemoryStore, MongoStore};

#[global_allocator]
static GLOBAL: mimalloc::MiMalloc = mimalloc::MiMalloc;

#[derive(Clone)]
pub struct App {
    pub store: Arc<dyn ButterflyStore>,
    pub revalidator: Arc<Revalidator>,
    pub config: Arc<ServerConfig>,
}

#[tokio::main]
async fn main() -> eyre::Result<()> {
    dotenv().ok();
    init_tracing();

    let config = ServerConfig::new_from_env();

    let store: Arc<dyn ButterflyStore> = match &config.store {
        StoreConfig::Mongo {
            uri,
            database,
            transactions,
        } => {
            let store = MongoStore::connect(uri, database, *transactions)
                .await
                .wrap_err("couldn't connect to MongoDB")?;
            store
                .ensure_indexes()
                .await
                .wrap_err("couldn't create MongoDB indexes")?;
            tracing::info!(database, transactions, "Connected to MongoDB");
            Arc::new(store)
        }
        StoreConfig::Memory => {
            tracing::warn!("Using the in-memory store, nothing will be persisted");
            Arc::new(InMemoryStore::new())
        }
    };

    let cors = cors_layer(&config);
    let listen_addr = config.listen_addr;

    let shared_state = App {
        store,
        revalidator: Arc::new(Revalidator::new()),
        config: Arc::new(config),
    };

    let app = Router::new()
        .merge(butterfly::routes::route())
        .merge(revalidate::route())
        .layer(TraceLayer::new_for_http())
        .layer(cors)
        .with_state(shared_state);

    let listener = tokio::net::TcpListener::bind(listen_addr)
        .await
        .wrap_err_with(|| format!("couldn't bind to {listen_addr}"))?;
    tracing::info!("listening on {}", listen_addr);

    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await
        .wrap_err("server error")?;

    Ok(())
}

fn init_tracing() {
    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new("butterflies=debug,tower_http=debug"));

    // Logs are shipped as JSON in production
    let json = std::env::var("ENVIRONMENT").is_ok_and(|env| env == "production");

    tracing_subscriber::registry()
        .with(filter)
        .with(json.then(|| tracing_subscriber::fmt::layer().json()))
        .with((!json).then(|| tracing_subscriber::fmt::layer().compact()))
        .init();
}

fn cors_layer(config: &ServerConfig) -> CorsLayer {
    if config.cors_origins.is_empty() {
        if config.env != Env::Dev {
            tracing::warn!("No CORS_ORIGINS configured, allowing any origin");
        }
        return CorsLayer::permissive();
    }

    let origins = config
        .cors_origins
        .iter()
        .filter_map(|origin| match origin.parse::<HeaderValue>() {
            Ok(value) => Some(value),
            Err(error) => {
                tracing::warn!(%error, origin, "Ignoring invalid CORS origin");
                None
            }
        });

    CorsLayer::new()
        .allow_origin(AllowOrigin::list(origins))
        .allow_methods(tower_http::cors::Any)
        .allow_headers(tower_http::cors::Any)
}

async fn shutdown_signal() {
    if let Err(error) = tokio::signal::ctrl_c().await {
        tracing::error!(%error, "Failed to listen for shutdown signal");
    }
    tracing::info!("Shutting down");
}
