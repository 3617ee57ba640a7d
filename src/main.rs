mod api;
mod category_tree;
mod config;
mod error;
mod hierarchy;
mod legacy;
mod legacy_catalog;
#[cfg(test)]
mod memory_store;
mod migrator;
mod models;
mod relationships;
mod sqlite_store;
mod store;
mod taxonomy;
#[cfg(test)]
mod test_support;

use std::sync::Arc;

use anyhow::{Context, Result};
use axum::{
    http::HeaderValue,
    routing::{get, post},
    Router,
};
use config::Config;
use migrator::Migrator;
use sqlite_store::SqliteStore;
use store::CatalogStore;
use tower_http::{
    cors::{Any, CorsLayer},
    trace::TraceLayer,
};
use tracing::{error, info, warn};

#[derive(Clone)]
pub struct AppState {
    pub store: Arc<dyn CatalogStore>,
}

#[tokio::main]
async fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "firearm_catalog_api=info,tower_http=info".into()),
        )
        .init();

    let config = Config::from_env()?;
    let store: Arc<dyn CatalogStore> = if config.uses_in_memory_database() {
        warn!("Using an in-memory catalog database; data is lost on exit");
        Arc::new(SqliteStore::open_in_memory().context("opening in-memory database")?)
    } else {
        Arc::new(
            SqliteStore::open(&config.database_path).with_context(|| {
                format!("opening database {}", config.database_path.display())
            })?,
        )
    };

    if config.migrate_on_start {
        let migrator = Migrator::new(store.clone());
        match tokio::task::spawn_blocking(move || migrator.migrate_schema()).await {
            Ok(Ok(_)) => {}
            Ok(Err(err)) => error!("Startup category migration failed: {err}"),
            Err(err) => error!("Startup category migration task panicked: {err}"),
        }
    }

    let state = AppState { store };

    let app = Router::new()
        .route("/healthz", get(api::healthz))
        .route(
            "/part-categories",
            get(api::list_part_categories).post(api::create_part_category),
        )
        .route(
            "/part-categories/{id}",
            get(api::get_part_category)
                .put(api::update_part_category)
                .delete(api::delete_part_category),
        )
        .route(
            "/part-categories/firearm/{id}",
            get(api::list_model_categories),
        )
        .route(
            "/firearm-models",
            get(api::list_firearm_models).post(api::create_firearm_model),
        )
        .route("/firearm-models/{id}", get(api::get_firearm_model))
        .route(
            "/firearm-models/{id}/categories",
            get(api::list_model_categories),
        )
        .route(
            "/firearm-models/{id}/categories-hierarchy",
            get(api::model_categories_hierarchy),
        )
        .route(
            "/firearm-models/{id}/categories/{category_id}",
            post(api::add_model_category)
                .put(api::update_model_category)
                .delete(api::remove_model_category),
        )
        .route("/parts", get(api::list_parts).post(api::create_part))
        .route("/parts/{id}", get(api::get_part))
        .route(
            "/legacy/part-categories",
            get(api::list_legacy_part_categories),
        )
        .route("/part-subcategories", get(api::list_part_subcategories))
        .route(
            "/part-subcategories/{category}",
            get(api::list_subcategories_for_category),
        )
        .route("/part-hierarchy", get(api::part_hierarchy))
        .route("/migrations/run", post(api::run_migrations))
        .layer(cors_layer(&config)?)
        .layer(TraceLayer::new_for_http())
        .with_state(state);

    let listener = tokio::net::TcpListener::bind(config.bind_addr).await?;
    info!("firearm-catalog-api listening on {}", config.bind_addr);
    axum::serve(listener, app).await?;
    Ok(())
}

fn cors_layer(config: &Config) -> Result<CorsLayer> {
    let layer = CorsLayer::new().allow_methods(Any).allow_headers(Any);
    Ok(match &config.cors_allow_origin {
        Some(origin) => layer.allow_origin(
            origin
                .parse::<HeaderValue>()
                .with_context(|| format!("invalid CORS origin {origin}"))?,
        ),
        None => layer.allow_origin(Any),
    })
}
