//! Dynamic REST-API host with zero-downtime configuration hot reload.
//!
//! Endpoints are generated at runtime from declarative YAML files; the
//! orchestrator watches those files and applies changes atomically while
//! the server keeps serving.

mod config;

use std::sync::Arc;

use actix_cors::Cors;
use actix_web::{middleware, web, App, HttpServer};
use dotenvy::dotenv;
use tracing::{info, warn};
use tracing_subscriber::EnvFilter;

use restweave_api::orchestrator::ReloadOrchestrator;
use restweave_api::pool::{DatabasePoolManager, DieselPoolManager, PgQueryExecutor};
use restweave_api::registry::{DispatchRouter, EndpointRegistry, HttpRouter};
use restweave_api::update::AtomicUpdateManager;
use restweave_api::watcher::FileWatcher;
use restweave_core::loader::{ConfigurationSource, YamlConfigLoader};
use restweave_core::snapshot::SnapshotStore;
use restweave_core::validation::{ConnectivityProbe, ValidationPipeline};

use crate::config::AppConfig;

fn init_tracing() {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));
    tracing_subscriber::fmt().with_env_filter(filter).init();
}

#[actix_web::main]
async fn main() -> std::io::Result<()> {
    // Load environment variables from .env file
    dotenv().ok();
    init_tracing();

    let app_config = AppConfig::from_env()
        .map_err(|error| std::io::Error::new(std::io::ErrorKind::InvalidInput, error.to_string()))?;
    let server_address = app_config.server_address();

    // Shared hot-reload components.
    let store = Arc::new(SnapshotStore::new(app_config.settings.snapshot.max_history));
    let pools = Arc::new(DieselPoolManager::new());
    let router = Arc::new(DispatchRouter::new());
    let executor = Arc::new(PgQueryExecutor::new(Arc::clone(&pools)));
    let registry = Arc::new(EndpointRegistry::new(Arc::clone(&store), executor));
    registry.set_router(Arc::clone(&router) as Arc<dyn HttpRouter>);

    let updates = Arc::new(AtomicUpdateManager::new(
        Arc::clone(&registry),
        Arc::clone(&pools) as Arc<dyn DatabasePoolManager>,
    ));
    let pipeline = ValidationPipeline::new()
        .with_probe(Arc::clone(&pools) as Arc<dyn ConnectivityProbe>)
        .with_connectivity_timeout(app_config.settings.connectivity_timeout());
    let loader = Arc::new(YamlConfigLoader::new(
        app_config.settings.config_dirs.clone(),
        app_config.settings.patterns.clone(),
    ));
    let watcher = Arc::new(
        FileWatcher::new(app_config.settings.debounce())
            .map_err(|error| std::io::Error::new(std::io::ErrorKind::Other, error.to_string()))?,
    );

    let orchestrator = ReloadOrchestrator::new(
        app_config.settings.clone(),
        watcher,
        Arc::clone(&store),
        pipeline,
        updates,
        loader as Arc<dyn ConfigurationSource>,
    );

    // First load before traffic: publish the initial snapshot and bring the
    // declared endpoints up. A failed initial load still starts the control
    // plane so the operator can fix the files and trigger a reload.
    let initial = orchestrator.load_initial().await;
    if initial.success {
        info!(message = %initial.message, "Initial configuration loaded");
    } else {
        warn!(message = %initial.message, "Initial configuration load failed");
    }

    orchestrator
        .initialize()
        .map_err(|error| std::io::Error::new(std::io::ErrorKind::Other, error.to_string()))?;

    info!("Starting server at http://{}", server_address);

    let orchestrator_data = web::Data::new(Arc::clone(&orchestrator));
    let router_data = web::Data::new(Arc::clone(&router));
    let result = HttpServer::new(move || {
        let cors = Cors::default()
            .allow_any_origin()
            .allow_any_method()
            .allow_any_header()
            .max_age(3600);

        App::new()
            .app_data(orchestrator_data.clone())
            .app_data(router_data.clone())
            .wrap(middleware::Logger::default())
            .wrap(cors)
            .configure(restweave_api::api::init_routes)
            // Generated endpoints resolve against the live route table.
            .default_service(web::route().to(restweave_api::api::dispatch))
    })
    .bind(server_address)?
    .run()
    .await;

    orchestrator.shutdown().await;
    result
}
