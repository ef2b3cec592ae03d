use axum::http::{header, Method};
use tower_http::cors::{AllowOrigin, CorsLayer};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

use songboard::config::{Config, ServerConfig};
use songboard::services::{CatalogClient, Scheduler};
use songboard::{build_router, db, AppState};

fn init_tracing() {
    // RUST_LOG overrides; default is debug for our crate, info for axum, warn elsewhere
    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new("songboard=debug,tower_http=debug,axum=info,warn"));

    tracing_subscriber::registry()
        .with(filter)
        .with(tracing_subscriber::fmt::layer())
        .init();
}

/// CORS from the configured origins. No origins means same-origin only.
fn cors_layer(server: &ServerConfig) -> CorsLayer {
    let layer = CorsLayer::new()
        .allow_methods([
            Method::GET,
            Method::POST,
            Method::PUT,
            Method::PATCH,
            Method::DELETE,
            Method::OPTIONS,
        ])
        .allow_headers([header::CONTENT_TYPE, header::ACCEPT])
        .max_age(std::time::Duration::from_secs(3600));

    if server.cors_origins.is_empty() {
        tracing::info!("CORS: No origins configured, same-origin only");
        return layer;
    }

    let origins: Vec<_> = server
        .cors_origins
        .iter()
        .filter_map(|o| o.parse().ok())
        .collect();
    tracing::info!("CORS: Allowing origins {:?}", server.cors_origins);
    layer.allow_origin(AllowOrigin::list(origins))
}

#[tokio::main]
async fn main() {
    // Initialize tracing first so we can log configuration loading
    init_tracing();

    tracing::info!("Starting songboard v{}", env!("CARGO_PKG_VERSION"));

    let config = match Config::load() {
        Ok(cfg) => {
            tracing::info!("Configuration loaded successfully");
            tracing::debug!("Server: {}:{}", cfg.server.host, cfg.server.port);
            tracing::debug!("Database: {:?}", cfg.database.path);
            tracing::debug!("Catalog: {} ({})", cfg.catalog.base_url, cfg.catalog.country);
            cfg
        }
        Err(e) => {
            tracing::error!("Failed to load configuration: {}", e);
            std::process::exit(1);
        }
    };

    // Ensure database directory exists
    if let Some(parent) = config.database.path.parent() {
        if !parent.as_os_str().is_empty() && !parent.exists() {
            if let Err(e) = std::fs::create_dir_all(parent) {
                tracing::error!("Failed to create database directory: {}", e);
                std::process::exit(1);
            }
        }
    }

    let conn = match db::init_db(&config.database.path) {
        Ok(conn) => {
            tracing::info!("Database initialized at {:?}", config.database.path);
            conn
        }
        Err(e) => {
            tracing::error!("Failed to initialize database: {}", e);
            std::process::exit(1);
        }
    };

    let catalog = match CatalogClient::itunes_shared(&config.catalog) {
        Ok(client) => {
            tracing::info!("Catalog client initialized");
            client
        }
        Err(e) => {
            tracing::error!("Failed to create catalog client: {}", e);
            std::process::exit(1);
        }
    };

    let state = AppState::new(config.clone(), conn, catalog);

    // Keep the scheduler alive for the lifetime of the server
    let _scheduler = match config.sync.schedule.as_deref() {
        Some(cron) => match Scheduler::new_shared(cron, state.job_context()).await {
            Ok(scheduler) => match scheduler.start().await {
                Ok(()) => {
                    tracing::info!(cron = cron, "Scheduled sync-all enabled");
                    Some(scheduler)
                }
                Err(e) => {
                    tracing::error!("Failed to start scheduler: {}", e);
                    None
                }
            },
            Err(e) => {
                tracing::error!("Failed to create scheduler: {}", e);
                None
            }
        },
        None => None,
    };

    let app = build_router(state).layer(cors_layer(&config.server));

    let addr = config.server_addr();
    let listener = match tokio::net::TcpListener::bind(addr).await {
        Ok(listener) => listener,
        Err(e) => {
            tracing::error!("Failed to bind {}: {}", addr, e);
            std::process::exit(1);
        }
    };
    tracing::info!("songboard listening on {}", addr);

    if let Err(e) = axum::serve(listener, app).await {
        tracing::error!("Server error: {}", e);
        std::process::exit(1);
    }
}
