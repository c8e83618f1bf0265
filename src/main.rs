//! Questa Verify Server - Main entry point.
//!
//! Starts the Actix-web server with configured routes, middleware and the
//! background services (license monitor, job dispatcher).

mod api;
mod config;
mod error;
mod middleware;
mod models;
mod services;

use std::path::PathBuf;
use std::sync::Arc;

use actix_cors::Cors;
use actix_files::{Files, NamedFile};
use actix_web::{http::header, web, App, HttpRequest, HttpServer, Result as ActixResult};
use tracing::{error, info, warn, Level};
use tracing_subscriber::FmtSubscriber;
use utoipa::OpenApi;
use utoipa_swagger_ui::SwaggerUi;

use crate::config::Config;
use crate::services::dispatcher::DispatcherConfig;
use crate::services::{EventBroadcaster, JobDispatcher, LicenseMonitor, TcpLicenseProbe};

/// SPA fallback handler - serves index.html for client-side routing.
async fn spa_fallback(req: HttpRequest) -> ActixResult<NamedFile> {
    let static_dir: &PathBuf = req
        .app_data::<web::Data<PathBuf>>()
        .expect("Static dir not configured")
        .get_ref();
    Ok(NamedFile::open(static_dir.join("index.html"))?)
}

/// Perform health check (for Docker healthcheck).
async fn health_check() -> bool {
    // Simple check - just verify we can load config
    Config::from_env().is_ok()
}

#[actix_web::main]
async fn main() -> std::io::Result<()> {
    // Check for --health-check flag (used by Docker HEALTHCHECK)
    let args: Vec<String> = std::env::args().collect();
    if args.iter().any(|arg| arg == "--health-check") {
        dotenvy::dotenv().ok();
        if health_check().await {
            std::process::exit(0);
        } else {
            std::process::exit(1);
        }
    }

    // Load environment variables from .env file
    dotenvy::dotenv().ok();

    // Initialize logging
    let subscriber = FmtSubscriber::builder()
        .with_max_level(Level::INFO)
        .with_env_filter(tracing_subscriber::EnvFilter::from_default_env())
        .finish();
    tracing::subscriber::set_global_default(subscriber).expect("Failed to set tracing subscriber");

    // Load configuration
    let config = match Config::from_env() {
        Ok(cfg) => cfg,
        Err(e) => {
            error!("Failed to load configuration: {}", e);
            error!("");
            error!("Please check your environment variables:");
            error!("  - RUST_ENV must be set to 'development' or 'production'");
            error!("  - In production, QVS_LICENSE_SERVER and QVS_DATA_DIR must be set");
            std::process::exit(1);
        }
    };

    info!("========================================");
    info!("  Questa Verify Server");
    info!("  Environment: {}", config.environment);
    info!("========================================");

    if config.is_development() {
        warn!("Running in DEVELOPMENT mode - do not use in production!");
        if config.license_server.is_none() {
            warn!("No license server configured; the gatekeeper will report available");
        }
    }

    // Create data directories
    tokio::fs::create_dir_all(config.projects_dir())
        .await
        .expect("Failed to create projects directory");
    tokio::fs::create_dir_all(config.jobs_dir())
        .await
        .expect("Failed to create jobs directory");

    // Shared event fan-out for WebSocket clients
    let broadcaster = EventBroadcaster::new();

    // License monitor: one background ticker owning the availability snapshot
    let probe = Arc::new(TcpLicenseProbe::new(
        config.license_server.clone(),
        config.license_probe_timeout,
    ));
    let license = LicenseMonitor::new(probe, config.license_poll_interval, broadcaster.clone());
    license.start();
    info!(
        "License monitor started (server: {})",
        config.license_server.as_deref().unwrap_or("<none>")
    );

    // Job dispatcher: queue, single run slot, scheduler loop
    let dispatcher = JobDispatcher::new(
        DispatcherConfig {
            data_dir: config.data_dir.clone(),
            bin_dir: config.questa_bin_dir.clone(),
            poll_interval: config.scheduler_poll_interval,
            termination_grace: config.termination_grace,
        },
        broadcaster.clone(),
        license.clone(),
    );
    dispatcher.start();
    info!(
        "Job dispatcher started (tools: {})",
        config
            .questa_bin_dir
            .as_ref()
            .map(|p| p.display().to_string())
            .unwrap_or_else(|| "$PATH".to_string())
    );

    // Prepare shared state
    let bind_address = config.bind_address();
    let static_dir = config.static_dir.clone();
    let is_development = config.is_development();

    if static_dir.is_some() {
        info!("Static file serving enabled from {:?}", static_dir);
    }

    let worker_count = if is_development {
        info!(
            "Starting server at http://{} (4 workers - development mode)",
            bind_address
        );
        4
    } else {
        let cpus = num_cpus::get();
        info!(
            "Starting server at http://{} ({} workers)",
            bind_address, cpus
        );
        cpus
    };

    // Start HTTP server
    let server = HttpServer::new(move || {
        // Configure CORS
        let cors = if is_development {
            Cors::default()
                .allowed_origin("http://localhost:3000")
                .allowed_origin("http://127.0.0.1:3000")
                .allowed_methods(vec!["GET", "POST", "PUT", "DELETE", "OPTIONS"])
                .allowed_headers(vec![
                    header::AUTHORIZATION,
                    header::ACCEPT,
                    header::CONTENT_TYPE,
                ])
                .max_age(3600)
        } else {
            // Restrictive CORS for production (same-origin only)
            Cors::default()
                .allowed_methods(vec!["GET", "POST", "PUT", "DELETE", "OPTIONS"])
                .allowed_headers(vec![
                    header::AUTHORIZATION,
                    header::ACCEPT,
                    header::CONTENT_TYPE,
                ])
                .max_age(3600)
        };

        let mut app = App::new()
            // Add CORS middleware (must be before other middleware)
            .wrap(cors)
            // Add request logging middleware
            .wrap(middleware::RequestLogger)
            // Add shared state
            .app_data(web::Data::new(broadcaster.clone()))
            .app_data(web::Data::new(dispatcher.clone()))
            // Configure API routes
            .service(
                web::scope("/api/v1")
                    .configure(api::configure_health_routes)
                    .configure(api::configure_job_routes)
                    .configure(api::configure_log_routes)
                    .configure(api::configure_report_routes)
                    .configure(api::configure_system_routes),
            )
            // Real-time channel
            .configure(api::configure_websocket_routes)
            // Swagger UI
            .service(
                SwaggerUi::new("/swagger-ui/{_:.*}")
                    .url("/api-docs/openapi.json", api::ApiDoc::openapi()),
            );

        // Serve static files in production (when QVS_STATIC_DIR is set)
        if let Some(ref dir) = static_dir {
            app = app
                .app_data(web::Data::new(dir.clone()))
                // Serve static assets (js, css, images)
                .service(Files::new("/assets", dir.join("assets")).prefer_utf8(true))
                // SPA fallback - serve index.html for all other routes
                .default_service(web::route().to(spa_fallback));
        }

        app
    });

    // Set worker count
    server
        .workers(worker_count)
        .bind(&bind_address)?
        .run()
        .await
}
