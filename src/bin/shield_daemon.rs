use std::env;
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

use actix_web::{middleware, web, App, HttpServer};

use techshield::api;
use techshield::config::Config;
use techshield::geolocation::{GeoProvider, MaxMindProvider};
use techshield::persistence::{SqliteStateStore, StateStore};
use techshield::pipeline::Pipeline;

/// Main daemon entry point for the Tech Shield detection service
#[actix_web::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    // Initialize logging
    env_logger::Builder::from_default_env()
        .filter_level(log::LevelFilter::Info)
        .init();

    log::info!("Starting Tech Shield daemon...");

    // Load configuration
    let config_path = env::args()
        .nth(1)
        .map(PathBuf::from)
        .unwrap_or_else(|| PathBuf::from("config.toml"));

    let config = if config_path.exists() {
        Config::from_file(&config_path)?
    } else {
        log::warn!("Config file not found, using defaults");
        Config::default()
    };

    // Geolocation provider; distance-based detectors skip without it
    let geo: Option<Arc<dyn GeoProvider>> = match config.geolocation.database_path {
        Some(ref path) => match MaxMindProvider::new(path) {
            Ok(provider) => {
                log::info!("Geolocation database loaded: {:?}", path);
                Some(Arc::new(provider))
            }
            Err(e) => {
                log::warn!("Geolocation unavailable, distance checks disabled: {}", e);
                None
            }
        },
        None => {
            log::info!("No geolocation database configured, distance checks disabled");
            None
        }
    };

    // Persistent store
    let store: Option<Arc<dyn StateStore>> = match config.storage.sqlite_path {
        Some(ref path) => {
            let store = SqliteStateStore::new(path)?;
            log::info!("Persistence enabled: {:?}", path);
            Some(Arc::new(store))
        }
        None => {
            log::warn!("No sqlite path configured, running without persistence");
            None
        }
    };

    // Address-block and auth-control collaborators are deployment
    // integrations wired in at this seam; without them the mapped
    // actions are recorded as failed on each alert.
    let pipeline = Arc::new(Pipeline::new(&config, geo, None, None, None, store));

    // Background maintenance sweep
    let maintenance = pipeline.clone();
    let interval = Duration::from_secs(config.maintenance.interval_minutes * 60);
    tokio::spawn(async move {
        let mut ticker = tokio::time::interval(interval);
        ticker.tick().await;
        loop {
            ticker.tick().await;
            maintenance.run_maintenance(chrono::Utc::now().timestamp());
        }
    });

    let bind = config.server.bind.clone();
    log::info!("Listening on {}", bind);

    let data = web::Data::from(pipeline);
    let server = HttpServer::new(move || {
        App::new()
            .wrap(middleware::Logger::default())
            .app_data(data.clone())
            .configure(api::configure)
    })
    .disable_signals()
    .bind(&bind)?
    .run();

    // Graceful shutdown on Ctrl+C
    let (stop_tx, mut stop_rx) = tokio::sync::mpsc::channel::<()>(1);
    ctrlc::set_handler(move || {
        let _ = stop_tx.blocking_send(());
    })?;

    let handle = server.handle();
    tokio::spawn(async move {
        if stop_rx.recv().await.is_some() {
            log::info!("Received shutdown signal, gracefully stopping...");
            handle.stop(true).await;
        }
    });

    server.await?;
    log::info!("Daemon stopped");
    Ok(())
}
