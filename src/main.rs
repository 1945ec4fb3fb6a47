use cloudclip::{
    build_router,
    config::{Config, CONFIG_PATH_ENV, DEFAULT_CONFIG_PATH},
    room::{start_cleanup_task, CleanupConfig, RoomSweeper},
    AppState, ClipboardService, JsonFileHistoryStore,
};
use std::net::SocketAddr;
use std::sync::Arc;
use tracing::{error, info, warn};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

#[tokio::main]
async fn main() -> std::io::Result<()> {
    // Initialize tracing
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "cloudclip=debug,tower_http=debug".into()),
        )
        .with(tracing_subscriber::fmt::layer())
        .init();

    info!("Starting cloud clipboard server");

    let config_path =
        std::env::var(CONFIG_PATH_ENV).unwrap_or_else(|_| DEFAULT_CONFIG_PATH.to_string());
    let config = Arc::new(Config::load_or_default(&config_path).await);

    let store = Arc::new(JsonFileHistoryStore::new(&config.server.history_file));
    let service = Arc::new(ClipboardService::new(&config, store));

    if let Err(e) = service.load_history().await {
        warn!(error = %e, "Failed to load history, starting empty");
    }

    // Idle-room sweeping only matters when rooms are listed
    let cleanup = if config.server.room_list {
        CleanupConfig::from_secs(config.server.room_cleanup).map(|cleanup_config| {
            let sweeper: Arc<dyn RoomSweeper> = service.clone();
            start_cleanup_task(sweeper, cleanup_config)
        })
    } else {
        None
    };
    if cleanup.is_none() {
        info!("Room cleanup disabled");
    }

    let app_state = AppState::new(service.clone(), config.clone());
    let app = build_router(app_state);

    let listener = match tokio::net::TcpListener::bind((config.server.host.primary(), config.server.port)).await {
        Ok(listener) => listener,
        Err(e) => {
            error!(address = %config.bind_address(), error = %e, "Failed to bind listener");
            return Err(e);
        }
    };
    info!("Server running on http://{}{}", config.bind_address(), config.server.prefix);

    // Upgraded sockets outlive the HTTP connection, close them once the signal arrives
    let served = axum::serve(
        listener,
        app.into_make_service_with_connect_info::<SocketAddr>(),
    )
    .with_graceful_shutdown(async move {
        shutdown_signal().await;
        info!("Shutting down");
        service.shutdown().await;
    })
    .await;

    if let Some(cleanup) = cleanup {
        cleanup.stop().await;
    }
    info!("Server stopped");

    served
}

async fn shutdown_signal() {
    if let Err(e) = tokio::signal::ctrl_c().await {
        error!(error = %e, "Failed to listen for shutdown signal");
        std::future::pending::<()>().await;
    }
}
