use std::path::PathBuf;
use std::sync::Arc;

use tokio::net::TcpListener;
use tracing::info;

use reserva::auth::AuthRegistry;
use reserva::engine::Engine;
use reserva::http::{router, AppState};
use reserva::notify::NotifyHub;

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    tracing_subscriber::fmt::init();

    let metrics_port: Option<u16> = std::env::var("RESERVA_METRICS_PORT")
        .ok()
        .and_then(|s| s.parse().ok());
    reserva::observability::init(metrics_port);

    let port = std::env::var("RESERVA_PORT").unwrap_or_else(|_| "8080".into());
    let bind = std::env::var("RESERVA_BIND").unwrap_or_else(|_| "0.0.0.0".into());
    let data_dir = std::env::var("RESERVA_DATA_DIR").unwrap_or_else(|_| "./data".into());
    let tokens = std::env::var("RESERVA_TOKENS").unwrap_or_default();

    // Ensure data directory exists
    std::fs::create_dir_all(&data_dir)?;
    let wal_path = PathBuf::from(&data_dir).join("reserva.wal");

    let notify = Arc::new(NotifyHub::new());
    let engine = Arc::new(Engine::new(wal_path, notify)?);
    let auth = Arc::new(AuthRegistry::from_spec(&tokens)?);

    let app = router(AppState { engine, auth });

    let addr = format!("{bind}:{port}");
    let listener = TcpListener::bind(&addr).await?;
    info!("reserva listening on {addr}");
    info!("  data_dir: {data_dir}");
    info!(
        "  metrics: {}",
        metrics_port.map_or("disabled".to_string(), |p| format!(
            "http://0.0.0.0:{p}/metrics"
        ))
    );

    // Graceful shutdown: stop accepting on SIGTERM/ctrl-c, drain in-flight requests
    let shutdown = async {
        let ctrl_c = tokio::signal::ctrl_c();
        #[cfg(unix)]
        {
            let mut sigterm =
                tokio::signal::unix::signal(tokio::signal::unix::SignalKind::terminate())
                    .expect("failed to register SIGTERM handler");
            tokio::select! {
                _ = ctrl_c => {}
                _ = sigterm.recv() => {}
            }
        }
        #[cfg(not(unix))]
        {
            ctrl_c.await.ok();
        }
        info!("shutdown signal received, stopping accept loop");
    };

    axum::serve(listener, app).with_graceful_shutdown(shutdown).await?;

    info!("reserva stopped");
    Ok(())
}
