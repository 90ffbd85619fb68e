use std::sync::Arc;

use tokio::net::TcpListener;
use tokio::sync::Semaphore;
use tracing::info;

use valet::clock::SystemClock;
use valet::config::LotConfig;
use valet::engine::Engine;
use valet::model::Role;
use valet::monitor::Monitor;
use valet::notify::NotifyHub;
use valet::wire;

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    tracing_subscriber::fmt::init();

    let metrics_port: Option<u16> = std::env::var("VALET_METRICS_PORT")
        .ok()
        .and_then(|s| s.parse().ok());
    valet::observability::init(metrics_port);

    let port = std::env::var("VALET_PORT").unwrap_or_else(|_| "7070".into());
    let bind = std::env::var("VALET_BIND").unwrap_or_else(|_| "0.0.0.0".into());
    let max_connections: usize = std::env::var("VALET_MAX_CONNECTIONS")
        .ok()
        .and_then(|s| s.parse().ok())
        .unwrap_or(256);

    let cfg = LotConfig::from_env();
    let notify = Arc::new(NotifyHub::new());
    let engine = Arc::new(Engine::new(cfg.clone(), Arc::new(SystemClock), notify));

    // Bootstrap attendant so subscriber registration has an actor on a
    // fresh deployment.
    if let Ok(username) = std::env::var("VALET_SEED_ATTENDANT") {
        match engine.create_user(&username, &username, "", "", "", Role::Attendant) {
            Ok(user) => info!("seeded attendant '{}' (user {})", user.username, user.id),
            Err(e) => tracing::error!("failed to seed attendant: {e}"),
        }
    }

    let monitor = Monitor::start(engine.clone(), cfg.monitor_interval);
    let semaphore = Arc::new(Semaphore::new(max_connections));

    let addr = format!("{bind}:{port}");
    let listener = TcpListener::bind(&addr).await?;
    info!("valet listening on {addr}");
    info!("  spots: {}", cfg.total_spots);
    info!("  monitor interval: {:?}", cfg.monitor_interval);
    info!("  max_connections: {max_connections}");
    info!(
        "  metrics: {}",
        metrics_port.map_or("disabled".to_string(), |p| format!(
            "http://0.0.0.0:{p}/metrics"
        ))
    );

    // Graceful shutdown: stop accepting on SIGTERM/ctrl-c, drain in-flight connections
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
    };
    tokio::pin!(shutdown);

    loop {
        tokio::select! {
            result = listener.accept() => {
                let (socket, peer) = match result {
                    Ok(conn) => conn,
                    Err(e) => {
                        tracing::error!("accept error: {e}");
                        continue;
                    }
                };

                let permit = match semaphore.clone().try_acquire_owned() {
                    Ok(permit) => permit,
                    Err(_) => {
                        tracing::warn!("connection limit reached, rejecting {peer}");
                        metrics::counter!(valet::observability::CONNECTIONS_REJECTED_TOTAL).increment(1);
                        drop(socket);
                        continue;
                    }
                };

                info!("connection from {peer}");
                metrics::counter!(valet::observability::CONNECTIONS_TOTAL).increment(1);
                metrics::gauge!(valet::observability::CONNECTIONS_ACTIVE).increment(1.0);
                let engine = engine.clone();

                tokio::spawn(async move {
                    let _permit = permit; // held until connection closes
                    wire::process_connection(socket, engine).await;
                    metrics::gauge!(valet::observability::CONNECTIONS_ACTIVE).decrement(1.0);
                });
            }
            _ = &mut shutdown => {
                info!("shutdown signal received, stopping accept loop");
                break;
            }
        }
    }

    monitor.shutdown().await;

    // Wait for in-flight connections to finish (up to 10s)
    info!("draining connections...");
    let drain_deadline = tokio::time::sleep(std::time::Duration::from_secs(10));
    tokio::pin!(drain_deadline);

    loop {
        if semaphore.available_permits() == max_connections {
            info!("all connections drained");
            break;
        }
        tokio::select! {
            _ = &mut drain_deadline => {
                let remaining = max_connections - semaphore.available_permits();
                tracing::warn!("drain timeout, {remaining} connections still open");
                break;
            }
            _ = tokio::time::sleep(std::time::Duration::from_millis(100)) => {}
        }
    }

    info!("valet stopped");
    Ok(())
}
