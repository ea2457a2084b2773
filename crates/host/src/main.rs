//! Host entry point.

use std::sync::Arc;

use host::{Cluster, HostConfig};
use runtime::SystemClock;
use tokio::signal;
use tokio::sync::oneshot;
use tracing_subscriber::EnvFilter;
use tracing_subscriber::layer::SubscriberExt;
use tracing_subscriber::util::SubscriberInitExt;

/// Waits for a shutdown signal (SIGINT or SIGTERM).
async fn shutdown_signal() {
    let ctrl_c = async {
        if let Err(e) = signal::ctrl_c().await {
            tracing::error!(error = %e, "failed to install SIGINT handler");
            std::future::pending::<()>().await;
        }
    };

    #[cfg(unix)]
    let terminate = async {
        match signal::unix::signal(signal::unix::SignalKind::terminate()) {
            Ok(mut sigterm) => {
                sigterm.recv().await;
            }
            Err(e) => {
                tracing::error!(error = %e, "failed to install SIGTERM handler");
                std::future::pending::<()>().await;
            }
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        () = ctrl_c => {
            tracing::info!("received SIGINT, starting graceful shutdown");
        }
        () = terminate => {
            tracing::info!("received SIGTERM, starting graceful shutdown");
        }
    }
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    let config = HostConfig::from_env();

    // 1. Initialize tracing
    tracing_subscriber::registry()
        .with(EnvFilter::try_new(&config.log_level).unwrap_or_else(|_| EnvFilter::new("info")))
        .with(tracing_subscriber::fmt::layer())
        .init();

    // 2. Install Prometheus metrics recorder
    let metrics_handle = metrics_exporter_prometheus::PrometheusBuilder::new().install_recorder()?;

    // 3. Wire the pools and start delivering timers
    let cluster = Arc::new(Cluster::new(&config, Arc::new(SystemClock)));
    let (stop_timers, timers_stopped) = oneshot::channel::<()>();
    let timer_loop = tokio::spawn({
        let cluster = cluster.clone();
        let poll = config.timer_poll;
        async move {
            cluster
                .run_timer_loop(poll, async {
                    let _ = timers_stopped.await;
                })
                .await;
        }
    });

    // 4. Build the application
    let app = host::create_app(cluster, metrics_handle);

    // 5. Start server
    let addr = config.addr();
    tracing::info!(%addr, "starting host");
    let listener = tokio::net::TcpListener::bind(&addr).await?;
    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await?;

    let _ = stop_timers.send(());
    timer_loop.await?;

    tracing::info!("host shut down gracefully");
    Ok(())
}
