use tracing::info;
use tracing_subscriber::EnvFilter;

/// Quieter defaults for the chattier dependencies; `RUST_LOG` overrides.
const DEFAULT_FILTER: &str = "info,hyper=warn,reqwest=warn,sqlx=warn,tower_http=info";

pub fn init_tracing() {
    let filter =
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(DEFAULT_FILTER));
    tracing_subscriber::fmt().with_env_filter(filter).init();
}

/// Resolves on SIGINT or SIGTERM so axum can drain in-flight requests.
pub async fn shutdown_signal() {
    #[cfg(unix)]
    {
        use tokio::signal::unix::{signal, SignalKind};
        let mut term = signal(SignalKind::terminate()).expect("SIGTERM handler");
        tokio::select! {
            _ = tokio::signal::ctrl_c() => {}
            _ = term.recv() => {}
        }
    }

    #[cfg(not(unix))]
    tokio::signal::ctrl_c().await.expect("Ctrl+C handler");

    info!("shutdown signal received");
}
