//! Gateway server bootstrap: binds the HTTP listener, wires in the LLM
//! router, and runs until a shutdown signal arrives.

#![deny(missing_docs)]

use std::net::SocketAddr;

use axum::{Router, routing::get};
use axum_server::tls_rustls::RustlsConfig;
use config::Config;
use tokio::net::TcpListener;

/// Runs the gateway until `SIGINT`/`SIGTERM`, or until the returned future is
/// dropped.
///
/// `listen_address` overrides `config.server.listen_address` when provided
/// (the CLI flag takes precedence over the config file).
pub async fn serve(config: Config, listen_address: Option<SocketAddr>) -> anyhow::Result<()> {
    telemetry::init(&config.telemetry);

    let listen_address = listen_address
        .or(config.server.listen_address)
        .unwrap_or_else(|| SocketAddr::from(([127, 0, 0, 1], 8000)));

    let mut router = llm::router(&config).await?;

    if config.server.health.enabled {
        router = router.route(&config.server.health.path, get(health));
    }

    let listener = TcpListener::bind(listen_address)
        .await
        .map_err(|e| anyhow::anyhow!("failed to bind to {listen_address}: {e}"))?;

    log::info!("listening on {listen_address}");

    match &config.server.tls {
        Some(tls) => {
            let rustls_config = RustlsConfig::from_pem_file(&tls.certificate, &tls.key)
                .await
                .map_err(|e| anyhow::anyhow!("failed to load TLS certificate and key: {e}"))?;

            axum_server::from_tcp_rustls(listener.into_std()?, rustls_config)
                .serve(router.into_make_service())
                .await
                .map_err(|e| anyhow::anyhow!("server error: {e}"))
        }
        None => axum::serve(listener, router)
            .with_graceful_shutdown(shutdown_signal())
            .await
            .map_err(|e| anyhow::anyhow!("server error: {e}")),
    }
}

async fn health() -> &'static str {
    "OK"
}

async fn shutdown_signal() {
    let ctrl_c = async {
        tokio::signal::ctrl_c().await.expect("failed to install SIGINT handler");
    };

    #[cfg(unix)]
    let terminate = async {
        tokio::signal::unix::signal(tokio::signal::unix::SignalKind::terminate())
            .expect("failed to install SIGTERM handler")
            .recv()
            .await;
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => {},
        _ = terminate => {},
    }

    log::info!("shutdown signal received, draining in-flight requests");
}
