use std::sync::Arc;

use lockpick_server::config::Config;
use lockpick_server::store::redis::RedisStore;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "lockpick_server=debug,tower_http=info".into()),
        )
        .init();

    let cfg = Config::load();

    let store = RedisStore::connect(&cfg.redis_addr, &cfg.redis_password).await?;
    tracing::info!(addr = %cfg.redis_addr, "connected to redis");

    let (app, state) = lockpick_server::build_app(Arc::new(store));

    let addr = format!("0.0.0.0:{}", cfg.port);
    let listener = tokio::net::TcpListener::bind(&addr).await?;
    tracing::info!("listening on {addr}");

    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await?;

    // In-flight requests have drained; cancel the round timers, flush the
    // broadcast backlog, and close the client egresses.
    state.hub.shutdown().await;
    tracing::info!("server exiting");
    Ok(())
}

async fn shutdown_signal() {
    let ctrl_c = async {
        tokio::signal::ctrl_c()
            .await
            .expect("failed to install ctrl-c handler");
    };

    #[cfg(unix)]
    let terminate = async {
        tokio::signal::unix::signal(tokio::signal::unix::SignalKind::terminate())
            .expect("failed to install signal handler")
            .recv()
            .await;
    };
    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => {}
        _ = terminate => {}
    }
    tracing::info!("shutting down");
}
