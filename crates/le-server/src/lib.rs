//! Analytics ingress for lecture engagement analytics.
//!
//! Accepts attention samples, watch-time deltas and view events over HTTP and
//! folds them into the SQLite store. Each request is independent; ordering
//! between requests is not guaranteed and does not matter, since every fold is
//! commutative within its bucket or counter.

pub mod auth;
pub mod response;
pub mod routes;
pub mod state;

use std::future::Future;

use tokio::net::TcpListener;
use tower_http::trace::TraceLayer;

pub use auth::{AllowAll, Authenticator, Caller, StaticTokens};
pub use response::AppError;
pub use routes::API_PREFIX;
pub use state::AppState;

/// Builds the full application with request tracing.
pub fn app(state: AppState) -> axum::Router {
    routes::router(state).layer(TraceLayer::new_for_http())
}

/// Serves the ingress on `listener` until `shutdown` resolves.
pub async fn serve(
    listener: TcpListener,
    state: AppState,
    shutdown: impl Future<Output = ()> + Send + 'static,
) -> std::io::Result<()> {
    let addr = listener.local_addr()?;
    tracing::info!(%addr, db = %state.db_path().display(), "analytics ingress listening");
    axum::serve(listener, app(state))
        .with_graceful_shutdown(shutdown)
        .await?;
    tracing::info!("analytics ingress stopped");
    Ok(())
}

/// Resolves on Ctrl+C or SIGTERM.
pub async fn shutdown_signal() {
    let ctrl_c = async {
        if let Err(err) = tokio::signal::ctrl_c().await {
            tracing::error!(error = %err, "failed to install Ctrl+C handler");
            std::future::pending::<()>().await;
        }
    };

    #[cfg(unix)]
    let terminate = async {
        use tokio::signal::unix::{SignalKind, signal};
        match signal(SignalKind::terminate()) {
            Ok(mut sigterm) => {
                sigterm.recv().await;
            }
            Err(err) => {
                tracing::error!(error = %err, "failed to install SIGTERM handler");
                std::future::pending::<()>().await;
            }
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        () = ctrl_c => {},
        () = terminate => {},
    }
    tracing::info!("shutdown signal received");
}
