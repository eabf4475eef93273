//! Serve command: runs the analytics ingress.

use std::net::SocketAddr;
use std::sync::Arc;

use anyhow::{Context, Result, bail};
use le_server::{AllowAll, AppState, Authenticator, StaticTokens};

use crate::Config;

/// Builds the authenticator for mutating routes.
///
/// Refuses to start with no tokens unless auth is explicitly disabled.
pub fn authenticator(config: &Config) -> Result<Arc<dyn Authenticator>> {
    if config.server.auth_disabled {
        tracing::warn!("authentication disabled; every caller is admitted");
        return Ok(Arc::new(AllowAll));
    }
    let tokens = StaticTokens::new(config.server.api_tokens.iter().cloned());
    if tokens.is_empty() {
        bail!(
            "no API tokens configured: set server.api_tokens (or LE_SERVER__API_TOKENS), \
             or server.auth_disabled for local use"
        );
    }
    Ok(Arc::new(tokens))
}

pub fn run(config: &Config, bind: Option<SocketAddr>) -> Result<()> {
    let authenticator = authenticator(config)?;
    let state = AppState::open(&config.database_path, config.limits, authenticator)
        .with_context(|| format!("failed to open {}", config.database_path.display()))?;
    let bind = bind.unwrap_or(config.server.bind);

    let rt = tokio::runtime::Runtime::new().context("failed to create async runtime")?;
    rt.block_on(async move {
        let listener = tokio::net::TcpListener::bind(bind)
            .await
            .with_context(|| format!("failed to bind {bind}"))?;
        le_server::serve(listener, state, le_server::shutdown_signal())
            .await
            .context("server error")
    })
}
