use std::future::Future;
use std::sync::Arc;

use carestate_store::{DrainReport, Store, StoreBuilder};
use tokio::net::TcpListener;
use tracing::{error, info};

use crate::catalog::register_catalog;
use crate::config::ServerConfig;
use crate::error::{ServerError, ServerResult};
use crate::router::build_router;

/// Carestate HTTP host.
pub struct CarestateServer {
    config: ServerConfig,
    store: Arc<Store>,
}

impl CarestateServer {
    pub fn new(config: ServerConfig, store: Arc<Store>) -> Self {
        Self { config, store }
    }

    /// Open the catalog store described by `config.store` and hydrate it.
    pub async fn open(config: ServerConfig) -> ServerResult<Self> {
        let builder = StoreBuilder::from_config(&config.store)?;
        let store = register_catalog(builder).open().await?;
        Ok(Self::new(config, Arc::new(store)))
    }

    pub fn config(&self) -> &ServerConfig {
        &self.config
    }

    pub fn store(&self) -> &Arc<Store> {
        &self.store
    }

    /// Build the router (useful for testing).
    pub fn router(&self) -> axum::Router {
        build_router(Arc::clone(&self.store))
    }

    /// Serve until Ctrl-C, then drain pending bucket writes.
    pub async fn serve(self) -> ServerResult<DrainReport> {
        self.serve_with_shutdown(ctrl_c()).await
    }

    /// Serve until `signal` resolves, then drain pending bucket writes.
    pub async fn serve_with_shutdown(
        self,
        signal: impl Future<Output = ()> + Send + 'static,
    ) -> ServerResult<DrainReport> {
        let listener = TcpListener::bind(&self.config.bind_addr).await?;
        info!(
            addr = %listener.local_addr()?,
            durable = self.store.is_durable(),
            "carestate server listening"
        );
        axum::serve(listener, self.router())
            .with_graceful_shutdown(signal)
            .await
            .map_err(|e| ServerError::Internal(e.to_string()))?;
        Ok(self.store.shutdown().await)
    }
}

async fn ctrl_c() {
    match tokio::signal::ctrl_c().await {
        Ok(()) => info!("shutdown signal received"),
        Err(e) => {
            error!(error = %e, "cannot listen for ctrl-c; serving until killed");
            std::future::pending::<()>().await;
        }
    }
}
