//! HTTP server listener
//!
//! Binds the TCP listener and serves the router until shutdown.

use std::future::Future;
use std::net::SocketAddr;
use std::sync::Arc;

use tokio::net::TcpListener;

use crate::error::Result;
use crate::registry::StreamRegistry;
use crate::server::config::ServerConfig;
use crate::server::{router, AppState};

/// MP4 relay server
pub struct RelayServer {
    config: ServerConfig,
    registry: Arc<StreamRegistry>,
}

impl RelayServer {
    /// Create a new server with an empty registry
    pub fn new(config: ServerConfig) -> Self {
        Self::with_registry(config, Arc::new(StreamRegistry::new()))
    }

    /// Create a new server over an existing registry
    pub fn with_registry(config: ServerConfig, registry: Arc<StreamRegistry>) -> Self {
        Self { config, registry }
    }

    /// Get a reference to the stream registry
    pub fn registry(&self) -> &Arc<StreamRegistry> {
        &self.registry
    }

    /// Get the bind address
    pub fn bind_addr(&self) -> SocketAddr {
        self.config.bind_addr
    }

    /// Run the server
    ///
    /// This method blocks until the server fails.
    pub async fn run(&self) -> Result<()> {
        self.run_until(std::future::pending()).await
    }

    /// Run the server with graceful shutdown
    pub async fn run_until<F>(&self, shutdown: F) -> Result<()>
    where
        F: Future<Output = ()> + Send + 'static,
    {
        let listener = TcpListener::bind(self.config.bind_addr).await?;
        self.serve(listener, shutdown).await
    }

    /// Serve on an already bound listener
    pub async fn serve<F>(&self, listener: TcpListener, shutdown: F) -> Result<()>
    where
        F: Future<Output = ()> + Send + 'static,
    {
        let addr = listener.local_addr()?;
        tracing::info!(addr = %addr, "HTTP server listening");

        let app = router(AppState::new(
            Arc::clone(&self.registry),
            self.config.clone(),
        ));

        axum::serve(
            listener,
            app.into_make_service_with_connect_info::<SocketAddr>(),
        )
        .with_graceful_shutdown(async move {
            shutdown.await;
            tracing::info!("Shutdown signal received");
        })
        .await?;

        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use std::time::Duration;

    use tokio::sync::oneshot;

    use super::*;

    #[tokio::test]
    async fn test_serve_until_shutdown() {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        let server = RelayServer::new(ServerConfig::with_addr(addr));

        let (stop_tx, stop_rx) = oneshot::channel::<()>();
        let handle = tokio::spawn(async move {
            server
                .serve(listener, async {
                    let _ = stop_rx.await;
                })
                .await
        });

        let response = reqwest::get(format!("http://{}/api/stream.mp4?src=none", addr))
            .await
            .unwrap();
        assert_eq!(response.status(), 404);
        drop(response);

        stop_tx.send(()).unwrap();
        let result = tokio::time::timeout(Duration::from_secs(2), handle)
            .await
            .unwrap()
            .unwrap();
        assert!(result.is_ok());
    }
}
