//! Server lifecycle for the HTTP facade.

use crate::api::routes::create_router;
use crate::rpc::CallbackTable;
use crate::types::Result;
use crate::utils::config::HttpConfig;
use std::sync::Arc;
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;

/// Serves the facade router on the configured endpoint.
pub struct HttpServer {
    config: HttpConfig,
    callbacks: Arc<CallbackTable>,
    running: Option<Running>,
}

struct Running {
    cancel: CancellationToken,
    task: JoinHandle<()>,
}

impl HttpServer {
    /// A server over `callbacks`, not yet started.
    pub fn new(config: HttpConfig, callbacks: Arc<CallbackTable>) -> Self {
        Self {
            config,
            callbacks,
            running: None,
        }
    }

    /// Bind the endpoint and serve in a background task.
    ///
    /// A server that is already running is stopped first.
    pub async fn start(&mut self) -> Result<()> {
        if self.running.is_some() {
            tracing::warn!("terminating existing HTTP server task before restart");
            self.stop().await?;
        }

        let listener = tokio::net::TcpListener::bind(self.config.address()).await?;
        let router = create_router(Arc::clone(&self.callbacks))
            .layer(tower_http::trace::TraceLayer::new_for_http());
        let cancel = CancellationToken::new();

        let shutdown = cancel.clone();
        let task = tokio::spawn(async move {
            let serve = axum::serve(listener, router)
                .with_graceful_shutdown(shutdown.cancelled_owned());
            if let Err(e) = serve.await {
                tracing::error!("HTTP server failed: {e}");
            }
        });

        tracing::info!("HTTP facade listening on {}", self.config.address());

        self.running = Some(Running { cancel, task });

        Ok(())
    }

    /// Shut the server down gracefully within the configured timeout.
    pub async fn stop(&mut self) -> Result<()> {
        let Some(running) = self.running.take() else {
            return Ok(());
        };

        running.cancel.cancel();
        if tokio::time::timeout(self.config.timeout(), running.task)
            .await
            .is_err()
        {
            tracing::warn!("HTTP server task is not terminated");
        } else {
            tracing::info!("HTTP server task has been terminated");
        }

        Ok(())
    }
}
