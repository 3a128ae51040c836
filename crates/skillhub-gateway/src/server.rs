use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Instant;

use skillhub_core::BackfillService;
use skillhub_core::config::TokenConfig;
use tokio::sync::watch;

use crate::error::GatewayError;
use crate::router::build_router;

#[derive(Clone)]
pub(crate) struct AppState {
    pub service: Arc<BackfillService>,
    pub started_at: Instant,
}

pub struct GatewayServer {
    addr: SocketAddr,
    tokens: Vec<TokenConfig>,
    max_body_size: usize,
    service: Arc<BackfillService>,
    shutdown_rx: watch::Receiver<bool>,
}

impl GatewayServer {
    #[must_use]
    pub fn new(
        bind: &str,
        port: u16,
        service: Arc<BackfillService>,
        shutdown_rx: watch::Receiver<bool>,
    ) -> Self {
        let addr: SocketAddr = format!("{bind}:{port}").parse().unwrap_or_else(|e| {
            tracing::warn!("invalid bind '{bind}': {e}, falling back to 127.0.0.1:{port}");
            SocketAddr::from(([127, 0, 0, 1], port))
        });

        if bind == "0.0.0.0" {
            tracing::warn!("gateway binding to 0.0.0.0, admin routes are reachable from any interface");
        }

        Self {
            addr,
            tokens: Vec::new(),
            max_body_size: 65_536,
            service,
            shutdown_rx,
        }
    }

    #[must_use]
    pub fn with_tokens(mut self, tokens: Vec<TokenConfig>) -> Self {
        self.tokens = tokens;
        self
    }

    #[must_use]
    pub fn with_max_body_size(mut self, size: usize) -> Self {
        self.max_body_size = size;
        self
    }

    /// Start the HTTP gateway server.
    ///
    /// # Errors
    ///
    /// Returns an error if the server fails to bind or encounters a fatal I/O error.
    pub async fn serve(self) -> Result<(), GatewayError> {
        if self.tokens.is_empty() {
            tracing::warn!("gateway has no tokens configured, every admin request will be rejected");
        }
        let state = AppState {
            service: self.service,
            started_at: Instant::now(),
        };

        let router = build_router(state, &self.tokens, self.max_body_size);

        let listener = tokio::net::TcpListener::bind(self.addr)
            .await
            .map_err(|e| GatewayError::Bind(self.addr.to_string(), e))?;
        tracing::info!("gateway listening on {}", self.addr);

        let mut shutdown_rx = self.shutdown_rx;
        axum::serve(listener, router)
            .with_graceful_shutdown(async move {
                while !*shutdown_rx.borrow_and_update() {
                    if shutdown_rx.changed().await.is_err() {
                        std::future::pending::<()>().await;
                    }
                }
                tracing::info!("gateway shutting down");
            })
            .await
            .map_err(|e| GatewayError::Server(format!("{e}")))?;

        Ok(())
    }
}
