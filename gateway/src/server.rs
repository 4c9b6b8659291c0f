//! Gateway server implementation

use std::net::SocketAddr;
use std::sync::Arc;
use tokio::net::TcpListener;

use crate::config::GatewayConfig;
use crate::error::GatewayError;
use crate::middleware::{RateLimiter, WINDOW};
use crate::router::create_router;

/// Shared state for the gateway
pub struct GatewayState {
    pub config: GatewayConfig,
    pub limiter: RateLimiter,
}

impl GatewayState {
    pub fn new(config: GatewayConfig) -> Self {
        let limiter = RateLimiter::new(config.security.rate_limit_per_minute);
        Self { config, limiter }
    }
}

/// The sqlpanel HTTP gateway
pub struct Gateway {
    state: Arc<GatewayState>,
}

impl Gateway {
    pub fn new(config: GatewayConfig) -> Self {
        Self {
            state: Arc::new(GatewayState::new(config)),
        }
    }

    pub fn config(&self) -> &GatewayConfig {
        &self.state.config
    }

    /// Start serving requests
    ///
    /// # Errors
    /// Returns error if the listener cannot be bound or the server fails
    pub async fn serve(&self) -> Result<(), GatewayError> {
        let config = &self.state.config;
        if config.security.api_key.is_none() {
            tracing::warn!("No API key configured; /api is open to any client");
        }

        let router = create_router(Arc::clone(&self.state));

        let addr = &config.bind_address;
        tracing::info!("sqlpanel gateway starting on {}", addr);
        tracing::info!("   GET|POST /api     - Admin actions");
        tracing::info!("   GET      /health  - Health check");

        let listener = TcpListener::bind(addr).await.map_err(|source| GatewayError::Bind {
            addr: addr.clone(),
            source,
        })?;

        let state = Arc::clone(&self.state);
        tokio::spawn(async move {
            let mut ticker = tokio::time::interval(WINDOW);
            loop {
                ticker.tick().await;
                state.limiter.cleanup().await;
            }
        });

        axum::serve(listener, router.into_make_service_with_connect_info::<SocketAddr>()).await?;

        Ok(())
    }
}
