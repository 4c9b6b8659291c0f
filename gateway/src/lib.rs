//! # sqlpanel Gateway
//!
//! HTTP front for the sqlpanel admin actions.
//!
//! ## Architecture
//!
//! ```text
//! Client → POST /api {action, db_*, ...} → auth → rate limit → sqlpanel::actions → MySQL
//! ```
//!
//! ## Quick Start
//!
//! ```rust,ignore
//! use sqlpanel_gateway::{Gateway, GatewayConfig};
//!
//! #[tokio::main]
//! async fn main() -> anyhow::Result<()> {
//!     let config = GatewayConfig::builder()
//!         .bind("127.0.0.1:8080")
//!         .api_key("change-me")
//!         .build();
//!
//!     Gateway::new(config).serve().await?;
//!     Ok(())
//! }
//! ```

pub mod auth;
pub mod config;
pub mod error;
pub mod handler;
pub mod middleware;
pub mod router;
pub mod server;

pub use config::GatewayConfig;
pub use error::GatewayError;
pub use server::{Gateway, GatewayState};
