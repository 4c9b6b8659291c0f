//! sqlpanel-gateway binary

use std::path::PathBuf;

use clap::Parser;
use sqlpanel_gateway::{Gateway, GatewayConfig};
use tracing_subscriber::EnvFilter;

#[derive(Parser)]
#[command(name = "sqlpanel-gateway", version, about = "HTTP gateway for sqlpanel admin actions")]
struct Args {
    /// Path to gateway.toml
    #[arg(short, long, env = "SQLPANEL_CONFIG")]
    config: Option<PathBuf>,

    /// Override the bind address
    #[arg(short, long)]
    bind: Option<String>,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| EnvFilter::new("sqlpanel=info,sqlpanel_gateway=info,tower_http=info")),
        )
        .init();

    let args = Args::parse();
    let mut config = GatewayConfig::load(args.config.as_deref())?;
    if let Some(bind) = args.bind {
        config.bind_address = bind;
    }
    tracing::debug!(?config, "Configuration loaded");

    Gateway::new(config).serve().await?;
    Ok(())
}
