use anyhow::{Context, Result};
use clap::Parser;
use farmsteam_server::{Api, Backend, Store};
use std::net::{IpAddr, SocketAddr};
use std::path::PathBuf;
use std::str::FromStr;
use std::sync::Arc;
use tracing::info;

fn init_tracing(log_level: &str) -> Result<()> {
    let level = tracing::Level::from_str(log_level)
        .map_err(|_| anyhow::anyhow!("invalid log level: {log_level}"))?;
    tracing_subscriber::fmt().with_max_level(level).init();
    Ok(())
}


#[derive(Parser, Debug)]
#[command(author, version, about, long_about = None)]
struct Args {
    /// Host interface to bind (default: localhost).
    #[arg(long, default_value = "127.0.0.1")]
    host: IpAddr,

    #[arg(short, long, default_value_t = 8080)]
    port: u16,

    /// Path to the SQLite database holding user state and referrals.
    #[arg(long, default_value = "farmsteam.db")]
    db_path: PathBuf,

    /// Log level (trace, debug, info, warn, error).
    #[arg(long, default_value = "info")]
    log_level: String,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // Parse args
    let args = Args::parse();

    // Create logger
    init_tracing(&args.log_level)?;

    // Open the store
    let store = Store::open(&args.db_path)
        .with_context(|| format!("failed to open database at {}", args.db_path.display()))?;
    info!(path = %args.db_path.display(), "state database ready");

    let backend = Arc::new(Backend::new(store));
    let api = Api::new(backend);
    let app = api.router();

    // Start server
    let addr = SocketAddr::new(args.host, args.port);
    let listener = tokio::net::TcpListener::bind(addr)
        .await
        .with_context(|| format!("failed to bind {addr}"))?;
    info!("Listening on {}", addr);
    axum::serve(listener, app.into_make_service())
        .await
        .context("axum server error")?;

    Ok(())
}
