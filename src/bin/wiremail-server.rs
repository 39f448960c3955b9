#![deny(clippy::all)]
#![warn(clippy::pedantic)]
#![warn(clippy::nursery)]

//! TCP server binary for the wiremail service

use clap::Parser;
use tracing_subscriber::EnvFilter;
use wiremail::{MailServer, ServerConfig};

#[derive(Parser)]
#[command(name = "wiremail-server")]
#[command(about = "Serve the wiremail line protocol over TCP")]
struct Args {
    /// Host to bind, overriding WIREMAIL_HOST
    #[arg(long)]
    host: Option<String>,

    /// Port to bind, overriding WIREMAIL_PORT
    #[arg(long)]
    port: Option<u16>,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::from_default_env())
        .init();

    let args = Args::parse();
    let mut config = ServerConfig::from_env()?;
    if let Some(host) = args.host {
        config.host = host;
    }
    if let Some(port) = args.port {
        config.port = port;
    }

    let server = MailServer::bind(&config.address()).await?;
    server.serve().await?;

    Ok(())
}
