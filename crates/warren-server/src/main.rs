//! Warren Server
//!
//! Serves a directory subtree to remote clients over the warren line
//! protocol. Clients can browse (`CD`, `LIST`) and replay command files
//! (`@name`) but can never read or navigate outside the served root.

use std::net::SocketAddr;
use std::path::PathBuf;

use clap::Parser;
use tracing_subscriber::{EnvFilter, fmt, layer::SubscriberExt, util::SubscriberInitExt};

use warren_server::{Server, ServerConfig, shutdown_signal};

/// Warren Server - jailed directory browsing over a line protocol
#[derive(Parser, Debug)]
#[command(name = "warren-server")]
#[command(about = "Line-protocol server for browsing a jailed directory subtree")]
struct Args {
    /// Address to listen on
    #[arg(long, default_value = "127.0.0.1:4040")]
    addr: SocketAddr,

    /// Directory to serve; sessions can never escape it
    root: PathBuf,

    /// Welcome string sent to connecting clients
    #[arg(long, default_value = warren::limits::DEFAULT_WELCOME)]
    welcome: String,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // Initialize tracing
    tracing_subscriber::registry()
        .with(fmt::layer())
        .with(EnvFilter::from_default_env().add_directive(tracing::Level::INFO.into()))
        .init();

    let args = Args::parse();
    let config = ServerConfig {
        addr: args.addr,
        root: args.root,
        welcome: args.welcome,
    };

    Server::new(config).bind().await?.serve(shutdown_signal()).await
}
