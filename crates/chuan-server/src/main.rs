//! chuan server binary
//!
//! # Usage
//!
//! ```bash
//! # Defaults: port 8080, embedded frontend, TURN disabled
//! chuan-server
//!
//! # Flags beat environment beats the .chuan.env dotfile
//! chuan-server --port 3000
//! TURN_ENABLED=true TURN_PORT=3478 chuan-server
//! ```

use clap::Parser;
use tracing::Level;
use tracing_subscriber::{fmt, prelude::*, EnvFilter};

use chuan_core::Config;

#[derive(Parser, Debug)]
#[command(name = "chuan-server")]
#[command(about = "WebRTC rendezvous server for browser-to-browser transfer")]
#[command(version)]
struct Args {
    /// Port to listen on (overrides the PORT environment variable)
    #[arg(short, long)]
    port: Option<u16>,
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    tracing_subscriber::registry()
        .with(fmt::layer())
        .with(
            EnvFilter::builder()
                .with_default_directive(Level::INFO.into())
                .from_env_lossy(),
        )
        .init();

    let args = Args::parse();

    let mut config = Config::load();
    if let Some(port) = args.port {
        config.port = port;
    }
    config.log_summary();

    chuan_server::run(config).await
}
