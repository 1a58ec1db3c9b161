#![forbid(unsafe_code)]

//! Lockline connector - dials a listener, handshakes, and exchanges frames.
//!
//! Reads lines from stdin, sends each as one frame, and prints the reply.

use std::net::SocketAddr;

use anyhow::Result;
use clap::Parser;
use lockline_transport::{Endpoint, SessionEvents, TransportError};
use tokio::io::{AsyncBufReadExt, BufReader};
use tokio::net::TcpStream;
use tracing::info;

#[derive(Parser, Debug)]
#[command(name = "lockline-client")]
#[command(about = "Lockline connector - secure session client")]
struct Args {
    /// Listener address to dial
    #[arg(long, default_value = "127.0.0.1:7600")]
    connect: SocketAddr,

    /// Skip the handshake and exchange raw lines
    #[arg(long, default_value_t = false)]
    plaintext: bool,

    /// Log level
    #[arg(long, default_value = "info")]
    log_level: String,
}

#[tokio::main]
async fn main() -> Result<()> {
    let args = Args::parse();

    let filter = std::env::var("RUST_LOG").unwrap_or_else(|_| args.log_level.clone());
    tracing_subscriber::fmt().with_env_filter(filter).init();

    let stream = TcpStream::connect(args.connect).await?;
    info!("connected to {}", args.connect);

    let endpoint = if args.plaintext {
        Endpoint::plaintext(stream, SessionEvents::new())
    } else {
        let endpoint = Endpoint::connect(stream, SessionEvents::new()).await?;
        info!(session = ?endpoint.session_id(), "session established");
        endpoint
    };

    let mut stdin = BufReader::new(tokio::io::stdin()).lines();
    while let Some(line) = stdin.next_line().await? {
        if line.is_empty() {
            continue;
        }
        endpoint.write_frame(&line).await?;
        match endpoint.read_frame().await {
            Ok(reply) => println!("{reply}"),
            Err(TransportError::EndpointClosed) => {
                info!("listener closed the session");
                break;
            }
            Err(e) => return Err(e.into()),
        }
    }

    endpoint.close().await;
    Ok(())
}
