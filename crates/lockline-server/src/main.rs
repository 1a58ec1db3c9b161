#![forbid(unsafe_code)]

//! Lockline listener - accepts secure sessions over TCP.
//!
//! Per accepted connection:
//! 1. Runs the credential handshake (unless `--plaintext`)
//! 2. Registers the endpoint and spawns its read loop
//! 3. Echoes every received frame back to the sender
//!
//! Disconnects are reaped from the registry via lifecycle events.

use std::net::SocketAddr;
use std::sync::Arc;

use anyhow::Result;
use clap::Parser;
use lockline_crypto::DEFAULT_EXCHANGE_KEY_BITS;
use lockline_transport::{Endpoint, SessionEvent, SessionListener, TransportError};
use tokio::net::{TcpListener, TcpStream};
use tracing::{debug, info, warn};

#[derive(Parser, Debug)]
#[command(name = "lockline-server")]
#[command(about = "Lockline listener - accepts secure sessions and echoes frames")]
struct Args {
    /// TCP listen address
    #[arg(long, default_value = "127.0.0.1:7600")]
    listen: SocketAddr,

    /// Skip the handshake and exchange raw lines
    #[arg(long, default_value_t = false)]
    plaintext: bool,

    /// RSA exchange key size in bits
    #[arg(long, default_value_t = DEFAULT_EXCHANGE_KEY_BITS)]
    key_bits: usize,

    /// Log level
    #[arg(long, default_value = "info")]
    log_level: String,
}

#[tokio::main]
async fn main() -> Result<()> {
    let args = Args::parse();

    let filter = std::env::var("RUST_LOG").unwrap_or_else(|_| args.log_level.clone());
    tracing_subscriber::fmt().with_env_filter(filter).init();

    let sessions: Arc<SessionListener<TcpStream>> = if args.plaintext {
        warn!("running in plaintext mode (no handshake, no encryption)");
        Arc::new(SessionListener::plaintext())
    } else {
        Arc::new(SessionListener::with_key_bits(args.key_bits).await?)
    };

    tokio::spawn(sessions.reaper());
    tokio::spawn(log_events(Arc::clone(&sessions)));

    let listener = TcpListener::bind(args.listen).await?;
    info!("listening on {}", args.listen);

    loop {
        let (stream, peer) = listener.accept().await?;
        let sessions = Arc::clone(&sessions);
        tokio::spawn(async move {
            match sessions.accept_stream(stream).await {
                Ok(endpoint) => serve(endpoint, peer).await,
                Err(e) => warn!(%peer, error = %e, "connection rejected"),
            }
        });
    }
}

/// Per-connection read loop: echo every frame back.
async fn serve(endpoint: Arc<Endpoint<TcpStream>>, peer: SocketAddr) {
    info!(%peer, session = ?endpoint.session_id(), "session open");
    loop {
        match endpoint.read_frame().await {
            Ok(frame) => {
                debug!(%peer, len = frame.len(), "frame received");
                if let Err(e) = endpoint.write_frame(&frame).await {
                    warn!(%peer, error = %e, "echo failed");
                    break;
                }
            }
            Err(TransportError::EndpointClosed) => break,
            Err(e) => {
                warn!(%peer, error = %e, "read failed");
                break;
            }
        }
    }
    endpoint.close().await;
}

async fn log_events(sessions: Arc<SessionListener<TcpStream>>) {
    let mut rx = sessions.subscribe();
    while let Ok(event) = rx.recv().await {
        match event {
            SessionEvent::Connected {
                endpoint,
                session_id,
            } => info!(endpoint, session = ?session_id, "connected"),
            SessionEvent::Disconnected {
                endpoint,
                session_id,
            } => info!(endpoint, session = ?session_id, "disconnected"),
        }
    }
}
