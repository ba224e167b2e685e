//! Relay server example
//!
//! Run with: cargo run --example relay_server [BIND_ADDR] [NAME=LOCATOR ...]
//!
//! Examples:
//!   cargo run --example relay_server
//!   cargo run --example relay_server 127.0.0.1:1984 cam1=http://cam.local/video.flv
//!   cargo run --example relay_server 0.0.0.0:1984 "door=https://cam/mjpeg Authorization tok"
//!   cargo run --example relay_server 0.0.0.0:1984 raw=tcp://10.0.0.5:8000
//!
//! Each source is sniffed once at startup and attached to the registry under
//! NAME. Consumers then connect with:
//!
//!   ffplay "http://localhost:1984/api/stream.mp4?src=cam1"
//!   curl -o snap.mp4 "http://localhost:1984/api/frame.mp4?src=cam1"
//!
//! Set RUST_LOG=relay_rs=debug for per-session logs.

use std::net::SocketAddr;

use relay_rs::{RelayServer, ServerConfig, Sniffer, SnifferConfig};
use tracing_subscriber::EnvFilter;

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("relay_rs=info")),
        )
        .init();

    let mut args = std::env::args().skip(1).peekable();

    let bind_addr: SocketAddr = match args.peek() {
        Some(arg) if !arg.contains('=') => {
            let arg = args.next().unwrap_or_default();
            if arg == "localhost" {
                "127.0.0.1:1984".parse()?
            } else {
                arg.parse()?
            }
        }
        _ => ServerConfig::default().bind_addr,
    };

    let server = RelayServer::new(ServerConfig::with_addr(bind_addr));
    let sniffer = Sniffer::new(SnifferConfig::default())?;

    for source in args {
        let Some((name, locator)) = source.split_once('=') else {
            eprintln!("Ignoring {:?}: expected NAME=LOCATOR", source);
            continue;
        };

        match sniffer.resolve(locator).await {
            Ok(producer) => {
                println!(
                    "[{}] {} ({}), {} track(s)",
                    name,
                    producer.desc(),
                    producer.url(),
                    producer.medias().len()
                );
                for media in producer.medias() {
                    println!("    {:?} {}", media.kind(), media.codec);
                }
                server.registry().attach_producer(name, producer)?;
            }
            Err(e) => eprintln!("[{}] {}", name, e),
        }
    }

    println!("Listening on http://{}", server.bind_addr());
    server
        .run_until(async {
            let _ = tokio::signal::ctrl_c().await;
        })
        .await?;

    Ok(())
}
