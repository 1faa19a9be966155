//! An echo server demonstrating the acceptd listener core.
//!
//! Usage: `cargo run --example echo_server [config.json]`
//!
//! Without a config file the server listens on 127.0.0.1:8080 in plaintext. Set
//! `cert_path` and `key_path` in the config to serve TLS instead.

use acceptd::{Error, Exchange, HttpServer, ServerConfig};
use log::{info, warn};
use tokio::io::{AsyncReadExt, AsyncWriteExt};

async fn echo(mut exchange: Exchange) -> Result<(), Error> {
    let peer = exchange.peer_addr();
    let mut buf = vec![0u8; 8192];
    let mut total = 0usize;

    loop {
        let n = exchange.read(&mut buf).await?;
        if n == 0 {
            break;
        }
        exchange.write_all(&buf[..n]).await?;
        total += n;
    }

    info!("Echoed {total} bytes back to {peer}");
    exchange.shutdown().await?;
    Ok(())
}

fn main() -> Result<(), Box<dyn std::error::Error>> {
    // Initialize the logger
    env_logger::init();

    let config = match std::env::args().nth(1) {
        Some(path) => ServerConfig::from_json_file(path)?,
        None => ServerConfig::default(),
    };

    let mut server = HttpServer::new(config, echo)?;
    server.run()?;
    info!(
        "Echo server listening on {addr} (tls: {tls}), press Ctrl+C to stop",
        addr = server.local_addr(),
        tls = server.is_tls()
    );

    if let Err(e) = server.block_on(tokio::signal::ctrl_c())? {
        warn!("Error waiting for Ctrl+C: {e}");
    }

    info!("Shutting down, stats: {stats:?}", stats = server.stats());
    server.stop();
    Ok(())
}
