//! Station demo - serve a networked modem port.
//!
//! This example demonstrates:
//! - Loading a [`WifiConfig`] from JSON
//! - Registering command, HTTP and control handlers
//! - Serving a modem reached through a TCP serial bridge (e.g. ser2net)
//!
//! # Running
//!
//! ```text
//! RUST_LOG=commandstation_wifi=debug \
//!     cargo run --example station -- wifi.json 192.168.1.50:4000
//! ```
//!
//! with `wifi.json` holding at least `{ "ssid": "...", "password": "..." }`.

use std::fmt::Write;
use std::time::{Duration, Instant};

use commandstation_wifi::{
    from_fn, ConnectionId, Liveness, RequestContext, RequestHandler, Station, WifiConfig,
};
use tokio::net::TcpStream;

/// Throttle sessions are dropped after this long without a request.
const SESSION_IDLE: Duration = Duration::from_secs(60);

/// Per-connection control session that acknowledges every line.
struct Throttle {
    id: ConnectionId,
    requests: u32,
    last_seen: Option<Instant>,
    now: Instant,
}

impl RequestHandler for Throttle {
    fn handle(&mut self, ctx: &mut RequestContext<'_>) {
        self.requests += 1;
        self.last_seen = Some(self.now);
        let request_len = ctx.request().len();
        let _ = writeln!(ctx, "*{}:{}:{}", self.id, self.requests, request_len);
    }

    fn heartbeat(&mut self, now: Instant) -> Liveness {
        self.now = now;
        match self.last_seen {
            Some(seen) if now.duration_since(seen) > SESSION_IDLE => Liveness::Expired,
            _ => Liveness::Alive,
        }
    }
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    tracing::subscriber::set_global_default(
        tracing_subscriber::FmtSubscriber::builder()
            .with_env_filter(tracing_subscriber::EnvFilter::from_default_env())
            .finish(),
    )?;

    let mut args = std::env::args().skip(1);
    let (Some(config_path), Some(address)) = (args.next(), args.next()) else {
        eprintln!("usage: station <config.json> <host:port>");
        std::process::exit(2);
    };

    let config = WifiConfig::from_json(&std::fs::read_to_string(config_path)?)?;
    let port = TcpStream::connect(&address).await?;
    tracing::info!("Connected to modem port at {}", address);

    let started = Instant::now();
    let handle = Station::builder(config)
        .command(from_fn(|ctx| match ctx.request() {
            b"<s>" => {
                let _ = ctx.reply(b"<iDCC-EX demo station>");
            }
            b"<#>" => {
                let _ = ctx.reply(b"<# 0>");
            }
            _ => {
                let _ = ctx.reply(b"<X>");
            }
        }))
        .http(from_fn(move |ctx| {
            let uptime = started.elapsed().as_secs();
            let _ = write!(
                ctx,
                "HTTP/1.1 200 OK\r\nContent-Type: text/plain\r\n\r\nup {}s\n",
                uptime
            );
        }))
        .control(|id| {
            Box::new(Throttle {
                id,
                requests: 0,
                last_seen: None,
                now: Instant::now(),
            })
        })
        .serve(port)
        .await?;

    tokio::signal::ctrl_c().await?;
    tracing::info!("Interrupted, shutting down");
    handle.shutdown().await?;

    Ok(())
}
