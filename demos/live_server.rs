//! Live results server with a simulated timing feed
//!
//! Run with: cargo run --example live_server [BIND_ADDR]
//!
//! Examples:
//!   cargo run --example live_server                  # binds to 0.0.0.0:4080
//!   cargo run --example live_server 127.0.0.1:4090   # binds to 127.0.0.1:4090
//!
//! ## Watching
//!
//! With websocat, as the series administrator:
//!   websocat 'ws://localhost:4080/auto21?token=admin'
//!
//! As a driver (cookie session):
//!   websocat -H 'Cookie: session=driver' ws://localhost:4080/auto21
//!
//! Then send:
//!   {"type":"add_watch","item":"event-42"}
//!
//! A fake timing loop publishes a run to `auto21/event-42` every two seconds
//! and an announcer notice to the series administrators every ten.

use std::net::SocketAddr;
use std::time::Duration;

use serde_json::json;
use uuid::Uuid;

use scorekeeper_live::session::{AuthClass, Grant, StaticAuthenticator};
use scorekeeper_live::{LiveServer, LiveUpdate, ServerConfig, SessionConfig};

fn print_usage() {
    println!("Usage: live_server [BIND_ADDR]");
    println!();
    println!("Tokens: admin (series auto21), driver (any series)");
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    let args: Vec<String> = std::env::args().collect();

    if args.iter().any(|a| a == "--help" || a == "-h") {
        print_usage();
        return Ok(());
    }

    let bind_addr: SocketAddr = match args.get(1) {
        Some(addr) => addr.parse()?,
        None => ServerConfig::default().bind_addr,
    };

    // Initialize logging
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::from_default_env()
                .add_directive("scorekeeper_live=debug".parse()?)
                .add_directive("live_server=debug".parse()?),
        )
        .init();

    let auth = StaticAuthenticator::new()
        .grant("admin", Grant::series_admin("auto21"))
        .grant("driver", Grant::driver(Uuid::from_u128(0x21), "auto21"));

    let server = LiveServer::with_session_config(
        ServerConfig::with_addr(bind_addr),
        auth,
        SessionConfig::default().idle_timeout(Duration::from_secs(60)),
    );

    println!("Starting live results server on {}", bind_addr);
    println!("  ws://localhost:{}/auto21?token=admin", bind_addr.port());
    println!();

    // Simulated timing feed
    let dispatcher = server.dispatcher().clone();
    tokio::spawn(async move {
        let mut ticker = tokio::time::interval(Duration::from_secs(2));
        let mut run = 0u32;
        loop {
            ticker.tick().await;
            run += 1;

            let payload = json!({ "carid": 12, "run": run, "raw": 45.123 + f64::from(run % 7) / 10.0 });
            match LiveUpdate::encode(&payload) {
                Ok(data) => {
                    let delivered = dispatcher.publish("auto21", "event-42", data).await;
                    tracing::info!(run = run, delivered = delivered, "Published run");
                }
                Err(e) => tracing::error!(error = %e, "Failed to encode run"),
            }

            if run % 5 == 0 {
                let notice = json!({ "announcer": format!("{} runs complete", run) });
                if let Ok(data) = LiveUpdate::encode(&notice) {
                    dispatcher
                        .publish_to_class("auto21", AuthClass::Series, data)
                        .await;
                }
            }
        }
    });

    let result = server
        .run_until(async {
            let _ = tokio::signal::ctrl_c().await;
            println!("\nShutting down...");
        })
        .await;

    if let Err(e) = result {
        eprintln!("Server error: {}", e);
    }

    let stats = server.sessions().stats().snapshot();
    println!(
        "Connections: {}  Deliveries: {}  Failures: {}",
        stats.total_connections, stats.deliveries, stats.delivery_failures
    );

    Ok(())
}
