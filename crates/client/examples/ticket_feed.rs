//! Minimal live ticket feed: connects to a deskwire server and prints
//! events as they arrive.
//!
//! ```sh
//! DESKWIRE_URL=ws://localhost:8080/api/ws DESKWIRE_TOKEN=tok_... \
//!     cargo run --example ticket_feed
//! ```

use std::time::Duration;

use anyhow::Context;
use deskwire_client::{credentials, EventBus, RealtimeConfig, RealtimeManager};

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(tracing_subscriber::EnvFilter::from_default_env())
        .init();

    let url = std::env::var("DESKWIRE_URL").context("DESKWIRE_URL is not set")?;
    if let Ok(token) = std::env::var("DESKWIRE_TOKEN") {
        if !credentials::set(&token) {
            eprintln!("warning: could not persist DESKWIRE_TOKEN");
        }
    }

    let bus = EventBus::new();
    for event in [
        "ticket-updated",
        "new-message",
        "notification",
        "user-online",
        "user-offline",
    ] {
        bus.on(event, move |payload| println!("{event}: {payload}"));
    }
    bus.on("connection-state", |payload| {
        println!("connection: {payload}")
    });

    let mut manager = RealtimeManager::new(bus, RealtimeConfig::new(url));
    manager.initialize();

    tokio::time::sleep(Duration::from_secs(600)).await;
    manager.teardown();
    Ok(())
}
