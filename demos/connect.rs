//! Minimal demonstration: log in and print model load progress.
//!
//! Reads `FC_HOST_USERNAME`/`FC_HOST_PASSWORD` from the environment; panics
//! with a readable message if either is unset, since this is a demo binary,
//! not library code.

use std::sync::Arc;

use fc_chat_core::{Client, ClientOptions};
use tracing_subscriber::EnvFilter;

#[tokio::main]
async fn main() {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::from_default_env())
        .init();

    let username = std::env::var("FC_HOST_USERNAME").expect("FC_HOST_USERNAME must be set");
    let password = std::env::var("FC_HOST_PASSWORD").expect("FC_HOST_PASSWORD must be set");

    let client = Arc::new(Client::new(ClientOptions::default(), username, password));

    let events = client.events().clone();
    events.on("ANY", |packet| {
        tracing::debug!(fc_type = ?packet.fc_type, "received packet");
    });

    client
        .connect_and_wait_for_models()
        .await
        .expect("failed to connect and load models");

    tracing::info!("models loaded, press Ctrl+C to exit");
    tokio::signal::ctrl_c().await.ok();

    client.disconnect().await.ok();
}
