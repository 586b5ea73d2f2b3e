//! Watch one key of an Apollo namespace.
//!
//! ```text
//! APOLLO_META=http://localhost:8080 APOLLO_APP_ID=my-app \
//!     cargo run --example watch -- timeout
//! ```
//!
//! Logs every changed key as updates arrive and prints the watched key
//! every five seconds. `RUST_LOG` controls verbosity.

use std::time::Duration;

use anyhow::Context;
use apollo_config::{ApolloClient, ClientConfig, Subscriber};
use tracing_subscriber::EnvFilter;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .init();

    let config = ClientConfig::from_env().context("set APOLLO_META and APOLLO_APP_ID")?;
    let key = std::env::args().nth(1).unwrap_or_else(|| "timeout".to_string());
    let namespace = config.namespace.clone();

    let client = ApolloClient::builder(config)
        .subscriber(Subscriber::from_fn(namespace, |config| {
            let Some(config) = config else {
                return Ok(());
            };
            for (key, value) in config.iter().filter(|(_, v)| v.changed) {
                tracing::info!(key = %key, value = %value.value, "changed");
            }
            Ok(())
        }))
        .connect()
        .await
        .context("failed to connect to the meta server")?;

    client.start_polling();
    tracing::info!(endpoint = ?client.active_endpoint(), "watching {}", key);

    let mut ticker = tokio::time::interval(Duration::from_secs(5));
    loop {
        ticker.tick().await;
        match client.value(&key) {
            Some(value) => println!("{} = {}", key, value),
            None => println!("{} is not set", key),
        }
    }
}
