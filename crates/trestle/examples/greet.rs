//! Minimal end-to-end demo: register a handler, start a workflow, run the
//! poll loop until it finishes, fetch the result. Run with a live Postgres
//! at `DATABASE_URL` (or rely on the default `postgres://localhost:5432/trestle`).

use std::time::Duration;

use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};
use trestle::{Client, EngineConfig};

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    dotenvy::dotenv().ok();
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env().unwrap_or_else(|_| "trestle=debug".into()),
        )
        .with(tracing_subscriber::fmt::layer())
        .init();

    let config = EngineConfig::from_env();
    let client = Client::init(config).await?;

    client.register_handler("greet", |_ctx, input| async move {
        let name = input.as_str().unwrap_or("world").to_string();
        Ok(serde_json::json!(format!("hello, {name}")))
    });

    client.start("greet-demo", "greet", serde_json::json!("trestle")).await?;

    let poll_client = client.clone();
    let poller = tokio::spawn(async move {
        let mut polls = 0u32;
        poll_client
            .poll(move || {
                polls += 1;
                polls > 5
            })
            .await
    });

    let result = client
        .wait("greet-demo", 20, Duration::from_millis(200))
        .await?;
    println!("{result}");

    poller.await??;
    client.close().await;
    Ok(())
}
