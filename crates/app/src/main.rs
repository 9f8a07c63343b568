mod dispatch;
mod messaging;
mod reply;
mod router;
mod telemetry;
mod webhook;

use std::{net::SocketAddr, sync::Arc, time::Duration};

use release_relay_core::NotificationFormatter;
use release_relay_discord::DiscordClient;
use release_relay_util::{load_env_file, AppConfig};
use tracing::{error, info, warn};
use url::Url;

use crate::dispatch::RelayDispatcher;

const DRAIN_TIMEOUT: Duration = Duration::from_secs(10);
const USER_AGENT: &str = concat!(
    "DiscordBot (release-relay, ",
    env!("CARGO_PKG_VERSION"),
    ")"
);

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    load_env_file();
    let config = AppConfig::from_env()?;

    telemetry::init_tracing(&config)?;
    let metrics = telemetry::init_metrics()?;

    let relay = &config.relay;
    if relay.webhook_secret.is_empty() {
        warn!(
            stage = "app",
            "GITHUB_WEBHOOK_SECRET is not set; every webhook will be rejected"
        );
    }

    let http = reqwest::Client::builder().user_agent(USER_AGENT).build()?;
    let discord = DiscordClient::new(
        relay.discord_token.clone(),
        Url::parse(&relay.discord_api_base)?,
        http,
    );
    let (dispatcher, worker) = RelayDispatcher::new(
        NotificationFormatter::new(relay.channel_id),
        Arc::new(discord),
        relay.queue_capacity,
    );
    let worker = worker.spawn();

    let state = router::AppState::new(
        metrics,
        Arc::from(relay.webhook_secret.as_str()),
        dispatcher,
    );

    let addr: SocketAddr = config.bind_addr;
    info!(
        stage = "app",
        %addr,
        env = %config.environment.as_str(),
        channel_id = relay.channel_id,
        queue_capacity = relay.queue_capacity,
        "starting HTTP server"
    );

    let listener = tokio::net::TcpListener::bind(addr).await?;
    axum::serve(listener, router::app_router(state))
        .with_graceful_shutdown(shutdown_signal())
        .await?;

    // The router held the last dispatcher handles, so the run-loop now drains and exits.
    info!(stage = "app", "HTTP server stopped; draining relay queue");
    if tokio::time::timeout(DRAIN_TIMEOUT, worker).await.is_err() {
        warn!(stage = "app", "relay queue did not drain before shutdown");
    }
    Ok(())
}

async fn shutdown_signal() {
    if let Err(err) = tokio::signal::ctrl_c().await {
        error!(stage = "app", error = %err, "failed to listen for shutdown signal");
        std::future::pending::<()>().await;
    }
}
