use std::{
    fmt::Write as _,
    sync::{Mutex, OnceLock},
    time::Instant,
};

use metrics::{describe_counter, describe_gauge, describe_histogram};
use metrics_exporter_prometheus::{BuildError, PrometheusBuilder, PrometheusHandle};
use thiserror::Error;
use tracing_subscriber::{
    fmt::{self as tracing_fmt, time::UtcTime},
    layer::SubscriberExt,
    util::{SubscriberInitExt, TryInitError},
    EnvFilter,
};

use release_relay_util::{AppConfig, Environment};

#[derive(Debug, Error)]
pub enum TelemetryError {
    #[error("failed to initialize tracing: {0}")]
    Tracing(#[from] TryInitError),
    #[error("failed to initialize prometheus recorder: {0}")]
    Metrics(#[from] BuildError),
}

static TRACING_INIT: OnceLock<()> = OnceLock::new();
static METRICS_HANDLE: Mutex<Option<PrometheusHandle>> = Mutex::new(None);
static START_TIME: OnceLock<Instant> = OnceLock::new();

const BUILD_VERSION: &str = env!("CARGO_PKG_VERSION");
const DEFAULT_FILTER: &str = "info";

fn build_git_sha() -> &'static str {
    option_env!("GIT_SHA").unwrap_or("unknown")
}

/// Installs the global subscriber: pretty lines locally, JSON in production.
pub fn init_tracing(config: &AppConfig) -> Result<(), TelemetryError> {
    if TRACING_INIT.get().is_some() {
        return Ok(());
    }

    let env_filter =
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(DEFAULT_FILTER));
    let base = tracing_fmt::layer()
        .with_target(false)
        .with_level(true)
        .with_timer(UtcTime::rfc_3339());

    match config.environment {
        Environment::Development | Environment::Test => tracing_subscriber::registry()
            .with(env_filter)
            .with(base.event_format(tracing_fmt::format().pretty()))
            .try_init()?,
        Environment::Production => tracing_subscriber::registry()
            .with(env_filter)
            .with(base.json())
            .try_init()?,
    }

    TRACING_INIT.set(()).ok();
    tracing::info!(
        stage = "telemetry",
        env = %config.environment.as_str(),
        version = BUILD_VERSION,
        git_sha = build_git_sha(),
        "tracing initialized"
    );
    Ok(())
}

/// Installs the Prometheus recorder once and hands out its handle.
pub fn init_metrics() -> Result<PrometheusHandle, TelemetryError> {
    let mut slot = METRICS_HANDLE
        .lock()
        .unwrap_or_else(|poisoned| poisoned.into_inner());
    if let Some(handle) = slot.as_ref() {
        return Ok(handle.clone());
    }

    let handle = PrometheusBuilder::new().install_recorder()?;
    *slot = Some(handle.clone());
    drop(slot);

    describe_metrics();
    START_TIME.get_or_init(Instant::now);
    Ok(handle)
}

fn describe_metrics() {
    describe_gauge!("app_build_info", "Build metadata for the running binary");
    describe_gauge!("app_uptime_seconds", "Seconds since the process started");
    describe_counter!(
        "webhook_requests_total",
        "Count of GitHub webhook requests answered, labelled by outcome"
    );
    describe_histogram!(
        "webhook_ack_latency_seconds",
        "Latency in seconds to answer GitHub webhook requests"
    );
    describe_counter!(
        "relay_dispatch_total",
        "Count of release notifications handed to the run-loop, labelled by result"
    );
    describe_counter!(
        "relay_delivery_total",
        "Count of release notification delivery attempts, labelled by result"
    );
    describe_gauge!(
        "relay_queue_depth",
        "Release notifications waiting for the messaging run-loop"
    );
    describe_histogram!(
        "relay_queue_wait_seconds",
        "Seconds a release notification spent queued before delivery"
    );
}

/// Renders recorder output followed by build and uptime gauges.
pub fn render_metrics(handle: &PrometheusHandle) -> String {
    let mut body = handle.render();
    if !body.is_empty() && !body.ends_with('\n') {
        body.push('\n');
    }

    let uptime = START_TIME
        .get()
        .map(|start| start.elapsed().as_secs_f64())
        .unwrap_or_default();
    let _ = writeln!(body, "# TYPE app_build_info gauge");
    let _ = writeln!(
        body,
        "app_build_info{{version=\"{BUILD_VERSION}\",git=\"{}\"}} 1",
        build_git_sha()
    );
    let _ = writeln!(body, "# TYPE app_uptime_seconds gauge");
    let _ = writeln!(body, "app_uptime_seconds {uptime}");

    body
}
