use std::time::Instant;

use axum::{
    body::Bytes,
    extract::{rejection::BytesRejection, State},
    http::HeaderMap,
};
use metrics::{counter, histogram};
use release_relay_core::{verify_signature, EventClassifier, WebhookEnvelope};
use tracing::{debug, error, info, warn};

use crate::reply::StatusReply;
use crate::router::AppState;

pub const HEADER_SIGNATURE: &str = "X-Hub-Signature-256";
pub const HEADER_EVENT: &str = "X-GitHub-Event";
const HEADER_DELIVERY: &str = "X-GitHub-Delivery";

/// Authenticates a GitHub webhook and relays published releases.
///
/// Dispatch outcomes never change the reply: once a release is classified the
/// caller gets `200` whether or not the run-loop accepted the notification.
pub async fn handle(
    State(state): State<AppState>,
    headers: HeaderMap,
    body: Result<Bytes, BytesRejection>,
) -> Result<StatusReply, StatusReply> {
    let start = Instant::now();
    let body = match body {
        Ok(body) => body,
        Err(rejection) => {
            error!(
                stage = "ingress",
                status = rejection.status().as_u16(),
                error = %rejection.body_text(),
                "failed to read webhook body"
            );
            return Err(finish(start, "error", StatusReply::error()));
        }
    };
    let signature = header_value(&headers, HEADER_SIGNATURE);
    let event = header_value(&headers, HEADER_EVENT);
    let delivery = header_value(&headers, HEADER_DELIVERY).unwrap_or("-");
    let envelope = WebhookEnvelope::new(&body, event, signature);

    if !verify_signature(
        envelope.body,
        envelope.signature.unwrap_or_default(),
        state.webhook_secret(),
    ) {
        warn!(
            stage = "ingress",
            delivery,
            event = event.unwrap_or("-"),
            signature_present = signature.is_some(),
            "webhook signature rejected"
        );
        return Err(finish(start, "invalid_signature", StatusReply::invalid_signature()));
    }

    match EventClassifier::classify(&envelope) {
        Ok(Some(release)) => {
            info!(
                stage = "classify",
                delivery,
                tag = %release.tag_name,
                "release published"
            );
            state.dispatcher().dispatch(&release);
            Ok(finish(start, "success", StatusReply::success()))
        }
        Ok(None) => {
            debug!(
                stage = "classify",
                delivery,
                event = event.unwrap_or("-"),
                "webhook acknowledged without relay"
            );
            Ok(finish(start, "ignored", StatusReply::success()))
        }
        Err(err) => {
            error!(stage = "classify", delivery, error = %err, "failed to classify webhook");
            Err(finish(start, "error", StatusReply::error()))
        }
    }
}

fn finish(start: Instant, outcome: &'static str, reply: StatusReply) -> StatusReply {
    counter!("webhook_requests_total", "outcome" => outcome).increment(1);
    histogram!("webhook_ack_latency_seconds", "outcome" => outcome)
        .record(start.elapsed().as_secs_f64());
    debug!(stage = "ingress", status = reply.status().as_u16(), outcome, "webhook answered");
    reply
}

/// Header value as UTF-8; anything else counts as absent.
fn header_value<'a>(headers: &'a HeaderMap, name: &str) -> Option<&'a str> {
    headers.get(name).and_then(|value| value.to_str().ok())
}
