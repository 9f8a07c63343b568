use chrono::{DateTime, Utc};
use serde::Deserialize;
use serde_json::Value;
use thiserror::Error;

/// Event header value GitHub sends for release activity.
pub const RELEASE_EVENT: &str = "release";
/// Release action that triggers a notification.
pub const PUBLISHED_ACTION: &str = "published";
/// Tag used when the payload does not carry one.
pub const DEFAULT_TAG_NAME: &str = "v1.0.0";

/// Raw inbound webhook, valid for the lifetime of one request.
#[derive(Debug, Clone, Copy)]
pub struct WebhookEnvelope<'a> {
    pub body: &'a [u8],
    pub event: Option<&'a str>,
    pub signature: Option<&'a str>,
}

impl<'a> WebhookEnvelope<'a> {
    pub fn new(body: &'a [u8], event: Option<&'a str>, signature: Option<&'a str>) -> Self {
        Self {
            body,
            event,
            signature,
        }
    }
}

/// Normalized view of a published GitHub release.
#[derive(Debug, Clone, PartialEq)]
pub struct Release {
    pub name: Option<String>,
    pub tag_name: String,
    pub html_url: Option<String>,
    pub body: Option<String>,
    pub assets: Vec<ReleaseAsset>,
    pub published_at: Option<DateTime<Utc>>,
}

impl Default for Release {
    fn default() -> Self {
        Self {
            name: None,
            tag_name: DEFAULT_TAG_NAME.to_string(),
            html_url: None,
            body: None,
            assets: Vec::new(),
            published_at: None,
        }
    }
}

/// Downloadable file attached to a release.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ReleaseAsset {
    pub content_type: String,
    pub download_url: String,
}

/// Errors raised while classifying a webhook payload.
#[derive(Debug, Error)]
pub enum ClassifyError {
    #[error("failed to parse payload: {0}")]
    InvalidJson(#[source] serde_json::Error),
    #[error("release payload is missing the release object")]
    MissingRelease,
    #[error("release object has an unexpected shape: {0}")]
    InvalidRelease(#[source] serde_json::Error),
}

/// Decides whether an envelope carries an actionable release event.
pub struct EventClassifier;

impl EventClassifier {
    /// Returns the published release, `None` for any other event or action.
    ///
    /// The body is only decoded once the event header names a release, so
    /// unrelated events are acknowledged without looking at their payload.
    pub fn classify(envelope: &WebhookEnvelope<'_>) -> Result<Option<Release>, ClassifyError> {
        if envelope.event != Some(RELEASE_EVENT) {
            return Ok(None);
        }

        let payload: Value =
            serde_json::from_slice(envelope.body).map_err(ClassifyError::InvalidJson)?;

        let action = payload.get("action").and_then(Value::as_str);
        if action != Some(PUBLISHED_ACTION) {
            return Ok(None);
        }

        let release = payload
            .get("release")
            .filter(|value| value.is_object())
            .ok_or(ClassifyError::MissingRelease)?;
        let raw = RawRelease::deserialize(release).map_err(ClassifyError::InvalidRelease)?;

        Ok(Some(raw.into_release()))
    }
}

#[derive(Debug, Deserialize)]
struct RawRelease {
    #[serde(default)]
    name: Option<String>,
    #[serde(default)]
    tag_name: Option<String>,
    #[serde(default)]
    html_url: Option<String>,
    #[serde(default)]
    body: Option<String>,
    #[serde(default)]
    assets: Option<Vec<RawAsset>>,
    #[serde(default)]
    published_at: Option<String>,
}

#[derive(Debug, Deserialize)]
struct RawAsset {
    #[serde(default)]
    content_type: Option<String>,
    #[serde(default)]
    browser_download_url: Option<String>,
}

impl RawRelease {
    fn into_release(self) -> Release {
        let assets = self
            .assets
            .unwrap_or_default()
            .into_iter()
            .map(|asset| ReleaseAsset {
                content_type: asset.content_type.unwrap_or_default(),
                download_url: asset.browser_download_url.unwrap_or_default(),
            })
            .collect();

        let published_at = self
            .published_at
            .as_deref()
            .and_then(|raw| DateTime::parse_from_rfc3339(raw).ok())
            .map(|ts| ts.with_timezone(&Utc));

        Release {
            name: non_empty(self.name),
            tag_name: non_empty(self.tag_name).unwrap_or_else(|| DEFAULT_TAG_NAME.to_string()),
            html_url: non_empty(self.html_url),
            body: non_empty(self.body),
            assets,
            published_at,
        }
    }
}

fn non_empty(value: Option<String>) -> Option<String> {
    value.filter(|inner| !inner.trim().is_empty())
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;
    use serde_json::json;

    fn classify(event: Option<&str>, body: &str) -> Result<Option<Release>, ClassifyError> {
        EventClassifier::classify(&WebhookEnvelope::new(body.as_bytes(), event, None))
    }

    #[test]
    fn extracts_published_release() {
        let body = json!({
            "action": "published",
            "release": {
                "name": "S01E01",
                "tag_name": "v1.2.0",
                "html_url": "https://github.com/org/repo/releases/tag/v1.2.0",
                "body": "short",
                "published_at": "2024-05-01T12:30:00Z",
                "assets": [
                    {"content_type": "image/png", "browser_download_url": "https://cdn/poster.png"},
                    {"content_type": "video/mp4", "browser_download_url": "https://cdn/ep.mp4"}
                ]
            }
        })
        .to_string();

        let release = classify(Some("release"), &body)
            .expect("classify")
            .expect("release");
        assert_eq!(release.name.as_deref(), Some("S01E01"));
        assert_eq!(release.tag_name, "v1.2.0");
        assert_eq!(
            release.html_url.as_deref(),
            Some("https://github.com/org/repo/releases/tag/v1.2.0")
        );
        assert_eq!(release.body.as_deref(), Some("short"));
        assert_eq!(release.assets.len(), 2);
        assert_eq!(release.assets[0].content_type, "image/png");
        assert_eq!(release.assets[0].download_url, "https://cdn/poster.png");
        assert_eq!(
            release.published_at,
            Some(Utc.with_ymd_and_hms(2024, 5, 1, 12, 30, 0).unwrap())
        );
    }

    #[test]
    fn missing_optional_fields_resolve_to_defaults() {
        let body = json!({
            "action": "published",
            "release": {"name": null, "body": "", "assets": null, "published_at": "yesterday"}
        })
        .to_string();

        let release = classify(Some("release"), &body)
            .expect("classify")
            .expect("release");
        assert_eq!(release, Release::default());
    }

    #[test]
    fn ignores_other_events_and_actions() {
        let published = json!({"action": "published", "release": {}}).to_string();
        assert!(classify(Some("push"), &published).expect("push").is_none());
        assert!(classify(None, &published).expect("missing header").is_none());
        assert!(classify(Some("Release"), &published).expect("case").is_none());

        for action in ["created", "edited", "deleted", "prereleased", "released"] {
            let body = json!({"action": action, "release": {}}).to_string();
            assert!(classify(Some("release"), &body).expect(action).is_none());
        }

        let no_action = json!({"release": {}}).to_string();
        assert!(classify(Some("release"), &no_action).expect("no action").is_none());
    }

    #[test]
    fn non_release_events_skip_decoding() {
        assert!(classify(Some("ping"), "not json").expect("ping").is_none());
    }

    #[test]
    fn malformed_release_payloads_are_errors() {
        let err = classify(Some("release"), "{not json").expect_err("invalid json");
        assert!(matches!(err, ClassifyError::InvalidJson(_)));

        let missing = json!({"action": "published"}).to_string();
        let err = classify(Some("release"), &missing).expect_err("missing release");
        assert!(matches!(err, ClassifyError::MissingRelease));

        let wrong_type = json!({"action": "published", "release": "v1"}).to_string();
        let err = classify(Some("release"), &wrong_type).expect_err("release string");
        assert!(matches!(err, ClassifyError::MissingRelease));

        let bad_field = json!({"action": "published", "release": {"name": 42}}).to_string();
        let err = classify(Some("release"), &bad_field).expect_err("numeric name");
        assert!(matches!(err, ClassifyError::InvalidRelease(_)));
    }
}
