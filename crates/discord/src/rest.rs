use reqwest::{Client, Method, Response, StatusCode};
use serde::{de::DeserializeOwned, Deserialize, Serialize};
use thiserror::Error;
use url::Url;

/// Minimal Discord REST client covering what the relay needs.
#[derive(Clone)]
pub struct DiscordClient {
    http: Client,
    base_url: Url,
    token: String,
}

impl DiscordClient {
    /// Creates a client authenticating as the bot identified by `token`.
    pub fn new(token: impl Into<String>, base_url: Url, http: Client) -> Self {
        Self {
            http,
            base_url,
            token: token.into(),
        }
    }

    /// Resolves the bot user behind the configured token.
    pub async fn current_user(&self) -> Result<CurrentUser, DiscordError> {
        let url = self.base_url.join("users/@me")?;
        let response = self.authorized_request(Method::GET, url).send().await?;
        parse_json(response).await
    }

    /// Posts a message into the given channel.
    pub async fn create_message(
        &self,
        channel_id: u64,
        message: &CreateMessage,
    ) -> Result<MessageRef, DiscordError> {
        let url = self
            .base_url
            .join(&format!("channels/{channel_id}/messages"))?;
        let response = self
            .authorized_request(Method::POST, url)
            .json(message)
            .send()
            .await?;
        parse_json(response).await
    }

    fn authorized_request(&self, method: Method, url: Url) -> reqwest::RequestBuilder {
        self.http
            .request(method, url)
            .header("Authorization", format!("Bot {}", self.token))
    }
}

/// Body of `POST channels/{id}/messages`.
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct CreateMessage {
    pub content: String,
    #[serde(skip_serializing_if = "Vec::is_empty")]
    pub embeds: Vec<Embed>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub allowed_mentions: Option<AllowedMentions>,
}

/// Mention parsing rules; `["everyone"]` lets `@everyone` ping the channel.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct AllowedMentions {
    pub parse: Vec<String>,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct Embed {
    pub title: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub url: Option<String>,
    pub description: String,
    pub color: u32,
    #[serde(skip_serializing_if = "Vec::is_empty")]
    pub fields: Vec<EmbedField>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub thumbnail: Option<EmbedImage>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub footer: Option<EmbedFooter>,
    /// ISO 8601 timestamp shown next to the footer.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub timestamp: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct EmbedField {
    pub name: String,
    pub value: String,
    pub inline: bool,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct EmbedImage {
    pub url: String,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct EmbedFooter {
    pub text: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub icon_url: Option<String>,
}

/// Bot account returned by `users/@me`.
#[derive(Debug, Clone, Deserialize, PartialEq)]
pub struct CurrentUser {
    pub id: String,
    pub username: String,
}

/// Identifiers of a message Discord accepted.
#[derive(Debug, Clone, Deserialize, PartialEq)]
pub struct MessageRef {
    pub id: String,
    pub channel_id: String,
}

/// Errors produced by the Discord client.
#[derive(Debug, Error)]
pub enum DiscordError {
    #[error("failed to build url: {0}")]
    Url(#[from] url::ParseError),
    #[error("http error: {0}")]
    Http(#[from] reqwest::Error),
    #[error("bot token rejected: {body}")]
    Unauthorized { body: String },
    #[error("missing permissions: {body}")]
    Forbidden { body: String },
    #[error("resource not found: {body}")]
    NotFound { body: String },
    #[error("unexpected status {status}: {body}")]
    Status { status: StatusCode, body: String },
}

async fn parse_json<T>(response: Response) -> Result<T, DiscordError>
where
    T: DeserializeOwned,
{
    let status = response.status();
    if !status.is_success() {
        let body = response
            .text()
            .await
            .unwrap_or_else(|_| String::from("<unavailable>"));
        return Err(match status {
            StatusCode::UNAUTHORIZED => DiscordError::Unauthorized { body },
            StatusCode::FORBIDDEN => DiscordError::Forbidden { body },
            StatusCode::NOT_FOUND => DiscordError::NotFound { body },
            _ => DiscordError::Status { status, body },
        });
    }

    Ok(response.json().await?)
}

#[cfg(test)]
mod tests {
    use super::*;
    use httpmock::prelude::*;
    use serde_json::json;

    fn client(server: &MockServer) -> DiscordClient {
        DiscordClient::new(
            "bot-token",
            Url::parse(&server.url("/api/v10/")).expect("url"),
            Client::builder().build().expect("client"),
        )
    }

    fn sample_message() -> CreateMessage {
        CreateMessage {
            content: "@everyone hello".to_string(),
            embeds: vec![Embed {
                title: "🎬 S01E01".to_string(),
                url: Some("https://example.test/release".to_string()),
                description: "short".to_string(),
                color: 0x6A0DAD,
                fields: vec![EmbedField {
                    name: "Версия".to_string(),
                    value: "v1.2.0".to_string(),
                    inline: true,
                }],
                thumbnail: None,
                footer: Some(EmbedFooter {
                    text: "VexeraDubbing".to_string(),
                    icon_url: None,
                }),
                timestamp: None,
            }],
            allowed_mentions: Some(AllowedMentions {
                parse: vec!["everyone".to_string()],
            }),
        }
    }

    #[tokio::test]
    async fn current_user_sends_bot_authorization() {
        let server = MockServer::start_async().await;
        let mock = server
            .mock_async(|when, then| {
                when.method(GET)
                    .path("/api/v10/users/@me")
                    .header("Authorization", "Bot bot-token");
                then.status(200)
                    .json_body(json!({"id": "42", "username": "relay", "bot": true}));
            })
            .await;

        let user = client(&server).current_user().await.expect("current user");
        mock.assert_async().await;
        assert_eq!(user.id, "42");
        assert_eq!(user.username, "relay");
    }

    #[tokio::test]
    async fn create_message_posts_embed_payload() {
        let server = MockServer::start_async().await;
        let mock = server
            .mock_async(|when, then| {
                when.method(POST)
                    .path("/api/v10/channels/1234/messages")
                    .header("Authorization", "Bot bot-token")
                    .json_body(json!({
                        "content": "@everyone hello",
                        "embeds": [{
                            "title": "🎬 S01E01",
                            "url": "https://example.test/release",
                            "description": "short",
                            "color": 0x6A0DAD,
                            "fields": [{"name": "Версия", "value": "v1.2.0", "inline": true}],
                            "footer": {"text": "VexeraDubbing"}
                        }],
                        "allowed_mentions": {"parse": ["everyone"]}
                    }));
                then.status(200).json_body(json!({
                    "id": "m-1",
                    "channel_id": "1234",
                    "content": "@everyone hello"
                }));
            })
            .await;

        let message = client(&server)
            .create_message(1234, &sample_message())
            .await
            .expect("create message");
        mock.assert_async().await;
        assert_eq!(message.id, "m-1");
        assert_eq!(message.channel_id, "1234");
    }

    #[tokio::test]
    async fn error_statuses_are_classified() {
        let server = MockServer::start_async().await;
        server
            .mock_async(|when, then| {
                when.method(POST).path("/api/v10/channels/1/messages");
                then.status(404).body(r#"{"message": "Unknown Channel", "code": 10003}"#);
            })
            .await;
        server
            .mock_async(|when, then| {
                when.method(POST).path("/api/v10/channels/2/messages");
                then.status(403).body(r#"{"message": "Missing Permissions", "code": 50013}"#);
            })
            .await;
        server
            .mock_async(|when, then| {
                when.method(POST).path("/api/v10/channels/3/messages");
                then.status(502).body("bad gateway");
            })
            .await;

        let client = client(&server);
        let err = client
            .create_message(1, &sample_message())
            .await
            .expect_err("unknown channel");
        assert!(matches!(err, DiscordError::NotFound { ref body } if body.contains("10003")));

        let err = client
            .create_message(2, &sample_message())
            .await
            .expect_err("forbidden");
        assert!(matches!(err, DiscordError::Forbidden { .. }));

        match client
            .create_message(3, &sample_message())
            .await
            .expect_err("bad gateway")
        {
            DiscordError::Status { status, body } => {
                assert_eq!(status, StatusCode::BAD_GATEWAY);
                assert_eq!(body, "bad gateway");
            }
            other => panic!("unexpected error: {:?}", other),
        }
    }

    #[tokio::test]
    async fn rejected_token_maps_to_unauthorized() {
        let server = MockServer::start_async().await;
        server
            .mock_async(|when, then| {
                when.method(GET).path("/api/v10/users/@me");
                then.status(401).body("401: Unauthorized");
            })
            .await;

        let err = client(&server).current_user().await.expect_err("bad token");
        assert!(matches!(err, DiscordError::Unauthorized { .. }));
    }
}
