use async_trait::async_trait;
use chrono::SecondsFormat;
use release_relay_core::NotificationMessage;
use release_relay_discord::{
    AllowedMentions, CreateMessage, DiscordClient, DiscordError, Embed, EmbedField, EmbedFooter,
    EmbedImage,
};
use thiserror::Error;

/// Chat platform connection the relay run-loop delivers through.
#[async_trait]
pub trait MessagingClient: Send + Sync {
    /// Establishes the session and returns a printable identity for logs.
    async fn connect(&self) -> Result<String, DeliveryError>;

    /// Posts one notification into its destination channel.
    async fn send(&self, message: &NotificationMessage) -> Result<(), DeliveryError>;
}

/// Terminal failures for a single notification attempt.
#[derive(Debug, Error)]
pub enum DeliveryError {
    #[error("channel {0} not found")]
    ChannelNotFound(u64),
    #[error("not allowed to post into channel {0}")]
    Forbidden(u64),
    #[error("credential rejected: {0}")]
    Unauthorized(String),
    #[error("transport failure: {0}")]
    Transport(String),
}

impl DeliveryError {
    pub fn metric_label(&self) -> &'static str {
        match self {
            Self::ChannelNotFound(_) => "channel_not_found",
            Self::Forbidden(_) => "forbidden",
            Self::Unauthorized(_) => "unauthorized",
            Self::Transport(_) => "failed",
        }
    }

    fn from_discord(err: DiscordError, channel_id: u64) -> Self {
        match err {
            DiscordError::NotFound { .. } => Self::ChannelNotFound(channel_id),
            DiscordError::Forbidden { .. } => Self::Forbidden(channel_id),
            DiscordError::Unauthorized { body } => Self::Unauthorized(body),
            other => Self::Transport(other.to_string()),
        }
    }
}

#[async_trait]
impl MessagingClient for DiscordClient {
    async fn connect(&self) -> Result<String, DeliveryError> {
        let user = self.current_user().await.map_err(|err| match err {
            DiscordError::Unauthorized { body } => DeliveryError::Unauthorized(body),
            other => DeliveryError::Transport(other.to_string()),
        })?;
        Ok(format!("{} ({})", user.username, user.id))
    }

    async fn send(&self, message: &NotificationMessage) -> Result<(), DeliveryError> {
        self.create_message(message.channel_id, &to_create_message(message))
            .await
            .map(|_| ())
            .map_err(|err| DeliveryError::from_discord(err, message.channel_id))
    }
}

/// Maps a formatted notification onto Discord's message payload.
pub fn to_create_message(message: &NotificationMessage) -> CreateMessage {
    let embed = &message.embed;
    CreateMessage {
        content: message.content.clone(),
        embeds: vec![Embed {
            title: embed.title.clone(),
            url: embed.url.clone(),
            description: embed.description.clone(),
            color: embed.color,
            fields: vec![EmbedField {
                name: embed.field.name.clone(),
                value: embed.field.value.clone(),
                inline: embed.field.inline,
            }],
            thumbnail: embed
                .thumbnail_url
                .clone()
                .map(|url| EmbedImage { url }),
            footer: Some(EmbedFooter {
                text: embed.footer.text.clone(),
                icon_url: embed.footer.icon_url.clone(),
            }),
            timestamp: embed
                .timestamp
                .map(|ts| ts.to_rfc3339_opts(SecondsFormat::Secs, true)),
        }],
        allowed_mentions: Some(AllowedMentions {
            parse: vec!["everyone".to_string()],
        }),
    }
}
