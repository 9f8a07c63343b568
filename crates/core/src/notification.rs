use chrono::{DateTime, Utc};

use crate::release::Release;

/// Upper bound on the embed description, in characters.
pub const DESCRIPTION_LIMIT: usize = 500;
const ELLIPSIS: &str = "...";

pub const TITLE_PREFIX: &str = "🎬";
pub const DEFAULT_TITLE: &str = "Новый релиз";
pub const DEFAULT_DESCRIPTION: &str = "Новая серия доступна!";
pub const ANNOUNCEMENT: &str = "@everyone Новая серия готова к просмотру! 🎉";
pub const VERSION_FIELD: &str = "Версия";
pub const ACCENT_COLOR: u32 = 0x6A0DAD;
pub const FOOTER_TEXT: &str = "VexeraDubbing";
pub const FOOTER_ICON_URL: &str =
    "https://s.iimg.su/s/14/gpoeAFfxQzTomz8sVJov06CIg7aoGPgAm6u2BzjA.jpg";

/// Message ready to be posted into a chat channel.
#[derive(Debug, Clone, PartialEq)]
pub struct NotificationMessage {
    pub channel_id: u64,
    pub content: String,
    pub embed: Embed,
}

/// Rich attachment rendered under the message content.
#[derive(Debug, Clone, PartialEq)]
pub struct Embed {
    pub title: String,
    pub url: Option<String>,
    pub description: String,
    pub color: u32,
    pub field: EmbedField,
    pub thumbnail_url: Option<String>,
    pub footer: EmbedFooter,
    pub timestamp: Option<DateTime<Utc>>,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct EmbedField {
    pub name: String,
    pub value: String,
    pub inline: bool,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct EmbedFooter {
    pub text: String,
    pub icon_url: Option<String>,
}

/// Turns release records into channel notifications for one destination.
#[derive(Debug, Clone, Copy)]
pub struct NotificationFormatter {
    channel_id: u64,
}

impl NotificationFormatter {
    pub fn new(channel_id: u64) -> Self {
        Self { channel_id }
    }

    pub fn channel_id(&self) -> u64 {
        self.channel_id
    }

    pub fn format(&self, release: &Release) -> NotificationMessage {
        let title = format!(
            "{TITLE_PREFIX} {}",
            release.name.as_deref().unwrap_or(DEFAULT_TITLE)
        );
        let description =
            truncate_description(release.body.as_deref().unwrap_or(DEFAULT_DESCRIPTION));
        let thumbnail_url = release
            .assets
            .first()
            .filter(|asset| asset.content_type.starts_with("image/"))
            .map(|asset| asset.download_url.clone());

        NotificationMessage {
            channel_id: self.channel_id,
            content: ANNOUNCEMENT.to_string(),
            embed: Embed {
                title,
                url: release.html_url.clone(),
                description,
                color: ACCENT_COLOR,
                field: EmbedField {
                    name: VERSION_FIELD.to_string(),
                    value: release.tag_name.clone(),
                    inline: true,
                },
                thumbnail_url,
                footer: EmbedFooter {
                    text: FOOTER_TEXT.to_string(),
                    icon_url: Some(FOOTER_ICON_URL.to_string()),
                },
                timestamp: release.published_at,
            },
        }
    }
}

/// Caps `text` at [`DESCRIPTION_LIMIT`] characters, ellipsis included.
pub fn truncate_description(text: &str) -> String {
    if text.chars().count() <= DESCRIPTION_LIMIT {
        return text.to_string();
    }
    let keep = DESCRIPTION_LIMIT - ELLIPSIS.chars().count();
    let mut truncated: String = text.chars().take(keep).collect();
    truncated.push_str(ELLIPSIS);
    truncated
}
