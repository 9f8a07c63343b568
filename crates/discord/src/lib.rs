pub mod rest;

pub use rest::{
    AllowedMentions, CreateMessage, CurrentUser, DiscordClient, DiscordError, Embed, EmbedField,
    EmbedFooter, EmbedImage, MessageRef,
};
