//! Release relay domain: webhook authentication, release classification and
//! notification formatting. Everything here is synchronous and free of I/O.

pub mod notification;
pub mod release;
pub mod signature;

pub use notification::{Embed, EmbedField, EmbedFooter, NotificationFormatter, NotificationMessage};
pub use release::{ClassifyError, EventClassifier, Release, ReleaseAsset, WebhookEnvelope};
pub use signature::{compute_signature, verify_signature};
