//! Channel trait and message types shared by all transports.

use std::pin::Pin;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use futures::Stream;
use uuid::Uuid;

use crate::error::ChannelError;

/// Stream of inbound messages produced by a channel.
pub type MessageStream = Pin<Box<dyn Stream<Item = IncomingMessage> + Send>>;

/// Media attached to an inbound message, already downloaded.
#[derive(Debug, Clone)]
pub struct ImageAttachment {
    /// MIME type reported by the transport (e.g. `image/jpeg`).
    pub mime_type: String,
    pub data: Vec<u8>,
    pub file_name: Option<String>,
}

impl ImageAttachment {
    pub fn new(mime_type: impl Into<String>, data: Vec<u8>) -> Self {
        Self {
            mime_type: mime_type.into(),
            data,
            file_name: None,
        }
    }

    pub fn with_file_name(mut self, name: impl Into<String>) -> Self {
        self.file_name = Some(name.into());
        self
    }

    /// Whether the attachment is an image the receipt reviewer can read.
    pub fn is_image(&self) -> bool {
        self.mime_type.starts_with("image/")
    }

    /// File extension to use when staging the attachment on disk.
    pub fn extension(&self) -> &str {
        match self.mime_type.as_str() {
            "image/jpeg" | "image/jpg" => "jpg",
            "image/webp" => "webp",
            "image/gif" => "gif",
            "image/bmp" => "bmp",
            "image/tiff" => "tiff",
            _ => "png",
        }
    }
}

/// A message received from any channel.
#[derive(Debug, Clone)]
pub struct IncomingMessage {
    pub id: Uuid,
    /// Name of the channel that produced the message.
    pub channel: String,
    /// Stable sender identifier (chat user id, phone number).
    pub user_id: String,
    /// Display name of the sender, if the transport provides one.
    pub user_name: Option<String>,
    /// Text body or caption. Empty for bare media.
    pub content: String,
    pub attachment: Option<ImageAttachment>,
    /// Set when the sender attached media that the channel could not fetch.
    pub media_error: Option<String>,
    pub received_at: DateTime<Utc>,
    /// Channel-specific data needed to reply (chat ids, etc.).
    pub metadata: serde_json::Value,
}

impl IncomingMessage {
    pub fn new(channel: &str, user_id: &str, content: &str) -> Self {
        Self {
            id: Uuid::new_v4(),
            channel: channel.to_string(),
            user_id: user_id.to_string(),
            user_name: None,
            content: content.to_string(),
            attachment: None,
            media_error: None,
            received_at: Utc::now(),
            metadata: serde_json::Value::Null,
        }
    }

    pub fn with_metadata(mut self, metadata: serde_json::Value) -> Self {
        self.metadata = metadata;
        self
    }

    pub fn with_user_name(mut self, name: &str) -> Self {
        self.user_name = Some(name.to_string());
        self
    }

    pub fn with_attachment(mut self, attachment: ImageAttachment) -> Self {
        self.attachment = Some(attachment);
        self
    }

    pub fn with_media_error(mut self, reason: impl Into<String>) -> Self {
        self.media_error = Some(reason.into());
        self
    }

    /// Identifier used in audit entries: the display name, else the user id.
    pub fn subject(&self) -> &str {
        self.user_name
            .as_deref()
            .filter(|name| !name.trim().is_empty())
            .unwrap_or(&self.user_id)
    }
}

/// A message to send back to the sender of an [`IncomingMessage`].
#[derive(Debug, Clone)]
pub struct OutgoingResponse {
    pub content: String,
}

impl OutgoingResponse {
    pub fn text(content: impl Into<String>) -> Self {
        Self {
            content: content.into(),
        }
    }
}

/// A chat transport.
#[async_trait]
pub trait Channel: Send + Sync {
    /// Channel name (e.g. "telegram", "cli").
    fn name(&self) -> &str;

    /// Begin receiving messages.
    async fn start(&self) -> Result<MessageStream, ChannelError>;

    /// Send one message to the sender of `msg`.
    async fn respond(
        &self,
        msg: &IncomingMessage,
        response: OutgoingResponse,
    ) -> Result<(), ChannelError>;

    async fn health_check(&self) -> Result<(), ChannelError> {
        Ok(())
    }

    async fn shutdown(&self) -> Result<(), ChannelError> {
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn subject_prefers_display_name() {
        let msg = IncomingMessage::new("telegram", "42", "hola").with_user_name("Ana");
        assert_eq!(msg.subject(), "Ana");
    }

    #[test]
    fn subject_falls_back_to_user_id() {
        let msg = IncomingMessage::new("telegram", "42", "hola");
        assert_eq!(msg.subject(), "42");
        let msg = msg.with_user_name("  ");
        assert_eq!(msg.subject(), "42");
    }

    #[test]
    fn attachment_mime_checks() {
        let png = ImageAttachment::new("image/png", vec![1]);
        assert!(png.is_image());
        assert_eq!(png.extension(), "png");
        assert_eq!(ImageAttachment::new("image/jpeg", vec![]).extension(), "jpg");
        assert!(!ImageAttachment::new("application/pdf", vec![]).is_image());
    }
}
