//! The messaging client as seen by the router.

use async_trait::async_trait;

use super::message::{ChatMessage, MediaPayload};
use crate::backend::GeneratedImage;

#[derive(Debug, thiserror::Error)]
pub enum TransportError {
    #[error("failed to send: {0}")]
    Send(String),
    #[error("failed to download media: {0}")]
    Download(String),
    #[error("message has no media")]
    NoMedia,
}

/// Replies into the conversation a message came from.
///
/// Constructed once at startup and shared by every event handler.
#[async_trait]
pub trait Transport: Send + Sync {
    /// Send a text reply quoting `message`.
    async fn reply(&self, message: &ChatMessage, text: &str) -> Result<(), TransportError>;

    /// Send an image reply quoting `message`.
    async fn reply_image(
        &self,
        message: &ChatMessage,
        image: GeneratedImage,
        caption: Option<&str>,
    ) -> Result<(), TransportError>;

    /// Fetch the attachment of `message`, base64-encoded.
    async fn download_media(&self, message: &ChatMessage) -> Result<MediaPayload, TransportError>;
}
