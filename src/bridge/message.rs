//! Transport-agnostic message and event types.

/// Reference to a downloadable attachment.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MediaRef {
    /// Transport-specific handle (a Telegram file id).
    pub id: String,
    pub mime_type: String,
}

/// Downloaded attachment: base64-encoded bytes plus declared mime type.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MediaPayload {
    pub data: String,
    pub mime_type: String,
}

/// A single inbound or self-authored message.
///
/// Lives only for the duration of one event; nothing is persisted.
#[derive(Debug, Clone)]
pub struct ChatMessage {
    pub message_id: i64,
    /// Conversation the reply goes back into.
    pub chat_id: i64,
    /// Sender identifier. Equals [`STATUS_BROADCAST`](crate::constants::STATUS_BROADCAST)
    /// for broadcast-channel traffic.
    pub from: String,
    pub body: String,
    /// The message quotes (replies to) another message.
    pub has_quoted_msg: bool,
    /// Authored by the operating account.
    pub from_me: bool,
    pub media: Option<MediaRef>,
}

impl ChatMessage {
    pub fn has_media(&self) -> bool {
        self.media.is_some()
    }
}

/// Which transport event delivered a message.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Origin {
    /// Someone else's message arrived.
    Received,
    /// A message was created in a conversation (possibly by us).
    Created,
}

/// Everything the transport reports to the bridge.
#[derive(Debug, Clone)]
pub enum Event {
    /// Login code the operator should scan or open.
    Qr(String),
    /// Startup progress in percent.
    Loading(u8),
    Ready,
    MessageReceived(ChatMessage),
    MessageCreated(ChatMessage),
}
