//! Telegram transport using teloxide.

use std::sync::Arc;

use async_trait::async_trait;
use base64::Engine;
use teloxide::net::Download;
use teloxide::prelude::*;
use teloxide::types::{FileId, InputFile, MessageId, ReplyParameters};
use tokio::sync::mpsc;
use tracing::{debug, info, warn};

use super::message::{ChatMessage, Event, MediaPayload, MediaRef};
use super::transport::{Transport, TransportError};
use crate::backend::GeneratedImage;
use crate::constants::{STATUS_BROADCAST, VOICE_MIME_TYPE};

/// Telegram caps messages at 4096 chars; stay below it.
const MAX_MESSAGE_LEN: usize = 4000;

const MAX_CAPTION_LEN: usize = 1024;

/// Telegram Bot API client.
pub struct TelegramTransport {
    bot: Bot,
}

impl TelegramTransport {
    pub fn new(bot: Bot) -> Self {
        Self { bot }
    }
}

fn reply_to(message: &ChatMessage) -> ReplyParameters {
    ReplyParameters::new(MessageId(message.message_id as i32))
}

#[async_trait]
impl Transport for TelegramTransport {
    async fn reply(&self, message: &ChatMessage, text: &str) -> Result<(), TransportError> {
        let chat_id = ChatId(message.chat_id);

        for (i, chunk) in split_message(text, MAX_MESSAGE_LEN).into_iter().enumerate() {
            let mut request = self.bot.send_message(chat_id, chunk);
            // Only the first chunk quotes the original.
            if i == 0 {
                request = request.reply_parameters(reply_to(message));
            }
            request.await.map_err(|e| {
                let msg = e.to_string();
                warn!("Failed to send: {msg}");
                TransportError::Send(msg)
            })?;
        }

        Ok(())
    }

    async fn reply_image(
        &self,
        message: &ChatMessage,
        image: GeneratedImage,
        caption: Option<&str>,
    ) -> Result<(), TransportError> {
        let input_file = match image {
            GeneratedImage::Bytes(data) => {
                info!("📷 Sending image to chat {} ({} bytes)", message.chat_id, data.len());
                InputFile::memory(data).file_name("image.png")
            }
            GeneratedImage::Url(url) => {
                info!("📷 Sending image to chat {} ({})", message.chat_id, url);
                let url = reqwest::Url::parse(&url)
                    .map_err(|e| TransportError::Send(format!("invalid image URL '{url}': {e}")))?;
                InputFile::url(url)
            }
        };

        let mut request = self
            .bot
            .send_photo(ChatId(message.chat_id), input_file)
            .reply_parameters(reply_to(message));

        if let Some(cap) = caption {
            request = request.caption(truncate_chars(cap, MAX_CAPTION_LEN));
        }

        request.await.map(|_| ()).map_err(|e| {
            let msg = e.to_string();
            warn!("Failed to send image: {msg}");
            TransportError::Send(msg)
        })
    }

    async fn download_media(&self, message: &ChatMessage) -> Result<MediaPayload, TransportError> {
        let media = message.media.as_ref().ok_or(TransportError::NoMedia)?;

        let file = self
            .bot
            .get_file(FileId(media.id.clone()))
            .await
            .map_err(|e| TransportError::Download(format!("failed to get file info: {e}")))?;

        let mut data = Vec::new();
        self.bot
            .download_file(&file.path, &mut data)
            .await
            .map_err(|e| TransportError::Download(e.to_string()))?;

        info!("📥 Downloaded media ({} bytes, {})", data.len(), media.mime_type);
        Ok(MediaPayload {
            data: base64::engine::general_purpose::STANDARD.encode(&data),
            mime_type: media.mime_type.clone(),
        })
    }
}

struct Listener {
    events: mpsc::Sender<Event>,
    owner_ids: Vec<UserId>,
}

/// Poll Telegram and forward everything as [`Event`]s until Ctrl-C.
///
/// Messages from `owner_ids` arrive as [`Event::MessageCreated`] with
/// `from_me` set; everybody else's as [`Event::MessageReceived`].
pub async fn listen(bot: Bot, owner_ids: Vec<UserId>, events: mpsc::Sender<Event>) {
    events.send(Event::Loading(0)).await.ok();

    match bot.get_me().await {
        Ok(me) => {
            info!("Bot user ID: {}, username: @{}", me.id, me.username());
            events
                .send(Event::Qr(format!("https://t.me/{}", me.username())))
                .await
                .ok();
        }
        Err(e) => warn!("Failed to get bot info: {e}"),
    }

    events.send(Event::Ready).await.ok();

    let listener = Arc::new(Listener { events, owner_ids });

    let handler = dptree::entry()
        .branch(Update::filter_message().endpoint(handle_update))
        .branch(Update::filter_channel_post().endpoint(handle_update));

    Dispatcher::builder(bot, handler)
        .dependencies(dptree::deps![listener])
        .default_handler(|upd| async move {
            debug!("Unhandled update: {:?}", upd.id);
        })
        .error_handler(LoggingErrorHandler::with_custom_text("telegram"))
        .enable_ctrlc_handler()
        .build()
        .dispatch()
        .await;
}

async fn handle_update(msg: Message, listener: Arc<Listener>) -> ResponseResult<()> {
    let Some(chat_msg) = telegram_to_chat_message(&msg, &listener.owner_ids) else {
        debug!("Ignoring message {} without text or audio", msg.id);
        return Ok(());
    };

    if listener.events.send(event_for(chat_msg)).await.is_err() {
        warn!("Event channel closed, dropping message {}", msg.id);
    }

    Ok(())
}

/// Owners' messages count as created by the operating account.
fn event_for(message: ChatMessage) -> Event {
    if message.from_me {
        Event::MessageCreated(message)
    } else {
        Event::MessageReceived(message)
    }
}

/// Map a Telegram message onto the bridge's model. `None` for messages with
/// nothing to act on (stickers, photos without caption, service messages).
fn telegram_to_chat_message(msg: &Message, owner_ids: &[UserId]) -> Option<ChatMessage> {
    let media = if let Some(voice) = msg.voice() {
        Some(MediaRef {
            id: voice.file.id.0.clone(),
            mime_type: voice
                .mime_type
                .as_ref()
                .map(|m| m.to_string())
                .unwrap_or_else(|| VOICE_MIME_TYPE.to_string()),
        })
    } else {
        msg.audio().map(|audio| MediaRef {
            id: audio.file.id.0.clone(),
            mime_type: audio
                .mime_type
                .as_ref()
                .map(|m| m.to_string())
                .unwrap_or_else(|| VOICE_MIME_TYPE.to_string()),
        })
    };

    let body = msg.text().or_else(|| msg.caption()).unwrap_or("").to_string();
    if body.is_empty() && media.is_none() {
        return None;
    }

    let user = msg.from.as_ref();
    let from_channel =
        msg.chat.is_channel() || msg.sender_chat.as_ref().is_some_and(|chat| chat.is_channel());

    let from = if from_channel {
        STATUS_BROADCAST.to_string()
    } else {
        user.map(|u| u.id.0.to_string())
            .unwrap_or_else(|| msg.chat.id.0.to_string())
    };

    let from_me = !from_channel && user.is_some_and(|u| owner_ids.contains(&u.id));

    Some(ChatMessage {
        message_id: msg.id.0 as i64,
        chat_id: msg.chat.id.0,
        from,
        body,
        has_quoted_msg: quotes_message(msg),
        from_me,
        media,
    })
}

/// Inside a forum topic every message replies to the topic's creation
/// message. That link is not a quote.
fn quotes_message(msg: &Message) -> bool {
    match msg.reply_to_message() {
        Some(reply) => !(msg.is_topic_message && reply.forum_topic_created().is_some()),
        None => false,
    }
}

/// Split long text into chunks of at most `max_len` bytes, preferring
/// newline then space boundaries.
fn split_message(text: &str, max_len: usize) -> Vec<String> {
    if text.len() <= max_len {
        return vec![text.to_string()];
    }

    let mut chunks = Vec::new();
    let mut start = 0;

    while start < text.len() {
        let mut end = (start + max_len).min(text.len());
        // Walk back to a valid UTF-8 char boundary so slicing doesn't panic
        while end > start && !text.is_char_boundary(end) {
            end -= 1;
        }
        let actual_end = if end < text.len() {
            text[start..end]
                .rfind('\n')
                .or_else(|| text[start..end].rfind(' '))
                .map(|pos| start + pos + 1)
                .unwrap_or(end)
        } else {
            end
        };

        chunks.push(text[start..actual_end].to_string());
        start = actual_end;
    }

    chunks
}

fn truncate_chars(s: &str, max_chars: usize) -> String {
    s.chars().take(max_chars).collect()
}
