//! Forward a prompt to an AI backend and reply with the result.

use std::time::Instant;

use tracing::info;

use super::message::ChatMessage;
use super::router::DispatchError;
use super::transport::Transport;
use crate::backend::{CompletionBackend, GeneratedImage, ImageBackend};

/// Ask the completion backend and reply with its answer.
pub async fn handle_gpt(
    transport: &dyn Transport,
    backend: &dyn CompletionBackend,
    message: &ChatMessage,
    prompt: &str,
) -> Result<(), DispatchError> {
    info!("[GPT] Received prompt from {}: {}", message.from, prompt);

    let start = Instant::now();
    let answer = backend.complete(prompt).await?;
    info!(
        "[GPT] Answer to {}: {} | request took {}ms",
        message.from,
        answer,
        start.elapsed().as_millis()
    );

    transport.reply(message, &answer).await?;
    Ok(())
}

/// Generate an image and reply with it, captioned by the prompt.
pub async fn handle_dalle(
    transport: &dyn Transport,
    backend: &dyn ImageBackend,
    message: &ChatMessage,
    prompt: &str,
) -> Result<(), DispatchError> {
    info!("[DALL-E] Received prompt from {}: {}", message.from, prompt);

    let start = Instant::now();
    let image = backend.generate_image(prompt).await?;
    let kind = match image {
        GeneratedImage::Bytes(ref data) => format!("{} bytes", data.len()),
        GeneratedImage::Url(ref url) => url.clone(),
    };
    info!(
        "[DALL-E] Image for {}: {} | request took {}ms",
        message.from,
        kind,
        start.elapsed().as_millis()
    );

    transport.reply_image(message, image, Some(prompt)).await?;
    Ok(())
}
