//! Message routing: filter, classify, dispatch.
//!
//! [`route`] is pure and decides what a message deserves. [`Router`] carries
//! the decision out against the transport and backends, and turns every
//! failure into a log line plus a generic reply.

use std::sync::Arc;

use tokio::sync::mpsc;
use tokio::task::JoinSet;
use tracing::{debug, error, info, warn};

use super::handlers::{handle_dalle, handle_gpt};
use super::message::{ChatMessage, Event, Origin};
use super::transport::{Transport, TransportError};
use super::whisper::{SpeechToText, TranscriptionError};
use crate::backend::{BackendError, CompletionBackend, ImageBackend};
use crate::cli;
use crate::config::RoutingConfig;
use crate::constants::{FAILURE_NOTICE, PROCESSING_VOICE, STATUS_BROADCAST};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SkipReason {
    /// Sent by the status/broadcast channel.
    Broadcast,
    /// Quotes another message (our own replies do).
    QuotedReply,
    /// A created message that the operating account did not write.
    NotFromMe,
    /// Text without a recognized trigger prefix.
    NoTrigger,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Route {
    Skip(SkipReason),
    Completion(String),
    Image(String),
    /// Transcribe, then always complete. Prefixes do not apply.
    Voice,
}

#[derive(Debug, thiserror::Error)]
pub enum DispatchError {
    #[error(transparent)]
    Transport(#[from] TransportError),
    #[error("transcription failed: {0}")]
    Transcription(#[from] TranscriptionError),
    #[error("backend request failed: {0}")]
    Backend(#[from] BackendError),
}

/// Decide how to handle `message`. Filters apply in order, first match wins.
pub fn route(origin: Origin, message: &ChatMessage, routing: &RoutingConfig) -> Route {
    if message.from == STATUS_BROADCAST {
        return Route::Skip(SkipReason::Broadcast);
    }
    if message.has_quoted_msg {
        return Route::Skip(SkipReason::QuotedReply);
    }
    if origin == Origin::Created && !message.from_me {
        return Route::Skip(SkipReason::NotFromMe);
    }

    if message.has_media() {
        return Route::Voice;
    }

    if !routing.prefix_enabled {
        return Route::Completion(message.body.clone());
    }
    if let Some(prompt) = strip_trigger(&message.body, &routing.gpt_prefix) {
        return Route::Completion(prompt);
    }
    if let Some(prompt) = strip_trigger(&message.body, &routing.dalle_prefix) {
        return Route::Image(prompt);
    }

    Route::Skip(SkipReason::NoTrigger)
}

/// Match `prefix` at the start of `body` ignoring case. On a match, returns
/// the rest of `body` with exactly one separator character dropped.
pub fn strip_trigger(body: &str, prefix: &str) -> Option<String> {
    let mut rest = body.chars();
    for expected in prefix.chars() {
        let actual = rest.next()?;
        if !actual.to_lowercase().eq(expected.to_lowercase()) {
            return None;
        }
    }
    rest.next();
    Some(rest.as_str().to_string())
}

pub struct Router {
    routing: RoutingConfig,
    transport: Arc<dyn Transport>,
    completion: Arc<dyn CompletionBackend>,
    images: Arc<dyn ImageBackend>,
    speech: Arc<dyn SpeechToText>,
}

impl Router {
    pub fn new(
        routing: RoutingConfig,
        transport: Arc<dyn Transport>,
        completion: Arc<dyn CompletionBackend>,
        images: Arc<dyn ImageBackend>,
        speech: Arc<dyn SpeechToText>,
    ) -> Self {
        Self {
            routing,
            transport,
            completion,
            images,
            speech,
        }
    }

    /// Consume transport events until the channel closes.
    ///
    /// Each message runs in its own task so a slow transcription or backend
    /// call does not hold up later messages. Returns once every in-flight
    /// message has finished.
    pub async fn run(self: Arc<Self>, mut events: mpsc::Receiver<Event>) {
        let mut tasks = JoinSet::new();

        loop {
            tokio::select! {
                event = events.recv() => {
                    let Some(event) = event else { break };
                    match event {
                        Event::Qr(code) => cli::print_qr_code(&code),
                        Event::Loading(percent) => {
                            if percent == 0 {
                                cli::print_loading();
                            }
                        }
                        Event::Ready => cli::print_outro(),
                        Event::MessageReceived(message) => {
                            let router = Arc::clone(&self);
                            tasks.spawn(async move {
                                router.handle_message(Origin::Received, message).await
                            });
                        }
                        Event::MessageCreated(message) => {
                            let router = Arc::clone(&self);
                            tasks.spawn(async move {
                                router.handle_message(Origin::Created, message).await
                            });
                        }
                    }
                }
                Some(result) = tasks.join_next(), if !tasks.is_empty() => {
                    if let Err(e) = result {
                        error!("Message task failed: {e}");
                    }
                }
            }
        }

        info!("Event stream closed, waiting for {} in-flight message(s)", tasks.len());
        while let Some(result) = tasks.join_next().await {
            if let Err(e) = result {
                error!("Message task failed: {e}");
            }
        }
    }

    /// Route and handle one message. Never fails: errors are logged and the
    /// sender gets [`FAILURE_NOTICE`].
    pub async fn handle_message(&self, origin: Origin, message: ChatMessage) {
        let route = route(origin, &message, &self.routing);
        if let Route::Skip(reason) = route {
            debug!("Skipping message {} from {}: {:?}", message.message_id, message.from, reason);
            return;
        }

        if let Err(e) = self.dispatch(&message, route).await {
            error!("Failed to handle message {} from {}: {e}", message.message_id, message.from);
            if let Err(e) = self.transport.reply(&message, FAILURE_NOTICE).await {
                warn!("Failed to send failure notice to {}: {e}", message.from);
            }
        }
    }

    async fn dispatch(&self, message: &ChatMessage, route: Route) -> Result<(), DispatchError> {
        match route {
            Route::Skip(_) => Ok(()),
            Route::Completion(prompt) => {
                handle_gpt(&*self.transport, &*self.completion, message, &prompt).await
            }
            Route::Image(prompt) => handle_dalle(&*self.transport, &*self.images, message, &prompt).await,
            Route::Voice => self.handle_voice(message).await,
        }
    }

    async fn handle_voice(&self, message: &ChatMessage) -> Result<(), DispatchError> {
        self.transport.reply(message, PROCESSING_VOICE).await?;

        let media = self.transport.download_media(message).await?;
        let transcription = self.speech.transcribe(&media).await?;

        let echo = format!(
            "You said: {} (language: {})",
            transcription.text, transcription.language
        );
        self.transport.reply(message, &echo).await?;

        handle_gpt(&*self.transport, &*self.completion, message, &transcription.text).await
    }
}
