//! Bridge module - routes chat messages to completion, image and speech backends.

pub mod handlers;
pub mod message;
pub mod router;
pub mod telegram;
pub mod transport;
pub mod whisper;


pub use message::{ChatMessage, Event, MediaPayload, MediaRef, Origin};
pub use router::{Route, Router, SkipReason, route};
pub use telegram::TelegramTransport;
pub use transport::{Transport, TransportError};
pub use whisper::{SpeechToText, Transcription, TranscriptionError, WhisperCli};
