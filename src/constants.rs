//! Fixed identifiers and canned replies.

/// Sender id of the platform-wide status/broadcast channel. Never handled.
pub const STATUS_BROADCAST: &str = "status@broadcast";

/// Declared mime type of voice notes.
pub const VOICE_MIME_TYPE: &str = "audio/ogg";

/// Acknowledgment sent before a voice note is transcribed.
pub const PROCESSING_VOICE: &str = "Processing voice message...";

/// Sent when handling a message fails for any reason.
pub const FAILURE_NOTICE: &str = "Sorry, something went wrong while handling your message. Please try again later.";
