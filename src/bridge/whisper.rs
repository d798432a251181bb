//! Speech-to-text through the `whisper` command-line tool.
//!
//! Voice notes are written to a uniquely named temp file, the CLI is run
//! against it, and the detected language plus transcript are parsed out of
//! its stdout. Every file the run creates is removed afterwards, whether the
//! command succeeded or not.

use std::io;
use std::path::{Path, PathBuf};
use std::process::{ExitStatus, Stdio};

use async_trait::async_trait;
use base64::Engine;
use tokio::process::Command;
use tracing::{debug, info, warn};
use uuid::Uuid;

use super::message::MediaPayload;
use crate::config::TranscriptionConfig;

const AUDIO_EXTENSION: &str = "ogg";

/// Output formats whisper writes next to its working directory.
const ARTIFACT_EXTENSIONS: &[&str] = &["txt", "vtt", "srt", "tsv", "json"];

const LANGUAGE_MARKER: &str = "Detected language";

/// Detected language plus transcript.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Transcription {
    pub language: String,
    pub text: String,
}

#[derive(Debug, thiserror::Error)]
pub enum TranscriptionError {
    #[error("invalid base64 audio payload: {0}")]
    Decode(#[from] base64::DecodeError),
    #[error("failed to write temp audio '{}': {source}", .path.display())]
    WriteTemp { path: PathBuf, source: io::Error },
    #[error("failed to run '{command}': {source}")]
    Spawn { command: String, source: io::Error },
    #[error("'{command}' exited with {status}: {stderr}")]
    Failed {
        command: String,
        status: ExitStatus,
        stderr: String,
    },
    #[error("no \"Detected language\" line in transcription output")]
    MissingLanguage,
    #[error("no transcript line in transcription output")]
    MissingText,
}

/// Turns a downloaded voice payload into text.
#[async_trait]
pub trait SpeechToText: Send + Sync {
    async fn transcribe(&self, media: &MediaPayload) -> Result<Transcription, TranscriptionError>;
}

/// Runs `<command> [args..] --task transcribe --fp16 False <file>`.
pub struct WhisperCli {
    config: TranscriptionConfig,
}

impl WhisperCli {
    pub fn new(config: TranscriptionConfig) -> Self {
        Self { config }
    }

    /// Transcribe raw audio bytes.
    pub async fn transcribe_audio(&self, audio: &[u8]) -> Result<Transcription, TranscriptionError> {
        info!("🎙️ Transcribing {} bytes of audio", audio.len());

        let temp = TempAudio::create(&self.config.temp_dir, &self.config.work_dir, audio)?;
        let output = self.run(temp.path()).await?;
        drop(temp);

        let transcription = parse_whisper_output(&output)?;
        info!(
            "Transcribed ({}): \"{}\"",
            transcription.language,
            truncate(&transcription.text, 100)
        );
        Ok(transcription)
    }

    async fn run(&self, audio_path: &Path) -> Result<String, TranscriptionError> {
        let command = &self.config.command;
        debug!("Running {} on {}", command, audio_path.display());

        let output = Command::new(command)
            .args(&self.config.args)
            .args(["--task", "transcribe", "--fp16", "False"])
            .arg(audio_path)
            .current_dir(&self.config.work_dir)
            .stdin(Stdio::null())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .output()
            .await
            .map_err(|e| TranscriptionError::Spawn {
                command: command.clone(),
                source: e,
            })?;

        if !output.status.success() {
            return Err(TranscriptionError::Failed {
                command: command.clone(),
                status: output.status,
                stderr: String::from_utf8_lossy(&output.stderr).trim().to_string(),
            });
        }

        Ok(String::from_utf8_lossy(&output.stdout).trim().to_string())
    }
}

#[async_trait]
impl SpeechToText for WhisperCli {
    async fn transcribe(&self, media: &MediaPayload) -> Result<Transcription, TranscriptionError> {
        debug!("Decoding {} payload", media.mime_type);
        let audio = base64::engine::general_purpose::STANDARD.decode(&media.data)?;
        self.transcribe_audio(&audio).await
    }
}

/// Parse whisper's stdout into language and transcript.
///
/// Takes the first `Detected language: xx` line and the first line starting
/// with `[`, splitting each on its first separator. Missing either line is an
/// error; there is no partial result.
pub fn parse_whisper_output(output: &str) -> Result<Transcription, TranscriptionError> {
    let language = output
        .lines()
        .find(|line| line.starts_with(LANGUAGE_MARKER))
        .and_then(|line| line.split_once(": "))
        .map(|(_, language)| language.trim())
        .filter(|language| !language.is_empty())
        .ok_or(TranscriptionError::MissingLanguage)?;

    let text = output
        .lines()
        .find(|line| line.starts_with('['))
        .and_then(|line| line.split_once("] "))
        .map(|(_, text)| text.trim())
        .filter(|text| !text.is_empty())
        .ok_or(TranscriptionError::MissingText)?;

    Ok(Transcription {
        language: language.to_string(),
        text: text.to_string(),
    })
}

/// Input file of one transcription run plus the artifacts whisper may write
/// for it. All of them are removed on drop; nothing else is touched.
struct TempAudio {
    path: PathBuf,
    artifacts: Vec<PathBuf>,
}

impl TempAudio {
    fn create(temp_dir: &Path, work_dir: &Path, audio: &[u8]) -> Result<Self, TranscriptionError> {
        let stem = Uuid::new_v4().to_string();
        let file_name = format!("{stem}.{AUDIO_EXTENSION}");

        let path = temp_dir.join(&file_name);
        // The command runs in work_dir, so a relative temp path would resolve elsewhere.
        let path = std::path::absolute(&path).map_err(|e| TranscriptionError::WriteTemp {
            path: path.clone(),
            source: e,
        })?;

        // Older whisper releases keep the audio extension in output names, newer ones drop it.
        let artifacts = ARTIFACT_EXTENSIONS
            .iter()
            .flat_map(|ext| {
                [
                    work_dir.join(format!("{file_name}.{ext}")),
                    work_dir.join(format!("{stem}.{ext}")),
                ]
            })
            .collect();

        let temp = Self { path, artifacts };
        std::fs::write(&temp.path, audio).map_err(|e| TranscriptionError::WriteTemp {
            path: temp.path.clone(),
            source: e,
        })?;
        Ok(temp)
    }

    fn path(&self) -> &Path {
        &self.path
    }
}

impl Drop for TempAudio {
    fn drop(&mut self) {
        for path in std::iter::once(&self.path).chain(&self.artifacts) {
            match std::fs::remove_file(path) {
                Ok(()) => debug!("Removed {}", path.display()),
                Err(e) if e.kind() == io::ErrorKind::NotFound => {}
                Err(e) => warn!("Failed to remove {}: {e}", path.display()),
            }
        }
    }
}

fn truncate(s: &str, max_chars: usize) -> String {
    if s.chars().count() <= max_chars {
        s.to_string()
    } else {
        let head: String = s.chars().take(max_chars).collect();
        format!("{head}...")
    }
}
